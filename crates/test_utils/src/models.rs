//! Test Models
//!
//! Record types backed by the `db_test_*` tables of the test schema. They
//! exercise every corner of the write path: store defaults, a version
//! column, a unique column, a composite primary key and record-level
//! validation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rowkit_kernel::value::optional;
use rowkit_kernel::{DbError, Field, LifecycleHook, Model, OpType, Reader, Schema, VetOptions};
use uuid::Uuid;

/// Name that makes [`TestUser::vet_for_write`] fail
pub const FAIL_VET_NAME: &str = "fail-VetForWrite";

/// Random public id with the given prefix
pub fn new_public_id(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &id[..20])
}

/// Row of the `db_test_user` table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestUser {
    pub public_id: String,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
    pub name: String,
    pub phone_number: String,
    pub email: String,
    pub version: u32,
    table: Option<String>,
}

impl TestUser {
    /// Creates a user with a fresh public id and nothing else set
    pub fn new() -> Self {
        Self {
            public_id: new_public_id("u"),
            ..Default::default()
        }
    }

    /// A user with only its public id set, as used for lookups
    pub fn with_public_id(public_id: impl Into<String>) -> Self {
        Self {
            public_id: public_id.into(),
            ..Default::default()
        }
    }

    /// Points the record at a different table
    pub fn set_table_name(&mut self, table: impl Into<String>) {
        self.table = Some(table.into());
    }
}

static TEST_USER_SCHEMA: Lazy<Schema<TestUser>> = Lazy::new(|| {
    Schema::new("db_test_user")
        .field(
            Field::new("PublicId", |u: &TestUser| u.public_id.clone().into(), |u, v| {
                u.public_id = v.try_into()?;
                Ok(())
            })
            .column("public_id")
            .primary_key(),
        )
        .field(
            Field::new("CreateTime", |u: &TestUser| u.create_time.into(), |u, v| {
                u.create_time = optional(v)?;
                Ok(())
            })
            .column("create_time")
            .store_default(),
        )
        .field(
            Field::new("UpdateTime", |u: &TestUser| u.update_time.into(), |u, v| {
                u.update_time = optional(v)?;
                Ok(())
            })
            .column("update_time")
            .store_default(),
        )
        .field(
            Field::new("Name", |u: &TestUser| u.name.clone().into(), |u, v| {
                u.name = v.try_into()?;
                Ok(())
            })
            .column("name")
            .store_default(),
        )
        .field(
            Field::new("PhoneNumber", |u: &TestUser| u.phone_number.clone().into(), |u, v| {
                u.phone_number = v.try_into()?;
                Ok(())
            })
            .column("phone_number")
            .store_default(),
        )
        .field(
            Field::new("Email", |u: &TestUser| u.email.clone().into(), |u, v| {
                u.email = v.try_into()?;
                Ok(())
            })
            .column("email")
            .store_default(),
        )
        .field(
            Field::new("Version", |u: &TestUser| u.version.into(), |u, v| {
                u.version = v.try_into()?;
                Ok(())
            })
            .column("version"),
        )
});

#[async_trait]
impl Model for TestUser {
    fn schema() -> &'static Schema<Self> {
        &TEST_USER_SCHEMA
    }

    fn table_name(&self) -> &str {
        self.table
            .as_deref()
            .unwrap_or_else(|| Self::schema().table())
    }

    async fn vet_for_write(
        &self,
        _reader: &dyn Reader,
        op: OpType,
        opts: &VetOptions<'_>,
    ) -> Result<(), DbError> {
        if self.public_id.is_empty() {
            return Err(DbError::invalid("missing public id"));
        }
        if self.name == FAIL_VET_NAME {
            return Err(DbError::invalid(format!("name was {}", FAIL_VET_NAME)));
        }
        match op {
            OpType::Update => {
                for path in opts.field_mask_paths {
                    if matches!(path.as_str(), "PublicId" | "CreateTime" | "UpdateTime") {
                        return Err(DbError::invalid(format!("{} is immutable", path)));
                    }
                }
            }
            OpType::Create => {
                if self.create_time.is_some() {
                    return Err(DbError::invalid("create time is set by the database"));
                }
            }
            OpType::Delete => {}
        }
        Ok(())
    }
}

/// Row of the `db_test_car` table; no version column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestCar {
    pub public_id: String,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
    pub name: String,
    pub model: String,
    pub mpg: i32,
}

impl TestCar {
    pub fn new() -> Self {
        Self {
            public_id: new_public_id("c"),
            ..Default::default()
        }
    }
}

static TEST_CAR_SCHEMA: Lazy<Schema<TestCar>> = Lazy::new(|| {
    Schema::new("db_test_car")
        .field(
            Field::new("PublicId", |c: &TestCar| c.public_id.clone().into(), |c, v| {
                c.public_id = v.try_into()?;
                Ok(())
            })
            .column("public_id")
            .primary_key(),
        )
        .field(
            Field::new("CreateTime", |c: &TestCar| c.create_time.into(), |c, v| {
                c.create_time = optional(v)?;
                Ok(())
            })
            .column("create_time")
            .store_default(),
        )
        .field(
            Field::new("UpdateTime", |c: &TestCar| c.update_time.into(), |c, v| {
                c.update_time = optional(v)?;
                Ok(())
            })
            .column("update_time")
            .store_default(),
        )
        .field(
            Field::new("Name", |c: &TestCar| c.name.clone().into(), |c, v| {
                c.name = v.try_into()?;
                Ok(())
            })
            .column("name")
            .store_default(),
        )
        .field(
            Field::new("Model", |c: &TestCar| c.model.clone().into(), |c, v| {
                c.model = v.try_into()?;
                Ok(())
            })
            .column("model")
            .store_default(),
        )
        .field(
            Field::new("Mpg", |c: &TestCar| c.mpg.into(), |c, v| {
                c.mpg = v.try_into()?;
                Ok(())
            })
            .column("mpg")
            .store_default(),
        )
});

impl Model for TestCar {
    fn schema() -> &'static Schema<Self> {
        &TEST_CAR_SCHEMA
    }
}

/// Row of the `db_test_rental` table, keyed by user and car
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestRental {
    pub user_id: String,
    pub car_id: String,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
    pub name: String,
    pub version: u32,
}

impl TestRental {
    pub fn new(user_id: impl Into<String>, car_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            car_id: car_id.into(),
            ..Default::default()
        }
    }
}

static TEST_RENTAL_SCHEMA: Lazy<Schema<TestRental>> = Lazy::new(|| {
    Schema::new("db_test_rental")
        .field(
            Field::new("UserId", |r: &TestRental| r.user_id.clone().into(), |r, v| {
                r.user_id = v.try_into()?;
                Ok(())
            })
            .column("user_id")
            .primary_key(),
        )
        .field(
            Field::new("CarId", |r: &TestRental| r.car_id.clone().into(), |r, v| {
                r.car_id = v.try_into()?;
                Ok(())
            })
            .column("car_id")
            .primary_key(),
        )
        .field(
            Field::new("CreateTime", |r: &TestRental| r.create_time.into(), |r, v| {
                r.create_time = optional(v)?;
                Ok(())
            })
            .column("create_time")
            .store_default(),
        )
        .field(
            Field::new("UpdateTime", |r: &TestRental| r.update_time.into(), |r, v| {
                r.update_time = optional(v)?;
                Ok(())
            })
            .column("update_time")
            .store_default(),
        )
        .field(
            Field::new("Name", |r: &TestRental| r.name.clone().into(), |r, v| {
                r.name = v.try_into()?;
                Ok(())
            })
            .column("name")
            .store_default(),
        )
        .field(
            Field::new("Version", |r: &TestRental| r.version.into(), |r, v| {
                r.version = v.try_into()?;
                Ok(())
            })
            .column("version"),
        )
});

impl Model for TestRental {
    fn schema() -> &'static Schema<Self> {
        &TEST_RENTAL_SCHEMA
    }
}

/// Declares a record type carrying one lifecycle callback
macro_rules! hooked_model {
    ($(#[$doc:meta])* $name:ident, $schema:ident, $hook:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            pub public_id: String,
            pub name: String,
        }

        impl $name {
            pub fn new() -> Self {
                Self {
                    public_id: new_public_id("h"),
                    name: String::new(),
                }
            }
        }

        static $schema: Lazy<Schema<$name>> = Lazy::new(|| {
            Schema::new("db_test_user")
                .field(
                    Field::new("PublicId", |r: &$name| r.public_id.clone().into(), |r, v| {
                        r.public_id = v.try_into()?;
                        Ok(())
                    })
                    .column("public_id")
                    .primary_key(),
                )
                .field(
                    Field::new("Name", |r: &$name| r.name.clone().into(), |r, v| {
                        r.name = v.try_into()?;
                        Ok(())
                    })
                    .column("name"),
                )
                .declares_hook(LifecycleHook::$hook)
        });

        impl Model for $name {
            fn schema() -> &'static Schema<Self> {
                &$schema
            }
        }
    };
}

hooked_model!(TestWithBeforeCreate, BEFORE_CREATE_SCHEMA, BeforeCreate);
hooked_model!(TestWithAfterCreate, AFTER_CREATE_SCHEMA, AfterCreate);
hooked_model!(TestWithBeforeSave, BEFORE_SAVE_SCHEMA, BeforeSave);
hooked_model!(TestWithAfterSave, AFTER_SAVE_SCHEMA, AfterSave);
hooked_model!(TestWithBeforeUpdate, BEFORE_UPDATE_SCHEMA, BeforeUpdate);
hooked_model!(TestWithAfterUpdate, AFTER_UPDATE_SCHEMA, AfterUpdate);
hooked_model!(TestWithBeforeDelete, BEFORE_DELETE_SCHEMA, BeforeDelete);
hooked_model!(TestWithAfterDelete, AFTER_DELETE_SCHEMA, AfterDelete);

#[cfg(test)]
mod tests {
    use super::*;
    use rowkit_kernel::{Resource, Value};

    #[test]
    fn test_user_introspection() {
        let user = TestUser::new();
        assert!(user.public_id.starts_with("u_"));
        assert_eq!(Resource::table_name(&user), "db_test_user");
        assert!(user.has_version());
        let pk = user.primary_keys();
        assert_eq!(pk.len(), 1);
        assert_eq!(pk[0].column, "public_id");
        assert_eq!(user.value_of("CreateTime"), Some(Value::Null));
    }

    #[test]
    fn test_table_override() {
        let mut user = TestUser::new();
        user.set_table_name("db_test_user_archive");
        assert_eq!(Resource::table_name(&user), "db_test_user_archive");
    }

    #[test]
    fn test_with_public_id_uses_default_table() {
        let user = TestUser::with_public_id("u_lookup");
        assert_eq!(user.public_id, "u_lookup");
        assert_eq!(user.version, 0);
        assert_eq!(Resource::table_name(&user), "db_test_user");
    }

    #[test]
    fn test_rental_composite_key() {
        let rental = TestRental::new("u_1", "c_1");
        let cols: Vec<&str> = rental.primary_keys().iter().map(|f| f.column).collect();
        assert_eq!(cols, vec!["user_id", "car_id"]);
        assert!(!TestCar::new().has_version());
    }

    #[test]
    fn test_hooked_models_declare_hooks() {
        assert_eq!(
            TestWithBeforeUpdate::new().lifecycle_hooks(),
            &[LifecycleHook::BeforeUpdate]
        );
        assert!(TestUser::new().lifecycle_hooks().is_empty());
    }
}
