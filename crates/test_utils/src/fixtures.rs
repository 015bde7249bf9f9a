//! Pre-built Test Fixtures
//!
//! Ready-to-use records and values for the rowkit test suite. Every record
//! gets a fresh public id so fixtures can be inserted repeatedly into the
//! same store.

use chrono::{DateTime, TimeZone, Utc};
use rowkit_kernel::{ConflictAction, ConflictTarget, OnConflict, Value};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::models::{new_public_id, TestCar, TestRental, TestUser, FAIL_VET_NAME};

/// Fixture for user records
pub struct UserFixtures;

impl UserFixtures {
    /// A user with every writable field set
    pub fn alice() -> TestUser {
        let mut user = TestUser::new();
        user.name = format!("alice-{}", new_public_id("n"));
        user.email = StringFixtures::email().to_string();
        user.phone_number = StringFixtures::phone().to_string();
        user
    }

    /// A user with only a name
    pub fn named(name: impl Into<String>) -> TestUser {
        let mut user = TestUser::new();
        user.name = name.into();
        user
    }

    /// A user whose own validation rejects every write
    pub fn failing_vet() -> TestUser {
        Self::named(FAIL_VET_NAME)
    }

    /// A user without a public id
    pub fn without_public_id() -> TestUser {
        let mut user = TestUser::default();
        user.name = "no-id".to_string();
        user
    }

    /// A user whose create time is already set
    pub fn with_create_time() -> TestUser {
        let mut user = Self::named(format!("timed-{}", new_public_id("n")));
        user.create_time = Some(TemporalFixtures::fixed());
        user
    }
}

/// Fixture for car records
pub struct CarFixtures;

impl CarFixtures {
    pub fn sedan() -> TestCar {
        TestCar {
            name: format!("sedan-{}", new_public_id("n")),
            model: "model-s".to_string(),
            mpg: 35,
            ..TestCar::new()
        }
    }
}

/// Fixture for rentals
pub struct RentalFixtures;

impl RentalFixtures {
    /// A rental linking the given user and car
    pub fn between(user: &TestUser, car: &TestCar) -> TestRental {
        TestRental {
            name: "weekend".to_string(),
            ..TestRental::new(user.public_id.clone(), car.public_id.clone())
        }
    }
}

/// Fixture for timestamps
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Jan 1, 2024 at midnight UTC
    pub fn fixed() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default()
    }
}

/// Fixture for upsert specs
pub struct ConflictFixtures;

impl ConflictFixtures {
    /// Overwrite everything on a primary key conflict
    pub fn update_all_on_public_id() -> OnConflict {
        OnConflict::new(ConflictTarget::columns(["public_id"]), ConflictAction::UpdateAll)
    }

    /// Ignore a primary key conflict
    pub fn do_nothing_on_public_id() -> OnConflict {
        OnConflict::new(ConflictTarget::columns(["public_id"]), ConflictAction::DoNothing)
    }

    /// Ignore a conflict on the primary key constraint, addressed by name
    pub fn do_nothing_on_pkey() -> OnConflict {
        OnConflict::new(
            ConflictTarget::constraint("db_test_user_pkey"),
            ConflictAction::DoNothing,
        )
    }
}

/// Fixture for string values
pub struct StringFixtures;

impl StringFixtures {
    pub fn email() -> &'static str {
        "alice@example.com"
    }

    pub fn phone() -> &'static str {
        "+1-555-0100"
    }
}

/// Fixture for column values of every variant
pub struct ValueFixtures;

impl ValueFixtures {
    /// One non-zero value per variant
    pub fn non_zero() -> Vec<Value> {
        vec![
            Value::Bool(true),
            Value::Int(42),
            Value::Float(1.5),
            Value::from("text"),
            Value::Bytes(vec![1, 2, 3]),
            Value::Decimal(Self::amount()),
            Value::Timestamp(TemporalFixtures::fixed()),
            Value::Uuid(uuid::Uuid::new_v4()),
            Value::Json(serde_json::json!({"k": "v"})),
        ]
    }

    pub fn amount() -> Decimal {
        dec!(1500.25)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_are_unique() {
        let a = UserFixtures::alice();
        let b = UserFixtures::alice();
        assert_ne!(a.public_id, b.public_id);
        assert_ne!(a.name, b.name);
    }

    #[test]
    fn test_non_zero_values() {
        assert!(ValueFixtures::non_zero().iter().all(|v| !v.is_zero()));
    }
}
