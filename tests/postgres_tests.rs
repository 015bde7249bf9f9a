//! End-to-end tests against PostgreSQL
//!
//! These start a PostgreSQL container and are ignored by default:
//!
//! ```bash
//! cargo test --test postgres_tests -- --ignored
//! ```

use rowkit::{
    retry, DbError, ExpBackoff, Options, Reader, Rw, StoreErrorKind, Value, Writer,
};
use test_utils::{
    assert_column, assert_store_error, get_shared_test_database, ConflictFixtures, TestUser,
    UserFixtures,
};

async fn rw() -> Rw {
    test_utils::init_tracing();
    let db = get_shared_test_database().await;
    Rw::new(db.store())
}

async fn load(rw: &Rw, public_id: &str) -> TestUser {
    let mut user = TestUser::with_public_id(public_id);
    rw.lookup_by_id(&mut user, Options::new()).await.unwrap();
    user
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_create_uses_column_defaults() {
    let rw = rw().await;
    let mut user = UserFixtures::alice();
    let rows = rw
        .create(&mut user, Options::new().lookup(true))
        .await
        .unwrap();
    assert_eq!(rows, 1);
    assert_eq!(user.version, 1);
    assert!(user.create_time.is_some());
    assert_eq!(user.create_time, user.update_time);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_versioned_update() {
    let rw = rw().await;
    let mut user = UserFixtures::alice();
    rw.create(&mut user, Options::new().lookup(true))
        .await
        .unwrap();

    user.email = "updated@example.com".into();
    let rows = rw
        .update(&mut user, &["Email"], &["PhoneNumber"], Options::new().version(1))
        .await
        .unwrap();
    assert_eq!(rows, 1);
    assert_eq!(user.version, 2);
    assert_eq!(user.phone_number, "");
    // bumped by the trigger
    assert!(user.update_time > user.create_time);

    let rows = rw
        .update(&mut user, &["Email"], &[], Options::new().version(1))
        .await
        .unwrap();
    assert_eq!(rows, 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_upserts() {
    let rw = rw().await;
    let mut user = UserFixtures::alice();
    rw.create(&mut user, Options::new()).await.unwrap();

    let mut ignored = user.clone();
    ignored.name = format!("{}-ignored", user.name);
    let rows = rw
        .create(
            &mut ignored,
            Options::new()
                .on_conflict(ConflictFixtures::do_nothing_on_pkey())
                .lookup(true),
        )
        .await
        .unwrap();
    assert_eq!(rows, 0);
    assert_eq!(ignored.name, user.name);

    let mut replaced = user.clone();
    replaced.name = format!("{}-replaced", user.name);
    let rows = rw
        .create(
            &mut replaced,
            Options::new()
                .on_conflict(ConflictFixtures::update_all_on_public_id())
                .version(1)
                .lookup(true),
        )
        .await
        .unwrap();
    assert_eq!(rows, 1);
    assert_eq!(replaced.version, 2);
    assert!(replaced.name.ends_with("-replaced"));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_unique_violation_is_classified() {
    let rw = rw().await;
    let mut user = UserFixtures::alice();
    rw.create(&mut user, Options::new()).await.unwrap();

    let mut same_name = UserFixtures::named(user.name.clone());
    let err = rw.create(&mut same_name, Options::new()).await.unwrap_err();
    assert_store_error(&err, StoreErrorKind::UniqueViolation);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_raw_sql() {
    let rw = rw().await;
    let mut user = UserFixtures::alice();
    rw.create(&mut user, Options::new()).await.unwrap();

    let rows = rw
        .exec(
            "update db_test_user set phone_number = ? where public_id = ?",
            vec!["555-0000".into(), user.public_id.clone().into()],
        )
        .await
        .unwrap();
    assert_eq!(rows, 1);

    let found = rw
        .query(
            "select count(*) as n, max(phone_number) as phone from db_test_user where public_id = ?",
            vec![user.public_id.clone().into()],
        )
        .await
        .unwrap();
    assert_column(&found[0], "n", &Value::Int(1));
    assert_column(&found[0], "phone", &Value::from("555-0000"));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_do_tx_rolls_back_on_error() {
    let rw = rw().await;
    let user = UserFixtures::alice();
    let public_id = user.public_id.clone();

    let err = rw
        .do_tx(retry::is_transient, 2, &ExpBackoff::new(), move |_, writer| {
            let mut user = user.clone();
            Box::pin(async move {
                writer.create(&mut user, Options::new()).await?;
                Err(DbError::invalid("changed my mind"))
            })
        })
        .await
        .unwrap_err();
    assert_eq!(err.info.retries, 0);

    let mut missing = TestUser::with_public_id(public_id);
    let err = rw.lookup_by_id(&mut missing, Options::new()).await.unwrap_err();
    assert!(err.is_not_found());
}

/// Bumps the user's phone number inside `do_tx`, retrying on a stale version
async fn bump(rw: &Rw, public_id: &str) -> u32 {
    let public_id = public_id.to_string();
    rw.do_tx(retry::is_transient, 20, &ExpBackoff::new(), move |reader, writer| {
        let public_id = public_id.clone();
        Box::pin(async move {
            let mut user = TestUser::with_public_id(public_id);
            reader.lookup_by_id(&mut user, Options::new()).await?;
            let count: u32 = user.phone_number.parse().unwrap_or(0);
            user.phone_number = (count + 1).to_string();
            let version = user.version;
            let rows = writer
                .update(&mut user, &["PhoneNumber"], &[], Options::new().version(version))
                .await?;
            if rows == 0 {
                return Err(DbError::store(
                    StoreErrorKind::SerializationFailure,
                    "stale version",
                ));
            }
            Ok(())
        })
    })
    .await
    .unwrap()
    .retries
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_concurrent_increments_are_not_lost() {
    let rw = rw().await;
    let mut user = UserFixtures::named(format!("counter-{}", uuid::Uuid::new_v4().simple()));
    user.phone_number = "0".into();
    rw.create(&mut user, Options::new()).await.unwrap();

    let id = user.public_id.as_str();
    let (a, b, c, d) = tokio::join!(bump(&rw, id), bump(&rw, id), bump(&rw, id), bump(&rw, id));
    tracing::info!(retries = a + b + c + d, "concurrent increments finished");

    let user = load(&rw, id).await;
    assert_eq!(user.phone_number, "4");
    assert_eq!(user.version, 5);
}
