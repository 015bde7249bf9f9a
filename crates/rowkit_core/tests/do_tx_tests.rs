//! Retrying transaction executor against the in-memory store

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use rowkit_core::{retry, RetryInfo, Rw};
use rowkit_kernel::{ConstBackoff, DbError, ExpBackoff, Options, StoreErrorKind, Value, Writer};
use test_utils::{
    assert_error_message, assert_store_error, MemoryStore, TestUser, UserFixtures,
};

fn setup() -> (MemoryStore, Rw) {
    test_utils::init_tracing();
    let store = MemoryStore::new();
    let rw = Rw::new(Arc::new(store.clone()));
    (store, rw)
}

#[tokio::test(start_paused = true)]
async fn test_succeeds_on_third_attempt() {
    let (store, rw) = setup();
    store.fail_next_executes(StoreErrorKind::Deadlock, 2);
    let calls = Arc::new(AtomicU32::new(0));

    let handler_calls = calls.clone();
    let info = rw
        .do_tx(
            retry::is_transient,
            5,
            &ConstBackoff::from_millis(50),
            move |_, writer| {
                handler_calls.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    let mut user = UserFixtures::alice();
                    writer.create(&mut user, Options::new()).await?;
                    Ok(())
                })
            },
        )
        .await
        .unwrap();

    assert_eq!(
        info,
        RetryInfo {
            retries: 2,
            backoff: Duration::from_millis(100),
        }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(store.begins(), 3);
    assert_eq!(store.rollbacks(), 2);
    assert_eq!(store.commits(), 1);
    assert_eq!(store.row_count("db_test_user"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exponential_backoff_is_recorded() {
    let (store, rw) = setup();
    store.fail_next_executes(StoreErrorKind::SerializationFailure, 2);

    let info = rw
        .do_tx(
            retry::is_transient,
            3,
            &ExpBackoff::with_fixed_jitter(0.5),
            |_, writer| {
                Box::pin(async move {
                    writer.create(&mut UserFixtures::alice(), Options::new()).await?;
                    Ok(())
                })
            },
        )
        .await
        .unwrap();

    // 10ms after the first attempt, 20ms after the second
    assert_eq!(info.retries, 2);
    assert_eq!(info.backoff, Duration::from_millis(30));
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_budget() {
    let (store, rw) = setup();
    store.fail_next_executes(StoreErrorKind::Deadlock, 100);

    let err = rw
        .do_tx(retry::is_transient, 2, &ConstBackoff::default(), |_, writer| {
            Box::pin(async move {
                writer.create(&mut UserFixtures::alice(), Options::new()).await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert!(err.is_max_retries());
    assert_eq!(err.info.retries, 3);
    assert_error_message(
        &err.error,
        "rowkit.DoTx: too many retries: 3 of 3: max retries exceeded",
    );
    assert_eq!(store.begins(), 3);
    assert_eq!(store.row_count("db_test_user"), 0);
}

#[tokio::test]
async fn test_fatal_error_rolls_back_attempt() {
    let (store, rw) = setup();
    let mut existing = UserFixtures::alice();
    rw.create(&mut existing, Options::new()).await.unwrap();

    let taken_id = existing.public_id.clone();
    let err = rw
        .do_tx(retry::is_transient, 3, &ConstBackoff::default(), move |_, writer| {
            let taken_id = taken_id.clone();
            Box::pin(async move {
                writer.create(&mut UserFixtures::alice(), Options::new()).await?;
                let mut duplicate = UserFixtures::named("duplicate");
                duplicate.public_id = taken_id;
                writer.create(&mut duplicate, Options::new()).await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert_store_error(&err.error, StoreErrorKind::UniqueViolation);
    assert!(err
        .to_string()
        .starts_with("rowkit.DoTx: rowkit.Create: unique violation"));
    assert_eq!(err.info, RetryInfo::default());
    assert_eq!(store.rollbacks(), 1);
    // the first insert of the attempt was rolled back too
    assert_eq!(store.row_count("db_test_user"), 1);
}

#[tokio::test]
async fn test_caller_error_passes_through() {
    #[derive(Debug, thiserror::Error)]
    #[error("insufficient funds")]
    struct InsufficientFunds;

    let (_, rw) = setup();
    let err = rw
        .do_tx(retry::is_transient, 3, &ConstBackoff::default(), |_, _| {
            Box::pin(async { Err(DbError::other(InsufficientFunds)) })
        })
        .await
        .unwrap_err();
    assert!(err.error.downcast_other::<InsufficientFunds>().is_some());
    assert_eq!(err.info.retries, 0);
}

#[tokio::test]
async fn test_commit_failure_is_not_retried() {
    let (store, rw) = setup();
    store.fail_next_commits(StoreErrorKind::SerializationFailure, 1);

    let err = rw
        .do_tx(retry::is_transient, 3, &ConstBackoff::default(), |_, writer| {
            Box::pin(async move {
                writer.create(&mut UserFixtures::alice(), Options::new()).await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert_store_error(&err.error, StoreErrorKind::SerializationFailure);
    assert_eq!(store.begins(), 1);
    assert_eq!(store.commits(), 0);
    assert_eq!(store.row_count("db_test_user"), 0);
}

#[tokio::test]
async fn test_concurrent_write_fails_commit() {
    let (store, rw) = setup();
    let outside = rw.clone();

    let err = rw
        .do_tx(retry::is_transient, 3, &ConstBackoff::default(), move |_, writer| {
            let outside = outside.clone();
            Box::pin(async move {
                writer.create(&mut UserFixtures::alice(), Options::new()).await?;
                // lands while the transaction is still open
                outside
                    .create(&mut UserFixtures::alice(), Options::new())
                    .await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert_error_message(
        &err.error,
        "rowkit.DoTx: serialization failure: could not serialize access due to concurrent update",
    );
    assert_eq!(store.begins(), 1);
    assert_eq!(store.row_count("db_test_user"), 1);
}

#[tokio::test]
async fn test_rollback_failure_masks_handler_error() {
    let (store, rw) = setup();
    store.fail_next_executes(StoreErrorKind::Deadlock, 1);
    store.fail_next_rollbacks(1);

    let err = rw
        .do_tx(retry::is_transient, 3, &ConstBackoff::default(), |_, writer| {
            Box::pin(async move {
                writer.create(&mut UserFixtures::alice(), Options::new()).await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert_store_error(&err.error, StoreErrorKind::Connection);
    assert_eq!(store.begins(), 1);
}

#[tokio::test]
async fn test_handler_reads_its_own_writes() {
    let (store, rw) = setup();

    rw.do_tx(retry::never, 0, &ConstBackoff::default(), |reader, writer| {
        Box::pin(async move {
            let mut user = UserFixtures::alice();
            writer.create(&mut user, Options::new()).await?;

            let mut found = TestUser::with_public_id(user.public_id.clone());
            reader.lookup_by_id(&mut found, Options::new()).await?;
            found.email = "changed@example.com".into();
            let rows = writer
                .update(&mut found, &["Email"], &[], Options::new().version(1))
                .await?;
            assert_eq!(rows, 1);
            Ok(())
        })
    })
    .await
    .unwrap();

    let rows = store.rows("db_test_user");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["email"], Value::from("changed@example.com"));
    assert_eq!(rows[0]["version"], Value::Int(2));
}

#[tokio::test]
async fn test_nested_call_rejected() {
    let (store, rw) = setup();
    let tx = rw.begin().await.unwrap();

    let err = tx
        .do_tx(retry::never, 0, &ConstBackoff::default(), |_, _| {
            Box::pin(async { Ok(()) })
        })
        .await
        .unwrap_err();
    assert_error_message(
        &err.error,
        "rowkit.DoTx: already inside a transaction: invalid parameter",
    );
    tx.rollback().await.unwrap();
    assert_eq!(store.begins(), 1);
}

#[tokio::test]
async fn test_error_converts_for_question_mark() {
    async fn transfer(rw: &Rw) -> Result<(), DbError> {
        rw.do_tx(retry::never, 0, &ConstBackoff::default(), |_, _| {
            Box::pin(async { Err(DbError::invalid("amount must be positive")) })
        })
        .await?;
        Ok(())
    }

    let (_, rw) = setup();
    let err = transfer(&rw).await.unwrap_err();
    assert_error_message(
        &err,
        "rowkit.DoTx: amount must be positive: invalid parameter",
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_retry_accounting(retries in 0u32..4, failures in 0u32..7) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let (store, rw) = setup();
            store.fail_next_executes(StoreErrorKind::Deadlock, failures);

            let result = rw
                .do_tx(retry::is_transient, retries, &ConstBackoff::default(), |_, writer| {
                    Box::pin(async move {
                        writer.create(&mut UserFixtures::alice(), Options::new()).await?;
                        Ok(())
                    })
                })
                .await;

            let attempts = failures.min(retries + 1) + u32::from(failures <= retries);
            prop_assert_eq!(store.begins(), attempts);
            match result {
                Ok(info) => {
                    prop_assert!(failures <= retries);
                    prop_assert_eq!(info.retries, failures);
                    prop_assert_eq!(store.row_count("db_test_user"), 1);
                }
                Err(err) => {
                    prop_assert!(failures > retries);
                    prop_assert!(err.is_max_retries());
                    prop_assert_eq!(err.info.retries, retries + 1);
                    prop_assert_eq!(store.row_count("db_test_user"), 0);
                }
            }
            Ok(())
        })?;
    }
}
