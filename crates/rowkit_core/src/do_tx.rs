//! Retrying transaction executor

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rowkit_kernel::{Backoff, DbError, Reader, Writer};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::rw::{Rw, Underlying};

const OP: &str = "rowkit.DoTx";

/// Future returned by a unit of work passed to [`Rw::do_tx`]
pub type TxFuture<'a> = Pin<Box<dyn Future<Output = Result<(), DbError>> + Send + 'a>>;

/// Retry statistics for one [`Rw::do_tx`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryInfo {
    /// Number of attempts that were rolled back and retried
    pub retries: u32,
    /// Total time slept between attempts
    pub backoff: Duration,
}

/// A failed [`Rw::do_tx`] call
///
/// Carries the retry statistics gathered before the failure.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct TxError {
    pub info: RetryInfo,
    #[source]
    pub error: DbError,
}

impl TxError {
    fn new(info: RetryInfo, error: DbError) -> Self {
        Self {
            info,
            error: error.with_op(OP),
        }
    }

    /// Checks if the call gave up after exhausting its retries
    pub fn is_max_retries(&self) -> bool {
        self.error.is_max_retries()
    }
}

impl From<TxError> for DbError {
    fn from(err: TxError) -> Self {
        err.error
    }
}

impl Rw {
    /// Runs `handler` inside a transaction, retrying it when it fails with
    /// an error `retry_on` accepts
    ///
    /// Every attempt gets a fresh transaction and a reader/writer bound to
    /// it. A successful attempt is committed; a failed one is rolled back
    /// before the error is classified. Retryable failures sleep for
    /// `backoff.duration(attempt)` and try again, up to `retries + 1`
    /// attempts in total. The handler may run several times, so anything it
    /// writes should be rebuilt inside the closure.
    ///
    /// The sleep between attempts always runs to completion; dropping the
    /// returned future is the only way to abandon it.
    ///
    /// # Arguments
    ///
    /// * `retry_on` - Classifies handler errors as retryable
    /// * `retries` - Number of retries after the first attempt
    /// * `backoff` - Delay policy between attempts
    /// * `handler` - The unit of work
    ///
    /// # Returns
    ///
    /// The retry statistics, or a [`TxError`] holding the statistics and the
    /// error that ended the call. A commit failure is returned without
    /// retrying, as is a rollback failure, which masks the handler error.
    pub async fn do_tx<P, F>(
        &self,
        retry_on: P,
        retries: u32,
        backoff: &dyn Backoff,
        mut handler: F,
    ) -> Result<RetryInfo, TxError>
    where
        P: Fn(&DbError) -> bool + Send + Sync,
        F: for<'a> FnMut(&'a dyn Reader, &'a dyn Writer) -> TxFuture<'a> + Send,
    {
        let store = match &self.underlying {
            Some(Underlying::Store(store)) => store.clone(),
            Some(Underlying::Tx(_)) => {
                return Err(TxError::new(
                    RetryInfo::default(),
                    DbError::invalid("already inside a transaction"),
                ))
            }
            None => {
                return Err(TxError::new(
                    RetryInfo::default(),
                    DbError::invalid("missing underlying db"),
                ))
            }
        };
        let max_attempts = retries.saturating_add(1);

        let mut info = RetryInfo::default();
        let mut attempt: u32 = 1;
        loop {
            if attempt > max_attempts {
                return Err(TxError::new(
                    info,
                    DbError::MaxRetriesExceeded {
                        attempts: attempt - 1,
                        max: max_attempts,
                    },
                ));
            }
            debug!(attempt, max_attempts, "beginning transaction");

            let tx = store.begin().await.map_err(|e| TxError::new(info, e))?;
            let tx_rw = self.bound_to(tx.clone());
            let reader: &dyn Reader = &tx_rw;
            let writer: &dyn Writer = &tx_rw;

            match handler(reader, writer).await {
                Ok(()) => {
                    if let Err(err) = tx.commit().await {
                        if let Err(rollback_err) = tx.rollback().await {
                            return Err(TxError::new(info, rollback_err));
                        }
                        return Err(TxError::new(info, err));
                    }
                    debug!(attempt, retries = info.retries, "transaction committed");
                    return Ok(info);
                }
                Err(err) => {
                    tx.rollback().await.map_err(|e| TxError::new(info, e))?;
                    if !retry_on(&err) {
                        return Err(TxError::new(info, err));
                    }
                    let delay = backoff.duration(attempt);
                    info.retries += 1;
                    info.backoff += delay;
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying transaction"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
