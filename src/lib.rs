//! rowkit
//!
//! Retryable transactional writes over relational rows: create, update and
//! delete with field masks, optimistic version checks and upserts, plus
//! [`Rw::do_tx`] for running a unit of work in a transaction that is retried
//! on serialization failures and deadlocks.
//!
//! This crate re-exports the kernel types and the reader/writer. The
//! PostgreSQL adapter lives under [`pg`].
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rowkit::{pg, retry, ExpBackoff, Options, Rw};
//!
//! let store = pg::PgStore::connect(&pg::DatabaseConfig::from_env()?).await?;
//! let rw = Rw::new(Arc::new(store));
//!
//! rw.do_tx(retry::is_transient, 5, &ExpBackoff::new(), |reader, writer| {
//!     Box::pin(async move {
//!         reader.lookup_by_id(&mut account, Options::new()).await?;
//!         account.balance -= amount;
//!         writer
//!             .update(&mut account, &["Balance"], &[], Options::new().version(account.version))
//!             .await?;
//!         Ok(())
//!     })
//! })
//! .await?;
//! ```

pub use rowkit_kernel::*;

pub use rowkit_core::{
    build_update_paths, clear_fields, intersection, retry, update_fields, Intersection,
    RetryInfo, Rw, TxError, TxFuture, WriterConfig,
};

/// PostgreSQL adapter
pub mod pg {
    pub use rowkit_pg::*;
}
