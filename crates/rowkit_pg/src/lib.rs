//! PostgreSQL adapter for rowkit
//!
//! Renders rowkit statements to PostgreSQL SQL and runs them through a SQLx
//! connection pool. Driver errors are classified into
//! [`StoreErrorKind`](rowkit_kernel::StoreErrorKind)s so serialization
//! failures and deadlocks can be retried by `do_tx`.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rowkit_pg::{DatabaseConfig, PgStore};
//!
//! let store = PgStore::connect(&DatabaseConfig::from_env()?).await?;
//! let rw = rowkit_core::Rw::new(Arc::new(store));
//! ```

pub mod error;
pub mod pool;
pub mod sql;
pub mod store;

pub use error::{classify, store_error};
pub use pool::{create_pool, DatabaseConfig};
pub use store::{PgStore, PgTransaction};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes a `tracing` subscriber for applications using rowkit
///
/// `RUST_LOG` takes precedence over `default_level`. Does nothing when a
/// global subscriber is already installed.
///
/// # Arguments
///
/// * `default_level` - Filter used when `RUST_LOG` is unset, e.g. "info" or "rowkit_core=debug"
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();
}
