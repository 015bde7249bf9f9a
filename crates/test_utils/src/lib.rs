//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! rowkit test suite.
//!
//! # Modules
//!
//! - `memory`: In-memory store implementing the store and transaction ports
//! - `models`: Test record types backed by the `db_test_*` tables
//! - `fixtures`: Pre-built test data
//! - `builders`: Builder patterns for test data construction
//! - `database`: PostgreSQL container management
//! - `assertions`: Assertion helpers for errors and rows
//! - `generators`: Property-based test data generators

pub mod assertions;
pub mod builders;
pub mod database;
pub mod fixtures;
pub mod generators;
pub mod memory;
pub mod models;

pub use assertions::*;
pub use builders::*;
pub use database::*;
pub use fixtures::*;
pub use generators::*;
pub use memory::{MemoryStore, MemoryTransaction};
pub use models::*;

use tracing_subscriber::EnvFilter;

/// Installs a test-friendly `tracing` subscriber once per process
///
/// Output goes through the test writer so it is captured per test.
/// `RUST_LOG` controls the filter, defaulting to `debug` for the rowkit
/// crates.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rowkit_core=debug,rowkit_pg=debug,warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
