//! Reader/writer and transaction executor
//!
//! [`Rw`] implements the [`Reader`](rowkit_kernel::Reader) and
//! [`Writer`](rowkit_kernel::Writer) ports over any
//! [`Store`](rowkit_kernel::Store): creates with optional upsert handling,
//! field mask updates guarded by an optional optimistic version check,
//! deletes, and [`Rw::do_tx`] for running a unit of work in a transaction
//! that is retried on transient failures.

pub mod config;
pub mod conflict;
pub mod do_tx;
pub mod field_mask;
pub mod retry;
pub mod rw;

pub use config::WriterConfig;
pub use do_tx::{RetryInfo, TxError, TxFuture};
pub use field_mask::{build_update_paths, intersection, update_fields, Intersection};
pub use rw::{clear_fields, Rw};
