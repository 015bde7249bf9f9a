//! Retry predicates for [`Rw::do_tx`](crate::Rw::do_tx)

use rowkit_kernel::DbError;

/// Retries serialization failures and deadlocks
///
/// Everything else, including constraint violations and caller errors,
/// is treated as fatal.
pub fn is_transient(err: &DbError) -> bool {
    err.store_kind().is_some_and(|kind| kind.is_transient())
}

/// Never retries
pub fn never(_err: &DbError) -> bool {
    false
}
