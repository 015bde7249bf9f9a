//! Classification of SQLx errors
//!
//! Driver failures become [`DbError::Store`] values whose kind is derived
//! from the PostgreSQL SQLSTATE code, so retry predicates never have to look
//! at driver types.

use rowkit_kernel::{DbError, StoreErrorKind};

/// Maps a SQLSTATE code onto a store error kind
///
/// See <https://www.postgresql.org/docs/current/errcodes-appendix.html>.
pub fn kind_for_code(code: &str) -> StoreErrorKind {
    match code {
        "23505" => StoreErrorKind::UniqueViolation,
        "23503" => StoreErrorKind::ForeignKeyViolation,
        "23514" => StoreErrorKind::CheckViolation,
        "23P01" => StoreErrorKind::ExclusionViolation,
        "40001" => StoreErrorKind::SerializationFailure,
        "40P01" => StoreErrorKind::Deadlock,
        c if c.starts_with("08") => StoreErrorKind::Connection,
        _ => StoreErrorKind::Query,
    }
}

/// Classifies an SQLx error
pub fn classify(error: &sqlx::Error) -> StoreErrorKind {
    match error {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .map_or(StoreErrorKind::Query, |code| kind_for_code(code.as_ref())),
        sqlx::Error::PoolTimedOut => StoreErrorKind::PoolExhausted,
        sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => StoreErrorKind::Connection,
        _ => StoreErrorKind::Query,
    }
}

/// Converts an SQLx error into a store error, keeping it as the source
pub fn store_error(error: sqlx::Error) -> DbError {
    let message = match &error {
        sqlx::Error::Database(db_err) => db_err.message().to_string(),
        other => other.to_string(),
    };
    DbError::Store {
        kind: classify(&error),
        message,
        source: Some(Box::new(error)),
    }
}
