//! Error types shared by every rowkit crate
//!
//! Errors are plain values; nothing in the library panics on bad input.
//! Operations tag the errors they return with their name (`rowkit.Update`,
//! `rowkit.DoTx`, ...) through [`DbError::with_op`], so a rendered message
//! reads like a small stack of the calls that produced it.

use std::fmt;
use thiserror::Error;

/// Boxed error used for caller supplied callbacks and units of work
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classification of a failure reported by the underlying store
///
/// Adapters map their driver errors onto these kinds so that retry
/// predicates can be written without depending on a particular driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// Unique constraint violation
    UniqueViolation,
    /// Foreign key constraint violation
    ForeignKeyViolation,
    /// Check constraint violation
    CheckViolation,
    /// Exclusion constraint violation
    ExclusionViolation,
    /// Transaction could not be serialized against concurrent transactions
    SerializationFailure,
    /// Transaction was chosen as a deadlock victim
    Deadlock,
    /// Connection to the store failed or was lost
    Connection,
    /// No connection became available in time
    PoolExhausted,
    /// Any other statement failure
    Query,
}

impl StoreErrorKind {
    /// Returns true for failures that typically succeed when the whole
    /// transaction is attempted again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreErrorKind::SerializationFailure | StoreErrorKind::Deadlock
        )
    }

    /// Returns true for integrity constraint violations
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StoreErrorKind::UniqueViolation
                | StoreErrorKind::ForeignKeyViolation
                | StoreErrorKind::CheckViolation
                | StoreErrorKind::ExclusionViolation
        )
    }
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoreErrorKind::UniqueViolation => "unique violation",
            StoreErrorKind::ForeignKeyViolation => "foreign key violation",
            StoreErrorKind::CheckViolation => "check violation",
            StoreErrorKind::ExclusionViolation => "exclusion violation",
            StoreErrorKind::SerializationFailure => "serialization failure",
            StoreErrorKind::Deadlock => "deadlock detected",
            StoreErrorKind::Connection => "connection failure",
            StoreErrorKind::PoolExhausted => "connection pool exhausted",
            StoreErrorKind::Query => "query failed",
        };
        f.write_str(s)
    }
}

/// Which write callback failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    /// The `before_write` option
    BeforeWrite,
    /// The `after_write` option
    AfterWrite,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookStage::BeforeWrite => f.write_str("before write"),
            HookStage::AfterWrite => f.write_str("after write"),
        }
    }
}

/// Coarse error category, independent of operation tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller misuse
    InvalidParameter,
    /// Failure reported by the store
    Store(StoreErrorKind),
    /// `do_tx` ran out of attempts
    MaxRetriesExceeded,
    /// A lookup found no row
    RecordNotFound,
    /// Unexpected internal failure
    Internal,
    /// A before/after write callback failed
    Hook(HookStage),
    /// Caller supplied error
    Other,
}

/// Errors returned by rowkit operations
#[derive(Debug, Error)]
pub enum DbError {
    /// The caller passed something unusable
    #[error("{0}: invalid parameter")]
    InvalidParameter(String),

    /// The store rejected a statement
    #[error("{kind}: {message}")]
    Store {
        kind: StoreErrorKind,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The transaction was retried the maximum number of times
    #[error("too many retries: {attempts} of {max}: max retries exceeded")]
    MaxRetriesExceeded { attempts: u32, max: u32 },

    /// No row matched a lookup
    #[error("record not found")]
    RecordNotFound,

    /// Internal failure, e.g. a schema descriptor that cannot convert a value
    #[error("{0}: internal error")]
    Internal(String),

    /// A caller supplied write callback failed
    #[error("error {stage}: {source}")]
    Hook {
        stage: HookStage,
        #[source]
        source: BoxError,
    },

    /// Another error tagged with the operation that returned it
    #[error("{op}: {source}")]
    Op {
        op: &'static str,
        #[source]
        source: Box<DbError>,
    },

    /// Error produced by caller code, e.g. inside a unit of work
    #[error(transparent)]
    Other(BoxError),
}

impl DbError {
    /// Creates an invalid parameter error
    pub fn invalid(message: impl Into<String>) -> Self {
        DbError::InvalidParameter(message.into())
    }

    /// Creates an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        DbError::Internal(message.into())
    }

    /// Creates a store error without an underlying source
    pub fn store(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        DbError::Store {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an arbitrary caller error
    pub fn other(error: impl Into<BoxError>) -> Self {
        DbError::Other(error.into())
    }

    /// Tags this error with the name of the operation returning it
    pub fn with_op(self, op: &'static str) -> Self {
        DbError::Op {
            op,
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping operation tags
    pub fn root(&self) -> &DbError {
        match self {
            DbError::Op { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns the category of this error
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            DbError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            DbError::Store { kind, .. } => ErrorKind::Store(*kind),
            DbError::MaxRetriesExceeded { .. } => ErrorKind::MaxRetriesExceeded,
            DbError::RecordNotFound => ErrorKind::RecordNotFound,
            DbError::Internal(_) => ErrorKind::Internal,
            DbError::Hook { stage, .. } => ErrorKind::Hook(*stage),
            DbError::Other(_) | DbError::Op { .. } => ErrorKind::Other,
        }
    }

    /// Returns the store error kind, if this is a store failure
    pub fn store_kind(&self) -> Option<StoreErrorKind> {
        match self.kind() {
            ErrorKind::Store(kind) => Some(kind),
            _ => None,
        }
    }

    /// Checks if this error indicates caller misuse
    pub fn is_invalid_parameter(&self) -> bool {
        self.kind() == ErrorKind::InvalidParameter
    }

    /// Checks if this error indicates a record was not found
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::RecordNotFound
    }

    /// Checks if `do_tx` gave up after exhausting its retries
    pub fn is_max_retries(&self) -> bool {
        self.kind() == ErrorKind::MaxRetriesExceeded
    }

    /// Returns the caller error wrapped by [`DbError::Other`], if any
    pub fn downcast_other<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self.root() {
            DbError::Other(e) => e.downcast_ref::<E>(),
            _ => None,
        }
    }
}
