/// datarail Error Module
///
/// This module defines the error taxonomy for the runtime. Every fallible
/// operation returns `DataError`; callers that only care about the category
/// of a failure can match on `DataError::kind()` instead of the payload.
use thiserror::Error;

/// Comprehensive error type for the data-access runtime.
///
/// The variants cover:
/// - Executor lifecycle (closed executors, missing handlers)
/// - Transaction protocol and transaction I/O failures
/// - Statement preparation and query execution
/// - Result set capability mismatches
/// - Result mapping / value conversion
/// - Cancellation, configuration and driver-level errors
#[derive(Error, Debug)]
pub enum DataError {
    /// Operation attempted after the executor was closed
    #[error("21003 - executor was closed when {0}")]
    ExecutorClosed(&'static str),

    /// The transaction has no handler to hand out
    #[error("21004 - executor get handler error")]
    HandlerUnavailable,

    /// Begin attempted while a transaction is already in progress
    #[error("22000 - transaction already begun")]
    TransactionAlreadyBegun,

    /// Commit or rollback attempted without a successful begin
    #[error("22001 - transaction without begin")]
    TransactionWithoutBegin,

    /// Underlying commit call failed
    #[error("22002 - transaction commit error: {0}")]
    TransactionCommit(#[source] Box<DataError>),

    /// Error returned by a transaction success callback
    #[error("22003 - business error in transaction: {0}")]
    Callback(String),

    /// Underlying begin call failed
    #[error("22004 - transaction begin error: {0}")]
    TransactionBegin(#[source] Box<DataError>),

    /// Underlying rollback call failed
    #[error("22005 - transaction rollback error: {0}")]
    TransactionRollback(#[source] Box<DataError>),

    /// Statement preparation failed
    #[error("23001 - prepare error: {0}")]
    Prepare(#[source] Box<DataError>),

    /// Query execution failed
    #[error("24001 - query error: {0}")]
    Query(#[source] Box<DataError>),

    /// Write execution failed
    #[error("24002 - execute error: {0}")]
    Execute(#[source] Box<DataError>),

    /// Capability not offered by this kind of result
    #[error("25000 - not supported: {0}")]
    Unsupported(&'static str),

    /// A raw value could not be coerced into the destination type
    #[error("25001 - cannot convert {value} into {target}")]
    Conversion { target: &'static str, value: String },

    /// Scan buffer length does not match the column count
    #[error("25002 - column count mismatch: expected {expected}, got {actual}")]
    ColumnMismatch { expected: usize, actual: usize },

    /// The context was cancelled before the operation ran
    #[error("26001 - context cancelled")]
    Cancelled,

    /// The context deadline passed before the operation ran
    #[error("26002 - context deadline exceeded")]
    DeadlineExceeded,

    /// Configuration loading and validation errors
    #[error("27001 - configuration error: {0}")]
    Config(String),

    /// Errors from the SQLite driver
    #[error("28001 - database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system and I/O errors
    #[error("28002 - I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding and decoding errors
    #[error("28003 - JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML decoding errors
    #[error("28004 - TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Category of a `DataError`, independent of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ExecutorClosed,
    HandlerUnavailable,
    TransactionProtocolViolation,
    TransactionIoFailure,
    /// A success callback rejected a finished transaction
    CallbackFailure,
    StatementPrepareFailure,
    QueryExecuteFailure,
    UnsupportedResultOperation,
    MappingFailure,
    Cancelled,
    Config,
    Driver,
}

impl DataError {
    /// Returns the taxonomy category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DataError::ExecutorClosed(_) => ErrorKind::ExecutorClosed,
            DataError::HandlerUnavailable => ErrorKind::HandlerUnavailable,
            DataError::TransactionAlreadyBegun | DataError::TransactionWithoutBegin => {
                ErrorKind::TransactionProtocolViolation
            }
            DataError::TransactionBegin(_)
            | DataError::TransactionCommit(_)
            | DataError::TransactionRollback(_) => ErrorKind::TransactionIoFailure,
            DataError::Callback(_) => ErrorKind::CallbackFailure,
            DataError::Prepare(_) => ErrorKind::StatementPrepareFailure,
            DataError::Query(_) | DataError::Execute(_) => ErrorKind::QueryExecuteFailure,
            DataError::Unsupported(_) => ErrorKind::UnsupportedResultOperation,
            DataError::Conversion { .. } | DataError::ColumnMismatch { .. } => {
                ErrorKind::MappingFailure
            }
            DataError::Cancelled | DataError::DeadlineExceeded => ErrorKind::Cancelled,
            DataError::Config(_) | DataError::Toml(_) => ErrorKind::Config,
            DataError::Database(_) | DataError::Io(_) | DataError::Json(_) => ErrorKind::Driver,
        }
    }

    /// Returns the stable five digit code that prefixes the message.
    pub fn code(&self) -> String {
        self.to_string().chars().take(5).collect()
    }

    pub(crate) fn conversion(target: &'static str, value: impl std::fmt::Debug) -> Self {
        DataError::Conversion {
            target,
            value: format!("{:?}", value),
        }
    }
}

/// Type alias for Result to use DataError as the error type.
pub type Result<T> = std::result::Result<T, DataError>;
