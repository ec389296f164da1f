use thiserror::Error;

use super::types::DbState;

#[derive(Error, Debug)]
pub enum DbManagerError {
    #[error("Manager is not initialized")]
    NotInitialized,

    #[error("Manager is not in a ready state (current state: {0})")]
    NotReady(DbState),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Conflicting transaction requirement: {0}")]
    ConflictingTransactionRequirement(String),

    #[error("Conflicting isolation level: {0}")]
    ConflictingIsolationLevel(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Version {version} is out of range [{min}, {max}]")]
    VersionOutOfRange { version: i64, min: i64, max: i64 },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Locator error: {0}")]
    LocatorError(String),

    #[error("Batch failed: {0}")]
    BatchFailed(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/0 error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, DbManagerError>;

impl<T> From<std::sync::PoisonError<T>> for DbManagerError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for DbManagerError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
