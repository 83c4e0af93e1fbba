//! Error types for the backup pipeline.

use common::StorageError;

/// Errors that can occur while running a backup pipeline.
#[derive(Debug, Clone)]
pub enum Error {
    /// The upstream ended before yielding a single record.
    ExpectedStartOfSource,
    /// An internal stream invariant was violated; carries a diagnostic
    /// snapshot of the offending state.
    UnhandledStreamCase(String),
    /// The storage backend refused or failed an operation after exhausting
    /// its own retries.
    Storage(String),
    /// The upstream consumer failed to deliver or commit.
    Source(String),
    /// The configuration is invalid.
    Config(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ExpectedStartOfSource => {
                write!(f, "expected at least one record from the upstream source")
            }
            Error::UnhandledStreamCase(msg) => write!(f, "unhandled stream case: {}", msg),
            Error::Storage(msg) => write!(f, "storage failure: {}", msg),
            Error::Source(msg) => write!(f, "source failure: {}", msg),
            Error::Config(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::Storage(e.to_string())
    }
}

/// Result type for backup operations.
pub type Result<T> = std::result::Result<T, Error>;
