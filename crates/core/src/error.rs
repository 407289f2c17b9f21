use std::io;
use std::result::Result as StdResult;

use thiserror::Error;

/// Errors that can occur in toolscribe
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ScribeError {
    /// Storage layer error (file system, permissions, pool exhaustion).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Analyzer subprocess error (spawn failure, broken pipe, bad exit).
    #[error("Analyzer error: {0}")]
    Analyzer(String),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Requested resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input provided by caller.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO operation error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for toolscribe operations.
pub type Result<T> = StdResult<T, ScribeError>;
