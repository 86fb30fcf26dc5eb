//! Error types for code extraction and lookup.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmsError {
    /// The record store failed to read or write.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for SMS operations.
pub type SmsResult<T> = Result<T, SmsError>;
