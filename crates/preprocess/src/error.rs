//! Preprocess Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A preprocess error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for preprocess operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The configured command could not be found or started
    #[display("preprocessor command not runnable: {_0}")]
    Spawn(#[error(not(source))] String),
    /// The command ran but exited non-zero
    #[display("preprocessor exited with code {_0}")]
    Exit(#[error(not(source))] i32),
    /// The command exceeded its configured timeout
    #[display("preprocessor timed out after {_0}s")]
    Timeout(#[error(not(source))] u64),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Every preprocessing failure is treated as per-file transient by the
    /// engine: the file is retried on the next tick.
    pub fn is_retryable(&self) -> bool {
        true
    }
}
