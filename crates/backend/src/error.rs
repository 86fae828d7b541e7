//! Backend Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A backend error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for backend operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally. `Busy` is the one the sync engine is built around: the
/// backend is processing and will accept the same request later, so the
/// operation moves to a pending queue instead of the failure log.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The backend is processing; retry the operation later
    #[display("backend busy")]
    Busy,
    /// Transport-level failure (connect, timeout, TLS, ...)
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The backend answered but refused the request
    #[display("backend rejected request: {_0}")]
    Rejected(#[error(not(source))] String),
    /// The backend answered something this client cannot interpret
    #[display("malformed backend response: {_0}")]
    Protocol(#[error(not(source))] String),
    /// Underlying I/O error (reading the file to upload)
    #[display("I/O error: {_0}")]
    Io(IoError),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` for the distinguished transient-busy condition.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy)
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::Network(_) | Self::Io(_))
    }
}
