//! Engine Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. The engine mostly *handles* errors
//! (per-file problems never abort a tick); what propagates out of here is
//! either the distinguished busy condition or a genuinely fatal failure.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The backend reported busy; defer and retry
    #[display("backend busy")]
    Busy,
    /// The file source failed (listing or download)
    #[display("source transport failed")]
    Source,
    /// A backend request failed
    #[display("backend request failed")]
    Backend,
    /// The preprocessor failed or timed out
    #[display("preprocessing failed")]
    Preprocess,
    /// The durable state or failure log could not be written
    #[display("state persistence failed")]
    Ledger,
    /// Underlying I/O error (temp file shuffling)
    #[display("I/O error: {_0}")]
    Io(IoError),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` for the deferred-delete condition.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy)
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Ledger)
    }

    /// Convert a backend error, preserving its `Exn` frame as a child and
    /// keeping the busy condition distinguishable.
    #[track_caller]
    pub(crate) fn backend(err: docsink_backend::error::Error) -> Error {
        match (*err).is_busy() {
            true => err.raise(ErrorKind::Busy),
            false => err.raise(ErrorKind::Backend),
        }
    }

    #[track_caller]
    pub(crate) fn source(err: docsink_source::error::Error) -> Error {
        err.raise(ErrorKind::Source)
    }

    #[track_caller]
    pub(crate) fn preprocess(err: docsink_preprocess::error::Error) -> Error {
        err.raise(ErrorKind::Preprocess)
    }

    #[track_caller]
    pub(crate) fn ledger(err: docsink_ledger::error::Error) -> Error {
        err.raise(ErrorKind::Ledger)
    }
}
