//! Optional transform applied to downloaded documents before upload.
//!
//! The sync engine hashes the INPUT path before preprocessing, so content
//! identity is stable against preprocessor changes; a preprocessor only
//! shapes what the backend receives.

pub mod error;

mod command;
mod identity;

pub use crate::command::CommandPreprocessor;
pub use crate::identity::IdentityPreprocessor;

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Transform one downloaded file into the file that gets uploaded.
///
/// # Ownership
///
/// When the returned path differs from `input`, it is a new path owned by
/// the caller; the input remains owned by the caller too. When the paths
/// are equal (the identity case) nothing new was created.
#[async_trait]
pub trait Preprocessor: Send + Sync {
    /// Name of the configured preprocessor (used for logging only).
    fn name(&self) -> &str;

    /// Transform `input`, returning the path of the result.
    ///
    /// `original_name` is the source file name, for implementations whose
    /// behaviour depends on the document type rather than the temporary
    /// path's random name.
    async fn process(&self, input: &Path, original_name: &str) -> Result<PathBuf>;
}

pub type PreprocessorHandle = Arc<dyn Preprocessor + Send + Sync>;
