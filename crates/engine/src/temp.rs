//! Scoped ownership for temporary files.
//!
//! Every temporary path in the upload pipeline has exactly one owner. A
//! [`TempGuard`] deletes its path when dropped; `disarm()` is the explicit
//! ownership-transfer point (after a rename has moved the file, or when a
//! path is handed to another owner).

use std::path::{Path, PathBuf};

/// An owned temporary path, deleted on drop unless disarmed.
#[derive(Debug)]
pub(crate) struct TempGuard(Option<PathBuf>);

impl TempGuard {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self(Some(path))
    }

    pub(crate) fn path(&self) -> &Path {
        self.0.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Give up ownership: the path will NOT be deleted on drop.
    pub(crate) fn disarm(mut self) -> PathBuf {
        self.0.take().unwrap_or_default()
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            // Removal is best effort; the file may already have been moved.
            let _ = std::fs::remove_file(path);
        }
    }
}
