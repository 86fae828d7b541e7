//! File source trait and transport implementations.
//!
//! This module defines the `FileSource` trait, the unified interface the
//! sync engine uses to observe and fetch remote documents, regardless of
//! the transport behind it (local directory, SFTP, FTP, ...).

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalDirSource;
#[cfg(feature = "mock")]
pub use self::mock::MockSource;
use crate::error::Result;
use crate::models::RemoteFileInfo;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::PathBuf;
use std::pin::Pin;

type RemoteFileStream<'a> = Pin<Box<dyn Stream<Item = Result<RemoteFileInfo>> + Send + 'a>>;

/// Unified interface for remote document sources.
///
/// A source enumerates the documents currently visible at the remote and
/// hands out local copies of individual entries. It is deliberately narrow:
/// the sync engine owns all decision making, a source only observes and
/// fetches.
///
/// # Listing contract
///
/// `list()` returns only entries whose name ends (case-insensitively) with
/// one of the allowed extensions, and never directories. A listing failure
/// is returned as an error — implementations must NOT degrade it to an
/// empty listing, because the engine treats those two outcomes differently
/// (an outage must not look like "every file was deleted").
///
/// # Download ownership
///
/// `download()` copies one remote entry into a fresh temporary path and
/// returns it. The caller owns that path and is responsible for deleting
/// it on every exit path.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Name of the configured source (used for logging only).
    fn name(&self) -> &str;

    /// The extension allow-list this source filters with. Lowercase,
    /// dot-prefixed (`".pdf"`).
    fn allowed_extensions(&self) -> &[String];

    /// Stream the currently visible entries.
    ///
    /// [`list()`](Self::list) is a convenience wrapper that collects this
    /// stream into a [`Vec`] before returning.
    fn list_stream(&self) -> RemoteFileStream<'_>;

    /// List all currently visible entries.
    async fn list(&self) -> Result<Vec<RemoteFileInfo>> {
        self.list_stream().try_collect().await
    }

    /// Download one entry to a fresh local temporary path.
    ///
    /// The returned path is owned by the caller.
    async fn download(&self, name: &str) -> Result<PathBuf>;
}

/// Case-insensitive extension allow-list check.
///
/// # Examples
///
/// ```
/// use docsink_source::source::has_allowed_extension;
/// let allowed = vec![".pdf".to_string(), ".docx".to_string()];
/// assert!(has_allowed_extension("report.pdf", &allowed));
/// assert!(has_allowed_extension("REPORT.PDF", &allowed));
/// assert!(!has_allowed_extension("notes.txt", &allowed));
/// ```
pub fn has_allowed_extension(name: &str, allowed: &[String]) -> bool {
    let lower = name.to_ascii_lowercase();
    allowed.iter().any(|ext| lower.ends_with(ext.as_str()))
}

/// Normalize a configured extension list: lowercase, dot-prefixed.
pub(crate) fn normalize_extensions(extensions: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    extensions
        .into_iter()
        .map(|ext| {
            let ext = ext.into().to_ascii_lowercase();
            match ext.starts_with('.') {
                true => ext,
                false => format!(".{ext}"),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("report.pdf", true)]
    #[case("REPORT.PDF", true)]
    #[case("archive.tar.pdf", true)]
    #[case("notes.txt", false)]
    #[case("pdf", false)]
    #[case("", false)]
    fn test_extension_filter(#[case] name: &str, #[case] expected: bool) {
        let allowed = vec![".pdf".to_string(), ".doc".to_string(), ".docx".to_string()];
        assert_eq!(has_allowed_extension(name, &allowed), expected);
    }

    #[rstest]
    #[case(vec!["pdf"], vec![".pdf"])]
    #[case(vec![".PDF", "Docx"], vec![".pdf", ".docx"])]
    fn test_normalize_extensions(#[case] input: Vec<&str>, #[case] expected: Vec<&str>) {
        assert_eq!(normalize_extensions(input), expected);
    }
}
