//! Local directory source transport.
//!
//! Watches a directory on the local filesystem. Useful on its own (mirror a
//! mounted share into the backend) and as the reference transport for the
//! `FileSource` contract.

use async_stream::try_stream;
use async_trait::async_trait;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use super::{FileSource, RemoteFileStream, has_allowed_extension, normalize_extensions};
use crate::error::{ErrorKind, Result};
use crate::models::RemoteFileInfo;
use crate::name::validate as validate_name;

/// Source reading documents from a local directory.
///
/// Only the top level of the directory is observed; subdirectories are
/// skipped, matching the "one source directory" scope of the daemon.
///
/// # Examples
///
/// ```no_run
/// use docsink_source::source::LocalDirSource;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let source = LocalDirSource::new("inbox", "/srv/docs", ["pdf", "docx"])?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalDirSource {
    name: String,
    root: PathBuf,
    allowed_extensions: Vec<String>,
}
impl LocalDirSource {
    /// Create a new local directory source.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not an absolute path.
    pub fn new(
        name: impl Into<String>,
        root: impl AsRef<Path>,
        allowed_extensions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::Listing(format!(
                "source root must be an absolute path: {}",
                root.display()
            )));
        }
        Ok(Self {
            name: name.into(),
            root: root.to_path_buf(),
            allowed_extensions: normalize_extensions(allowed_extensions),
        })
    }

    fn entry_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl FileSource for LocalDirSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    fn list_stream(&self) -> RemoteFileStream<'_> {
        Box::pin(try_stream! {
            let mut entries = tokio::fs::read_dir(&self.root).await.map_err(ErrorKind::Io)?;
            while let Some(entry) = entries.next_entry().await.map_err(ErrorKind::Io)? {
                let file_type = entry.file_type().await.map_err(ErrorKind::Io)?;
                if !file_type.is_file() {
                    continue;
                }
                let Ok(name) = entry.file_name().into_string() else {
                    tracing::warn!(source = %self.name, entry = %entry.path().display(), "Skipping non-UTF-8 file name");
                    continue;
                };
                if !has_allowed_extension(&name, &self.allowed_extensions) {
                    continue;
                }
                let metadata = entry.metadata().await.map_err(ErrorKind::Io)?;
                let modified = metadata.modified().map_err(ErrorKind::Io)?;
                let millis = modified
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(0);
                yield RemoteFileInfo::new(name, millis);
            }
        })
    }

    async fn download(&self, name: &str) -> Result<PathBuf> {
        let src = self.entry_path(name)?;
        let temp = tempfile::Builder::new()
            .prefix("docsink-")
            .tempfile()
            .map_err(ErrorKind::Io)?;
        match tokio::fs::copy(&src, temp.path()).await {
            Ok(_) => {},
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                exn::bail!(ErrorKind::NotFound(name.to_string()));
            },
            Err(e) => Err(ErrorKind::Io(e))?,
        }
        // Ownership of the temporary file transfers to the caller here.
        let (_file, path) = temp
            .keep()
            .map_err(|e| ErrorKind::Io(e.error))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_for(dir: &Path) -> LocalDirSource {
        LocalDirSource::new("test", dir, ["pdf", ".docx"]).unwrap()
    }

    #[test]
    fn test_new_requires_absolute_root() {
        assert!(LocalDirSource::new("x", "/absolute", ["pdf"]).is_ok());
        assert!(LocalDirSource::new("x", "relative/dir", ["pdf"]).is_err());
    }

    #[tokio::test]
    async fn test_list_filters_extensions_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"a").unwrap();
        std::fs::write(dir.path().join("b.PDF"), b"b").unwrap();
        std::fs::write(dir.path().join("c.txt"), b"c").unwrap();
        std::fs::create_dir(dir.path().join("sub.pdf")).unwrap();

        let listing = source_for(dir.path()).list().await.unwrap();
        let mut names: Vec<_> = listing.iter().map(|f| f.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, ["a.pdf", "b.PDF"]);
    }

    #[tokio::test]
    async fn test_list_reports_modified_times() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"a").unwrap();
        let listing = source_for(dir.path()).list().await.unwrap();
        assert_eq!(listing.len(), 1);
        assert!(listing[0].last_modified_millis > 0);
    }

    #[tokio::test]
    async fn test_list_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("nope");
        let source = source_for(&gone);
        assert!(source.list().await.is_err());
    }

    #[tokio::test]
    async fn test_download_copies_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"payload").unwrap();
        let source = source_for(dir.path());

        let path = source.download("a.pdf").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
        // The copy is independent of the original.
        assert_ne!(path, dir.path().join("a.pdf"));
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_download_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_for(dir.path());
        let err = source.download("nope.pdf").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_download_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_for(dir.path());
        assert!(source.download("../escape.pdf").await.is_err());
        assert!(source.download("sub/escape.pdf").await.is_err());
    }
}
