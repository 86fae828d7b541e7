//! In-memory file source for testing.

use async_stream::try_stream;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{FileSource, RemoteFileStream, has_allowed_extension, normalize_extensions};
use crate::error::{ErrorKind, Result};
use crate::models::RemoteFileInfo;
use crate::name::validate as validate_name;

/// In-memory file source for testing.
///
/// Files live in a `HashMap` behind a [`RwLock`], so all trait methods
/// operate on `&self` without external synchronisation. Ideal for sync
/// engine tests that script create/update/delete events without touching
/// a real transport.
///
/// # Examples
///
/// ```
/// use docsink_source::source::{FileSource, MockSource};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = MockSource::with_files([("a.pdf", 100, b"content".as_slice())]);
/// assert_eq!(source.list().await?.len(), 1);
///
/// source.put("b.pdf", 200, b"more");
/// source.remove("a.pdf");
/// assert_eq!(source.list().await?[0].name, "b.pdf");
/// # Ok(())
/// # }
/// ```
pub struct MockSource {
    name: String,
    allowed_extensions: Vec<String>,
    files: RwLock<HashMap<String, (i64, Vec<u8>)>>,
    fail_listing: AtomicBool,
}

impl MockSource {
    /// Create a mock source pre-populated with `(name, mtime_millis, bytes)`
    /// entries.
    ///
    /// Panics if any name fails validation. If test setup is wrong, then
    /// test should not pass.
    pub fn with_files(
        files: impl IntoIterator<Item = (impl Into<String>, i64, impl Into<Vec<u8>>)>,
    ) -> Self {
        let mut map = HashMap::new();
        for (name, mtime, data) in files {
            let name = name.into();
            if validate_name(&name).is_err() {
                // The panic here is DELIBERATE. MockSource is intended to be
                // used in tests; panics are expected. There is no error result.
                panic!("MockSource::with_files: invalid name {name:?}");
            }
            map.insert(name, (mtime, data.into()));
        }
        Self {
            name: "mock".to_string(),
            allowed_extensions: normalize_extensions([".pdf", ".doc", ".docx"]),
            files: RwLock::new(map),
            fail_listing: AtomicBool::new(false),
        }
    }

    /// Change the name of the mock source.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace the extension allow-list.
    pub fn with_extensions(mut self, extensions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_extensions = normalize_extensions(extensions);
        self
    }

    /// Insert or replace a file. Uses `try_write` so it can be called from
    /// non-async test setup; panics if the lock is contended.
    pub fn put(&self, name: impl Into<String>, mtime_millis: i64, data: impl Into<Vec<u8>>) {
        self.files
            .try_write()
            .expect("MockSource::put: lock contended")
            .insert(name.into(), (mtime_millis, data.into()));
    }

    /// Remove a file, simulating a source-side delete.
    pub fn remove(&self, name: &str) {
        self.files
            .try_write()
            .expect("MockSource::remove: lock contended")
            .remove(name);
    }

    /// Bump a file's mtime without changing content.
    pub fn touch(&self, name: &str, mtime_millis: i64) {
        if let Some(entry) = self
            .files
            .try_write()
            .expect("MockSource::touch: lock contended")
            .get_mut(name)
        {
            entry.0 = mtime_millis;
        }
    }

    /// Make every subsequent `list` fail (until cleared), simulating a
    /// transport outage.
    pub fn set_listing_fails(&self, fails: bool) {
        self.fail_listing.store(fails, Ordering::SeqCst);
    }
}

impl Default for MockSource {
    fn default() -> Self {
        let files: [(&str, i64, &[u8]); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl FileSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    fn list_stream(&self) -> RemoteFileStream<'_> {
        Box::pin(try_stream! {
            if self.fail_listing.load(Ordering::SeqCst) {
                Err(ErrorKind::Listing("injected listing failure".to_string()))?;
            }
            // Snapshot matching entries under the read lock, then drop it
            // before yielding to avoid holding the lock across yield points.
            let entries: Vec<RemoteFileInfo> = {
                let guard = self.files.read().await;
                guard
                    .iter()
                    .filter(|(name, _)| has_allowed_extension(name, &self.allowed_extensions))
                    .map(|(name, (mtime, _))| RemoteFileInfo::new(name.clone(), *mtime))
                    .collect()
            };
            for info in entries {
                yield info;
            }
        })
    }

    async fn download(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        let data = {
            let guard = self.files.read().await;
            guard
                .get(name)
                .map(|(_, data)| data.clone())
                .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(name.to_string())))?
        };
        let temp = tempfile::Builder::new()
            .prefix("docsink-mock-")
            .tempfile()
            .map_err(ErrorKind::Io)?;
        tokio::fs::write(temp.path(), &data).await.map_err(ErrorKind::Io)?;
        let (_file, path) = temp.keep().map_err(|e| ErrorKind::Io(e.error))?;
        Ok(path)
    }
}
