//! In-memory ingest backend for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

use super::IngestBackend;
use crate::error::{ErrorKind, Result};
use crate::models::DocumentInfo;

/// One recorded call to [`MockIngestBackend::upload`].
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub track_id: Option<String>,
}

/// In-memory ingest backend for testing.
///
/// Documents live behind a [`RwLock`]; helper methods script the backend's
/// behaviour from test setup: mark document ids busy-on-delete, choose the
/// status uploads are auto-registered with, suppress tracking ids. Call
/// counters let tests assert quiescence ("a second tick makes no calls
/// beyond the two listings").
///
/// # Examples
///
/// ```
/// use docsink_backend::backend::{IngestBackend, MockIngestBackend};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockIngestBackend::default();
/// backend.set_auto_status("processed");
///
/// let dir = tempfile::tempdir()?;
/// let file = dir.path().join("a.pdf");
/// std::fs::write(&file, b"content")?;
///
/// let track = backend.upload(&file).await?;
/// assert!(track.is_some());
/// assert_eq!(backend.list().await?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MockIngestBackend {
    name: String,
    docs: RwLock<Vec<DocumentInfo>>,
    busy_deletes: RwLock<HashSet<String>>,
    rejected_deletes: RwLock<HashSet<String>>,
    uploads: RwLock<Vec<UploadRecord>>,
    deleted: RwLock<Vec<String>>,
    auto_status: RwLock<Option<String>>,
    auto_error_msg: RwLock<Option<String>>,
    suppress_track_ids: AtomicBool,
    counter: AtomicU64,
    upload_calls: AtomicU64,
    list_calls: AtomicU64,
    delete_calls: AtomicU64,
}

impl MockIngestBackend {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            ..Self::default()
        }
    }

    /// Pre-populate the backend with documents.
    pub fn with_documents(docs: impl IntoIterator<Item = DocumentInfo>) -> Self {
        let backend = Self::new();
        backend
            .docs
            .try_write()
            .expect("MockIngestBackend::with_documents: lock contended")
            .extend(docs);
        backend
    }

    /// Append one document to the scripted listing.
    pub fn push_document(&self, doc: DocumentInfo) {
        self.docs
            .try_write()
            .expect("MockIngestBackend::push_document: lock contended")
            .push(doc);
    }

    /// Overwrite the status (and optionally the error message) of a
    /// scripted document, simulating the backend finishing processing.
    pub fn set_status(&self, doc_id: &str, status: &str, error_msg: Option<&str>) {
        let mut docs = self
            .docs
            .try_write()
            .expect("MockIngestBackend::set_status: lock contended");
        for doc in docs.iter_mut().filter(|d| d.id == doc_id) {
            doc.status = Some(status.to_ascii_lowercase());
            doc.error_msg = error_msg.map(str::to_string);
        }
    }

    /// Make deletes of `doc_id` report busy until cleared.
    pub fn set_busy(&self, doc_id: impl Into<String>) {
        self.busy_deletes
            .try_write()
            .expect("MockIngestBackend::set_busy: lock contended")
            .insert(doc_id.into());
    }

    pub fn clear_busy(&self, doc_id: &str) {
        self.busy_deletes
            .try_write()
            .expect("MockIngestBackend::clear_busy: lock contended")
            .remove(doc_id);
    }

    /// Make deletes of `doc_id` fail with a non-busy rejection.
    pub fn set_delete_rejected(&self, doc_id: impl Into<String>) {
        self.rejected_deletes
            .try_write()
            .expect("MockIngestBackend::set_delete_rejected: lock contended")
            .insert(doc_id.into());
    }

    /// When set, every upload auto-registers a document with this status
    /// (lowercased), so listings immediately reflect the submission.
    pub fn set_auto_status(&self, status: impl Into<String>) {
        *self
            .auto_status
            .try_write()
            .expect("MockIngestBackend::set_auto_status: lock contended") = Some(status.into().to_ascii_lowercase());
    }

    pub fn clear_auto_status(&self) {
        *self
            .auto_status
            .try_write()
            .expect("MockIngestBackend::clear_auto_status: lock contended") = None;
    }

    /// Error message attached to auto-registered documents.
    pub fn set_auto_error_msg(&self, msg: impl Into<String>) {
        *self
            .auto_error_msg
            .try_write()
            .expect("MockIngestBackend::set_auto_error_msg: lock contended") = Some(msg.into());
    }

    /// When `true`, uploads are accepted but no tracking id is returned.
    pub fn set_suppress_track_ids(&self, suppress: bool) {
        self.suppress_track_ids.store(suppress, Ordering::SeqCst);
    }

    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.uploads
            .try_read()
            .expect("MockIngestBackend::uploads: lock contended")
            .clone()
    }

    pub fn uploaded_names(&self) -> Vec<String> {
        self.uploads().into_iter().map(|u| u.file_name).collect()
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted
            .try_read()
            .expect("MockIngestBackend::deleted_ids: lock contended")
            .clone()
    }

    pub fn documents(&self) -> Vec<DocumentInfo> {
        self.docs
            .try_read()
            .expect("MockIngestBackend::documents: lock contended")
            .clone()
    }

    pub fn upload_calls(&self) -> u64 {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> u64 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl IngestBackend for MockIngestBackend {
    fn name(&self) -> &str {
        match self.name.is_empty() {
            true => "mock",
            false => &self.name,
        }
    }

    async fn upload(&self, path: &Path) -> Result<Option<String>> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| exn::Exn::from(ErrorKind::Protocol("upload path has no file name".to_string())))?;
        let bytes = tokio::fs::read(path).await.map_err(ErrorKind::Io)?;

        let track_id = match self.suppress_track_ids.load(Ordering::SeqCst) {
            true => None,
            false => Some(format!("T{}", self.next())),
        };
        self.uploads.write().await.push(UploadRecord {
            file_name: file_name.clone(),
            bytes,
            track_id: track_id.clone(),
        });

        let auto_status = self.auto_status.read().await.clone();
        if let (Some(status), Some(track)) = (auto_status, &track_id) {
            let n = self.next();
            self.docs.write().await.push(DocumentInfo {
                id: format!("D{n}"),
                file_path: Some(format!("/ingest/{file_name}")),
                created_at: Some(format!("2024-01-01T00:00:00.{n:09}+00:00")),
                track_id: Some(track.clone()),
                status: Some(status),
                error_msg: self.auto_error_msg.read().await.clone(),
            });
        }
        Ok(track_id)
    }

    async fn list(&self) -> Result<Vec<DocumentInfo>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.docs.read().await.clone())
    }

    async fn delete(&self, doc_id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.busy_deletes.read().await.contains(doc_id) {
            exn::bail!(ErrorKind::Busy);
        }
        if self.rejected_deletes.read().await.contains(doc_id) {
            exn::bail!(ErrorKind::Rejected(format!("delete of {doc_id} rejected by script")));
        }
        self.docs.write().await.retain(|d| d.id != doc_id);
        self.deleted.write().await.push(doc_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::status;

    fn temp_file(content: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_upload_records_and_tracks() {
        let backend = MockIngestBackend::new();
        let (_dir, path) = temp_file(b"content");
        let track = backend.upload(&path).await.unwrap();
        assert_eq!(track.as_deref(), Some("T1"));
        assert_eq!(backend.uploaded_names(), ["a.pdf"]);
        assert_eq!(backend.uploads()[0].bytes, b"content");
    }

    #[tokio::test]
    async fn test_auto_status_registers_document() {
        let backend = MockIngestBackend::new();
        backend.set_auto_status("Processed");
        let (_dir, path) = temp_file(b"content");
        let track = backend.upload(&path).await.unwrap().unwrap();

        let docs = backend.list().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].track_id.as_deref(), Some(track.as_str()));
        assert!(docs[0].has_status(status::PROCESSED));
        assert!(docs[0].matches_source_name("a.pdf"));
    }

    #[tokio::test]
    async fn test_suppressed_track_ids() {
        let backend = MockIngestBackend::new();
        backend.set_suppress_track_ids(true);
        let (_dir, path) = temp_file(b"content");
        assert_eq!(backend.upload(&path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_busy_then_cleared_delete() {
        let backend = MockIngestBackend::with_documents([DocumentInfo::new("D1")]);
        backend.set_busy("D1");
        let err = backend.delete("D1").await.unwrap_err();
        assert!((*err).is_busy());

        backend.clear_busy("D1");
        backend.delete("D1").await.unwrap();
        assert_eq!(backend.deleted_ids(), ["D1"]);
        assert!(backend.list().await.unwrap().is_empty());
    }
}
