//! Ingest backend trait and implementations.
//!
//! This module defines the `IngestBackend` trait, the sync engine's view of
//! the downstream RAG ingestion service: submit a document, enumerate what
//! the service holds, delete by id. Uploads are processed asynchronously on
//! the service side — `upload` returns a tracking id, and the terminal
//! outcome (processed/failed) only ever becomes visible through `list`.

mod http;
#[cfg(feature = "mock")]
mod mock;

pub use self::http::HttpIngestBackend;
#[cfg(feature = "mock")]
pub use self::mock::{MockIngestBackend, UploadRecord};
use crate::error::Result;
use crate::models::DocumentInfo;
use async_trait::async_trait;
use std::path::Path;

/// Unified interface for ingest backends.
///
/// # Deduplication
///
/// The backend deduplicates by presented file name: uploading a file whose
/// prior version still resides under the same name silently shadows it.
/// Callers must delete the stale document before re-uploading.
///
/// # Busy
///
/// `delete` fails with the distinguished
/// [`Busy`](crate::error::ErrorKind::Busy) kind while the service is
/// processing. Busy is the only error a caller should retry verbatim.
#[async_trait]
pub trait IngestBackend: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Submit one local file for ingestion.
    ///
    /// The file name of `path` is the document's presented name. Returns
    /// the backend's tracking id for the submission, or `None` when the
    /// backend accepted the request without assigning one (callers should
    /// record a warning and not track the upload).
    async fn upload(&self, path: &Path) -> Result<Option<String>>;

    /// List every document the backend holds, across all statuses.
    ///
    /// Status keys are lowercased. Implementations paginate internally so
    /// callers always see the aggregated view.
    async fn list(&self) -> Result<Vec<DocumentInfo>>;

    /// Delete a document by id.
    ///
    /// Fails with [`Busy`](crate::error::ErrorKind::Busy) while the backend
    /// is processing; that is the caller's cue to defer and retry.
    async fn delete(&self, doc_id: &str) -> Result<()>;
}
