//! The upload subroutine and document-id resolution.
//!
//! Uploading is a pipeline of owned temporary files: download, hash (on the
//! ORIGINAL content), preprocess, rename to present the source file name,
//! submit. Every path is guarded so nothing survives an early return.

use docsink_backend::{group_by_status, status};
use docsink_ledger::PendingUpload;

use crate::error::{ErrorKind, Result};
use crate::hash::md5_of;
use crate::temp::TempGuard;
use crate::SyncEngine;

/// Outcome of a single upload attempt.
///
/// `doc_id == None` means "not yet known" (the backend is still
/// processing; a pending-upload entry tracks it) or "suppressed due to a
/// prior terminal failure of this exact content".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub hash: String,
    pub doc_id: Option<String>,
}

/// What `resolve_doc_id` learned from the backend listing.
pub(crate) enum Resolution {
    /// The document is known under this id.
    Resolved(String),
    /// The submission failed terminally; a failure line has been recorded.
    Failed,
    /// Nothing matched yet; the pending-upload entry stays for later.
    Unknown,
}

impl SyncEngine {
    /// Download `name` from the source and run the upload pipeline.
    pub(crate) async fn download_and_upload(&self, name: &str) -> Result<UploadResult> {
        let temp = TempGuard::new(self.source.download(name).await.map_err(ErrorKind::source)?);
        self.upload_temp(name, temp, None).await
    }

    /// Upload an already-downloaded temporary file.
    ///
    /// `known_hash` skips re-hashing when the caller has already digested
    /// the same file. Consumes (and eventually deletes) every temporary
    /// involved, on every exit path.
    pub(crate) async fn upload_temp(&self, name: &str, temp: TempGuard, known_hash: Option<String>) -> Result<UploadResult> {
        let hash = match known_hash {
            Some(hash) => hash,
            None => md5_of(temp.path()).await?,
        };
        if self
            .failures
            .is_file_hash_failed(name, &hash)
            .await
            .map_err(ErrorKind::ledger)?
        {
            tracing::info!(file = name, hash = %hash, "Upload suppressed; this exact content already failed terminally");
            return Ok(UploadResult { hash, doc_id: None });
        }

        let processed_path = self
            .preprocessor
            .process(temp.path(), name)
            .await
            .map_err(ErrorKind::preprocess)?;

        // Rename to a sibling carrying the source file name, so the backend
        // sees the document under its real name. Ownership of the staged
        // file transfers to `presented` at the rename.
        let presented = if processed_path == temp.path() {
            let target = temp.path().with_file_name(name);
            tokio::fs::rename(temp.path(), &target).await.map_err(ErrorKind::Io)?;
            temp.disarm();
            TempGuard::new(target)
        } else {
            // `temp` stays alive and cleans up the original download when
            // this call returns.
            let processed = TempGuard::new(processed_path);
            let target = processed.path().with_file_name(name);
            tokio::fs::rename(processed.path(), &target).await.map_err(ErrorKind::Io)?;
            processed.disarm();
            TempGuard::new(target)
        };

        let track_id = self
            .backend
            .upload(presented.path())
            .await
            .map_err(ErrorKind::backend)?;
        match &track_id {
            Some(track) => {
                self.store
                    .insert_pending_upload(track.clone(), PendingUpload::new(name, &hash))
                    .await;
            },
            None => {
                tracing::warn!(file = name, "Backend accepted the upload but assigned no tracking id; not tracking");
            },
        }

        match self.resolve_doc_id(track_id.as_deref(), name, Some(&hash)).await? {
            Resolution::Failed => Ok(UploadResult { hash, doc_id: None }),
            Resolution::Resolved(doc_id) => {
                if let Some(track) = &track_id {
                    self.store.remove_pending_upload(track).await;
                }
                Ok(UploadResult {
                    hash,
                    doc_id: Some(doc_id),
                })
            },
            Resolution::Unknown => Ok(UploadResult { hash, doc_id: None }),
        }
    }

    /// Find the backend document for a fresh submission.
    ///
    /// The `failed` bucket is checked first so a synchronously-rejected
    /// upload is recorded (idempotently) right away instead of lingering in
    /// the pending queue. With a tracking id, only a tracking-id match
    /// counts; the file-name suffix match is the fallback for untracked
    /// submissions.
    pub(crate) async fn resolve_doc_id(&self, track_id: Option<&str>, name: &str, hash: Option<&str>) -> Result<Resolution> {
        let documents = self.backend.list().await.map_err(ErrorKind::backend)?;
        let grouped = group_by_status(documents);
        if let Some(track) = track_id {
            let failed_match = grouped
                .get(status::FAILED)
                .into_iter()
                .flatten()
                .find(|doc| doc.track_id.as_deref() == Some(track));
            if let Some(doc) = failed_match {
                let reason = doc
                    .error_msg
                    .clone()
                    .unwrap_or_else(|| "backend status: failed".to_string());
                self.failures
                    .log_failure(name, &reason, Some(track), hash, doc.created_at.as_deref())
                    .await
                    .map_err(ErrorKind::ledger)?;
                self.store.remove_pending_upload(track).await;
                if self.options.cleanup_failed_docs {
                    self.cleanup_failed_doc(&doc.id).await;
                }
                return Ok(Resolution::Failed);
            }
            let resolved = grouped
                .values()
                .flatten()
                .find(|doc| doc.track_id.as_deref() == Some(track));
            return Ok(match resolved {
                Some(doc) => Resolution::Resolved(doc.id.clone()),
                None => Resolution::Unknown,
            });
        }
        let by_name = grouped.values().flatten().find(|doc| doc.matches_source_name(name));
        Ok(match by_name {
            Some(doc) => Resolution::Resolved(doc.id.clone()),
            None => Resolution::Unknown,
        })
    }

    /// Best-effort removal of a terminally-failed document.
    pub(crate) async fn cleanup_failed_doc(&self, doc_id: &str) {
        if let Err(e) = self.backend.delete(doc_id).await {
            tracing::warn!(doc_id, error = ?e, "Cleanup of failed document did not succeed");
        }
    }
}
