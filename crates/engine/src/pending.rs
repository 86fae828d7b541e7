//! The two in-flight queues: deferred deletes and tracked uploads.
//!
//! Deferred deletes are durable (they survive restarts through the state
//! snapshot); tracked uploads are in-memory only and rebuilt from the
//! backend listing after a restart.

use docsink_backend::status;
use docsink_ledger::FileState;
use std::collections::HashMap;

use crate::stats::SyncStats;
use crate::SyncEngine;

impl SyncEngine {
    /// Retry every deferred delete.
    ///
    /// Startup passes its fresh source listing; the poll tick passes `None`
    /// and a listing is fetched lazily, only when a successful retry
    /// actually owes a reupload. Returns the stats and whether durable
    /// state changed.
    pub(crate) async fn retry_pending_deletes(&self, current_files: Option<&HashMap<String, i64>>) -> (SyncStats, bool) {
        let mut stats = SyncStats::default();
        let mut dirty = false;
        let pending = self.store.pending_deletes().await;
        if pending.is_empty() {
            return (stats, dirty);
        }
        let mut lazy_listing: Option<Option<HashMap<String, i64>>> = None;
        for (doc_id, entry) in pending {
            match self.backend.delete(&doc_id).await {
                Ok(()) => {
                    self.store.remove_pending_delete(&doc_id).await;
                    if let Some(name) = &entry.file_name {
                        self.store.remove_file(name).await;
                    }
                    dirty = true;
                    stats.deleted += 1;
                    tracing::info!(doc_id = %doc_id, file = entry.file_name.as_deref().unwrap_or(""), "Deferred delete completed");
                    if entry.reupload_on_success
                        && let Some(name) = &entry.file_name
                    {
                        let last_modified = match current_files {
                            Some(listing) => listing.get(name).copied(),
                            None => {
                                if lazy_listing.is_none() {
                                    lazy_listing = Some(self.list_source_map().await);
                                }
                                lazy_listing
                                    .as_ref()
                                    .and_then(|listing| listing.as_ref())
                                    .and_then(|listing| listing.get(name).copied())
                            },
                        };
                        match last_modified {
                            Some(last_modified) => {
                                stats += self.reupload(name, last_modified).await;
                            },
                            None => tracing::debug!(file = name, "Skipping reupload; file no longer present at source"),
                        }
                    }
                },
                Err(e) if (*e).is_busy() => {
                    tracing::debug!(doc_id = %doc_id, "Backend still busy; delete stays deferred");
                },
                Err(e) => {
                    // A non-busy error will not get better on its own, and a
                    // stuck entry would block the name forever.
                    tracing::error!(doc_id = %doc_id, error = ?e, "Deferred delete failed; dropping it");
                    self.store.remove_pending_delete(&doc_id).await;
                    if let Some(name) = &entry.file_name {
                        self.store.remove_file(name).await;
                    }
                    dirty = true;
                },
            }
        }
        (stats, dirty)
    }

    /// The second half of a stale update: the name is free again, upload
    /// the fresh content and write a fresh file state.
    async fn reupload(&self, name: &str, last_modified: i64) -> SyncStats {
        let mut stats = SyncStats::default();
        match self.download_and_upload(name).await {
            Ok(result) => {
                self.store
                    .set_file(name, FileState::new(Some(result.hash), last_modified, result.doc_id))
                    .await;
                stats.uploaded += 1;
                tracing::info!(file = name, "Reuploaded after deferred delete");
            },
            Err(e) => {
                // No state was written, so the next cycle treats the file
                // as new and retries.
                tracing::error!(file = name, error = ?e, "Reupload after deferred delete failed");
            },
        }
        stats
    }

    /// `name → lastModified` of the current source listing, or `None` on a
    /// transport failure (callers must not treat that as an empty source).
    pub(crate) async fn list_source_map(&self) -> Option<HashMap<String, i64>> {
        match self.source.list().await {
            Ok(listing) => Some(
                listing
                    .into_iter()
                    .map(|file| (file.name, file.last_modified_millis))
                    .collect(),
            ),
            Err(e) => {
                tracing::error!(source = self.source.name(), error = ?e, "Source listing failed");
                None
            },
        }
    }

    /// Resolve every tracked upload against one backend listing.
    ///
    /// The listing happens once per tick, whether or not anything is in
    /// flight.
    pub(crate) async fn check_pending_uploads(&self) -> (SyncStats, bool) {
        let mut stats = SyncStats::default();
        let mut dirty = false;
        let documents = match self.backend.list().await {
            Ok(documents) => documents,
            Err(e) => {
                tracing::error!(error = ?e, "Backend listing failed; pending uploads resume next tick");
                return (stats, dirty);
            },
        };
        let pending = self.store.pending_uploads().await;
        for (track_id, upload) in pending {
            let doc = documents
                .iter()
                .find(|doc| doc.track_id.as_deref() == Some(track_id.as_str()));
            match doc {
                Some(doc) if doc.has_status(status::PROCESSED) => {
                    let last_modified = self
                        .store
                        .file(&upload.file_name)
                        .await
                        .map(|state| state.last_modified)
                        .unwrap_or_default();
                    self.store
                        .set_file(
                            &upload.file_name,
                            FileState::new(Some(upload.hash.clone()), last_modified, Some(doc.id.clone())),
                        )
                        .await;
                    self.store.remove_pending_upload(&track_id).await;
                    dirty = true;
                    tracing::info!(file = %upload.file_name, doc_id = %doc.id, "Upload processed by backend");
                },
                Some(doc) if doc.has_status(status::FAILED) => {
                    let reason = doc
                        .error_msg
                        .clone()
                        .unwrap_or_else(|| "backend status: failed".to_string());
                    if let Err(e) = self
                        .failures
                        .log_failure(
                            &upload.file_name,
                            &reason,
                            Some(&track_id),
                            Some(&upload.hash),
                            doc.created_at.as_deref(),
                        )
                        .await
                    {
                        tracing::error!(error = ?e, "Could not record failure");
                    }
                    if self.options.cleanup_failed_docs {
                        self.cleanup_failed_doc(&doc.id).await;
                    }
                    self.store.remove_pending_upload(&track_id).await;
                    stats.failed += 1;
                },
                None => {
                    if let Err(e) = self
                        .failures
                        .log_failure(
                            &upload.file_name,
                            "document not found in backend after upload",
                            Some(&track_id),
                            Some(&upload.hash),
                            None,
                        )
                        .await
                    {
                        tracing::error!(error = ?e, "Could not record failure");
                    }
                    self.store.remove_pending_upload(&track_id).await;
                    stats.failed += 1;
                },
                Some(_) => {
                    // Still processing; resume next tick.
                },
            }
        }
        (stats, dirty)
    }
}
