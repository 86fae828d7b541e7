//! The periodic poll tick.
//!
//! Ordering within a tick is load-bearing: deferred deletes resolve first
//! (a successful retry frees a name for reupload in the SAME tick), then
//! pending uploads, then new/updated files, then files that vanished from
//! the source. The deletion pass only runs when the listing succeeded — a
//! transport outage must not look like a mass delete.

use docsink_ledger::{FileState, PendingDelete};

use crate::error::{Error, ErrorKind, Result};
use crate::stats::SyncStats;
use crate::SyncEngine;

/// Outcome of one backend delete attempt.
pub(crate) enum DeleteOutcome {
    Deleted,
    /// Busy: the delete moved to the pending queue.
    DeferredBusy,
    /// Non-busy failure; the caller gives up on this document.
    Failed,
}

impl SyncEngine {
    /// One poll tick.
    pub async fn poll_tick(&self) -> Result<SyncStats> {
        let mut stats = SyncStats::default();
        let mut dirty = false;

        let (delete_stats, deletes_dirty) = self.retry_pending_deletes(None).await;
        stats += delete_stats;
        dirty |= deletes_dirty;

        let (upload_stats, uploads_dirty) = self.check_pending_uploads().await;
        stats += upload_stats;
        dirty |= uploads_dirty;

        if let Some(current_files) = self.list_source_map().await {
            let mut names: Vec<&String> = current_files.keys().collect();
            names.sort_unstable();
            for name in names {
                let last_modified = current_files[name.as_str()];
                match self.store.file(name).await {
                    None => {
                        let (s, d) = self.create_file(name, last_modified).await;
                        stats += s;
                        dirty |= d;
                    },
                    Some(state) if state.last_modified != last_modified => {
                        let (s, d) = self.update_file(name, last_modified, &state).await;
                        stats += s;
                        dirty |= d;
                    },
                    Some(_) => {},
                }
            }

            // Names we track that a successful listing no longer shows.
            let known = self.store.files().await;
            let mut gone: Vec<String> = known
                .keys()
                .filter(|name| !current_files.contains_key(name.as_str()))
                .cloned()
                .collect();
            gone.sort_unstable();
            for name in gone {
                tracing::info!(file = %name, "File removed at source");
                match self.delete_by_doc_id(&name).await {
                    Ok(()) => {
                        self.store.remove_file(&name).await;
                        dirty = true;
                        stats.deleted += 1;
                    },
                    Err(e) if (*e).is_busy() => {
                        // Keep the entry; the pending-delete queue follows
                        // up and removes the state on success.
                        tracing::debug!(file = %name, "Backend busy; delete deferred");
                    },
                    Err(e) => {
                        // Dropping the entry anyway avoids a permanently
                        // stuck name.
                        tracing::error!(file = %name, error = ?e, "Delete failed; dropping the entry");
                        self.store.remove_file(&name).await;
                        dirty = true;
                    },
                }
            }
        }

        if dirty {
            self.store.save().await.map_err(ErrorKind::ledger)?;
        }
        Ok(stats)
    }

    async fn create_file(&self, name: &str, last_modified: i64) -> (SyncStats, bool) {
        let mut stats = SyncStats::default();
        let mut dirty = false;
        tracing::info!(file = name, "New file at source");
        match self.download_and_upload(name).await {
            Ok(result) => {
                self.store
                    .set_file(name, FileState::new(Some(result.hash), last_modified, result.doc_id))
                    .await;
                dirty = true;
                stats.uploaded += 1;
            },
            Err(e) if (*e).is_busy() => {
                tracing::warn!(file = name, "Backend busy; upload retried next tick");
            },
            Err(e) => {
                tracing::error!(file = name, error = ?e, "Upload of new file failed");
                self.record_tick_failure(name, &e, None).await;
                stats.failed += 1;
            },
        }
        (stats, dirty)
    }

    async fn update_file(&self, name: &str, last_modified: i64, state: &FileState) -> (SyncStats, bool) {
        let mut stats = SyncStats::default();
        let mut dirty = false;
        tracing::info!(file = name, "Changed file at source");
        let outcome = async {
            self.delete_by_doc_id(name).await?;
            self.download_and_upload(name).await
        }
        .await;
        match outcome {
            Ok(result) => {
                self.store
                    .set_file(name, FileState::new(Some(result.hash), last_modified, result.doc_id))
                    .await;
                dirty = true;
                stats.uploaded += 1;
            },
            Err(e) if (*e).is_busy() => {
                // The timestamp is NOT advanced, so the whole update is
                // retried next tick.
                tracing::info!(file = name, "Backend busy; update deferred");
                dirty = true;
            },
            Err(e) => {
                tracing::error!(file = name, error = ?e, "Update failed");
                self.record_tick_failure(name, &e, state.hash.as_deref()).await;
                stats.failed += 1;
            },
        }
        (stats, dirty)
    }

    async fn record_tick_failure(&self, name: &str, error: &Error, hash: Option<&str>) {
        let reason = (**error).to_string();
        if let Err(e) = self.failures.log_failure(name, &reason, None, hash, None).await {
            tracing::error!(error = ?e, "Could not record failure");
        }
    }

    /// Delete the document tracked for `name`, deferring on busy.
    ///
    /// Busy is re-raised after queueing so the caller does not advance its
    /// timestamp; a file with no recorded document id is a no-op.
    pub(crate) async fn delete_by_doc_id(&self, name: &str) -> Result<()> {
        let Some(state) = self.store.file(name).await else {
            tracing::debug!(file = name, "No state recorded; nothing to delete");
            return Ok(());
        };
        let Some(doc_id) = state.doc_id else {
            tracing::debug!(file = name, "No document id recorded; nothing to delete");
            return Ok(());
        };
        match self.backend.delete(&doc_id).await {
            Ok(()) => Ok(()),
            Err(e) if (*e).is_busy() => {
                self.store
                    .insert_pending_delete(doc_id, PendingDelete::for_file(name))
                    .await;
                Err(ErrorKind::backend(e))
            },
            Err(e) => Err(ErrorKind::backend(e)),
        }
    }

    /// Startup-flavoured delete: never raises, reports the outcome.
    pub(crate) async fn sync_delete(&self, doc_id: &str, file_name: Option<&str>, reason: &str) -> DeleteOutcome {
        match self.backend.delete(doc_id).await {
            Ok(()) => {
                tracing::info!(doc_id, reason, "Backend document deleted");
                DeleteOutcome::Deleted
            },
            Err(e) if (*e).is_busy() => {
                let pending = match file_name {
                    Some(name) => PendingDelete::for_file(name),
                    None => PendingDelete::orphan(),
                };
                self.store.insert_pending_delete(doc_id, pending).await;
                tracing::info!(doc_id, reason, "Backend busy; delete deferred");
                DeleteOutcome::DeferredBusy
            },
            Err(e) => {
                tracing::error!(doc_id, reason, error = ?e, "Backend delete failed");
                DeleteOutcome::Failed
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{md5_hex, Rig};

    #[tokio::test]
    async fn test_fresh_create() {
        // Scenario: empty state, one new source file, backend processes it
        // synchronously enough that the first listing shows `processed`.
        let rig = Rig::new(Default::default());
        rig.backend.set_auto_status("processed");
        rig.source.put("a.pdf", 100, b"content a");

        let stats = rig.engine.poll_tick().await.unwrap();
        assert_eq!(stats.uploaded, 1);
        let state = rig.engine.store.file("a.pdf").await.unwrap();
        assert_eq!(state.hash.as_deref(), Some(md5_hex(b"content a").as_str()));
        assert_eq!(state.last_modified, 100);
        assert!(state.doc_id.is_some());
        assert!(rig.engine.store.pending_uploads().await.is_empty());
        assert!(rig.engine.store.pending_deletes().await.is_empty());
        assert!(!rig.engine.failures.path().exists());
    }

    #[tokio::test]
    async fn test_quiescent_ticks_only_list() {
        let rig = Rig::new(Default::default());
        rig.backend.set_auto_status("processed");
        rig.source.put("a.pdf", 100, b"content a");
        rig.engine.poll_tick().await.unwrap();

        let uploads = rig.backend.upload_calls();
        let deletes = rig.backend.delete_calls();
        let lists = rig.backend.list_calls();
        // Two quiescent ticks make no backend calls beyond the two
        // per-tick listings.
        for tick in 1..=2 {
            let stats = rig.engine.poll_tick().await.unwrap();
            assert!(stats.is_noop());
            assert_eq!(rig.backend.upload_calls(), uploads);
            assert_eq!(rig.backend.delete_calls(), deletes);
            assert_eq!(rig.backend.list_calls(), lists + tick);
        }
    }

    #[tokio::test]
    async fn test_update_replaces_document() {
        let rig = Rig::new(Default::default());
        rig.backend.set_auto_status("processed");
        rig.source.put("a.pdf", 100, b"v1");
        rig.engine.poll_tick().await.unwrap();
        let first_doc = rig.engine.store.file("a.pdf").await.unwrap().doc_id.unwrap();

        rig.source.put("a.pdf", 200, b"v2");
        let stats = rig.engine.poll_tick().await.unwrap();
        assert_eq!(stats.uploaded, 1);
        assert_eq!(rig.backend.deleted_ids(), [first_doc.clone()]);
        let state = rig.engine.store.file("a.pdf").await.unwrap();
        assert_eq!(state.hash.as_deref(), Some(md5_hex(b"v2").as_str()));
        assert_eq!(state.last_modified, 200);
        assert_ne!(state.doc_id.as_deref(), Some(first_doc.as_str()));
    }

    #[tokio::test]
    async fn test_busy_update_defers_and_completes_next_tick() {
        // Scenario: busy update. Tick 1 defers the delete and does NOT
        // advance the timestamp; tick 2 completes the delete and treats the
        // file as new again.
        let rig = Rig::new(Default::default());
        rig.backend.set_auto_status("processed");
        rig.source.put("a.pdf", 100, b"v1");
        rig.engine.poll_tick().await.unwrap();
        let first_doc = rig.engine.store.file("a.pdf").await.unwrap().doc_id.unwrap();

        rig.backend.set_busy(&first_doc);
        rig.source.put("a.pdf", 150, b"v2");
        let stats = rig.engine.poll_tick().await.unwrap();
        assert_eq!(stats.uploaded, 0);
        let pending = rig.engine.store.pending_deletes().await;
        assert_eq!(pending[first_doc.as_str()].file_name.as_deref(), Some("a.pdf"));
        assert!(!pending[first_doc.as_str()].reupload_on_success);
        // Timestamp untouched: the next tick retries the whole update.
        assert_eq!(rig.engine.store.file("a.pdf").await.unwrap().last_modified, 100);
        assert_eq!(rig.backend.upload_calls(), 1);

        rig.backend.clear_busy(&first_doc);
        let stats = rig.engine.poll_tick().await.unwrap();
        // The deferred delete lands first and clears the state entry; the
        // same tick's new-file pass re-creates it.
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.uploaded, 1);
        let state = rig.engine.store.file("a.pdf").await.unwrap();
        assert_eq!(state.hash.as_deref(), Some(md5_hex(b"v2").as_str()));
        assert_eq!(state.last_modified, 150);
        assert!(state.doc_id.is_some());
        assert!(rig.engine.store.pending_deletes().await.is_empty());
    }

    #[tokio::test]
    async fn test_source_delete_removes_document() {
        let rig = Rig::new(Default::default());
        rig.backend.set_auto_status("processed");
        rig.source.put("a.pdf", 100, b"content");
        rig.engine.poll_tick().await.unwrap();
        let doc_id = rig.engine.store.file("a.pdf").await.unwrap().doc_id.unwrap();

        rig.source.remove("a.pdf");
        let stats = rig.engine.poll_tick().await.unwrap();
        assert_eq!(stats.deleted, 1);
        assert_eq!(rig.backend.deleted_ids(), [doc_id]);
        assert!(rig.engine.store.file("a.pdf").await.is_none());
    }

    #[tokio::test]
    async fn test_source_delete_with_busy_backend_defers() {
        let rig = Rig::new(Default::default());
        rig.backend.set_auto_status("processed");
        rig.source.put("a.pdf", 100, b"content");
        rig.engine.poll_tick().await.unwrap();
        let doc_id = rig.engine.store.file("a.pdf").await.unwrap().doc_id.unwrap();

        rig.backend.set_busy(&doc_id);
        rig.source.remove("a.pdf");
        let stats = rig.engine.poll_tick().await.unwrap();
        assert_eq!(stats.deleted, 0);
        // Entry kept; pending queue follows up.
        assert!(rig.engine.store.file("a.pdf").await.is_some());
        assert!(rig.engine.store.pending_deletes().await.contains_key(doc_id.as_str()));

        rig.backend.clear_busy(&doc_id);
        let stats = rig.engine.poll_tick().await.unwrap();
        assert_eq!(stats.deleted, 1);
        assert!(rig.engine.store.file("a.pdf").await.is_none());
        assert!(rig.engine.store.pending_deletes().await.is_empty());
    }

    #[tokio::test]
    async fn test_listing_outage_skips_deletions() {
        let rig = Rig::new(Default::default());
        rig.backend.set_auto_status("processed");
        rig.source.put("a.pdf", 100, b"content");
        rig.engine.poll_tick().await.unwrap();

        rig.source.set_listing_fails(true);
        let stats = rig.engine.poll_tick().await.unwrap();
        assert!(stats.is_noop());
        // The file is still tracked and nothing was deleted remotely.
        assert!(rig.engine.store.file("a.pdf").await.is_some());
        assert_eq!(rig.backend.delete_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_upload_recorded_and_suppressed() {
        // Scenario: failed upload suppression across three ticks.
        let rig = Rig::new(Default::default());
        rig.backend.set_auto_status("failed");
        rig.backend.set_auto_error_msg("empty");
        rig.source.put("b.pdf", 100, b"broken");

        // Tick 1: the upload is submitted and the backend reports failure;
        // one line lands in the failure log.
        rig.engine.poll_tick().await.unwrap();
        let hash = md5_hex(b"broken");
        assert!(rig.engine.failures.is_file_hash_failed("b.pdf", &hash).await.unwrap());
        assert_eq!(rig.backend.upload_calls(), 1);

        // Tick 2 (content unchanged, timestamp bumped to force a retry):
        // the hash suppression stops the upload before any network call.
        rig.source.touch("b.pdf", 150);
        rig.engine.poll_tick().await.unwrap();
        assert_eq!(rig.backend.upload_calls(), 1);

        // Tick 3: the file is actually edited; the new content uploads.
        rig.backend.set_auto_status("processed");
        rig.source.put("b.pdf", 200, b"fixed");
        rig.engine.poll_tick().await.unwrap();
        assert_eq!(rig.backend.upload_calls(), 2);
        let state = rig.engine.store.file("b.pdf").await.unwrap();
        assert_eq!(state.hash.as_deref(), Some(md5_hex(b"fixed").as_str()));
        assert!(state.doc_id.is_some());
    }

    #[tokio::test]
    async fn test_tick_persists_only_when_dirty() {
        let rig = Rig::new(Default::default());
        rig.engine.poll_tick().await.unwrap();
        // Nothing happened, nothing saved.
        assert!(!rig.engine.store.path().exists());

        rig.backend.set_auto_status("processed");
        rig.source.put("a.pdf", 100, b"content");
        rig.engine.poll_tick().await.unwrap();
        assert!(rig.engine.store.path().exists());
    }

    #[tokio::test]
    async fn test_state_survives_restart_without_reupload() {
        // Save/reload with no external change: nothing is re-uploaded.
        let rig = Rig::new(Default::default());
        rig.backend.set_auto_status("processed");
        rig.source.put("a.pdf", 100, b"content");
        rig.engine.poll_tick().await.unwrap();
        let saved = rig.engine.store.files().await;

        let snapshot = rig.engine.store.load_snapshot().await;
        assert_eq!(snapshot.files, saved);
    }
}
