//! Startup reconciliation.
//!
//! Runs exactly once, before the first poll tick, and brings the three
//! authorities back in line after downtime: failures the previous run never
//! saw get reported, deferred deletes get retried, and (depending on the
//! configured mode) every source file is reconciled against the backend's
//! document set.

use docsink_backend::{status, DocumentInfo};
use docsink_ledger::FileState;
use std::collections::HashMap;

use crate::error::{ErrorKind, Result};
use crate::hash::md5_of;
use crate::options::StartupSync;
use crate::stats::SyncStats;
use crate::temp::TempGuard;
use crate::tick::DeleteOutcome;
use crate::SyncEngine;

impl SyncEngine {
    /// Startup reconciliation. See the module docs for the shape; the
    /// ordering of the steps is load-bearing (deferred deletes must run
    /// before per-file reconciliation so a freed name can be reuploaded in
    /// this same pass).
    pub async fn startup_sync(&self) -> Result<SyncStats> {
        let mut stats = SyncStats::default();

        // Failures that became terminal while we were not running.
        self.report_unreported_failures().await;

        // Snapshot both local authorities. Nothing is merged yet.
        let current_files = self.list_source_map().await;
        let snapshot = self.store.load_snapshot().await;

        // Deferred deletes carry over and are retried unconditionally,
        // whatever the startup-sync mode.
        self.store.adopt_pending_deletes(snapshot.pending_deletes.clone()).await;
        let empty = HashMap::new();
        let (delete_stats, _) = self
            .retry_pending_deletes(Some(current_files.as_ref().unwrap_or(&empty)))
            .await;
        stats += delete_stats;

        match &current_files {
            Some(listing) => {
                // Pre-populate: reuse a persisted entry verbatim when its
                // timestamp still matches and it carries a hash; otherwise
                // start over (keeping a known document id, so staleness is
                // detected instead of double-uploading).
                for (name, last_modified) in listing {
                    if self.store.file(name).await.is_some() {
                        // A reupload during the deferred-delete pass already
                        // wrote fresh state for this name.
                        continue;
                    }
                    let state = match snapshot.files.get(name) {
                        Some(persisted) if persisted.last_modified == *last_modified && persisted.hash.is_some() => {
                            persisted.clone()
                        },
                        persisted => FileState::new(None, *last_modified, persisted.and_then(|p| p.doc_id.clone())),
                    };
                    self.store.set_file(name, state).await;
                }
            },
            None => {
                // Transport outage: keep everything we knew and reconcile
                // nothing. An outage must never cascade into deletions.
                for (name, state) in &snapshot.files {
                    if self.store.file(name).await.is_none() {
                        self.store.set_file(name, state.clone()).await;
                    }
                }
            },
        }

        let reconcile = !matches!(self.options.startup_sync, StartupSync::None);
        if let (true, Some(listing)) = (reconcile, &current_files) {
            match self.backend.list().await {
                Ok(documents) => {
                    stats += self.reconcile_all(listing, documents).await;
                },
                Err(e) => {
                    tracing::error!(error = ?e, "Backend listing failed; skipping startup reconciliation");
                },
            }
        }

        self.store.save().await.map_err(ErrorKind::ledger)?;
        Ok(stats)
    }

    async fn reconcile_all(&self, listing: &HashMap<String, i64>, documents: Vec<DocumentInfo>) -> SyncStats {
        let mut stats = SyncStats::default();
        let mut names: Vec<&String> = listing.keys().collect();
        names.sort_unstable();

        // Bind each backend document to at most one source name; the first
        // match wins. Unmatched documents are orphans.
        let mut by_name: HashMap<&str, Vec<DocumentInfo>> = HashMap::new();
        let mut orphans: Vec<DocumentInfo> = Vec::new();
        for doc in documents {
            match names.iter().find(|name| doc.matches_source_name(name.as_str())) {
                Some(name) => by_name.entry(name.as_str()).or_default().push(doc),
                None => orphans.push(doc),
            }
        }

        for name in &names {
            let matches = by_name.remove(name.as_str()).unwrap_or_default();
            stats += self.reconcile_file(name.as_str(), matches).await;
        }

        if matches!(self.options.startup_sync, StartupSync::Full) {
            for doc in &orphans {
                tracing::info!(doc_id = %doc.id, path = doc.file_path.as_deref().unwrap_or(""), "Orphaned backend document");
                if matches!(self.sync_delete(&doc.id, None, "orphan").await, DeleteOutcome::Deleted) {
                    stats.deleted += 1;
                }
            }
        }
        stats
    }

    /// Reconcile one source file against the backend documents bound to its
    /// name.
    async fn reconcile_file(&self, name: &str, matches: Vec<DocumentInfo>) -> SyncStats {
        let mut stats = SyncStats::default();
        let Some(state) = self.store.file(name).await else {
            // Pre-population installs a state for every listed file; a
            // missing entry means the deferred-delete pass owned this name.
            return stats;
        };

        if matches.is_empty() {
            match self.download_and_upload(name).await {
                Ok(result) => {
                    self.store
                        .set_file(name, FileState::new(Some(result.hash), state.last_modified, result.doc_id))
                        .await;
                    stats.uploaded += 1;
                },
                Err(e) if (*e).is_busy() => {
                    tracing::warn!(file = name, "Backend busy; upload retried next tick");
                },
                Err(e) => {
                    tracing::error!(file = name, error = ?e, "Upload failed during startup reconciliation");
                },
            }
            return stats;
        }

        // Local hash: reuse the persisted one when present, otherwise
        // download and digest (keeping the download for potential reuse).
        let (local_hash, downloaded) = match &state.hash {
            Some(hash) => (hash.clone(), None),
            None => {
                let temp = match self.source.download(name).await {
                    Ok(path) => TempGuard::new(path),
                    Err(e) => {
                        tracing::error!(file = name, error = ?e, "Download failed during startup reconciliation");
                        return stats;
                    },
                };
                match md5_of(temp.path()).await {
                    Ok(hash) => (hash, Some(temp)),
                    Err(e) => {
                        tracing::error!(file = name, error = ?e, "Hashing failed during startup reconciliation");
                        return stats;
                    },
                }
            },
        };

        let newest_id = matches
            .iter()
            .max_by(|a, b| {
                a.created_at_key()
                    .cmp(b.created_at_key())
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|doc| doc.id.clone())
            .unwrap_or_default();

        // A match needs a recorded binding AND identical content; a missing
        // document id forces a stale replacement so the binding is
        // established freshly.
        let hash_match = state.doc_id.is_some() && state.hash.as_deref() == Some(local_hash.as_str());
        if hash_match {
            if matches!(self.options.startup_sync, StartupSync::Full) {
                for doc in matches.iter().filter(|doc| doc.id != newest_id) {
                    if matches!(self.sync_delete(&doc.id, None, "duplicate").await, DeleteOutcome::Deleted) {
                        stats.deleted += 1;
                    }
                }
            }
            self.store
                .set_file(name, FileState::new(Some(local_hash), state.last_modified, state.doc_id.clone()))
                .await;
            return stats;
        }

        // Stale: every bound document goes before the fresh content can go
        // up (the backend dedupes by name).
        let mut busy_ids = Vec::new();
        for doc in &matches {
            match self.sync_delete(&doc.id, None, "stale").await {
                DeleteOutcome::Deleted => stats.deleted += 1,
                DeleteOutcome::DeferredBusy => busy_ids.push(doc.id.clone()),
                DeleteOutcome::Failed => {},
            }
        }
        if !busy_ids.is_empty() {
            // The name is still occupied. Upgrade the deferred deletes so a
            // later successful retry triggers the reupload, and skip the
            // upload for this cycle.
            for doc_id in &busy_ids {
                self.store.mark_reupload_on_success(doc_id, name).await;
            }
            stats.deleted += busy_ids.len() as u64;
            tracing::info!(file = name, "Stale replacement deferred; backend busy");
            return stats;
        }

        let temp = match downloaded {
            Some(temp) => temp,
            None => match self.source.download(name).await {
                Ok(path) => TempGuard::new(path),
                Err(e) => {
                    tracing::error!(file = name, error = ?e, "Download failed during stale replacement");
                    return stats;
                },
            },
        };
        match self.upload_temp(name, temp, Some(local_hash)).await {
            Ok(result) => {
                self.store
                    .set_file(name, FileState::new(Some(result.hash), state.last_modified, result.doc_id))
                    .await;
                stats.uploaded += 1;
                stats.stale += 1;
            },
            Err(e) => {
                tracing::error!(file = name, error = ?e, "Stale replacement upload failed");
            },
        }
        stats
    }

    /// Report documents that failed while the daemon was not running.
    ///
    /// Idempotent across restarts through the failure log's
    /// `track_id`+`created_at` dedup.
    async fn report_unreported_failures(&self) {
        let documents = match self.backend.list().await {
            Ok(documents) => documents,
            Err(e) => {
                tracing::error!(error = ?e, "Backend listing failed; failures from the previous run stay unreported");
                return;
            },
        };
        for doc in documents.iter().filter(|doc| doc.has_status(status::FAILED)) {
            let track = doc.track_id.as_deref();
            let already = match track {
                Some(track) => self
                    .failures
                    .is_already_logged(track, doc.created_at.as_deref())
                    .await
                    .unwrap_or(false),
                None => false,
            };
            if !already {
                let file = doc.file_path.as_deref().map(base_name).unwrap_or("");
                let reason = doc
                    .error_msg
                    .clone()
                    .unwrap_or_else(|| "backend status: failed".to_string());
                if let Err(e) = self
                    .failures
                    .log_failure(file, &reason, track, None, doc.created_at.as_deref())
                    .await
                {
                    tracing::error!(error = ?e, "Could not record failure");
                }
            }
            if self.options.cleanup_failed_docs {
                self.cleanup_failed_doc(&doc.id).await;
            }
        }
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
