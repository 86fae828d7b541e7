//! Durable sync state.
//!
//! One snapshot document on disk:
//!
//! ```json
//! { "files":          { "<name>":  {"hash": "...", "lastModified": 0, "docId": "..."} },
//!   "pendingDeletes": { "<docId>": {"fileName": "...", "reuploadOnSuccess": false} } }
//! ```
//!
//! A legacy format — the bare `files` map at the document root — loads
//! transparently; saves always write the current form. Saves are atomic:
//! write a sibling temp file, rename into place.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::error::{ErrorKind, Result};
use crate::models::{FileState, PendingDelete, PendingUpload, Snapshot};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotDoc {
    #[serde(default)]
    files: HashMap<String, FileState>,
    #[serde(default)]
    pending_deletes: HashMap<String, PendingDelete>,
}

#[derive(Debug, Default)]
struct Inner {
    files: HashMap<String, FileState>,
    pending_deletes: HashMap<String, PendingDelete>,
    // Never serialized: rebuilt from the backend listing after a restart.
    pending_uploads: HashMap<String, PendingUpload>,
}

/// Thread-safe store for the durable sync maps.
///
/// All mutations go through `&self` behind a [`RwLock`]; the engine runs in
/// one task, but nothing here depends on that.
pub struct StateStore {
    path: PathBuf,
    inner: RwLock<Inner>,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted snapshot WITHOUT touching the live maps.
    ///
    /// The engine decides which persisted entries survive a restart, so
    /// loading never merges. Corrupt, missing, or unreadable files degrade
    /// to an empty snapshot: the engine recovers by re-hashing everything
    /// on the next reconcile.
    pub async fn load_snapshot(&self) -> Snapshot {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Snapshot::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "State file unreadable; starting from empty state");
                return Snapshot::default();
            },
        };
        match parse_snapshot(&raw) {
            Some(snapshot) => snapshot,
            None => {
                tracing::warn!(path = %self.path.display(), "State file corrupt; starting from empty state");
                Snapshot::default()
            },
        }
    }

    /// Install a snapshot's pending deletes into the live store (startup
    /// carries them over before retrying them).
    pub async fn adopt_pending_deletes(&self, pending: HashMap<String, PendingDelete>) {
        self.inner.write().await.pending_deletes = pending;
    }

    /// Atomically persist the durable maps.
    pub async fn save(&self) -> Result<()> {
        let doc = {
            let inner = self.inner.read().await;
            SnapshotDoc {
                files: inner.files.clone(),
                pending_deletes: inner.pending_deletes.clone(),
            }
        };
        let json = serde_json::to_vec_pretty(&doc).map_err(|e| ErrorKind::Serialize(e.to_string()))?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(ErrorKind::Io)?;
        }
        let temp = sibling_temp(&self.path);
        tokio::fs::write(&temp, &json).await.map_err(ErrorKind::Io)?;
        tokio::fs::rename(&temp, &self.path).await.map_err(ErrorKind::Io)?;
        tracing::debug!(path = %self.path.display(), files = doc.files.len(), pending_deletes = doc.pending_deletes.len(), "State saved");
        Ok(())
    }

    /* ===== file states ===== */

    pub async fn file(&self, name: &str) -> Option<FileState> {
        self.inner.read().await.files.get(name).cloned()
    }

    pub async fn set_file(&self, name: impl Into<String>, state: FileState) {
        self.inner.write().await.files.insert(name.into(), state);
    }

    pub async fn remove_file(&self, name: &str) -> Option<FileState> {
        self.inner.write().await.files.remove(name)
    }

    pub async fn files(&self) -> HashMap<String, FileState> {
        self.inner.read().await.files.clone()
    }

    /* ===== pending deletes ===== */

    pub async fn pending_deletes(&self) -> HashMap<String, PendingDelete> {
        self.inner.read().await.pending_deletes.clone()
    }

    pub async fn insert_pending_delete(&self, doc_id: impl Into<String>, pending: PendingDelete) {
        self.inner.write().await.pending_deletes.insert(doc_id.into(), pending);
    }

    pub async fn remove_pending_delete(&self, doc_id: &str) -> Option<PendingDelete> {
        self.inner.write().await.pending_deletes.remove(doc_id)
    }

    /// Upgrade an existing pending delete to a stale-update delete: a fresh
    /// upload must follow its eventual success.
    pub async fn mark_reupload_on_success(&self, doc_id: &str, file_name: &str) {
        if let Some(pending) = self.inner.write().await.pending_deletes.get_mut(doc_id) {
            pending.file_name = Some(file_name.to_string());
            pending.reupload_on_success = true;
        }
    }

    /* ===== pending uploads (in-memory) ===== */

    pub async fn pending_uploads(&self) -> HashMap<String, PendingUpload> {
        self.inner.read().await.pending_uploads.clone()
    }

    pub async fn insert_pending_upload(&self, track_id: impl Into<String>, pending: PendingUpload) {
        self.inner.write().await.pending_uploads.insert(track_id.into(), pending);
    }

    pub async fn remove_pending_upload(&self, track_id: &str) -> Option<PendingUpload> {
        self.inner.write().await.pending_uploads.remove(track_id)
    }
}

fn sibling_temp(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn parse_snapshot(raw: &[u8]) -> Option<Snapshot> {
    let value: serde_json::Value = serde_json::from_slice(raw).ok()?;
    let object = value.as_object()?;
    // Current form carries a "files" and/or "pendingDeletes" key; anything
    // else is the legacy bare file map.
    if object.contains_key("files") || object.contains_key("pendingDeletes") {
        let doc: SnapshotDoc = serde_json::from_value(value).ok()?;
        return Some(Snapshot {
            files: doc.files,
            pending_deletes: doc.pending_deletes,
        });
    }
    let files: HashMap<String, FileState> = serde_json::from_value(value).ok()?;
    Some(Snapshot {
        files,
        pending_deletes: HashMap::new(),
    })
}
