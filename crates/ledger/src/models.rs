//! Ledger models.
//!
//! `FileState` and `PendingDelete` are durable (serialized into the state
//! snapshot, camelCase keys — the on-disk format predates this
//! implementation and is fixed). `PendingUpload` is in-memory only: it is
//! redundant with state the backend can be asked about, so a crash loses
//! nothing that the next startup listing cannot rebuild.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;

/// Per-file sync record.
///
/// Invariant: `hash == None && doc_id == None` means the file has been
/// observed but not uploaded. A non-null `hash` is the MD5 of the source
/// content for which `doc_id` (if non-null) holds in the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileState {
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub last_modified: i64,
    #[serde(default)]
    pub doc_id: Option<String>,
}
impl FileState {
    pub fn new(hash: Option<String>, last_modified: i64, doc_id: Option<String>) -> Self {
        Self {
            hash,
            last_modified,
            doc_id,
        }
    }

    /// A file that has been seen in a listing but never hashed or uploaded.
    pub fn observed(last_modified: i64) -> Self {
        Self::new(None, last_modified, None)
    }
}

/// A backend document whose delete was deferred on a busy response.
///
/// `file_name == None` marks an orphan or duplicate discovered during
/// startup — no follow-up action after the delete succeeds.
/// `reupload_on_success` means the deferred delete was half of a
/// stale-update; a fresh upload must follow a successful delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDelete {
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub reupload_on_success: bool,
}
impl PendingDelete {
    pub fn orphan() -> Self {
        Self {
            file_name: None,
            reupload_on_success: false,
        }
    }

    pub fn for_file(file_name: impl Into<String>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            reupload_on_success: false,
        }
    }
}

/// An accepted upload awaiting a terminal status from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub file_name: String,
    pub hash: String,
    pub uploaded_at: OffsetDateTime,
}
impl PendingUpload {
    pub fn new(file_name: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            hash: hash.into(),
            uploaded_at: OffsetDateTime::now_utc(),
        }
    }
}

/// An owned copy of the persisted state, independent of the live store.
///
/// The engine decides which entries to retain; loading never merges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub files: HashMap<String, FileState>,
    pub pending_deletes: HashMap<String, PendingDelete>,
}
