//! Backend document models.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Document status keys, always lowercased.
///
/// `processed` and `failed` are terminal; everything else (including a
/// missing status) is treated as still in flight.
pub mod status {
    pub const PROCESSED: &str = "processed";
    pub const FAILED: &str = "failed";
    pub const PROCESSING: &str = "processing";
}

/// The backend's view of one ingested document.
///
/// Field names match the wire format. Every field except `id` is optional
/// because backends in the wild omit them freely; the sync engine treats
/// absent values as "unknown" rather than erroring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub id: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub track_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error_msg: Option<String>,
}
impl DocumentInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            file_path: None,
            created_at: None,
            track_id: None,
            status: None,
            error_msg: None,
        }
    }

    /// Lowercase the status key in place (the engine only ever compares
    /// lowercased statuses).
    pub(crate) fn normalize(mut self) -> Self {
        if let Some(status) = self.status.take() {
            self.status = Some(status.to_ascii_lowercase());
        }
        self
    }

    pub fn has_status(&self, wanted: &str) -> bool {
        self.status.as_deref() == Some(wanted)
    }

    /// Whether this document was ingested under the given source file name.
    ///
    /// The backend stores its own internal path; binding back to a source
    /// entry is a suffix match on the presented file name.
    pub fn matches_source_name(&self, name: &str) -> bool {
        self.file_path.as_deref().is_some_and(|p| p.ends_with(name))
    }

    /// `created_at` with an empty-string floor, for null-safe ordering.
    pub fn created_at_key(&self) -> &str {
        self.created_at.as_deref().unwrap_or("")
    }
}

/// Group documents by their (lowercased) status key.
///
/// Documents without a status land under the empty-string key; the engine
/// treats that bucket as non-terminal.
pub fn group_by_status(docs: Vec<DocumentInfo>) -> HashMap<String, Vec<DocumentInfo>> {
    let mut grouped: HashMap<String, Vec<DocumentInfo>> = HashMap::new();
    for doc in docs {
        let key = doc.status.clone().unwrap_or_default();
        grouped.entry(key).or_default().push(doc);
    }
    grouped
}
