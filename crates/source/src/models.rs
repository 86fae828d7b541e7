//! Source models.

/// Snapshot of one remote entry at listing time.
///
/// `name` is the bare file name (no directory components) and is unique
/// within a single listing. `last_modified_millis` is the transport's
/// last-modified timestamp in milliseconds since the Unix epoch; the sync
/// engine compares it for equality only, never arithmetically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileInfo {
    pub name: String,
    pub last_modified_millis: i64,
}
impl RemoteFileInfo {
    pub fn new(name: impl Into<String>, last_modified_millis: i64) -> Self {
        Self {
            name: name.into(),
            last_modified_millis,
        }
    }
}
