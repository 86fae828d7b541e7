//! Per-cycle counters.

use std::ops::AddAssign;

/// What one reconciliation cycle (startup or poll tick) actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Files uploaded (or re-uploaded).
    pub uploaded: u64,
    /// Backend documents deleted, including deletes deferred as busy.
    pub deleted: u64,
    /// Files whose backend copy was stale and replaced.
    pub stale: u64,
    /// Per-file terminal failures recorded this cycle.
    pub failed: u64,
}

impl SyncStats {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign for SyncStats {
    fn add_assign(&mut self, other: Self) {
        self.uploaded += other.uploaded;
        self.deleted += other.deleted;
        self.stale += other.stale;
        self.failed += other.failed;
    }
}
