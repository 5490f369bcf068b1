//! Coordination (L4b) — cross-cutting registries (memory spaces, contexts,
//! users, agents) and the GDPR-style cascade delete shared by the latter
//! two. The cascade follows a Collect → Backup → Execute+Verify → Rollback
//! shape, using a replay-for-recovery vocabulary for the backup/restore
//! step.
pub mod agents;
pub mod cascade;
pub mod contexts;
pub mod memory_spaces;
pub mod users;

use serde::{Deserialize, Serialize};

use crate::types::{new_id, now_ms, LayerCounts, Timestamp};

/// A point-in-time snapshot of everything a cascade is about to delete,
/// serialized with `bincode` so it can be replayed on rollback without
/// re-deriving state from the (by-then partially mutated) stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeBackup {
    /// Unique id for this snapshot.
    pub backup_id: String,
    /// The user or agent (participant) id the cascade targets.
    pub subject_id: String,
    /// When the snapshot was taken.
    pub taken_at: Timestamp,
    /// Opaque, bincode-serialized per-layer record dumps, keyed by layer
    /// name (`"conversations"`, `"mutable"`, `"vectors"`, `"facts"`).
    pub layers: std::collections::BTreeMap<String, Vec<u8>>,
}

impl CascadeBackup {
    fn new(subject_id: impl Into<String>) -> Self {
        Self { backup_id: new_id(), subject_id: subject_id.into(), taken_at: now_ms(), layers: std::collections::BTreeMap::new() }
    }

    fn put<T: Serialize>(&mut self, layer: &str, records: &T) {
        if let Ok(bytes) = bincode::serialize(records) {
            self.layers.insert(layer.to_string(), bytes);
        }
    }

    fn take<T: for<'de> Deserialize<'de>>(&self, layer: &str) -> Vec<T> {
        self.layers.get(layer).and_then(|bytes| bincode::deserialize(bytes).ok()).unwrap_or_default()
    }
}

/// Result of a cascade delete (or dry run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeReport {
    /// The user or agent id the cascade targeted.
    pub subject_id: String,
    /// Whether records were actually removed (`false`) or merely counted
    /// (`true`, for `dryRun`).
    pub dry_run: bool,
    /// Records removed (or would be removed), per layer.
    pub deleted: LayerCounts,
    /// The backup snapshot id, when one was taken (never set for dry runs).
    pub backup_id: Option<String>,
}
