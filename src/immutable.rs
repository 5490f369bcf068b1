//! ImmutableStore (L1b) — versioned blobs with temporal (as-of-timestamp)
//! reads, using an archive-then-replace sequencing on write and a
//! versioned-value/history-entry shape for reads.
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{MemoryError, MemoryResult};
use crate::export::{csv_escape, ExportFormat};
use crate::types::{now_ms, Metadata, Timestamp};

/// An archived prior version of an entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionSnapshot {
    /// The version number this snapshot captured.
    pub version: u64,
    /// The data at that version.
    pub data: JsonValue,
    /// When that version was current.
    pub timestamp: Timestamp,
    /// Opaque metadata at that version.
    pub metadata: Option<Metadata>,
}

/// A versioned, composite-keyed `(type, id)` blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImmutableEntry {
    /// The entry's type/collection name.
    pub entry_type: String,
    /// The entry's id within its type.
    pub id: String,
    /// Current data.
    pub data: JsonValue,
    /// Current version (starts at 1, increments on each `store`).
    pub version: u64,
    /// Archived versions, oldest → newest.
    pub previous_versions: Vec<VersionSnapshot>,
    /// Optional owner, for GDPR cascade collection.
    pub user_id: Option<String>,
    /// Creation time (first `store`).
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
    /// Current metadata.
    pub metadata: Option<Metadata>,
}

type Key = (String, String);

/// The L1b immutable store.
#[derive(Debug, Default)]
pub struct ImmutableStore {
    entries: DashMap<Key, ImmutableEntry>,
    by_user: DashMap<String, Vec<Key>>,
}

impl ImmutableStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value. Idempotent on `(type, id)`: if the entry exists, its
    /// current state is archived into `previous_versions` before the new
    /// data replaces it and `version` increments.
    pub fn store(
        &self,
        entry_type: impl Into<String>,
        id: impl Into<String>,
        data: JsonValue,
        user_id: Option<String>,
        metadata: Option<Metadata>,
    ) -> ImmutableEntry {
        let entry_type = entry_type.into();
        let id = id.into();
        let key = (entry_type.clone(), id.clone());
        let now = now_ms();

        let entry = match self.entries.get(&key) {
            Some(existing) => {
                let mut updated = existing.clone();
                updated.previous_versions.push(VersionSnapshot {
                    version: updated.version,
                    data: updated.data.clone(),
                    timestamp: updated.updated_at,
                    metadata: updated.metadata.clone(),
                });
                updated.version += 1;
                updated.data = data;
                updated.updated_at = now;
                updated.metadata = metadata;
                if user_id.is_some() {
                    updated.user_id = user_id;
                }
                updated
            }
            None => ImmutableEntry {
                entry_type,
                id,
                data,
                version: 1,
                previous_versions: Vec::new(),
                user_id: user_id.clone(),
                created_at: now,
                updated_at: now,
                metadata,
            },
        };

        if let Some(uid) = &entry.user_id {
            self.by_user.entry(uid.clone()).or_default().push(key.clone());
        }
        self.entries.insert(key, entry.clone());
        entry
    }

    /// Fetch the current state.
    pub fn get(&self, entry_type: &str, id: &str) -> MemoryResult<ImmutableEntry> {
        self.entries
            .get(&(entry_type.to_string(), id.to_string()))
            .map(|e| e.clone())
            .ok_or_else(|| MemoryError::KeyNotFound(format!("{entry_type}/{id}")))
    }

    /// Fetch a specific archived version (or the current one).
    pub fn get_version(&self, entry_type: &str, id: &str, version: u64) -> MemoryResult<JsonValue> {
        let entry = self.get(entry_type, id)?;
        if entry.version == version {
            return Ok(entry.data);
        }
        entry
            .previous_versions
            .iter()
            .find(|v| v.version == version)
            .map(|v| v.data.clone())
            .ok_or_else(|| MemoryError::KeyNotFound(format!("{entry_type}/{id}@v{version}")))
    }

    /// Full version history, oldest → newest, including the current version.
    pub fn get_history(&self, entry_type: &str, id: &str) -> MemoryResult<Vec<VersionSnapshot>> {
        let entry = self.get(entry_type, id)?;
        let mut history = entry.previous_versions.clone();
        history.push(VersionSnapshot {
            version: entry.version,
            data: entry.data,
            timestamp: entry.updated_at,
            metadata: entry.metadata,
        });
        Ok(history)
    }

    /// Returns the first of: current state if `updatedAt <= ts`; else the
    /// latest archived version with `timestamp <= ts`; else `None`.
    pub fn get_at_timestamp(&self, entry_type: &str, id: &str, ts: Timestamp) -> Option<JsonValue> {
        let entry = self.entries.get(&(entry_type.to_string(), id.to_string()))?;
        if entry.updated_at <= ts {
            return Some(entry.data.clone());
        }
        entry
            .previous_versions
            .iter()
            .filter(|v| v.timestamp <= ts)
            .max_by_key(|v| v.version)
            .map(|v| v.data.clone())
    }

    /// List all entries of a given type (or all entries if `entry_type` is
    /// `None`).
    pub fn list(&self, entry_type: Option<&str>) -> Vec<ImmutableEntry> {
        self.entries
            .iter()
            .map(|e| e.value().clone())
            .filter(|e| entry_type.map_or(true, |t| e.entry_type == t))
            .collect()
    }

    /// Case-insensitive substring search over the stringified `data`.
    pub fn search(&self, query: &str, entry_type: Option<&str>) -> Vec<ImmutableEntry> {
        let needle = query.to_lowercase();
        self.list(entry_type)
            .into_iter()
            .filter(|e| e.data.to_string().to_lowercase().contains(&needle))
            .collect()
    }

    /// Count entries of a given type.
    pub fn count(&self, entry_type: Option<&str>) -> usize {
        self.list(entry_type).len()
    }

    /// Permanently remove an entry and all its history.
    pub fn purge(&self, entry_type: &str, id: &str) -> MemoryResult<()> {
        let key = (entry_type.to_string(), id.to_string());
        let (_, entry) = self
            .entries
            .remove(&key)
            .ok_or_else(|| MemoryError::KeyNotFound(format!("{entry_type}/{id}")))?;
        if let Some(uid) = &entry.user_id {
            if let Some(mut v) = self.by_user.get_mut(uid) {
                v.retain(|k| k != &key);
            }
        }
        Ok(())
    }

    /// Purge many `(type, id)` pairs, skipping ones that don't exist.
    pub fn purge_many(&self, keys: &[(String, String)]) -> usize {
        keys.iter().filter(|(t, id)| self.purge(t, id).is_ok()).count()
    }

    /// Re-insert an entry exactly as given, reindexing it. Used to replay a
    /// cascade backup when a rollback is required.
    pub fn restore(&self, entry: ImmutableEntry) {
        let key = (entry.entry_type.clone(), entry.id.clone());
        if let Some(uid) = &entry.user_id {
            self.by_user.entry(uid.clone()).or_default().push(key.clone());
        }
        self.entries.insert(key, entry);
    }

    /// Trim `previous_versions` to the last `keep_latest_n` by version
    /// number. The current state is untouched.
    pub fn purge_versions(&self, entry_type: &str, id: &str, keep_latest_n: usize) -> MemoryResult<()> {
        let mut entry = self
            .entries
            .get_mut(&(entry_type.to_string(), id.to_string()))
            .ok_or_else(|| MemoryError::KeyNotFound(format!("{entry_type}/{id}")))?;
        entry.previous_versions.sort_by_key(|v| v.version);
        let len = entry.previous_versions.len();
        if len > keep_latest_n {
            entry.previous_versions.drain(..len - keep_latest_n);
        }
        Ok(())
    }

    /// Export entries of a given type.
    pub fn export(&self, entry_type: Option<&str>, format: ExportFormat) -> String {
        let entries = self.list(entry_type);
        match format {
            ExportFormat::Json => serde_json::to_string(&entries).unwrap_or_default(),
            ExportFormat::Csv => {
                let mut out = String::from("type,id,version,updatedAt,data\n");
                for e in &entries {
                    out.push_str(&format!(
                        "{},{},{},{},{}\n",
                        csv_escape(&e.entry_type),
                        csv_escape(&e.id),
                        e.version,
                        e.updated_at,
                        csv_escape(&e.data.to_string()),
                    ));
                }
                out
            }
        }
    }

    /// All `(type, id)` keys linked to a user, for GDPR cascade collection.
    pub fn collect_for_user(&self, user_id: &str) -> Vec<(String, String)> {
        self.by_user.get(user_id).map(|v| v.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn store_is_idempotent_and_archives_previous_state() {
        let store = ImmutableStore::new();
        let v1 = store.store("kb-article", "refund", json!({"days": 30}), None, None);
        assert_eq!(v1.version, 1);

        let v2 = store.store("kb-article", "refund", json!({"days": 60}), None, None);
        assert_eq!(v2.version, 2);
        assert_eq!(v2.previous_versions.len(), 1);
        assert_eq!(v2.previous_versions[0].data, json!({"days": 30}));
    }

    #[test]
    fn get_at_timestamp_returns_value_as_of_time() {
        let store = ImmutableStore::new();
        let v1 = store.store("kb-article", "refund", json!({"days": 30}), None, None);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let v2 = store.store("kb-article", "refund", json!({"days": 60}), None, None);

        assert_eq!(store.get_at_timestamp("kb-article", "refund", v1.updated_at), Some(json!({"days": 30})));
        assert_eq!(store.get_at_timestamp("kb-article", "refund", v2.updated_at), Some(json!({"days": 60})));
        assert_eq!(store.get_at_timestamp("kb-article", "refund", v1.updated_at - 1), None);
    }

    #[test]
    fn purge_versions_keeps_only_latest_n() {
        let store = ImmutableStore::new();
        for i in 1..=5 {
            store.store("doc", "a", json!({"rev": i}), None, None);
        }
        store.purge_versions("doc", "a", 2).unwrap();
        let entry = store.get("doc", "a").unwrap();
        assert_eq!(entry.version, 5, "current version is untouched");
        assert_eq!(entry.previous_versions.len(), 2);
        assert_eq!(entry.previous_versions.last().unwrap().version, 4);
    }

    #[test]
    fn get_history_includes_current_and_all_archived() {
        let store = ImmutableStore::new();
        store.store("doc", "a", json!({"rev": 1}), None, None);
        store.store("doc", "a", json!({"rev": 2}), None, None);
        let history = store.get_history("doc", "a").unwrap();
        assert_eq!(history.len(), 2);
    }
}
