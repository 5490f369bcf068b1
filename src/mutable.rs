//! MutableStore (L1c) — atomic key/value with namespaces. `update` takes the
//! `DashMap::entry()` guard for the duration of the closure, giving
//! read-then-write sequencing under a single lock.
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{MemoryError, MemoryResult};
use crate::types::{now_ms, Metadata, Timestamp};

/// A last-writer-wins key/value record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutableRecord {
    /// The namespace (collection) the key lives in.
    pub namespace: String,
    /// The key within the namespace.
    pub key: String,
    /// The current value.
    pub value: JsonValue,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last write time.
    pub updated_at: Timestamp,
    /// Opaque metadata.
    pub metadata: Option<Metadata>,
}

type Key = (String, String);

/// The L1c mutable store.
#[derive(Debug, Default)]
pub struct MutableStore {
    records: DashMap<Key, MutableRecord>,
}

impl MutableStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last-writer-wins set.
    pub fn set(
        &self,
        namespace: impl Into<String>,
        key: impl Into<String>,
        value: JsonValue,
        metadata: Option<Metadata>,
    ) -> MutableRecord {
        let namespace = namespace.into();
        let key = key.into();
        let full = (namespace.clone(), key.clone());
        let now = now_ms();
        let created_at = self.records.get(&full).map(|r| r.created_at).unwrap_or(now);
        let record = MutableRecord {
            namespace,
            key,
            value,
            created_at,
            updated_at: now,
            metadata,
        };
        self.records.insert(full, record.clone());
        record
    }

    /// Fetch the current value.
    pub fn get(&self, namespace: &str, key: &str) -> MemoryResult<JsonValue> {
        self.records
            .get(&(namespace.to_string(), key.to_string()))
            .map(|r| r.value.clone())
            .ok_or_else(|| MemoryError::KeyNotFound(format!("{namespace}/{key}")))
    }

    /// Fetch the full record (value + metadata).
    pub fn get_record(&self, namespace: &str, key: &str) -> MemoryResult<MutableRecord> {
        self.records
            .get(&(namespace.to_string(), key.to_string()))
            .map(|r| r.clone())
            .ok_or_else(|| MemoryError::KeyNotFound(format!("{namespace}/{key}")))
    }

    /// Atomically read the current value, apply `updater`, and store the
    /// result. `updater` is invoked with the value (not the record); if the
    /// key does not exist it is invoked with `None`. If it returns `None`,
    /// the key is not created/modified.
    pub fn update(
        &self,
        namespace: &str,
        key: &str,
        updater: impl FnOnce(Option<&JsonValue>) -> Option<JsonValue>,
    ) -> MemoryResult<Option<MutableRecord>> {
        let full = (namespace.to_string(), key.to_string());
        let now = now_ms();

        match self.records.entry(full) {
            dashmap::mapref::entry::Entry::Occupied(mut occ) => {
                let current = occ.get().value.clone();
                match updater(Some(&current)) {
                    Some(new_value) => {
                        occ.get_mut().value = new_value;
                        occ.get_mut().updated_at = now;
                        Ok(Some(occ.get().clone()))
                    }
                    None => Ok(Some(occ.get().clone())),
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vac) => match updater(None) {
                Some(new_value) => {
                    let record = MutableRecord {
                        namespace: namespace.to_string(),
                        key: key.to_string(),
                        value: new_value,
                        created_at: now,
                        updated_at: now,
                        metadata: None,
                    };
                    vac.insert(record.clone());
                    Ok(Some(record))
                }
                None => Ok(None),
            },
        }
    }

    /// Specialization of `update`: add `by` to the current numeric value
    /// (default 0 if absent).
    pub fn increment(&self, namespace: &str, key: &str, by: f64) -> MemoryResult<f64> {
        let result = self.update(namespace, key, |current| {
            let n = current.and_then(|v| v.as_f64()).unwrap_or(0.0);
            Some(serde_json::json!(n + by))
        })?;
        Ok(result.and_then(|r| r.value.as_f64()).unwrap_or(by))
    }

    /// Specialization of `update`: subtract `by` from the current numeric
    /// value (default 0 if absent).
    pub fn decrement(&self, namespace: &str, key: &str, by: f64) -> MemoryResult<f64> {
        self.increment(namespace, key, -by)
    }

    /// Delete a key.
    pub fn delete(&self, namespace: &str, key: &str) -> MemoryResult<()> {
        self.records
            .remove(&(namespace.to_string(), key.to_string()))
            .map(|_| ())
            .ok_or_else(|| MemoryError::KeyNotFound(format!("{namespace}/{key}")))
    }

    /// List all records in a namespace.
    pub fn list(&self, namespace: &str) -> Vec<MutableRecord> {
        self.records
            .iter()
            .filter(|e| e.key().0 == namespace)
            .map(|e| e.value().clone())
            .collect()
    }

    /// Count records in a namespace.
    pub fn count(&self, namespace: &str) -> usize {
        self.list(namespace).len()
    }

    /// Whether a key exists.
    pub fn exists(&self, namespace: &str, key: &str) -> bool {
        self.records.contains_key(&(namespace.to_string(), key.to_string()))
    }

    /// Delete every record in a namespace, returning the count removed.
    pub fn purge_namespace(&self, namespace: &str) -> usize {
        let keys: Vec<Key> = self
            .records
            .iter()
            .filter(|e| e.key().0 == namespace)
            .map(|e| e.key().clone())
            .collect();
        for key in &keys {
            self.records.remove(key);
        }
        keys.len()
    }

    /// Delete many `(namespace, key)` pairs, skipping ones that don't exist.
    pub fn purge_many(&self, keys: &[(String, String)]) -> usize {
        keys.iter().filter(|(ns, k)| self.delete(ns, k).is_ok()).count()
    }

    /// Re-insert a record exactly as given. Used to replay a cascade backup
    /// when a rollback is required.
    pub fn restore(&self, record: MutableRecord) {
        self.records.insert((record.namespace.clone(), record.key.clone()), record);
    }

    /// Deferred: the isolation level of a multi-key transaction is left
    /// unspecified rather than guessed at. See DESIGN.md for the recorded
    /// decision.
    pub fn transaction(&self, _writes: &[(String, String, JsonValue)]) -> MemoryResult<()> {
        Err(MemoryError::NotImplemented("mutable.transaction"))
    }

    /// Records in a namespace/key whose value or metadata carries the given
    /// user id, for GDPR cascade collection.
    pub fn collect_for_user(&self, user_id: &str) -> Vec<(String, String)> {
        self.records
            .iter()
            .filter(|e| value_mentions_user(&e.value().value, user_id) || metadata_mentions_user(&e.value().metadata, user_id))
            .map(|e| e.key().clone())
            .collect()
    }
}

fn value_mentions_user(value: &JsonValue, user_id: &str) -> bool {
    match value {
        JsonValue::String(s) => s == user_id,
        JsonValue::Object(map) => map.get("userId").map(|v| v == user_id).unwrap_or(false),
        _ => false,
    }
}

fn metadata_mentions_user(metadata: &Option<Metadata>, user_id: &str) -> bool {
    metadata
        .as_ref()
        .and_then(|m| m.get("userId"))
        .map(|v| v == user_id)
        .unwrap_or(false)
}
