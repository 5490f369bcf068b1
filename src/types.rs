//! Shared types used across every layer: timestamps, metadata, pagination,
//! id generation and the mandatory strip-nulls utility.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// Epoch milliseconds, used for every `createdAt`/`updatedAt` field (not a
/// `DateTime` newtype) so filter comparisons are plain integer comparisons.
pub type Timestamp = i64;

/// Current time as epoch milliseconds.
pub fn now_ms() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}

/// Opaque per-entity metadata, as permitted by every entity in the data
/// model.
pub type Metadata = Map<String, JsonValue>;

/// Generate a new unique id. Every generated id (`conversationId`,
/// `messageId`, `memoryId`, `factId`, `contextId`) uses this.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Content-addressed hash of a JSON value, used by the immutable store (and
/// the vector/fact stores' version chains) to deduplicate identical payloads.
pub fn content_hash(value: &JsonValue) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

/// Strip `null` values from a JSON object, recursively. Optional parameters
/// MUST be omitted from backend payloads rather than sent as `null` — the
/// backend validators treat `null` as invalid for optional fields.
pub fn strip_nulls(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                if v.is_null() {
                    continue;
                }
                out.insert(k, strip_nulls(v));
            }
            JsonValue::Object(out)
        }
        JsonValue::Array(items) => {
            JsonValue::Array(items.into_iter().map(strip_nulls).collect())
        }
        other => other,
    }
}

/// Sort direction shared by every `list`/`search` operation that accepts
/// `sortOrder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending (the default for most read paths: most-recent-first).
    #[default]
    Desc,
}

/// Pagination parameters shared by every list-style operation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Number of results to skip.
    pub offset: Option<usize>,
}

impl Pagination {
    /// Apply limit/offset to a `Vec`, consuming it.
    pub fn apply<T>(&self, mut items: Vec<T>) -> Vec<T> {
        let offset = self.offset.unwrap_or(0).min(items.len());
        items.drain(..offset);
        if let Some(limit) = self.limit {
            items.truncate(limit);
        }
        items
    }
}

/// Per-layer record counts, used by cascade dry-runs and `getStats`-style
/// operations.
pub type LayerCounts = BTreeMap<String, usize>;
