//! Filter options accepted by `VectorIndex::list`/`count`/`search`.
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use super::types::{SourceType, VectorMemory};
use crate::types::Timestamp;

/// Whether tag filtering requires any or all of the given tags to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagMatch {
    /// At least one tag in common.
    #[default]
    Any,
    /// Every requested tag must be present.
    All,
}

/// Filter accepted by every VectorIndex read operation.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    /// Restrict to a memory space (always required by callers above this
    /// layer, but optional here so `list`/`count` can scope more broadly in
    /// tests).
    pub memory_space_id: Option<String>,
    /// Restrict to a participant/agent.
    pub participant_id: Option<String>,
    /// Restrict to a user.
    pub user_id: Option<String>,
    /// Restrict to memories carrying any/all of these tags.
    pub tags: Vec<String>,
    /// Whether `tags` is an any- or all-match.
    pub tag_match: TagMatch,
    /// Restrict to a provenance kind.
    pub source_type: Option<SourceType>,
    /// Minimum importance, inclusive.
    pub min_importance: Option<i64>,
    /// `createdAt < this`.
    pub created_before: Option<Timestamp>,
    /// `createdAt > this`.
    pub created_after: Option<Timestamp>,
    /// `updatedAt < this`.
    pub updated_before: Option<Timestamp>,
    /// `updatedAt > this`.
    pub updated_after: Option<Timestamp>,
    /// Exact metadata field-equality match.
    pub metadata: BTreeMap<String, JsonValue>,
    /// Include archived memories (default excludes them).
    pub include_archived: bool,
}

impl VectorFilter {
    /// Whether `memory` satisfies every set field of this filter.
    pub fn matches(&self, memory: &VectorMemory) -> bool {
        if memory.deleted_at.is_some() {
            return false;
        }
        if memory.archived && !self.include_archived {
            return false;
        }
        if let Some(space) = &self.memory_space_id {
            if &memory.memory_space_id != space {
                return false;
            }
        }
        if let Some(participant_id) = &self.participant_id {
            let matches = memory
                .source
                .as_ref()
                .and_then(|s| s.participant_id.as_ref())
                .map(|p| p == participant_id)
                .unwrap_or(false);
            if !matches {
                return false;
            }
        }
        if let Some(user_id) = &self.user_id {
            let matches = memory
                .source
                .as_ref()
                .and_then(|s| s.user_id.as_ref())
                .map(|u| u == user_id)
                .unwrap_or(false);
            if !matches {
                return false;
            }
        }
        if !self.tags.is_empty() {
            let ok = match self.tag_match {
                TagMatch::Any => self.tags.iter().any(|t| memory.tags.contains(t)),
                TagMatch::All => self.tags.iter().all(|t| memory.tags.contains(t)),
            };
            if !ok {
                return false;
            }
        }
        if let Some(source_type) = self.source_type {
            if memory.source.as_ref().map(|s| s.source_type) != Some(source_type) {
                return false;
            }
        }
        if let Some(min) = self.min_importance {
            if memory.importance < min {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if memory.created_at >= before {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if memory.created_at <= after {
                return false;
            }
        }
        if let Some(before) = self.updated_before {
            if memory.updated_at >= before {
                return false;
            }
        }
        if let Some(after) = self.updated_after {
            if memory.updated_at <= after {
                return false;
            }
        }
        for (field, expected) in &self.metadata {
            let actual = memory.metadata.as_ref().and_then(|m| m.get(field));
            if actual != Some(expected) {
                return false;
            }
        }
        true
    }
}
