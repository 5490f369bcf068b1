//! MemorySpaces — the tenant/isolation boundary every other layer scopes its
//! records to. A small registry record rather than versioned values.
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult};
use crate::types::{now_ms, Metadata, Timestamp};

/// What a memory space is for — governs defaults elsewhere (sharing,
/// retention) that this registry itself does not enforce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemorySpaceType {
    #[default]
    Personal,
    Team,
    Project,
    Custom,
}

impl MemorySpaceType {
    pub const ALL: [MemorySpaceType; 4] = [MemorySpaceType::Personal, MemorySpaceType::Team, MemorySpaceType::Project, MemorySpaceType::Custom];
}

/// Lifecycle state of a memory space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemorySpaceStatus {
    #[default]
    Active,
    Archived,
}

impl MemorySpaceStatus {
    pub const ALL: [MemorySpaceStatus; 2] = [MemorySpaceStatus::Active, MemorySpaceStatus::Archived];
}

/// What kind of principal a participant entry names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantType {
    User,
    Tool,
    Agent,
}

/// A member of a memory space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    #[serde(rename = "type")]
    pub participant_type: ParticipantType,
}

/// A tenant/isolation boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySpace {
    /// Unique id.
    pub memory_space_id: String,
    /// Display name.
    pub name: String,
    /// What the space is for.
    pub space_type: MemorySpaceType,
    /// Members, typed as user/tool/agent.
    pub participants: Vec<Participant>,
    /// Lifecycle state.
    pub status: MemorySpaceStatus,
    /// Set when archived.
    pub archived_at: Option<Timestamp>,
    /// Why it was archived.
    pub archived_reason: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
    /// Opaque metadata.
    pub metadata: Option<Metadata>,
}

/// Per-layer record counts for a memory space, as returned by `get_stats`.
pub type MemorySpaceStats = crate::types::LayerCounts;

/// The memory space registry.
#[derive(Debug, Default)]
pub struct MemorySpaces {
    spaces: DashMap<String, MemorySpace>,
}

impl MemorySpaces {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new memory space with a caller-chosen id.
    pub fn register(&self, memory_space_id: impl Into<String>, name: impl Into<String>, space_type: MemorySpaceType, participants: Vec<Participant>, metadata: Option<Metadata>) -> MemorySpace {
        let now = now_ms();
        let space = MemorySpace {
            memory_space_id: memory_space_id.into(),
            name: name.into(),
            space_type,
            participants,
            status: MemorySpaceStatus::Active,
            archived_at: None,
            archived_reason: None,
            created_at: now,
            updated_at: now,
            metadata,
        };
        self.spaces.insert(space.memory_space_id.clone(), space.clone());
        space
    }

    /// Fetch a memory space by id.
    pub fn get(&self, memory_space_id: &str) -> MemoryResult<MemorySpace> {
        self.spaces.get(memory_space_id).map(|e| e.clone()).ok_or_else(|| MemoryError::MemorySpaceNotFound(memory_space_id.to_string()))
    }

    /// List all memory spaces, optionally excluding archived ones.
    pub fn list(&self, include_archived: bool) -> Vec<MemorySpace> {
        self.spaces.iter().map(|e| e.value().clone()).filter(|s| include_archived || s.archived_at.is_none()).collect()
    }

    /// Update a space's name/metadata.
    pub fn update(&self, memory_space_id: &str, name: Option<String>, metadata: Option<Metadata>) -> MemoryResult<MemorySpace> {
        let mut space = self.spaces.get_mut(memory_space_id).ok_or_else(|| MemoryError::MemorySpaceNotFound(memory_space_id.to_string()))?;
        if let Some(n) = name {
            space.name = n;
        }
        if metadata.is_some() {
            space.metadata = metadata;
        }
        space.updated_at = now_ms();
        Ok(space.clone())
    }

    /// Replace the participant list.
    pub fn update_participants(&self, memory_space_id: &str, participants: Vec<Participant>) -> MemoryResult<MemorySpace> {
        let mut space = self.spaces.get_mut(memory_space_id).ok_or_else(|| MemoryError::MemorySpaceNotFound(memory_space_id.to_string()))?;
        space.participants = participants;
        space.updated_at = now_ms();
        Ok(space.clone())
    }

    /// Archive a space (excluded from default `list`, still readable).
    pub fn archive(&self, memory_space_id: &str, reason: Option<String>) -> MemoryResult<MemorySpace> {
        let mut space = self.spaces.get_mut(memory_space_id).ok_or_else(|| MemoryError::MemorySpaceNotFound(memory_space_id.to_string()))?;
        space.status = MemorySpaceStatus::Archived;
        space.archived_at = Some(now_ms());
        space.archived_reason = reason;
        space.updated_at = now_ms();
        Ok(space.clone())
    }

    /// Un-archive a space.
    pub fn reactivate(&self, memory_space_id: &str) -> MemoryResult<MemorySpace> {
        let mut space = self.spaces.get_mut(memory_space_id).ok_or_else(|| MemoryError::MemorySpaceNotFound(memory_space_id.to_string()))?;
        space.status = MemorySpaceStatus::Active;
        space.archived_at = None;
        space.archived_reason = None;
        space.updated_at = now_ms();
        Ok(space.clone())
    }

    /// Remove the registry record itself. Deleting everything scoped to the
    /// space is the caller's (orchestrator's) responsibility, since this
    /// registry has no visibility into the other layers.
    pub fn delete(&self, memory_space_id: &str) -> MemoryResult<()> {
        self.spaces.remove(memory_space_id).map(|_| ()).ok_or_else(|| MemoryError::MemorySpaceNotFound(memory_space_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_excludes_from_default_list_but_remains_gettable() {
        let spaces = MemorySpaces::new();
        spaces.register("space-1", "Support", MemorySpaceType::Team, vec![], None);
        spaces.archive("space-1", Some("inactive".into())).unwrap();

        assert!(spaces.list(false).is_empty());
        assert_eq!(spaces.list(true).len(), 1);
        let space = spaces.get("space-1").unwrap();
        assert!(space.archived_at.is_some());
        assert_eq!(space.status, MemorySpaceStatus::Archived);
    }

    #[test]
    fn reactivate_clears_archive_fields() {
        let spaces = MemorySpaces::new();
        spaces.register("space-1", "Support", MemorySpaceType::Team, vec![], None);
        spaces.archive("space-1", Some("inactive".into())).unwrap();
        spaces.reactivate("space-1").unwrap();

        let space = spaces.get("space-1").unwrap();
        assert!(space.archived_at.is_none());
        assert!(space.archived_reason.is_none());
        assert_eq!(space.status, MemorySpaceStatus::Active);
    }

    #[test]
    fn participants_carry_a_distinct_type_per_principal() {
        let spaces = MemorySpaces::new();
        let participants = vec![
            Participant { id: "user-1".into(), participant_type: ParticipantType::User },
            Participant { id: "agent-1".into(), participant_type: ParticipantType::Agent },
        ];
        let space = spaces.register("space-1", "Support", MemorySpaceType::Personal, participants, None);
        assert_eq!(space.participants.len(), 2);
        assert!(space.participants.iter().any(|p| p.participant_type == ParticipantType::Agent));
    }
}
