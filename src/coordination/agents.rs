//! Agents — the registry of addressable participants (agents and tools),
//! plus the unregister cascade over participant-linked data. Shares the
//! Collect → Backup → Execute+Verify → Rollback shape with `users::delete`,
//! scoped to the layers that key on `participantId` rather than `userId`.
use dashmap::DashMap;
use serde_json::Value as JsonValue;

use super::cascade::CascadePlan;
use super::contexts::{Context, Contexts};
use super::{CascadeBackup, CascadeReport};
use crate::conversation::ConversationLog;
use crate::error::{MemoryError, MemoryResult};
use crate::facts::FactStore;
use crate::graph::GraphAdapter;
use crate::types::{now_ms, Metadata, Timestamp};
use crate::vector::VectorIndex;
use serde::{Deserialize, Serialize};

/// A registered agent/tool participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique id (the `participantId` used elsewhere).
    pub participant_id: String,
    /// Display name.
    pub display_name: Option<String>,
    /// Free-form configuration (model, prompt, tool list, ...).
    pub config: Option<JsonValue>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
    /// Opaque metadata.
    pub metadata: Option<Metadata>,
}

/// The agent registry.
#[derive(Debug, Default)]
pub struct Agents {
    agents: DashMap<String, Agent>,
}

impl Agents {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent with a caller-chosen id.
    pub fn register(&self, participant_id: impl Into<String>, display_name: Option<String>, config: Option<JsonValue>, metadata: Option<Metadata>) -> Agent {
        let now = now_ms();
        let participant_id = participant_id.into();
        let agent = Agent { participant_id: participant_id.clone(), display_name, config, created_at: now, updated_at: now, metadata };
        self.agents.insert(participant_id, agent.clone());
        agent
    }

    /// Fetch an agent by id.
    pub fn get(&self, participant_id: &str) -> MemoryResult<Agent> {
        self.agents.get(participant_id).map(|e| e.clone()).ok_or_else(|| MemoryError::AgentNotFound(participant_id.to_string()))
    }

    /// List every registered agent.
    pub fn list(&self) -> Vec<Agent> {
        self.agents.iter().map(|e| e.value().clone()).collect()
    }

    /// Update display name/metadata.
    pub fn update(&self, participant_id: &str, display_name: Option<String>, metadata: Option<Metadata>) -> MemoryResult<Agent> {
        let mut agent = self.agents.get_mut(participant_id).ok_or_else(|| MemoryError::AgentNotFound(participant_id.to_string()))?;
        if display_name.is_some() {
            agent.display_name = display_name;
        }
        if metadata.is_some() {
            agent.metadata = metadata;
        }
        agent.updated_at = now_ms();
        Ok(agent.clone())
    }

    /// Replace an agent's configuration wholesale.
    pub fn configure(&self, participant_id: &str, config: JsonValue) -> MemoryResult<Agent> {
        let mut agent = self.agents.get_mut(participant_id).ok_or_else(|| MemoryError::AgentNotFound(participant_id.to_string()))?;
        agent.config = Some(config);
        agent.updated_at = now_ms();
        Ok(agent.clone())
    }

    /// Remove an agent and cascade-delete the conversations, vector
    /// memories, facts, `Contexts` participation and (when a graph mirror is
    /// configured) mirrored nodes linked to it. Same Collect →
    /// (graph-first) Execute → Backup → Execute+Verify → Rollback shape as
    /// `users::delete`.
    #[allow(clippy::too_many_arguments)]
    pub async fn unregister(
        &self,
        participant_id: &str,
        dry_run: bool,
        conversations: &ConversationLog,
        vectors: &VectorIndex,
        facts: &FactStore,
        contexts: &Contexts,
        graph: Option<&dyn GraphAdapter>,
    ) -> MemoryResult<CascadeReport> {
        self.get(participant_id)?;

        let conversation_ids = conversations.collect_for_participant(participant_id);
        let vector_ids = vectors.collect_for_participant(participant_id);
        let fact_ids = facts.collect_for_participant(participant_id);
        let context_ids = contexts.collect_for_participant(participant_id);
        let cascade = CascadePlan::new(participant_id, graph);
        let graph_node_ids = cascade.collect("participantId").await?;

        let mut deleted = crate::types::LayerCounts::new();
        deleted.insert("conversations".into(), conversation_ids.len());
        deleted.insert("vectors".into(), vector_ids.len());
        deleted.insert("facts".into(), fact_ids.len());
        deleted.insert("contexts".into(), context_ids.len());
        deleted.insert("graph".into(), graph_node_ids.len());

        if dry_run {
            return Ok(CascadeReport { subject_id: participant_id.to_string(), dry_run: true, deleted, backup_id: None });
        }

        cascade.execute(&graph_node_ids).await?;

        let mut backup = CascadeBackup::new(participant_id);
        backup.put("conversations", &conversation_ids.iter().filter_map(|id| conversations.get(id).ok()).collect::<Vec<_>>());
        backup.put("vectors", &vector_ids.iter().filter_map(|id| vectors.get(id).ok()).collect::<Vec<_>>());
        backup.put("facts", &fact_ids.iter().filter_map(|id| facts.get(id, true).ok()).collect::<Vec<_>>());
        backup.put("contexts", &context_ids.iter().filter_map(|id| contexts.get(id).ok()).collect::<Vec<Context>>());
        let backup_id = backup.backup_id.clone();

        conversations.delete_many(&conversation_ids);
        vectors.purge_many(&vector_ids);
        for id in &fact_ids {
            let _ = facts.delete(id);
        }
        for id in &context_ids {
            let _ = contexts.purge_participant(id, participant_id);
        }

        let mut residue = std::collections::BTreeMap::new();
        let remaining_conversations = conversations.collect_for_participant(participant_id).len();
        let remaining_vectors = vectors.collect_for_participant(participant_id).len();
        let remaining_facts = facts.collect_for_participant(participant_id).len();
        let remaining_contexts = contexts.collect_for_participant(participant_id).len();
        if remaining_conversations > 0 {
            residue.insert("conversations".to_string(), remaining_conversations);
        }
        if remaining_vectors > 0 {
            residue.insert("vectors".to_string(), remaining_vectors);
        }
        if remaining_facts > 0 {
            residue.insert("facts".to_string(), remaining_facts);
        }
        if remaining_contexts > 0 {
            residue.insert("contexts".to_string(), remaining_contexts);
        }

        if !residue.is_empty() {
            for conv in backup.take::<crate::conversation::Conversation>("conversations") {
                conversations.restore(conv);
            }
            for memory in backup.take::<crate::vector::VectorMemory>("vectors") {
                vectors.restore(memory);
            }
            for fact in backup.take::<crate::facts::Fact>("facts") {
                facts.restore(fact);
            }
            for context in backup.take::<Context>("contexts") {
                contexts.restore(context);
            }
            return Err(MemoryError::CascadeFailed {
                subject_id: participant_id.to_string(),
                reason: "post-delete verification found residue".to_string(),
                backup_id,
                residue,
            });
        }

        self.agents.remove(participant_id);
        Ok(CascadeReport { subject_id: participant_id.to_string(), dry_run: false, deleted, backup_id: Some(backup_id) })
    }
}
