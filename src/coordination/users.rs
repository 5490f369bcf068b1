//! Users — the registry of human participants, plus the GDPR "right to
//! erasure" cascade across every layer that can hold user-linked data.
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::cascade::CascadePlan;
use super::contexts::{Context, Contexts};
use super::{CascadeBackup, CascadeReport};
use crate::conversation::ConversationLog;
use crate::error::{MemoryError, MemoryResult};
use crate::facts::FactStore;
use crate::graph::GraphAdapter;
use crate::immutable::ImmutableStore;
use crate::mutable::MutableStore;
use crate::types::{now_ms, Metadata, Timestamp};
use crate::vector::VectorIndex;

/// A registered human user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique id.
    pub user_id: String,
    /// Display name.
    pub display_name: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
    /// Opaque metadata.
    pub metadata: Option<Metadata>,
}

/// The user registry.
#[derive(Debug, Default)]
pub struct Users {
    users: DashMap<String, User>,
}

impl Users {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user with a caller-chosen id.
    pub fn register(&self, user_id: impl Into<String>, display_name: Option<String>, metadata: Option<Metadata>) -> User {
        let now = now_ms();
        let user_id = user_id.into();
        let user = User { user_id: user_id.clone(), display_name, created_at: now, updated_at: now, metadata };
        self.users.insert(user_id, user.clone());
        user
    }

    /// Fetch a user by id.
    pub fn get(&self, user_id: &str) -> MemoryResult<User> {
        self.users.get(user_id).map(|e| e.clone()).ok_or_else(|| MemoryError::UserNotFound(user_id.to_string()))
    }

    /// List every registered user.
    pub fn list(&self) -> Vec<User> {
        self.users.iter().map(|e| e.value().clone()).collect()
    }

    /// Update display name/metadata.
    pub fn update(&self, user_id: &str, display_name: Option<String>, metadata: Option<Metadata>) -> MemoryResult<User> {
        let mut user = self.users.get_mut(user_id).ok_or_else(|| MemoryError::UserNotFound(user_id.to_string()))?;
        if display_name.is_some() {
            user.display_name = display_name;
        }
        if metadata.is_some() {
            user.metadata = metadata;
        }
        user.updated_at = now_ms();
        Ok(user.clone())
    }

    /// Erase every record touching `user_id` across every layer, including
    /// the `Contexts` registry (participation only; a shared context itself
    /// survives) and, when a graph mirror is configured, every mirrored node
    /// carrying a matching `userId` property.
    ///
    /// Runs Collect → (graph-first) Execute → Backup → Execute → Verify. If
    /// verification finds residue (a layer still reports the user present
    /// after deletion), the backup is replayed to restore the deleted
    /// records and `MemoryError::CascadeFailed` is returned carrying the
    /// residue counts. The graph mirror is best-effort and derived, so it is
    /// not backed up or restored on rollback — only the layers it mirrors
    /// are authoritative. With `dry_run`, only Collect runs and nothing is
    /// mutated.
    #[allow(clippy::too_many_arguments)]
    pub async fn delete(
        &self,
        user_id: &str,
        dry_run: bool,
        conversations: &ConversationLog,
        immutable: &ImmutableStore,
        mutable: &MutableStore,
        vectors: &VectorIndex,
        facts: &FactStore,
        contexts: &Contexts,
        graph: Option<&dyn GraphAdapter>,
    ) -> MemoryResult<CascadeReport> {
        self.get(user_id)?;

        let conversation_ids = conversations.collect_for_user(user_id);
        let immutable_keys = immutable.collect_for_user(user_id);
        let mutable_keys = mutable.collect_for_user(user_id);
        let vector_ids = vectors.collect_for_user(user_id);
        let fact_ids = facts.collect_for_user(user_id);
        let context_ids = contexts.collect_for_user(user_id);
        let cascade = CascadePlan::new(user_id, graph);
        let graph_node_ids = cascade.collect("userId").await?;

        let mut deleted = crate::types::LayerCounts::new();
        deleted.insert("conversations".into(), conversation_ids.len());
        deleted.insert("immutable".into(), immutable_keys.len());
        deleted.insert("mutable".into(), mutable_keys.len());
        deleted.insert("vectors".into(), vector_ids.len());
        deleted.insert("facts".into(), fact_ids.len());
        deleted.insert("contexts".into(), context_ids.len());
        deleted.insert("graph".into(), graph_node_ids.len());

        if dry_run {
            return Ok(CascadeReport { subject_id: user_id.to_string(), dry_run: true, deleted, backup_id: None });
        }

        cascade.execute(&graph_node_ids).await?;

        let mut backup = CascadeBackup::new(user_id);
        backup.put("conversations", &conversation_ids.iter().filter_map(|id| conversations.get(id).ok()).collect::<Vec<_>>());
        backup.put("immutable", &immutable_keys.iter().filter_map(|(t, id)| immutable.get(t, id).ok()).collect::<Vec<_>>());
        backup.put("mutable", &mutable_keys.iter().filter_map(|(ns, k)| mutable.get_record(ns, k).ok()).collect::<Vec<_>>());
        backup.put("vectors", &vector_ids.iter().filter_map(|id| vectors.get(id).ok()).collect::<Vec<_>>());
        backup.put("facts", &fact_ids.iter().filter_map(|id| facts.get(id, true).ok()).collect::<Vec<_>>());
        backup.put("contexts", &context_ids.iter().filter_map(|id| contexts.get(id).ok()).collect::<Vec<Context>>());
        let backup_id = backup.backup_id.clone();

        conversations.delete_many(&conversation_ids);
        immutable.purge_many(&immutable_keys);
        mutable.purge_many(&mutable_keys);
        vectors.purge_many(&vector_ids);
        for id in &fact_ids {
            let _ = facts.delete(id);
        }
        for id in &context_ids {
            let _ = contexts.purge_participant(id, user_id);
        }

        let mut residue = std::collections::BTreeMap::new();
        let remaining_conversations = conversations.collect_for_user(user_id).len();
        let remaining_immutable = immutable.collect_for_user(user_id).len();
        let remaining_mutable = mutable.collect_for_user(user_id).len();
        let remaining_vectors = vectors.collect_for_user(user_id).len();
        let remaining_facts = facts.collect_for_user(user_id).len();
        let remaining_contexts = contexts.collect_for_user(user_id).len();
        if remaining_conversations > 0 {
            residue.insert("conversations".to_string(), remaining_conversations);
        }
        if remaining_immutable > 0 {
            residue.insert("immutable".to_string(), remaining_immutable);
        }
        if remaining_mutable > 0 {
            residue.insert("mutable".to_string(), remaining_mutable);
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
            for entry in backup.take::<crate::immutable::ImmutableEntry>("immutable") {
                immutable.restore(entry);
            }
            for record in backup.take::<crate::mutable::MutableRecord>("mutable") {
                mutable.restore(record);
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
                subject_id: user_id.to_string(),
                reason: "post-delete verification found residue".to_string(),
                backup_id,
                residue,
            });
        }

        self.users.remove(user_id);
        Ok(CascadeReport { subject_id: user_id.to_string(), dry_run: false, deleted, backup_id: Some(backup_id) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{ConversationType, Participants};

    #[tokio::test]
    async fn dry_run_counts_without_deleting() {
        let users = Users::new();
        users.register("user-1", None, None);
        let conversations = ConversationLog::new();
        conversations.create("space-1", ConversationType::UserAgent, Participants::UserAgent { user_id: "user-1".into(), participant_id: "p-1".into() }, None);
        let immutable = ImmutableStore::new();
        let mutable = MutableStore::new();
        let vectors = VectorIndex::new();
        let facts = FactStore::new();
        let contexts = Contexts::new();

        let report = users.delete("user-1", true, &conversations, &immutable, &mutable, &vectors, &facts, &contexts, None).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.deleted["conversations"], 1);
        assert_eq!(conversations.count(&Default::default()), 1, "dry run must not mutate");
    }

    #[tokio::test]
    async fn cascade_deletes_across_every_layer_with_zero_residue() {
        let users = Users::new();
        users.register("user-1", None, None);
        let conversations = ConversationLog::new();
        conversations.create("space-1", ConversationType::UserAgent, Participants::UserAgent { user_id: "user-1".into(), participant_id: "p-1".into() }, None);
        let immutable = ImmutableStore::new();
        immutable.store("profile", "user-1", serde_json::json!({"x": 1}), Some("user-1".into()), None);
        let mutable = MutableStore::new();
        mutable.set("prefs", "user-1", serde_json::json!({"userId": "user-1"}), None);
        let vectors = VectorIndex::new();
        let source = crate::vector::Source { source_type: crate::vector::SourceType::System, user_id: Some("user-1".into()), participant_id: None };
        vectors.store("space-1", "note", None, 50, vec![], Some(source), None, None).unwrap();
        let facts = FactStore::new();
        facts
            .store("space-1", crate::facts::FactType::Preference, "user-1", "likes", serde_json::json!("tea"), 80, crate::facts::FactSourceType::Manual, None, Some("user-1".into()), None, vec![], None, None, None)
            .unwrap();
        let contexts = Contexts::new();
        let ctx = contexts.create("space-1", "ticket", None, None, None, None, vec!["user-1".into()], None).unwrap();
        let graph = crate::graph::InMemoryGraph::new();
        graph.create_node("mem-graph-1", vec!["Memory".into()], serde_json::json!({"userId": "user-1"})).await.unwrap();

        let report = users.delete("user-1", false, &conversations, &immutable, &mutable, &vectors, &facts, &contexts, Some(&graph)).await.unwrap();
        assert!(!report.dry_run);
        assert!(report.backup_id.is_some());
        assert_eq!(report.deleted["graph"], 1);

        assert!(conversations.collect_for_user("user-1").is_empty());
        assert!(immutable.collect_for_user("user-1").is_empty());
        assert!(mutable.collect_for_user("user-1").is_empty());
        assert!(vectors.collect_for_user("user-1").is_empty());
        assert!(facts.collect_for_user("user-1").is_empty());
        assert!(contexts.collect_for_user("user-1").is_empty());
        assert!(contexts.get(&ctx.context_id).is_ok(), "the context itself survives, only the participation is removed");
        assert!(users.get("user-1").is_err());
        assert!(graph.find_nodes_by_property("userId", serde_json::json!("user-1")).await.unwrap().is_empty());
    }
}
