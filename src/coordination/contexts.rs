//! Contexts — a forest of nested conversational scopes (e.g. "support
//! ticket" containing "troubleshooting thread"). Parent/child bookkeeping
//! uses an incoming/outgoing adjacency split, specialized to a
//! single-parent tree instead of a general graph.
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{MemoryError, MemoryResult};
use crate::types::{new_id, now_ms, Metadata, Timestamp};

/// Lifecycle state of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContextStatus {
    #[default]
    Active,
    Completed,
    Cancelled,
    Archived,
}

impl ContextStatus {
    pub const ALL: [ContextStatus; 4] = [ContextStatus::Active, ContextStatus::Completed, ContextStatus::Cancelled, ContextStatus::Archived];
}

/// How a memory space was admitted into a context via `grant_access`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaborationMode {
    /// The granted space's content is visible but not addable-to.
    Read,
    /// The granted space's content is visible and addressable.
    Collaborate,
}

impl CollaborationMode {
    pub const ALL: [CollaborationMode; 2] = [CollaborationMode::Read, CollaborationMode::Collaborate];
}

/// A cross-space collaboration grant, distinct from `participants` (which
/// tracks individual users/agents, not whole memory spaces).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub memory_space_id: String,
    pub mode: CollaborationMode,
}

/// A nested conversational scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    /// Unique id.
    pub context_id: String,
    /// Tenant/isolation key.
    pub memory_space_id: String,
    /// Display name.
    pub name: String,
    /// Why the context was opened (free text, e.g. "support ticket #482").
    pub purpose: Option<String>,
    /// Opaque caller-owned payload, distinct from `metadata`.
    pub data: Option<JsonValue>,
    /// Lifecycle state.
    pub status: ContextStatus,
    /// The enclosing context, if any.
    pub parent_context_id: Option<String>,
    /// The conversation this context was opened from, if any.
    pub conversation_id: Option<String>,
    /// Participant ids with access.
    pub participants: Vec<String>,
    /// Other memory spaces granted visibility into this context, and under
    /// which collaboration mode.
    pub access_grants: Vec<AccessGrant>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
    /// Opaque metadata.
    pub metadata: Option<Metadata>,
}

/// The context registry.
#[derive(Debug, Default)]
pub struct Contexts {
    by_id: DashMap<String, Context>,
    children: DashMap<String, Vec<String>>,
    by_conversation: DashMap<String, Vec<String>>,
}

impl Contexts {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context. `parent_context_id`, if given, must already exist.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        memory_space_id: impl Into<String>,
        name: impl Into<String>,
        purpose: Option<String>,
        data: Option<JsonValue>,
        parent_context_id: Option<String>,
        conversation_id: Option<String>,
        participants: Vec<String>,
        metadata: Option<Metadata>,
    ) -> MemoryResult<Context> {
        if let Some(parent) = &parent_context_id {
            if !self.by_id.contains_key(parent) {
                return Err(MemoryError::ContextNotFound(parent.clone()));
            }
        }
        let now = now_ms();
        let context = Context {
            context_id: new_id(),
            memory_space_id: memory_space_id.into(),
            name: name.into(),
            purpose,
            data,
            status: ContextStatus::default(),
            parent_context_id: parent_context_id.clone(),
            conversation_id: conversation_id.clone(),
            participants,
            access_grants: vec![],
            created_at: now,
            updated_at: now,
            metadata,
        };
        if let Some(parent) = &parent_context_id {
            self.children.entry(parent.clone()).or_default().push(context.context_id.clone());
        }
        if let Some(conv) = &conversation_id {
            self.by_conversation.entry(conv.clone()).or_default().push(context.context_id.clone());
        }
        self.by_id.insert(context.context_id.clone(), context.clone());
        Ok(context)
    }

    /// Fetch a context by id.
    pub fn get(&self, context_id: &str) -> MemoryResult<Context> {
        self.by_id.get(context_id).map(|e| e.clone()).ok_or_else(|| MemoryError::ContextNotFound(context_id.to_string()))
    }

    /// Update name/purpose/data/metadata.
    pub fn update(&self, context_id: &str, name: Option<String>, purpose: Option<String>, data: Option<JsonValue>, metadata: Option<Metadata>) -> MemoryResult<Context> {
        let mut ctx = self.by_id.get_mut(context_id).ok_or_else(|| MemoryError::ContextNotFound(context_id.to_string()))?;
        if let Some(n) = name {
            ctx.name = n;
        }
        if purpose.is_some() {
            ctx.purpose = purpose;
        }
        if data.is_some() {
            ctx.data = data;
        }
        if metadata.is_some() {
            ctx.metadata = metadata;
        }
        ctx.updated_at = now_ms();
        Ok(ctx.clone())
    }

    /// Transition a context's lifecycle state.
    pub fn set_status(&self, context_id: &str, status: ContextStatus) -> MemoryResult<Context> {
        let mut ctx = self.by_id.get_mut(context_id).ok_or_else(|| MemoryError::ContextNotFound(context_id.to_string()))?;
        ctx.status = status;
        ctx.updated_at = now_ms();
        Ok(ctx.clone())
    }

    /// Nesting depth: 0 for a root context, otherwise one more than its
    /// parent's depth. Derived from `parent_context_id` rather than stored,
    /// so it can never drift from the chain `delete`'s re-parenting builds.
    pub fn depth(&self, context_id: &str) -> MemoryResult<usize> {
        Ok(self.get_chain(context_id)?.len() - 1)
    }

    /// Delete a context. Children are re-parented to the deleted context's
    /// parent (or become roots) rather than being silently orphaned.
    pub fn delete(&self, context_id: &str) -> MemoryResult<()> {
        let (_, ctx) = self.by_id.remove(context_id).ok_or_else(|| MemoryError::ContextNotFound(context_id.to_string()))?;

        if let Some(parent) = &ctx.parent_context_id {
            if let Some(mut siblings) = self.children.get_mut(parent) {
                siblings.retain(|id| id != context_id);
            }
        }
        if let Some((_, orphaned_children)) = self.children.remove(context_id) {
            for child_id in orphaned_children {
                if let Some(mut child) = self.by_id.get_mut(&child_id) {
                    child.parent_context_id = ctx.parent_context_id.clone();
                }
                if let Some(parent) = &ctx.parent_context_id {
                    self.children.entry(parent.clone()).or_default().push(child_id);
                }
            }
        }
        if let Some(conv) = &ctx.conversation_id {
            if let Some(mut v) = self.by_conversation.get_mut(conv) {
                v.retain(|id| id != context_id);
            }
        }
        Ok(())
    }

    /// List contexts in a memory space.
    pub fn list(&self, memory_space_id: &str) -> Vec<Context> {
        self.by_id.iter().map(|e| e.value().clone()).filter(|c| c.memory_space_id == memory_space_id).collect()
    }

    /// Count contexts in a memory space.
    pub fn count(&self, memory_space_id: &str) -> usize {
        self.list(memory_space_id).len()
    }

    /// Case-insensitive substring search over `name`.
    pub fn search(&self, query: &str, memory_space_id: &str) -> Vec<Context> {
        let needle = query.to_lowercase();
        self.list(memory_space_id).into_iter().filter(|c| c.name.to_lowercase().contains(&needle)).collect()
    }

    /// Ancestor chain from `context_id` to its root, inclusive, root last.
    pub fn get_chain(&self, context_id: &str) -> MemoryResult<Vec<Context>> {
        let mut chain = vec![self.get(context_id)?];
        while let Some(parent_id) = chain.last().and_then(|c| c.parent_context_id.clone()) {
            chain.push(self.get(&parent_id)?);
        }
        Ok(chain)
    }

    /// The root ancestor of `context_id` (itself, if it has no parent).
    pub fn get_root(&self, context_id: &str) -> MemoryResult<Context> {
        Ok(self.get_chain(context_id)?.pop().expect("chain always has at least one element"))
    }

    /// Direct children of a context.
    pub fn get_children(&self, context_id: &str) -> Vec<Context> {
        self.children.get(context_id).map(|ids| ids.iter().filter_map(|id| self.by_id.get(id).map(|e| e.clone())).collect()).unwrap_or_default()
    }

    /// Contexts whose declared parent id no longer exists (should be
    /// unreachable given `create`'s validation and `delete`'s re-parenting,
    /// but checked directly rather than assumed).
    pub fn find_orphaned(&self, memory_space_id: &str) -> Vec<Context> {
        self.list(memory_space_id)
            .into_iter()
            .filter(|c| c.parent_context_id.as_ref().map(|p| !self.by_id.contains_key(p)).unwrap_or(false))
            .collect()
    }

    /// Add a participant if not already present.
    pub fn add_participant(&self, context_id: &str, participant_id: impl Into<String>) -> MemoryResult<Context> {
        let mut ctx = self.by_id.get_mut(context_id).ok_or_else(|| MemoryError::ContextNotFound(context_id.to_string()))?;
        let participant_id = participant_id.into();
        if !ctx.participants.contains(&participant_id) {
            ctx.participants.push(participant_id);
        }
        ctx.updated_at = now_ms();
        Ok(ctx.clone())
    }

    /// Remove a participant.
    pub fn remove_participant(&self, context_id: &str, participant_id: &str) -> MemoryResult<Context> {
        let mut ctx = self.by_id.get_mut(context_id).ok_or_else(|| MemoryError::ContextNotFound(context_id.to_string()))?;
        ctx.participants.retain(|p| p != participant_id);
        ctx.updated_at = now_ms();
        Ok(ctx.clone())
    }

    /// Grant another memory space visibility into this context, under
    /// `mode`. Distinct from `add_participant`: this admits a whole space
    /// for cross-space collaboration, not an individual user/agent.
    /// Re-granting the same space replaces its mode rather than duplicating
    /// the entry.
    pub fn grant_access(&self, context_id: &str, memory_space_id: impl Into<String>, mode: CollaborationMode) -> MemoryResult<Context> {
        let mut ctx = self.by_id.get_mut(context_id).ok_or_else(|| MemoryError::ContextNotFound(context_id.to_string()))?;
        let memory_space_id = memory_space_id.into();
        match ctx.access_grants.iter_mut().find(|g| g.memory_space_id == memory_space_id) {
            Some(grant) => grant.mode = mode,
            None => ctx.access_grants.push(AccessGrant { memory_space_id, mode }),
        }
        ctx.updated_at = now_ms();
        Ok(ctx.clone())
    }

    /// Revoke a previously granted space's access.
    pub fn revoke_access(&self, context_id: &str, memory_space_id: &str) -> MemoryResult<Context> {
        let mut ctx = self.by_id.get_mut(context_id).ok_or_else(|| MemoryError::ContextNotFound(context_id.to_string()))?;
        ctx.access_grants.retain(|g| g.memory_space_id != memory_space_id);
        ctx.updated_at = now_ms();
        Ok(ctx.clone())
    }

    /// Contexts opened from a given conversation.
    pub fn get_by_conversation(&self, conversation_id: &str) -> Vec<Context> {
        self.by_conversation.get(conversation_id).map(|ids| ids.iter().filter_map(|id| self.by_id.get(id).map(|e| e.clone())).collect()).unwrap_or_default()
    }

    /// Context ids that list `participant_id` among their participants —
    /// matches both human user ids and agent/tool participant ids, since
    /// `participants` does not itself distinguish the two.
    fn collect_for(&self, participant_id: &str) -> Vec<String> {
        self.by_id.iter().filter(|e| e.value().participants.iter().any(|p| p == participant_id)).map(|e| e.key().clone()).collect()
    }

    /// Context ids a user participates in.
    pub fn collect_for_user(&self, user_id: &str) -> Vec<String> {
        self.collect_for(user_id)
    }

    /// Context ids an agent/tool participates in.
    pub fn collect_for_participant(&self, participant_id: &str) -> Vec<String> {
        self.collect_for(participant_id)
    }

    /// Remove `participant_id` from a context's participant list, for use by
    /// a GDPR-style cascade. Unlike `delete`, the context itself (and any
    /// other participants) survives.
    pub fn purge_participant(&self, context_id: &str, participant_id: &str) -> MemoryResult<()> {
        self.remove_participant(context_id, participant_id).map(|_| ())
    }

    /// Overwrite (or reinsert) a context wholesale, for cascade rollback.
    pub fn restore(&self, context: Context) {
        if let Some(parent) = &context.parent_context_id {
            let siblings = self.children.entry(parent.clone()).or_default();
            if !siblings.contains(&context.context_id) {
                siblings.push(context.context_id.clone());
            }
        }
        if let Some(conv) = &context.conversation_id {
            let siblings = self.by_conversation.entry(conv.clone()).or_default();
            if !siblings.contains(&context.context_id) {
                siblings.push(context.context_id.clone());
            }
        }
        self.by_id.insert(context.context_id.clone(), context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_rejects_missing_parent() {
        let contexts = Contexts::new();
        let err = contexts.create("space-1", "child", None, None, Some("missing".into()), None, vec![], None).unwrap_err();
        assert!(matches!(err, MemoryError::ContextNotFound(_)));
    }

    #[test]
    fn get_chain_and_root_walk_to_the_top() {
        let contexts = Contexts::new();
        let root = contexts.create("space-1", "root", None, None, None, None, vec![], None).unwrap();
        let mid = contexts.create("space-1", "mid", None, None, Some(root.context_id.clone()), None, vec![], None).unwrap();
        let leaf = contexts.create("space-1", "leaf", None, None, Some(mid.context_id.clone()), None, vec![], None).unwrap();

        let chain = contexts.get_chain(&leaf.context_id).unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(contexts.get_root(&leaf.context_id).unwrap().context_id, root.context_id);
        assert_eq!(contexts.depth(&leaf.context_id).unwrap(), 2);
        assert_eq!(contexts.depth(&root.context_id).unwrap(), 0);
    }

    #[test]
    fn delete_reparents_children_instead_of_orphaning() {
        let contexts = Contexts::new();
        let root = contexts.create("space-1", "root", None, None, None, None, vec![], None).unwrap();
        let mid = contexts.create("space-1", "mid", None, None, Some(root.context_id.clone()), None, vec![], None).unwrap();
        let leaf = contexts.create("space-1", "leaf", None, None, Some(mid.context_id.clone()), None, vec![], None).unwrap();

        contexts.delete(&mid.context_id).unwrap();

        let leaf_after = contexts.get(&leaf.context_id).unwrap();
        assert_eq!(leaf_after.parent_context_id.as_deref(), Some(root.context_id.as_str()));
        assert!(contexts.find_orphaned("space-1").is_empty());
    }

    #[test]
    fn get_children_and_get_by_conversation() {
        let contexts = Contexts::new();
        let root = contexts.create("space-1", "root", None, None, None, Some("conv-1".into()), vec![], None).unwrap();
        let child = contexts.create("space-1", "child", None, None, Some(root.context_id.clone()), None, vec![], None).unwrap();

        assert_eq!(contexts.get_children(&root.context_id).len(), 1);
        assert_eq!(contexts.get_children(&root.context_id)[0].context_id, child.context_id);
        assert_eq!(contexts.get_by_conversation("conv-1").len(), 1);
    }

    #[test]
    fn grant_access_replaces_mode_instead_of_duplicating() {
        let contexts = Contexts::new();
        let ctx = contexts.create("space-1", "root", None, None, None, None, vec![], None).unwrap();

        contexts.grant_access(&ctx.context_id, "space-2", CollaborationMode::Read).unwrap();
        let with_read = contexts.grant_access(&ctx.context_id, "space-2", CollaborationMode::Collaborate).unwrap();
        assert_eq!(with_read.access_grants.len(), 1);
        assert_eq!(with_read.access_grants[0].mode, CollaborationMode::Collaborate);

        let revoked = contexts.revoke_access(&ctx.context_id, "space-2").unwrap();
        assert!(revoked.access_grants.is_empty());
    }

    #[test]
    fn set_status_transitions_lifecycle() {
        let contexts = Contexts::new();
        let ctx = contexts.create("space-1", "root", None, None, None, None, vec![], None).unwrap();
        assert_eq!(ctx.status, ContextStatus::Active);

        let archived = contexts.set_status(&ctx.context_id, ContextStatus::Archived).unwrap();
        assert_eq!(archived.status, ContextStatus::Archived);
    }

    #[test]
    fn purge_participant_removes_without_deleting_the_context() {
        let contexts = Contexts::new();
        let ctx = contexts.create("space-1", "root", None, None, None, None, vec!["user-1".into()], None).unwrap();
        assert_eq!(contexts.collect_for_user("user-1"), vec![ctx.context_id.clone()]);

        contexts.purge_participant(&ctx.context_id, "user-1").unwrap();
        assert!(contexts.collect_for_user("user-1").is_empty());
        assert!(contexts.get(&ctx.context_id).is_ok(), "the context itself survives");
    }
}
