//! ConversationLog (L1a) — append-only message threads.
//!
//! A `DashMap` of current state plus `DashMap`-backed secondary indexes,
//! shaped around an append-only conversation rather than a versioned scalar
//! value.
use std::collections::HashSet;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult};
use crate::export::{csv_escape, ExportFormat};
use crate::types::{new_id, now_ms, Metadata, Pagination, Timestamp};

/// Role of the speaker within a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// A human user.
    User,
    /// An agent.
    Agent,
}

impl MessageRole {
    /// All enumerated values, used by the parametric filter regression test.
    pub const ALL: [MessageRole; 2] = [MessageRole::User, MessageRole::Agent];

    fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Agent => "agent",
        }
    }
}

/// Conversation participant shape: user-agent or agent-agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConversationType {
    /// A single user talking to a single participant (agent/tool).
    UserAgent,
    /// Multiple agents talking to each other (Hive Mode).
    AgentAgent,
}

impl ConversationType {
    /// All enumerated values, used by the parametric filter regression test.
    pub const ALL: [ConversationType; 2] =
        [ConversationType::UserAgent, ConversationType::AgentAgent];

    fn as_str(&self) -> &'static str {
        match self {
            ConversationType::UserAgent => "user-agent",
            ConversationType::AgentAgent => "agent-agent",
        }
    }
}

/// Who is participating in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Participants {
    /// `user-agent`: one user, one addressable participant.
    UserAgent {
        /// The human user.
        user_id: String,
        /// The agent/tool participant. `agentId` is accepted as a legacy
        /// alias on input but is never persisted under that name.
        #[serde(alias = "agent_id")]
        participant_id: String,
    },
    /// `agent-agent`: an ordered sequence of agent ids (Hive Mode).
    AgentAgent {
        /// Participating agent ids, in conversation order.
        agent_ids: Vec<String>,
    },
}

/// A single immutable message within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Stable message id, unique within the conversation.
    pub id: String,
    /// Who spoke.
    pub role: MessageRole,
    /// The message text.
    pub content: String,
    /// Attribution, when the speaker was a user.
    pub user_id: Option<String>,
    /// Attribution, when the speaker was a participant/agent.
    pub participant_id: Option<String>,
    /// When the message was appended (epoch ms).
    pub timestamp: Timestamp,
    /// Opaque metadata.
    pub metadata: Option<Metadata>,
}

/// A conversation: an append-only, ordered sequence of messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique id.
    pub conversation_id: String,
    /// Tenant/isolation key.
    pub memory_space_id: String,
    /// user-agent or agent-agent.
    #[serde(rename = "type")]
    pub conversation_type: ConversationType,
    /// The participants.
    pub participants: Participants,
    /// Append-only message sequence.
    pub messages: Vec<Message>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time (message append).
    pub updated_at: Timestamp,
    /// Opaque metadata.
    pub metadata: Option<Metadata>,
}

impl Conversation {
    /// `messageCount` invariant: always equal to `|messages|`.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

/// Filter accepted by `list`/`count`/`search`.
#[derive(Debug, Clone, Default)]
pub struct ConversationFilter {
    /// Restrict to a memory space.
    pub memory_space_id: Option<String>,
    /// Restrict to a user id (participant in a user-agent conversation).
    pub user_id: Option<String>,
    /// Restrict to a conversation type.
    pub conversation_type: Option<ConversationType>,
}

/// The L1a conversation log.
#[derive(Debug, Default)]
pub struct ConversationLog {
    by_id: DashMap<String, Conversation>,
    by_memory_space: DashMap<String, Vec<String>>,
    by_memory_space_user: DashMap<(String, String), Vec<String>>,
    by_user: DashMap<String, Vec<String>>,
    by_type: DashMap<ConversationType, Vec<String>>,
}

impl ConversationLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    fn index_insert(&self, conv: &Conversation) {
        self.by_memory_space
            .entry(conv.memory_space_id.clone())
            .or_default()
            .push(conv.conversation_id.clone());
        self.by_type
            .entry(conv.conversation_type)
            .or_default()
            .push(conv.conversation_id.clone());
        if let Participants::UserAgent { user_id, .. } = &conv.participants {
            self.by_user
                .entry(user_id.clone())
                .or_default()
                .push(conv.conversation_id.clone());
            self.by_memory_space_user
                .entry((conv.memory_space_id.clone(), user_id.clone()))
                .or_default()
                .push(conv.conversation_id.clone());
        }
    }

    fn index_remove(&self, conv: &Conversation) {
        if let Some(mut v) = self.by_memory_space.get_mut(&conv.memory_space_id) {
            v.retain(|id| id != &conv.conversation_id);
        }
        if let Some(mut v) = self.by_type.get_mut(&conv.conversation_type) {
            v.retain(|id| id != &conv.conversation_id);
        }
        if let Participants::UserAgent { user_id, .. } = &conv.participants {
            if let Some(mut v) = self.by_user.get_mut(user_id) {
                v.retain(|id| id != &conv.conversation_id);
            }
            let key = (conv.memory_space_id.clone(), user_id.clone());
            if let Some(mut v) = self.by_memory_space_user.get_mut(&key) {
                v.retain(|id| id != &conv.conversation_id);
            }
        }
    }

    /// Create a new conversation.
    pub fn create(
        &self,
        memory_space_id: impl Into<String>,
        conversation_type: ConversationType,
        participants: Participants,
        metadata: Option<Metadata>,
    ) -> Conversation {
        let now = now_ms();
        let conv = Conversation {
            conversation_id: new_id(),
            memory_space_id: memory_space_id.into(),
            conversation_type,
            participants,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata,
        };
        self.index_insert(&conv);
        self.by_id.insert(conv.conversation_id.clone(), conv.clone());
        conv
    }

    /// Fetch a conversation by id.
    pub fn get(&self, conversation_id: &str) -> MemoryResult<Conversation> {
        self.by_id
            .get(conversation_id)
            .map(|e| e.clone())
            .ok_or_else(|| MemoryError::ConversationNotFound(conversation_id.to_string()))
    }

    /// Append a message. Timestamps are clamped to be monotonically
    /// non-decreasing within the conversation.
    pub fn add_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: impl Into<String>,
        user_id: Option<String>,
        participant_id: Option<String>,
        timestamp: Timestamp,
        metadata: Option<Metadata>,
    ) -> MemoryResult<Message> {
        let mut entry = self
            .by_id
            .get_mut(conversation_id)
            .ok_or_else(|| MemoryError::ConversationNotFound(conversation_id.to_string()))?;

        let last_timestamp = entry.messages.last().map(|m| m.timestamp).unwrap_or(i64::MIN);
        let clamped = timestamp.max(last_timestamp);

        let message = Message {
            id: new_id(),
            role,
            content: content.into(),
            user_id,
            participant_id,
            timestamp: clamped,
            metadata,
        };
        entry.messages.push(message.clone());
        entry.updated_at = now_ms();
        Ok(message)
    }

    /// Fetch a single message by id.
    pub fn get_message(&self, conversation_id: &str, message_id: &str) -> MemoryResult<Message> {
        let conv = self.get(conversation_id)?;
        conv.messages
            .into_iter()
            .find(|m| m.id == message_id)
            .ok_or_else(|| MemoryError::ConversationNotFound(format!("{conversation_id}/{message_id}")))
    }

    /// Fetch multiple messages by id, preserving the order of `message_ids`.
    pub fn get_messages_by_ids(
        &self,
        conversation_id: &str,
        message_ids: &[String],
    ) -> MemoryResult<Vec<Message>> {
        let conv = self.get(conversation_id)?;
        Ok(message_ids
            .iter()
            .filter_map(|id| conv.messages.iter().find(|m| &m.id == id).cloned())
            .collect())
    }

    /// Paginated message history for one conversation.
    pub fn get_history(&self, conversation_id: &str, pagination: Pagination) -> MemoryResult<Vec<Message>> {
        let conv = self.get(conversation_id)?;
        Ok(pagination.apply(conv.messages))
    }

    /// Select which secondary index to use for a filter, guarding against a
    /// historical tautology-bug regression: when `type` is combined with a
    /// non-type index, apply a real post-filter.
    fn candidates(&self, filter: &ConversationFilter) -> Vec<String> {
        match (&filter.memory_space_id, &filter.user_id) {
            (Some(space), Some(user)) => self
                .by_memory_space_user
                .get(&(space.clone(), user.clone()))
                .map(|v| v.clone())
                .unwrap_or_default(),
            (Some(space), None) => self
                .by_memory_space
                .get(space)
                .map(|v| v.clone())
                .unwrap_or_default(),
            (None, Some(user)) => self.by_user.get(user).map(|v| v.clone()).unwrap_or_default(),
            (None, None) => match filter.conversation_type {
                Some(t) => self.by_type.get(&t).map(|v| v.clone()).unwrap_or_default(),
                None => self.by_id.iter().map(|e| e.key().clone()).collect(),
            },
        }
    }

    /// List conversations matching `filter`.
    pub fn list(&self, filter: &ConversationFilter) -> Vec<Conversation> {
        let ids = self.candidates(filter);
        let mut seen = HashSet::with_capacity(ids.len());
        ids.into_iter()
            .filter(|id| seen.insert(id.clone()))
            .filter_map(|id| self.by_id.get(&id).map(|e| e.clone()))
            // Post-filter: a real condition, not the historical tautology bug.
            .filter(|c| filter.conversation_type.map_or(true, |t| c.conversation_type == t))
            .filter(|c| filter.memory_space_id.as_deref().map_or(true, |s| c.memory_space_id == s))
            .filter(|c| {
                filter.user_id.as_deref().map_or(true, |u| match &c.participants {
                    Participants::UserAgent { user_id, .. } => user_id == u,
                    Participants::AgentAgent { .. } => false,
                })
            })
            .collect()
    }

    /// Count conversations matching `filter`.
    pub fn count(&self, filter: &ConversationFilter) -> usize {
        self.list(filter).len()
    }

    /// Case-insensitive substring scan over messages, honoring `filter`.
    /// Returns conversations most-recently-updated first.
    pub fn search(&self, query: &str, filter: &ConversationFilter) -> Vec<Conversation> {
        let needle = query.to_lowercase();
        let mut results: Vec<Conversation> = self
            .list(filter)
            .into_iter()
            .filter(|c| c.messages.iter().any(|m| m.content.to_lowercase().contains(&needle)))
            .collect();
        results.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        results
    }

    /// Find an existing conversation for the given participants/type/space,
    /// if one exists.
    pub fn find_conversation(
        &self,
        memory_space_id: &str,
        conversation_type: ConversationType,
        participants: &Participants,
    ) -> Option<Conversation> {
        self.by_memory_space
            .get(memory_space_id)?
            .iter()
            .filter_map(|id| self.by_id.get(id).map(|e| e.clone()))
            .find(|c| c.conversation_type == conversation_type && &c.participants == participants)
    }

    /// Find a matching conversation or create one.
    pub fn get_or_create(
        &self,
        memory_space_id: impl Into<String>,
        conversation_type: ConversationType,
        participants: Participants,
        metadata: Option<Metadata>,
    ) -> Conversation {
        let memory_space_id = memory_space_id.into();
        if let Some(existing) = self.find_conversation(&memory_space_id, conversation_type, &participants) {
            return existing;
        }
        self.create(memory_space_id, conversation_type, participants, metadata)
    }

    /// Delete a conversation.
    pub fn delete(&self, conversation_id: &str) -> MemoryResult<()> {
        let (_, conv) = self
            .by_id
            .remove(conversation_id)
            .ok_or_else(|| MemoryError::ConversationNotFound(conversation_id.to_string()))?;
        self.index_remove(&conv);
        Ok(())
    }

    /// Delete many conversations, skipping ones that don't exist.
    pub fn delete_many(&self, conversation_ids: &[String]) -> usize {
        conversation_ids.iter().filter(|id| self.delete(id).is_ok()).count()
    }

    /// Re-insert a conversation exactly as given, reindexing it. Used to
    /// replay a cascade backup when a rollback is required.
    pub fn restore(&self, conv: Conversation) {
        self.index_insert(&conv);
        self.by_id.insert(conv.conversation_id.clone(), conv);
    }

    /// Export conversations matching `filter`.
    pub fn export(&self, filter: &ConversationFilter, format: ExportFormat) -> String {
        let conversations = self.list(filter);
        match format {
            ExportFormat::Json => serde_json::to_string(&conversations).unwrap_or_default(),
            ExportFormat::Csv => {
                let mut out = String::from("conversationId,type,messageId,role,timestamp,content,userId,participantId\n");
                for c in &conversations {
                    for m in &c.messages {
                        out.push_str(&format!(
                            "{},{},{},{},{},{},{},{}\n",
                            csv_escape(&c.conversation_id),
                            csv_escape(c.conversation_type.as_str()),
                            csv_escape(&m.id),
                            csv_escape(m.role.as_str()),
                            m.timestamp,
                            csv_escape(&m.content),
                            csv_escape(m.user_id.as_deref().unwrap_or("")),
                            csv_escape(m.participant_id.as_deref().unwrap_or("")),
                        ));
                    }
                }
                out
            }
        }
    }

    /// All conversation ids touching the given user, for GDPR cascade
    /// collection (participant or message author).
    pub fn collect_for_user(&self, user_id: &str) -> Vec<String> {
        self.by_id
            .iter()
            .filter(|e| {
                let c = e.value();
                let is_participant = matches!(&c.participants, Participants::UserAgent { user_id: u, .. } if u == user_id);
                let authored = c.messages.iter().any(|m| m.user_id.as_deref() == Some(user_id));
                is_participant || authored
            })
            .map(|e| e.key().clone())
            .collect()
    }

    /// All conversation ids touching the given participant/agent, for agent
    /// unregister cascade.
    pub fn collect_for_participant(&self, participant_id: &str) -> Vec<String> {
        self.by_id
            .iter()
            .filter(|e| {
                let c = e.value();
                match &c.participants {
                    Participants::UserAgent { participant_id: p, .. } => p == participant_id,
                    Participants::AgentAgent { agent_ids } => agent_ids.iter().any(|a| a == participant_id),
                }
            })
            .map(|e| e.key().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_agent(user: &str, participant: &str) -> Participants {
        Participants::UserAgent {
            user_id: user.to_string(),
            participant_id: participant.to_string(),
        }
    }

    #[test]
    fn add_message_preserves_order_and_clamps_timestamp() {
        let log = ConversationLog::new();
        let conv = log.create("space-1", ConversationType::UserAgent, user_agent("u-1", "p-1"), None);

        log.add_message(&conv.conversation_id, MessageRole::User, "hi", Some("u-1".into()), None, 100, None)
            .unwrap();
        let second = log
            .add_message(&conv.conversation_id, MessageRole::Agent, "hello", None, Some("p-1".into()), 50, None)
            .unwrap();

        assert_eq!(second.timestamp, 100, "non-monotonic timestamp must clamp to the prior max");
        let history = log.get(&conv.conversation_id).unwrap();
        assert_eq!(history.messages.len(), 2);
        assert_eq!(history.message_count(), 2);
    }

    #[test]
    fn list_by_type_combined_with_memory_space_is_not_tautological() {
        let log = ConversationLog::new();
        log.create("space-1", ConversationType::UserAgent, user_agent("u-1", "p-1"), None);
        log.create("space-1", ConversationType::AgentAgent, Participants::AgentAgent { agent_ids: vec!["a".into(), "b".into()] }, None);

        let filter = ConversationFilter {
            memory_space_id: Some("space-1".into()),
            user_id: None,
            conversation_type: Some(ConversationType::UserAgent),
        };
        let results = log.list(&filter);
        assert_eq!(results.len(), 1);
        assert!(results.iter().all(|c| c.conversation_type == ConversationType::UserAgent));
        assert!(results.iter().all(|c| c.memory_space_id == "space-1"));
    }

    #[test]
    fn search_is_case_insensitive_and_orders_most_recent_first() {
        let log = ConversationLog::new();
        let conv1 = log.create("space-1", ConversationType::UserAgent, user_agent("u-1", "p-1"), None);
        let conv2 = log.create("space-1", ConversationType::UserAgent, user_agent("u-2", "p-2"), None);

        log.add_message(&conv1.conversation_id, MessageRole::User, "The Password is Blue", Some("u-1".into()), None, 1, None).unwrap();
        log.add_message(&conv2.conversation_id, MessageRole::User, "password reset", Some("u-2".into()), None, 2, None).unwrap();

        let results = log.search("password", &ConversationFilter::default());
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].conversation_id, conv2.conversation_id, "most recently updated first");
    }

    #[test]
    fn export_csv_has_stable_columns() {
        let log = ConversationLog::new();
        let conv = log.create("space-1", ConversationType::UserAgent, user_agent("u-1", "p-1"), None);
        log.add_message(&conv.conversation_id, MessageRole::User, "hi, there", Some("u-1".into()), None, 1, None).unwrap();

        let csv = log.export(&ConversationFilter::default(), ExportFormat::Csv);
        assert!(csv.starts_with("conversationId,type,messageId,role,timestamp,content,userId,participantId\n"));
        assert!(csv.contains("\"hi, there\""), "embedded comma must be quoted per RFC 4180");
    }

    #[test]
    fn get_or_create_reuses_matching_conversation() {
        let log = ConversationLog::new();
        let first = log.get_or_create("space-1", ConversationType::UserAgent, user_agent("u-1", "p-1"), None);
        let second = log.get_or_create("space-1", ConversationType::UserAgent, user_agent("u-1", "p-1"), None);
        assert_eq!(first.conversation_id, second.conversation_id);
    }

    #[test]
    fn collect_for_user_finds_participant_and_author() {
        let log = ConversationLog::new();
        let conv = log.create("space-1", ConversationType::UserAgent, user_agent("u-1", "p-1"), None);
        let ids = log.collect_for_user("u-1");
        assert_eq!(ids, vec![conv.conversation_id]);
    }
}
