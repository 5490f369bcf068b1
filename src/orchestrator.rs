//! MemoryOrchestrator (L4a) — the single entry point agents call to turn a
//! conversational turn into durable state across every lower layer. A
//! `pub async fn` facade wrapping synchronous layer calls, suspending only
//! at the genuinely asynchronous seams (embeddings, fact extraction, the
//! optional graph sync handoff).
use async_trait::async_trait;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;

use crate::conversation::{Conversation, ConversationLog, ConversationType, Message, MessageRole, Participants};
use crate::error::{MemoryError, MemoryResult};
use crate::facts::{FactSourceType, FactStore, FactType};
use crate::graph::ChangeEvent;
use crate::types::{Metadata, Pagination};
use crate::vector::{ConversationRef, Source, SourceType, VectorFilter, VectorIndex, VectorMemory, VectorSearchResult, VectorSortBy};

/// Generates an embedding for a piece of text. Pluggable so the engine never
/// hard-codes a specific embedding provider.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `text`.
    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>>;
}

/// A fact candidate produced by a `FactExtractor`.
#[derive(Debug, Clone)]
pub struct ExtractedFact {
    /// What kind of fact this is.
    pub fact_type: FactType,
    /// Who/what the fact is about.
    pub subject: String,
    /// The relationship or attribute name.
    pub predicate: String,
    /// The value.
    pub object: JsonValue,
    /// Confidence, `0..=100`.
    pub confidence: i64,
}

/// Extracts structured facts from a conversational turn. Pluggable so the
/// engine never hard-codes a specific extraction model.
#[async_trait]
pub trait FactExtractor: Send + Sync {
    /// Extract zero or more facts from one user/agent exchange.
    async fn extract(&self, user_message: &str, agent_message: &str) -> MemoryResult<Vec<ExtractedFact>>;
}

/// Input to `remember`/`remember_stream`.
#[derive(Debug, Clone)]
pub struct RememberInput {
    /// Tenant/isolation key.
    pub memory_space_id: String,
    /// Reuse this conversation, or find-or-create one matching
    /// `conversation_type`/`participants` when `None`.
    pub conversation_id: Option<String>,
    /// user-agent or agent-agent.
    pub conversation_type: ConversationType,
    /// The participants, used to find-or-create when `conversation_id` is
    /// `None`.
    pub participants: Participants,
    /// The human side of the turn.
    pub user_message: String,
    /// The agent side of the turn.
    pub agent_message: String,
    /// Tags to attach to derived memories.
    pub tags: Vec<String>,
    /// Whether to generate embeddings for the derived memories.
    pub embed: bool,
    /// Whether to extract facts from the turn.
    pub extract_facts: bool,
    /// Opaque metadata to attach to derived memories.
    pub metadata: Option<Metadata>,
}

/// Output of `remember`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RememberOutput {
    /// The conversation the turn was appended to.
    pub conversation_id: String,
    /// The appended user message id.
    pub user_message_id: String,
    /// The appended agent message id.
    pub agent_message_id: String,
    /// The derived user-turn memory id.
    pub user_memory_id: String,
    /// The derived agent-turn memory id.
    pub agent_memory_id: String,
    /// Facts written from this turn, if extraction was requested.
    pub fact_ids: Vec<String>,
}

/// Which stage of `remember` a `RememberPhaseEvent` reports on, in the exact
/// order they occur: append the user/agent messages (`Acid`), generate
/// embeddings (`Embedding`), write vector memories (`Vector`), extract facts
/// (`Facts`), hand off to the graph mirror (`Graph`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RememberPhase {
    /// Messages appended to the conversation log.
    Acid,
    /// Embeddings generated (skipped entirely if `embed == false`).
    Embedding,
    /// Memories written to the vector index.
    Vector,
    /// Facts extracted and stored (skipped if `extract_facts == false`).
    Facts,
    /// Graph mirror sync enqueued.
    Graph,
}

/// One progress event from `remember_stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RememberPhaseEvent {
    /// Which phase just completed.
    pub phase: RememberPhase,
    /// Whether the phase succeeded.
    pub status: String,
    /// Ids produced by this phase (message ids, memory ids, fact ids, ...).
    pub ids: Vec<String>,
}

/// The L4a memory orchestrator.
pub struct MemoryOrchestrator {
    conversations: ConversationLog,
    vectors: VectorIndex,
    facts: FactStore,
    embedding_provider: Option<Box<dyn EmbeddingProvider>>,
    fact_extractor: Option<Box<dyn FactExtractor>>,
    graph_events: Option<mpsc::Sender<ChangeEvent>>,
}

impl MemoryOrchestrator {
    /// Build an orchestrator. `graph_events`, when set, receives a
    /// best-effort notification after every write; a full sender never
    /// blocks or fails the write (the send result is ignored).
    pub fn new(
        conversations: ConversationLog,
        vectors: VectorIndex,
        facts: FactStore,
        embedding_provider: Option<Box<dyn EmbeddingProvider>>,
        fact_extractor: Option<Box<dyn FactExtractor>>,
        graph_events: Option<mpsc::Sender<ChangeEvent>>,
    ) -> Self {
        Self { conversations, vectors, facts, embedding_provider, fact_extractor, graph_events }
    }

    fn notify_graph(&self, event: ChangeEvent) {
        if let Some(tx) = &self.graph_events {
            if tx.try_send(event).is_err() {
                tracing::debug!("graph sync channel full or closed; event dropped from the write path");
            }
        }
    }

    /// Append a conversational turn and derive vector memories (and,
    /// optionally, facts) from it in one call.
    pub async fn remember(&self, input: RememberInput) -> MemoryResult<RememberOutput> {
        let conversation = self.resolve_conversation(&input)?;

        let user_message = self.conversations.add_message(
            &conversation.conversation_id,
            MessageRole::User,
            input.user_message.clone(),
            Self::user_id(&input.participants),
            None,
            crate::types::now_ms(),
            None,
        )?;
        let agent_message = self.conversations.add_message(
            &conversation.conversation_id,
            MessageRole::Agent,
            input.agent_message.clone(),
            None,
            Self::participant_id(&input.participants),
            crate::types::now_ms(),
            None,
        )?;

        let (user_embedding, agent_embedding) = if input.embed {
            match &self.embedding_provider {
                Some(provider) => (Some(provider.embed(&input.user_message).await?), Some(provider.embed(&input.agent_message).await?)),
                None => (None, None),
            }
        } else {
            (None, None)
        };

        let conversation_ref = ConversationRef { conversation_id: conversation.conversation_id.clone(), message_ids: vec![user_message.id.clone(), agent_message.id.clone()] };
        let source = Source { source_type: SourceType::Conversation, user_id: Self::user_id(&input.participants), participant_id: Self::participant_id(&input.participants) };

        let user_memory = self.vectors.store(
            input.memory_space_id.clone(),
            input.user_message.clone(),
            user_embedding,
            50,
            input.tags.clone(),
            Some(source.clone()),
            Some(conversation_ref.clone()),
            input.metadata.clone(),
        )?;
        let agent_memory = self.vectors.store(
            input.memory_space_id.clone(),
            input.agent_message.clone(),
            agent_embedding,
            50,
            input.tags.clone(),
            Some(source),
            Some(conversation_ref),
            input.metadata.clone(),
        )?;
        self.notify_graph(ChangeEvent::MemoryUpserted(user_memory.clone()));
        self.notify_graph(ChangeEvent::MemoryUpserted(agent_memory.clone()));

        let mut fact_ids = Vec::new();
        if input.extract_facts {
            if let Some(extractor) = &self.fact_extractor {
                let extracted = extractor.extract(&input.user_message, &input.agent_message).await?;
                for candidate in extracted {
                    let fact = self.facts.store(
                        input.memory_space_id.clone(),
                        candidate.fact_type,
                        candidate.subject,
                        candidate.predicate,
                        candidate.object,
                        candidate.confidence,
                        FactSourceType::Conversation,
                        Some(conversation.conversation_id.clone()),
                        Self::user_id(&input.participants),
                        Self::participant_id(&input.participants),
                        vec![],
                        None,
                        None,
                        None,
                    )?;
                    self.notify_graph(ChangeEvent::FactUpserted(fact.clone()));
                    fact_ids.push(fact.fact_id);
                }
            }
        }

        Ok(RememberOutput {
            conversation_id: conversation.conversation_id,
            user_message_id: user_message.id,
            agent_message_id: agent_message.id,
            user_memory_id: user_memory.memory_id,
            agent_memory_id: agent_memory.memory_id,
            fact_ids,
        })
    }

    /// Same as `remember`, but reports progress after each phase as it
    /// completes rather than only returning a final result.
    pub fn remember_stream<'a>(&'a self, input: RememberInput) -> impl Stream<Item = RememberPhaseEvent> + 'a {
        stream::unfold(RememberStreamState::Start(input), move |state| self.drive_remember_stream(state))
    }

    async fn drive_remember_stream(&self, state: RememberStreamState) -> Option<(RememberPhaseEvent, RememberStreamState)> {
        match state {
            RememberStreamState::Start(input) => {
                let conversation = match self.resolve_conversation(&input) {
                    Ok(c) => c,
                    Err(e) => return Some((Self::error_event(RememberPhase::Acid, &e), RememberStreamState::Done)),
                };
                let user_message = match self.conversations.add_message(&conversation.conversation_id, MessageRole::User, input.user_message.clone(), Self::user_id(&input.participants), None, crate::types::now_ms(), None) {
                    Ok(m) => m,
                    Err(e) => return Some((Self::error_event(RememberPhase::Acid, &e), RememberStreamState::Done)),
                };
                let agent_message = match self.conversations.add_message(&conversation.conversation_id, MessageRole::Agent, input.agent_message.clone(), None, Self::participant_id(&input.participants), crate::types::now_ms(), None) {
                    Ok(m) => m,
                    Err(e) => return Some((Self::error_event(RememberPhase::Acid, &e), RememberStreamState::Done)),
                };
                let event = RememberPhaseEvent { phase: RememberPhase::Acid, status: "ok".into(), ids: vec![user_message.id.clone(), agent_message.id.clone()] };
                Some((event, RememberStreamState::Embedding { input, conversation, user_message, agent_message }))
            }
            RememberStreamState::Embedding { input, conversation, user_message, agent_message } => {
                let embeddings = if input.embed {
                    match &self.embedding_provider {
                        Some(provider) => {
                            let user_embedding = provider.embed(&input.user_message).await;
                            let agent_embedding = provider.embed(&input.agent_message).await;
                            match (user_embedding, agent_embedding) {
                                (Ok(u), Ok(a)) => Some((Some(u), Some(a))),
                                (Err(e), _) | (_, Err(e)) => return Some((Self::error_event(RememberPhase::Embedding, &e), RememberStreamState::Done)),
                            }
                        }
                        None => Some((None, None)),
                    }
                } else {
                    Some((None, None))
                };
                let (user_embedding, agent_embedding) = embeddings.unwrap_or((None, None));
                let event = RememberPhaseEvent { phase: RememberPhase::Embedding, status: "ok".into(), ids: vec![] };
                Some((event, RememberStreamState::Vector { input, conversation, user_message, agent_message, user_embedding, agent_embedding }))
            }
            RememberStreamState::Vector { input, conversation, user_message, agent_message, user_embedding, agent_embedding } => {
                let conversation_ref = ConversationRef { conversation_id: conversation.conversation_id.clone(), message_ids: vec![user_message.id.clone(), agent_message.id.clone()] };
                let source = Source { source_type: SourceType::Conversation, user_id: Self::user_id(&input.participants), participant_id: Self::participant_id(&input.participants) };

                let user_memory = match self.vectors.store(input.memory_space_id.clone(), input.user_message.clone(), user_embedding, 50, input.tags.clone(), Some(source.clone()), Some(conversation_ref.clone()), input.metadata.clone()) {
                    Ok(m) => m,
                    Err(e) => return Some((Self::error_event(RememberPhase::Vector, &e), RememberStreamState::Done)),
                };
                let agent_memory = match self.vectors.store(input.memory_space_id.clone(), input.agent_message.clone(), agent_embedding, 50, input.tags.clone(), Some(source), Some(conversation_ref), input.metadata.clone()) {
                    Ok(m) => m,
                    Err(e) => return Some((Self::error_event(RememberPhase::Vector, &e), RememberStreamState::Done)),
                };
                self.notify_graph(ChangeEvent::MemoryUpserted(user_memory.clone()));
                self.notify_graph(ChangeEvent::MemoryUpserted(agent_memory.clone()));

                let event = RememberPhaseEvent { phase: RememberPhase::Vector, status: "ok".into(), ids: vec![user_memory.memory_id.clone(), agent_memory.memory_id.clone()] };
                Some((
                    event,
                    RememberStreamState::Facts { input, conversation, user_message, agent_message, user_memory, agent_memory },
                ))
            }
            RememberStreamState::Facts { input, conversation, user_message, agent_message, user_memory, agent_memory } => {
                let mut fact_ids = Vec::new();
                if input.extract_facts {
                    if let Some(extractor) = &self.fact_extractor {
                        match extractor.extract(&input.user_message, &input.agent_message).await {
                            Ok(extracted) => {
                                for candidate in extracted {
                                    if let Ok(fact) = self.facts.store(
                                        input.memory_space_id.clone(),
                                        candidate.fact_type,
                                        candidate.subject,
                                        candidate.predicate,
                                        candidate.object,
                                        candidate.confidence,
                                        FactSourceType::Conversation,
                                        Some(conversation.conversation_id.clone()),
                                        Self::user_id(&input.participants),
                                        Self::participant_id(&input.participants),
                                        vec![],
                                        None,
                                        None,
                                        None,
                                    ) {
                                        self.notify_graph(ChangeEvent::FactUpserted(fact.clone()));
                                        fact_ids.push(fact.fact_id);
                                    }
                                }
                            }
                            Err(e) => return Some((Self::error_event(RememberPhase::Facts, &e), RememberStreamState::Done)),
                        }
                    }
                }
                let event = RememberPhaseEvent { phase: RememberPhase::Facts, status: "ok".into(), ids: fact_ids.clone() };
                Some((
                    event,
                    RememberStreamState::Graph {
                        output: RememberOutput {
                            conversation_id: conversation.conversation_id,
                            user_message_id: user_message.id,
                            agent_message_id: agent_message.id,
                            user_memory_id: user_memory.memory_id,
                            agent_memory_id: agent_memory.memory_id,
                            fact_ids,
                        },
                    },
                ))
            }
            RememberStreamState::Graph { output } => {
                let event = RememberPhaseEvent { phase: RememberPhase::Graph, status: "ok".into(), ids: vec![output.conversation_id.clone()] };
                Some((event, RememberStreamState::Done))
            }
            RememberStreamState::Done => None,
        }
    }

    fn error_event(phase: RememberPhase, error: &MemoryError) -> RememberPhaseEvent {
        RememberPhaseEvent { phase, status: format!("error: {error}"), ids: vec![] }
    }

    fn resolve_conversation(&self, input: &RememberInput) -> MemoryResult<Conversation> {
        match &input.conversation_id {
            Some(id) => self.conversations.get(id),
            None => Ok(self.conversations.get_or_create(input.memory_space_id.clone(), input.conversation_type, input.participants.clone(), None)),
        }
    }

    fn user_id(participants: &Participants) -> Option<String> {
        match participants {
            Participants::UserAgent { user_id, .. } => Some(user_id.clone()),
            Participants::AgentAgent { .. } => None,
        }
    }

    fn participant_id(participants: &Participants) -> Option<String> {
        match participants {
            Participants::UserAgent { participant_id, .. } => Some(participant_id.clone()),
            Participants::AgentAgent { agent_ids } => agent_ids.first().cloned(),
        }
    }

    /// Delete a memory. With `delete_conversation == false` (the default
    /// behavior prior to this option), only the derived vector memory is
    /// removed, leaving the source conversation untouched — full
    /// user/participant erasure still belongs to `coordination::users`/
    /// `agents`. With `delete_conversation == true`, also deletes the
    /// conversation the memory was derived from, if it has one. Each layer's
    /// outcome is reported independently rather than failing the whole call
    /// on a partial failure.
    pub fn forget(&self, memory_id: &str, delete_conversation: bool) -> MemoryResult<ForgetResult> {
        let conversation_id = self.vectors.get(memory_id).ok().and_then(|m| m.conversation_ref.map(|r| r.conversation_id));

        let vector = match self.vectors.delete(memory_id) {
            Ok(()) => ForgetLayerResult::Ok,
            Err(e) => ForgetLayerResult::Error { message: e.to_string() },
        };

        let acid = if delete_conversation {
            match conversation_id {
                Some(id) => match self.conversations.delete(&id) {
                    Ok(()) => ForgetLayerResult::Ok,
                    Err(e) => ForgetLayerResult::Error { message: e.to_string() },
                },
                None => ForgetLayerResult::Skipped,
            }
        } else {
            ForgetLayerResult::Skipped
        };

        self.notify_graph(ChangeEvent::NodeDeleted(memory_id.to_string()));
        Ok(ForgetResult { vector, acid })
    }

    /// Fetch a single memory.
    pub fn get(&self, memory_id: &str) -> MemoryResult<VectorMemory> {
        self.vectors.get(memory_id)
    }

    /// Search memories, batch-fetching their source conversations in one
    /// pass rather than one lookup per hit (no N+1).
    pub async fn search(&self, memory_space_id: &str, query: Option<&str>, embedding: Option<&[f32]>, filter: &VectorFilter, limit: usize, enrich_conversation: bool) -> MemoryResult<Vec<EnrichedSearchResult>> {
        let hits = self.vectors.search(memory_space_id, query, embedding, filter, limit).await?;

        let conversations: std::collections::HashMap<String, Conversation> = if enrich_conversation {
            let mut unique_ids: Vec<String> = hits.iter().filter_map(|h| h.memory.conversation_ref.as_ref().map(|r| r.conversation_id.clone())).collect();
            unique_ids.sort();
            unique_ids.dedup();
            unique_ids.into_iter().filter_map(|id| self.conversations.get(&id).ok().map(|c| (id, c))).collect()
        } else {
            std::collections::HashMap::new()
        };

        Ok(hits
            .into_iter()
            .map(|hit| {
                let conversation = hit.memory.conversation_ref.as_ref().and_then(|r| conversations.get(&r.conversation_id)).cloned();
                EnrichedSearchResult { result: hit, conversation }
            })
            .collect())
    }

    /// Store a memory directly, bypassing `remember`'s conversation
    /// bookkeeping.
    #[allow(clippy::too_many_arguments)]
    pub fn store(&self, memory_space_id: impl Into<String>, content: impl Into<String>, embedding: Option<Vec<f32>>, importance: i64, tags: Vec<String>, source: Option<Source>, conversation_ref: Option<ConversationRef>, metadata: Option<Metadata>) -> MemoryResult<VectorMemory> {
        let memory = self.vectors.store(memory_space_id, content, embedding, importance, tags, source, conversation_ref, metadata)?;
        self.notify_graph(ChangeEvent::MemoryUpserted(memory.clone()));
        Ok(memory)
    }

    /// Thin delegation to `VectorIndex::update`.
    pub fn update(&self, memory_id: &str, content: Option<String>, embedding: Option<Option<Vec<f32>>>, importance: Option<i64>, tags: Option<Vec<String>>, metadata: Option<Metadata>) -> MemoryResult<VectorMemory> {
        let memory = self.vectors.update(memory_id, content, embedding, importance, tags, metadata)?;
        self.notify_graph(ChangeEvent::MemoryUpserted(memory.clone()));
        Ok(memory)
    }

    /// Thin delegation to `VectorIndex::delete`.
    pub fn delete(&self, memory_id: &str) -> MemoryResult<()> {
        self.vectors.delete(memory_id)?;
        self.notify_graph(ChangeEvent::NodeDeleted(memory_id.to_string()));
        Ok(())
    }

    /// Thin delegation to `VectorIndex::list`.
    pub fn list(&self, filter: &VectorFilter, pagination: Pagination, sort_by: VectorSortBy, order: crate::types::SortOrder) -> Vec<VectorMemory> {
        self.vectors.list(filter, pagination, sort_by, order)
    }

    /// Thin delegation to `VectorIndex::count`.
    pub fn count(&self, filter: &VectorFilter) -> usize {
        self.vectors.count(filter)
    }

    /// Thin delegation to `VectorIndex::update_many`.
    pub fn update_many(&self, memory_ids: &[String], importance: Option<i64>, tags: Option<Vec<String>>) -> MemoryResult<usize> {
        self.vectors.update_many(memory_ids, importance, tags)
    }

    /// Thin delegation to `VectorIndex::delete_many`.
    pub fn delete_many(&self, memory_ids: &[String]) -> usize {
        self.vectors.delete_many(memory_ids)
    }

    /// Thin delegation to `VectorIndex::export`.
    pub fn export(&self, memory_space_id: &str, format: crate::export::ExportFormat) -> String {
        self.vectors.export(memory_space_id, format)
    }

    /// Thin delegation to `VectorIndex::archive`.
    pub fn archive(&self, memory_id: &str) -> MemoryResult<VectorMemory> {
        self.vectors.archive(memory_id)
    }

    /// Thin delegation to `VectorIndex::get_version`.
    pub fn get_version(&self, memory_id: &str, version: u64) -> MemoryResult<crate::vector::VectorVersionSnapshot> {
        self.vectors.get_version(memory_id, version)
    }

    /// Thin delegation to `VectorIndex::get_history`.
    pub fn get_history(&self, memory_id: &str) -> MemoryResult<Vec<crate::vector::VectorVersionSnapshot>> {
        self.vectors.get_history(memory_id)
    }

    /// Thin delegation to `VectorIndex::get_at_timestamp`.
    pub fn get_at_timestamp(&self, memory_id: &str, ts: crate::types::Timestamp) -> Option<crate::vector::VectorVersionSnapshot> {
        self.vectors.get_at_timestamp(memory_id, ts)
    }

    /// Access the underlying conversation log, for callers that need direct
    /// access beyond what `remember`/`search` expose (e.g. `conversations.list`).
    pub fn conversations(&self) -> &ConversationLog {
        &self.conversations
    }

    /// Access the underlying fact store.
    pub fn facts(&self) -> &FactStore {
        &self.facts
    }
}

/// Outcome of a single layer touched by `forget`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ForgetLayerResult {
    /// The layer was touched and the delete succeeded.
    Ok,
    /// The layer was touched but the delete failed.
    Error {
        /// The failure, rendered for transport.
        message: String,
    },
    /// The layer was not touched (e.g. `delete_conversation == false`, or
    /// the memory had no linked conversation).
    Skipped,
}

/// Structured, per-layer result of `forget`. A caller can see exactly which
/// of the touched layers succeeded even when another failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgetResult {
    /// Outcome of deleting the vector memory.
    pub vector: ForgetLayerResult,
    /// Outcome of deleting the source conversation, when requested.
    pub acid: ForgetLayerResult,
}

/// A search hit enriched with its source conversation, when requested and
/// resolvable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedSearchResult {
    /// The underlying search hit.
    #[serde(flatten)]
    pub result: VectorSearchResult,
    /// The conversation the memory was derived from, if `enrichConversation`
    /// was requested and the conversation still exists.
    pub conversation: Option<Conversation>,
}

enum RememberStreamState {
    Start(RememberInput),
    Embedding { input: RememberInput, conversation: Conversation, user_message: Message, agent_message: Message },
    Vector { input: RememberInput, conversation: Conversation, user_message: Message, agent_message: Message, user_embedding: Option<Vec<f32>>, agent_embedding: Option<Vec<f32>> },
    Facts { input: RememberInput, conversation: Conversation, user_message: Message, agent_message: Message, user_memory: VectorMemory, agent_memory: VectorMemory },
    Graph { output: RememberOutput },
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct FixedEmbedding;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedding {
        async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    fn participants() -> Participants {
        Participants::UserAgent { user_id: "user-1".into(), participant_id: "agent-1".into() }
    }

    fn orchestrator(embed: bool) -> MemoryOrchestrator {
        MemoryOrchestrator::new(
            ConversationLog::new(),
            VectorIndex::new(),
            FactStore::new(),
            if embed { Some(Box::new(FixedEmbedding)) } else { None },
            None,
            None,
        )
    }

    #[tokio::test]
    async fn remember_writes_exactly_two_memories() {
        let orchestrator = orchestrator(true);
        let input = RememberInput {
            memory_space_id: "space-1".into(),
            conversation_id: None,
            conversation_type: ConversationType::UserAgent,
            participants: participants(),
            user_message: "hi".into(),
            agent_message: "hello".into(),
            tags: vec![],
            embed: true,
            extract_facts: false,
            metadata: None,
        };
        let output = orchestrator.remember(input).await.unwrap();
        assert!(orchestrator.get(&output.user_memory_id).is_ok());
        assert!(orchestrator.get(&output.agent_memory_id).is_ok());
        assert_eq!(orchestrator.vectors.count(&VectorFilter { memory_space_id: Some("space-1".into()), ..Default::default() }), 2);
    }

    #[tokio::test]
    async fn remember_stream_emits_phases_in_order() {
        let orchestrator = orchestrator(false);
        let input = RememberInput {
            memory_space_id: "space-1".into(),
            conversation_id: None,
            conversation_type: ConversationType::UserAgent,
            participants: participants(),
            user_message: "hi".into(),
            agent_message: "hello".into(),
            tags: vec![],
            embed: false,
            extract_facts: false,
            metadata: None,
        };
        let events: Vec<RememberPhaseEvent> = orchestrator.remember_stream(input).collect().await;
        let phases: Vec<RememberPhase> = events.iter().map(|e| e.phase).collect();
        assert_eq!(phases, vec![RememberPhase::Acid, RememberPhase::Embedding, RememberPhase::Vector, RememberPhase::Facts, RememberPhase::Graph]);
    }

    #[tokio::test]
    async fn search_enriches_conversation_without_refetching_per_hit() {
        let orchestrator = orchestrator(true);
        let input = RememberInput {
            memory_space_id: "space-1".into(),
            conversation_id: None,
            conversation_type: ConversationType::UserAgent,
            participants: participants(),
            user_message: "the sky is blue".into(),
            agent_message: "indeed it is".into(),
            tags: vec![],
            embed: false,
            extract_facts: false,
            metadata: None,
        };
        orchestrator.remember(input).await.unwrap();

        let results = orchestrator.search("space-1", Some("sky"), None, &VectorFilter::default(), 10, true).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].conversation.is_some());
    }
}
