//! # agent-memory-core
//!
//! A layered memory engine for AI agents: append-only conversations,
//! content-addressed immutable blobs, key/value mutable state, an embedded
//! vector index with a local similarity fallback, structured supersedable
//! facts, and an optional best-effort graph mirror — plus the coordination
//! layer that ties memory spaces, users and agents together, including
//! GDPR-style cascade deletes.
//!
//! ## Layers
//!
//! - [`conversation`] — L1a `ConversationLog`: append-only message threads.
//! - [`immutable`] — L1b `ImmutableStore`: versioned, content-addressed blobs.
//! - [`mutable`] — L1c `MutableStore`: key/value state with increment/decrement.
//! - [`vector`] — L2 `VectorIndex`: embedded memories with similarity search.
//! - [`facts`] — L3 `FactStore`: structured, supersedable facts.
//! - [`orchestrator`] — L4a `MemoryOrchestrator`: turns a conversational turn
//!   into durable state across every layer above.
//! - [`coordination`] — L4b: memory spaces, users, agents, contexts, and the
//!   three-phase (collect, backup, execute-and-verify) cascade deletes.
//! - [`graph`] — X `GraphMirror`: an optional, best-effort graph projection.
//!
//! ## Quick start
//!
//! ```
//! use agent_memory_core::vector::VectorIndex;
//!
//! let memories = VectorIndex::new();
//! let memory = memories
//!     .store("space-1", "the sky is blue", None, 50, vec![], None, None, None)
//!     .unwrap();
//! assert_eq!(memory.content, "the sky is blue");
//! ```
pub mod config;
pub mod conversation;
pub mod coordination;
pub mod error;
pub mod export;
pub mod facts;
pub mod graph;
pub mod immutable;
pub mod mutable;
pub mod orchestrator;
pub mod types;
pub mod vector;

pub use config::{DeploymentConfig, DeploymentMode};
pub use conversation::{Conversation, ConversationFilter, ConversationLog, ConversationType, Message, MessageRole, Participants};
pub use error::{MemoryError, MemoryResult};
pub use export::ExportFormat;
pub use facts::{Fact, FactFilter, FactSortBy, FactSourceType, FactStore, FactType};
pub use graph::{ChangeEvent, GraphAdapter, GraphEdge, GraphNode, InMemoryGraph, SyncWorker, SyncWorkerConfig, SyncWorkerMetrics};
pub use immutable::{ImmutableEntry, ImmutableStore};
pub use mutable::{MutableRecord, MutableStore};
pub use orchestrator::{EmbeddingProvider, FactExtractor, ForgetLayerResult, ForgetResult, MemoryOrchestrator, RememberInput, RememberOutput, RememberPhase, RememberPhaseEvent};
pub use types::{Metadata, Pagination, SortOrder, Timestamp};
pub use vector::{Source, SourceType, VectorFilter, VectorIndex, VectorMemory, VectorSearchResult, VectorSortBy};

pub use coordination::agents::{Agent, Agents};
pub use coordination::cascade::CascadePlan;
pub use coordination::contexts::{AccessGrant, CollaborationMode, Context, ContextStatus, Contexts};
pub use coordination::memory_spaces::{MemorySpace, MemorySpaceStatus, MemorySpaceType, MemorySpaces, Participant, ParticipantType};
pub use coordination::users::{User, Users};
pub use coordination::{CascadeBackup, CascadeReport};

// Re-export commonly used external types for convenience.
pub use serde_json::{json, Value as JsonValue};

// ============================================================================
// Logging and Observability
// ============================================================================

/// Initialize the logging system. Call once at application startup.
///
/// The log level can be controlled via the `AGENT_MEMORY_LOG` environment
/// variable (`error`, `warn`, `info` (default), `debug`, `trace`).
pub fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("AGENT_MEMORY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer().with_target(false)).init();
}

/// Initialize logging with an explicit level, ignoring `AGENT_MEMORY_LOG`.
pub fn init_logging_with_level(level: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(level);

    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer().with_target(false)).init();
}
