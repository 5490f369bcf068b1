//! Error types for the memory engine.
//!
//! All fallible operations return `Result<T, MemoryError>`. The variants
//! enumerate the error kinds this crate raises: validation, not-found,
//! consistency, cascade and backend/graph failures.
use thiserror::Error;

/// The crate-wide error type.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// `importance` fell outside `0..=100`.
    #[error("invalid importance {value}: must be in 0..=100")]
    InvalidImportance {
        /// The offending value.
        value: i64,
    },

    /// An enumerated field received a value outside its declared set.
    #[error("invalid value '{value}' for enum field '{field}'")]
    InvalidEnumValue {
        /// The field name (e.g. `factType`).
        field: String,
        /// The offending value.
        value: String,
    },

    /// `source.type == conversation` without a resolvable `conversationRef`.
    #[error("conversationRef is required when source.type is 'conversation'")]
    ConversationRefRequired,

    /// A superseded fact was read without `includeSuperseded = true`.
    #[error("fact '{fact_id}' is superseded; pass includeSuperseded to read it")]
    SupersededReadWithoutFlag {
        /// The fact that was superseded.
        fact_id: String,
    },

    /// No entry exists for the given `(type, id)` or `(namespace, key)`
    /// composite key (L1b ImmutableStore / L1c MutableStore).
    #[error("key '{0}' not found")]
    KeyNotFound(String),

    /// No conversation exists for the given id.
    #[error("conversation '{0}' not found")]
    ConversationNotFound(String),

    /// No vector memory exists for the given id.
    #[error("memory '{0}' not found")]
    MemoryNotFound(String),

    /// No fact exists for the given id.
    #[error("fact '{0}' not found")]
    FactNotFound(String),

    /// No context exists for the given id.
    #[error("context '{0}' not found")]
    ContextNotFound(String),

    /// No memory space exists for the given id.
    #[error("memory space '{0}' not found")]
    MemorySpaceNotFound(String),

    /// No user exists for the given id.
    #[error("user '{0}' not found")]
    UserNotFound(String),

    /// No agent exists for the given id.
    #[error("agent '{0}' not found")]
    AgentNotFound(String),

    /// `update` observed the record mutated since it was read.
    #[error("version conflict on '{id}': expected version {expected}, found {actual}")]
    VersionConflict {
        /// The record id.
        id: String,
        /// The version the caller expected to update.
        expected: u64,
        /// The version actually found.
        actual: u64,
    },

    /// A cascade delete failed partway through; rollback was attempted.
    #[error("cascade delete failed for '{subject_id}': {reason} (backup {backup_id})")]
    CascadeFailed {
        /// The user/agent id the cascade was deleting.
        subject_id: String,
        /// Human-readable reason for the failure.
        reason: String,
        /// Identifier of the backup snapshot used for rollback.
        backup_id: String,
        /// Per-layer residue counts discovered during rollback verification.
        residue: std::collections::BTreeMap<String, usize>,
    },

    /// The backend (reactive document database, in production deployments)
    /// rejected the call — transport or validator failure.
    #[error("backend error: {0}")]
    BackendError(String),

    /// The backend rejected an argument that failed its own validator.
    #[error("argument validation error: {0}")]
    ArgValidationError(String),

    /// The backend does not expose native vector similarity; callers should
    /// fall back to the in-process cosine computation.
    #[error("backend does not support native vector similarity")]
    BackendSimilarityUnavailable,

    /// Failed to establish a connection to the graph database.
    #[error("graph connect failed: {0}")]
    GraphConnectFailed(String),

    /// A single record failed to sync to the graph mirror. Never promoted to
    /// a caller-visible failure on the authoritative write path.
    #[error("graph sync failed for '{entity_id}': {reason}")]
    GraphSyncFailed {
        /// The entity that failed to sync.
        entity_id: String,
        /// Human-readable reason.
        reason: String,
    },

    /// An operation that is intentionally deferred (e.g. `mutable.transaction`).
    #[error("operation not implemented: {0}")]
    NotImplemented(&'static str),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type MemoryResult<T> = Result<T, MemoryError>;
