//! Vector memory types and the cosine similarity math, with explicit
//! mismatched-length / zero-vector / NaN handling rules.
use serde::{Deserialize, Serialize};

use crate::types::{Metadata, Timestamp};

/// Where a memory's content originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Derived from a conversation message.
    Conversation,
    /// Written directly by the system.
    System,
    /// Written by a tool invocation.
    Tool,
}

impl SourceType {
    /// All enumerated values, used by the parametric filter regression test.
    pub const ALL: [SourceType; 3] = [SourceType::Conversation, SourceType::System, SourceType::Tool];
}

/// Provenance of a vector memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// What kind of thing produced this memory.
    #[serde(rename = "type")]
    pub source_type: SourceType,
    /// The user who was party to it, if any.
    pub user_id: Option<String>,
    /// The participant/agent who was party to it, if any.
    pub participant_id: Option<String>,
}

/// Back-reference to the conversation this memory was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRef {
    /// The source conversation.
    pub conversation_id: String,
    /// The specific messages this memory summarizes.
    pub message_ids: Vec<String>,
}

/// An archived prior version of a vector memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorVersionSnapshot {
    /// The version number this snapshot captured.
    pub version: u64,
    /// Content at that version.
    pub content: String,
    /// Embedding at that version.
    pub embedding: Option<Vec<f32>>,
    /// Importance at that version.
    pub importance: i64,
    /// When that version was current.
    pub timestamp: Timestamp,
    /// Opaque metadata at that version.
    pub metadata: Option<Metadata>,
}

/// A single vector-indexed memory (L2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMemory {
    /// Unique id.
    pub memory_id: String,
    /// Tenant/isolation key.
    pub memory_space_id: String,
    /// The memory's text content.
    pub content: String,
    /// The embedding, when generated.
    pub embedding: Option<Vec<f32>>,
    /// Salience, `0..=100`.
    pub importance: i64,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Provenance.
    pub source: Option<Source>,
    /// Back-reference to the originating conversation, required when
    /// `source.type == conversation`.
    pub conversation_ref: Option<ConversationRef>,
    /// Current version.
    pub version: u64,
    /// Archived versions, oldest → newest.
    pub previous_versions: Vec<VectorVersionSnapshot>,
    /// Whether the memory has been archived (still readable, excluded from
    /// default listings that filter on `archived`).
    pub archived: bool,
    /// Soft-delete marker.
    pub deleted_at: Option<Timestamp>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
    /// Opaque metadata.
    pub metadata: Option<Metadata>,
}

/// Compute cosine similarity between two embeddings.
///
/// Vectors of mismatched length are truncated to the shorter of the two
/// before comparing; a zero-magnitude vector yields `0.0` rather than
/// dividing by zero; the caller is responsible for filtering out any
/// resulting `NaN` (which can only arise from non-finite input components,
/// not from the zero-magnitude case, which is handled explicitly).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    let a = &a[..len];
    let b = &b[..len];

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}
