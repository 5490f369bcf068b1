//! VectorIndex (L2) — embedded memories with similarity search and a local
//! fallback, split between "index structure" and "similarity math".
pub mod filter;
pub mod types;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult};
use crate::export::{csv_escape, ExportFormat};
use crate::types::{new_id, now_ms, Metadata, Pagination, Timestamp};

pub use filter::{TagMatch, VectorFilter};
pub use types::{cosine_similarity, ConversationRef, Source, SourceType, VectorMemory, VectorVersionSnapshot};

/// Sort keys accepted by `list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorSortBy {
    /// By creation time.
    CreatedAt,
    /// By last mutation time.
    UpdatedAt,
    /// By importance.
    Importance,
}

/// A scored search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSearchResult {
    /// The matched memory.
    pub memory: VectorMemory,
    /// Similarity score in `[-1, 1]` (cosine) when `embedding` search was
    /// used; `None` for substring search.
    pub score: Option<f32>,
}

/// Capability a pluggable backend may expose: native vector similarity
/// search. The reference in-memory implementation below has none, so
/// `VectorIndex::search` always exercises the in-process cosine fallback,
/// which must stay correct regardless of whether a backend is attached.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Attempt a native nearest-neighbor search; return
    /// `MemoryError::BackendSimilarityUnavailable` if the backend has no
    /// such capability.
    async fn native_search(
        &self,
        memory_space_id: &str,
        embedding: &[f32],
        limit: usize,
    ) -> MemoryResult<Vec<VectorSearchResult>>;
}

/// The L2 vector index.
pub struct VectorIndex {
    entries: DashMap<String, VectorMemory>,
    by_space: DashMap<String, Vec<String>>,
    backend: Option<Box<dyn VectorBackend>>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex").field("entries", &self.entries.len()).finish()
    }
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorIndex {
    /// Create an index backed only by the in-process fallback.
    pub fn new() -> Self {
        Self { entries: DashMap::new(), by_space: DashMap::new(), backend: None }
    }

    /// Create an index that first attempts `backend` for nearest-neighbor
    /// search before falling back to the in-process computation.
    pub fn with_backend(backend: Box<dyn VectorBackend>) -> Self {
        Self { entries: DashMap::new(), by_space: DashMap::new(), backend: Some(backend) }
    }

    /// Store a new vector memory. Enforces that `conversationRef` is present
    /// whenever `source.type == conversation`.
    #[allow(clippy::too_many_arguments)]
    pub fn store(
        &self,
        memory_space_id: impl Into<String>,
        content: impl Into<String>,
        embedding: Option<Vec<f32>>,
        importance: i64,
        tags: Vec<String>,
        source: Option<Source>,
        conversation_ref: Option<ConversationRef>,
        metadata: Option<Metadata>,
    ) -> MemoryResult<VectorMemory> {
        if !(0..=100).contains(&importance) {
            return Err(MemoryError::InvalidImportance { value: importance });
        }
        if let Some(s) = &source {
            if s.source_type == SourceType::Conversation && conversation_ref.is_none() {
                return Err(MemoryError::ConversationRefRequired);
            }
        }
        let memory_space_id = memory_space_id.into();
        let now = now_ms();
        let memory = VectorMemory {
            memory_id: new_id(),
            memory_space_id: memory_space_id.clone(),
            content: content.into(),
            embedding,
            importance,
            tags,
            source,
            conversation_ref,
            version: 1,
            previous_versions: Vec::new(),
            archived: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            metadata,
        };
        self.by_space.entry(memory_space_id).or_default().push(memory.memory_id.clone());
        self.entries.insert(memory.memory_id.clone(), memory.clone());
        Ok(memory)
    }

    /// Fetch a memory by id.
    pub fn get(&self, memory_id: &str) -> MemoryResult<VectorMemory> {
        self.entries
            .get(memory_id)
            .map(|e| e.clone())
            .filter(|m| m.deleted_at.is_none())
            .ok_or_else(|| MemoryError::MemoryNotFound(memory_id.to_string()))
    }

    /// Update a memory's mutable fields, archiving the prior state into
    /// `previous_versions`.
    pub fn update(
        &self,
        memory_id: &str,
        content: Option<String>,
        embedding: Option<Option<Vec<f32>>>,
        importance: Option<i64>,
        tags: Option<Vec<String>>,
        metadata: Option<Metadata>,
    ) -> MemoryResult<VectorMemory> {
        if let Some(v) = importance {
            if !(0..=100).contains(&v) {
                return Err(MemoryError::InvalidImportance { value: v });
            }
        }
        let mut entry = self
            .entries
            .get_mut(memory_id)
            .filter(|m| m.deleted_at.is_none())
            .ok_or_else(|| MemoryError::MemoryNotFound(memory_id.to_string()))?;

        entry.previous_versions.push(VectorVersionSnapshot {
            version: entry.version,
            content: entry.content.clone(),
            embedding: entry.embedding.clone(),
            importance: entry.importance,
            timestamp: entry.updated_at,
            metadata: entry.metadata.clone(),
        });
        entry.version += 1;
        if let Some(c) = content {
            entry.content = c;
        }
        if let Some(e) = embedding {
            entry.embedding = e;
        }
        if let Some(i) = importance {
            entry.importance = i;
        }
        if let Some(t) = tags {
            entry.tags = t;
        }
        if metadata.is_some() {
            entry.metadata = metadata;
        }
        entry.updated_at = now_ms();
        Ok(entry.clone())
    }

    /// Soft-delete a memory.
    pub fn delete(&self, memory_id: &str) -> MemoryResult<()> {
        let mut entry = self
            .entries
            .get_mut(memory_id)
            .ok_or_else(|| MemoryError::MemoryNotFound(memory_id.to_string()))?;
        entry.deleted_at = Some(now_ms());
        Ok(())
    }

    /// Update many memories with the same partial patch.
    pub fn update_many(&self, memory_ids: &[String], importance: Option<i64>, tags: Option<Vec<String>>) -> MemoryResult<usize> {
        let mut updated = 0;
        for id in memory_ids {
            if self.update(id, None, None, importance, tags.clone(), None).is_ok() {
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Delete many memories, skipping ones that don't exist.
    pub fn delete_many(&self, memory_ids: &[String]) -> usize {
        memory_ids.iter().filter(|id| self.delete(id).is_ok()).count()
    }

    /// Hard-remove a memory, bypassing soft-delete. Used by GDPR cascades,
    /// where the record must not be recoverable afterwards.
    pub fn purge(&self, memory_id: &str) -> MemoryResult<VectorMemory> {
        let (_, removed) = self.entries.remove(memory_id).ok_or_else(|| MemoryError::MemoryNotFound(memory_id.to_string()))?;
        if let Some(mut ids) = self.by_space.get_mut(&removed.memory_space_id) {
            ids.retain(|id| id != memory_id);
        }
        Ok(removed)
    }

    /// Hard-remove many memories, skipping ones that don't exist.
    pub fn purge_many(&self, memory_ids: &[String]) -> Vec<VectorMemory> {
        memory_ids.iter().filter_map(|id| self.purge(id).ok()).collect()
    }

    /// Re-insert a memory exactly as given, reindexing it. Used to replay a
    /// cascade backup when a rollback is required.
    pub fn restore(&self, memory: VectorMemory) {
        self.by_space.entry(memory.memory_space_id.clone()).or_default().push(memory.memory_id.clone());
        self.entries.insert(memory.memory_id.clone(), memory);
    }

    /// Archive a memory (excluded from default listings but still readable).
    pub fn archive(&self, memory_id: &str) -> MemoryResult<VectorMemory> {
        let mut entry = self
            .entries
            .get_mut(memory_id)
            .ok_or_else(|| MemoryError::MemoryNotFound(memory_id.to_string()))?;
        entry.archived = true;
        entry.updated_at = now_ms();
        Ok(entry.clone())
    }

    fn candidates(&self, memory_space_id: Option<&str>) -> Vec<VectorMemory> {
        match memory_space_id {
            Some(space) => self
                .by_space
                .get(space)
                .map(|ids| ids.iter().filter_map(|id| self.entries.get(id).map(|e| e.clone())).collect())
                .unwrap_or_default(),
            None => self.entries.iter().map(|e| e.value().clone()).collect(),
        }
    }

    /// List memories matching `filter`, sorted and paginated.
    pub fn list(&self, filter: &VectorFilter, pagination: Pagination, sort_by: VectorSortBy, order: crate::types::SortOrder) -> Vec<VectorMemory> {
        let mut results: Vec<VectorMemory> = self
            .candidates(filter.memory_space_id.as_deref())
            .into_iter()
            .filter(|m| filter.matches(m))
            .collect();

        results.sort_by(|a, b| {
            let ordering = match sort_by {
                VectorSortBy::CreatedAt => a.created_at.cmp(&b.created_at),
                VectorSortBy::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                VectorSortBy::Importance => a.importance.cmp(&b.importance),
            };
            match order {
                crate::types::SortOrder::Asc => ordering,
                crate::types::SortOrder::Desc => ordering.reverse(),
            }
        });

        pagination.apply(results)
    }

    /// Count memories matching `filter`.
    pub fn count(&self, filter: &VectorFilter) -> usize {
        self.candidates(filter.memory_space_id.as_deref())
            .into_iter()
            .filter(|m| filter.matches(m))
            .count()
    }

    /// Search. With `embedding`, tries the backend then falls back to the
    /// in-process cosine computation; without it, performs a case-insensitive
    /// substring scan over `content`.
    pub async fn search(
        &self,
        memory_space_id: &str,
        query: Option<&str>,
        embedding: Option<&[f32]>,
        filter: &VectorFilter,
        limit: usize,
    ) -> MemoryResult<Vec<VectorSearchResult>> {
        if let Some(embedding) = embedding {
            if let Some(backend) = &self.backend {
                match backend.native_search(memory_space_id, embedding, limit).await {
                    Ok(results) => return Ok(results),
                    Err(MemoryError::BackendSimilarityUnavailable) => {
                        tracing::debug!(memory_space_id, "backend has no native vector similarity; using in-process fallback");
                    }
                    Err(e) => return Err(e),
                }
            }
            let mut scored: Vec<VectorSearchResult> = self
                .candidates(Some(memory_space_id))
                .into_iter()
                .filter(|m| filter.matches(m))
                .filter_map(|m| {
                    let candidate_embedding = m.embedding.as_ref()?;
                    if candidate_embedding.is_empty() {
                        return None;
                    }
                    let score = cosine_similarity(embedding, candidate_embedding);
                    if score.is_nan() {
                        return None;
                    }
                    Some(VectorSearchResult { memory: m, score: Some(score) })
                })
                .collect();
            scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(limit);
            Ok(scored)
        } else {
            let needle = query.unwrap_or_default().to_lowercase();
            let mut results: Vec<VectorSearchResult> = self
                .candidates(Some(memory_space_id))
                .into_iter()
                .filter(|m| filter.matches(m))
                .filter(|m| m.content.to_lowercase().contains(&needle))
                .map(|m| VectorSearchResult { memory: m, score: None })
                .collect();
            results.sort_by(|a, b| a.memory.created_at.cmp(&b.memory.created_at));
            results.truncate(limit);
            Ok(results)
        }
    }

    /// Export memories in a memory space.
    pub fn export(&self, memory_space_id: &str, format: ExportFormat) -> String {
        let memories = self.candidates(Some(memory_space_id));
        match format {
            ExportFormat::Json => serde_json::to_string(&memories).unwrap_or_default(),
            ExportFormat::Csv => {
                let mut out = String::from("memoryId,memorySpaceId,content,importance,tags,createdAt\n");
                for m in &memories {
                    out.push_str(&format!(
                        "{},{},{},{},{},{}\n",
                        csv_escape(&m.memory_id),
                        csv_escape(&m.memory_space_id),
                        csv_escape(&m.content),
                        m.importance,
                        csv_escape(&m.tags.join(";")),
                        m.created_at,
                    ));
                }
                out
            }
        }
    }

    /// Fetch a specific archived version.
    pub fn get_version(&self, memory_id: &str, version: u64) -> MemoryResult<VectorVersionSnapshot> {
        let entry = self.get(memory_id)?;
        if entry.version == version {
            return Ok(VectorVersionSnapshot {
                version: entry.version,
                content: entry.content,
                embedding: entry.embedding,
                importance: entry.importance,
                timestamp: entry.updated_at,
                metadata: entry.metadata,
            });
        }
        entry
            .previous_versions
            .into_iter()
            .find(|v| v.version == version)
            .ok_or_else(|| MemoryError::MemoryNotFound(format!("{memory_id}@v{version}")))
    }

    /// Full version history, oldest → newest.
    pub fn get_history(&self, memory_id: &str) -> MemoryResult<Vec<VectorVersionSnapshot>> {
        let entry = self.get(memory_id)?;
        let mut history = entry.previous_versions;
        history.push(VectorVersionSnapshot {
            version: entry.version,
            content: entry.content,
            embedding: entry.embedding,
            importance: entry.importance,
            timestamp: entry.updated_at,
            metadata: entry.metadata,
        });
        Ok(history)
    }

    /// As-of-timestamp read, same semantics as `ImmutableStore::get_at_timestamp`.
    pub fn get_at_timestamp(&self, memory_id: &str, ts: Timestamp) -> Option<VectorVersionSnapshot> {
        let entry = self.entries.get(memory_id)?;
        if entry.updated_at <= ts {
            return Some(VectorVersionSnapshot {
                version: entry.version,
                content: entry.content.clone(),
                embedding: entry.embedding.clone(),
                importance: entry.importance,
                timestamp: entry.updated_at,
                metadata: entry.metadata.clone(),
            });
        }
        entry
            .previous_versions
            .iter()
            .filter(|v| v.timestamp <= ts)
            .max_by_key(|v| v.version)
            .cloned()
    }

    /// All memory ids linked to a user (`source.userId`), for GDPR cascade
    /// collection.
    pub fn collect_for_user(&self, user_id: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.value().source.as_ref().and_then(|s| s.user_id.as_deref()) == Some(user_id))
            .map(|e| e.key().clone())
            .collect()
    }

    /// All memory ids linked to a participant/agent, for agent unregister
    /// cascade.
    pub fn collect_for_participant(&self, participant_id: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.value().source.as_ref().and_then(|s| s.participant_id.as_deref()) == Some(participant_id))
            .map(|e| e.key().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SortOrder;

    fn conv_source(user_id: &str) -> (Source, ConversationRef) {
        (
            Source { source_type: SourceType::Conversation, user_id: Some(user_id.to_string()), participant_id: None },
            ConversationRef { conversation_id: "conv-1".into(), message_ids: vec!["m-1".into()] },
        )
    }

    #[test]
    fn store_rejects_conversation_source_without_ref() {
        let index = VectorIndex::new();
        let source = Source { source_type: SourceType::Conversation, user_id: None, participant_id: None };
        let err = index
            .store("space-1", "hi", None, 50, vec![], Some(source), None, None)
            .unwrap_err();
        assert!(matches!(err, MemoryError::ConversationRefRequired));
    }

    #[test]
    fn store_rejects_invalid_importance() {
        let index = VectorIndex::new();
        let err = index.store("space-1", "hi", None, 150, vec![], None, None, None).unwrap_err();
        assert!(matches!(err, MemoryError::InvalidImportance { value: 150 }));
    }

    #[tokio::test]
    async fn search_without_embedding_is_substring_scan() {
        let index = VectorIndex::new();
        let (source, cref) = conv_source("u-1");
        index.store("space-1", "The password is Blue", None, 100, vec!["password".into()], Some(source), Some(cref), None).unwrap();

        let results = index.search("space-1", Some("password"), None, &VectorFilter::default(), 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].score.is_none());
    }

    #[tokio::test]
    async fn search_with_embedding_falls_back_to_cosine_and_sorts_descending() {
        let index = VectorIndex::new();
        index.store("space-1", "a", Some(vec![1.0, 0.0]), 50, vec![], None, None, None).unwrap();
        index.store("space-1", "b", Some(vec![0.0, 1.0]), 50, vec![], None, None, None).unwrap();
        index.store("space-1", "c", Some(vec![]), 50, vec![], None, None, None).unwrap(); // empty embedding excluded

        let results = index.search("space-1", None, Some(&[1.0, 0.0]), &VectorFilter::default(), 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score.unwrap() >= results[1].score.unwrap());
        assert!(results.iter().all(|r| !r.score.unwrap().is_nan()));
    }

    #[test]
    fn list_respects_pagination_and_sort() {
        let index = VectorIndex::new();
        for i in 0..5 {
            index.store("space-1", format!("m{i}"), None, i, vec![], None, None, None).unwrap();
        }
        let page = index.list(&VectorFilter::default(), Pagination { limit: Some(2), offset: Some(1) }, VectorSortBy::Importance, SortOrder::Desc);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].importance, 3);
        assert_eq!(page[1].importance, 2);
    }
}
