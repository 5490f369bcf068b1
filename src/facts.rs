//! FactStore (L3) — structured, supersedable facts extracted from
//! conversations or written directly. Shares the one-filter-struct-per-layer
//! discipline used by `vector::VectorFilter`, and archives prior versions the
//! same way `ImmutableStore::store` does.
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::error::{MemoryError, MemoryResult};
use crate::export::{csv_escape, ExportFormat};
use crate::types::{new_id, now_ms, Metadata, Pagination, SortOrder, Timestamp};
use crate::vector::TagMatch;

/// What kind of fact this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactType {
    /// A stated preference.
    Preference,
    /// An identity attribute.
    Identity,
    /// General knowledge.
    Knowledge,
    /// A relationship between two entities.
    Relationship,
    /// Something that happened.
    Event,
    /// An observation about behavior.
    Observation,
    /// Anything not covered above.
    Custom,
}

impl FactType {
    /// All enumerated values.
    pub const ALL: [FactType; 7] = [
        FactType::Preference,
        FactType::Identity,
        FactType::Knowledge,
        FactType::Relationship,
        FactType::Event,
        FactType::Observation,
        FactType::Custom,
    ];
}

/// Where a fact was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactSourceType {
    /// Extracted from a conversation.
    Conversation,
    /// Written directly by the system.
    System,
    /// Written by a tool invocation.
    Tool,
    /// Entered by a human operator.
    Manual,
}

impl FactSourceType {
    /// All enumerated values.
    pub const ALL: [FactSourceType; 4] =
        [FactSourceType::Conversation, FactSourceType::System, FactSourceType::Tool, FactSourceType::Manual];
}

/// An archived prior version of a fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactVersionSnapshot {
    /// The version this snapshot captured.
    pub version: u64,
    /// Object value at that version.
    pub object: JsonValue,
    /// Confidence at that version.
    pub confidence: i64,
    /// When that version was current.
    pub timestamp: Timestamp,
}

/// A single structured fact (L3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    /// Unique id.
    pub fact_id: String,
    /// Tenant/isolation key.
    pub memory_space_id: String,
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
    /// Provenance kind.
    pub source_type: FactSourceType,
    /// Opaque reference to the originating record (conversation/message id,
    /// tool call id, ...).
    pub source_ref: Option<String>,
    /// The user this fact concerns, if any.
    pub user_id: Option<String>,
    /// The participant/agent this fact concerns, if any.
    pub participant_id: Option<String>,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Validity window start, inclusive. `None` means "always valid so far".
    pub valid_from: Option<Timestamp>,
    /// Validity window end, inclusive. `None` means "still valid".
    pub valid_until: Option<Timestamp>,
    /// Current version.
    pub version: u64,
    /// Archived versions, oldest → newest.
    pub previous_versions: Vec<FactVersionSnapshot>,
    /// The fact that superseded this one, if any.
    pub superseded_by: Option<String>,
    /// The fact this one superseded, if any.
    pub supersedes: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
    /// Opaque metadata.
    pub metadata: Option<Metadata>,
}

/// Sort keys accepted by `FactStore::list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FactSortBy {
    /// By creation time.
    #[default]
    CreatedAt,
    /// By last mutation time.
    UpdatedAt,
    /// By confidence.
    Confidence,
}

/// Filter accepted by every FactStore read operation. Field set mirrors
/// `vector::VectorFilter`'s so every query operation in this layer accepts
/// the same option surface.
#[derive(Debug, Clone, Default)]
pub struct FactFilter {
    /// Restrict to a memory space.
    pub memory_space_id: Option<String>,
    /// Restrict to a fact type.
    pub fact_type: Option<FactType>,
    /// Restrict to a subject.
    pub subject: Option<String>,
    /// Restrict to a predicate.
    pub predicate: Option<String>,
    /// Exact object-value equality match.
    pub object: Option<JsonValue>,
    /// Restrict to a provenance kind.
    pub source_type: Option<FactSourceType>,
    /// Restrict to a user.
    pub user_id: Option<String>,
    /// Restrict to a participant/agent.
    pub participant_id: Option<String>,
    /// Restrict to facts carrying any/all of these tags.
    pub tags: Vec<String>,
    /// Whether `tags` is an any- or all-match.
    pub tag_match: TagMatch,
    /// Minimum confidence, inclusive.
    pub min_confidence: Option<i64>,
    /// Only facts valid at this instant (`validFrom <= at <= validUntil`,
    /// open bounds treated as ±infinity). Defaults to "now" semantics are the
    /// caller's responsibility; `None` here means "don't filter on validity".
    pub valid_at: Option<Timestamp>,
    /// `createdAt < this`.
    pub created_before: Option<Timestamp>,
    /// `createdAt > this`.
    pub created_after: Option<Timestamp>,
    /// `updatedAt < this`.
    pub updated_before: Option<Timestamp>,
    /// `updatedAt > this`.
    pub updated_after: Option<Timestamp>,
    /// Restrict to an exact version number.
    pub version: Option<u64>,
    /// Exact metadata field-equality match.
    pub metadata: BTreeMap<String, JsonValue>,
    /// Include superseded facts (excluded by default).
    pub include_superseded: bool,
}

impl FactFilter {
    /// Whether `fact` satisfies every set field of this filter.
    pub fn matches(&self, fact: &Fact) -> bool {
        if fact.superseded_by.is_some() && !self.include_superseded {
            return false;
        }
        if let Some(space) = &self.memory_space_id {
            if &fact.memory_space_id != space {
                return false;
            }
        }
        if let Some(t) = self.fact_type {
            if fact.fact_type != t {
                return false;
            }
        }
        if let Some(subject) = &self.subject {
            if &fact.subject != subject {
                return false;
            }
        }
        if let Some(predicate) = &self.predicate {
            if &fact.predicate != predicate {
                return false;
            }
        }
        if let Some(object) = &self.object {
            if &fact.object != object {
                return false;
            }
        }
        if let Some(source_type) = self.source_type {
            if fact.source_type != source_type {
                return false;
            }
        }
        if let Some(user_id) = &self.user_id {
            if fact.user_id.as_deref() != Some(user_id.as_str()) {
                return false;
            }
        }
        if let Some(participant_id) = &self.participant_id {
            if fact.participant_id.as_deref() != Some(participant_id.as_str()) {
                return false;
            }
        }
        if !self.tags.is_empty() {
            let ok = match self.tag_match {
                TagMatch::Any => self.tags.iter().any(|t| fact.tags.contains(t)),
                TagMatch::All => self.tags.iter().all(|t| fact.tags.contains(t)),
            };
            if !ok {
                return false;
            }
        }
        if let Some(min) = self.min_confidence {
            if fact.confidence < min {
                return false;
            }
        }
        if let Some(at) = self.valid_at {
            if fact.valid_from.map(|from| at < from).unwrap_or(false) {
                return false;
            }
            if fact.valid_until.map(|until| at > until).unwrap_or(false) {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if fact.created_at >= before {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if fact.created_at <= after {
                return false;
            }
        }
        if let Some(before) = self.updated_before {
            if fact.updated_at >= before {
                return false;
            }
        }
        if let Some(after) = self.updated_after {
            if fact.updated_at <= after {
                return false;
            }
        }
        if let Some(version) = self.version {
            if fact.version != version {
                return false;
            }
        }
        for (field, expected) in &self.metadata {
            let actual = fact.metadata.as_ref().and_then(|m| m.get(field));
            if actual != Some(expected) {
                return false;
            }
        }
        true
    }
}

/// The L3 fact store.
#[derive(Debug, Default)]
pub struct FactStore {
    facts: DashMap<String, Fact>,
    by_space: DashMap<String, Vec<String>>,
}

impl FactStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new fact.
    #[allow(clippy::too_many_arguments)]
    pub fn store(
        &self,
        memory_space_id: impl Into<String>,
        fact_type: FactType,
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: JsonValue,
        confidence: i64,
        source_type: FactSourceType,
        source_ref: Option<String>,
        user_id: Option<String>,
        participant_id: Option<String>,
        tags: Vec<String>,
        valid_from: Option<Timestamp>,
        valid_until: Option<Timestamp>,
        metadata: Option<Metadata>,
    ) -> MemoryResult<Fact> {
        if !(0..=100).contains(&confidence) {
            return Err(MemoryError::InvalidImportance { value: confidence });
        }
        let memory_space_id = memory_space_id.into();
        let now = now_ms();
        let fact = Fact {
            fact_id: new_id(),
            memory_space_id: memory_space_id.clone(),
            fact_type,
            subject: subject.into(),
            predicate: predicate.into(),
            object,
            confidence,
            source_type,
            source_ref,
            user_id,
            participant_id,
            tags,
            valid_from,
            valid_until,
            version: 1,
            previous_versions: Vec::new(),
            superseded_by: None,
            supersedes: None,
            created_at: now,
            updated_at: now,
            metadata,
        };
        self.by_space.entry(memory_space_id).or_default().push(fact.fact_id.clone());
        self.facts.insert(fact.fact_id.clone(), fact.clone());
        Ok(fact)
    }

    /// Fetch a fact by id. Errs on superseded facts unless
    /// `include_superseded`.
    pub fn get(&self, fact_id: &str, include_superseded: bool) -> MemoryResult<Fact> {
        let fact = self.facts.get(fact_id).map(|f| f.clone()).ok_or_else(|| MemoryError::FactNotFound(fact_id.to_string()))?;
        if fact.superseded_by.is_some() && !include_superseded {
            return Err(MemoryError::SupersededReadWithoutFlag { fact_id: fact_id.to_string() });
        }
        Ok(fact)
    }

    /// Update a fact by writing a new version: the old fact is marked
    /// `supersededBy` the new one, which carries `supersedes` back to it.
    /// Returns the new fact.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &self,
        fact_id: &str,
        object: Option<JsonValue>,
        confidence: Option<i64>,
        valid_until: Option<Timestamp>,
        metadata: Option<Metadata>,
    ) -> MemoryResult<Fact> {
        if let Some(c) = confidence {
            if !(0..=100).contains(&c) {
                return Err(MemoryError::InvalidImportance { value: c });
            }
        }
        let mut old = self.facts.get_mut(fact_id).ok_or_else(|| MemoryError::FactNotFound(fact_id.to_string()))?;
        if old.superseded_by.is_some() {
            return Err(MemoryError::SupersededReadWithoutFlag { fact_id: fact_id.to_string() });
        }

        let now = now_ms();
        let mut new_fact = old.clone();
        new_fact.fact_id = new_id();
        new_fact.version = old.version + 1;
        new_fact.previous_versions.push(FactVersionSnapshot {
            version: old.version,
            object: old.object.clone(),
            confidence: old.confidence,
            timestamp: old.updated_at,
        });
        if let Some(o) = object {
            new_fact.object = o;
        }
        if let Some(c) = confidence {
            new_fact.confidence = c;
        }
        if valid_until.is_some() {
            new_fact.valid_until = valid_until;
        }
        if metadata.is_some() {
            new_fact.metadata = metadata;
        }
        new_fact.supersedes = Some(fact_id.to_string());
        new_fact.superseded_by = None;
        new_fact.created_at = old.created_at;
        new_fact.updated_at = now;

        old.superseded_by = Some(new_fact.fact_id.clone());
        old.updated_at = now;
        let space = old.memory_space_id.clone();
        drop(old);

        self.by_space.entry(space).or_default().push(new_fact.fact_id.clone());
        self.facts.insert(new_fact.fact_id.clone(), new_fact.clone());
        Ok(new_fact)
    }

    /// Permanently remove a fact.
    pub fn delete(&self, fact_id: &str) -> MemoryResult<()> {
        self.facts.remove(fact_id).map(|_| ()).ok_or_else(|| MemoryError::FactNotFound(fact_id.to_string()))
    }

    /// Re-insert a fact exactly as given, reindexing it. Used to replay a
    /// cascade backup when a rollback is required.
    pub fn restore(&self, fact: Fact) {
        self.by_space.entry(fact.memory_space_id.clone()).or_default().push(fact.fact_id.clone());
        self.facts.insert(fact.fact_id.clone(), fact);
    }

    fn candidates(&self, memory_space_id: Option<&str>) -> Vec<Fact> {
        match memory_space_id {
            Some(space) => self
                .by_space
                .get(space)
                .map(|ids| ids.iter().filter_map(|id| self.facts.get(id).map(|f| f.clone())).collect())
                .unwrap_or_default(),
            None => self.facts.iter().map(|e| e.value().clone()).collect(),
        }
    }

    /// List facts matching `filter`, sorted and paginated.
    pub fn list(&self, filter: &FactFilter, pagination: Pagination, sort_by: FactSortBy, order: SortOrder) -> Vec<Fact> {
        let mut results: Vec<Fact> = self
            .candidates(filter.memory_space_id.as_deref())
            .into_iter()
            .filter(|f| filter.matches(f))
            .collect();

        results.sort_by(|a, b| {
            let ordering = match sort_by {
                FactSortBy::CreatedAt => a.created_at.cmp(&b.created_at),
                FactSortBy::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                FactSortBy::Confidence => a.confidence.cmp(&b.confidence),
            };
            match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        pagination.apply(results)
    }

    /// Count facts matching `filter`.
    pub fn count(&self, filter: &FactFilter) -> usize {
        self.candidates(filter.memory_space_id.as_deref()).into_iter().filter(|f| filter.matches(f)).count()
    }

    /// Case-insensitive substring search over `subject`/`predicate`/`object`.
    pub fn search(&self, query: &str, filter: &FactFilter) -> Vec<Fact> {
        let needle = query.to_lowercase();
        let mut results: Vec<Fact> = self
            .candidates(filter.memory_space_id.as_deref())
            .into_iter()
            .filter(|f| filter.matches(f))
            .filter(|f| {
                f.subject.to_lowercase().contains(&needle)
                    || f.predicate.to_lowercase().contains(&needle)
                    || f.object.to_string().to_lowercase().contains(&needle)
            })
            .collect();
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        results
    }

    /// All (non-superseded, unless requested) facts about a subject.
    pub fn query_by_subject(&self, subject: &str, filter: &FactFilter) -> Vec<Fact> {
        let mut f = filter.clone();
        f.subject = Some(subject.to_string());
        self.list(&f, Pagination::default(), FactSortBy::default(), SortOrder::Desc)
    }

    /// All facts with a given predicate ("relationship"), optionally also
    /// scoped to a subject via `filter.subject`.
    pub fn query_by_relationship(&self, predicate: &str, filter: &FactFilter) -> Vec<Fact> {
        let mut f = filter.clone();
        f.predicate = Some(predicate.to_string());
        self.list(&f, Pagination::default(), FactSortBy::default(), SortOrder::Desc)
    }

    /// Full supersession chain for a fact, oldest → current.
    pub fn get_history(&self, fact_id: &str) -> MemoryResult<Vec<Fact>> {
        let mut chain = vec![self.get(fact_id, true)?];
        while let Some(prev_id) = chain.first().and_then(|f| f.supersedes.clone()) {
            chain.insert(0, self.get(&prev_id, true)?);
        }
        let mut next_id = chain.last().and_then(|f| f.superseded_by.clone());
        while let Some(id) = next_id {
            let next = self.get(&id, true)?;
            next_id = next.superseded_by.clone();
            chain.push(next);
        }
        Ok(chain)
    }

    /// Export facts in a memory space.
    pub fn export(&self, memory_space_id: &str, format: ExportFormat) -> String {
        let facts = self.candidates(Some(memory_space_id));
        match format {
            ExportFormat::Json => serde_json::to_string(&facts).unwrap_or_default(),
            ExportFormat::Csv => {
                let mut out = String::from("factId,subject,predicate,object,confidence,factType\n");
                for f in &facts {
                    out.push_str(&format!(
                        "{},{},{},{},{},{:?}\n",
                        csv_escape(&f.fact_id),
                        csv_escape(&f.subject),
                        csv_escape(&f.predicate),
                        csv_escape(&f.object.to_string()),
                        f.confidence,
                        f.fact_type,
                    ));
                }
                out
            }
        }
    }

    /// Merge same-subject/predicate facts above `min_confidence`, keeping the
    /// highest-confidence fact as current and superseding the rest. Returns
    /// the surviving facts. Facts already superseded are ignored.
    pub fn consolidate(&self, memory_space_id: &str, min_confidence: i64) -> Vec<Fact> {
        let active: Vec<Fact> = self
            .candidates(Some(memory_space_id))
            .into_iter()
            .filter(|f| f.superseded_by.is_none() && f.confidence >= min_confidence)
            .collect();

        let mut groups: BTreeMap<(String, String), Vec<Fact>> = BTreeMap::new();
        for f in active {
            groups.entry((f.subject.clone(), f.predicate.clone())).or_default().push(f);
        }

        let mut survivors = Vec::new();
        for (_, mut group) in groups {
            if group.len() < 2 {
                survivors.extend(group);
                continue;
            }
            group.sort_by(|a, b| b.confidence.cmp(&a.confidence).then(b.updated_at.cmp(&a.updated_at)));
            let winner_id = group[0].fact_id.clone();
            for loser in &group[1..] {
                if let Some(mut l) = self.facts.get_mut(&loser.fact_id) {
                    l.superseded_by = Some(winner_id.clone());
                    l.updated_at = now_ms();
                }
            }
            if let Some(winner) = self.facts.get(&winner_id) {
                survivors.push(winner.clone());
            }
        }
        survivors
    }

    /// All fact ids concerning a user, for GDPR cascade collection.
    pub fn collect_for_user(&self, user_id: &str) -> Vec<String> {
        self.facts.iter().filter(|e| e.value().user_id.as_deref() == Some(user_id)).map(|e| e.key().clone()).collect()
    }

    /// All fact ids concerning a participant/agent, for unregister cascade.
    pub fn collect_for_participant(&self, participant_id: &str) -> Vec<String> {
        self.facts.iter().filter(|e| e.value().participant_id.as_deref() == Some(participant_id)).map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_fact(store: &FactStore, confidence: i64) -> Fact {
        store
            .store(
                "space-1",
                FactType::Preference,
                "user-1",
                "likes",
                json!("coffee"),
                confidence,
                FactSourceType::Conversation,
                None,
                Some("user-1".into()),
                None,
                vec![],
                None,
                None,
                None,
            )
            .unwrap()
    }

    #[test]
    fn update_supersedes_and_reading_old_requires_flag() {
        let store = FactStore::new();
        let original = store_fact(&store, 70);
        let updated = store.update(&original.fact_id, Some(json!("tea")), Some(90), None, None).unwrap();

        assert_eq!(updated.supersedes.as_deref(), Some(original.fact_id.as_str()));

        let err = store.get(&original.fact_id, false).unwrap_err();
        assert!(matches!(err, MemoryError::SupersededReadWithoutFlag { .. }));

        let ok = store.get(&original.fact_id, true).unwrap();
        assert_eq!(ok.superseded_by.as_deref(), Some(updated.fact_id.as_str()));
    }

    #[test]
    fn list_excludes_superseded_by_default() {
        let store = FactStore::new();
        let original = store_fact(&store, 70);
        store.update(&original.fact_id, None, Some(90), None, None).unwrap();

        let filter = FactFilter { memory_space_id: Some("space-1".into()), ..Default::default() };
        let active = store.list(&filter, Pagination::default(), FactSortBy::default(), SortOrder::Desc);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].confidence, 90);
    }

    #[test]
    fn valid_at_window_excludes_outside_range() {
        let store = FactStore::new();
        store
            .store(
                "space-1",
                FactType::Event,
                "user-1",
                "subscribed",
                json!(true),
                100,
                FactSourceType::System,
                None,
                None,
                None,
                vec![],
                Some(1000),
                Some(2000),
                None,
            )
            .unwrap();

        let filter = FactFilter { memory_space_id: Some("space-1".into()), valid_at: Some(500), ..Default::default() };
        assert_eq!(store.count(&filter), 0);

        let filter = FactFilter { memory_space_id: Some("space-1".into()), valid_at: Some(1500), ..Default::default() };
        assert_eq!(store.count(&filter), 1);
    }

    #[test]
    fn consolidate_keeps_highest_confidence_and_supersedes_rest() {
        let store = FactStore::new();
        let low = store_fact(&store, 40);
        let high = store_fact(&store, 95);

        let survivors = store.consolidate("space-1", 0);
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].fact_id, high.fact_id);

        let low_after = store.get(&low.fact_id, true).unwrap();
        assert_eq!(low_after.superseded_by.as_deref(), Some(high.fact_id.as_str()));
    }
}
