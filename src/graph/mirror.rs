//! `InMemoryGraph` — the reference `GraphAdapter`, using an incoming/outgoing
//! adjacency shape. Plus the per-entity sync functions and the orphan-island
//! detector that runs over whatever adapter is configured.
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::coordination::contexts::Context;
use crate::error::{MemoryError, MemoryResult};
use crate::facts::Fact;
use crate::vector::VectorMemory;

use super::adapter::{GraphAdapter, GraphEdge, GraphNode};

/// Anchor labels an orphan-island scan treats as roots: a node reachable
/// from one of these within `MAX_TRAVERSAL_DEPTH` hops is not orphaned.
pub const ANCHOR_LABELS: [&str; 3] = ["Memory", "Fact", "Context"];

/// Upper bound on BFS depth for both traversal and orphan detection, so a
/// cyclic or pathological mirror can never spin forever.
pub const MAX_TRAVERSAL_DEPTH: usize = 10;

/// An in-process graph: separate outgoing/incoming adjacency maps keyed by
/// node id, plus a node registry. Suitable for tests and for deployments
/// with no external graph database configured.
#[derive(Debug, Default)]
pub struct InMemoryGraph {
    nodes: DashMap<String, GraphNode>,
    edges: DashMap<String, GraphEdge>,
    outgoing: DashMap<String, Vec<String>>,
    incoming: DashMap<String, Vec<String>>,
}

impl InMemoryGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    fn edges_from(&self, node_id: &str) -> Vec<GraphEdge> {
        self.outgoing.get(node_id).map(|ids| ids.iter().filter_map(|id| self.edges.get(id).map(|e| e.clone())).collect()).unwrap_or_default()
    }
}

#[async_trait]
impl GraphAdapter for InMemoryGraph {
    async fn connect(&self) -> MemoryResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> MemoryResult<()> {
        Ok(())
    }

    async fn create_node(&self, id: &str, labels: Vec<String>, properties: JsonValue) -> MemoryResult<GraphNode> {
        let node = GraphNode { id: id.to_string(), labels, properties };
        self.nodes.insert(id.to_string(), node.clone());
        Ok(node)
    }

    async fn update_node(&self, id: &str, properties: JsonValue) -> MemoryResult<GraphNode> {
        let mut node = self.nodes.get_mut(id).ok_or_else(|| MemoryError::GraphSyncFailed { entity_id: id.to_string(), reason: "node not found".into() })?;
        if let (JsonValue::Object(existing), JsonValue::Object(incoming)) = (&mut node.properties, &properties) {
            for (k, v) in incoming {
                existing.insert(k.clone(), v.clone());
            }
        } else {
            node.properties = properties;
        }
        Ok(node.clone())
    }

    async fn delete_node(&self, id: &str) -> MemoryResult<()> {
        self.nodes.remove(id);
        if let Some((_, out_edges)) = self.outgoing.remove(id) {
            for edge_id in out_edges {
                self.edges.remove(&edge_id);
            }
        }
        if let Some((_, in_edges)) = self.incoming.remove(id) {
            for edge_id in in_edges {
                self.edges.remove(&edge_id);
            }
        }
        Ok(())
    }

    async fn find_nodes(&self, label: &str, property_filter: BTreeMap<String, JsonValue>) -> MemoryResult<Vec<GraphNode>> {
        Ok(self
            .nodes
            .iter()
            .map(|e| e.value().clone())
            .filter(|n| n.labels.iter().any(|l| l == label))
            .filter(|n| property_filter.iter().all(|(k, v)| n.properties.get(k) == Some(v)))
            .collect())
    }

    async fn all_nodes(&self) -> MemoryResult<Vec<GraphNode>> {
        Ok(self.nodes.iter().map(|e| e.value().clone()).collect())
    }

    async fn find_nodes_by_property(&self, property_key: &str, value: JsonValue) -> MemoryResult<Vec<GraphNode>> {
        Ok(self.nodes.iter().map(|e| e.value().clone()).filter(|n| n.properties.get(property_key) == Some(&value)).collect())
    }

    async fn create_edge(&self, edge_type: &str, from: &str, to: &str, properties: JsonValue) -> MemoryResult<GraphEdge> {
        if !self.nodes.contains_key(from) || !self.nodes.contains_key(to) {
            return Err(MemoryError::GraphSyncFailed { entity_id: from.to_string(), reason: "endpoint node missing".into() });
        }
        let edge = GraphEdge { id: crate::types::new_id(), edge_type: edge_type.to_string(), from: from.to_string(), to: to.to_string(), properties };
        self.outgoing.entry(from.to_string()).or_default().push(edge.id.clone());
        self.incoming.entry(to.to_string()).or_default().push(edge.id.clone());
        self.edges.insert(edge.id.clone(), edge.clone());
        Ok(edge)
    }

    async fn delete_edge(&self, id: &str) -> MemoryResult<()> {
        let (_, edge) = self.edges.remove(id).ok_or_else(|| MemoryError::GraphSyncFailed { entity_id: id.to_string(), reason: "edge not found".into() })?;
        if let Some(mut v) = self.outgoing.get_mut(&edge.from) {
            v.retain(|e| e != id);
        }
        if let Some(mut v) = self.incoming.get_mut(&edge.to) {
            v.retain(|e| e != id);
        }
        Ok(())
    }

    async fn query(&self, _statement: &str) -> MemoryResult<JsonValue> {
        Err(MemoryError::NotImplemented("graph.query (no query language on the in-memory reference adapter)"))
    }

    async fn traverse(&self, start: &str, max_depth: usize) -> MemoryResult<Vec<GraphNode>> {
        let depth_limit = max_depth.min(MAX_TRAVERSAL_DEPTH);
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back((start.to_string(), 0usize));
        visited.insert(start.to_string());
        let mut result = Vec::new();

        while let Some((id, depth)) = queue.pop_front() {
            if let Some(node) = self.nodes.get(&id) {
                result.push(node.clone());
            }
            if depth >= depth_limit {
                continue;
            }
            for edge in self.edges_from(&id) {
                if visited.insert(edge.to.clone()) {
                    queue.push_back((edge.to, depth + 1));
                }
            }
        }
        Ok(result)
    }

    async fn find_path(&self, from: &str, to: &str) -> MemoryResult<Option<Vec<String>>> {
        if from == to {
            return Ok(Some(vec![from.to_string()]));
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(vec![from.to_string()]);
        visited.insert(from.to_string());

        while let Some(path) = queue.pop_front() {
            if path.len() > MAX_TRAVERSAL_DEPTH {
                continue;
            }
            let last = path.last().unwrap().clone();
            for edge in self.edges_from(&last) {
                if edge.to == to {
                    let mut full = path.clone();
                    full.push(edge.to);
                    return Ok(Some(full));
                }
                if visited.insert(edge.to.clone()) {
                    let mut next = path.clone();
                    next.push(edge.to.clone());
                    queue.push_back(next);
                }
            }
        }
        Ok(None)
    }
}

/// Mirror a vector memory as a `Memory` node, linked to its conversation
/// (when one is present) by a `DERIVED_FROM` edge.
pub async fn sync_memory(adapter: &dyn GraphAdapter, memory: &VectorMemory) -> MemoryResult<()> {
    adapter
        .create_node(
            &memory.memory_id,
            vec!["Memory".to_string()],
            serde_json::json!({"memorySpaceId": memory.memory_space_id, "content": memory.content, "importance": memory.importance}),
        )
        .await?;
    if let Some(conversation_ref) = &memory.conversation_ref {
        if adapter.create_edge("DERIVED_FROM", &memory.memory_id, &conversation_ref.conversation_id, serde_json::json!({})).await.is_err() {
            tracing::debug!(memory_id = %memory.memory_id, "conversation node not present in mirror yet; edge skipped");
        }
    }
    Ok(())
}

/// Mirror a fact as a `Fact` node, linked to its predecessor (if any) by a
/// `SUPERSEDES` edge.
pub async fn sync_fact(adapter: &dyn GraphAdapter, fact: &Fact) -> MemoryResult<()> {
    adapter
        .create_node(
            &fact.fact_id,
            vec!["Fact".to_string()],
            serde_json::json!({"memorySpaceId": fact.memory_space_id, "subject": fact.subject, "predicate": fact.predicate, "confidence": fact.confidence}),
        )
        .await?;
    if let Some(prev_id) = &fact.supersedes {
        if adapter.create_edge("SUPERSEDES", &fact.fact_id, prev_id, serde_json::json!({})).await.is_err() {
            tracing::debug!(fact_id = %fact.fact_id, "predecessor fact node not present in mirror yet; edge skipped");
        }
    }
    Ok(())
}

/// Mirror a context as a `Context` node, linked to its parent by a
/// `PARENT_OF` edge (parent → child).
pub async fn sync_context(adapter: &dyn GraphAdapter, context: &Context) -> MemoryResult<()> {
    adapter
        .create_node(&context.context_id, vec!["Context".to_string()], serde_json::json!({"memorySpaceId": context.memory_space_id, "name": context.name}))
        .await?;
    if let Some(parent_id) = &context.parent_context_id {
        adapter.create_edge("PARENT_OF", parent_id, &context.context_id, serde_json::json!({})).await?;
    }
    Ok(())
}

/// Find non-anchor nodes (everything but `Memory`/`Fact`/`Context`)
/// unreachable from any anchor within `MAX_TRAVERSAL_DEPTH` hops — the
/// residue a cascade delete leaves behind when it removes an anchor node but
/// not the derived/detail nodes that hung off it. An anchor is never itself
/// orphaned: it roots its own traversal.
pub async fn find_orphaned_islands(adapter: &dyn GraphAdapter) -> MemoryResult<Vec<GraphNode>> {
    let mut anchors = Vec::new();
    for label in ANCHOR_LABELS {
        anchors.extend(adapter.find_nodes(label, BTreeMap::new()).await?);
    }

    let mut reachable = HashSet::new();
    for anchor in &anchors {
        reachable.insert(anchor.id.clone());
        for node in adapter.traverse(&anchor.id, MAX_TRAVERSAL_DEPTH).await? {
            reachable.insert(node.id);
        }
    }

    Ok(adapter
        .all_nodes()
        .await?
        .into_iter()
        .filter(|n| !n.labels.iter().any(|l| ANCHOR_LABELS.contains(&l.as_str())))
        .filter(|n| !reachable.contains(&n.id))
        .collect())
}
