//! The `GraphAdapter` contract any graph database (Neo4j, Memgraph, or the
//! in-memory reference below) must satisfy to back the mirror. Node/edge ids
//! are plain strings throughout — no driver-specific `elementId()` concept
//! leaks through this boundary.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::error::MemoryResult;

/// A node in the mirrored graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// The node's id (shared with the owning entity's primary key).
    pub id: String,
    /// Labels (`Memory`, `Fact`, `Context`, `Conversation`, ...).
    pub labels: Vec<String>,
    /// Arbitrary properties.
    pub properties: JsonValue,
}

/// A directed, typed edge in the mirrored graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    /// The edge's id.
    pub id: String,
    /// The relationship type (`DERIVED_FROM`, `SUPERSEDES`, `PARENT_OF`, ...).
    pub edge_type: String,
    /// Source node id.
    pub from: String,
    /// Destination node id.
    pub to: String,
    /// Arbitrary properties.
    pub properties: JsonValue,
}

/// A contract any graph-backed mirror target must implement.
#[async_trait]
pub trait GraphAdapter: Send + Sync {
    /// Establish a connection (pool warm-up, schema check, ...).
    async fn connect(&self) -> MemoryResult<()>;

    /// Release the connection.
    async fn disconnect(&self) -> MemoryResult<()>;

    /// Create or replace a node.
    async fn create_node(&self, id: &str, labels: Vec<String>, properties: JsonValue) -> MemoryResult<GraphNode>;

    /// Merge properties into an existing node.
    async fn update_node(&self, id: &str, properties: JsonValue) -> MemoryResult<GraphNode>;

    /// Remove a node and every edge touching it.
    async fn delete_node(&self, id: &str) -> MemoryResult<()>;

    /// Find nodes carrying `label` whose properties match every entry of
    /// `property_filter`.
    async fn find_nodes(&self, label: &str, property_filter: BTreeMap<String, JsonValue>) -> MemoryResult<Vec<GraphNode>>;

    /// Every node in the mirror, regardless of label.
    async fn all_nodes(&self) -> MemoryResult<Vec<GraphNode>>;

    /// Nodes carrying `property_key` equal to `value`, regardless of label —
    /// used to find every node touching a `userId`/`participantId` during a
    /// cascade delete.
    async fn find_nodes_by_property(&self, property_key: &str, value: JsonValue) -> MemoryResult<Vec<GraphNode>>;

    /// Create a directed edge between two existing nodes.
    async fn create_edge(&self, edge_type: &str, from: &str, to: &str, properties: JsonValue) -> MemoryResult<GraphEdge>;

    /// Remove an edge.
    async fn delete_edge(&self, id: &str) -> MemoryResult<()>;

    /// Run a backend-native query and return its raw result. The in-memory
    /// reference adapter has no query language, so it always returns
    /// `MemoryError::NotImplemented`.
    async fn query(&self, statement: &str) -> MemoryResult<JsonValue>;

    /// Breadth-first traversal from `start`, up to `max_depth` hops,
    /// following outgoing edges.
    async fn traverse(&self, start: &str, max_depth: usize) -> MemoryResult<Vec<GraphNode>>;

    /// Shortest path between two nodes, as a sequence of node ids, if one
    /// exists.
    async fn find_path(&self, from: &str, to: &str) -> MemoryResult<Option<Vec<String>>>;
}
