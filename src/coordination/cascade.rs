//! `CascadePlan` — the graph-side half of a participant cascade delete,
//! shared by `users::delete` and `agents::unregister`. Everything else about
//! the Collect → Backup → Execute+Verify → Rollback shape (conversations,
//! immutable/mutable state, vectors, facts, contexts) is layer-specific
//! enough that each caller still drives its own loop; this module only
//! centralizes the one step every cascade needs in common: find every graph
//! node keyed to the subject, delete it ahead of the other layers, then
//! sweep for islands the deletion leaves behind.
use crate::error::MemoryResult;
use crate::graph::{find_orphaned_islands, GraphAdapter};

/// Graph-side steps of a cascade delete for one subject (`userId` or
/// `participantId`).
pub struct CascadePlan<'a> {
    subject_id: String,
    graph: Option<&'a dyn GraphAdapter>,
}

impl<'a> CascadePlan<'a> {
    pub fn new(subject_id: impl Into<String>, graph: Option<&'a dyn GraphAdapter>) -> Self {
        Self { subject_id: subject_id.into(), graph }
    }

    /// Node ids in the mirror carrying `property_key` (`"userId"` or
    /// `"participantId"`) equal to the subject. Empty, with no error, when
    /// no graph adapter is configured.
    pub async fn collect(&self, property_key: &str) -> MemoryResult<Vec<String>> {
        let Some(graph) = self.graph else { return Ok(vec![]) };
        let nodes = graph.find_nodes_by_property(property_key, serde_json::json!(self.subject_id)).await?;
        Ok(nodes.into_iter().map(|n| n.id).collect())
    }

    /// Delete the collected nodes ahead of every other layer (graph-first
    /// ordering), then remove whatever islands that leaves behind. Returns
    /// the total number of nodes removed. A no-op, returning 0, in dry-run
    /// callers (they should skip calling this and use `collect`'s length
    /// for their count instead) or when no graph adapter is configured.
    pub async fn execute(&self, node_ids: &[String]) -> MemoryResult<usize> {
        let Some(graph) = self.graph else { return Ok(0) };
        for id in node_ids {
            graph.delete_node(id).await?;
        }
        let orphans = find_orphaned_islands(graph).await?;
        for orphan in &orphans {
            graph.delete_node(&orphan.id).await?;
        }
        Ok(node_ids.len() + orphans.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::InMemoryGraph;

    #[tokio::test]
    async fn collect_and_execute_remove_tagged_nodes_and_resulting_islands() {
        let graph = InMemoryGraph::new();
        graph.create_node("conv-1", vec!["Conversation".into()], serde_json::json!({"userId": "user-1"})).await.unwrap();
        graph.create_node("mem-1", vec!["Memory".into()], serde_json::json!({"userId": "user-1"})).await.unwrap();
        graph.create_edge("DERIVED_FROM", "mem-1", "conv-1", serde_json::json!({})).await.unwrap();

        let plan = CascadePlan::new("user-1", Some(&graph as &dyn GraphAdapter));
        let node_ids = plan.collect("userId").await.unwrap();
        assert_eq!(node_ids.len(), 2);

        let removed = plan.execute(&node_ids).await.unwrap();
        assert_eq!(removed, 2, "both tagged nodes are removed directly, leaving no separate island");
        assert!(graph.all_nodes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn execute_sweeps_islands_left_behind_by_the_tagged_deletes() {
        let graph = InMemoryGraph::new();
        graph.create_node("mem-1", vec!["Memory".into()], serde_json::json!({"userId": "user-1"})).await.unwrap();
        graph.create_node("conv-1", vec!["Conversation".into()], serde_json::json!({})).await.unwrap();
        graph.create_edge("DERIVED_FROM", "mem-1", "conv-1", serde_json::json!({})).await.unwrap();

        let plan = CascadePlan::new("user-1", Some(&graph as &dyn GraphAdapter));
        let node_ids = plan.collect("userId").await.unwrap();
        assert_eq!(node_ids, vec!["mem-1".to_string()]);

        let removed = plan.execute(&node_ids).await.unwrap();
        assert_eq!(removed, 2, "mem-1 directly, conv-1 as the island it leaves behind");
        assert!(graph.all_nodes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_adapter_configured_is_a_silent_no_op() {
        let plan = CascadePlan::new("user-1", None);
        assert!(plan.collect("userId").await.unwrap().is_empty());
        assert_eq!(plan.execute(&[]).await.unwrap(), 0);
    }
}
