//! End-to-end scenario: after a memory is deleted, its mirrored graph node
//! becomes an island — unreachable from any anchor label — and the
//! orphan-island scan finds it so a cleanup job can remove it.
use agent_memory_core::graph::{find_orphaned_islands, sync_context, sync_fact, sync_memory, GraphAdapter, InMemoryGraph};
use agent_memory_core::{Context, Fact, FactSourceType, FactType, Source, SourceType, VectorMemory};

fn fact(id: &str, supersedes: Option<&str>) -> Fact {
    Fact {
        fact_id: id.into(),
        memory_space_id: "space-1".into(),
        fact_type: FactType::Observation,
        subject: "agent-1".into(),
        predicate: "noted".into(),
        object: serde_json::json!(true),
        confidence: 80,
        source_type: FactSourceType::System,
        source_ref: None,
        user_id: None,
        participant_id: None,
        tags: vec![],
        valid_from: None,
        valid_until: None,
        version: 1,
        previous_versions: vec![],
        superseded_by: None,
        supersedes: supersedes.map(String::from),
        created_at: 0,
        updated_at: 0,
        metadata: None,
    }
}

fn memory(id: &str, conversation_id: Option<&str>) -> VectorMemory {
    VectorMemory {
        memory_id: id.into(),
        memory_space_id: "space-1".into(),
        content: "hi".into(),
        embedding: None,
        importance: 50,
        tags: vec![],
        source: Some(Source { source_type: SourceType::Conversation, user_id: None, participant_id: None }),
        conversation_ref: conversation_id.map(|c| agent_memory_core::vector::ConversationRef { conversation_id: c.into(), message_ids: vec![] }),
        version: 1,
        previous_versions: vec![],
        archived: false,
        deleted_at: None,
        created_at: 0,
        updated_at: 0,
        metadata: None,
    }
}

fn context(id: &str, parent: Option<&str>) -> Context {
    Context {
        context_id: id.into(),
        memory_space_id: "space-1".into(),
        name: "ctx".into(),
        purpose: None,
        data: None,
        status: Default::default(),
        parent_context_id: parent.map(String::from),
        conversation_id: None,
        participants: vec![],
        access_grants: vec![],
        created_at: 0,
        updated_at: 0,
        metadata: None,
    }
}

#[tokio::test]
async fn deleting_a_memory_node_leaves_an_island_the_scan_detects() {
    let graph = InMemoryGraph::new();
    graph.create_node("conv-1", vec!["Conversation".into()], serde_json::json!({})).await.unwrap();
    sync_memory(&graph, &memory("mem-1", Some("conv-1"))).await.unwrap();

    // The conversation node is itself not an anchor label, but the memory
    // reaches it by edge, so nothing is orphaned yet.
    assert!(find_orphaned_islands(&graph).await.unwrap().is_empty());

    // Deleting the memory node removes the memory and its edge; the
    // conversation node (a non-anchor label) is now disconnected from every
    // anchor and the scan should flag it as an island.
    graph.delete_node("mem-1").await.unwrap();
    assert!(graph.find_nodes("Memory", Default::default()).await.unwrap().is_empty());

    let orphaned = find_orphaned_islands(&graph).await.unwrap();
    assert_eq!(orphaned.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(), vec!["conv-1"]);
}

#[tokio::test]
async fn fact_supersession_chain_links_via_supersedes_edge() {
    let graph = InMemoryGraph::new();
    sync_fact(&graph, &fact("fact-1", None)).await.unwrap();
    sync_fact(&graph, &fact("fact-2", Some("fact-1"))).await.unwrap();

    let path = graph.find_path("fact-2", "fact-1").await.unwrap();
    assert_eq!(path, Some(vec!["fact-2".to_string(), "fact-1".to_string()]));

    // Both facts carry the Fact anchor label, so neither is an orphan.
    let orphaned = find_orphaned_islands(&graph).await.unwrap();
    assert!(orphaned.is_empty());
}

#[tokio::test]
async fn context_tree_links_parent_to_child() {
    let graph = InMemoryGraph::new();
    sync_context(&graph, &context("root", None)).await.unwrap();
    sync_context(&graph, &context("child", Some("root"))).await.unwrap();

    let path = graph.find_path("root", "child").await.unwrap();
    assert_eq!(path, Some(vec!["root".to_string(), "child".to_string()]));
}

#[tokio::test]
async fn disconnected_non_anchor_node_is_flagged_while_the_anchor_itself_is_not() {
    let graph = InMemoryGraph::new();
    graph.create_node("detail-1", vec!["Detail".into()], serde_json::json!({})).await.unwrap();
    sync_memory(&graph, &memory("mem-1", None)).await.unwrap();

    let orphaned = find_orphaned_islands(&graph).await.unwrap();
    assert_eq!(orphaned.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(), vec!["detail-1"], "Memory is its own anchor and survives; Detail has no anchor reaching it");
}
