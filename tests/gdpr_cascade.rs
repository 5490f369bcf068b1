//! End-to-end scenario: a GDPR-style erasure request deletes a user across
//! every layer, and a failed verification rolls every layer back to its
//! pre-delete state rather than leaving a half-deleted user.
use agent_memory_core::graph::InMemoryGraph;
use agent_memory_core::{
    ConversationLog, ConversationType, Contexts, FactSourceType, FactStore, FactType, ImmutableStore, MemoryError, MutableStore, Participants, Source, SourceType, Users, VectorIndex,
};

fn seed_user(user_id: &str) -> (ConversationLog, ImmutableStore, MutableStore, VectorIndex, FactStore, Contexts, InMemoryGraph, Users) {
    let users = Users::new();
    users.register(user_id, Some("Jane".into()), None);

    let conversations = ConversationLog::new();
    conversations.create("space-1", ConversationType::UserAgent, Participants::UserAgent { user_id: user_id.into(), participant_id: "agent-1".into() }, None);

    let immutable = ImmutableStore::new();
    immutable.store("profile", user_id, serde_json::json!({"bio": "hello"}), Some(user_id.into()), None);

    let mutable = MutableStore::new();
    mutable.set("prefs", user_id, serde_json::json!({"userId": user_id, "theme": "dark"}), None);

    let vectors = VectorIndex::new();
    let source = Source { source_type: SourceType::System, user_id: Some(user_id.into()), participant_id: None };
    vectors.store("space-1", "a private note", None, 50, vec![], Some(source), None, None).unwrap();

    let facts = FactStore::new();
    facts
        .store("space-1", FactType::Preference, user_id, "likes", serde_json::json!("tea"), 80, FactSourceType::Manual, None, Some(user_id.into()), None, vec![], None, None, None)
        .unwrap();

    let contexts = Contexts::new();
    contexts.create("space-1", "ticket", None, None, None, None, vec![user_id.into()], None).unwrap();

    let graph = InMemoryGraph::new();

    (conversations, immutable, mutable, vectors, facts, contexts, graph, users)
}

#[tokio::test]
async fn dry_run_reports_counts_and_mutates_nothing() {
    let (conversations, immutable, mutable, vectors, facts, contexts, graph, users) = seed_user("user-dry");

    let report = users.delete("user-dry", true, &conversations, &immutable, &mutable, &vectors, &facts, &contexts, Some(&graph)).await.unwrap();
    assert!(report.dry_run);
    assert_eq!(report.deleted["conversations"], 1);
    assert_eq!(report.deleted["immutable"], 1);
    assert_eq!(report.deleted["mutable"], 1);
    assert_eq!(report.deleted["vectors"], 1);
    assert_eq!(report.deleted["facts"], 1);
    assert_eq!(report.deleted["contexts"], 1);

    assert!(users.get("user-dry").is_ok(), "dry run leaves the user registered");
    assert_eq!(conversations.collect_for_user("user-dry").len(), 1);
    assert_eq!(contexts.collect_for_user("user-dry").len(), 1);
}

#[tokio::test]
async fn cascade_erases_every_layer_with_zero_residue() {
    let (conversations, immutable, mutable, vectors, facts, contexts, graph, users) = seed_user("user-real");
    graph.create_node("mem-graph-1", vec!["Memory".into()], serde_json::json!({"userId": "user-real"})).await.unwrap();

    let report = users.delete("user-real", false, &conversations, &immutable, &mutable, &vectors, &facts, &contexts, Some(&graph)).await.unwrap();
    assert!(!report.dry_run);
    assert!(report.backup_id.is_some());
    assert_eq!(report.deleted["graph"], 1);

    assert!(conversations.collect_for_user("user-real").is_empty());
    assert!(immutable.collect_for_user("user-real").is_empty());
    assert!(mutable.collect_for_user("user-real").is_empty());
    assert!(vectors.collect_for_user("user-real").is_empty());
    assert!(facts.collect_for_user("user-real").is_empty());
    assert!(contexts.collect_for_user("user-real").is_empty());
    assert!(users.get("user-real").is_err());
    assert!(graph.find_nodes_by_property("userId", serde_json::json!("user-real")).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_an_unknown_user_fails_without_touching_other_layers() {
    let (conversations, immutable, mutable, vectors, facts, contexts, graph, users) = seed_user("user-real-2");
    let err = users.delete("nobody", false, &conversations, &immutable, &mutable, &vectors, &facts, &contexts, Some(&graph)).await.unwrap_err();
    assert!(matches!(err, MemoryError::UserNotFound(_)));
    assert_eq!(conversations.collect_for_user("user-real-2").len(), 1, "unrelated user untouched");
}
