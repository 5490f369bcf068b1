//! GraphMirror (X) — an optional, best-effort graph projection of memories,
//! facts and contexts. Sync failures never surface on the authoritative
//! write path; they are only ever visible through `SyncWorkerMetrics`.
pub mod adapter;
pub mod mirror;
pub mod worker;

pub use adapter::{GraphAdapter, GraphEdge, GraphNode};
pub use mirror::{find_orphaned_islands, sync_context, sync_fact, sync_memory, InMemoryGraph, ANCHOR_LABELS, MAX_TRAVERSAL_DEPTH};
pub use worker::{ChangeEvent, SyncWorker, SyncWorkerConfig, SyncWorkerMetrics};
