//! The background sync worker that drains a change feed into the
//! configured `GraphAdapter`. Cancellation uses a `tokio::sync::watch`
//! boolean rather than `tokio_util::sync::CancellationToken` — one fewer
//! dependency for the same shutdown signal shape.
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::coordination::contexts::Context;
use crate::facts::Fact;
use crate::types::{now_ms, Timestamp};
use crate::vector::VectorMemory;

use super::adapter::GraphAdapter;
use super::mirror::{find_orphaned_islands, sync_context, sync_fact, sync_memory};

/// A single pending mirror update.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// A vector memory was created or updated.
    MemoryUpserted(VectorMemory),
    /// A fact was created or superseded.
    FactUpserted(Fact),
    /// A context was created or updated.
    ContextUpserted(Context),
    /// A node (and its edges) should be removed from the mirror.
    NodeDeleted(String),
}

/// Tunables for the sync worker.
#[derive(Debug, Clone, Copy)]
pub struct SyncWorkerConfig {
    /// How many events to drain per poll before yielding.
    pub batch_size: usize,
    /// How many times to retry a failed sync before counting it `failed`.
    pub retry_attempts: u32,
    /// Delay between retries.
    pub backoff: Duration,
    /// Emit a `tracing::debug!` line per processed event.
    pub verbose: bool,
}

impl Default for SyncWorkerConfig {
    fn default() -> Self {
        Self { batch_size: 50, retry_attempts: 3, backoff: Duration::from_millis(100), verbose: false }
    }
}

/// Lock-free counters describing the worker's progress. A single sync
/// failure is never promoted to a caller-visible error on the authoritative
/// write path — it only moves `failed` here.
#[derive(Debug, Default)]
pub struct SyncWorkerMetrics {
    processed: AtomicU64,
    failed: AtomicU64,
    last_processed_at: AtomicI64,
}

impl SyncWorkerMetrics {
    /// Events successfully mirrored.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Events that exhausted their retries.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// When the most recent event was processed (successfully or not).
    pub fn last_processed_at(&self) -> Option<Timestamp> {
        let v = self.last_processed_at.load(Ordering::Relaxed);
        if v == 0 {
            None
        } else {
            Some(v)
        }
    }

    /// How far behind "now" the last processed event is, in milliseconds.
    /// Exposed with no asserted bound — the acceptable lag is a deployment
    /// concern, not something this crate can decide.
    pub fn lag_ms(&self) -> i64 {
        match self.last_processed_at() {
            Some(t) => (now_ms() - t).max(0),
            None => 0,
        }
    }
}

/// Drains a `ChangeEvent` feed into a `GraphAdapter` until told to stop.
pub struct SyncWorker {
    adapter: Arc<dyn GraphAdapter>,
    config: SyncWorkerConfig,
    metrics: Arc<SyncWorkerMetrics>,
    events: mpsc::Receiver<ChangeEvent>,
    shutdown: watch::Receiver<bool>,
}

impl SyncWorker {
    /// Build a worker and its shutdown handle. The caller is responsible
    /// for `tokio::spawn`-ing `run()`.
    pub fn new(adapter: Arc<dyn GraphAdapter>, config: SyncWorkerConfig, events: mpsc::Receiver<ChangeEvent>) -> (Self, watch::Sender<bool>, Arc<SyncWorkerMetrics>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = Arc::new(SyncWorkerMetrics::default());
        (Self { adapter, config, metrics: metrics.clone(), events, shutdown: shutdown_rx }, shutdown_tx, metrics)
    }

    /// Run until the shutdown handle is signaled or the event channel
    /// closes. Drains up to `config.batch_size` pending events per wake-up
    /// before re-checking shutdown, rather than processing exactly one per
    /// loop iteration.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        tracing::info!("sync worker stopping");
                        return;
                    }
                }
                event = self.events.recv() => {
                    match event {
                        Some(event) => {
                            self.process_with_retry(event).await;
                            for _ in 1..self.config.batch_size {
                                match self.events.try_recv() {
                                    Ok(event) => self.process_with_retry(event).await,
                                    Err(_) => break,
                                }
                            }
                        }
                        None => {
                            tracing::info!("sync worker event channel closed");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn process_with_retry(&self, event: ChangeEvent) {
        let mut attempt = 0;
        loop {
            match self.apply(&event).await {
                Ok(()) => {
                    self.metrics.processed.fetch_add(1, Ordering::Relaxed);
                    self.metrics.last_processed_at.store(now_ms(), Ordering::Relaxed);
                    if self.config.verbose {
                        tracing::debug!(?event, "mirrored");
                    }
                    return;
                }
                Err(e) if attempt < self.config.retry_attempts => {
                    attempt += 1;
                    tracing::warn!(error = %e, attempt, "graph sync failed, retrying");
                    tokio::time::sleep(self.config.backoff).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "graph sync exhausted retries, dropping event");
                    self.metrics.failed.fetch_add(1, Ordering::Relaxed);
                    self.metrics.last_processed_at.store(now_ms(), Ordering::Relaxed);
                    return;
                }
            }
        }
    }

    async fn apply(&self, event: &ChangeEvent) -> crate::error::MemoryResult<()> {
        match event {
            ChangeEvent::MemoryUpserted(memory) => sync_memory(self.adapter.as_ref(), memory).await,
            ChangeEvent::FactUpserted(fact) => sync_fact(self.adapter.as_ref(), fact).await,
            ChangeEvent::ContextUpserted(context) => sync_context(self.adapter.as_ref(), context).await,
            ChangeEvent::NodeDeleted(id) => {
                self.adapter.delete_node(id).await?;
                // The deleted node may have been the only anchor holding
                // other mirror nodes reachable; sweep for islands it leaves
                // behind and remove those too.
                for orphan in find_orphaned_islands(self.adapter.as_ref()).await? {
                    self.adapter.delete_node(&orphan.id).await?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::mirror::InMemoryGraph;

    #[tokio::test]
    async fn processes_events_until_stopped() {
        let adapter: Arc<dyn GraphAdapter> = Arc::new(InMemoryGraph::new());
        let (tx, rx) = mpsc::channel(8);
        let (worker, stop_tx, metrics) = SyncWorker::new(adapter.clone(), SyncWorkerConfig::default(), rx);
        let handle = tokio::spawn(worker.run());

        let memory = VectorMemory {
            memory_id: "mem-1".into(),
            memory_space_id: "space-1".into(),
            content: "hi".into(),
            embedding: None,
            importance: 50,
            tags: vec![],
            source: None,
            conversation_ref: None,
            version: 1,
            previous_versions: vec![],
            archived: false,
            deleted_at: None,
            created_at: 0,
            updated_at: 0,
            metadata: None,
        };
        tx.send(ChangeEvent::MemoryUpserted(memory)).await.unwrap();

        // Give the worker a beat to drain the event before stopping it.
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(metrics.processed(), 1);
        assert_eq!(metrics.failed(), 0);
        assert!(metrics.last_processed_at().is_some());
    }
}
