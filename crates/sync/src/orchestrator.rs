use crate::executor::{run_source, RunContext};
use crate::progress::ProgressHub;
use crate::{BulkSyncResult, SyncError, SyncProgress, SyncResult};
use catalog::{CursorStore, Storage};
use connectors::{Registry, SecretStore};
use futures::{Stream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Worker-pool size used when `sync_many` is called without one.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// How long a terminal progress entry stays visible to pollers.
pub const PROGRESS_LINGER: std::time::Duration = std::time::Duration::from_secs(3);

const PROGRESS_CAPACITY: usize = 256;
const HISTORY_LIMIT: usize = 64;

/// Orchestrator runs executors for many sources concurrently under a
/// bounded worker pool, with per-source cancellation and a broadcast
/// progress feed. It holds no durable state of its own: cursors live in
/// the [`CursorStore`] and data in the target database; the only
/// engine-side lock is the in-flight map guarding one run per source.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<Registry>,
    storage: Arc<dyn Storage>,
    cursors: CursorStore,
    secrets: Arc<dyn SecretStore>,
    in_flight: Mutex<HashMap<String, CancellationToken>>,
    progress: ProgressHub,
    history: Mutex<VecDeque<SyncResult>>,
}

impl Orchestrator {
    /// Build an orchestrator over an installed registry, ensuring the
    /// cursor metadata table exists.
    pub async fn new(
        registry: Arc<Registry>,
        storage: Arc<dyn Storage>,
        secrets: Arc<dyn SecretStore>,
    ) -> anyhow::Result<Self> {
        let cursors = CursorStore::new(storage.clone());
        cursors.init().await?;

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                storage,
                cursors,
                secrets,
                in_flight: Mutex::new(HashMap::new()),
                progress: ProgressHub::new(PROGRESS_CAPACITY, PROGRESS_LINGER),
                history: Mutex::new(VecDeque::new()),
            }),
        })
    }

    /// Run one source to completion. Rejects with `AlreadyRunning`, before
    /// any work starts, if a run for the same source is in flight.
    pub async fn sync_one(&self, source_id: &str) -> SyncResult {
        let Some(connector) = self.inner.registry.get(source_id).cloned() else {
            return SyncResult::failed(
                source_id,
                0,
                0,
                SyncError::UnknownSource(source_id.to_string()),
            );
        };

        let cancel = CancellationToken::new();
        {
            let mut in_flight = self.inner.in_flight.lock().unwrap();
            if in_flight.contains_key(source_id) {
                return SyncResult::failed(
                    source_id,
                    0,
                    0,
                    SyncError::AlreadyRunning(source_id.to_string()),
                );
            }
            in_flight.insert(source_id.to_string(), cancel.clone());
        }

        let result = run_source(
            connector,
            RunContext {
                storage: self.inner.storage.clone(),
                cursors: self.inner.cursors.clone(),
                secrets: self.inner.secrets.clone(),
                progress: self.inner.progress.clone(),
                cancel,
            },
        )
        .await;

        self.inner.in_flight.lock().unwrap().remove(source_id);

        let mut history = self.inner.history.lock().unwrap();
        history.push_front(result.clone());
        history.truncate(HISTORY_LIMIT);

        result
    }

    /// Run many sources under a bounded worker pool: never more than
    /// `concurrency` executors at once, and the next queued source starts
    /// as soon as a slot frees up. Defaults to every installed source.
    /// A failing source occupies only its own slot of the aggregate.
    #[tracing::instrument(skip(self))]
    pub async fn sync_many(
        &self,
        source_ids: Option<Vec<String>>,
        concurrency: Option<usize>,
    ) -> BulkSyncResult {
        let ids = source_ids.unwrap_or_else(|| self.inner.registry.names());
        let concurrency = concurrency.unwrap_or(DEFAULT_CONCURRENCY).max(1);
        let started = std::time::Instant::now();

        let results: Vec<SyncResult> = futures::stream::iter(ids)
            .map(|id| {
                let this = self.clone();
                async move { this.sync_one(&id).await }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let successful = results.iter().filter(|r| r.success).count();
        let bulk = BulkSyncResult {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            results,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            total = bulk.total,
            successful = bulk.successful,
            failed = bulk.failed,
            ms = bulk.duration_ms,
            "bulk sync complete"
        );
        bulk
    }

    /// Signal cancellation for an in-flight run. Returns false (a no-op)
    /// if the source is not currently running.
    pub fn cancel(&self, source_id: &str) -> bool {
        match self.inner.in_flight.lock().unwrap().get(source_id) {
            Some(token) => {
                tracing::info!(source = %source_id, "cancelling sync");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Source ids with a run currently in flight.
    pub fn running(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .in_flight
            .lock()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Subscribe to the live progress feed. Every subscriber receives
    /// every subsequent event; past events are never replayed. A slow
    /// subscriber lags and loses the oldest events rather than blocking
    /// publishers.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SyncProgress> {
        self.inner.progress.subscribe()
    }

    /// The feed as a Stream, for transports that frame each event as one
    /// message (e.g. server-sent events). Lagged gaps are skipped.
    pub fn progress_stream(&self) -> impl Stream<Item = SyncProgress> {
        tokio_stream::wrappers::BroadcastStream::new(self.inner.progress.subscribe())
            .filter_map(|event| futures::future::ready(event.ok()))
    }

    /// The most recent progress per source, for pollers; terminal entries
    /// are dropped [`PROGRESS_LINGER`] after they complete.
    pub fn current_progress(&self) -> Vec<SyncProgress> {
        self.inner.progress.current()
    }

    /// Recent run outcomes, newest first, optionally filtered by source.
    pub fn history(&self, source_id: Option<&str>) -> Vec<SyncResult> {
        self.inner
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|r| source_id.map_or(true, |id| r.source_id == id))
            .cloned()
            .collect()
    }
}
