use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Phases of one sync run, in the order the executor moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Connecting,
    Fetching,
    Transforming,
    Loading,
    Done,
    Error,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Error)
    }
}

/// A transient progress event. Never persisted; delivered to subscribers
/// of the orchestrator's broadcast feed and retained briefly for pollers.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SyncProgress {
    pub source_id: String,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SyncProgress {
    pub fn new(source_id: &str, phase: Phase) -> Self {
        Self {
            source_id: source_id.to_string(),
            phase,
            progress: None,
            message: None,
        }
    }

    pub fn with_progress(mut self, fraction: f32) -> Self {
        self.progress = Some(fraction);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Fan-out of progress events from all in-flight executors. Publishing
/// never blocks: slow broadcast subscribers lag and drop events, and the
/// latest event per source is retained separately until a linger period
/// after its terminal phase, for pollers that missed the live feed.
#[derive(Clone)]
pub(crate) struct ProgressHub {
    tx: broadcast::Sender<SyncProgress>,
    latest: Arc<Mutex<HashMap<String, SyncProgress>>>,
    linger: std::time::Duration,
}

impl ProgressHub {
    pub fn new(capacity: usize, linger: std::time::Duration) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            tx,
            latest: Arc::new(Mutex::new(HashMap::new())),
            linger,
        }
    }

    pub fn publish(&self, event: SyncProgress) {
        tracing::debug!(
            source = %event.source_id,
            phase = ?event.phase,
            message = event.message.as_deref().unwrap_or(""),
            "sync progress"
        );

        self.latest
            .lock()
            .unwrap()
            .insert(event.source_id.clone(), event.clone());

        if event.phase.is_terminal() {
            let latest = self.latest.clone();
            let source_id = event.source_id.clone();
            let linger = self.linger;
            tokio::spawn(async move {
                tokio::time::sleep(linger).await;
                let mut latest = latest.lock().unwrap();
                // A new run may have started meanwhile; only terminal
                // entries are collected.
                if latest.get(&source_id).is_some_and(|p| p.phase.is_terminal()) {
                    latest.remove(&source_id);
                }
            });
        }

        // An error here only means there are no subscribers right now.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncProgress> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Vec<SyncProgress> {
        let mut entries: Vec<SyncProgress> =
            self.latest.lock().unwrap().values().cloned().collect();
        entries.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        entries
    }
}
