use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// CursorHandle is the connector's checkpoint callback: a thread-safe cell
/// the connector sets as it consumes upstream pages, and the executor
/// snapshots after each durable batch write.
#[derive(Clone, Default)]
pub struct CursorHandle(Arc<Mutex<Option<String>>>);

impl CursorHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new resume point. The value is opaque to the engine.
    pub fn set(&self, cursor: impl Into<String>) {
        *self.0.lock().unwrap() = Some(cursor.into());
    }

    /// The most recent value passed to `set`, or None if never set.
    pub fn snapshot(&self) -> Option<String> {
        self.0.lock().unwrap().clone()
    }
}

impl fmt::Debug for CursorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CursorHandle({:?})", self.snapshot())
    }
}

/// Resolved secret values for one run, keyed by declared secret name.
/// Debug and Display never render the values.
#[derive(Clone, Default)]
pub struct Secrets(BTreeMap<String, String>);

impl Secrets {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self(values)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secrets({} values)", self.0.len())
    }
}

/// FetchContext is everything a connector receives for one run.
pub struct FetchContext {
    /// Resolved values for each of the connector's required secrets.
    pub secrets: Secrets,
    /// The cursor persisted by the last successful run, or None on a
    /// first run.
    pub cursor: Option<String>,
    /// Checkpoint callback; see [`CursorHandle`].
    pub checkpoint: CursorHandle,
    /// Parameterized SQL access to the target database. Connectors use
    /// this for their own DDL; row writes flow through the executor.
    pub sql: Arc<dyn catalog::Storage>,
    /// Span covering the whole run; connectors log within it via the
    /// usual `tracing` macros.
    pub span: tracing::Span,
}

impl fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchContext")
            .field("secrets", &self.secrets)
            .field("cursor", &self.cursor)
            .field("checkpoint", &self.checkpoint)
            .finish_non_exhaustive()
    }
}
