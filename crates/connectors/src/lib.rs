use std::sync::Arc;

mod context;
mod definition;
mod registry;
mod secrets;

pub use context::{CursorHandle, FetchContext, Secrets};
pub use definition::ConnectorDefinition;
pub use registry::Registry;
pub use secrets::{InMemorySecrets, SecretStore};

/// A homogeneous batch of records destined for one logical table.
/// Rows are JSON objects; nested values are stored as serialized JSON text.
#[derive(Debug, Clone)]
pub struct RowBatch {
    pub table: String,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl RowBatch {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            rows: Vec::new(),
        }
    }
}

/// The finite, lazily-produced sequence of batches returned by a fetch.
/// The executor pulls it one batch at a time, interleaving writes with
/// further pagination, and drops it early on cancellation.
pub type BatchStream = futures::stream::BoxStream<'static, anyhow::Result<RowBatch>>;

/// Connector is the contract every data source implements: static
/// configuration plus a resumable fetch procedure.
///
/// A connector calls `ctx.checkpoint.set(..)` each time it has consumed a
/// unit of upstream work (typically one page). The executor persists that
/// cursor only once the corresponding batches have been durably written,
/// so a connector never needs to worry about crash-time replay beyond
/// tolerating re-delivery of rows it already yielded.
pub trait Connector: Send + Sync + 'static {
    fn config(&self) -> &ConnectorDefinition;

    fn fetch(&self, ctx: FetchContext) -> BatchStream;
}

pub type BoxedConnector = Arc<dyn Connector>;
