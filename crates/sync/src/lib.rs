mod error;
mod executor;
mod orchestrator;
mod progress;
mod result;

pub use error::SyncError;
pub use orchestrator::{Orchestrator, DEFAULT_CONCURRENCY, PROGRESS_LINGER};
pub use progress::{Phase, SyncProgress};
pub use result::{BulkSyncResult, SyncResult};

// Re-export CancellationToken; it's the caller's sole mechanism for
// reclaiming a worker slot held by a stuck connector.
pub use tokio_util::sync::CancellationToken;
