use super::SyncError;

/// The immutable outcome of one executor run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncResult {
    pub source_id: String,
    pub success: bool,
    pub row_count: u64,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SyncError>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl SyncResult {
    pub fn ok(source_id: &str, row_count: u64, duration_ms: u64) -> Self {
        Self {
            source_id: source_id.to_string(),
            success: true,
            row_count,
            duration_ms,
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn failed(source_id: &str, row_count: u64, duration_ms: u64, error: SyncError) -> Self {
        Self {
            source_id: source_id.to_string(),
            success: false,
            row_count,
            duration_ms,
            error: Some(error),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Aggregate of one `sync_many` call. `results` completion order is
/// arbitrary; compare by source id, not position.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BulkSyncResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<SyncResult>,
    pub duration_ms: u64,
}

impl BulkSyncResult {
    pub fn result_for(&self, source_id: &str) -> Option<&SyncResult> {
        self.results.iter().find(|r| r.source_id == source_id)
    }
}
