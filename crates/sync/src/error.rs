/// The failure modes of one sync run. Errors are carried inside a
/// [`crate::SyncResult`] rather than thrown across the orchestrator
/// boundary, so one failing source never disturbs its siblings.
///
/// Messages are captured as strings (with the full anyhow chain) so
/// results stay cheap to clone and serialize.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    /// One or more required secrets are absent. Raised before any network
    /// or database activity.
    #[error("missing required secrets: {}", .0.join(", "))]
    MissingSecrets(Vec<String>),
    /// The connector's fetch failed mid-stream. Batches committed before
    /// the failure remain committed.
    #[error("connector error: {0}")]
    Connector(String),
    /// The database rejected a batch. The cursor is never advanced past
    /// the failing batch.
    #[error("write to table '{table}' failed: {message}")]
    Write { table: String, message: String },
    /// The run was cancelled at a batch boundary. Not a connector bug and
    /// never retried automatically.
    #[error("sync was cancelled")]
    Cancelled,
    /// A run for this source is already in flight. Returned synchronously,
    /// before any work starts.
    #[error("source '{0}' is already syncing")]
    AlreadyRunning(String),
    #[error("no installed source named '{0}'")]
    UnknownSource(String),
}

impl SyncError {
    pub fn connector(err: &anyhow::Error) -> Self {
        Self::Connector(format!("{err:#}"))
    }

    pub fn write(table: &str, err: &anyhow::Error) -> Self {
        Self::Write {
            table: table.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingSecrets(_) => "missing_secrets",
            Self::Connector(_) => "connector",
            Self::Write { .. } => "write",
            Self::Cancelled => "cancelled",
            Self::AlreadyRunning(_) => "already_running",
            Self::UnknownSource(_) => "unknown_source",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// Serialized as {kind, message} so the UI can pass messages through
// verbatim while still distinguishing cancellation from real failures.
impl serde::Serialize for SyncError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("SyncError", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}
