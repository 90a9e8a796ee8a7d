use super::{Statement, Storage};
use serde_json::json;
use std::sync::Arc;

/// Metadata table holding the last-synced cursor per source. Kept apart
/// from connector-owned tables and hidden from introspection.
pub const CURSOR_TABLE: &str = "sync_cursors";

/// CursorStore is the durable per-source resume point. `set` happens
/// strictly after the batch it describes is written; the executor commits
/// both in one transaction via [`CursorStore::advance_statement`], so a
/// crash replays a batch rather than skipping one.
#[derive(Clone)]
pub struct CursorStore {
    storage: Arc<dyn Storage>,
}

impl CursorStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Create the metadata table if needed.
    pub async fn init(&self) -> anyhow::Result<()> {
        self.storage
            .execute(
                "CREATE TABLE IF NOT EXISTS sync_cursors (\
                 source_id TEXT PRIMARY KEY, \
                 cursor TEXT NOT NULL, \
                 updated_at TEXT NOT NULL)",
                vec![],
            )
            .await?;
        Ok(())
    }

    pub async fn get(&self, source_id: &str) -> anyhow::Result<Option<String>> {
        let rows = self
            .storage
            .query(
                "SELECT cursor FROM sync_cursors WHERE source_id = ?1",
                vec![json!(source_id)],
            )
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.get("cursor").and_then(|v| v.as_str().map(String::from))))
    }

    pub async fn set(&self, source_id: &str, cursor: &str) -> anyhow::Result<()> {
        let statement = Self::advance_statement(source_id, cursor);
        self.storage.execute(&statement.sql, statement.params).await?;
        Ok(())
    }

    /// The upsert statement advancing one source's cursor, for inclusion
    /// in the same transaction as the batch write it follows.
    pub fn advance_statement(source_id: &str, cursor: &str) -> Statement {
        Statement::new(
            "INSERT INTO sync_cursors (source_id, cursor, updated_at) \
             VALUES (?1, ?2, ?3) \
             ON CONFLICT (source_id) DO UPDATE SET \
             cursor = excluded.cursor, updated_at = excluded.updated_at",
            vec![
                json!(source_id),
                json!(cursor),
                json!(chrono::Utc::now().to_rfc3339()),
            ],
        )
    }
}
