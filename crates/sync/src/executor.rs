use crate::progress::{Phase, ProgressHub, SyncProgress};
use crate::{SyncError, SyncResult};
use catalog::{upsert_batch_statements, CursorStore, Storage, CURSOR_TABLE};
use connectors::{BoxedConnector, CursorHandle, FetchContext, SecretStore, Secrets};
use futures::StreamExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything one run borrows from the orchestrator. The executor itself
/// owns no state beyond the run's closure.
pub(crate) struct RunContext {
    pub storage: Arc<dyn Storage>,
    pub cursors: CursorStore,
    pub secrets: Arc<dyn SecretStore>,
    pub progress: ProgressHub,
    pub cancel: CancellationToken,
}

/// Run one connector to completion (or error, or cancellation), returning
/// the structured outcome. Never panics or propagates an Err to the
/// caller; every failure mode lands in `SyncResult::error`.
#[tracing::instrument(skip_all, fields(source = %connector.config().name))]
pub(crate) async fn run_source(connector: BoxedConnector, ctx: RunContext) -> SyncResult {
    let source_id = connector.config().name.clone();
    let started = std::time::Instant::now();

    let mut row_count = 0u64;
    let outcome = execute(&connector, &ctx, &mut row_count).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(()) => {
            tracing::info!(rows = row_count, ms = duration_ms, "sync complete");
            ctx.progress.publish(
                SyncProgress::new(&source_id, Phase::Done)
                    .with_progress(1.0)
                    .with_message(format!("synced {row_count} rows")),
            );
            SyncResult::ok(&source_id, row_count, duration_ms)
        }
        Err(error) => {
            if error.is_cancelled() {
                tracing::info!(rows = row_count, ms = duration_ms, "sync cancelled");
            } else {
                tracing::warn!(rows = row_count, ms = duration_ms, %error, "sync failed");
            }
            ctx.progress.publish(
                SyncProgress::new(&source_id, Phase::Error).with_message(error.to_string()),
            );
            SyncResult::failed(&source_id, row_count, duration_ms, error)
        }
    }
}

async fn execute(
    connector: &BoxedConnector,
    ctx: &RunContext,
    row_count: &mut u64,
) -> Result<(), SyncError> {
    let def = connector.config();

    // Fail fast on missing secrets, before any network or database work.
    let missing: Vec<String> = def
        .required_secrets
        .iter()
        .filter(|name| !ctx.secrets.has(name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(SyncError::MissingSecrets(missing));
    }
    let mut resolved = BTreeMap::new();
    for name in &def.required_secrets {
        match ctx.secrets.get(name) {
            Some(value) => resolved.insert(name.clone(), value),
            None => return Err(SyncError::MissingSecrets(vec![name.clone()])),
        };
    }

    ctx.progress
        .publish(SyncProgress::new(&def.name, Phase::Connecting));

    let mut last_committed = ctx
        .cursors
        .get(&def.name)
        .await
        .map_err(|err| SyncError::write(CURSOR_TABLE, &err))?;

    let checkpoint = CursorHandle::new();
    let mut batches = connector.fetch(FetchContext {
        secrets: Secrets::new(resolved),
        cursor: last_committed.clone(),
        checkpoint: checkpoint.clone(),
        sql: ctx.storage.clone(),
        span: tracing::info_span!("fetch", source = %def.name),
    });

    loop {
        ctx.progress
            .publish(SyncProgress::new(&def.name, Phase::Fetching));

        // Awaiting the next batch may block on external latency, so the
        // cancellation token races it; this is how a stuck connector's
        // worker slot gets reclaimed.
        let next = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return Err(SyncError::Cancelled),
            next = batches.next() => next,
        };

        let batch = match next {
            None => break,
            Some(Ok(batch)) => batch,
            Some(Err(err)) => return Err(SyncError::connector(&err)),
        };

        *row_count += write_batch(def, &batch, ctx, &checkpoint, &mut last_committed).await?;

        // A batch write, once started, runs to completion; cancellation
        // takes effect only at this boundary.
        if ctx.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
    }

    // A checkpoint set after the final batch is safe to persist: every
    // yielded batch has been durably written by now.
    if let Some(cursor) = checkpoint.snapshot() {
        if Some(&cursor) != last_committed.as_ref() {
            ctx.cursors
                .set(&def.name, &cursor)
                .await
                .map_err(|err| SyncError::write(CURSOR_TABLE, &err))?;
        }
    }

    Ok(())
}

async fn write_batch(
    def: &connectors::ConnectorDefinition,
    batch: &connectors::RowBatch,
    ctx: &RunContext,
    checkpoint: &CursorHandle,
    last_committed: &mut Option<String>,
) -> Result<u64, SyncError> {
    let pending = checkpoint.snapshot();
    let advanced = pending.is_some() && pending != *last_committed;

    if batch.rows.is_empty() {
        // Nothing to write; any checkpoint describes already-committed
        // work, so it may be persisted on its own.
        if let (true, Some(cursor)) = (advanced, pending.as_ref()) {
            ctx.cursors
                .set(&def.name, cursor)
                .await
                .map_err(|err| SyncError::write(CURSOR_TABLE, &err))?;
            *last_committed = pending;
        }
        return Ok(0);
    }

    let key = def.primary_key.as_deref();
    let rows = match key {
        Some(key) if has_duplicate_keys(&batch.rows, key) => {
            ctx.progress.publish(
                SyncProgress::new(&def.name, Phase::Transforming)
                    .with_message(format!("deduplicating batch for {}", batch.table)),
            );
            dedup_by_key(&batch.rows, key)
        }
        _ => batch.rows.clone(),
    };

    let mut statements = upsert_batch_statements(&batch.table, key, &rows)
        .map_err(|err| SyncError::write(&batch.table, &err))?;

    // The cursor advances in the same transaction as the rows it
    // describes, so a crash replays the batch instead of skipping it.
    if let (true, Some(cursor)) = (advanced, pending.as_ref()) {
        statements.push(CursorStore::advance_statement(&def.name, cursor));
    }

    ctx.storage
        .transaction(statements)
        .await
        .map_err(|err| SyncError::write(&batch.table, &err))?;
    if advanced {
        *last_committed = pending;
    }

    ctx.progress.publish(
        SyncProgress::new(&def.name, Phase::Loading)
            .with_message(format!("wrote {} rows to {}", rows.len(), batch.table)),
    );
    Ok(rows.len() as u64)
}

fn key_of(row: &serde_json::Map<String, Value>, key: &[String]) -> Vec<Value> {
    key.iter()
        .map(|field| row.get(field).cloned().unwrap_or(Value::Null))
        .collect()
}

fn has_duplicate_keys(rows: &[serde_json::Map<String, Value>], key: &[String]) -> bool {
    let mut seen = Vec::with_capacity(rows.len());
    for row in rows {
        let k = key_of(row, key);
        if seen.contains(&k) {
            return true;
        }
        seen.push(k);
    }
    false
}

/// Within-batch dedup, last row wins, preserving first-occurrence order.
/// SQLite rejects a multi-row upsert that touches the same key twice, so
/// duplicates must collapse before the write.
fn dedup_by_key(
    rows: &[serde_json::Map<String, Value>],
    key: &[String],
) -> Vec<serde_json::Map<String, Value>> {
    let mut keys: Vec<Vec<Value>> = Vec::new();
    let mut out: Vec<serde_json::Map<String, Value>> = Vec::new();
    for row in rows {
        let k = key_of(row, key);
        if let Some(index) = keys.iter().position(|existing| *existing == k) {
            out[index] = row.clone();
        } else {
            keys.push(k);
            out.push(row.clone());
        }
    }
    out
}
