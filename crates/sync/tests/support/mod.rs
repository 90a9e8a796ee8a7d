use catalog::{SqliteStorage, Storage};
use connectors::{
    BatchStream, Connector, ConnectorDefinition, FetchContext, InMemorySecrets, Registry, RowBatch,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use sync::Orchestrator;

/// One step of a scripted fetch.
#[derive(Clone)]
pub enum Step {
    /// Yield `count` generated rows, ids starting at `first_id`, after
    /// recording `cursor` as the checkpoint for this page. `table` of
    /// None targets the connector's default `<name>_items` table.
    Batch {
        table: Option<String>,
        first_id: i64,
        count: usize,
        cursor: Option<String>,
    },
    Sleep(Duration),
    Fail(String),
}

impl Step {
    pub fn batch(first_id: i64, count: usize, cursor: &str) -> Self {
        Step::Batch {
            table: None,
            first_id,
            count,
            cursor: Some(cursor.to_string()),
        }
    }

    pub fn batch_for(table: &str, first_id: i64, count: usize, cursor: &str) -> Self {
        Step::Batch {
            table: Some(table.to_string()),
            first_id,
            count,
            cursor: Some(cursor.to_string()),
        }
    }

    pub fn sleep(ms: u64) -> Self {
        Step::Sleep(Duration::from_millis(ms))
    }

    pub fn fail(message: &str) -> Self {
        Step::Fail(message.to_string())
    }
}

/// A connector that replays a fixed script, for exercising the engine
/// without any network.
pub struct Scripted {
    def: ConnectorDefinition,
    steps: Vec<Step>,
}

impl Scripted {
    pub fn new(name: &str, steps: Vec<Step>) -> Self {
        Self {
            def: ConnectorDefinition {
                name: name.to_string(),
                title: name.to_string(),
                description: String::new(),
                schedule: None,
                required_secrets: Vec::new(),
                declared_streams: vec!["items".to_string()],
                primary_key: Some(vec!["id".to_string()]),
                subscriptions: BTreeMap::new(),
            },
            steps,
        }
    }

    pub fn requiring(mut self, secrets: &[&str]) -> Self {
        self.def.required_secrets = secrets.iter().map(|s| s.to_string()).collect();
        self
    }
}

pub fn rows(first_id: i64, count: usize) -> Vec<serde_json::Map<String, Value>> {
    (0..count)
        .map(|offset| {
            let id = first_id + offset as i64;
            let mut row = serde_json::Map::new();
            row.insert("id".to_string(), json!(id));
            row.insert("title".to_string(), json!(format!("row {id}")));
            row
        })
        .collect()
}

impl Connector for Scripted {
    fn config(&self) -> &ConnectorDefinition {
        &self.def
    }

    fn fetch(&self, ctx: FetchContext) -> BatchStream {
        let steps: VecDeque<Step> = self.steps.clone().into();
        let default_table = self.def.table_for_stream("items");
        let checkpoint = ctx.checkpoint.clone();

        Box::pin(futures::stream::unfold(
            (steps, checkpoint, default_table),
            |(mut steps, checkpoint, default_table)| async move {
                loop {
                    match steps.pop_front()? {
                        Step::Sleep(duration) => tokio::time::sleep(duration).await,
                        Step::Fail(message) => {
                            steps.clear();
                            return Some((
                                Err(anyhow::anyhow!(message)),
                                (steps, checkpoint, default_table),
                            ));
                        }
                        Step::Batch {
                            table,
                            first_id,
                            count,
                            cursor,
                        } => {
                            if let Some(cursor) = cursor {
                                checkpoint.set(cursor);
                            }
                            let batch = RowBatch {
                                table: table.unwrap_or_else(|| default_table.clone()),
                                rows: rows(first_id, count),
                            };
                            return Some((Ok(batch), (steps, checkpoint, default_table)));
                        }
                    }
                }
            },
        ))
    }
}

/// Storage, registry, and orchestrator wired together over an in-memory
/// database, with one `<name>_items` table per scripted connector.
pub async fn harness(
    scripted: Vec<Scripted>,
) -> (Orchestrator, Arc<dyn Storage>, Arc<InMemorySecrets>) {
    init_tracing();

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let mut registry = Registry::new();
    for connector in scripted {
        let table = connector.def.table_for_stream("items");
        storage
            .execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY, title TEXT)",
                    catalog::quote_ident(&table)
                ),
                vec![],
            )
            .await
            .unwrap();
        registry = registry.register(connector).unwrap();
    }

    let secrets = Arc::new(InMemorySecrets::new());
    let orchestrator = Orchestrator::new(Arc::new(registry), storage.clone(), secrets.clone())
        .await
        .unwrap();
    (orchestrator, storage, secrets)
}

pub async fn table_count(storage: &dyn Storage, table: &str) -> i64 {
    let rows = storage
        .query(
            &format!("SELECT COUNT(*) AS n FROM {}", catalog::quote_ident(table)),
            vec![],
        )
        .await
        .unwrap();
    rows[0]["n"].as_i64().unwrap()
}

pub async fn stored_cursor(storage: Arc<dyn Storage>, source_id: &str) -> Option<String> {
    catalog::CursorStore::new(storage).get(source_id).await.unwrap()
}

fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::WARN.into())
                    .from_env_lossy(),
            )
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
