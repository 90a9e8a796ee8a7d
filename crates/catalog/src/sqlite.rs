use super::{SqlRow, Statement, Storage};
use anyhow::Context;
use rusqlite::types::ValueRef;
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SqliteStorage adapts a rusqlite connection to the async [`Storage`]
/// contract. The connection lives behind a mutex and every call moves to
/// a blocking thread, so executors awaiting a write never stall the
/// runtime.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = rusqlite::Connection::open(path.as_ref())
            .with_context(|| format!("failed to open database at {:?}", path.as_ref()))?;
        Self::prepare(conn)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn =
            rusqlite::Connection::open_in_memory().context("failed to open in-memory database")?;
        Self::prepare(conn)
    }

    fn prepare(conn: rusqlite::Connection) -> anyhow::Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> anyhow::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap();
            f(&mut guard)
        })
        .await
        .context("storage task panicked")?
    }
}

#[async_trait::async_trait]
impl Storage for SqliteStorage {
    async fn query(&self, sql: &str, params: Vec<Value>) -> anyhow::Result<Vec<SqlRow>> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&sql)
                .with_context(|| format!("failed to prepare query: {sql}"))?;
            let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

            let params = bind_params(&params)?;
            let mut rows = stmt.query(rusqlite::params_from_iter(params))?;

            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut record = SqlRow::new();
                for (index, column) in columns.iter().enumerate() {
                    record.insert(column.clone(), read_value(row.get_ref(index)?));
                }
                out.push(record);
            }
            Ok(out)
        })
        .await
    }

    async fn execute(&self, sql: &str, params: Vec<Value>) -> anyhow::Result<u64> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let params = bind_params(&params)?;
            let affected = conn
                .execute(&sql, rusqlite::params_from_iter(params))
                .with_context(|| format!("failed to execute: {sql}"))?;
            Ok(affected as u64)
        })
        .await
    }

    async fn transaction(&self, statements: Vec<Statement>) -> anyhow::Result<u64> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut affected = 0u64;
            for Statement { sql, params } in &statements {
                let params = bind_params(params)?;
                affected += tx
                    .execute(sql, rusqlite::params_from_iter(params))
                    .with_context(|| format!("failed to execute in transaction: {sql}"))?
                    as u64;
            }
            tx.commit()?;
            Ok(affected)
        })
        .await
    }
}

/// JSON values map onto SQLite's storage classes; arrays and objects are
/// bound as serialized JSON text.
fn bind_params(params: &[Value]) -> anyhow::Result<Vec<rusqlite::types::Value>> {
    use rusqlite::types::Value as Sql;

    params
        .iter()
        .map(|value| {
            Ok(match value {
                Value::Null => Sql::Null,
                Value::Bool(b) => Sql::Integer(*b as i64),
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Sql::Integer(i)
                    } else if let Some(f) = n.as_f64() {
                        Sql::Real(f)
                    } else {
                        anyhow::bail!("number {n} is not representable as a SQL parameter")
                    }
                }
                Value::String(s) => Sql::Text(s.clone()),
                Value::Array(_) | Value::Object(_) => Sql::Text(serde_json::to_string(value)?),
            })
        })
        .collect()
}

fn read_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(base64::encode(b)),
    }
}
