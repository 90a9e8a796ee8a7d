use serde_json::Value;

/// One result row, keyed by column name.
pub type SqlRow = serde_json::Map<String, Value>;

/// A parameterized SQL statement. Values are always bound as parameters;
/// only identifiers quoted through [`quote_ident`] may be interpolated
/// into the text, which keeps connector-supplied data out of the SQL.
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Storage is the engine's only view of the target database: arbitrary
/// parameterized reads (used by introspection), parameterized writes, and
/// multi-statement transactions (used to commit a batch and its cursor
/// atomically). The engine takes no locks of its own here; it relies on
/// the database's concurrency control.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    async fn query(&self, sql: &str, params: Vec<Value>) -> anyhow::Result<Vec<SqlRow>>;

    /// Execute one statement, returning the number of affected rows.
    async fn execute(&self, sql: &str, params: Vec<Value>) -> anyhow::Result<u64>;

    /// Execute the statements in order inside a single transaction,
    /// returning the total number of affected rows. Any failure rolls the
    /// whole transaction back.
    async fn transaction(&self, statements: Vec<Statement>) -> anyhow::Result<u64>;
}

/// Quote an identifier for interpolation into SQL text. Double quotes in
/// the name itself are doubled, per the SQL standard.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
