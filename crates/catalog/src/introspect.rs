use super::{cursors::CURSOR_TABLE, Storage};
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Logical column types. Declared, database-specific type names are
/// normalized into this closed set so downstream logic stays
/// database-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnType {
    Integer,
    Real,
    Boolean,
    Text,
    Timestamp,
    Json,
    Binary,
    UnknownArray,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub nullable: bool,
    pub is_primary_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
}

/// One physical table, as introspected from the database catalog.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub indexes: Vec<IndexDescriptor>,
}

/// Map a declared type name onto the logical [`ColumnType`] set. Handles
/// both SQLite declared types and the Postgres-flavored names connectors
/// commonly put in their DDL.
pub(crate) fn normalize_type(declared: &str) -> ColumnType {
    let declared = declared.trim();
    if declared.is_empty() {
        return ColumnType::Unknown;
    }
    if declared.ends_with("[]") || declared.starts_with('_') {
        return ColumnType::UnknownArray;
    }

    let upper = declared.to_ascii_uppercase();
    if upper.contains("JSON") {
        ColumnType::Json
    } else if upper.contains("BOOL") {
        ColumnType::Boolean
    } else if upper.contains("TIMESTAMP") || upper.contains("DATE") || upper.contains("TIME") {
        ColumnType::Timestamp
    } else if upper.contains("INT") {
        ColumnType::Integer
    } else if upper.contains("CHAR") || upper.contains("TEXT") || upper.contains("CLOB") || upper.contains("UUID") {
        ColumnType::Text
    } else if upper.contains("REAL")
        || upper.contains("FLOA")
        || upper.contains("DOUB")
        || upper.contains("NUMERIC")
        || upper.contains("DECIMAL")
    {
        ColumnType::Real
    } else if upper.contains("BLOB") || upper.contains("BYTEA") || upper.contains("BINARY") {
        ColumnType::Binary
    } else {
        ColumnType::Unknown
    }
}

/// Enumerate all non-system tables and their column definitions, in one
/// pass over the database catalog. Pure read; results are never cached,
/// so callers observe schema drift on the next call. The engine's own
/// cursor metadata table is excluded along with SQLite internals.
#[tracing::instrument(skip(storage))]
pub async fn introspect(storage: &dyn Storage) -> anyhow::Result<Vec<TableDescriptor>> {
    let tables = storage
        .query(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name != ?1 \
             ORDER BY name",
            vec![json!(CURSOR_TABLE)],
        )
        .await?;

    let mut out = Vec::with_capacity(tables.len());
    for row in tables {
        let Some(Value::String(name)) = row.get("name").cloned() else {
            continue;
        };
        out.push(describe_table(storage, &name).await?);
    }

    tracing::debug!(tables = out.len(), "introspected database schema");
    Ok(out)
}

async fn describe_table(storage: &dyn Storage, table: &str) -> anyhow::Result<TableDescriptor> {
    let columns = storage
        .query(
            "SELECT name, type, \"notnull\", dflt_value, pk \
             FROM pragma_table_info(?1) ORDER BY cid",
            vec![json!(table)],
        )
        .await?
        .into_iter()
        .map(|row| ColumnDescriptor {
            name: as_text(row.get("name")),
            column_type: normalize_type(&as_text(row.get("type"))),
            nullable: as_i64(row.get("notnull")) == 0,
            is_primary_key: as_i64(row.get("pk")) > 0,
            default_value: match row.get("dflt_value") {
                Some(Value::Null) | None => None,
                Some(other) => Some(render_default(other)),
            },
        })
        .collect();

    let mut indexes = Vec::new();
    for row in storage
        .query(
            "SELECT name, \"unique\" FROM pragma_index_list(?1) ORDER BY name",
            vec![json!(table)],
        )
        .await?
    {
        let index_name = as_text(row.get("name"));
        let index_columns = storage
            .query(
                "SELECT name FROM pragma_index_info(?1) ORDER BY seqno",
                vec![json!(index_name.clone())],
            )
            .await?
            .into_iter()
            .map(|col| as_text(col.get("name")))
            .collect();
        indexes.push(IndexDescriptor {
            name: index_name,
            unique: as_i64(row.get("unique")) != 0,
            columns: index_columns,
        });
    }

    Ok(TableDescriptor {
        name: table.to_string(),
        columns,
        indexes,
    })
}

/// Tables that exist physically but are claimed by no source. Runs in
/// O(tables) over an already-introspected snapshot.
pub fn orphans<'t>(
    tables: &'t [TableDescriptor],
    claimed: impl IntoIterator<Item = &'t str>,
) -> Vec<&'t TableDescriptor> {
    let claimed: BTreeSet<&str> = claimed.into_iter().collect();
    tables
        .iter()
        .filter(|table| !claimed.contains(table.name.as_str()))
        .collect()
}

fn as_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn as_i64(value: Option<&Value>) -> i64 {
    value.and_then(Value::as_i64).unwrap_or(0)
}

fn render_default(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
