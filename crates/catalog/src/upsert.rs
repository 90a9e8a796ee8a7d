use super::{quote_ident, Statement};
use serde_json::Value;

// SQLite's default SQLITE_MAX_VARIABLE_NUMBER since 3.32. Statements
// binding more parameters than this are rejected outright.
const MAX_BIND_PARAMS: usize = 32_766;

/// Build the INSERTs for a homogeneous batch. With an upsert key,
/// conflicting rows overwrite every non-key column (last-write-wins, no
/// merge); without one, the insert is append-only. Column names come from
/// the batch's own records, first-seen order; rows missing a column bind
/// NULL for it.
///
/// A batch binding more parameters than SQLite allows in one statement is
/// split into several; callers run them inside a single transaction so
/// the batch still commits atomically.
pub fn upsert_batch_statements(
    table: &str,
    key: Option<&[String]>,
    rows: &[serde_json::Map<String, Value>],
) -> anyhow::Result<Vec<Statement>> {
    anyhow::ensure!(!rows.is_empty(), "refusing to build an empty batch write");

    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for name in row.keys() {
            if !columns.contains(&name.as_str()) {
                columns.push(name);
            }
        }
    }
    anyhow::ensure!(
        !columns.is_empty(),
        "batch for table {table:?} carries no columns"
    );

    if let Some(key) = key {
        for field in key {
            anyhow::ensure!(
                columns.contains(&field.as_str()),
                "batch for table {table:?} is missing upsert key column {field:?}"
            );
        }
    }

    let rows_per_statement = (MAX_BIND_PARAMS / columns.len()).max(1);
    rows.chunks(rows_per_statement)
        .map(|chunk| statement_for(table, key, &columns, chunk))
        .collect()
}

fn statement_for(
    table: &str,
    key: Option<&[String]>,
    columns: &[&str],
    rows: &[serde_json::Map<String, Value>],
) -> anyhow::Result<Statement> {
    let mut params = Vec::with_capacity(columns.len() * rows.len());
    let mut tuples = Vec::with_capacity(rows.len());
    for row in rows {
        let mut placeholders = Vec::with_capacity(columns.len());
        for column in columns {
            params.push(row.get(*column).cloned().unwrap_or(Value::Null));
            placeholders.push(format!("?{}", params.len()));
        }
        tuples.push(format!("({})", placeholders.join(", ")));
    }

    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(table),
        column_list,
        tuples.join(", "),
    );

    if let Some(key) = key {
        let key_list = key
            .iter()
            .map(|k| quote_ident(k))
            .collect::<Vec<_>>()
            .join(", ");
        let updates: Vec<String> = columns
            .iter()
            .filter(|c| !key.iter().any(|k| k == *c))
            .map(|c| format!("{0} = excluded.{0}", quote_ident(c)))
            .collect();

        if updates.is_empty() {
            sql.push_str(&format!(" ON CONFLICT ({key_list}) DO NOTHING"));
        } else {
            sql.push_str(&format!(
                " ON CONFLICT ({key_list}) DO UPDATE SET {}",
                updates.join(", ")
            ));
        }
    }

    Ok(Statement::new(sql, params))
}
