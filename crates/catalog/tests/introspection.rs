use catalog::{
    introspect, orphans, upsert_batch_statements, ColumnType, CursorStore, SqliteStorage, Storage,
};
use serde_json::json;
use std::sync::Arc;

async fn storage_with_schema() -> Arc<dyn Storage> {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
        .execute(
            "CREATE TABLE hackernews_items (\
             id INTEGER PRIMARY KEY, \
             title TEXT NOT NULL, \
             score INTEGER DEFAULT 0, \
             posted_at TIMESTAMP, \
             payload JSON)",
            vec![],
        )
        .await
        .unwrap();
    storage
        .execute(
            "CREATE TABLE github_issues (\
             repo TEXT NOT NULL, \
             number INTEGER NOT NULL, \
             state TEXT, \
             PRIMARY KEY (repo, number))",
            vec![],
        )
        .await
        .unwrap();
    storage
        .execute(
            "CREATE UNIQUE INDEX idx_issues_repo_number ON github_issues (repo, number)",
            vec![],
        )
        .await
        .unwrap();
    Arc::new(storage)
}

#[tokio::test]
async fn introspection_describes_tables_and_columns() {
    let storage = storage_with_schema().await;
    let tables = introspect(storage.as_ref()).await.unwrap();

    let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["github_issues", "hackernews_items"]);

    let issues = &tables[0];
    assert_eq!(issues.columns.len(), 3);
    assert!(issues.columns[0].is_primary_key, "repo is part of the key");
    assert!(issues.columns[1].is_primary_key, "number is part of the key");
    assert!(!issues.columns[2].is_primary_key);

    // Both the declared unique index and the composite-key autoindex.
    assert!(issues
        .indexes
        .iter()
        .any(|i| i.name == "idx_issues_repo_number"
            && i.unique
            && i.columns == vec!["repo".to_string(), "number".to_string()]));
    assert!(issues.indexes.iter().any(|i| i.name.starts_with("sqlite_autoindex_")));

    // A rowid-aliased INTEGER PRIMARY KEY has no backing index.
    let items = &tables[1];
    assert!(items.indexes.is_empty());
}

#[tokio::test]
async fn introspection_reflects_schema_drift() {
    let storage = storage_with_schema().await;
    let before = introspect(storage.as_ref()).await.unwrap();
    assert_eq!(before.len(), 2);

    storage
        .execute("CREATE TABLE stray (id INTEGER PRIMARY KEY)", vec![])
        .await
        .unwrap();

    // No caching: the next call observes the new table.
    let after = introspect(storage.as_ref()).await.unwrap();
    assert_eq!(after.len(), 3);
    assert!(after.iter().any(|t| t.name == "stray"));
}

#[tokio::test]
async fn cursor_metadata_table_is_not_introspected() {
    let storage = storage_with_schema().await;
    let cursors = CursorStore::new(storage.clone());
    cursors.init().await.unwrap();
    cursors.set("hackernews", "page-3").await.unwrap();

    let tables = introspect(storage.as_ref()).await.unwrap();
    assert!(tables.iter().all(|t| t.name != "sync_cursors"));

    // Orphan detection sees connector tables only.
    let orphaned = orphans(&tables, ["hackernews_items"]);
    assert_eq!(orphaned.len(), 1);
    assert_eq!(orphaned[0].name, "github_issues");
}

#[tokio::test]
async fn column_types_are_normalized() {
    let storage = storage_with_schema().await;
    let tables = introspect(storage.as_ref()).await.unwrap();
    let items = tables.iter().find(|t| t.name == "hackernews_items").unwrap();

    let types: Vec<(_, _)> = items
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c.column_type))
        .collect();
    assert_eq!(
        types,
        vec![
            ("id", ColumnType::Integer),
            ("title", ColumnType::Text),
            ("score", ColumnType::Integer),
            ("posted_at", ColumnType::Timestamp),
            ("payload", ColumnType::Json),
        ]
    );

    let id = &items.columns[0];
    assert!(id.is_primary_key);
    let title = &items.columns[1];
    assert!(!title.nullable);
    let score = &items.columns[2];
    assert_eq!(score.default_value.as_deref(), Some("0"));
}

#[tokio::test]
async fn cursor_store_round_trips_and_overwrites() {
    let storage = storage_with_schema().await;
    let cursors = CursorStore::new(storage.clone());
    cursors.init().await.unwrap();
    // init is idempotent.
    cursors.init().await.unwrap();

    assert_eq!(cursors.get("hackernews").await.unwrap(), None);

    cursors.set("hackernews", "page-1").await.unwrap();
    cursors.set("hackernews", "page-2").await.unwrap();
    assert_eq!(
        cursors.get("hackernews").await.unwrap(),
        Some("page-2".to_string())
    );

    // Cursors are scoped per source id.
    assert_eq!(cursors.get("github").await.unwrap(), None);
}

#[tokio::test]
async fn repeated_upserts_do_not_duplicate_rows() {
    let storage = storage_with_schema().await;
    let rows: Vec<serde_json::Map<String, serde_json::Value>> = (0..10)
        .map(|i| {
            let mut row = serde_json::Map::new();
            row.insert("id".to_string(), json!(i));
            row.insert("title".to_string(), json!(format!("story {i}")));
            row
        })
        .collect();

    let key = vec!["id".to_string()];
    for pass in 0..3 {
        let statements = upsert_batch_statements("hackernews_items", Some(&key), &rows).unwrap();
        storage.transaction(statements).await.unwrap();

        let count = storage
            .query("SELECT COUNT(*) AS n FROM hackernews_items", vec![])
            .await
            .unwrap();
        assert_eq!(count[0]["n"], json!(10), "pass {pass} duplicated rows");
    }
}

#[tokio::test]
async fn upsert_overwrites_non_key_columns() {
    let storage = storage_with_schema().await;
    let key = vec!["id".to_string()];

    let mut row = serde_json::Map::new();
    row.insert("id".to_string(), json!(1));
    row.insert("title".to_string(), json!("before"));
    row.insert("score".to_string(), json!(10));
    let statements = upsert_batch_statements("hackernews_items", Some(&key), &[row]).unwrap();
    storage.transaction(statements).await.unwrap();

    let mut row = serde_json::Map::new();
    row.insert("id".to_string(), json!(1));
    row.insert("title".to_string(), json!("after"));
    row.insert("score".to_string(), json!(25));
    let statements = upsert_batch_statements("hackernews_items", Some(&key), &[row]).unwrap();
    storage.transaction(statements).await.unwrap();

    let rows = storage
        .query("SELECT title, score FROM hackernews_items WHERE id = 1", vec![])
        .await
        .unwrap();
    assert_eq!(rows[0]["title"], json!("after"));
    assert_eq!(rows[0]["score"], json!(25));
}

#[tokio::test]
async fn batches_beyond_the_bind_limit_still_commit() {
    let storage = storage_with_schema().await;
    let key = vec!["id".to_string()];

    // Two columns per row; 17_000 rows bind 34_000 parameters, beyond
    // what SQLite accepts in one statement.
    let rows: Vec<serde_json::Map<String, serde_json::Value>> = (0..17_000)
        .map(|i| {
            let mut row = serde_json::Map::new();
            row.insert("id".to_string(), json!(i));
            row.insert("title".to_string(), json!(format!("story {i}")));
            row
        })
        .collect();

    let statements = upsert_batch_statements("hackernews_items", Some(&key), &rows).unwrap();
    assert!(statements.len() > 1, "expected the batch to split");
    storage.transaction(statements).await.unwrap();

    let count = storage
        .query("SELECT COUNT(*) AS n FROM hackernews_items", vec![])
        .await
        .unwrap();
    assert_eq!(count[0]["n"], json!(17_000));
}
