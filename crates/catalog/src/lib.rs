mod cursors;
mod introspect;
mod sqlite;
mod storage;
mod upsert;

pub use cursors::{CursorStore, CURSOR_TABLE};
pub use introspect::{
    introspect, orphans, ColumnDescriptor, ColumnType, IndexDescriptor, TableDescriptor,
};
pub use sqlite::SqliteStorage;
pub use storage::{quote_ident, SqlRow, Statement, Storage};
pub use upsert::upsert_batch_statements;
