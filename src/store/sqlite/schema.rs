//! SQL DDL for the embedded document store.
//!
//! Defines `indices` (name + JSON mapping), `documents` (JSON body plus an
//! optional f32 vector blob), and `schema_meta`. Each index additionally gets
//! an FTS5 table over its text fields, created when the index is created. All
//! DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// Core tables shared by every index.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS indices (
    name TEXT PRIMARY KEY,
    mapping TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    index_name TEXT NOT NULL REFERENCES indices(name) ON DELETE CASCADE,
    id TEXT NOT NULL,
    body TEXT NOT NULL,
    embedding BLOB,
    UNIQUE(index_name, id)
);

CREATE INDEX IF NOT EXISTS idx_documents_index ON documents(index_name);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

pub const SCHEMA_VERSION: u32 = 1;

/// Initialize the core tables. Idempotent.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Name of the FTS5 table backing `index`. Index names are validated before
/// they get here, so the result is a safe identifier.
pub fn fts_table(index: &str) -> String {
    format!("fts_{index}")
}

/// DDL for an index's FTS5 table. Column order follows `text_fields`.
pub fn fts_table_sql(index: &str, text_fields: &[&str]) -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5({})",
        fts_table(index),
        text_fields.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        crate::store::sqlite::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"indices".to_string()));
        assert!(tables.contains(&"documents".to_string()));
        assert!(tables.contains(&"schema_meta".to_string()));

        let version: String = conn
            .query_row("SELECT vec_version()", [], |r| r.get(0))
            .unwrap();
        assert!(!version.is_empty());
    }

    #[test]
    fn schema_is_idempotent() {
        crate::store::sqlite::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let version: String = conn
            .query_row(
                "SELECT value FROM schema_meta WHERE key = 'schema_version'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(version, "1");
    }

    #[test]
    fn fts_ddl_lists_columns() {
        assert_eq!(
            fts_table_sql("memories", &["content", "summary", "title"]),
            "CREATE VIRTUAL TABLE IF NOT EXISTS fts_memories USING fts5(content, summary, title)"
        );
    }
}
