//! Embedded document store on SQLite.
//!
//! Documents live as JSON in `documents.body`; the mapping's vector field is
//! split off into an f32 blob so that sqlite-vec can score it. Each index gets
//! an FTS5 table over its text fields for BM25 keyword matching. All writes run
//! in a transaction and are visible as soon as they return.

mod compile;
pub mod schema;
mod segment;

use std::path::Path;
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use serde_json::{Map, Value};
use sqlite_vec::sqlite3_vec_init;

use super::mapping::{validate_index_name, IndexMapping};
use super::query::{Query, SearchRequest};
use super::{DocumentStore, RawHit};
use crate::error::{Error, Result};

static SQLITE_VEC_INIT: Once = Once::new();

/// Register the sqlite-vec extension globally. Safe to call multiple times.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Encode a vector as little-endian f32 bytes, the layout sqlite-vec reads.
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

pub fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Column names FTS5 reserves for itself.
const FTS_RESERVED: &[&str] = &["rank", "rowid"];

/// SQLite-backed [`DocumentStore`].
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the store at `path`, with sqlite-vec loaded and schema
    /// initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        load_sqlite_vec();

        let conn = Connection::open(path).map_err(|e| {
            Error::backend(format!("failed to open database at {}: {e}", path.display()))
        })?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        schema::init_schema(&conn)?;

        tracing::info!(path = %path.display(), "database initialized");
        Ok(Self::from_connection(conn))
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        load_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::init_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| Error::backend(format!("db lock poisoned: {e}")))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| Error::backend(format!("db task failed: {e}")))?
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn create_index(&self, index: &str, mapping: &IndexMapping) -> Result<()> {
        let index = index.to_string();
        let mapping = mapping.clone();
        self.with_conn(move |conn| create_index(conn, &index, &mapping))
            .await
    }

    async fn delete_index(&self, index: &str) -> Result<bool> {
        let index = index.to_string();
        self.with_conn(move |conn| delete_index(conn, &index)).await
    }

    async fn index_document(
        &self,
        index: &str,
        id: Option<&str>,
        document: &Value,
    ) -> Result<String> {
        let index = index.to_string();
        let id = id.map(str::to_string);
        let document = document.clone();
        self.with_conn(move |conn| index_document(conn, &index, id, document))
            .await
    }

    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>> {
        let index = index.to_string();
        let id = id.to_string();
        self.with_conn(move |conn| get_document(conn, &index, &id))
            .await
    }

    async fn search(&self, index: &str, request: &SearchRequest) -> Result<Vec<RawHit>> {
        let index = index.to_string();
        let request = request.clone();
        self.with_conn(move |conn| search(conn, &index, &request))
            .await
    }

    async fn count(&self, index: &str, query: &Query) -> Result<u64> {
        let index = index.to_string();
        let query = query.clone();
        self.with_conn(move |conn| count(conn, &index, &query)).await
    }

    async fn update_document(&self, index: &str, id: &str, partial: &Value) -> Result<bool> {
        let index = index.to_string();
        let id = id.to_string();
        let partial = partial.clone();
        self.with_conn(move |conn| update_document(conn, &index, &id, partial))
            .await
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<bool> {
        let index = index.to_string();
        let id = id.to_string();
        self.with_conn(move |conn| delete_document(conn, &index, &id))
            .await
    }

    async fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            let version: String = conn.query_row("SELECT vec_version()", [], |r| r.get(0))?;
            tracing::debug!(sqlite_vec = %version, "ping");
            Ok(())
        })
        .await
    }
}

// ── Synchronous operations ────────────────────────────────────────────────────

fn load_mapping(conn: &Connection, index: &str) -> Result<Option<IndexMapping>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT mapping FROM indices WHERE name = ?1",
            params![index],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|s| serde_json::from_str(&s).map_err(Error::from))
        .transpose()
}

fn require_mapping(conn: &Connection, index: &str) -> Result<IndexMapping> {
    load_mapping(conn, index)?.ok_or_else(|| Error::backend(format!("no such index: {index}")))
}

fn create_index(conn: &mut Connection, index: &str, mapping: &IndexMapping) -> Result<()> {
    validate_index_name(index)?;
    mapping.validate()?;

    if mapping.vector_fields().len() > 1 {
        return Err(Error::validation(
            "the embedded store supports at most one dense_vector field per index",
        ));
    }
    let text_fields = mapping.text_fields();
    if let Some(bad) = text_fields.iter().find(|f| FTS_RESERVED.contains(f)) {
        return Err(Error::validation(format!(
            "text field name {bad} is reserved by the full-text index"
        )));
    }

    let tx = conn.transaction()?;
    if load_mapping(&tx, index)?.is_some() {
        tracing::debug!(index = %index, "index already exists");
        return Ok(());
    }

    tx.execute(
        "INSERT INTO indices (name, mapping, created_at) VALUES (?1, ?2, ?3)",
        params![
            index,
            serde_json::to_string(mapping)?,
            chrono::Utc::now().to_rfc3339()
        ],
    )?;
    if !text_fields.is_empty() {
        tx.execute_batch(&schema::fts_table_sql(index, &text_fields))?;
    }
    tx.commit()?;

    tracing::info!(index = %index, fields = mapping.properties.len(), "index created");
    Ok(())
}

fn delete_index(conn: &mut Connection, index: &str) -> Result<bool> {
    validate_index_name(index)?;
    let tx = conn.transaction()?;
    if load_mapping(&tx, index)?.is_none() {
        return Ok(false);
    }
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {}",
        schema::fts_table(index)
    ))?;
    tx.execute("DELETE FROM documents WHERE index_name = ?1", params![index])?;
    tx.execute("DELETE FROM indices WHERE name = ?1", params![index])?;
    tx.commit()?;

    tracing::info!(index = %index, "index deleted");
    Ok(true)
}

/// Split the mapping's vector field off the document. The body never stores it.
fn split_vector(mapping: &IndexMapping, document: Value) -> Result<(Map<String, Value>, Option<Vec<u8>>)> {
    let Value::Object(mut body) = document else {
        return Err(Error::validation("document must be a JSON object"));
    };
    let vector = match mapping.vector_field() {
        Some((field, dims)) => match body.remove(field) {
            None | Some(Value::Null) => None,
            Some(value) => Some(vector_to_blob(&parse_vector(field, dims, &value)?)),
        },
        None => None,
    };
    Ok((body, vector))
}

fn parse_vector(field: &str, dims: usize, value: &Value) -> Result<Vec<f32>> {
    let items = value
        .as_array()
        .ok_or_else(|| Error::validation(format!("{field} must be an array of numbers")))?;
    let vector = items
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|x| x as f32)
                .ok_or_else(|| Error::validation(format!("{field} must be an array of numbers")))
        })
        .collect::<Result<Vec<f32>>>()?;
    if vector.len() != dims {
        return Err(Error::validation(format!(
            "{field} has {} dimensions, index expects {dims}",
            vector.len()
        )));
    }
    Ok(vector)
}

/// Text for one FTS column: strings as-is, string arrays space-joined, CJK segmented.
fn fts_text(body: &Map<String, Value>, field: &str) -> String {
    let text = match body.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" "),
        _ => return String::new(),
    };
    segment::segment(&text)
}

/// Replace the FTS row for `seq` with the body's current text fields.
fn sync_fts(
    tx: &Transaction,
    index: &str,
    mapping: &IndexMapping,
    seq: i64,
    body: &Map<String, Value>,
) -> Result<()> {
    let columns = mapping.text_fields();
    if columns.is_empty() {
        return Ok(());
    }
    let fts = schema::fts_table(index);
    tx.execute(&format!("DELETE FROM {fts} WHERE rowid = ?1"), params![seq])?;

    let placeholders: Vec<String> = (2..=columns.len() + 1).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {fts} (rowid, {}) VALUES (?1, {})",
        columns.join(", "),
        placeholders.join(", ")
    );
    let mut values: Vec<rusqlite::types::Value> = vec![rusqlite::types::Value::Integer(seq)];
    values.extend(
        columns
            .iter()
            .map(|c| rusqlite::types::Value::Text(fts_text(body, c))),
    );
    tx.execute(&sql, params_from_iter(values))?;
    Ok(())
}

fn index_document(
    conn: &mut Connection,
    index: &str,
    id: Option<String>,
    document: Value,
) -> Result<String> {
    let tx = conn.transaction()?;
    let mapping = require_mapping(&tx, index)?;
    let (body, vector) = split_vector(&mapping, document)?;
    let id = id.unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
    let body_json = serde_json::to_string(&body)?;

    let existing: Option<i64> = tx
        .query_row(
            "SELECT seq FROM documents WHERE index_name = ?1 AND id = ?2",
            params![index, id],
            |row| row.get(0),
        )
        .optional()?;

    let seq = match existing {
        Some(seq) => {
            tx.execute(
                "UPDATE documents SET body = ?1, embedding = ?2 WHERE seq = ?3",
                params![body_json, vector, seq],
            )?;
            seq
        }
        None => {
            tx.execute(
                "INSERT INTO documents (index_name, id, body, embedding) VALUES (?1, ?2, ?3, ?4)",
                params![index, id, body_json, vector],
            )?;
            tx.last_insert_rowid()
        }
    };

    sync_fts(&tx, index, &mapping, seq, &body)?;
    tx.commit()?;

    tracing::debug!(index = %index, id = %id, replaced = existing.is_some(), "document indexed");
    Ok(id)
}

/// Put the stored vector back into the body under the mapping's vector field.
fn attach_vector(mapping: &IndexMapping, body: &mut Map<String, Value>, blob: Option<Vec<u8>>) {
    if let (Some((field, _)), Some(blob)) = (mapping.vector_field(), blob) {
        let vector: Vec<Value> = blob_to_vector(&blob)
            .into_iter()
            .map(|x| Value::from(f64::from(x)))
            .collect();
        body.insert(field.to_string(), Value::Array(vector));
    }
}

fn parse_body(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(Error::backend("stored document body is not an object")),
    }
}

fn get_document(conn: &mut Connection, index: &str, id: &str) -> Result<Option<Value>> {
    let Some(mapping) = load_mapping(conn, index)? else {
        return Ok(None);
    };
    let row: Option<(String, Option<Vec<u8>>)> = conn
        .query_row(
            "SELECT body, embedding FROM documents WHERE index_name = ?1 AND id = ?2",
            params![index, id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((raw, blob)) = row else {
        return Ok(None);
    };
    let mut body = parse_body(&raw)?;
    attach_vector(&mapping, &mut body, blob);
    Ok(Some(Value::Object(body)))
}

fn search(conn: &mut Connection, index: &str, request: &SearchRequest) -> Result<Vec<RawHit>> {
    let mapping = require_mapping(conn, index)?;
    let compiled = compile::search_sql(index, &mapping, request)?;
    tracing::trace!(sql = %compiled.sql, "search");

    let mut stmt = conn.prepare(&compiled.sql)?;
    let rows = stmt
        .query_map(params_from_iter(compiled.params.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<Vec<u8>>>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let include_vector = mapping
        .vector_field()
        .map(|(field, _)| !request.source_excludes.iter().any(|e| e == field))
        .unwrap_or(false);
    let with_scores = request.sorts_by_score();

    rows.into_iter()
        .map(|(id, raw, blob, score)| -> Result<RawHit> {
            let mut body = parse_body(&raw)?;
            for excluded in &request.source_excludes {
                body.remove(excluded);
            }
            if include_vector {
                attach_vector(&mapping, &mut body, blob);
            }
            Ok(RawHit {
                id,
                score: with_scores.then_some(score),
                source: Value::Object(body),
            })
        })
        .collect()
}

fn count(conn: &mut Connection, index: &str, query: &Query) -> Result<u64> {
    let mapping = require_mapping(conn, index)?;
    let compiled = compile::count_sql(index, &mapping, query)?;
    let n: i64 = conn.query_row(
        &compiled.sql,
        params_from_iter(compiled.params.iter()),
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

/// Recursive merge: objects merge key by key, everything else is replaced.
fn merge_json(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(t), Value::Object(p)) => {
            for (key, value) in p {
                match t.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        t.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

fn update_document(conn: &mut Connection, index: &str, id: &str, partial: Value) -> Result<bool> {
    let Value::Object(mut partial) = partial else {
        return Err(Error::validation("partial document must be a JSON object"));
    };

    let tx = conn.transaction()?;
    let Some(mapping) = load_mapping(&tx, index)? else {
        return Ok(false);
    };
    let row: Option<(i64, String, Option<Vec<u8>>)> = tx
        .query_row(
            "SELECT seq, body, embedding FROM documents WHERE index_name = ?1 AND id = ?2",
            params![index, id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    let Some((seq, raw, mut blob)) = row else {
        return Ok(false);
    };

    if let Some((field, dims)) = mapping.vector_field() {
        match partial.remove(field) {
            None => {}
            Some(Value::Null) => blob = None,
            Some(value) => blob = Some(vector_to_blob(&parse_vector(field, dims, &value)?)),
        }
    }

    let mut body = Value::Object(parse_body(&raw)?);
    merge_json(&mut body, Value::Object(partial));
    let Value::Object(body) = body else {
        return Err(Error::backend("merged document is not an object"));
    };

    tx.execute(
        "UPDATE documents SET body = ?1, embedding = ?2 WHERE seq = ?3",
        params![serde_json::to_string(&body)?, blob, seq],
    )?;
    sync_fts(&tx, index, &mapping, seq, &body)?;
    tx.commit()?;

    tracing::debug!(index = %index, id = %id, "document updated");
    Ok(true)
}

fn delete_document(conn: &mut Connection, index: &str, id: &str) -> Result<bool> {
    let tx = conn.transaction()?;
    let Some(mapping) = load_mapping(&tx, index)? else {
        return Ok(false);
    };
    let seq: Option<i64> = tx
        .query_row(
            "SELECT seq FROM documents WHERE index_name = ?1 AND id = ?2",
            params![index, id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(seq) = seq else {
        return Ok(false);
    };

    if !mapping.text_fields().is_empty() {
        tx.execute(
            &format!("DELETE FROM {} WHERE rowid = ?1", schema::fts_table(index)),
            params![seq],
        )?;
    }
    tx.execute("DELETE FROM documents WHERE seq = ?1", params![seq])?;
    tx.commit()?;

    tracing::debug!(index = %index, id = %id, "document deleted");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mapping::FieldMapping;
    use crate::store::query::{BoolQuery, KnnQuery, RangeBounds, SortField};
    use serde_json::json;

    fn mapping() -> IndexMapping {
        IndexMapping::new()
            .field("title", FieldMapping::Text)
            .field("content", FieldMapping::Text)
            .field("tags", FieldMapping::Keyword)
            .field("user_id", FieldMapping::Keyword)
            .field("created_at", FieldMapping::Date)
            .field("processed", FieldMapping::Boolean)
            .field("embedding", FieldMapping::dense_vector(3))
    }

    async fn store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_index("docs", &mapping()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn create_index_is_idempotent() {
        let store = store().await;
        store.create_index("docs", &mapping()).await.unwrap();
        assert!(store.delete_index("docs").await.unwrap());
        assert!(!store.delete_index("docs").await.unwrap());
    }

    #[tokio::test]
    async fn rejects_two_vector_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let m = mapping().field("other", FieldMapping::dense_vector(3));
        assert!(store.create_index("docs", &m).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn index_get_roundtrip_keeps_vector_out_of_body() {
        let store = store().await;
        let doc = json!({"content": "hello", "user_id": "u1", "embedding": [1.0, 0.0, 0.0]});
        let id = store.index_document("docs", None, &doc).await.unwrap();

        let fetched = store.get_document("docs", &id).await.unwrap().unwrap();
        assert_eq!(fetched, doc);

        let conn = store.conn.lock().unwrap();
        let body: String = conn
            .query_row("SELECT body FROM documents WHERE id = ?1", [&id], |r| r.get(0))
            .unwrap();
        assert!(!body.contains("embedding"));
    }

    #[tokio::test]
    async fn explicit_id_overwrites() {
        let store = store().await;
        store
            .index_document("docs", Some("a"), &json!({"content": "first"}))
            .await
            .unwrap();
        store
            .index_document("docs", Some("a"), &json!({"content": "second"}))
            .await
            .unwrap();

        assert_eq!(store.count("docs", &Query::MatchAll).await.unwrap(), 1);
        let doc = store.get_document("docs", "a").await.unwrap().unwrap();
        assert_eq!(doc["content"], "second");

        let hits = store
            .search("docs", &SearchRequest::query(Query::multi_match("first", &["content"])))
            .await
            .unwrap();
        assert!(hits.is_empty(), "stale FTS row must be replaced");
    }

    #[tokio::test]
    async fn wrong_vector_dimensions_rejected() {
        let store = store().await;
        let err = store
            .index_document("docs", None, &json!({"content": "x", "embedding": [1.0]}))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn missing_documents_and_indices() {
        let store = store().await;
        assert!(store.get_document("docs", "nope").await.unwrap().is_none());
        assert!(store.get_document("other", "nope").await.unwrap().is_none());
        assert!(!store.update_document("docs", "nope", &json!({"a": 1})).await.unwrap());
        assert!(!store.delete_document("docs", "nope").await.unwrap());
        assert!(store.count("other", &Query::MatchAll).await.is_err());
        assert!(store
            .index_document("other", None, &json!({}))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn update_merges_and_refreshes_fts() {
        let store = store().await;
        let id = store
            .index_document(
                "docs",
                None,
                &json!({"content": "apples", "tags": ["a"], "user_id": "u1", "embedding": [1.0, 0.0, 0.0]}),
            )
            .await
            .unwrap();

        assert!(store
            .update_document("docs", &id, &json!({"content": "oranges", "processed": true}))
            .await
            .unwrap());

        let doc = store.get_document("docs", &id).await.unwrap().unwrap();
        assert_eq!(doc["content"], "oranges");
        assert_eq!(doc["user_id"], "u1");
        assert_eq!(doc["processed"], true);
        assert_eq!(doc["embedding"], json!([1.0, 0.0, 0.0]));

        let old = store
            .count("docs", &Query::multi_match("apples", &["content"]))
            .await
            .unwrap();
        let new = store
            .count("docs", &Query::multi_match("oranges", &["content"]))
            .await
            .unwrap();
        assert_eq!((old, new), (0, 1));

        assert!(store
            .update_document("docs", &id, &json!({"embedding": null}))
            .await
            .unwrap());
        let doc = store.get_document("docs", &id).await.unwrap().unwrap();
        assert!(doc.get("embedding").is_none());
    }

    #[tokio::test]
    async fn delete_then_get_is_none() {
        let store = store().await;
        let id = store
            .index_document("docs", None, &json!({"content": "bye"}))
            .await
            .unwrap();
        assert!(store.delete_document("docs", &id).await.unwrap());
        assert!(store.get_document("docs", &id).await.unwrap().is_none());
        assert_eq!(
            store
                .count("docs", &Query::multi_match("bye", &["content"]))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn term_matches_array_elements_and_booleans() {
        let store = store().await;
        store
            .index_document("docs", Some("1"), &json!({"content": "x", "tags": ["red", "blue"], "processed": false}))
            .await
            .unwrap();
        store
            .index_document("docs", Some("2"), &json!({"content": "y", "tags": "green", "processed": true}))
            .await
            .unwrap();
        store
            .index_document("docs", Some("3"), &json!({"content": "z"}))
            .await
            .unwrap();

        assert_eq!(store.count("docs", &Query::term("tags", "blue")).await.unwrap(), 1);
        assert_eq!(store.count("docs", &Query::term("tags", "green")).await.unwrap(), 1);
        assert_eq!(
            store
                .count("docs", &Query::terms("tags", ["red", "green"]))
                .await
                .unwrap(),
            2
        );
        assert_eq!(store.count("docs", &Query::term("processed", false)).await.unwrap(), 1);

        let not_processed = BoolQuery::new()
            .must_not(Query::term("processed", true))
            .build();
        assert_eq!(store.count("docs", &not_processed).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn date_range_respects_offsets() {
        let store = store().await;
        // 2024-01-01T23:30 at +08:00 is 15:30 UTC on the same day
        store
            .index_document("docs", Some("a"), &json!({"content": "a", "created_at": "2024-01-01T23:30:00+08:00"}))
            .await
            .unwrap();
        // 2024-01-02T01:00 at -05:00 is 06:00 UTC on the 2nd
        store
            .index_document("docs", Some("b"), &json!({"content": "b", "created_at": "2024-01-02T01:00:00-05:00"}))
            .await
            .unwrap();

        let day = Query::range(
            "created_at",
            RangeBounds {
                gte: Some(json!("2024-01-01T00:00:00+00:00")),
                lte: Some(json!("2024-01-01T23:59:59.999+00:00")),
                ..Default::default()
            },
        );
        let hits = store.search("docs", &SearchRequest::query(day)).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test]
    async fn keyword_search_uses_title_boost() {
        let store = store().await;
        store
            .index_document("docs", Some("body"), &json!({"title": "notes", "content": "rust is fast"}))
            .await
            .unwrap();
        store
            .index_document("docs", Some("title"), &json!({"title": "rust", "content": "a language"}))
            .await
            .unwrap();
        store
            .index_document("docs", Some("none"), &json!({"title": "python", "content": "snakes"}))
            .await
            .unwrap();

        let hits = store
            .search(
                "docs",
                &SearchRequest::query(Query::multi_match("rust", &["title^2", "content"])),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.score.unwrap() > 0.0));
        assert_eq!(hits[0].id, "title");
    }

    #[tokio::test]
    async fn keyword_search_matches_words_inside_cjk_sentences() {
        let store = store().await;
        for (id, content) in [
            ("coffee", "我喜欢喝咖啡"),
            ("tea", "我喜欢喝茶"),
            ("rain", "今天下雨了"),
        ] {
            store
                .index_document("docs", Some(id), &json!({"content": content}))
                .await
                .unwrap();
        }

        let ids = |hits: Vec<RawHit>| {
            let mut ids: Vec<String> = hits.into_iter().map(|h| h.id).collect();
            ids.sort();
            ids
        };
        let search = |q: &str| SearchRequest::query(Query::multi_match(q, &["content"]));

        assert_eq!(ids(store.search("docs", &search("咖啡")).await.unwrap()), vec!["coffee"]);
        assert_eq!(ids(store.search("docs", &search("茶")).await.unwrap()), vec!["tea"]);
        assert_eq!(ids(store.search("docs", &search("喜欢")).await.unwrap()), vec!["coffee", "tea"]);
        // characters present but not adjacent
        assert!(store.search("docs", &search("咖茶")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn knn_orders_by_similarity_and_prefilters() {
        let store = store().await;
        for (id, user, v) in [
            ("near", "u1", [1.0, 0.0, 0.0]),
            ("mid", "u1", [0.7, 0.7, 0.0]),
            ("far", "u1", [0.0, 0.0, 1.0]),
            ("other_user", "u2", [1.0, 0.0, 0.0]),
        ] {
            store
                .index_document("docs", Some(id), &json!({"content": id, "user_id": user, "embedding": v}))
                .await
                .unwrap();
        }
        store
            .index_document("docs", Some("no_vector"), &json!({"content": "x", "user_id": "u1"}))
            .await
            .unwrap();

        let req = SearchRequest::knn(KnnQuery {
            field: "embedding".into(),
            query_vector: vec![1.0, 0.0, 0.0],
            k: 2,
            num_candidates: 20,
            filter: Some(Query::term("user_id", "u1")),
        })
        .exclude(["embedding".to_string()]);

        let hits = store.search("docs", &req).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert!((hits[0].score.unwrap() - 1.0).abs() < 1e-6);
        assert!(hits[0].score >= hits[1].score);
        assert!(hits.iter().all(|h| h.source.get("embedding").is_none()));
    }

    #[tokio::test]
    async fn sort_and_paginate() {
        let store = store().await;
        for (id, ts) in [
            ("c", "2024-03-01T00:00:00+00:00"),
            ("a", "2024-01-01T00:00:00+00:00"),
            ("b", "2024-02-01T00:00:00+00:00"),
        ] {
            store
                .index_document("docs", Some(id), &json!({"content": id, "created_at": ts}))
                .await
                .unwrap();
        }

        let page = |from| {
            SearchRequest::query(Query::MatchAll)
                .sort(SortField::asc("created_at"))
                .size(2)
                .from(from)
        };
        let first = store.search("docs", &page(0)).await.unwrap();
        let second = store.search("docs", &page(2)).await.unwrap();
        let ids: Vec<&str> = first.iter().chain(&second).map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(first[0].score.is_none());
    }

    #[test]
    fn blob_roundtrip() {
        let v = vec![0.5f32, -1.25, 3.0];
        assert_eq!(blob_to_vector(&vector_to_blob(&v)), v);
    }

    #[test]
    fn merge_is_recursive_for_objects() {
        let mut target = json!({"a": {"x": 1, "y": 2}, "b": [1, 2]});
        merge_json(&mut target, json!({"a": {"y": 3}, "b": [9]}));
        assert_eq!(target, json!({"a": {"x": 1, "y": 3}, "b": [9]}));
    }
}
