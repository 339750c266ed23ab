//! Document store backends.
//!
//! [`DocumentStore`] is the index-level contract every backend implements:
//! JSON documents in, JSON documents out, queries expressed with the typed DSL
//! from [`query`]. Two implementations ship:
//!
//! - [`sqlite::SqliteStore`]: embedded SQLite with FTS5 and sqlite-vec
//! - [`elastic::ElasticsearchStore`]: JSON over HTTP to a search engine
//!
//! [`StoreClient`] is the handle callers own. There is no process-wide client:
//! whoever needs a backend connects one from config, shares it by cloning, and
//! drops it when the unit of work is over.

pub mod elastic;
pub mod mapping;
pub mod query;
pub mod repository;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::Result;
use mapping::IndexMapping;
use query::{Query, SearchRequest};

/// One search hit as returned by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub id: String,
    /// Relevance score; `None` when the request sorted by a field.
    pub score: Option<f64>,
    pub source: Value,
}

/// Index-level operations against a document/vector backend.
///
/// Writes are visible to the next read as soon as they return. Backends report
/// failures as errors; the "swallow into not-found / false" policy lives in
/// [`repository::Repository`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create `index` with `mapping` unless it already exists.
    async fn create_index(&self, index: &str, mapping: &IndexMapping) -> Result<()>;

    /// Drop `index` and every document in it. Returns `false` if it did not exist.
    async fn delete_index(&self, index: &str) -> Result<bool>;

    /// Write `document`, replacing any document with the same id, and return the id.
    /// A fresh id is assigned when `id` is `None`.
    async fn index_document(&self, index: &str, id: Option<&str>, document: &Value)
        -> Result<String>;

    /// Full source of a document, vectors included.
    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>>;

    async fn search(&self, index: &str, request: &SearchRequest) -> Result<Vec<RawHit>>;

    async fn count(&self, index: &str, query: &Query) -> Result<u64>;

    /// Merge `partial` into the stored document. Returns `false` if the id is unknown.
    async fn update_document(&self, index: &str, id: &str, partial: &Value) -> Result<bool>;

    /// Returns `false` if the id is unknown.
    async fn delete_document(&self, index: &str, id: &str) -> Result<bool>;

    /// Cheap liveness check.
    async fn ping(&self) -> Result<()>;
}

/// Shared handle to a connected backend.
#[derive(Clone)]
pub struct StoreClient {
    inner: Arc<dyn DocumentStore>,
}

impl StoreClient {
    pub fn new(store: impl DocumentStore + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Build a backend from configuration.
    ///
    /// Fails with a configuration error when the HTTP backend has no host.
    pub fn connect(config: &StoreConfig) -> Result<Self> {
        match config.backend {
            StoreBackend::Sqlite => {
                let path = crate::config::expand_tilde(&config.sqlite.db_path);
                let store = sqlite::SqliteStore::open(&path)?;
                tracing::info!(path = %path.display(), "embedded document store ready");
                Ok(Self::new(store))
            }
            StoreBackend::Elasticsearch => {
                let store = elastic::ElasticsearchStore::new(&config.elasticsearch)?;
                tracing::info!(url = %store.base_url(), "search engine client ready");
                Ok(Self::new(store))
            }
        }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.inner.as_ref()
    }
}

impl std::ops::Deref for StoreClient {
    type Target = dyn DocumentStore;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}
