//! Typed CRUD and search over one index.
//!
//! [`Repository`] owns the failure policy: reads that fail become "not found",
//! updates and deletes that fail become `false`, while index creation, search
//! and count errors propagate.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::mapping::IndexMapping;
use super::query::{Query, SearchRequest};
use super::StoreClient;
use crate::error::Result;

/// A typed search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit<T> {
    pub id: String,
    pub score: Option<f64>,
    pub source: T,
}

/// Repository for documents of type `T` stored in one index.
pub struct Repository<T> {
    client: StoreClient,
    index: String,
    mapping: IndexMapping,
    _doc: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            index: self.index.clone(),
            mapping: self.mapping.clone(),
            _doc: PhantomData,
        }
    }
}

impl<T> Repository<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(client: StoreClient, index: impl Into<String>, mapping: IndexMapping) -> Self {
        Self {
            client,
            index: index.into(),
            mapping,
            _doc: PhantomData,
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn mapping(&self) -> &IndexMapping {
        &self.mapping
    }

    pub fn client(&self) -> &StoreClient {
        &self.client
    }

    /// Create the index with this repository's mapping. No-op if it exists.
    pub async fn create_index(&self) -> Result<()> {
        self.client.create_index(&self.index, &self.mapping).await
    }

    pub async fn delete_index(&self) -> Result<bool> {
        self.client.delete_index(&self.index).await
    }

    /// Write `doc` and return its id. The document is readable on return.
    pub async fn index_document(&self, doc: &T, id: Option<&str>) -> Result<String> {
        let body = serde_json::to_value(doc)?;
        self.client.index_document(&self.index, id, &body).await
    }

    /// Fetch by id. Backend failures and undecodable documents are logged and
    /// reported as missing.
    pub async fn get_document(&self, id: &str) -> Option<T> {
        let raw = match self.client.get_document(&self.index, id).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(index = %self.index, id = %id, error = %e, "get failed");
                return None;
            }
        };
        match with_id(raw, id) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::warn!(index = %self.index, id = %id, error = %e, "stored document does not decode");
                None
            }
        }
    }

    /// Run `request` with vector fields stripped from every hit.
    pub async fn search(&self, request: SearchRequest) -> Result<Vec<Hit<T>>> {
        self.search_with_vectors(request, false).await
    }

    /// Run `request`; vector fields are kept in the hits only when `include_vectors`.
    pub async fn search_with_vectors(
        &self,
        request: SearchRequest,
        include_vectors: bool,
    ) -> Result<Vec<Hit<T>>> {
        let request = if include_vectors {
            request
        } else {
            let excludes = self
                .mapping
                .vector_fields()
                .into_iter()
                .map(|(name, _)| name.to_string())
                .filter(|name| !request.source_excludes.contains(name))
                .collect::<Vec<_>>();
            request.exclude(excludes)
        };

        let hits = self.client.search(&self.index, &request).await?;
        tracing::debug!(index = %self.index, hits = hits.len(), "search");

        hits.into_iter()
            .map(|hit| -> Result<Hit<T>> {
                Ok(Hit {
                    source: with_id(hit.source, &hit.id)?,
                    id: hit.id,
                    score: hit.score,
                })
            })
            .collect()
    }

    pub async fn count(&self, query: &Query) -> Result<u64> {
        self.client.count(&self.index, query).await
    }

    /// Merge `partial` into the stored document. `false` on a missing id or
    /// any backend failure.
    pub async fn update_document(&self, id: &str, partial: &Value) -> bool {
        match self.client.update_document(&self.index, id, partial).await {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(index = %self.index, id = %id, error = %e, "update failed");
                false
            }
        }
    }

    /// `false` on a missing id or any backend failure.
    pub async fn delete_document(&self, id: &str) -> bool {
        match self.client.delete_document(&self.index, id).await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::warn!(index = %self.index, id = %id, error = %e, "delete failed");
                false
            }
        }
    }
}

/// Decode a hit's source with `id` injected when the type carries one.
fn with_id<T: DeserializeOwned>(mut source: Value, id: &str) -> Result<T> {
    if let Value::Object(map) = &mut source {
        map.entry("id").or_insert_with(|| Value::String(id.to_string()));
    }
    Ok(serde_json::from_value(source)?)
}
