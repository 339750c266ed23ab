//! Search-engine backend speaking the Elasticsearch REST API over reqwest.
//!
//! Every write passes `refresh=true` so the document is searchable when the
//! call returns. A 404 from a document endpoint is "not found", not an error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use super::mapping::{validate_index_name, IndexMapping};
use super::query::{Query, SearchRequest};
use super::{DocumentStore, RawHit};
use crate::config::ElasticsearchConfig;
use crate::error::{Error, Result};

pub struct ElasticsearchStore {
    client: Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
struct IndexResponse {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Deserialize)]
struct GetResponse {
    #[serde(rename = "_source")]
    source: Option<Value>,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score")]
    score: Option<f64>,
    #[serde(rename = "_source", default)]
    source: Value,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

impl ElasticsearchStore {
    /// Build a client for the first configured host.
    pub fn new(config: &ElasticsearchConfig) -> Result<Self> {
        let host = config
            .hosts
            .first()
            .ok_or_else(|| Error::Config("store.elasticsearch.hosts is empty".into()))?;
        if config.hosts.len() > 1 {
            tracing::warn!(
                hosts = config.hosts.len(),
                using = %host,
                "multiple search hosts configured, only the first is used"
            );
        }
        let base_url = Url::parse(host)
            .map_err(|e| Error::Config(format!("invalid search host {host:?}: {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, segments: &[&str], refresh: bool) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("search host {} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        if refresh {
            url.query_pairs_mut().append_pair("refresh", "true");
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        builder
            .send()
            .await
            .map_err(|e| Error::backend(format!("search engine request failed: {e}")))
    }
}

/// Turn a non-success response into a backend error carrying the engine's message.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(Error::backend(format!("{url} returned {status}: {body}")))
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    async fn create_index(&self, index: &str, mapping: &IndexMapping) -> Result<()> {
        validate_index_name(index)?;
        mapping.validate()?;

        let url = self.url(&[index], false)?;
        let head = self.send(self.request(Method::HEAD, url.clone())).await?;
        if head.status().is_success() {
            tracing::debug!(index = %index, "index already exists");
            return Ok(());
        }

        let body = json!({ "mappings": mapping });
        let response = self.send(self.request(Method::PUT, url).json(&body)).await?;
        if response.status() == StatusCode::BAD_REQUEST {
            // lost a creation race with another process
            let text = response.text().await.unwrap_or_default();
            if text.contains("resource_already_exists_exception") {
                return Ok(());
            }
            return Err(Error::backend(format!("create index {index}: {text}")));
        }
        check(response).await?;
        tracing::info!(index = %index, "index created");
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<bool> {
        let url = self.url(&[index], false)?;
        let response = self.send(self.request(Method::DELETE, url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(response).await?;
        tracing::info!(index = %index, "index deleted");
        Ok(true)
    }

    async fn index_document(
        &self,
        index: &str,
        id: Option<&str>,
        document: &Value,
    ) -> Result<String> {
        let builder = match id {
            Some(id) => self.request(Method::PUT, self.url(&[index, "_doc", id], true)?),
            None => self.request(Method::POST, self.url(&[index, "_doc"], true)?),
        };
        let response = check(self.send(builder.json(document)).await?).await?;
        let indexed: IndexResponse = response.json().await?;
        tracing::debug!(index = %index, id = %indexed.id, "document indexed");
        Ok(indexed.id)
    }

    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>> {
        let url = self.url(&[index, "_doc", id], false)?;
        let response = self.send(self.request(Method::GET, url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let found: GetResponse = check(response).await?.json().await?;
        Ok(found.source)
    }

    async fn search(&self, index: &str, request: &SearchRequest) -> Result<Vec<RawHit>> {
        let url = self.url(&[index, "_search"], false)?;
        let body = request.to_json();
        tracing::trace!(index = %index, body = %body, "search");

        let response = check(self.send(self.request(Method::POST, url).json(&body)).await?).await?;
        let parsed: SearchResponse = response.json().await?;
        Ok(parsed
            .hits
            .hits
            .into_iter()
            .map(|h| RawHit {
                id: h.id,
                score: h.score,
                source: h.source,
            })
            .collect())
    }

    async fn count(&self, index: &str, query: &Query) -> Result<u64> {
        let url = self.url(&[index, "_count"], false)?;
        let body = json!({ "query": query.to_json() });
        let response = check(self.send(self.request(Method::POST, url).json(&body)).await?).await?;
        let parsed: CountResponse = response.json().await?;
        Ok(parsed.count)
    }

    async fn update_document(&self, index: &str, id: &str, partial: &Value) -> Result<bool> {
        let url = self.url(&[index, "_update", id], true)?;
        let body = json!({ "doc": partial });
        let response = self.send(self.request(Method::POST, url).json(&body)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(response).await?;
        Ok(true)
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<bool> {
        let url = self.url(&[index, "_doc", id], true)?;
        let response = self.send(self.request(Method::DELETE, url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(response).await?;
        Ok(true)
    }

    async fn ping(&self) -> Result<()> {
        let url = self.url(&[], false)?;
        check(self.send(self.request(Method::GET, url)).await?).await?;
        Ok(())
    }
}
