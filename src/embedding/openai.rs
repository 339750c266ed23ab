//! OpenAI-compatible embeddings over `/v1/embeddings`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::EmbeddingProvider;
use crate::error::{Error, Result};

pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dims: usize,
}

fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn embeddings_endpoint(base_url: &str) -> String {
    if base_url.ends_with("/embeddings") {
        base_url.to_string()
    } else if base_url.ends_with("/v1") {
        format!("{base_url}/embeddings")
    } else {
        format!("{base_url}/v1/embeddings")
    }
}

impl OpenAiEmbeddingProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: normalize_base_url("https://api.openai.com"),
            model: "text-embedding-3-small".to_string(),
            dims: 1536,
        }
    }

    pub fn with_model(mut self, model: &str, dims: usize) -> Self {
        self.model = model.to_string();
        self.dims = dims;
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = normalize_base_url(url);
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
    encoding_format: &'static str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let req = EmbeddingRequest {
            model: &self.model,
            input: text,
            dimensions: self.dims,
            encoding_format: "float",
        };

        let response = self
            .client
            .post(embeddings_endpoint(&self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("embedding request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!("embedding API returned {status}: {body}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("malformed embedding response: {e}")))?;

        let Some(embedding) = parsed.data.into_iter().next().map(|d| d.embedding) else {
            return Err(Error::Embedding("empty embedding response".into()));
        };
        if embedding.len() != self.dims {
            return Err(Error::Embedding(format!(
                "model {} returned {} dimensions, expected {}",
                self.model,
                embedding.len(),
                self.dims
            )));
        }

        tracing::debug!(model = %self.model, chars = text.len(), "embedded text");
        Ok(Some(embedding))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}
