//! Text-to-vector embedding.
//!
//! Provides the [`EmbeddingProvider`] trait and two implementations: an
//! OpenAI-compatible HTTP client and an offline feature-hashing embedder. The
//! provider is created via [`create_provider`] from configuration.

pub mod hashed;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Trait for embedding text into vectors.
///
/// Blank input yields `Ok(None)`. Any vector returned has exactly
/// [`dimensions`](EmbeddingProvider::dimensions) components.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>>;

    fn model_name(&self) -> &str;

    fn dimensions(&self) -> usize;
}

/// Embed `text`, treating "no vector" as an error. For paths that cannot
/// proceed without one, such as similarity search.
pub async fn embed_required(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    provider
        .embed(text)
        .await?
        .ok_or_else(|| Error::Embedding(format!("no embedding produced for {:?}", preview(text))))
}

fn preview(text: &str) -> String {
    let mut p: String = text.chars().take(40).collect();
    if p.len() < text.len() {
        p.push('…');
    }
    p
}

/// Create an embedding provider from config.
///
/// Supported providers: `openai` (needs an API key) and `hash` (offline).
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "openai" => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                Error::Config(
                    "embedding provider openai needs an API key (XMEMORY_EMBEDDING_API_KEY or OPENAI_API_KEY)"
                        .into(),
                )
            })?;
            let provider = openai::OpenAiEmbeddingProvider::new(api_key)
                .with_base_url(&config.api_base)
                .with_model(&config.model, config.dimension);
            tracing::info!(model = %config.model, dims = config.dimension, "openai embeddings");
            Ok(Arc::new(provider))
        }
        "hash" => {
            tracing::info!(dims = config.dimension, "hashing embeddings");
            Ok(Arc::new(hashed::HashEmbeddingProvider::new(config.dimension)))
        }
        other => Err(Error::Config(format!(
            "unknown embedding provider: {other}. Supported: openai, hash"
        ))),
    }
}
