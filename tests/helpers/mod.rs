#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use xmemory::embedding::hashed::HashEmbeddingProvider;
use xmemory::memory::{dates, MemoryDocument, MemoryRepository, MemoryType};
use xmemory::store::sqlite::SqliteStore;
use xmemory::store::StoreClient;

/// Embedding width used across the integration tests.
pub const DIMS: usize = 16;

/// Fresh in-memory store with the memory index created and a hashing embedder.
pub async fn test_repo() -> MemoryRepository {
    let client = StoreClient::new(SqliteStore::open_in_memory().unwrap());
    let repo = MemoryRepository::new(client, "memories", Arc::new(HashEmbeddingProvider::new(DIMS)));
    repo.initialize().await.unwrap();
    repo
}

/// Unit vector with a spike at `seed`. Distinct seeds are orthogonal.
pub fn test_embedding(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    v[seed % DIMS] = 1.0;
    v
}

/// Unit vector leaning towards `seed` with some weight on `other`.
pub fn blend(seed: usize, other: usize, weight: f32) -> Vec<f32> {
    let mut v = test_embedding(seed);
    v[other % DIMS] += weight;
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.iter().map(|x| x / norm).collect()
}

pub fn at(ts: &str) -> DateTime<FixedOffset> {
    dates::parse_loose(ts, dates::utc()).unwrap()
}

/// Store a memory with an explicit vector and creation time. Returns its id.
pub async fn insert(
    repo: &MemoryRepository,
    doc: MemoryDocument,
    embedding: Vec<f32>,
    created_at: &str,
) -> String {
    let mut doc = doc.with_created_at(at(created_at));
    doc.embedding = Some(embedding);
    repo.create_memory(doc).await.unwrap()
}

pub fn memory(content: &str, memory_type: MemoryType, user: &str) -> MemoryDocument {
    MemoryDocument::new(content, memory_type, user)
}

pub fn ids(docs: &[MemoryDocument]) -> Vec<String> {
    docs.iter().filter_map(|d| d.id.clone()).collect()
}
