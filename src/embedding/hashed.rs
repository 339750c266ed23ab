//! Offline embedder: bag-of-words feature hashing.
//!
//! Each lowercase alphanumeric token is hashed with BLAKE3 into one of `dims`
//! buckets with a hashed sign, then the vector is L2-normalized. Texts sharing
//! words end up with positive cosine similarity, which is enough for tests and
//! for running without network access.

use async_trait::async_trait;

use super::EmbeddingProvider;
use crate::error::Result;

/// First eight bytes of the token's BLAKE3 digest. Stored vectors depend on
/// this value, so it must not change between builds.
fn token_hash(token: &str) -> u64 {
    let mut head = [0u8; 8];
    head.copy_from_slice(&blake3::hash(token.as_bytes()).as_bytes()[..8]);
    u64::from_le_bytes(head)
}

pub struct HashEmbeddingProvider {
    dims: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    /// Synchronous core, shared with callers that need a vector outside async code.
    pub fn embed_text(&self, text: &str) -> Option<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dims];
        let mut any = false;

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let raw = token_hash(&token.to_lowercase());

            let bucket = (raw % self.dims as u64) as usize;
            let sign = if (raw >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
            any = true;
        }

        if !any {
            return None;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Some(vector)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        Ok(self.embed_text(text))
    }

    fn model_name(&self) -> &str {
        "feature-hash"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn deterministic_and_normalized() {
        let p = HashEmbeddingProvider::new(64);
        let a = p.embed_text("Rust is fast").unwrap();
        let b = p.embed_text("rust IS fast").unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn buckets_are_stable_across_builds() {
        let p = HashEmbeddingProvider::new(64);
        let v = p.embed_text("Rust").unwrap();
        assert_eq!(v[19], 1.0);
        assert_eq!(v.iter().filter(|x| **x != 0.0).count(), 1);
    }

    #[test]
    fn blank_or_punctuation_only_is_none() {
        let p = HashEmbeddingProvider::new(16);
        assert!(p.embed_text("").is_none());
        assert!(p.embed_text(" ,.;!? ").is_none());
    }

    #[test]
    fn identical_text_is_most_similar() {
        let p = HashEmbeddingProvider::new(256);
        let q = p.embed_text("coffee beans grinder").unwrap();
        let same = p.embed_text("coffee beans grinder").unwrap();
        let other = p.embed_text("tax return deadline").unwrap();
        assert!(cosine(&q, &same) > cosine(&q, &other));
    }
}
