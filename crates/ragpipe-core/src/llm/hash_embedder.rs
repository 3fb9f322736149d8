//! Offline feature-hashing embedder
//!
//! Maps lowercase word tokens and their bigrams into a fixed number of
//! buckets and L2-normalizes the result. Texts sharing vocabulary get a
//! positive cosine similarity, which is enough for local indexes and tests
//! without an embedding service.

use super::Embedder;
use crate::error::Result;
use async_trait::async_trait;

/// Deterministic bag-of-words embedder
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
    model: String,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            model: format!("feature-hash-{}", dimensions.max(1)),
        }
    }

    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        let mut v = vec![0.0f32; self.dimensions];
        for token in &tokens {
            self.add_feature(&mut v, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut v, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }

    fn add_feature(&self, v: &mut [f32], feature: &str, weight: f32) {
        let hash = blake3::hash(feature.as_bytes());
        let bytes = hash.as_bytes();
        let bucket = u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]) as usize
            % self.dimensions;
        v[bucket] += weight;
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
