//! Embedding integration
//!
//! Provides the [`Embedder`] trait plus:
//! - an HTTP embedder for OpenAI-compatible services (vLLM, OpenAI, etc.)
//! - an offline feature-hashing embedder
//! - a TTL cache with an injectable clock
//! - vector helpers shared by the stores

mod cache;
mod hash_embedder;
mod http_embedder;
mod traits;

pub use cache::{embedding_cache_key, CacheStats, Clock, ManualClock, SystemClock, TtlCache};
pub use hash_embedder::HashEmbedder;
pub use http_embedder::{EmbedderMetrics, HttpEmbedder, MetricsSnapshot};
pub use traits::*;

/// Pad with zeros or truncate a vector to `dimensions`
pub fn pad_embedding(mut v: Vec<f32>, dimensions: usize) -> Vec<f32> {
    v.resize(dimensions, 0.0);
    v
}

/// Zero vector stored when embedding generation fails
pub fn placeholder_embedding(dimensions: usize) -> Vec<f32> {
    vec![0.0; dimensions]
}

/// True if a vector carries no direction (empty or all zeros)
pub fn is_degenerate(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0)
}

/// Compute cosine similarity between two embeddings
///
/// Mismatched lengths and zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
