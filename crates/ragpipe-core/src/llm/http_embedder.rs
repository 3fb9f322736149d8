//! HTTP embedder for OpenAI-compatible `/v1/embeddings` services

use super::cache::{embedding_cache_key, TtlCache};
use super::{pad_embedding, Embedder};
use crate::config::EmbeddingServiceConfig;
use crate::error::{RagPipeError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const CACHE_TTL: Duration = Duration::from_secs(3600);

/// Request counters
#[derive(Debug, Default)]
pub struct EmbedderMetrics {
    pub total_requests: AtomicU64,
    pub total_errors: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
}

/// Point-in-time copy of [`EmbedderMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

/// Embedder backed by an external HTTP service (vLLM, OpenAI, ...)
pub struct HttpEmbedder {
    http_client: reqwest::Client,
    config: EmbeddingServiceConfig,
    cache: Arc<TtlCache<Vec<f32>>>,
    metrics: Arc<EmbedderMetrics>,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingServiceConfig) -> Result<Self> {
        Self::with_cache(config, Arc::new(TtlCache::new(CACHE_TTL)))
    }

    /// Create with a caller-owned cache
    pub fn with_cache(
        config: EmbeddingServiceConfig,
        cache: Arc<TtlCache<Vec<f32>>>,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            config,
            cache,
            metrics: Arc::new(EmbedderMetrics::default()),
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(EmbeddingServiceConfig::default())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.metrics.total_requests.load(Ordering::Relaxed),
            total_errors: self.metrics.total_errors.load(Ordering::Relaxed),
            cache_hits: self.metrics.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.metrics.cache_misses.load(Ordering::Relaxed),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/embeddings", self.config.url.trim_end_matches('/'))
    }

    async fn fetch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.config.model,
            input: texts,
        };

        let mut req = self.http_client.post(self.endpoint()).json(&request);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req.send().await.inspect_err(|_| {
            self.metrics.total_errors.fetch_add(1, Ordering::Relaxed);
        })?;

        if !response.status().is_success() {
            self.metrics.total_errors.fetch_add(1, Ordering::Relaxed);
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagPipeError::ExternalError(format!(
                "Embedding service error (HTTP {}): {}",
                status, body
            )));
        }

        let parsed: EmbedResponse = response.json().await?;
        if parsed.data.len() != texts.len() {
            self.metrics.total_errors.fetch_add(1, Ordering::Relaxed);
            return Err(RagPipeError::Embedding(format!(
                "expected {} embeddings, service returned {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        Ok(parsed
            .data
            .into_iter()
            .map(|d| pad_embedding(d.embedding, self.config.dimensions))
            .collect())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop()
            .ok_or_else(|| RagPipeError::Embedding("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut uncached = Vec::new();
        let mut uncached_indices = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let key = embedding_cache_key(&self.config.model, text);
            match self.cache.get(&key) {
                Some(hit) => {
                    self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                    results.push(Some(hit));
                }
                None => {
                    self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);
                    results.push(None);
                    uncached.push(text.clone());
                    uncached_indices.push(i);
                }
            }
        }

        if !uncached.is_empty() {
            tracing::debug!(
                cached = texts.len() - uncached.len(),
                fetching = uncached.len(),
                "embedding batch"
            );
            let fetched = self.fetch(&uncached).await?;
            for ((idx, text), vector) in uncached_indices.into_iter().zip(&uncached).zip(fetched) {
                self.cache
                    .insert(embedding_cache_key(&self.config.model, text), vector.clone());
                results[idx] = Some(vector);
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> EmbeddingServiceConfig {
        EmbeddingServiceConfig {
            url: url.to_string(),
            model: "test-model".to_string(),
            dimensions: 4,
            api_key: None,
            timeout_secs: 1,
        }
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let embedder = HttpEmbedder::new(config("http://localhost:9999/")).unwrap();
        assert_eq!(embedder.endpoint(), "http://localhost:9999/v1/embeddings");
        assert_eq!(embedder.dimensions(), 4);
        assert_eq!(embedder.model_name(), "test-model");
    }

    #[tokio::test]
    async fn test_cached_embeddings_skip_the_network() {
        let cache = Arc::new(TtlCache::new(CACHE_TTL));
        cache.insert(embedding_cache_key("test-model", "hello"), vec![1.0, 0.0, 0.0, 0.0]);

        // Unroutable port: any request would fail
        let embedder = HttpEmbedder::with_cache(config("http://127.0.0.1:9"), cache).unwrap();
        let v = embedder.embed("hello").await.unwrap();
        assert_eq!(v, vec![1.0, 0.0, 0.0, 0.0]);

        let m = embedder.metrics();
        assert_eq!(m.cache_hits, 1);
        assert_eq!(m.cache_misses, 0);
    }

    #[tokio::test]
    async fn test_unreachable_service_errors() {
        let embedder = HttpEmbedder::new(config("http://127.0.0.1:9")).unwrap();
        assert!(embedder.embed("hello").await.is_err());
        assert_eq!(embedder.metrics().total_errors, 1);
    }
}
