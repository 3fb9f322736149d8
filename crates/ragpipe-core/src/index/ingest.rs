//! Ingestion: embed chunks and persist them under an (owner, document) scope
//!
//! Embedding runs in fixed-size batches with a delay between batches. Each
//! item has its own timeout and a bounded retry budget with exponential
//! backoff on rate-limit errors. An item that still fails is stored with a
//! placeholder vector so the document stays searchable lexically.

use crate::chunking::{chunk_document, Chunk, ChunkingOptions};
use crate::config::IngestConfig;
use crate::error::{RagPipeError, Result};
use crate::llm::{is_degenerate, pad_embedding, placeholder_embedding, Embedder};
use crate::store::{ChunkRecord, ChunkStore, StoredChunk};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Identity of a document being ingested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: String,
    /// Display name used in citations
    pub source: String,
}

impl DocumentRef {
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
        }
    }

    /// Stable id derived from the path, so re-ingesting a file replaces it
    pub fn for_path(path: &Path) -> Self {
        let key = path.to_string_lossy();
        let hash = blake3::hash(key.as_bytes());
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| key.to_string());
        Self {
            id: hash.to_hex()[..16].to_string(),
            source,
        }
    }
}

/// Outcome of ingesting one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,
    pub source: String,
    pub total_chunks: usize,
    pub stored: usize,
    pub placeholder_embeddings: usize,
    pub errors: Vec<String>,
    /// True only when no usable chunk was stored
    pub failed: bool,
}

/// Embeds chunks and writes them to a [`ChunkStore`]
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn ChunkStore>,
    config: IngestConfig,
    dimensions: usize,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn ChunkStore>,
        config: IngestConfig,
    ) -> Self {
        let dimensions = embedder.dimensions();
        Self {
            embedder,
            store,
            config,
            dimensions,
        }
    }

    /// Override the stored vector dimension
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Chunk `content` and ingest the result
    ///
    /// Chunking errors (empty document, invalid configuration) are returned
    /// to the caller; embedding and storage failures land in the report.
    pub async fn ingest_text(
        &self,
        owner: &str,
        document: &DocumentRef,
        content: &str,
        options: &ChunkingOptions,
    ) -> Result<IngestReport> {
        let result = chunk_document(content, options)?;
        self.ingest_document(owner, document, &result.chunks).await
    }

    pub async fn ingest_document(
        &self,
        owner: &str,
        document: &DocumentRef,
        chunks: &[Chunk],
    ) -> Result<IngestReport> {
        let mut report = IngestReport {
            document_id: document.id.clone(),
            source: document.source.clone(),
            total_chunks: chunks.len(),
            ..Default::default()
        };

        if chunks.is_empty() {
            report.errors.push("no chunks to ingest".to_string());
            report.failed = true;
            return Ok(report);
        }

        let texts: Vec<String> = chunks
            .iter()
            .map(|c| truncate_chars(&c.embedding_text(), self.config.max_embed_chars))
            .collect();
        let embeddings = self.embed_all(&texts, &mut report).await;

        let records: Vec<ChunkRecord> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                let mut stored =
                    StoredChunk::from_chunk(owner, &document.id, &document.source, chunk);
                stored.total_chunks = chunks.len();
                stored.metadata.extend(chunk_metadata(chunk));
                ChunkRecord {
                    chunk: stored,
                    embedding,
                }
            })
            .collect();

        self.persist(owner, &document.id, records, &mut report).await;

        report.failed = report.stored == 0;
        info!(
            document = %document.source,
            stored = report.stored,
            placeholders = report.placeholder_embeddings,
            errors = report.errors.len(),
            "ingested document"
        );
        Ok(report)
    }

    async fn embed_all(&self, texts: &[String], report: &mut IngestReport) -> Vec<Vec<f32>> {
        let batch_size = self.config.embed_batch_size.max(1);
        let total_batches = texts.len().div_ceil(batch_size);
        let mut out = Vec::with_capacity(texts.len());

        for (batch_num, batch) in texts.chunks(batch_size).enumerate() {
            debug!(batch = batch_num + 1, total_batches, "embedding batch");
            let results = join_all(batch.iter().map(|t| self.embed_with_retry(t))).await;

            for result in results {
                match result {
                    Ok(v) if !is_degenerate(&v) => out.push(pad_embedding(v, self.dimensions)),
                    Ok(_) => {
                        report.placeholder_embeddings += 1;
                        out.push(placeholder_embedding(self.dimensions));
                    }
                    Err(e) => {
                        warn!(error = %e, "embedding failed, storing placeholder vector");
                        report
                            .errors
                            .push(format!("Embedding generation failed: {}", e));
                        report.placeholder_embeddings += 1;
                        out.push(placeholder_embedding(self.dimensions));
                    }
                }
            }

            if batch_num + 1 < total_batches && self.config.batch_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
            }
        }
        out
    }

    /// One item with timeout and retry
    async fn embed_with_retry(&self, text: &str) -> Result<Vec<f32>> {
        let attempts = self.config.max_retries.max(1);
        let item_timeout = Duration::from_millis(self.config.item_timeout_ms);
        let mut last_error = RagPipeError::Embedding("no attempt made".to_string());

        for attempt in 1..=attempts {
            let outcome = tokio::time::timeout(item_timeout, self.embedder.embed(text)).await;
            let error = match outcome {
                Ok(Ok(v)) => return Ok(v),
                Ok(Err(e)) => e,
                Err(_) => RagPipeError::Timeout(self.config.item_timeout_ms),
            };

            if attempt < attempts {
                let delay = if error.is_rate_limited() {
                    self.config.rate_limit_backoff_ms << (attempt - 1)
                } else {
                    self.config.retry_delay_ms
                };
                debug!(attempt, delay_ms = delay, error = %error, "retrying embedding");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            last_error = error;
        }
        Err(last_error)
    }

    /// Write records in store batches; the first batch replaces the document
    async fn persist(
        &self,
        owner: &str,
        document_id: &str,
        records: Vec<ChunkRecord>,
        report: &mut IngestReport,
    ) {
        let batch_size = self.config.store_batch_size.max(1);
        let mut batches = records.chunks(batch_size).map(|b| b.to_vec()).enumerate();

        if let Some((_, first)) = batches.next() {
            match self.store.replace_document(owner, document_id, first).await {
                Ok(n) => report.stored += n,
                Err(e) => {
                    warn!(error = %e, "store write failed");
                    report
                        .errors
                        .push(format!("Database insert failed for batch 1: {}", e));
                }
            }
        }

        for (i, batch) in batches {
            match self.store.append_chunks(owner, document_id, batch).await {
                Ok(n) => report.stored += n,
                Err(e) => {
                    warn!(error = %e, batch = i + 1, "store write failed");
                    report
                        .errors
                        .push(format!("Database insert failed for batch {}: {}", i + 1, e));
                }
            }
        }
    }
}

/// Metadata persisted with a chunk for query-time boosts
pub fn chunk_metadata(chunk: &Chunk) -> BTreeMap<String, serde_json::Value> {
    let mut meta = BTreeMap::new();
    meta.insert(
        "document_type".to_string(),
        serde_json::Value::from(chunk.doc_type.as_str()),
    );
    if let Some(kind) = chunk.table_kind {
        meta.insert("table_kind".to_string(), serde_json::Value::from(kind.as_str()));
    }
    if let Some(ref enhanced) = chunk.enhanced {
        meta.insert(
            "keywords".to_string(),
            serde_json::Value::from(enhanced.topic_tags.clone()),
        );
        meta.insert(
            "content_type".to_string(),
            serde_json::Value::from(enhanced.content_type.as_str()),
        );
        meta.insert(
            "complexity".to_string(),
            serde_json::Value::from(enhanced.complexity),
        );
        meta.insert(
            "retrieval_score".to_string(),
            serde_json::Value::from(enhanced.retrieval_score),
        );
    }
    meta
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{DocumentType, LineRange};
    use crate::llm::HashEmbedder;
    use crate::store::{MemoryStore, Scope};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chunks(n: usize) -> Vec<Chunk> {
        (0..n)
            .map(|i| {
                let mut c = Chunk::new(
                    format!("Chunk number {} talks about indexes.", i),
                    DocumentType::PlainText,
                    LineRange::new(i, i),
                );
                c.chunk_index = i;
                c.total_chunks = n;
                c
            })
            .collect()
    }

    fn fast_config() -> IngestConfig {
        IngestConfig {
            batch_delay_ms: 10,
            item_timeout_ms: 100,
            rate_limit_backoff_ms: 20,
            retry_delay_ms: 5,
            ..Default::default()
        }
    }

    /// Fails with a rate-limit error for the first `failures` calls
    struct FlakyEmbedder {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(RagPipeError::ExternalError("HTTP 429 rate limit".into()))
            } else {
                Ok(vec![1.0, 0.0])
            }
        }
        fn dimensions(&self) -> usize {
            4
        }
        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    struct SlowEmbedder;

    #[async_trait]
    impl Embedder for SlowEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![1.0])
        }
        fn dimensions(&self) -> usize {
            3
        }
        fn model_name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ingest_stores_all_chunks_with_padded_vectors() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(Arc::new(HashEmbedder::new(16)), store.clone(), fast_config())
            .with_dimensions(20);
        let doc = DocumentRef::new("doc-1", "guide.md");

        let report = ingestor.ingest_document("alice", &doc, &chunks(7)).await.unwrap();
        assert_eq!(report.stored, 7);
        assert_eq!(report.placeholder_embeddings, 0);
        assert!(report.errors.is_empty());
        assert!(!report.failed);

        let query = pad_embedding(HashEmbedder::new(16).vectorize("indexes"), 20);
        let hits = store
            .vector_search(&query, &Scope::new("alice"), 0.0, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 7);
        assert!(hits.iter().all(|h| h.chunk.total_chunks == 7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_items_retry_then_succeed() {
        let embedder = Arc::new(FlakyEmbedder {
            failures: 2,
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(MemoryStore::new());
        let config = IngestConfig {
            embed_batch_size: 1,
            ..fast_config()
        };
        let ingestor = Ingestor::new(embedder.clone(), store, config);

        let report = ingestor
            .ingest_document("alice", &DocumentRef::new("d", "d"), &chunks(1))
            .await
            .unwrap();
        assert_eq!(report.placeholder_embeddings, 0);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_degrade_to_placeholder() {
        let embedder = Arc::new(FlakyEmbedder {
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(embedder, store.clone(), fast_config());

        let report = ingestor
            .ingest_document("alice", &DocumentRef::new("d", "d"), &chunks(2))
            .await
            .unwrap();
        assert_eq!(report.stored, 2);
        assert_eq!(report.placeholder_embeddings, 2);
        assert_eq!(report.errors.len(), 2);
        assert!(!report.failed);
        assert_eq!(store.stats().await.unwrap().placeholder_embeddings, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_timeout() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(Arc::new(SlowEmbedder), store, fast_config());
        let report = ingestor
            .ingest_document("alice", &DocumentRef::new("d", "d"), &chunks(1))
            .await
            .unwrap();
        assert_eq!(report.placeholder_embeddings, 1);
        assert!(report.errors[0].contains("timed out"));
    }

    #[tokio::test]
    async fn test_empty_chunk_list_fails_report() {
        let ingestor = Ingestor::new(
            Arc::new(HashEmbedder::new(4)),
            Arc::new(MemoryStore::new()),
            fast_config(),
        );
        let report = ingestor
            .ingest_document("alice", &DocumentRef::new("d", "d"), &[])
            .await
            .unwrap();
        assert!(report.failed);
    }

    #[tokio::test]
    async fn test_ingest_text_rejects_empty_document() {
        let ingestor = Ingestor::new(
            Arc::new(HashEmbedder::new(4)),
            Arc::new(MemoryStore::new()),
            fast_config(),
        );
        let err = ingestor
            .ingest_text("alice", &DocumentRef::new("d", "d"), "   ", &ChunkingOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RagPipeError::EmptyDocument));
    }

    #[test]
    fn test_document_ref_for_path_is_stable() {
        let a = DocumentRef::for_path(Path::new("/docs/guide.md"));
        let b = DocumentRef::for_path(Path::new("/docs/guide.md"));
        assert_eq!(a, b);
        assert_eq!(a.source, "guide.md");
        assert_eq!(a.id.len(), 16);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
