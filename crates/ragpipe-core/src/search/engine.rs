//! Retrieval pipeline
//!
//! expand → parallel vector + lexical search (+ multi-hop) → fuse and
//! dedup → rerank → adjust → context window → diversify, with one relaxed
//! retry when too few results survive. Upstream failures degrade to empty
//! branch contributions and never surface as errors.

use super::fusion::{confidence, diversify, fuse, remove_near_duplicates, Confidence, Hit, Signal};
use super::query::{
    expand_query, extract_keywords, keyword_query, mine_hop_terms, needs_multi_hop, QueryVariant,
    WeightedKeyword,
};
use super::rerank::{adjust, rerank, sort_by_final};
use super::{RetrievalMethod, RetrievalResult, SignalScores};
use crate::config::RetrievalConfig;
use crate::error::{RagPipeError, Result};
use crate::llm::Embedder;
use crate::store::{ChunkStore, Scope, StoredChunk};
use futures::future::{join, join_all};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fixed score of neighbour chunks pulled in by the context window
pub const CONTEXT_SCORE: f64 = 0.3;

/// Returned in place of an empty context
pub const NO_CONTEXT: &str = "No relevant context found.";

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Preliminary results mined for multi-hop terms
const HOP_SEED_RESULTS: usize = 3;

/// What happened during one retrieval, for inspection and tests
#[derive(Debug, Clone, Default, Serialize)]
pub struct DebugInfo {
    pub original_query: String,
    pub variants: Vec<QueryVariant>,
    pub keywords: Vec<WeightedKeyword>,
    pub vector_results: usize,
    pub lexical_results: usize,
    pub multi_hop_triggered: bool,
    pub multi_hop_terms: Vec<String>,
    pub multi_hop_results: usize,
    pub deduplicated: usize,
    pub context_results: usize,
    pub failed_branches: usize,
    pub retried: bool,
    pub final_threshold: f64,
    pub total_results: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    pub results: Vec<RetrievalResult>,
    pub confidence: Confidence,
    pub debug: DebugInfo,
}

/// Ranked results plus the assembled context string
#[derive(Debug, Clone, Serialize)]
pub struct ContextResponse {
    pub results: Vec<RetrievalResult>,
    pub context: String,
    pub confidence: Confidence,
    pub debug: DebugInfo,
}

/// Single relaxed re-run when too few results survive
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub min_results: usize,
    pub threshold_step: f64,
    pub threshold_floor: f64,
    pub max_results: usize,
}

impl RetryPolicy {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            min_results: config.min_results_before_retry,
            threshold_step: config.retry_threshold_step,
            threshold_floor: config.retry_threshold_floor,
            max_results: config.retry_max_results,
        }
    }

    pub fn should_retry(&self, retrieval: &Retrieval) -> bool {
        retrieval.results.len() < self.min_results
    }

    /// Lower threshold, raised cap, every feature on
    pub fn relax(&self, config: &RetrievalConfig) -> RetrievalConfig {
        let mut relaxed = config.clone();
        relaxed.similarity_threshold =
            (config.similarity_threshold - self.threshold_step).max(self.threshold_floor);
        relaxed.max_results = config.max_results.max(self.max_results);
        relaxed.reranking = true;
        relaxed.multi_hop = true;
        relaxed.query_expansion = true;
        relaxed
    }
}

async fn with_timeout<T>(ms: u64, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(Duration::from_millis(ms), fut)
        .await
        .map_err(|_| RagPipeError::Timeout(ms))?
}

/// Vector search for one query variant
///
/// The similarity threshold is divided by the variant weight, so variants
/// weighted above 1.0 admit weaker matches and variants below 1.0 must clear
/// a higher bar. Hit scores are multiplied by the same weight.
async fn vector_branch(
    store: &dyn ChunkStore,
    embedder: &dyn Embedder,
    variant: &QueryVariant,
    config: &RetrievalConfig,
    scope: &Scope,
    limit: usize,
) -> Result<Vec<Hit>> {
    let embedding = with_timeout(config.search_timeout_ms, embedder.embed(&variant.text)).await?;
    let threshold = (config.similarity_threshold / variant.weight).clamp(0.0, 1.0);
    let hits = with_timeout(
        config.search_timeout_ms,
        store.vector_search(&embedding, scope, threshold, limit),
    )
    .await?;

    Ok(hits
        .into_iter()
        .map(|h| Hit {
            chunk: h.chunk,
            signal: Signal::Vector,
            score: (h.score * variant.weight).clamp(0.0, 1.0),
        })
        .collect())
}

async fn lexical_branch(
    store: &dyn ChunkStore,
    query: &str,
    config: &RetrievalConfig,
    scope: &Scope,
    limit: usize,
) -> Result<Vec<Hit>> {
    let hits =
        with_timeout(config.search_timeout_ms, store.lexical_search(query, scope, limit)).await?;
    Ok(hits
        .into_iter()
        .map(|h| Hit {
            chunk: h.chunk,
            signal: Signal::Lexical,
            score: h.score,
        })
        .collect())
}

/// Query text for the lexical branch: weighted keywords, or the raw query
fn lexical_query(query: &str, keywords: &[WeightedKeyword]) -> String {
    let joined = keyword_query(keywords);
    if joined.trim().is_empty() {
        query.to_string()
    } else {
        joined
    }
}

struct RoundHits {
    vector: Vec<Hit>,
    lexical: Vec<Hit>,
    failed: usize,
}

/// One vector search per variant plus one lexical search, jointly awaited
async fn search_round(
    store: &dyn ChunkStore,
    embedder: &dyn Embedder,
    config: &RetrievalConfig,
    variants: &[QueryVariant],
    lexical_text: &str,
    scope: &Scope,
    limit: usize,
) -> RoundHits {
    let vector_futs = variants
        .iter()
        .map(|v| vector_branch(store, embedder, v, config, scope, limit));
    let (vector_outcomes, lexical_outcome) = join(
        join_all(vector_futs),
        lexical_branch(store, lexical_text, config, scope, limit),
    )
    .await;

    let mut round = RoundHits {
        vector: Vec::new(),
        lexical: Vec::new(),
        failed: 0,
    };
    for (variant, outcome) in variants.iter().zip(vector_outcomes) {
        match outcome {
            Ok(hits) => round.vector.extend(hits),
            Err(e) => {
                warn!(
                    branch = "vector",
                    variant = %variant.text,
                    error = %e,
                    "search branch failed"
                );
                round.failed += 1;
            }
        }
    }
    match lexical_outcome {
        Ok(hits) => round.lexical = hits,
        Err(e) => {
            warn!(branch = "lexical", error = %e, "search branch failed");
            round.failed += 1;
        }
    }
    round
}

/// Neighbours of the top results, tagged as context at a fixed score
async fn context_window(
    store: &dyn ChunkStore,
    config: &RetrievalConfig,
    scope: &Scope,
    top: &[RetrievalResult],
    known: &[RetrievalResult],
) -> Vec<RetrievalResult> {
    let futs = top.iter().map(|r| {
        with_timeout(
            config.search_timeout_ms,
            store.neighbours(
                scope,
                &r.chunk.document_id,
                r.chunk.chunk_index,
                config.context_window,
            ),
        )
    });
    // Candidates below the cut still own their key
    let mut seen: HashSet<(String, usize)> = known.iter().map(|r| r.chunk.key()).collect();
    let mut out = Vec::new();

    for outcome in join_all(futs).await {
        match outcome {
            Ok(chunks) => {
                for chunk in chunks {
                    if seen.insert(chunk.key()) {
                        out.push(RetrievalResult {
                            chunk,
                            scores: SignalScores::default(),
                            fused_score: CONTEXT_SCORE,
                            final_score: CONTEXT_SCORE,
                            method: RetrievalMethod::Context,
                        });
                    }
                }
            }
            Err(e) => warn!(branch = "context", error = %e, "neighbour fetch failed"),
        }
    }
    out
}

/// Run the retrieval pipeline once with `config`
///
/// Pure with respect to its inputs: no state survives the call.
pub async fn retrieve(
    store: &dyn ChunkStore,
    embedder: &dyn Embedder,
    config: &RetrievalConfig,
    query: &str,
    scope: &Scope,
) -> Retrieval {
    let query = query.trim();
    let mut info = DebugInfo {
        original_query: query.to_string(),
        final_threshold: config.similarity_threshold,
        ..Default::default()
    };
    if query.is_empty() {
        return Retrieval {
            results: Vec::new(),
            confidence: Confidence::Low,
            debug: info,
        };
    }

    let variants = if config.query_expansion {
        expand_query(query)
    } else {
        vec![QueryVariant {
            text: query.to_string(),
            weight: 1.0,
        }]
    };
    let keywords = extract_keywords(query);
    let limit = config.max_results.saturating_mul(2).max(1);

    let round = search_round(
        store,
        embedder,
        config,
        &variants,
        &lexical_query(query, &keywords),
        scope,
        limit,
    )
    .await;
    info.vector_results = round.vector.len();
    info.lexical_results = round.lexical.len();
    info.failed_branches = round.failed;
    let mut pool: Vec<Hit> = round.vector.into_iter().chain(round.lexical).collect();

    if config.multi_hop && needs_multi_hop(query) {
        info.multi_hop_triggered = true;
        let preliminary = fuse(pool.clone(), config.vector_weight, config.lexical_weight);
        let seeds: Vec<StoredChunk> = preliminary
            .into_iter()
            .take(HOP_SEED_RESULTS)
            .map(|r| r.chunk)
            .collect();
        let terms = mine_hop_terms(query, &seeds);
        if !terms.is_empty() {
            let augmented = format!("{} {}", query, terms.join(" "));
            debug!(terms = ?terms, "multi-hop follow-up");
            let hop_variant = [QueryVariant {
                text: augmented.clone(),
                weight: 1.0,
            }];
            let hop_keywords = extract_keywords(&augmented);
            let hop = search_round(
                store,
                embedder,
                config,
                &hop_variant,
                &lexical_query(&augmented, &hop_keywords),
                scope,
                limit,
            )
            .await;
            info.multi_hop_results = hop.vector.len() + hop.lexical.len();
            info.failed_branches += hop.failed;
            pool.extend(hop.vector);
            pool.extend(hop.lexical);
        }
        info.multi_hop_terms = terms;
    }

    let fused = fuse(pool, config.vector_weight, config.lexical_weight);
    let mut results = remove_near_duplicates(fused, config.near_duplicate_jaccard);
    info.deduplicated = results.len();

    if config.reranking {
        results = rerank(results, query, &config.rerank);
    }
    results = adjust(results, &config.rerank);

    if config.context_window > 0 && !results.is_empty() {
        let top_n = results.len().min(config.max_results);
        let neighbours = context_window(store, config, scope, &results[..top_n], &results).await;
        info.context_results = neighbours.len();
        results.extend(neighbours);
        sort_by_final(&mut results);
    }

    let mut results = diversify(results, config.per_source_cap());
    results.truncate(config.max_results);

    let confidence = confidence(&results);
    info.variants = variants;
    info.keywords = keywords;
    info.total_results = results.len();

    debug!(
        vector = info.vector_results,
        lexical = info.lexical_results,
        multi_hop = info.multi_hop_results,
        deduplicated = info.deduplicated,
        failed = info.failed_branches,
        "retrieval pass finished"
    );

    Retrieval {
        results,
        confidence,
        debug: info,
    }
}

/// [`retrieve`], re-run once under [`RetryPolicy::relax`] if results are sparse
///
/// The retry's output is adopted only if it has strictly more results.
pub async fn retrieve_with_retry(
    store: &dyn ChunkStore,
    embedder: &dyn Embedder,
    config: &RetrievalConfig,
    query: &str,
    scope: &Scope,
) -> Retrieval {
    let first = retrieve(store, embedder, config, query, scope).await;
    let policy = RetryPolicy::from_config(config);
    if !policy.should_retry(&first) {
        return first;
    }

    let relaxed = policy.relax(config);
    debug!(
        results = first.results.len(),
        threshold = relaxed.similarity_threshold,
        "sparse results, retrying relaxed"
    );
    let second = retrieve(store, embedder, &relaxed, query, scope).await;

    let mut chosen = if second.results.len() > first.results.len() {
        second
    } else {
        first
    };
    chosen.debug.retried = true;
    chosen
}

fn location_marker(chunk: &StoredChunk) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(section) = chunk.section.as_deref().filter(|s| !s.is_empty()) {
        parts.push(format!("section \"{}\"", section));
    }
    if let Some(pages) = chunk.pages {
        if pages.start == pages.end {
            parts.push(format!("page {}", pages.start));
        } else {
            parts.push(format!("pages {}-{}", pages.start, pages.end));
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(format!("[{}]", parts.join(", ")))
    }
}

/// Render results grouped by source, each group in chunk order
///
/// Groups appear in order of their best result. An empty result set yields
/// [`NO_CONTEXT`].
pub fn assemble_context(results: &[RetrievalResult]) -> String {
    if results.is_empty() {
        return NO_CONTEXT.to_string();
    }

    let mut order: Vec<&str> = Vec::new();
    let mut groups: BTreeMap<&str, Vec<&StoredChunk>> = BTreeMap::new();
    for r in results {
        let id = r.chunk.document_id.as_str();
        if !groups.contains_key(id) {
            order.push(id);
        }
        groups.entry(id).or_default().push(&r.chunk);
    }

    let blocks: Vec<String> = order
        .into_iter()
        .filter_map(|id| groups.remove(id))
        .map(|mut chunks| {
            chunks.sort_by_key(|c| c.chunk_index);
            let mut block = format!("[Source: {}]", chunks[0].source);
            for chunk in chunks {
                block.push_str("\n\n");
                if let Some(marker) = location_marker(chunk) {
                    block.push_str(&marker);
                    block.push('\n');
                }
                block.push_str(chunk.content.trim());
            }
            block
        })
        .collect();

    blocks.join(CONTEXT_SEPARATOR)
}

/// Retrieval over a shared store and embedder
pub struct RetrievalEngine {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub async fn retrieve(&self, query: &str, scope: &Scope) -> Retrieval {
        retrieve_with_retry(
            self.store.as_ref(),
            self.embedder.as_ref(),
            &self.config,
            query,
            scope,
        )
        .await
    }

    /// Retrieve and assemble a context bundle for an answer generator
    pub async fn retrieve_context(&self, query: &str, scope: &Scope) -> ContextResponse {
        let retrieval = self.retrieve(query, scope).await;
        let context = assemble_context(&retrieval.results);
        info!(
            results = retrieval.results.len(),
            confidence = %retrieval.confidence,
            retried = retrieval.debug.retried,
            "retrieved context"
        );
        ContextResponse {
            results: retrieval.results,
            context,
            confidence: retrieval.confidence,
            debug: retrieval.debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{Chunk, DocumentType, LineRange, PageRange};
    use crate::llm::HashEmbedder;
    use crate::store::{ChunkRecord, MemoryStore, ScoredChunk, StoreStats};
    use async_trait::async_trait;

    const DIMS: usize = 256;

    async fn seed(store: &MemoryStore, doc: &str, texts: &[&str]) {
        let embedder = HashEmbedder::new(DIMS);
        let records = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let mut chunk = Chunk::new(*text, DocumentType::PlainText, LineRange::new(i, i));
                chunk.chunk_index = i;
                chunk.total_chunks = texts.len();
                ChunkRecord {
                    chunk: StoredChunk::from_chunk("alice", doc, format!("{doc}.md"), &chunk),
                    embedding: embedder.vectorize(text),
                }
            })
            .collect();
        store.replace_document("alice", doc, records).await.unwrap();
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(RagPipeError::Embedding("service down".into()))
        }
        fn dimensions(&self) -> usize {
            DIMS
        }
        fn model_name(&self) -> &str {
            "failing"
        }
    }

    struct StalledStore;

    #[async_trait]
    impl ChunkStore for StalledStore {
        async fn replace_document(&self, _: &str, _: &str, _: Vec<ChunkRecord>) -> Result<usize> {
            Ok(0)
        }
        async fn append_chunks(&self, _: &str, _: &str, _: Vec<ChunkRecord>) -> Result<usize> {
            Ok(0)
        }
        async fn vector_search(
            &self,
            _: &[f32],
            _: &Scope,
            _: f64,
            _: usize,
        ) -> Result<Vec<ScoredChunk>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
        async fn lexical_search(&self, _: &str, _: &Scope, _: usize) -> Result<Vec<ScoredChunk>> {
            Err(RagPipeError::Store("fts unavailable".into()))
        }
        async fn neighbours(
            &self,
            _: &Scope,
            _: &str,
            _: usize,
            _: usize,
        ) -> Result<Vec<StoredChunk>> {
            Ok(Vec::new())
        }
        async fn stats(&self) -> Result<StoreStats> {
            Ok(StoreStats::default())
        }
    }

    #[test]
    fn test_retry_policy_relaxes_with_floor() {
        let mut config = RetrievalConfig::default();
        config.reranking = false;
        config.max_results = 5;
        let policy = RetryPolicy::from_config(&config);
        let relaxed = policy.relax(&config);
        assert!((relaxed.similarity_threshold - 0.20).abs() < 1e-9);
        assert_eq!(relaxed.max_results, 40);
        assert!(relaxed.reranking && relaxed.multi_hop && relaxed.query_expansion);

        config.similarity_threshold = 0.16;
        assert!((policy.relax(&config).similarity_threshold - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_context_assembly_groups_and_orders() {
        let make = |doc: &str, idx: usize, text: &str, score: f64| {
            let mut chunk = Chunk::new(text, DocumentType::PlainText, LineRange::new(idx, idx));
            chunk.chunk_index = idx;
            let mut stored = StoredChunk::from_chunk("o", doc, format!("{doc}.md"), &chunk);
            if idx == 2 {
                stored.section = Some("Tuning".into());
                stored.pages = Some(PageRange::new(3, 3));
            }
            RetrievalResult {
                chunk: stored,
                scores: SignalScores::default(),
                fused_score: score,
                final_score: score,
                method: RetrievalMethod::Vector,
            }
        };
        let results = vec![
            make("guide", 2, "second part", 0.9),
            make("notes", 0, "other source", 0.8),
            make("guide", 1, "first part", 0.7),
        ];
        let context = assemble_context(&results);
        let blocks: Vec<&str> = context.split(CONTEXT_SEPARATOR).collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with("[Source: guide.md]"));
        assert!(blocks[0].find("first part").unwrap() < blocks[0].find("second part").unwrap());
        assert!(blocks[0].contains("[section \"Tuning\", page 3]\nsecond part"));
        assert!(blocks[1].starts_with("[Source: notes.md]"));

        assert_eq!(assemble_context(&[]), NO_CONTEXT);
    }

    #[tokio::test]
    async fn test_empty_store_yields_low_confidence() {
        let store = MemoryStore::new();
        let engine = RetrievalEngine::new(
            Arc::new(store),
            Arc::new(HashEmbedder::new(DIMS)),
            RetrievalConfig::default(),
        );
        let response = engine.retrieve_context("anything at all", &Scope::new("alice")).await;
        assert!(response.results.is_empty());
        assert_eq!(response.confidence, Confidence::Low);
        assert_eq!(response.context, NO_CONTEXT);
        assert!(response.debug.retried);
    }

    #[tokio::test]
    async fn test_failed_embedder_degrades_to_lexical() {
        let store = MemoryStore::new();
        seed(&store, "guide", &["autovacuum reclaims dead tuples", "indexes speed lookups"]).await;
        let retrieval = retrieve(
            &store,
            &FailingEmbedder,
            &RetrievalConfig::default(),
            "autovacuum tuples",
            &Scope::new("alice"),
        )
        .await;
        assert!(retrieval.debug.failed_branches >= 1);
        assert_eq!(retrieval.debug.vector_results, 0);
        assert!(!retrieval.results.is_empty());
        assert_eq!(retrieval.results[0].method, RetrievalMethod::Keyword);
        assert!(retrieval.results[0].chunk.content.contains("autovacuum"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_and_store_errors_do_not_propagate() {
        let mut config = RetrievalConfig::default();
        config.search_timeout_ms = 50;
        let retrieval = retrieve(
            &StalledStore,
            &HashEmbedder::new(DIMS),
            &config,
            "vacuum",
            &Scope::new("alice"),
        )
        .await;
        assert!(retrieval.results.is_empty());
        assert_eq!(retrieval.debug.failed_branches, 2);
        assert_eq!(retrieval.confidence, Confidence::Low);
    }

    #[tokio::test]
    async fn test_context_window_adds_neighbours() {
        let store = MemoryStore::new();
        seed(
            &store,
            "guide",
            &[
                "chapter opening remarks",
                "checkpoint frequency controls recovery time",
                "closing remarks about backups",
            ],
        )
        .await;
        let mut config = RetrievalConfig::default();
        config.context_window = 1;
        config.query_expansion = false;
        let retrieval = retrieve(
            &store,
            &HashEmbedder::new(DIMS),
            &config,
            "checkpoint frequency",
            &Scope::new("alice"),
        )
        .await;
        assert_eq!(retrieval.results[0].chunk.chunk_index, 1);
        let context: Vec<&RetrievalResult> = retrieval
            .results
            .iter()
            .filter(|r| r.method == RetrievalMethod::Context)
            .collect();
        assert!(context.iter().all(|r| r.final_score == CONTEXT_SCORE));
        let keys: HashSet<(String, usize)> =
            retrieval.results.iter().map(|r| r.chunk.key()).collect();
        assert_eq!(keys.len(), retrieval.results.len());
    }

    /// Lexical-only store returning a fixed ranking
    struct RankedStore {
        chunks: Vec<(StoredChunk, f64)>,
    }

    impl RankedStore {
        fn new(ranking: &[(&str, usize, f64)]) -> Self {
            let chunks = ranking
                .iter()
                .map(|(doc, idx, score)| {
                    let text = format!("{doc} section {idx} body");
                    let mut chunk =
                        Chunk::new(text, DocumentType::PlainText, LineRange::new(*idx, *idx));
                    chunk.chunk_index = *idx;
                    (StoredChunk::from_chunk("alice", *doc, format!("{doc}.md"), &chunk), *score)
                })
                .collect();
            Self { chunks }
        }
    }

    #[async_trait]
    impl ChunkStore for RankedStore {
        async fn replace_document(&self, _: &str, _: &str, _: Vec<ChunkRecord>) -> Result<usize> {
            Ok(0)
        }
        async fn append_chunks(&self, _: &str, _: &str, _: Vec<ChunkRecord>) -> Result<usize> {
            Ok(0)
        }
        async fn vector_search(
            &self,
            _: &[f32],
            _: &Scope,
            _: f64,
            _: usize,
        ) -> Result<Vec<ScoredChunk>> {
            Ok(Vec::new())
        }
        async fn lexical_search(
            &self,
            _: &str,
            _: &Scope,
            limit: usize,
        ) -> Result<Vec<ScoredChunk>> {
            Ok(self
                .chunks
                .iter()
                .take(limit)
                .map(|(chunk, score)| ScoredChunk {
                    chunk: chunk.clone(),
                    score: *score,
                })
                .collect())
        }
        async fn neighbours(
            &self,
            _: &Scope,
            document_id: &str,
            chunk_index: usize,
            window: usize,
        ) -> Result<Vec<StoredChunk>> {
            let mut out: Vec<StoredChunk> = self
                .chunks
                .iter()
                .map(|(c, _)| c.clone())
                .filter(|c| {
                    c.document_id == document_id
                        && c.chunk_index != chunk_index
                        && c.chunk_index.abs_diff(chunk_index) <= window
                })
                .collect();
            out.sort_by_key(|c| c.chunk_index);
            Ok(out)
        }
        async fn stats(&self) -> Result<StoreStats> {
            Ok(StoreStats::default())
        }
    }

    #[tokio::test]
    async fn test_context_window_skips_candidates_below_cut() {
        let mut ranking = vec![("b", 0, 0.95), ("a", 0, 0.9)];
        for i in 1..=7 {
            ranking.push(("b", i, 0.85 - i as f64 * 0.04));
        }
        ranking.push(("a", 1, 0.5));
        let store = RankedStore::new(&ranking);

        let mut config = RetrievalConfig::default();
        config.max_results = 6;
        config.diversification_ratio = 0.5;
        config.context_window = 1;
        config.reranking = false;
        config.query_expansion = false;
        config.multi_hop = false;

        let retrieval = retrieve(
            &store,
            &FailingEmbedder,
            &config,
            "section body",
            &Scope::new("alice"),
        )
        .await;

        let keys: HashSet<(String, usize)> =
            retrieval.results.iter().map(|r| r.chunk.key()).collect();
        assert_eq!(keys.len(), retrieval.results.len());
        assert!(keys.contains(&("a".to_string(), 1)));
        assert!(retrieval
            .results
            .iter()
            .filter(|r| r.chunk.key() == ("a".to_string(), 1))
            .all(|r| r.method == RetrievalMethod::Keyword));
        assert_eq!(retrieval.results.iter().filter(|r| r.chunk.document_id == "b").count(), 3);
    }

    #[tokio::test]
    async fn test_multi_hop_mines_terms() {
        let store = MemoryStore::new();
        seed(
            &store,
            "wal",
            &[
                "Vacuum depends on the Visibility Map to skip pages",
                "Visibility Map bits are set by vacuum",
            ],
        )
        .await;
        let retrieval = retrieve(
            &store,
            &HashEmbedder::new(DIMS),
            &RetrievalConfig::default(),
            "how does vacuum relate to page skipping",
            &Scope::new("alice"),
        )
        .await;
        assert!(retrieval.debug.multi_hop_triggered);
        assert!(retrieval.debug.multi_hop_terms.iter().any(|t| t == "Visibility Map"));
    }
}
