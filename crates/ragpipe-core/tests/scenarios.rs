//! End-to-end acceptance scenarios
//!
//! Tests:
//! 1. Academic matrix stays one table chunk
//! 2. SQL example ranks first for its command
//! 3. A dominant top result yields high confidence
//! 4. An empty corpus yields the sentinel context

use ragpipe_core::chunking::LineRange;
use ragpipe_core::config::IngestConfig;
use ragpipe_core::search::{confidence, SignalScores};
use ragpipe_core::{
    chunk_document, retrieve, Chunk, ChunkStore, ChunkingOptions, Confidence, DocumentRef,
    DocumentType, HashEmbedder, Ingestor, MemoryStore, RetrievalConfig, RetrievalEngine,
    RetrievalMethod, RetrievalResult, Scope, StoredChunk, NO_CONTEXT,
};
use std::sync::Arc;

const MATRIX: &str = "CO4 3 3 3 1 1 - - 2 1\nCO3 2 2 3 2 1 1 - 1 1\nCO2 1 1 2 1 1 1 - 1 1\nCO1 1 1 1 1 1 1 1 1 1";
const DIMS: usize = 256;

fn ingest_config() -> IngestConfig {
    IngestConfig {
        batch_delay_ms: 0,
        ..Default::default()
    }
}

#[test]
fn test_academic_matrix_is_one_table_chunk() {
    let result = chunk_document(MATRIX, &ChunkingOptions::default()).unwrap();
    assert_eq!(result.chunks.len(), 1);
    let chunk = &result.chunks[0];
    assert!(chunk.is_table());
    for row in MATRIX.lines() {
        assert!(chunk.content.contains(row), "missing row {row}");
    }
}

#[tokio::test]
async fn test_sql_example_ranks_first_for_its_command() {
    let store = Arc::new(MemoryStore::new());
    let ingestor = Ingestor::new(
        Arc::new(HashEmbedder::new(DIMS)),
        store.clone(),
        ingest_config(),
    )
    .with_dimensions(DIMS);

    let corpus = [
        ("sql", "CREATE INDEX idx ON t (a, b)"),
        (
            "vacuum",
            "Vacuum reclaims storage occupied by dead tuples and keeps statistics fresh.",
        ),
        (
            "backup",
            "Logical backups are taken with a dump tool and restored into an empty cluster.",
        ),
        ("tables", "A table stores rows of data split into typed columns."),
    ];
    for (id, text) in corpus {
        let report = ingestor
            .ingest_text(
                "alice",
                &DocumentRef::new(id, format!("{id}.md")),
                text,
                &ChunkingOptions::default(),
            )
            .await
            .unwrap();
        assert!(!report.failed, "{id}: {:?}", report.errors);
    }

    let mut config = RetrievalConfig::default();
    config.reranking = true;
    let retrieval = retrieve(
        store.as_ref(),
        &HashEmbedder::new(DIMS),
        &config,
        "CREATE INDEX on multiple columns",
        &Scope::new("alice"),
    )
    .await;

    let top = &retrieval.results[0];
    assert!(top.chunk.content.contains("CREATE INDEX idx ON t (a, b)"));
    assert!(matches!(
        top.method,
        RetrievalMethod::Hybrid | RetrievalMethod::Vector
    ));
}

#[test]
fn test_dominant_result_yields_high_confidence() {
    let result = |idx: usize, score: f64| {
        let mut chunk = Chunk::new(
            format!("chunk number {idx}"),
            DocumentType::PlainText,
            LineRange::new(idx, idx),
        );
        chunk.chunk_index = idx;
        RetrievalResult {
            chunk: StoredChunk::from_chunk("alice", "doc", "doc.md", &chunk),
            scores: SignalScores::default(),
            fused_score: score,
            final_score: score,
            method: RetrievalMethod::Hybrid,
        }
    };
    let results = vec![
        result(0, 0.9),
        result(1, 0.5),
        result(2, 0.45),
        result(3, 0.3),
        result(4, 0.2),
    ];
    assert_eq!(confidence(&results), Confidence::High);
    assert_eq!(confidence(&results[..4]), Confidence::Medium);
}

#[tokio::test]
async fn test_empty_corpus_returns_sentinel() {
    let store: Arc<dyn ChunkStore> = Arc::new(MemoryStore::new());
    let engine = RetrievalEngine::new(
        store,
        Arc::new(HashEmbedder::new(DIMS)),
        RetrievalConfig::default(),
    );
    let response = engine
        .retrieve_context("how do I tune checkpoints", &Scope::new("alice"))
        .await;
    assert!(response.results.is_empty());
    assert_eq!(response.context, NO_CONTEXT);
    assert_eq!(response.confidence, Confidence::Low);
}
