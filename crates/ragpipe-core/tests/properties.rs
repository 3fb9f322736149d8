//! Property tests for chunking and retrieval invariants

use proptest::prelude::*;

use ragpipe_core::chunking::{
    classify, consolidate_tables, detect_boundaries, Chunk, DocumentType, LineRange,
};
use ragpipe_core::search::{diversify, fuse, remove_near_duplicates, Hit, Signal};
use ragpipe_core::store::ChunkRecord;
use ragpipe_core::{
    chunk_document, retrieve, ChunkStore, ChunkingOptions, HashEmbedder, MemoryStore,
    RetrievalConfig, Scope, StoredChunk,
};
use std::collections::{HashMap, HashSet};

const DOCS: [&str; 3] = ["guide", "notes", "faq"];

fn prose_line() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z]{3,9}", 4..12).prop_map(|words| format!("{}.", words.join(" ")))
}

fn matrix_row(index: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(prop_oneof![Just("-"), Just("1"), Just("2"), Just("3")], 5..10)
        .prop_map(move |cells| format!("CO{} {}", index, cells.join(" ")))
}

fn matrix() -> impl Strategy<Value = Vec<String>> {
    (2usize..6).prop_flat_map(|rows| (1..=rows).rev().map(matrix_row).collect::<Vec<_>>())
}

fn fragment() -> impl Strategy<Value = String> {
    prop_oneof![
        (1usize..9).prop_map(|i| format!("CO{} 1 2 3 1", i)),
        (10u32..99, 10u32..99, 10u32..99).prop_map(|(a, b, c)| format!("Quiz {} {} {}", a, b, c)),
        prose_line(),
    ]
}

fn stored(doc: &str, idx: usize, text: &str) -> StoredChunk {
    let mut chunk = Chunk::new(text, DocumentType::PlainText, LineRange::new(idx, idx));
    chunk.chunk_index = idx;
    chunk.total_chunks = 8;
    StoredChunk::from_chunk("alice", doc, format!("{doc}.md"), &chunk)
}

fn hits() -> impl Strategy<Value = Vec<Hit>> {
    prop::collection::vec(
        (0usize..3, 0usize..8, any::<bool>(), 0.0f64..1.0, "[a-z]{2,6}( [a-z]{2,6}){0,4}"),
        0..40,
    )
    .prop_map(|raw| {
        raw.into_iter()
            .map(|(doc, idx, vector, score, text)| Hit {
                chunk: stored(DOCS[doc], idx, &text),
                signal: if vector { Signal::Vector } else { Signal::Lexical },
                score,
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_classification_is_stable(lines in prop::collection::vec(prose_line(), 1..20)) {
        let content = lines.join("\n");
        let first = classify(&content, None);
        let second = classify(&content, None);
        prop_assert_eq!(first.doc_type, second.doc_type);
        prop_assert!((first.confidence - second.confidence).abs() < 1e-12);
        prop_assert!((0.0..=1.0).contains(&first.confidence));
    }

    #[test]
    fn prop_consolidation_is_idempotent(texts in prop::collection::vec(fragment(), 1..15)) {
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let mut c = Chunk::new(t.as_str(), DocumentType::PlainText, LineRange::new(i, i));
                c.chunk_index = i;
                c.total_chunks = texts.len();
                c
            })
            .collect();
        let first = consolidate_tables(&chunks);
        let second = consolidate_tables(&first.chunks);
        prop_assert_eq!(second.tables_restored, 0);
        prop_assert_eq!(second.fragments_merged, 0);
        prop_assert_eq!(&second.chunks, &first.chunks);
    }

    #[test]
    fn prop_boundaries_cover_whole_matrix(
        before in prop::collection::vec(prose_line(), 0..6),
        rows in matrix(),
        after in prop::collection::vec(prose_line(), 0..6),
    ) {
        let mut lines: Vec<String> = before.clone();
        lines.extend(rows.iter().cloned());
        lines.extend(after);
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();

        let first_row = before.len();
        let last_row = first_row + rows.len() - 1;
        let detection = detect_boundaries(&refs);
        prop_assert!(detection
            .boundaries
            .iter()
            .any(|b| b.start_line <= first_row && b.end_line >= last_row));
    }

    #[test]
    fn prop_table_rows_stay_in_one_chunk(
        before in prop::collection::vec(prose_line(), 0..8),
        rows in matrix(),
        after in prop::collection::vec(prose_line(), 0..8),
    ) {
        let mut lines = before;
        lines.extend(rows.iter().cloned());
        lines.extend(after);
        let content = lines.join("\n");

        let result = chunk_document(&content, &ChunkingOptions::default()).unwrap();
        let holders: Vec<&Chunk> = result
            .chunks
            .iter()
            .filter(|c| c.content.contains(rows[0].as_str()))
            .collect();
        prop_assert_eq!(holders.len(), 1);
        for row in &rows {
            prop_assert!(holders[0].content.contains(row.as_str()));
        }
    }

    #[test]
    fn prop_fused_keys_are_unique(hits in hits(), threshold in 0.5f64..1.0) {
        let fused = fuse(hits, 0.6, 0.4);
        let keys: HashSet<(String, usize)> = fused.iter().map(|r| r.chunk.key()).collect();
        prop_assert_eq!(keys.len(), fused.len());

        let deduped = remove_near_duplicates(fused, threshold);
        let keys: HashSet<(String, usize)> = deduped.iter().map(|r| r.chunk.key()).collect();
        prop_assert_eq!(keys.len(), deduped.len());
    }

    #[test]
    fn prop_diversify_caps_each_source(hits in hits(), cap in 1usize..4) {
        let fused = fuse(hits, 0.6, 0.4);
        let total = fused.len();
        let diversified = diversify(fused, cap);
        let mut per_source: HashMap<&str, usize> = HashMap::new();
        for r in &diversified {
            *per_source.entry(r.source_id()).or_default() += 1;
        }
        prop_assert!(per_source.values().all(|n| *n <= cap));
        prop_assert!(diversified.len() <= total);
    }

    #[test]
    fn prop_raising_threshold_never_adds_results(
        texts in prop::collection::vec("[a-z]{3,7}( [a-z]{3,7}){1,6}", 1..12),
        query in "[a-z]{3,7}( [a-z]{3,7}){0,3}",
        low in 0.0f64..0.5,
        step in 0.0f64..0.5,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let embedder = HashEmbedder::new(64);
        let store = MemoryStore::new();
        let records = texts
            .iter()
            .enumerate()
            .map(|(i, t)| ChunkRecord {
                chunk: stored("guide", i, t),
                embedding: embedder.vectorize(t),
            })
            .collect();
        let scope = Scope::new("alice");
        let needle = embedder.vectorize(&query);

        let (loose, strict) = runtime.block_on(async {
            store.replace_document("alice", "guide", records).await.unwrap();
            let loose = store.vector_search(&needle, &scope, low, 100).await.unwrap();
            let strict = store.vector_search(&needle, &scope, low + step, 100).await.unwrap();
            (loose, strict)
        });

        let loose_keys: HashSet<(String, usize)> = loose.iter().map(|h| h.chunk.key()).collect();
        prop_assert!(strict.len() <= loose.len());
        prop_assert!(strict.iter().all(|h| loose_keys.contains(&h.chunk.key())));
        prop_assert!(strict.iter().all(|h| h.score >= low + step));
    }

    #[test]
    fn prop_retrieval_keys_unique_with_context(
        docs in prop::collection::vec(
            prop::collection::vec(
                "(vacuum|index|checkpoint|replica|backup|tuple)( [a-z]{3,7}){2,6}",
                1..10,
            ),
            1..4,
        ),
        query in "(vacuum|index|checkpoint|replica)( [a-z]{3,7}){0,2}",
        max_results in 1usize..8,
        window in 0usize..3,
        ratio in 0.2f64..1.0,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let embedder = HashEmbedder::new(64);
        let store = MemoryStore::new();
        let mut config = RetrievalConfig::default();
        config.max_results = max_results;
        config.context_window = window;
        config.diversification_ratio = ratio;
        config.similarity_threshold = 0.0;

        let retrieval = runtime.block_on(async {
            for (d, texts) in docs.iter().enumerate() {
                let doc = DOCS[d];
                let records = texts
                    .iter()
                    .enumerate()
                    .map(|(i, t)| ChunkRecord {
                        chunk: stored(doc, i, t),
                        embedding: embedder.vectorize(t),
                    })
                    .collect();
                store.replace_document("alice", doc, records).await.unwrap();
            }
            retrieve(&store, &embedder, &config, &query, &Scope::new("alice")).await
        });

        let keys: HashSet<(String, usize)> =
            retrieval.results.iter().map(|r| r.chunk.key()).collect();
        prop_assert_eq!(keys.len(), retrieval.results.len());
        prop_assert!(retrieval.results.len() <= max_results);

        let mut per_source: HashMap<&str, usize> = HashMap::new();
        for r in &retrieval.results {
            *per_source.entry(r.source_id()).or_default() += 1;
        }
        prop_assert!(per_source.values().all(|n| *n <= config.per_source_cap()));
    }
}
