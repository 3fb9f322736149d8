//! Database layer for ragpipe
//!
//! Provides SQLite-based chunk storage with:
//! - FTS5 full-text search
//! - BLOB embeddings with cosine similarity
//! - (owner, document) scoped writes

mod chunks;
mod fts;
mod schema;
mod stats;
pub mod vectors;

pub use fts::fts_match_expression;
pub use schema::Database;
pub use stats::DocumentSummary;

use crate::error::Result;
use crate::store::{ChunkRecord, ChunkStore, Scope, ScoredChunk, StoreStats, StoredChunk};
use async_trait::async_trait;
use std::path::PathBuf;

impl Database {
    /// Get the default database path
    pub fn default_path() -> PathBuf {
        crate::config::Config::database_path()
    }

    /// Open and initialize the database at the default path
    pub fn open_default() -> Result<Self> {
        let db = Self::open(Self::default_path())?;
        db.initialize()?;
        Ok(db)
    }
}

#[async_trait]
impl ChunkStore for Database {
    async fn replace_document(
        &self,
        owner: &str,
        document_id: &str,
        records: Vec<ChunkRecord>,
    ) -> Result<usize> {
        self.replace_chunks(owner, document_id, &records)
    }

    async fn append_chunks(
        &self,
        owner: &str,
        document_id: &str,
        records: Vec<ChunkRecord>,
    ) -> Result<usize> {
        self.insert_chunks(owner, document_id, &records)
    }

    async fn vector_search(
        &self,
        embedding: &[f32],
        scope: &Scope,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        self.search_vectors(embedding, scope, threshold, limit)
    }

    async fn lexical_search(
        &self,
        query: &str,
        scope: &Scope,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        self.search_fts(query, scope, limit)
    }

    async fn neighbours(
        &self,
        scope: &Scope,
        document_id: &str,
        chunk_index: usize,
        window: usize,
    ) -> Result<Vec<StoredChunk>> {
        self.get_neighbour_chunks(scope, document_id, chunk_index, window)
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.get_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{Chunk, DocumentType, LineRange};
    use crate::store::SHARED_OWNER;

    fn record(owner: &str, doc: &str, idx: usize, text: &str, v: Vec<f32>) -> ChunkRecord {
        let mut chunk = Chunk::new(text, DocumentType::PlainText, LineRange::new(idx, idx))
            .with_section("Intro");
        chunk.chunk_index = idx;
        chunk.total_chunks = 3;
        chunk
            .metadata
            .insert("keywords".into(), serde_json::json!(["indexing"]));
        ChunkRecord {
            chunk: StoredChunk::from_chunk(owner, doc, format!("{doc}.md"), &chunk),
            embedding: v,
        }
    }

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[tokio::test]
    async fn test_replace_and_roundtrip() {
        let db = db();
        let records = vec![
            record("alice", "guide", 0, "Create an index on two columns.", vec![1.0, 0.0]),
            record("alice", "guide", 1, "Drop the index when unused.", vec![0.0, 1.0]),
            record("alice", "guide", 2, "Vacuum reclaims space.", vec![0.0, 0.0]),
        ];
        assert_eq!(db.replace_document("alice", "guide", records).await.unwrap(), 3);

        let chunks = db.get_document_chunks(&Scope::new("alice"), "guide").unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].section.as_deref(), Some("Intro"));
        assert_eq!(chunks[0].lines, Some(LineRange::new(0, 0)));
        assert_eq!(chunks[0].keywords(), vec!["indexing"]);

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.placeholder_embeddings, 1);

        db.replace_document(
            "alice",
            "guide",
            vec![record("alice", "guide", 0, "new", vec![1.0, 0.0])],
        )
        .await
        .unwrap();
        assert_eq!(db.stats().await.unwrap().chunks, 1);
    }

    #[tokio::test]
    async fn test_fts_scores_rise_with_relevance() {
        let db = db();
        db.replace_document(
            "alice",
            "sql",
            vec![
                record(
                    "alice",
                    "sql",
                    0,
                    "CREATE INDEX idx ON t (a, b) creates an index",
                    vec![1.0, 0.0],
                ),
                record("alice", "sql", 1, "Tables hold rows.", vec![0.0, 1.0]),
            ],
        )
        .await
        .unwrap();

        let hits = db.lexical_search("create index", &Scope::new("alice"), 10).await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].chunk.chunk_index, 0);
        assert!(hits.iter().all(|h| h.score >= 0.0 && h.score < 1.0));

        let none = db.lexical_search("the of", &Scope::new("alice"), 10).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_scope_filters_owner_and_shared() {
        let db = db();
        db.replace_document("bob", "b", vec![record("bob", "b", 0, "index notes", vec![1.0, 0.0])])
            .await
            .unwrap();
        db.replace_document(
            SHARED_OWNER,
            "s",
            vec![record(SHARED_OWNER, "s", 0, "index manual", vec![1.0, 0.0])],
        )
        .await
        .unwrap();

        let hits = db.vector_search(&[1.0, 0.0], &Scope::new("alice"), 0.5, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.owner, SHARED_OWNER);

        let private = db
            .vector_search(&[1.0, 0.0], &Scope::owner_only("alice"), 0.0, 10)
            .await
            .unwrap();
        assert!(private.is_empty());

        let docs = db.list_documents(Some("bob")).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "b.md");
    }
}
