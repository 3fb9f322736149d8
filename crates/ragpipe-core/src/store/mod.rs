//! Chunk persistence and search capability
//!
//! [`ChunkStore`] is the seam between retrieval and whatever holds chunk
//! records and their embeddings. Every write is scoped by
//! (owner, document), and every read by a [`Scope`].

mod memory;

pub use memory::MemoryStore;

use crate::chunking::{Chunk, DocumentType, LineRange, PageRange};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Owner whose documents are visible to every scope that includes shared data
pub const SHARED_OWNER: &str = "system";

/// Stop words dropped from lexical queries
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "he", "in",
    "is", "it", "its", "of", "on", "or", "that", "the", "to", "was", "will", "with", "does",
    "do", "did", "can", "could", "should", "would", "what", "where", "when", "why", "how", "who",
    "which", "this", "these", "those", "there", "here",
];

/// Visibility filter for reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub owner: String,
    pub include_shared: bool,
}

impl Scope {
    /// Owner's documents plus shared ones
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            include_shared: true,
        }
    }

    pub fn owner_only(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            include_shared: false,
        }
    }

    pub fn allows(&self, owner: &str) -> bool {
        owner == self.owner || (self.include_shared && owner == SHARED_OWNER)
    }
}

/// A persisted chunk with its ownership and positional data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub owner: String,
    pub document_id: String,
    /// Human-facing name of the source (file name, title)
    pub source: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub content: String,
    pub doc_type: DocumentType,
    pub section: Option<String>,
    pub lines: Option<LineRange>,
    pub pages: Option<PageRange>,
    pub has_table: bool,
    pub word_count: usize,
    pub hash: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl StoredChunk {
    pub fn from_chunk(
        owner: impl Into<String>,
        document_id: impl Into<String>,
        source: impl Into<String>,
        chunk: &Chunk,
    ) -> Self {
        Self {
            owner: owner.into(),
            document_id: document_id.into(),
            source: source.into(),
            chunk_index: chunk.chunk_index,
            total_chunks: chunk.total_chunks,
            content: chunk.content.clone(),
            doc_type: chunk.doc_type,
            section: chunk.section.clone(),
            lines: chunk.lines,
            pages: chunk.pages,
            has_table: chunk.has_table,
            word_count: chunk.word_count,
            hash: chunk.hash(),
            metadata: chunk.metadata.clone(),
        }
    }

    /// Structural identity used for deduplication
    pub fn key(&self) -> (String, usize) {
        (self.document_id.clone(), self.chunk_index)
    }

    /// String values stored under `metadata.keywords`
    pub fn keywords(&self) -> Vec<String> {
        match self.metadata.get("keywords") {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(serde_json::Value::String(s)) => {
                s.split(',').map(|k| k.trim().to_string()).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// A chunk and the embedding to persist with it
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub chunk: StoredChunk,
    pub embedding: Vec<f32>,
}

/// A search hit with its raw signal score in [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: StoredChunk,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub documents: usize,
    pub chunks: usize,
    pub owners: usize,
    pub table_chunks: usize,
    /// Chunks stored with a zero vector
    pub placeholder_embeddings: usize,
}

/// Persistent chunk store with vector and full-text search
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Replace every chunk of (owner, document) with `records`
    async fn replace_document(
        &self,
        owner: &str,
        document_id: &str,
        records: Vec<ChunkRecord>,
    ) -> Result<usize>;

    /// Add records to an existing (owner, document) without removing others
    async fn append_chunks(
        &self,
        owner: &str,
        document_id: &str,
        records: Vec<ChunkRecord>,
    ) -> Result<usize>;

    /// Cosine-similarity search; hits below `threshold` are excluded
    async fn vector_search(
        &self,
        embedding: &[f32],
        scope: &Scope,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>>;

    /// Full-text relevance search, scores normalized into [0, 1]
    async fn lexical_search(&self, query: &str, scope: &Scope, limit: usize)
        -> Result<Vec<ScoredChunk>>;

    /// Chunks of one document within `window` indices of `chunk_index`,
    /// excluding the chunk itself, ordered by index
    async fn neighbours(
        &self,
        scope: &Scope,
        document_id: &str,
        chunk_index: usize,
        window: usize,
    ) -> Result<Vec<StoredChunk>>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Lowercased content terms of a lexical query
pub fn lexical_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for token in query.split(|c: char| !c.is_alphanumeric() && c != '_') {
        let lower = token.to_lowercase();
        if lower.chars().count() < 2 || STOP_WORDS.contains(&lower.as_str()) {
            continue;
        }
        if !terms.contains(&lower) {
            terms.push(lower);
        }
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_visibility() {
        let scope = Scope::new("alice");
        assert!(scope.allows("alice"));
        assert!(scope.allows(SHARED_OWNER));
        assert!(!scope.allows("bob"));

        let private = Scope::owner_only("alice");
        assert!(!private.allows(SHARED_OWNER));
    }

    #[test]
    fn test_lexical_terms() {
        assert_eq!(
            lexical_terms("How do I CREATE an INDEX on (a, b)?"),
            vec!["create", "index"]
        );
        assert!(lexical_terms("the of a").is_empty());
    }

    #[test]
    fn test_keywords_from_metadata() {
        let chunk = Chunk::new("text", DocumentType::PlainText, LineRange::new(0, 0));
        let mut stored = StoredChunk::from_chunk("o", "d", "d.txt", &chunk);
        assert!(stored.keywords().is_empty());

        stored
            .metadata
            .insert("keywords".into(), serde_json::json!(["sql", "index"]));
        assert_eq!(stored.keywords(), vec!["sql", "index"]);

        stored
            .metadata
            .insert("keywords".into(), serde_json::json!("a, b"));
        assert_eq!(stored.keywords(), vec!["a", "b"]);
    }
}
