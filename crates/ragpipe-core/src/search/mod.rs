//! Hybrid retrieval
//!
//! Provides:
//! - Query expansion and weighted keyword extraction
//! - Parallel vector + lexical search with multi-hop follow-ups
//! - Fusion, deduplication, reranking and diversification
//! - Confidence scoring and context assembly

mod engine;
mod fusion;
pub mod query;
pub mod rerank;

pub use engine::*;
pub use fusion::*;
pub use query::{expand_query, extract_keywords, QueryIntent, QueryVariant, WeightedKeyword};
pub use rerank::{adjust, detect_content_kind, rerank, ContentKind};

use crate::store::StoredChunk;
use serde::{Deserialize, Serialize};

/// How a result entered the candidate pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMethod {
    Vector,
    Keyword,
    Hybrid,
    /// Neighbour of a top result, not matched by any search
    Context,
}

impl RetrievalMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Keyword => "keyword",
            Self::Hybrid => "hybrid",
            Self::Context => "context",
        }
    }
}

impl std::fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-signal contributions to a result's score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalScores {
    /// Cosine similarity, scaled by the variant weight
    pub vector: f64,
    /// Normalized full-text relevance
    pub lexical: f64,
    /// Additive rerank boost
    pub rerank: f64,
    /// TOC penalty and narrative boost
    pub boosts: f64,
}

/// One ranked chunk, created per query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub chunk: StoredChunk,
    pub scores: SignalScores,
    /// Weighted vector + lexical score before reranking
    pub fused_score: f64,
    pub final_score: f64,
    pub method: RetrievalMethod,
}

impl RetrievalResult {
    pub fn source_id(&self) -> &str {
        &self.chunk.document_id
    }
}
