//! Ragpipe Core Library
//!
//! Document chunking and hybrid retrieval for retrieval-augmented generation.
//!
//! # Features
//! - Structure-aware chunking that never splits detected tables
//! - Table fragment consolidation, chunk optimization, metadata enhancement
//! - SQLite FTS5 + embedding storage scoped by owner and document
//! - Hybrid vector/lexical retrieval with multi-hop expansion and reranking
//! - Confidence-scored context assembly

pub mod chunking;
pub mod config;
pub mod db;
pub mod error;
pub mod index;
pub mod llm;
pub mod search;
pub mod store;

pub use chunking::{
    chunk_document, chunk_documents, Chunk, ChunkingConfig, ChunkingOptions, ChunkingResult,
    DocumentType,
};
pub use config::{Config, EmbeddingServiceConfig, IngestConfig, RerankWeights, RetrievalConfig};
pub use db::Database;
pub use error::{Error, RagPipeError, Result};
pub use index::{DocumentRef, IngestReport, Ingestor};
pub use llm::{Embedder, HashEmbedder, HttpEmbedder};
pub use search::{
    assemble_context, retrieve, retrieve_with_retry, Confidence, ContextResponse, Retrieval,
    RetrievalEngine, RetrievalMethod, RetrievalResult, RetryPolicy, NO_CONTEXT,
};
pub use store::{ChunkStore, MemoryStore, Scope, StoredChunk, SHARED_OWNER};

/// Default config and data directory name
pub const CONFIG_DIR_NAME: &str = "ragpipe";
