//! Document chunking
//!
//! Classification picks a strategy, the strategy cuts the document around
//! locked table ranges, and the post passes (consolidate, optimize,
//! enhance) each return a new chunk collection.

pub mod blocks;
pub mod boundary;
pub mod classify;
pub mod consolidate;
pub mod enhance;
pub mod optimize;
pub mod pipeline;
pub mod strategies;
pub mod types;

pub use blocks::{chunk_blocks, Block, BlockChunkingConfig, BlockKind, SemanticSection};
pub use boundary::{detect_boundaries, BoundaryLock, DetectionResult, TableBoundary};
pub use classify::{classify, Classification, DocumentFeatures};
pub use consolidate::{consolidate_tables, ConsolidationResult};
pub use enhance::{enhance_metadata, ContentType, EnhancedMetadata};
pub use optimize::{optimize_chunks, OptimizationConfig, OptimizationResult};
pub use pipeline::{
    chunk_document, chunk_documents, chunking_stats, validate_config, ChunkingOptions,
    ChunkingResult, ChunkingStats, Diagnostics, DocumentInput,
};
pub use strategies::{ChunkingStrategy, Strategy};
pub use types::{
    compute_chunk_hash, Chunk, ChunkingConfig, DocumentType, LineRange, PageRange, TableKind,
};
