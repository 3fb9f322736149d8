//! Ingestion pipeline
//!
//! File scanning, embedding with rate limiting, and scoped persistence.

mod ingest;
mod scanner;

pub use ingest::*;
pub use scanner::*;
