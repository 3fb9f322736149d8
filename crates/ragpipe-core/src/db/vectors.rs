//! Vector storage operations
//!
//! Stores embeddings as BLOBs and computes cosine similarity in Rust.

use super::chunks::{row_to_chunk, scope_params, CHUNK_COLUMNS, SCOPE_FILTER};
use super::Database;
use crate::error::Result;
use crate::llm::{cosine_similarity, is_degenerate};
use crate::store::{Scope, ScoredChunk};
use rusqlite::params;

impl Database {
    /// Rank visible chunks by cosine similarity, dropping those below `threshold`
    pub fn search_vectors(
        &self,
        embedding: &[f32],
        scope: &Scope,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if is_degenerate(embedding) {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let (owner, shared, shared_owner) = scope_params(scope);
        let sql = format!(
            "SELECT {CHUNK_COLUMNS}, c.embedding FROM chunks c
             WHERE {SCOPE_FILTER} AND c.embedding IS NOT NULL"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![owner, shared, shared_owner], |row| {
            let chunk = row_to_chunk(row)?;
            let bytes: Vec<u8> = row.get(16)?;
            Ok((chunk, bytes_to_embedding(&bytes)))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            let (chunk, stored) = row?;
            let score = cosine_similarity(embedding, &stored) as f64;
            if score >= threshold {
                hits.push(ScoredChunk { chunk, score });
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Number of chunks stored with a zero (placeholder) vector
    pub fn count_placeholder_embeddings(&self) -> Result<usize> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT embedding FROM chunks WHERE embedding IS NOT NULL")?;
        let mut count = 0;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let bytes: Vec<u8> = row.get(0)?;
            if is_degenerate(&bytes_to_embedding(&bytes)) {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Convert f32 embedding to bytes (little-endian)
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert bytes to f32 embedding
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
