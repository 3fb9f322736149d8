//! In-process chunk store

use super::{lexical_terms, ChunkRecord, ChunkStore, Scope, ScoredChunk, StoreStats, StoredChunk};
use crate::error::{RagPipeError, Result};
use crate::llm::{cosine_similarity, is_degenerate};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

/// Chunk store held entirely in memory, keyed by (owner, document)
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<BTreeMap<(String, String), Vec<ChunkRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<(String, String), Vec<ChunkRecord>>>>
    {
        self.documents
            .read()
            .map_err(|_| RagPipeError::Store("memory store lock poisoned".to_string()))
    }

    fn visible<'a>(
        docs: &'a BTreeMap<(String, String), Vec<ChunkRecord>>,
        scope: &'a Scope,
    ) -> impl Iterator<Item = &'a ChunkRecord> + 'a {
        docs.iter()
            .filter(move |((owner, _), _)| scope.allows(owner))
            .flat_map(|(_, records)| records.iter())
    }
}

/// Saturating term-frequency score over the query terms, in [0, 1)
fn term_score(content: &str, terms: &[String]) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let lower = content.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .collect();

    let total: f64 = terms
        .iter()
        .map(|term| {
            let tf = tokens.iter().filter(|t| **t == term.as_str()).count() as f64;
            tf / (tf + 1.0)
        })
        .sum();
    total / terms.len() as f64
}

fn ranked(mut hits: Vec<ScoredChunk>, limit: usize) -> Vec<ScoredChunk> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.key().cmp(&b.chunk.key()))
    });
    hits.truncate(limit);
    hits
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn replace_document(
        &self,
        owner: &str,
        document_id: &str,
        records: Vec<ChunkRecord>,
    ) -> Result<usize> {
        let count = records.len();
        let mut docs = self
            .documents
            .write()
            .map_err(|_| RagPipeError::Store("memory store lock poisoned".to_string()))?;
        docs.insert((owner.to_string(), document_id.to_string()), records);
        Ok(count)
    }

    async fn append_chunks(
        &self,
        owner: &str,
        document_id: &str,
        records: Vec<ChunkRecord>,
    ) -> Result<usize> {
        let count = records.len();
        let mut docs = self
            .documents
            .write()
            .map_err(|_| RagPipeError::Store("memory store lock poisoned".to_string()))?;
        let existing = docs
            .entry((owner.to_string(), document_id.to_string()))
            .or_default();
        for record in records {
            existing.retain(|r| r.chunk.chunk_index != record.chunk.chunk_index);
            existing.push(record);
        }
        existing.sort_by_key(|r| r.chunk.chunk_index);
        Ok(count)
    }

    async fn vector_search(
        &self,
        embedding: &[f32],
        scope: &Scope,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if is_degenerate(embedding) {
            return Ok(Vec::new());
        }
        let docs = self.read()?;
        let hits = Self::visible(&docs, scope)
            .filter_map(|r| {
                let score = cosine_similarity(embedding, &r.embedding) as f64;
                (score >= threshold).then(|| ScoredChunk {
                    chunk: r.chunk.clone(),
                    score,
                })
            })
            .collect();
        Ok(ranked(hits, limit))
    }

    async fn lexical_search(
        &self,
        query: &str,
        scope: &Scope,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let terms = lexical_terms(query);
        let docs = self.read()?;
        let hits = Self::visible(&docs, scope)
            .filter_map(|r| {
                let score = term_score(&r.chunk.content, &terms);
                (score > 0.0).then(|| ScoredChunk {
                    chunk: r.chunk.clone(),
                    score,
                })
            })
            .collect();
        Ok(ranked(hits, limit))
    }

    async fn neighbours(
        &self,
        scope: &Scope,
        document_id: &str,
        chunk_index: usize,
        window: usize,
    ) -> Result<Vec<StoredChunk>> {
        let docs = self.read()?;
        let mut out: Vec<StoredChunk> = Self::visible(&docs, scope)
            .filter(|r| {
                r.chunk.document_id == document_id
                    && r.chunk.chunk_index != chunk_index
                    && r.chunk.chunk_index.abs_diff(chunk_index) <= window
            })
            .map(|r| r.chunk.clone())
            .collect();
        out.sort_by_key(|c| c.chunk_index);
        Ok(out)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let docs = self.read()?;
        let owners: HashSet<&str> = docs.keys().map(|(o, _)| o.as_str()).collect();
        let records = docs.values().flatten();
        let (mut chunks, mut tables, mut placeholders) = (0, 0, 0);
        for r in records {
            chunks += 1;
            if r.chunk.has_table {
                tables += 1;
            }
            if is_degenerate(&r.embedding) {
                placeholders += 1;
            }
        }
        Ok(StoreStats {
            documents: docs.len(),
            chunks,
            owners: owners.len(),
            table_chunks: tables,
            placeholder_embeddings: placeholders,
        })
    }
}
