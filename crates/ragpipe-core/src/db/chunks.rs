//! Chunk row storage
//!
//! Writes are scoped by (owner, document_id): replacing a document deletes
//! only its own rows inside one transaction.

use super::vectors::embedding_to_bytes;
use super::Database;
use crate::chunking::{DocumentType, LineRange, PageRange};
use crate::error::Result;
use crate::store::{ChunkRecord, Scope, StoredChunk, SHARED_OWNER};
use chrono::Utc;
use rusqlite::{params, Row};

/// Columns selected by every chunk query, in `row_to_chunk` order
pub(crate) const CHUNK_COLUMNS: &str = "c.owner, c.document_id, c.source, c.chunk_index, \
     c.total_chunks, c.content, c.doc_type, c.section, c.line_start, c.line_end, \
     c.page_start, c.page_end, c.has_table, c.word_count, c.hash, c.metadata";

/// SQL predicate for a [`Scope`], binding owner, include_shared and the shared owner
pub(crate) const SCOPE_FILTER: &str = "(c.owner = ?1 OR (?2 AND c.owner = ?3))";

pub(crate) fn scope_params(scope: &Scope) -> (String, bool, &'static str) {
    (scope.owner.clone(), scope.include_shared, SHARED_OWNER)
}

pub(crate) fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<StoredChunk> {
    let line_start: Option<i64> = row.get(8)?;
    let line_end: Option<i64> = row.get(9)?;
    let page_start: Option<i64> = row.get(10)?;
    let page_end: Option<i64> = row.get(11)?;
    let doc_type: String = row.get(6)?;
    let metadata: String = row.get(15)?;

    Ok(StoredChunk {
        owner: row.get(0)?,
        document_id: row.get(1)?,
        source: row.get(2)?,
        chunk_index: row.get::<_, i64>(3)? as usize,
        total_chunks: row.get::<_, i64>(4)? as usize,
        content: row.get(5)?,
        doc_type: DocumentType::parse(&doc_type).unwrap_or(DocumentType::PlainText),
        section: row.get(7)?,
        lines: line_start
            .zip(line_end)
            .map(|(s, e)| LineRange::new(s as usize, e as usize)),
        pages: page_start
            .zip(page_end)
            .map(|(s, e)| PageRange::new(s as u32, e as u32)),
        has_table: row.get::<_, i64>(12)? != 0,
        word_count: row.get::<_, i64>(13)? as usize,
        hash: row.get(14)?,
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
    })
}

fn insert_records(
    tx: &rusqlite::Transaction<'_>,
    owner: &str,
    document_id: &str,
    records: &[ChunkRecord],
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let mut delete = tx.prepare(
        "DELETE FROM chunks WHERE owner = ?1 AND document_id = ?2 AND chunk_index = ?3",
    )?;
    let mut insert = tx.prepare(
        "INSERT INTO chunks (
            owner, document_id, source, chunk_index, total_chunks, content,
            doc_type, section, line_start, line_end, page_start, page_end,
            has_table, word_count, hash, metadata, embedding, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
    )?;

    for record in records {
        let c = &record.chunk;
        let metadata = serde_json::to_string(&c.metadata)?;
        // Explicit delete keeps the FTS trigger in sync on re-insert
        delete.execute(params![owner, document_id, c.chunk_index as i64])?;
        insert.execute(params![
            owner,
            document_id,
            c.source,
            c.chunk_index as i64,
            c.total_chunks as i64,
            c.content,
            c.doc_type.as_str(),
            c.section,
            c.lines.map(|l| l.start as i64),
            c.lines.map(|l| l.end as i64),
            c.pages.map(|p| p.start as i64),
            c.pages.map(|p| p.end as i64),
            c.has_table as i64,
            c.word_count as i64,
            c.hash,
            metadata,
            embedding_to_bytes(&record.embedding),
            now,
        ])?;
    }
    Ok(())
}

impl Database {
    /// Replace all chunks of (owner, document_id) in one transaction
    pub fn replace_chunks(
        &self,
        owner: &str,
        document_id: &str,
        records: &[ChunkRecord],
    ) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM chunks WHERE owner = ?1 AND document_id = ?2",
            params![owner, document_id],
        )?;
        insert_records(&tx, owner, document_id, records)?;
        tx.commit()?;
        Ok(records.len())
    }

    /// Insert chunks into an existing document, overwriting equal indices
    pub fn insert_chunks(
        &self,
        owner: &str,
        document_id: &str,
        records: &[ChunkRecord],
    ) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        insert_records(&tx, owner, document_id, records)?;
        tx.commit()?;
        Ok(records.len())
    }

    /// Delete one document's chunks, returning the number removed
    pub fn delete_document(&self, owner: &str, document_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM chunks WHERE owner = ?1 AND document_id = ?2",
            params![owner, document_id],
        )?;
        Ok(removed)
    }

    /// All chunks of a document visible in `scope`, ordered by index
    pub fn get_document_chunks(
        &self,
        scope: &Scope,
        document_id: &str,
    ) -> Result<Vec<StoredChunk>> {
        let conn = self.conn()?;
        let (owner, shared, shared_owner) = scope_params(scope);
        let sql = format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks c
             WHERE {SCOPE_FILTER} AND c.document_id = ?4
             ORDER BY c.chunk_index"
        );
        let mut stmt = conn.prepare(&sql)?;
        let chunks = stmt
            .query_map(params![owner, shared, shared_owner, document_id], row_to_chunk)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(chunks)
    }

    /// Chunks of a document within `window` indices of `chunk_index`
    pub fn get_neighbour_chunks(
        &self,
        scope: &Scope,
        document_id: &str,
        chunk_index: usize,
        window: usize,
    ) -> Result<Vec<StoredChunk>> {
        let conn = self.conn()?;
        let (owner, shared, shared_owner) = scope_params(scope);
        let lo = chunk_index.saturating_sub(window) as i64;
        let hi = chunk_index.saturating_add(window) as i64;
        let sql = format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks c
             WHERE {SCOPE_FILTER} AND c.document_id = ?4
               AND c.chunk_index BETWEEN ?5 AND ?6 AND c.chunk_index != ?7
             ORDER BY c.chunk_index"
        );
        let mut stmt = conn.prepare(&sql)?;
        let chunks = stmt
            .query_map(
                params![owner, shared, shared_owner, document_id, lo, hi, chunk_index as i64],
                row_to_chunk,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(chunks)
    }
}
