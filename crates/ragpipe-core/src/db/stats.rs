//! Database statistics

use super::Database;
use crate::error::Result;
use crate::store::StoreStats;
use serde::Serialize;

/// One stored document
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub owner: String,
    pub document_id: String,
    pub source: String,
    pub chunks: usize,
    pub created_at: String,
}

impl Database {
    /// Get database statistics
    pub fn get_stats(&self) -> Result<StoreStats> {
        let (documents, chunks, owners, tables) = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM (SELECT DISTINCT owner, document_id FROM chunks)),
                    COUNT(*),
                    COUNT(DISTINCT owner),
                    COALESCE(SUM(has_table), 0)
                 FROM chunks",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )?
        };

        Ok(StoreStats {
            documents: documents as usize,
            chunks: chunks as usize,
            owners: owners as usize,
            table_chunks: tables as usize,
            placeholder_embeddings: self.count_placeholder_embeddings()?,
        })
    }

    /// List stored documents, optionally for one owner
    pub fn list_documents(&self, owner: Option<&str>) -> Result<Vec<DocumentSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT owner, document_id, MIN(source), COUNT(*), MIN(created_at)
             FROM chunks
             WHERE ?1 IS NULL OR owner = ?1
             GROUP BY owner, document_id
             ORDER BY owner, document_id",
        )?;
        let docs = stmt
            .query_map([owner], |row| {
                Ok(DocumentSummary {
                    owner: row.get(0)?,
                    document_id: row.get(1)?,
                    source: row.get(2)?,
                    chunks: row.get::<_, i64>(3)? as usize,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    /// Vacuum the database
    pub fn vacuum(&self) -> Result<()> {
        self.conn()?.execute("VACUUM", [])?;
        Ok(())
    }
}
