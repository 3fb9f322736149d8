//! Database schema and initialization

use crate::error::{RagPipeError, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Main database handle
pub struct Database {
    conn: Mutex<Connection>,
}

const SCHEMA_VERSION: i32 = 1;

const CREATE_TABLES: &str = r#"
-- One row per chunk, scoped by (owner, document_id)
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    document_id TEXT NOT NULL,
    source TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    total_chunks INTEGER NOT NULL,
    content TEXT NOT NULL,
    doc_type TEXT NOT NULL,
    section TEXT,
    line_start INTEGER,
    line_end INTEGER,
    page_start INTEGER,
    page_end INTEGER,
    has_table INTEGER NOT NULL DEFAULT 0,
    word_count INTEGER NOT NULL DEFAULT 0,
    hash TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    embedding BLOB,
    created_at TEXT NOT NULL,
    UNIQUE(owner, document_id, chunk_index)
);

-- Full-text index over chunk text, section titles and keywords
CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    content,
    section,
    keywords,
    tokenize='porter unicode61'
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

CREATE INDEX IF NOT EXISTS idx_chunks_scope ON chunks(owner, document_id);
CREATE INDEX IF NOT EXISTS idx_chunks_hash ON chunks(hash);
"#;

const CREATE_TRIGGERS: &str = r#"
CREATE TRIGGER IF NOT EXISTS chunks_ai
AFTER INSERT ON chunks
BEGIN
    INSERT INTO chunks_fts(rowid, content, section, keywords)
    VALUES (
        new.id,
        new.content,
        new.section,
        COALESCE(json_extract(new.metadata, '$.keywords'), '')
    );
END;

CREATE TRIGGER IF NOT EXISTS chunks_ad
AFTER DELETE ON chunks
BEGIN
    DELETE FROM chunks_fts WHERE rowid = old.id;
END;
"#;

impl Database {
    /// Open database at path, creating if necessary
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RagPipeError::Store("database connection lock poisoned".to_string()))
    }

    /// Initialize database schema
    pub fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(CREATE_TABLES)?;
        conn.execute_batch(CREATE_TRIGGERS)?;
        conn.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> Result<Option<i32>> {
        let conn = self.conn()?;
        let version = conn
            .query_row(
                "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .ok();
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_repeatable() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db.initialize().unwrap();
        assert_eq!(db.schema_version().unwrap(), Some(SCHEMA_VERSION));
    }
}
