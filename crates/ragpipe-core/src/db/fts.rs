//! BM25 full-text search via FTS5

use super::chunks::{row_to_chunk, scope_params, CHUNK_COLUMNS, SCOPE_FILTER};
use super::Database;
use crate::error::Result;
use crate::store::{lexical_terms, Scope, ScoredChunk};
use rusqlite::params;

/// Build an FTS5 MATCH expression from free text
///
/// Every term is quoted so operator characters in the query cannot break
/// the syntax. Terms are OR-ed; bm25 rewards chunks matching more of them.
pub fn fts_match_expression(query: &str) -> Option<String> {
    let terms = lexical_terms(query);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t.replace('"', "")))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

impl Database {
    /// Perform BM25 full-text search
    ///
    /// FTS5 `bm25()` is negative with better matches more negative; it is
    /// mapped to `r / (1 + r)` with `r = -bm25` so scores rise with relevance
    /// and stay below 1.
    pub fn search_fts(&self, query: &str, scope: &Scope, limit: usize) -> Result<Vec<ScoredChunk>> {
        let Some(expr) = fts_match_expression(query) else {
            return Ok(Vec::new());
        };

        let conn = self.conn()?;
        let (owner, shared, shared_owner) = scope_params(scope);
        let sql = format!(
            "SELECT {CHUNK_COLUMNS}, bm25(chunks_fts, 1.0, 2.0, 1.5) AS rank
             FROM chunks_fts
             JOIN chunks c ON c.id = chunks_fts.rowid
             WHERE chunks_fts MATCH ?4 AND {SCOPE_FILTER}
             ORDER BY rank
             LIMIT ?5"
        );

        let mut stmt = conn.prepare(&sql)?;
        let hits = stmt
            .query_map(
                params![owner, shared, shared_owner, expr, limit as i64],
                |row| {
                    let rank: f64 = row.get(16)?;
                    let relevance = (-rank).max(0.0);
                    Ok(ScoredChunk {
                        chunk: row_to_chunk(row)?,
                        score: relevance / (1.0 + relevance),
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_expression_quotes_terms() {
        assert_eq!(
            fts_match_expression("CREATE INDEX (a, b)?").as_deref(),
            Some("\"create\" OR \"index\"")
        );
        assert_eq!(fts_match_expression("what is the"), None);
    }
}
