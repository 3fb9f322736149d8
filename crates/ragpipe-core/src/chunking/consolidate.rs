//! Table fragment consolidation
//!
//! Later passes can re-fragment tabular content. This pass finds runs of
//! adjacent, untagged chunks whose lines look like table rows and joins each
//! run into one table chunk. Output chunks are tagged, so a second run is a
//! no-op.

use super::types::{renumber, Chunk, DocumentType, TableKind};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

lazy_static! {
    static ref MATRIX_ROW_RE: Regex = Regex::new(r"^(CO|PO|LO)\d*\s+[\d\s\-]+$").unwrap();
    static ref ASSESSMENT_ROW_RE: Regex = Regex::new(r"^\s*\w+\s+[\d\s\-]+$").unwrap();
    static ref GRADING_ROW_RE: Regex = Regex::new(r"^\s*\w+\s+[\d\s\-.]+$").unwrap();
}

/// Consolidation pass output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsolidationResult {
    pub chunks: Vec<Chunk>,
    pub fragments_merged: usize,
    pub tables_restored: usize,
    pub report: Vec<String>,
}

fn is_integer_or_dash(word: &str) -> bool {
    word == "-" || (!word.is_empty() && word.chars().all(|c| c.is_ascii_digit()))
}

fn row_kind(line: &str) -> Option<TableKind> {
    let trimmed = line.trim();
    let words: Vec<&str> = trimmed.split_whitespace().collect();

    if MATRIX_ROW_RE.is_match(trimmed)
        || (ASSESSMENT_ROW_RE.is_match(trimmed) && words.len() >= 4)
    {
        return Some(TableKind::AcademicMatrix);
    }

    let numeric = words.iter().filter(|w| is_integer_or_dash(w)).count();
    if GRADING_ROW_RE.is_match(trimmed) && numeric >= 3 {
        return Some(TableKind::Grading);
    }
    if words.len() >= 4 && numeric * 2 >= words.len() {
        return Some(TableKind::StructuredData);
    }
    None
}

/// Fragment family of an untagged chunk, if at least half its lines are rows
pub fn fragment_kind(chunk: &Chunk) -> Option<TableKind> {
    if chunk.is_table() || chunk.atomic {
        return None;
    }
    let lines: Vec<&str> = chunk
        .content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .collect();
    if lines.is_empty() {
        return None;
    }
    let kinds: Vec<TableKind> = lines.iter().filter_map(|l| row_kind(l)).collect();
    if kinds.len() * 2 < lines.len() {
        return None;
    }
    kinds.first().copied()
}

fn merge_group(group: &[&Chunk], kind: TableKind) -> Chunk {
    let content = group
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let first = group[0];
    let mut merged = first.clone().with_content(content).as_table(kind);
    merged.doc_type = DocumentType::TableCsvSql;
    merged.lines = group
        .iter()
        .filter_map(|c| c.lines)
        .reduce(|a, b| a.union(&b));
    merged.pages = group
        .iter()
        .filter_map(|c| c.pages)
        .reduce(|a, b| a.union(&b));
    merged.has_image = group.iter().any(|c| c.has_image);
    merged.consolidated_from = group.iter().map(|c| c.chunk_index).collect();
    merged.metadata.insert(
        "fragment_count".to_string(),
        serde_json::json!(group.len()),
    );
    merged
}

/// Join runs of two or more adjacent table fragments
pub fn consolidate_tables(chunks: &[Chunk]) -> ConsolidationResult {
    let kinds: Vec<Option<TableKind>> = chunks.iter().map(fragment_kind).collect();
    let mut result = ConsolidationResult::default();
    let mut out = Vec::with_capacity(chunks.len());
    let mut i = 0;

    while i < chunks.len() {
        let Some(kind) = kinds[i] else {
            out.push(chunks[i].clone());
            i += 1;
            continue;
        };

        let mut end = i;
        while end + 1 < chunks.len() && kinds[end + 1].is_some() {
            end += 1;
        }

        if end == i {
            out.push(chunks[i].clone());
        } else {
            let group: Vec<&Chunk> = chunks[i..=end].iter().collect();
            result.fragments_merged += group.len();
            result.tables_restored += 1;
            result.report.push(format!(
                "consolidated table from chunks {}-{}",
                chunks[i].chunk_index, chunks[end].chunk_index
            ));
            out.push(merge_group(&group, kind));
        }
        i = end + 1;
    }

    if result.tables_restored > 0 {
        debug!(
            tables = result.tables_restored,
            fragments = result.fragments_merged,
            "restored fragmented tables"
        );
    }

    result.chunks = renumber(out);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::types::LineRange;

    fn chunk(content: &str, line: usize) -> Chunk {
        Chunk::new(content, DocumentType::PlainText, LineRange::new(line, line))
    }

    fn numbered(chunks: Vec<Chunk>) -> Vec<Chunk> {
        renumber(chunks)
    }

    #[test]
    fn test_row_kinds() {
        assert_eq!(row_kind("CO4 3 3 3 1 1 - - 2 1"), Some(TableKind::AcademicMatrix));
        assert_eq!(row_kind("Final 40 35.5 20 18"), Some(TableKind::Grading));
        assert_eq!(row_kind("the quick brown fox"), None);
    }

    #[test]
    fn test_adjacent_fragments_merge() {
        let chunks = numbered(vec![
            chunk("Intro paragraph about outcomes.", 0),
            chunk("CO1 1 2 3 1", 1),
            chunk("CO2 3 2 1 1", 2),
            chunk("CO3 2 2 2 1", 3),
            chunk("Closing paragraph.", 4),
        ]);
        let result = consolidate_tables(&chunks);
        assert_eq!(result.tables_restored, 1);
        assert_eq!(result.fragments_merged, 3);
        assert_eq!(result.chunks.len(), 3);

        let table = &result.chunks[1];
        assert_eq!(table.content, "CO1 1 2 3 1\nCO2 3 2 1 1\nCO3 2 2 2 1");
        assert_eq!(table.consolidated_from, vec![1, 2, 3]);
        assert_eq!(table.lines, Some(LineRange::new(1, 3)));
        assert!(table.is_table());
        assert!(result.chunks.iter().all(|c| c.total_chunks == 3));
    }

    #[test]
    fn test_single_fragment_untouched() {
        let chunks = numbered(vec![
            chunk("prose", 0),
            chunk("CO1 1 2 3 1", 1),
            chunk("prose again", 2),
        ]);
        let result = consolidate_tables(&chunks);
        assert_eq!(result.tables_restored, 0);
        assert_eq!(result.chunks, chunks);
    }

    #[test]
    fn test_idempotent() {
        let chunks = numbered(vec![
            chunk("Alice 90 85 77", 0),
            chunk("Bob 60 70 80", 1),
            chunk("text", 2),
            chunk("CO1 1 2 3 1", 3),
            chunk("CO2 1 2 3 1", 4),
        ]);
        let first = consolidate_tables(&chunks);
        assert_eq!(first.tables_restored, 2);
        let second = consolidate_tables(&first.chunks);
        assert_eq!(second.tables_restored, 0);
        assert_eq!(second.chunks, first.chunks);
    }

    #[test]
    fn test_tagged_tables_are_skipped() {
        let chunks = numbered(vec![
            chunk("CO1 1 2 3 1", 0).as_table(TableKind::AcademicMatrix),
            chunk("CO2 1 2 3 1", 1),
        ]);
        assert_eq!(consolidate_tables(&chunks).tables_restored, 0);
    }
}
