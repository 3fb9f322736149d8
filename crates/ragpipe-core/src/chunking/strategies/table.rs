//! Table, CSV and SQL chunking

use super::{table_chunk, ChunkingStrategy, ProseBuffer};
use crate::chunking::boundary::detect_boundaries;
use crate::chunking::types::{Chunk, ChunkingConfig, DocumentType, LineRange, Lines, TableKind};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PIPE_ROW_RE: Regex = Regex::new(r"\|.*\|.*\||^\s*\|.*\|").unwrap();
    static ref CSV_ROW_RE: Regex = Regex::new(r"^[^,]+,[^,]+,[^,]+").unwrap();
    static ref TSV_ROW_RE: Regex = Regex::new(r"^[^\t]+\t[^\t]+\t[^\t]+").unwrap();
    static ref SQL_START_RE: Regex =
        Regex::new(r"(?i)^\s*(CREATE|ALTER|INSERT\s+INTO|DROP|WITH|SELECT)\b").unwrap();
}

/// Tables and SQL statements become atomic chunks; prose flushes at `chunk_size`
pub struct TableStrategy;

/// Table family of a single line, outside the boundary-detector families
pub(crate) fn table_line_kind(line: &str) -> Option<TableKind> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if PIPE_ROW_RE.is_match(line) {
        return Some(TableKind::Markdown);
    }
    if CSV_ROW_RE.is_match(trimmed) || TSV_ROW_RE.is_match(line) {
        return Some(TableKind::CsvLike);
    }
    if is_structured_data(trimmed) {
        return Some(TableKind::StructuredData);
    }
    None
}

/// Three or more short tokens, at least half numeric
fn is_structured_data(line: &str) -> bool {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.len() < 3 {
        return false;
    }
    let numeric = words
        .iter()
        .filter(|w| *w == &"-" || w.parse::<f64>().is_ok())
        .count();
    let avg_len = words.iter().map(|w| w.len()).sum::<usize>() as f64 / words.len() as f64;
    numeric * 2 >= words.len() && avg_len < 10.0
}

/// Atomic regions inside `range`, sorted and disjoint
fn find_regions(lines: &Lines, range: LineRange) -> Vec<(LineRange, TableKind)> {
    let local: Vec<&str> = lines.as_slice()[range.start..=range.end].to_vec();
    let mut regions: Vec<(LineRange, TableKind)> = detect_boundaries(&local)
        .boundaries
        .into_iter()
        .map(|b| (b.range().shift(range.start), b.kind))
        .collect();

    let claimed = |i: usize, regions: &[(LineRange, TableKind)]| {
        regions.iter().any(|(r, _)| r.contains(i))
    };

    let mut i = range.start;
    while i <= range.end {
        if claimed(i, &regions) {
            i += 1;
            continue;
        }

        if SQL_START_RE.is_match(lines.get(i)) {
            let end = sql_statement_end(lines, i, range.end);
            if !(i..=end).any(|j| claimed(j, &regions)) {
                regions.push((LineRange::new(i, end), TableKind::Schema));
                i = end + 1;
                continue;
            }
        }

        if let Some(kind) = table_line_kind(lines.get(i)) {
            let mut end = i;
            while end < range.end
                && !claimed(end + 1, &regions)
                && table_line_kind(lines.get(end + 1)).is_some()
            {
                end += 1;
            }
            if end > i || kind == TableKind::Markdown {
                regions.push((LineRange::new(i, end), kind));
            }
            i = end + 1;
            continue;
        }

        i += 1;
    }

    regions.sort_by_key(|(r, _)| r.start);
    regions
}

/// Last line of a statement: the `;` terminator, or the line before a blank
fn sql_statement_end(lines: &Lines, start: usize, limit: usize) -> usize {
    for i in start..=limit {
        let line = lines.get(i).trim_end();
        if line.ends_with(';') {
            return i;
        }
        if i > start && line.trim().is_empty() {
            return i - 1;
        }
    }
    limit
}

impl ChunkingStrategy for TableStrategy {
    fn name(&self) -> &'static str {
        "table_csv_sql"
    }

    fn chunk_range(
        &self,
        lines: &Lines,
        range: LineRange,
        config: &ChunkingConfig,
        section: Option<&str>,
    ) -> Vec<Chunk> {
        let regions = find_regions(lines, range);
        let mut chunks = Vec::new();
        let mut prose = ProseBuffer::new(DocumentType::TableCsvSql);
        let mut i = range.start;

        while i <= range.end {
            if let Some((region, kind)) = regions.iter().find(|(r, _)| r.start == i) {
                chunks.extend(prose.flush(section));
                chunks.push(table_chunk(lines, *region, *kind));
                i = region.end + 1;
                continue;
            }

            prose.push(i, lines.get(i));
            if prose.len() >= config.chunk_size {
                chunks.extend(prose.flush(section));
            }
            i += 1;
        }

        chunks.extend(prose.flush(section));
        chunks
    }
}
