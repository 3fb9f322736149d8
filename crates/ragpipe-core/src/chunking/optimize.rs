//! Chunk size optimization: merge, split, overlap
//!
//! Each pass takes a slice and returns a new collection. Atomic chunks
//! (tables, fenced code) pass through merge and split untouched.

use super::types::{renumber, Chunk, LineRange};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

lazy_static! {
    static ref SENTENCE_RE: Regex = Regex::new(r"[^.!?]+[.!?]*").unwrap();
    static ref SPLIT_HEADING_RE: Regex = Regex::new(r"^(#{1,6}\s|[A-Z][A-Z ]+$)").unwrap();
    static ref LIST_ITEM_RE: Regex = Regex::new(r"^\s*([-*+]|\d+\.)\s").unwrap();
    static ref ACRONYM_RE: Regex = Regex::new(r"\b[A-Z]{2,}\b").unwrap();
}

/// Optimizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    pub min_lines_per_chunk: usize,
    pub max_lines_per_chunk: usize,
    pub overlap_sentences: usize,
    pub preserve_semantic_boundaries: bool,
    pub enable_quality_validation: bool,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            min_lines_per_chunk: 15,
            max_lines_per_chunk: 80,
            overlap_sentences: 2,
            preserve_semantic_boundaries: true,
            enable_quality_validation: true,
        }
    }
}

/// Aggregate shape of an optimized collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetrics {
    pub average_lines: f64,
    pub size_distribution: BTreeMap<String, usize>,
    pub type_breakdown: BTreeMap<String, usize>,
}

/// Optimizer output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub chunks: Vec<Chunk>,
    pub merged: usize,
    pub split: usize,
    pub overlaps_added: usize,
    /// Advisory only; never blocks processing
    pub quality_issues: Vec<String>,
    pub metrics: ChunkMetrics,
}

fn line_count(text: &str) -> usize {
    text.split('\n').count()
}

fn join_merged(first: &Chunk, second: &Chunk) -> Chunk {
    let content = format!("{}\n\n{}", first.content, second.content);
    let mut merged = first.clone().with_content(content);
    merged.lines = match (first.lines, second.lines) {
        (Some(a), Some(b)) => Some(a.union(&b)),
        (a, b) => a.or(b),
    };
    merged.pages = match (first.pages, second.pages) {
        (Some(a), Some(b)) => Some(a.union(&b)),
        (a, b) => a.or(b),
    };
    merged.has_table |= second.has_table;
    merged.has_image |= second.has_image;
    merged
        .metadata
        .insert("merged".to_string(), serde_json::json!(true));
    merged
}

fn can_merge(a: &Chunk, b: &Chunk, config: &OptimizationConfig) -> bool {
    if a.atomic || b.atomic {
        return false;
    }
    if config.preserve_semantic_boundaries && a.section != b.section {
        return false;
    }
    line_count(&a.content) + line_count(&b.content) + 1 <= config.max_lines_per_chunk
}

/// Merge undersized chunks into an adjacent one, preferring the next chunk
pub fn merge_small_chunks(chunks: &[Chunk], config: &OptimizationConfig) -> Vec<Chunk> {
    let mut current: Vec<Chunk> = chunks.to_vec();

    loop {
        let target = (0..current.len()).find_map(|i| {
            let c = &current[i];
            if c.atomic || line_count(&c.content) >= config.min_lines_per_chunk {
                return None;
            }
            if i + 1 < current.len() && can_merge(c, &current[i + 1], config) {
                return Some((i, i + 1));
            }
            if i > 0 && can_merge(&current[i - 1], c, config) {
                return Some((i - 1, i));
            }
            None
        });

        let Some((a, b)) = target else { break };
        let merged = join_merged(&current[a], &current[b]);
        let mut next = Vec::with_capacity(current.len() - 1);
        next.extend_from_slice(&current[..a]);
        next.push(merged);
        next.extend_from_slice(&current[b + 1..]);
        current = next;
    }

    current
}

/// Offsets where a split may start a new piece
fn logical_split_points(lines: &[&str]) -> Vec<usize> {
    let mut points = Vec::new();
    for (i, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        let prev_is_list = i > 0 && LIST_ITEM_RE.is_match(lines[i - 1]);
        if line.is_empty()
            || SPLIT_HEADING_RE.is_match(line)
            || (LIST_ITEM_RE.is_match(raw) && i > 0 && !prev_is_list)
        {
            points.push(i);
        }
    }
    points
}

/// Piece boundaries (exclusive ends) for an oversized chunk
///
/// Pieces are balanced: `ceil(n / max)` of them, each cut at the latest
/// logical boundary that keeps it within `[min, target]` and leaves a
/// remainder the later pieces can hold.
fn split_offsets(lines: &[&str], min_lines: usize, max_lines: usize) -> Vec<usize> {
    let points = logical_split_points(lines);
    let total = lines.len();
    let pieces = total.div_ceil(max_lines);
    let mut ends = Vec::with_capacity(pieces);
    let mut start = 0;

    for remaining in (2..=pieces).rev() {
        let left = total - start;
        let target = left.div_ceil(remaining);
        let lowest = (target / 2)
            .max(min_lines)
            .max(left.saturating_sub((remaining - 1) * max_lines))
            .clamp(1, target);
        let cut = points
            .iter()
            .copied()
            .filter(|&p| p >= start + lowest && p <= start + target)
            .max()
            .unwrap_or(start + target);
        ends.push(cut);
        start = cut;
    }
    ends.push(total);
    ends
}

fn map_line(range: LineRange, offset: usize, total: usize) -> usize {
    if total <= 1 {
        return range.start;
    }
    range.start + offset * (range.len() - 1) / (total - 1)
}

/// Split chunks above `max_lines_per_chunk` at the nearest logical boundary
pub fn split_oversized_chunks(chunks: &[Chunk], config: &OptimizationConfig) -> Vec<Chunk> {
    let mut out = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        let lines: Vec<&str> = chunk.content.split('\n').collect();
        if chunk.atomic || lines.len() <= config.max_lines_per_chunk {
            out.push(chunk.clone());
            continue;
        }

        let max_lines = config.max_lines_per_chunk.max(1);
        let ends = split_offsets(&lines, config.min_lines_per_chunk.min(max_lines), max_lines);
        let mut start = 0;
        for (piece_no, end) in ends.iter().copied().enumerate() {
            let text = lines[start..end].join("\n");
            let mut piece = chunk.clone().with_content(text.trim_matches('\n').to_string());
            piece.lines = chunk.lines.map(|r| {
                LineRange::new(
                    map_line(r, start, lines.len()),
                    map_line(r, end - 1, lines.len()),
                )
            });
            piece.metadata.insert(
                "split_from".to_string(),
                serde_json::json!(chunk.chunk_index),
            );
            piece
                .metadata
                .insert("split_index".to_string(), serde_json::json!(piece_no));
            if !piece.content.trim().is_empty() {
                out.push(piece);
            }
            start = end;
        }
    }

    out
}

/// Sentences with their terminators, trimmed
pub fn extract_sentences(text: &str) -> Vec<String> {
    SENTENCE_RE
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| s.chars().any(|c| c.is_alphanumeric()))
        .collect()
}

/// Attach neighbouring sentences as overlap context
pub fn add_overlap(chunks: &[Chunk], config: &OptimizationConfig) -> Vec<Chunk> {
    let n = config.overlap_sentences;
    if n == 0 {
        return chunks.to_vec();
    }

    let sentences: Vec<Vec<String>> = chunks
        .iter()
        .map(|c| {
            if c.atomic {
                Vec::new()
            } else {
                extract_sentences(&c.content)
            }
        })
        .collect();

    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut c = chunk.clone();
            if c.atomic {
                return c;
            }
            if i > 0 {
                let prev = &sentences[i - 1];
                let tail = &prev[prev.len().saturating_sub(n)..];
                if !tail.is_empty() {
                    c.overlap_before = Some(tail.join(" "));
                }
            }
            if let Some(next) = sentences.get(i + 1) {
                let head = &next[..next.len().min(n)];
                if !head.is_empty() {
                    c.overlap_after = Some(head.join(" "));
                }
            }
            c
        })
        .collect()
}

/// Advisory quality findings
pub fn validate_quality(chunks: &[Chunk]) -> Vec<String> {
    let mut issues = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let content = &chunk.content;
        let lines = line_count(content);

        if content.contains("see above") || content.contains("as mentioned") {
            issues.push(format!("chunk {}: contains orphaned reference", i));
        }
        if content.contains("However,") && !content.contains("but") {
            issues.push(format!("chunk {}: may have incomplete context", i));
        }
        if ACRONYM_RE.find_iter(content).count() > 3 {
            issues.push(format!("chunk {}: many acronyms without definitions", i));
        }
        if lines < 5 {
            issues.push(format!("chunk {}: very short chunk ({} lines)", i, lines));
        }
        if lines > 100 {
            issues.push(format!("chunk {}: very long chunk ({} lines)", i, lines));
        }
    }
    issues
}

pub fn chunk_metrics(chunks: &[Chunk]) -> ChunkMetrics {
    let counts: Vec<usize> = chunks.iter().map(|c| line_count(&c.content)).collect();
    let average_lines = if counts.is_empty() {
        0.0
    } else {
        counts.iter().sum::<usize>() as f64 / counts.len() as f64
    };

    let buckets: [(&str, fn(usize) -> bool); 5] = [
        ("1-10 lines", |n| n <= 10),
        ("11-25 lines", |n| (11..=25).contains(&n)),
        ("26-50 lines", |n| (26..=50).contains(&n)),
        ("51-100 lines", |n| (51..=100).contains(&n)),
        ("100+ lines", |n| n > 100),
    ];
    let size_distribution = buckets
        .iter()
        .map(|(label, test)| (label.to_string(), counts.iter().filter(|n| test(**n)).count()))
        .collect();

    let mut type_breakdown = BTreeMap::new();
    for c in chunks {
        *type_breakdown.entry(c.doc_type.as_str().to_string()).or_insert(0) += 1;
    }

    ChunkMetrics {
        average_lines,
        size_distribution,
        type_breakdown,
    }
}

/// Run merge, split and overlap in order
pub fn optimize_chunks(chunks: &[Chunk], config: &OptimizationConfig) -> OptimizationResult {
    let merged = merge_small_chunks(chunks, config);
    let split = split_oversized_chunks(&merged, config);
    let overlapped = renumber(add_overlap(&split, config));

    let quality_issues = if config.enable_quality_validation {
        validate_quality(&overlapped)
    } else {
        Vec::new()
    };

    let result = OptimizationResult {
        merged: chunks.len().saturating_sub(merged.len()),
        split: split.len().saturating_sub(merged.len()),
        overlaps_added: overlapped
            .iter()
            .filter(|c| c.overlap_before.is_some() || c.overlap_after.is_some())
            .count(),
        quality_issues,
        metrics: chunk_metrics(&overlapped),
        chunks: overlapped,
    };

    debug!(
        merged = result.merged,
        split = result.split,
        overlaps = result.overlaps_added,
        "optimized chunks"
    );

    result
}
