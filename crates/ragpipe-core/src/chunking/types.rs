//! Core types for structure-aware document chunking

use super::enhance::EnhancedMetadata;
use crate::error::{RagPipeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Document classification used to pick a chunking strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    PlainText,
    ResearchTechnical,
    Code,
    TableCsvSql,
    Mixed,
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        Self::PlainText,
        Self::ResearchTechnical,
        Self::Code,
        Self::TableCsvSql,
        Self::Mixed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "plain_text",
            Self::ResearchTechnical => "research_technical",
            Self::Code => "code",
            Self::TableCsvSql => "table_csv_sql",
            Self::Mixed => "mixed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "plain_text" | "plain" | "text" => Some(Self::PlainText),
            "research_technical" | "research" | "technical" => Some(Self::ResearchTechnical),
            "code" => Some(Self::Code),
            "table_csv_sql" | "table" | "csv" | "sql" => Some(Self::TableCsvSql),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of tabular structure a chunk was cut from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    AcademicMatrix,
    Grading,
    Assessment,
    Curriculum,
    Markdown,
    StructuredData,
    CsvLike,
    /// SQL DDL/DML statement kept whole
    Schema,
}

impl TableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AcademicMatrix => "academic_matrix",
            Self::Grading => "grading",
            Self::Assessment => "assessment",
            Self::Curriculum => "curriculum",
            Self::Markdown => "markdown",
            Self::StructuredData => "structured_data",
            Self::CsvLike => "csv_like",
            Self::Schema => "schema",
        }
    }
}

/// Inclusive, zero-based line span in the source document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, line: usize) -> bool {
        line >= self.start && line <= self.end
    }

    /// Smallest range covering both
    pub fn union(&self, other: &LineRange) -> LineRange {
        LineRange::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn shift(&self, offset: usize) -> LineRange {
        LineRange::new(self.start + offset, self.end + offset)
    }
}

/// Inclusive, one-based page span for paginated sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn union(&self, other: &PageRange) -> PageRange {
        PageRange::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// A bounded content span with positional and derived metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Canonical chunk text (never includes overlap)
    pub content: String,
    /// Strategy type tag
    pub doc_type: DocumentType,
    pub chunk_index: usize,
    pub total_chunks: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<LineRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<PageRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_kind: Option<TableKind>,
    #[serde(default)]
    pub has_table: bool,
    #[serde(default)]
    pub has_image: bool,
    pub word_count: usize,
    /// Atomic chunks (tables, fenced code) are never merged or split
    #[serde(default)]
    pub atomic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlap_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlap_after: Option<String>,
    /// Original indices when this chunk was built from several others
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consolidated_from: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced: Option<EnhancedMetadata>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Chunk {
    pub fn new(content: impl Into<String>, doc_type: DocumentType, lines: LineRange) -> Self {
        let content = content.into();
        let word_count = count_words(&content);
        Self {
            content,
            doc_type,
            chunk_index: 0,
            total_chunks: 0,
            section: None,
            lines: Some(lines),
            pages: None,
            table_kind: None,
            has_table: false,
            has_image: false,
            word_count,
            atomic: false,
            overlap_before: None,
            overlap_after: None,
            consolidated_from: Vec::new(),
            enhanced: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_pages(mut self, pages: PageRange) -> Self {
        self.pages = Some(pages);
        self
    }

    /// Mark as a protected table chunk
    pub fn as_table(mut self, kind: TableKind) -> Self {
        self.table_kind = Some(kind);
        self.has_table = true;
        self.atomic = true;
        self
    }

    pub fn as_atomic(mut self) -> Self {
        self.atomic = true;
        self
    }

    /// Replace content, keeping positional metadata
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self.word_count = count_words(&self.content);
        self
    }

    pub fn is_table(&self) -> bool {
        self.table_kind.is_some()
    }

    pub fn line_count(&self) -> usize {
        self.content.lines().count().max(1)
    }

    /// Text to embed: overlap context wrapped around the canonical content
    pub fn embedding_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(3);
        if let Some(ref before) = self.overlap_before {
            parts.push(before);
        }
        parts.push(&self.content);
        if let Some(ref after) = self.overlap_after {
            parts.push(after);
        }
        parts.join("\n")
    }

    pub fn hash(&self) -> String {
        compute_chunk_hash(&self.content, self.section.as_deref().unwrap_or(""))
    }
}

/// Assign dense indices and the shared total, returning a new collection
pub fn renumber(chunks: Vec<Chunk>) -> Vec<Chunk> {
    let total = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, mut c)| {
            c.chunk_index = i;
            c.total_chunks = total;
            c
        })
        .collect()
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Compute blake3 hash for a chunk and its section title
pub fn compute_chunk_hash(text: &str, section: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(section.as_bytes());
    hasher.update(b"\x00");
    hasher.update(text.as_bytes());
    let hash = hasher.finalize();
    hash.to_hex()[..32].to_string()
}

/// Size knobs shared by every strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    pub preserve_structure: bool,
    /// Forbid chunk boundaries inside detected table ranges
    pub preserve_table_integrity: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::general()
    }
}

impl ChunkingConfig {
    fn sized(chunk_size: usize, overlap: usize, min: usize, max: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            min_chunk_size: min,
            max_chunk_size: max,
            preserve_structure: true,
            preserve_table_integrity: true,
        }
    }

    pub fn general() -> Self {
        Self::sized(1000, 200, 100, 2000)
    }

    pub fn code() -> Self {
        Self::sized(1500, 100, 200, 3000)
    }

    pub fn research() -> Self {
        Self::sized(1200, 300, 150, 2500)
    }

    pub fn tabular() -> Self {
        Self::sized(2000, 0, 500, 5000)
    }

    pub fn small() -> Self {
        Self::sized(500, 50, 50, 1000)
    }

    /// Look up a named preset
    pub fn preset(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "general" | "default" => Ok(Self::general()),
            "code" => Ok(Self::code()),
            "research" => Ok(Self::research()),
            "tabular" | "table" => Ok(Self::tabular()),
            "small" => Ok(Self::small()),
            other => Err(RagPipeError::UnknownPreset(other.to_string())),
        }
    }

    pub fn preset_names() -> &'static [&'static str] {
        &["general", "code", "research", "tabular", "small"]
    }
}

/// Line-indexed view of a document shared by the strategies
#[derive(Debug, Clone)]
pub struct Lines<'a> {
    lines: Vec<&'a str>,
}

impl<'a> Lines<'a> {
    pub fn new(content: &'a str) -> Self {
        Self {
            lines: content.split('\n').map(|l| l.trim_end_matches('\r')).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, i: usize) -> &'a str {
        self.lines.get(i).copied().unwrap_or("")
    }

    pub fn as_slice(&self) -> &[&'a str] {
        &self.lines
    }

    /// Join lines `start..=end`
    pub fn text(&self, start: usize, end: usize) -> String {
        if start >= self.lines.len() || start > end {
            return String::new();
        }
        let end = end.min(self.lines.len() - 1);
        self.lines[start..=end].join("\n")
    }
}
