//! Adaptive chunking over structural-parser blocks
//!
//! Input comes from a layout parser (typically PDF): one record per text
//! block with its page, bounding box and font information. Sections are
//! detected from heading patterns and font size, then each section is
//! chunked on an estimated token budget. Table blocks are kept whole.

use super::types::{renumber, Chunk, DocumentType, LineRange, PageRange, TableKind};
use crate::error::{RagPipeError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

lazy_static! {
    static ref HEADING_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)^(Chapter|Section|Part)\s+\d+").unwrap(),
        Regex::new(r"^\d+\.\s+[A-Z]").unwrap(),
        Regex::new(r"^[A-Z][A-Z\s]+$").unwrap(),
        Regex::new(
            r"(?i)^(Introduction|Conclusion|Abstract|References|Appendix|Methodology|Results|Discussion)"
        )
        .unwrap(),
    ];
    static ref LIST_RE: Regex = Regex::new(r"^\s*(\d+|[a-zA-Z])\.\s").unwrap();
    static ref FOOTER_RE: Regex = Regex::new(r"(?i)page\s+\d+").unwrap();
    static ref MATRIX_RE: Regex = Regex::new(r"^(CO|PO|LO)\d*\s+[\d\s\-]+$").unwrap();
    static ref GRADING_RE: Regex = Regex::new(r"^\s*\w+\s+[\d\s\-.]+$").unwrap();
    static ref CSV_RE: Regex = Regex::new(r"^[^,]+,[^,]+,[^,]+").unwrap();
    static ref TSV_RE: Regex = Regex::new(r"^[^\t]+\t[^\t]+\t[^\t]+").unwrap();
    static ref NUMBERING_RE: Regex = Regex::new(r"^\d+\.\s*").unwrap();
    static ref PREFIX_RE: Regex = Regex::new(r"(?i)^(Chapter|Section|Part)\s+\d+\s*").unwrap();
}

const BOLD_FLAG: u32 = 16;
const DEFAULT_FONT_SIZE: f32 = 12.0;
const MAX_TITLE_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Heading,
    Paragraph,
    List,
    Table,
    Footer,
}

/// One text block from the structural parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub text: String,
    pub page: u32,
    #[serde(default)]
    pub block_index: usize,
    /// `[x0, y0, x1, y1]`
    #[serde(default)]
    pub bbox: [f32; 4],
    #[serde(default)]
    pub font_size: Option<f32>,
    #[serde(default)]
    pub font_flags: u32,
}

impl Block {
    pub fn new(text: impl Into<String>, page: u32) -> Self {
        Self {
            text: text.into(),
            page,
            block_index: 0,
            bbox: [0.0; 4],
            font_size: None,
            font_flags: 0,
        }
    }

    pub fn with_font(mut self, size: f32, flags: u32) -> Self {
        self.font_size = Some(size);
        self.font_flags = flags;
        self
    }

    pub fn is_bold(&self) -> bool {
        self.font_flags & BOLD_FLAG != 0
    }

    pub fn kind(&self) -> BlockKind {
        classify_block(&self.text, self.font_size, self.font_flags)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionType {
    Abstract,
    References,
    Appendix,
    Chapter,
    Section,
}

/// A titled run of blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticSection {
    pub title: String,
    pub level: u8,
    pub start_block: usize,
    pub end_block: usize,
    pub pages: PageRange,
    pub section_type: SectionType,
}

/// Token budgets for block chunking (tokens estimated as chars / 4)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockChunkingConfig {
    pub target_tokens: usize,
    pub max_tokens: usize,
    pub min_tokens: usize,
    pub overlap_ratio: f64,
    pub preserve_table_integrity: bool,
    pub headings_by_font: bool,
    pub headings_by_pattern: bool,
}

impl Default for BlockChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: 1200,
            max_tokens: 2000,
            min_tokens: 400,
            overlap_ratio: 0.25,
            preserve_table_integrity: true,
            headings_by_font: true,
            headings_by_pattern: true,
        }
    }
}

impl BlockChunkingConfig {
    /// Larger budgets for academic material with wide tables
    pub fn academic() -> Self {
        Self {
            target_tokens: 1500,
            max_tokens: 2500,
            min_tokens: 500,
            overlap_ratio: 0.30,
            ..Self::default()
        }
    }
}

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

fn is_table_text(text: &str) -> bool {
    if text.matches('|').count() >= 2 {
        return true;
    }
    if MATRIX_RE.is_match(text) || GRADING_RE.is_match(text) {
        return true;
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() >= 3 {
        let numeric = words
            .iter()
            .filter(|w| **w == "-" || w.chars().all(|c| c.is_ascii_digit()))
            .count();
        let avg_len = words.iter().map(|w| w.len()).sum::<usize>() as f64 / words.len() as f64;
        if numeric * 2 >= words.len() && avg_len < 10.0 {
            return true;
        }
    }
    CSV_RE.is_match(text) || TSV_RE.is_match(text)
}

pub fn classify_block(text: &str, font_size: Option<f32>, font_flags: u32) -> BlockKind {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return BlockKind::Paragraph;
    }
    if trimmed.chars().count() < 50 && FOOTER_RE.is_match(trimmed) {
        return BlockKind::Footer;
    }
    if is_table_text(trimmed) {
        return BlockKind::Table;
    }
    if LIST_RE.is_match(trimmed) {
        return BlockKind::List;
    }
    if font_size.is_some_and(|s| s > 14.0) {
        return BlockKind::Heading;
    }
    if font_flags & BOLD_FLAG != 0 && trimmed.chars().count() < 100 {
        return BlockKind::Heading;
    }
    BlockKind::Paragraph
}

fn average_font_size(blocks: &[Block]) -> f32 {
    let sizes: Vec<f32> = blocks.iter().filter_map(|b| b.font_size).collect();
    if sizes.is_empty() {
        DEFAULT_FONT_SIZE
    } else {
        sizes.iter().sum::<f32>() / sizes.len() as f32
    }
}

fn is_heading(block: &Block, avg_font: f32, config: &BlockChunkingConfig) -> bool {
    let text = block.text.trim();
    if text.is_empty() || text.chars().count() > 200 {
        return false;
    }
    if config.headings_by_pattern && HEADING_PATTERNS.iter().any(|re| re.is_match(text)) {
        return true;
    }
    if config.headings_by_font {
        if block.font_size.is_some_and(|s| s > avg_font * 1.2) {
            return true;
        }
        if block.is_bold() && text.chars().count() < 100 {
            return true;
        }
    }
    false
}

/// Level 1 above 1.5x the average font size, 2 above 1.2x, else 3
pub fn heading_level(font_size: Option<f32>, avg_font: f32) -> u8 {
    let size = font_size.unwrap_or(DEFAULT_FONT_SIZE);
    if size > avg_font * 1.5 {
        1
    } else if size > avg_font * 1.2 {
        2
    } else {
        3
    }
}

pub fn section_type(title: &str) -> SectionType {
    let lower = title.to_lowercase();
    if lower.contains("abstract") {
        SectionType::Abstract
    } else if lower.contains("reference") || lower.contains("bibliography") {
        SectionType::References
    } else if lower.contains("appendix") {
        SectionType::Appendix
    } else if lower.contains("chapter") {
        SectionType::Chapter
    } else {
        SectionType::Section
    }
}

fn clean_title(text: &str) -> String {
    let stripped = NUMBERING_RE.replace(text.trim(), "");
    let stripped = PREFIX_RE.replace(&stripped, "");
    stripped.chars().take(MAX_TITLE_CHARS).collect()
}

/// Split blocks into sections at detected headings
pub fn detect_sections(blocks: &[Block], config: &BlockChunkingConfig) -> Vec<SemanticSection> {
    if blocks.is_empty() {
        return Vec::new();
    }
    let avg_font = average_font_size(blocks);
    let mut sections = Vec::new();
    let mut current = SemanticSection {
        title: "Introduction".to_string(),
        level: 1,
        start_block: 0,
        end_block: 0,
        pages: PageRange::new(blocks[0].page, blocks[0].page),
        section_type: SectionType::Section,
    };

    for (i, block) in blocks.iter().enumerate().skip(1) {
        if !is_heading(block, avg_font, config) {
            continue;
        }
        current.end_block = i - 1;
        current.pages.end = blocks[i - 1].page;
        sections.push(current);

        current = SemanticSection {
            title: clean_title(&block.text),
            level: heading_level(block.font_size, avg_font),
            start_block: i,
            end_block: i,
            pages: PageRange::new(block.page, block.page),
            section_type: section_type(&block.text),
        };
    }

    current.end_block = blocks.len() - 1;
    current.pages.end = blocks[blocks.len() - 1].page;
    sections.push(current);
    sections
}

/// Trailing blocks worth about `target` tokens, with 50% tolerance
fn overlap_tail(blocks: &[Block], target: usize) -> Vec<Block> {
    let mut tail = Vec::new();
    let mut tokens = 0;
    for block in blocks.iter().rev() {
        if tokens >= target {
            break;
        }
        let t = estimate_tokens(&block.text);
        if (tokens + t) as f64 > target as f64 * 1.5 {
            break;
        }
        tail.insert(0, block.clone());
        tokens += t;
    }
    tail
}

fn joined_tokens(blocks: &[Block]) -> usize {
    estimate_tokens(&join_text(blocks))
}

fn join_text(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(|b| b.text.trim())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

fn block_chunk(blocks: &[Block], section: &SemanticSection) -> Chunk {
    let first = &blocks[0];
    let last = &blocks[blocks.len() - 1];
    let mut chunk = Chunk::new(
        join_text(blocks),
        DocumentType::ResearchTechnical,
        LineRange::new(0, 0),
    )
    .with_section(section.title.clone())
    .with_pages(PageRange::new(first.page, last.page));
    chunk.lines = None;
    chunk.has_table = blocks.iter().any(|b| b.kind() == BlockKind::Table);
    chunk
        .metadata
        .insert("block_start".to_string(), serde_json::json!(first.block_index));
    chunk
        .metadata
        .insert("block_end".to_string(), serde_json::json!(last.block_index));
    chunk
        .metadata
        .insert("section_level".to_string(), serde_json::json!(section.level));
    chunk
}

fn chunk_section(
    blocks: &[Block],
    section: &SemanticSection,
    config: &BlockChunkingConfig,
) -> Vec<Chunk> {
    let overlap = (config.target_tokens as f64 * config.overlap_ratio) as usize;
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current: Vec<Block> = Vec::new();
    let mut tokens = 0;

    for block in blocks {
        if config.preserve_table_integrity && block.kind() == BlockKind::Table {
            if !current.is_empty() {
                chunks.push(block_chunk(&current, section));
                current.clear();
                tokens = 0;
            }
            let table = block_chunk(std::slice::from_ref(block), section)
                .as_table(TableKind::StructuredData);
            chunks.push(table);
            continue;
        }

        let block_tokens = estimate_tokens(&block.text);
        if tokens + block_tokens > config.max_tokens && !current.is_empty() {
            chunks.push(block_chunk(&current, section));
            current = overlap_tail(&current, overlap);
            current.push(block.clone());
            tokens = joined_tokens(&current);
        } else {
            current.push(block.clone());
            tokens += block_tokens;
        }

        if tokens >= config.target_tokens {
            chunks.push(block_chunk(&current, section));
            current = overlap_tail(&current, overlap);
            tokens = joined_tokens(&current);
        }
    }

    if current.is_empty() {
        return chunks;
    }
    if joined_tokens(&current) >= config.min_tokens {
        chunks.push(block_chunk(&current, section));
        return chunks;
    }

    // Fold a short remainder into the previous prose chunk
    match chunks.last_mut() {
        Some(last) if !last.atomic => {
            let tail = &current[current.len() - 1];
            let content = format!("{} {}", last.content, join_text(&current));
            *last = last.clone().with_content(content);
            if let Some(pages) = last.pages.as_mut() {
                pages.end = pages.end.max(tail.page);
            }
            last.metadata
                .insert("block_end".to_string(), serde_json::json!(tail.block_index));
        }
        Some(_) => {
            debug!(section = %section.title, "short remainder follows a table");
            chunks.push(block_chunk(&current, section));
        }
        None => chunks.push(block_chunk(&current, section)),
    }
    chunks
}

/// Chunk parser blocks section by section
pub fn chunk_blocks(blocks: &[Block], config: &BlockChunkingConfig) -> Result<Vec<Chunk>> {
    let blocks: Vec<Block> = blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| !b.text.trim().is_empty())
        .map(|(i, b)| Block {
            text: b.text.trim().to_string(),
            block_index: i,
            ..b.clone()
        })
        .collect();

    if blocks.is_empty() {
        return Err(RagPipeError::NoBlocks);
    }

    let sections = detect_sections(&blocks, config);
    let mut chunks = Vec::new();
    for section in &sections {
        chunks.extend(chunk_section(
            &blocks[section.start_block..=section.end_block],
            section,
            config,
        ));
    }

    info!(
        blocks = blocks.len(),
        sections = sections.len(),
        chunks = chunks.len(),
        "chunked parser blocks"
    );
    Ok(renumber(chunks))
}
