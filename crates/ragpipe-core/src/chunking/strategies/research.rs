//! Heading-delimited chunking for research and technical documents

use super::plain::PlainTextStrategy;
use super::{is_heading, ChunkingStrategy};
use crate::chunking::types::{Chunk, ChunkingConfig, DocumentType, LineRange, Lines};

/// Title for text that precedes the first heading
pub const DEFAULT_SECTION: &str = "Introduction";

/// Splits on heading lines; oversized sections fall back to sliding windows
pub struct ResearchStrategy;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Section {
    pub title: String,
    pub range: LineRange,
}

/// Group lines of `range` into heading-led sections
pub(crate) fn split_sections(
    lines: &Lines,
    range: LineRange,
    inherited: Option<&str>,
) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();

    for i in range.start..=range.end {
        let line = lines.get(i);
        if is_heading(line) {
            sections.push(Section {
                title: line.trim().to_string(),
                range: LineRange::new(i, i),
            });
        } else if let Some(current) = sections.last_mut() {
            current.range.end = i;
        } else {
            sections.push(Section {
                title: inherited.unwrap_or(DEFAULT_SECTION).to_string(),
                range: LineRange::new(i, i),
            });
        }
    }

    sections
}

impl ChunkingStrategy for ResearchStrategy {
    fn name(&self) -> &'static str {
        "research_technical"
    }

    fn chunk_range(
        &self,
        lines: &Lines,
        range: LineRange,
        config: &ChunkingConfig,
        section: Option<&str>,
    ) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for sec in split_sections(lines, range, section) {
            let text = lines.text(sec.range.start, sec.range.end);
            let body = text.trim();
            if body.is_empty() {
                continue;
            }

            if text.len() <= config.max_chunk_size {
                chunks.push(
                    Chunk::new(body, DocumentType::ResearchTechnical, sec.range)
                        .with_section(&sec.title),
                );
                continue;
            }

            chunks.extend(
                PlainTextStrategy
                    .chunk_range(lines, sec.range, config, Some(&sec.title))
                    .into_iter()
                    .map(|mut c| {
                        c.doc_type = DocumentType::ResearchTechnical;
                        c
                    }),
            );
        }

        chunks
    }
}
