//! Code-aware chunking: fenced blocks stay whole

use super::{ChunkingStrategy, ProseBuffer};
use crate::chunking::types::{Chunk, ChunkingConfig, DocumentType, LineRange, Lines};

/// Fenced code blocks become atomic chunks; prose flushes at `chunk_size`
pub struct CodeStrategy;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CodeBlock {
    pub range: LineRange,
    pub language: Option<String>,
}

/// Closed ``` fences within `range`; an unclosed fence is left as prose
pub(crate) fn find_code_blocks(lines: &Lines, range: LineRange) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut open: Option<(usize, Option<String>)> = None;

    for i in range.start..=range.end {
        let trimmed = lines.get(i).trim();
        if !trimmed.starts_with("```") {
            continue;
        }
        match open.take() {
            None => {
                let lang = trimmed.trim_start_matches('`').trim();
                open = Some((i, (!lang.is_empty()).then(|| lang.to_string())));
            }
            Some((start, language)) => blocks.push(CodeBlock {
                range: LineRange::new(start, i),
                language,
            }),
        }
    }

    blocks
}

pub(crate) fn code_section_title(language: Option<&str>) -> String {
    format!("Code Block ({})", language.unwrap_or("unknown"))
}

impl ChunkingStrategy for CodeStrategy {
    fn name(&self) -> &'static str {
        "code"
    }

    fn chunk_range(
        &self,
        lines: &Lines,
        range: LineRange,
        config: &ChunkingConfig,
        section: Option<&str>,
    ) -> Vec<Chunk> {
        let blocks = find_code_blocks(lines, range);
        let mut chunks = Vec::new();
        let mut prose = ProseBuffer::new(DocumentType::Code);
        let mut i = range.start;

        while i <= range.end {
            if let Some(block) = blocks.iter().find(|b| b.range.start == i) {
                chunks.extend(prose.flush(section));
                chunks.push(
                    Chunk::new(
                        lines.text(block.range.start, block.range.end),
                        DocumentType::Code,
                        block.range,
                    )
                    .with_section(code_section_title(block.language.as_deref()))
                    .as_atomic(),
                );
                i = block.range.end + 1;
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
