//! Mixed documents: per-run dispatch to the matching strategy

use super::table::table_line_kind;
use super::{
    is_heading, ChunkingStrategy, CodeStrategy, PlainTextStrategy, ResearchStrategy,
    TableStrategy,
};
use crate::chunking::types::{Chunk, ChunkingConfig, DocumentType, LineRange, Lines};

/// Segments the document into contiguous single-type runs
pub struct MixedStrategy;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Run {
    pub doc_type: DocumentType,
    pub range: LineRange,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LineClass {
    Heading,
    Code,
    Table,
    Text,
    Blank,
}

fn classify_lines(lines: &Lines, range: LineRange) -> Vec<LineClass> {
    let mut in_fence = false;
    (range.start..=range.end)
        .map(|i| {
            let line = lines.get(i);
            let trimmed = line.trim();
            if trimmed.starts_with("```") {
                in_fence = !in_fence;
                return LineClass::Code;
            }
            if in_fence {
                return LineClass::Code;
            }
            if trimmed.is_empty() {
                LineClass::Blank
            } else if is_heading(line) {
                LineClass::Heading
            } else if line.starts_with("    ") || line.starts_with('\t') {
                LineClass::Code
            } else if table_line_kind(line).is_some() {
                LineClass::Table
            } else {
                LineClass::Text
            }
        })
        .collect()
}

/// Contiguous runs; a heading opens a research run that absorbs following text
pub(crate) fn identify_runs(lines: &Lines, range: LineRange) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();

    for (offset, class) in classify_lines(lines, range).into_iter().enumerate() {
        let i = range.start + offset;
        let wanted = match class {
            LineClass::Heading => None,
            LineClass::Code => Some(DocumentType::Code),
            LineClass::Table => Some(DocumentType::TableCsvSql),
            LineClass::Text => match runs.last().map(|r| r.doc_type) {
                Some(DocumentType::ResearchTechnical) => Some(DocumentType::ResearchTechnical),
                _ => Some(DocumentType::PlainText),
            },
            LineClass::Blank => match runs.last_mut() {
                Some(run) => {
                    run.range.end = i;
                    continue;
                }
                None => Some(DocumentType::PlainText),
            },
        };

        match (wanted, runs.last_mut()) {
            (Some(t), Some(run)) if run.doc_type == t => run.range.end = i,
            (Some(t), _) => runs.push(Run {
                doc_type: t,
                range: LineRange::new(i, i),
            }),
            (None, _) => runs.push(Run {
                doc_type: DocumentType::ResearchTechnical,
                range: LineRange::new(i, i),
            }),
        }
    }

    runs
}

impl ChunkingStrategy for MixedStrategy {
    fn name(&self) -> &'static str {
        "mixed"
    }

    fn chunk_range(
        &self,
        lines: &Lines,
        range: LineRange,
        config: &ChunkingConfig,
        section: Option<&str>,
    ) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut current_section = section.map(str::to_string);

        for run in identify_runs(lines, range) {
            let produced = match run.doc_type {
                DocumentType::ResearchTechnical => ResearchStrategy.chunk_range(
                    lines,
                    run.range,
                    config,
                    current_section.as_deref(),
                ),
                DocumentType::Code => {
                    CodeStrategy.chunk_range(lines, run.range, config, current_section.as_deref())
                }
                DocumentType::TableCsvSql => {
                    TableStrategy.chunk_range(lines, run.range, config, current_section.as_deref())
                }
                _ => PlainTextStrategy.chunk_range(
                    lines,
                    run.range,
                    config,
                    current_section.as_deref(),
                ),
            };

            if run.doc_type == DocumentType::ResearchTechnical {
                if let Some(title) = produced.last().and_then(|c| c.section.clone()) {
                    current_section = Some(title);
                }
            }
            chunks.extend(produced);
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "Opening remarks about the project.\n# Setup\nInstall the tool first.\n\n```bash\ncargo install tool\n```\n| flag | meaning |\n| -v | verbose |\nClosing words.";

    #[test]
    fn test_identify_runs() {
        let lines = Lines::new(DOC);
        let runs = identify_runs(&lines, LineRange::new(0, lines.len() - 1));
        let types: Vec<_> = runs.iter().map(|r| r.doc_type).collect();
        assert_eq!(
            types,
            vec![
                DocumentType::PlainText,
                DocumentType::ResearchTechnical,
                DocumentType::Code,
                DocumentType::TableCsvSql,
                DocumentType::PlainText,
            ]
        );
        assert_eq!(runs[1].range, LineRange::new(1, 3));
        assert_eq!(runs[2].range, LineRange::new(4, 6));
    }

    #[test]
    fn test_mixed_dispatch_keeps_section_context() {
        let lines = Lines::new(DOC);
        let chunks = MixedStrategy.chunk_range(
            &lines,
            LineRange::new(0, lines.len() - 1),
            &ChunkingConfig::default(),
            None,
        );
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks[1].section.as_deref(), Some("# Setup"));
        assert!(chunks[2].atomic);
        assert_eq!(chunks[3].table_kind, Some(crate::chunking::types::TableKind::Markdown));
        assert_eq!(chunks[4].section.as_deref(), Some("# Setup"));
    }
}
