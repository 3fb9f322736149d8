//! Type-specific chunking strategies

mod code;
mod mixed;
mod plain;
mod research;
mod table;

pub use code::CodeStrategy;
pub use mixed::MixedStrategy;
pub use plain::PlainTextStrategy;
pub use research::ResearchStrategy;
pub use table::TableStrategy;

use super::boundary::BoundaryLock;
use super::types::{renumber, Chunk, ChunkingConfig, DocumentType, LineRange, Lines, TableKind};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HEADING_RE: Regex = Regex::new(r"^(#{1,6}\s+|\d+\.\s+|[A-Z][A-Z ]+$)").unwrap();
}

/// Section title used for protected table chunks
pub const TABLE_SECTION: &str = "Table/Data Structure";

/// Trait for document-type-specific chunking
pub trait ChunkingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Chunk lines `range.start..=range.end`, recording global line numbers.
    ///
    /// `section` is the title in force where the range begins. Returned
    /// chunks are not yet numbered.
    fn chunk_range(
        &self,
        lines: &Lines,
        range: LineRange,
        config: &ChunkingConfig,
        section: Option<&str>,
    ) -> Vec<Chunk>;
}

/// Enum-based strategy dispatch
pub enum Strategy {
    PlainText(PlainTextStrategy),
    Research(ResearchStrategy),
    Code(CodeStrategy),
    Table(TableStrategy),
    Mixed(MixedStrategy),
}

impl Strategy {
    pub fn for_type(doc_type: DocumentType) -> Self {
        match doc_type {
            DocumentType::PlainText => Self::PlainText(PlainTextStrategy),
            DocumentType::ResearchTechnical => Self::Research(ResearchStrategy),
            DocumentType::Code => Self::Code(CodeStrategy),
            DocumentType::TableCsvSql => Self::Table(TableStrategy),
            DocumentType::Mixed => Self::Mixed(MixedStrategy),
        }
    }

    fn inner(&self) -> &dyn ChunkingStrategy {
        match self {
            Self::PlainText(s) => s,
            Self::Research(s) => s,
            Self::Code(s) => s,
            Self::Table(s) => s,
            Self::Mixed(s) => s,
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner().name()
    }

    /// Chunk a whole document, keeping locked table ranges atomic.
    ///
    /// Indices and `total_chunks` are assigned after every chunk is known.
    pub fn chunk(&self, lines: &Lines, config: &ChunkingConfig, lock: &BoundaryLock) -> Vec<Chunk> {
        if lines.is_empty() {
            return Vec::new();
        }
        let whole = LineRange::new(0, lines.len() - 1);
        renumber(chunk_around_tables(self.inner(), lines, whole, config, lock, None))
    }
}

/// Run `strategy` on the prose between locked boundaries and emit each
/// boundary inside `range` as a single table chunk.
pub(crate) fn chunk_around_tables(
    strategy: &dyn ChunkingStrategy,
    lines: &Lines,
    range: LineRange,
    config: &ChunkingConfig,
    lock: &BoundaryLock,
    section: Option<&str>,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut cursor = range.start;
    let mut current_section = section.map(str::to_string);

    let tables = lock
        .boundaries()
        .iter()
        .filter(|b| b.start_line >= range.start && b.end_line <= range.end);

    for table in tables {
        if table.start_line > cursor {
            let prose = LineRange::new(cursor, table.start_line - 1);
            let produced = chunk_prose(strategy, lines, prose, config, current_section.as_deref());
            track_section(&produced, &mut current_section);
            chunks.extend(produced);
        }
        chunks.push(table_chunk(lines, table.range(), table.kind));
        cursor = table.end_line + 1;
    }

    if cursor <= range.end {
        let prose = LineRange::new(cursor, range.end);
        chunks.extend(chunk_prose(strategy, lines, prose, config, current_section.as_deref()));
    }

    chunks
}

fn chunk_prose(
    strategy: &dyn ChunkingStrategy,
    lines: &Lines,
    range: LineRange,
    config: &ChunkingConfig,
    section: Option<&str>,
) -> Vec<Chunk> {
    if is_blank_range(lines, range) {
        return Vec::new();
    }
    strategy.chunk_range(lines, range, config, section)
}

fn track_section(chunks: &[Chunk], current: &mut Option<String>) {
    if let Some(title) = chunks
        .iter()
        .rev()
        .filter(|c| !c.is_table())
        .find_map(|c| c.section.clone())
    {
        *current = Some(title);
    }
}

/// Atomic chunk covering a table range
pub(crate) fn table_chunk(lines: &Lines, range: LineRange, kind: TableKind) -> Chunk {
    Chunk::new(lines.text(range.start, range.end), DocumentType::TableCsvSql, range)
        .with_section(TABLE_SECTION)
        .as_table(kind)
}

pub(crate) fn is_heading(line: &str) -> bool {
    HEADING_RE.is_match(line)
}

pub(crate) fn is_blank_range(lines: &Lines, range: LineRange) -> bool {
    (range.start..=range.end).all(|i| lines.get(i).trim().is_empty())
}

/// Accumulates whole lines and flushes once `chunk_size` is reached
pub(crate) struct ProseBuffer {
    doc_type: DocumentType,
    text: String,
    start: Option<usize>,
    end: usize,
}

impl ProseBuffer {
    pub(crate) fn new(doc_type: DocumentType) -> Self {
        Self {
            doc_type,
            text: String::new(),
            start: None,
            end: 0,
        }
    }

    pub(crate) fn push(&mut self, line_no: usize, line: &str) {
        if self.start.is_none() {
            self.start = Some(line_no);
        }
        self.end = line_no;
        self.text.push_str(line);
        self.text.push('\n');
    }

    pub(crate) fn len(&self) -> usize {
        self.text.len()
    }

    /// Emit the buffered lines as a chunk if any non-blank text is present
    pub(crate) fn flush(&mut self, section: Option<&str>) -> Option<Chunk> {
        let start = self.start.take()?;
        let text = std::mem::take(&mut self.text);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        let mut chunk = Chunk::new(trimmed, self.doc_type, LineRange::new(start, self.end));
        if let Some(s) = section {
            chunk = chunk.with_section(s);
        }
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATRIX: &str = "CO4 3 3 3 1 1 - - 2 1\nCO3 2 2 3 2 1 1 - 1 1\nCO2 1 1 2 1 1 1 - 1 1\nCO1 1 1 1 1 1 1 1 1 1";

    #[test]
    fn test_heading_patterns() {
        assert!(is_heading("# Title"));
        assert!(is_heading("3. Results"));
        assert!(is_heading("INTRODUCTION"));
        assert!(!is_heading("CO4 3 3 3"));
        assert!(!is_heading("Normal sentence."));
    }

    #[test]
    fn test_tables_stay_whole_under_plain_strategy() {
        let prose = "The outcome mapping for the semester is listed below in full detail. ".repeat(8);
        let content = format!("{}\n{}\n{}", prose, MATRIX, prose);
        let lines = Lines::new(&content);
        let lock = BoundaryLock::new(lines.as_slice(), true);
        let config = ChunkingConfig::small();

        let chunks = Strategy::for_type(DocumentType::PlainText).chunk(&lines, &config, &lock);
        let tables: Vec<_> = chunks.iter().filter(|c| c.is_table()).collect();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].lines, Some(LineRange::new(1, 4)));
        assert_eq!(tables[0].content, MATRIX);
        for c in chunks.iter().filter(|c| !c.is_table()) {
            let r = c.lines.unwrap();
            assert!(r.end < 1 || r.start > 4, "prose chunk {:?} overlaps table", r);
        }
    }

    #[test]
    fn test_renumbered_after_all_chunks_known() {
        let content = format!("intro line\n{}\noutro line", MATRIX);
        let lines = Lines::new(&content);
        let lock = BoundaryLock::new(lines.as_slice(), true);
        let chunks = Strategy::for_type(DocumentType::ResearchTechnical).chunk(
            &lines,
            &ChunkingConfig::default(),
            &lock,
        );
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.total_chunks, 3);
        }
    }

    #[test]
    fn test_prose_buffer_skips_blank() {
        let mut buf = ProseBuffer::new(DocumentType::Code);
        buf.push(0, "   ");
        buf.push(1, "");
        assert!(buf.flush(None).is_none());
        buf.push(2, "let x = 1;");
        let chunk = buf.flush(Some("Setup")).unwrap();
        assert_eq!(chunk.lines, Some(LineRange::new(2, 2)));
        assert_eq!(chunk.section.as_deref(), Some("Setup"));
    }
}
