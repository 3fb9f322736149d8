//! Sliding-window chunking for unstructured prose

use super::ChunkingStrategy;
use crate::chunking::types::{Chunk, ChunkingConfig, DocumentType, LineRange, Lines};

/// Fixed window of `chunk_size` with stride `chunk_size - overlap`
pub struct PlainTextStrategy;

/// Find a valid char boundary at or before the given byte index
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Find a valid char boundary at or after the given byte index
fn ceil_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Byte window into the joined range text
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Window {
    pub start: usize,
    pub end: usize,
}

/// Cut `text` into windows, preferring a natural break in the last 30%.
///
/// Windows jointly cover every byte of `text`. A trailing window shorter
/// than `min_size` is folded into the previous window instead of being
/// dropped; the post-process pass applies the same rule to whole chunks.
pub(crate) fn sliding_windows(
    text: &str,
    size: usize,
    overlap: usize,
    min_size: usize,
) -> Vec<Window> {
    let size = size.max(1);
    let overlap = overlap.min(size - 1);

    if text.len() <= size {
        return vec![Window {
            start: 0,
            end: text.len(),
        }];
    }

    let mut windows: Vec<Window> = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let raw_end = (start + size).min(text.len());
        let end = floor_char_boundary(text, raw_end);
        let mut window_end = end;

        if end < text.len() {
            let search_start = ceil_char_boundary(text, start + size * 70 / 100);
            if search_start < end {
                let region = &text[search_start..end];
                if let Some(pos) = region.rfind("\n\n") {
                    window_end = search_start + pos + 2;
                } else if let Some(pos) = region.rfind(". ") {
                    window_end = search_start + pos + 2;
                } else if let Some(pos) = region.rfind('\n') {
                    window_end = search_start + pos + 1;
                } else if let Some(pos) = region.rfind(' ') {
                    window_end = search_start + pos + 1;
                }
            }
        }

        // Forward progress on pathological input
        if window_end <= start {
            window_end = ceil_char_boundary(text, start + 1);
        }

        let window = Window {
            start,
            end: window_end,
        };
        let is_last = window_end >= text.len();

        match windows.last_mut() {
            Some(prev) if is_last && text[window.start..window.end].trim().len() < min_size => {
                prev.end = window.end;
            }
            _ => windows.push(window),
        }

        if is_last {
            break;
        }

        let next = ceil_char_boundary(text, window_end.saturating_sub(overlap));
        start = if next > start { next } else { window_end };
    }

    windows
}

/// Maps byte offsets in joined range text back to document lines
pub(crate) struct LineIndex {
    first_line: usize,
    starts: Vec<usize>,
}

impl LineIndex {
    pub(crate) fn new(text: &str, first_line: usize) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { first_line, starts }
    }

    pub(crate) fn line_of(&self, offset: usize) -> usize {
        let local = self.starts.partition_point(|&s| s <= offset).saturating_sub(1);
        self.first_line + local
    }

    /// Line range spanned by the trimmed text of `text[start..end]`
    pub(crate) fn range_of(&self, text: &str, start: usize, end: usize) -> LineRange {
        let slice = &text[start..end];
        let lead = slice.len() - slice.trim_start().len();
        let trail = slice.len() - slice.trim_end().len();
        let s = start + lead;
        let e = end.saturating_sub(trail).max(s + 1);
        LineRange::new(self.line_of(s), self.line_of(e - 1))
    }
}

impl ChunkingStrategy for PlainTextStrategy {
    fn name(&self) -> &'static str {
        "plain_text"
    }

    fn chunk_range(
        &self,
        lines: &Lines,
        range: LineRange,
        config: &ChunkingConfig,
        section: Option<&str>,
    ) -> Vec<Chunk> {
        let text = lines.text(range.start, range.end);
        let index = LineIndex::new(&text, range.start);

        sliding_windows(&text, config.chunk_size, config.overlap, config.min_chunk_size)
            .into_iter()
            .filter_map(|w| {
                let body = text[w.start..w.end].trim();
                if body.is_empty() {
                    return None;
                }
                let mut chunk = Chunk::new(
                    body,
                    DocumentType::PlainText,
                    index.range_of(&text, w.start, w.end),
                );
                if let Some(s) = section {
                    chunk = chunk.with_section(s);
                }
                Some(chunk)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_content_single_window() {
        let w = sliding_windows("Small content.", 100, 20, 10);
        assert_eq!(w, vec![Window { start: 0, end: 14 }]);
    }

    #[test]
    fn test_windows_overlap_by_config() {
        let text = "word ".repeat(100);
        let windows = sliding_windows(&text, 100, 20, 10);
        assert!(windows.len() > 4);
        for pair in windows.windows(2) {
            assert!(pair[1].start < pair[0].end, "windows must overlap");
            assert!(pair[1].start > pair[0].start);
        }
        assert_eq!(windows.last().unwrap().end, text.len());
    }

    #[test]
    fn test_short_tail_folds_into_previous() {
        let text = format!("{}tail", "a".repeat(100));
        let windows = sliding_windows(&text, 100, 0, 50);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].end, text.len());
    }

    #[test]
    fn test_handles_unicode() {
        let text = "Hello 世界! This is a test with emoji 🎉 and special chars ─ here.".repeat(4);
        let windows = sliding_windows(&text, 20, 5, 1);
        for w in &windows {
            assert!(text.is_char_boundary(w.start));
            assert!(text.is_char_boundary(w.end));
        }
    }

    #[test]
    fn test_line_index_ranges() {
        let lines = Lines::new("alpha\nbeta\n\ngamma");
        let text = lines.text(0, 3);
        let index = LineIndex::new(&text, 10);
        assert_eq!(index.line_of(0), 10);
        assert_eq!(index.line_of(6), 11);
        assert_eq!(index.range_of(&text, 6, text.len()), LineRange::new(11, 13));
    }

    #[test]
    fn test_chunks_cover_every_line() {
        let content = (0..40)
            .map(|i| format!("Line number {} talks about something quite ordinary.", i))
            .collect::<Vec<_>>()
            .join("\n");
        let lines = Lines::new(&content);
        let config = ChunkingConfig::small();
        let chunks = PlainTextStrategy.chunk_range(
            &lines,
            LineRange::new(0, lines.len() - 1),
            &config,
            None,
        );
        let mut covered = vec![false; lines.len()];
        for c in &chunks {
            let r = c.lines.unwrap();
            for slot in covered.iter_mut().take(r.end + 1).skip(r.start) {
                *slot = true;
            }
        }
        assert!(covered.iter().all(|c| *c));
    }
}
