//! Table and matrix boundary detection
//!
//! A line scanner with two states: `Scanning` looks for a line that opens one
//! of the pattern families, `InBoundary` greedily extends the open boundary
//! while following lines continue the family or match its related-line
//! predicate. Boundaries shorter than two lines are discarded.

use super::types::{LineRange, TableKind};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

lazy_static! {
    static ref MATRIX_ROW_RE: Regex = Regex::new(r"^(CO|PO|LO)\d*\s+[\d\s\-]+$").unwrap();
    static ref MATRIX_RELATED_RE: Regex =
        Regex::new(r"(?i)^(CO|PO|LO|Course|Outcome|Program)").unwrap();
    static ref SEPARATOR_RE: Regex = Regex::new(r"^[\-=+]+$").unwrap();
    static ref GRADING_ROW_RE: Regex = Regex::new(r"^\s*\w+\s+[\d\s\-.]+$").unwrap();
    static ref ASSESSMENT_ROW_RES: Vec<Regex> = vec![
        Regex::new(r"^\s*\w+\s+[\d\s\-]+$").unwrap(),
        Regex::new(r"^\s*[A-Z]+\d*\s+[\d\s\-]+$").unwrap(),
        Regex::new(r"^\s*\w+\s+[\d\s\-.]+$").unwrap(),
    ];
    static ref CURRICULUM_ROW_RE: Regex =
        Regex::new(r"^[A-Z]{2,4}\s?\d{3,4}[A-Z]?\s+[A-Za-z].*\s\d+(\.\d+)?$").unwrap();
    static ref CURRICULUM_RELATED_RE: Regex =
        Regex::new(r"(?i)^(semester|term|year|course|code|total)\b").unwrap();
}

/// Confidence gained per consecutive family row
pub const ROW_CONFIDENCE_STEP: f64 = 0.1;
/// Confidence gained per related (header, separator) line
pub const RELATED_CONFIDENCE_STEP: f64 = 0.05;

/// Base confidence plus per-line increments, capped at 1.0
pub fn boundary_confidence(base: f64, consecutive_rows: usize, related_lines: usize) -> f64 {
    (base
        + consecutive_rows as f64 * ROW_CONFIDENCE_STEP
        + related_lines as f64 * RELATED_CONFIDENCE_STEP)
        .min(1.0)
}

/// A detected tabular line range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableBoundary {
    pub start_line: usize,
    pub end_line: usize,
    pub kind: TableKind,
    pub confidence: f64,
    pub patterns: Vec<String>,
}

impl TableBoundary {
    pub fn range(&self) -> LineRange {
        LineRange::new(self.start_line, self.end_line)
    }

    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }
}

/// One pattern family tried by the scanner
#[derive(Clone, Copy)]
pub struct PatternFamily {
    pub kind: TableKind,
    pub label: &'static str,
    pub base_confidence: f64,
    /// Does this line open a boundary?
    pub opens: fn(&str) -> bool,
    /// Does `line` continue a boundary opened by `first`?
    pub continues: fn(first: &str, line: &str) -> bool,
    /// Non-row lines that may sit inside the boundary
    pub related: fn(&str) -> bool,
}

fn numeric_tokens(line: &str) -> usize {
    line.split_whitespace()
        .filter(|w| *w == "-" || w.chars().all(|c| c.is_ascii_digit()))
        .count()
}

fn is_matrix_row(line: &str) -> bool {
    MATRIX_ROW_RE.is_match(line)
}

fn is_matrix_related(line: &str) -> bool {
    MATRIX_RELATED_RE.is_match(line) || SEPARATOR_RE.is_match(line)
}

fn is_grading_row(line: &str) -> bool {
    GRADING_ROW_RE.is_match(line) && numeric_tokens(line) >= 3
}

fn grading_continues(first: &str, line: &str) -> bool {
    let cols = first.split_whitespace().count() as i64;
    GRADING_ROW_RE.is_match(line) && (line.split_whitespace().count() as i64 - cols).abs() <= 2
}

fn is_assessment_row(line: &str) -> bool {
    ASSESSMENT_ROW_RES.iter().any(|re| re.is_match(line))
}

/// Course code, title, then a credit count: `CS101 Data Structures 4`
fn is_curriculum_row(line: &str) -> bool {
    CURRICULUM_ROW_RE.is_match(line)
}

fn is_curriculum_related(line: &str) -> bool {
    CURRICULUM_RELATED_RE.is_match(line) || SEPARATOR_RE.is_match(line)
}

fn never(_: &str) -> bool {
    false
}

/// Families in priority order
pub const FAMILIES: [PatternFamily; 4] = [
    PatternFamily {
        kind: TableKind::AcademicMatrix,
        label: "academic_matrix",
        base_confidence: 0.8,
        opens: is_matrix_row,
        continues: |_, line| is_matrix_row(line),
        related: is_matrix_related,
    },
    PatternFamily {
        kind: TableKind::Grading,
        label: "grading",
        base_confidence: 0.7,
        opens: is_grading_row,
        continues: grading_continues,
        related: never,
    },
    PatternFamily {
        kind: TableKind::Assessment,
        label: "assessment",
        base_confidence: 0.6,
        opens: is_assessment_row,
        continues: |_, line| is_assessment_row(line),
        related: never,
    },
    PatternFamily {
        kind: TableKind::Curriculum,
        label: "curriculum",
        base_confidence: 0.6,
        opens: is_curriculum_row,
        continues: |_, line| is_curriculum_row(line),
        related: is_curriculum_related,
    },
];

enum ScanState {
    /// Looking for an opening row; families before `next_family` already failed here
    Scanning { next_family: usize },
    InBoundary(OpenBoundary),
}

struct OpenBoundary {
    family: usize,
    start: usize,
    end: usize,
    rows: usize,
    related: usize,
    patterns: Vec<String>,
}

impl OpenBoundary {
    fn close(self) -> Option<TableBoundary> {
        if self.end <= self.start {
            return None;
        }
        let family = &FAMILIES[self.family];
        Some(TableBoundary {
            start_line: self.start,
            end_line: self.end,
            kind: family.kind,
            confidence: boundary_confidence(family.base_confidence, self.rows, self.related),
            patterns: self.patterns,
        })
    }
}

/// Detection pass output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub boundaries: Vec<TableBoundary>,
    pub average_confidence: f64,
}

impl DetectionResult {
    pub fn total(&self) -> usize {
        self.boundaries.len()
    }

    /// Human-readable summary lines
    pub fn report(&self) -> Vec<String> {
        let mut out = vec![
            format!("tables found: {}", self.boundaries.len()),
            format!("average confidence: {:.2}", self.average_confidence),
        ];
        for b in &self.boundaries {
            out.push(format!(
                "lines {}-{}: {} (confidence {:.2}; {})",
                b.start_line,
                b.end_line,
                b.kind.as_str(),
                b.confidence,
                b.patterns.join(", ")
            ));
        }
        out
    }
}

/// Scan all lines and return disjoint table boundaries in document order
pub fn detect_boundaries(lines: &[&str]) -> DetectionResult {
    let mut boundaries = Vec::new();
    let mut state = ScanState::Scanning { next_family: 0 };
    let mut i = 0;

    // One step past the last line so an open boundary is always closed.
    while i <= lines.len() {
        let line = lines.get(i).map(|l| l.trim()).unwrap_or("");
        state = match state {
            ScanState::Scanning { .. } if i == lines.len() => break,
            ScanState::Scanning { next_family } => {
                let opened = if line.is_empty() {
                    None
                } else {
                    (next_family..FAMILIES.len()).find(|&f| (FAMILIES[f].opens)(line))
                };
                i += 1;
                match opened {
                    Some(family) => ScanState::InBoundary(OpenBoundary {
                        family,
                        start: i - 1,
                        end: i - 1,
                        rows: 0,
                        related: 0,
                        patterns: vec![format!("{}_pattern", FAMILIES[family].label)],
                    }),
                    None => ScanState::Scanning { next_family: 0 },
                }
            }
            ScanState::InBoundary(mut open) => {
                let family = &FAMILIES[open.family];
                let first = lines[open.start].trim();
                if !line.is_empty() && (family.continues)(first, line) {
                    open.end = i;
                    open.rows += 1;
                    open.patterns
                        .push(format!("consecutive_{}_line_{}", family.label, i));
                    i += 1;
                    ScanState::InBoundary(open)
                } else if !line.is_empty() && (family.related)(line) {
                    open.end = i;
                    open.related += 1;
                    open.patterns
                        .push(format!("{}_related_line_{}", family.label, i));
                    i += 1;
                    ScanState::InBoundary(open)
                } else {
                    let (start, failed) = (open.start, open.family);
                    match open.close() {
                        Some(b) => {
                            i = b.end_line + 1;
                            boundaries.push(b);
                            ScanState::Scanning { next_family: 0 }
                        }
                        None => {
                            // Retry the opening line with lower-priority families
                            i = start;
                            ScanState::Scanning {
                                next_family: failed + 1,
                            }
                        }
                    }
                }
            }
        };
    }

    let average_confidence = if boundaries.is_empty() {
        0.0
    } else {
        boundaries.iter().map(|b| b.confidence).sum::<f64>() / boundaries.len() as f64
    };

    debug!(
        tables = boundaries.len(),
        average_confidence, "table boundary detection complete"
    );

    DetectionResult {
        boundaries,
        average_confidence,
    }
}

/// Answers split-permission queries against detected boundaries
#[derive(Debug, Clone, Default)]
pub struct BoundaryLock {
    boundaries: Vec<TableBoundary>,
}

impl BoundaryLock {
    /// Build a lock; an unlocked instance permits every split
    pub fn new(lines: &[&str], preserve_table_integrity: bool) -> Self {
        if !preserve_table_integrity {
            return Self::default();
        }
        Self {
            boundaries: detect_boundaries(lines).boundaries,
        }
    }

    pub fn from_boundaries(boundaries: Vec<TableBoundary>) -> Self {
        Self { boundaries }
    }

    pub fn boundaries(&self) -> &[TableBoundary] {
        &self.boundaries
    }

    /// False when the line lies inside a locked boundary
    pub fn can_split_at_line(&self, line: usize) -> bool {
        !self.boundaries.iter().any(|b| b.range().contains(line))
    }

    /// False when a cut between `line` and `line + 1` would fall inside a boundary
    pub fn can_cut_after(&self, line: usize) -> bool {
        !self
            .boundaries
            .iter()
            .any(|b| line >= b.start_line && line < b.end_line)
    }

    /// Boundary containing `line`, if any
    pub fn containing(&self, line: usize) -> Option<&TableBoundary> {
        self.boundaries.iter().find(|b| b.range().contains(line))
    }
}
