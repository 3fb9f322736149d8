//! Document type classification
//!
//! Each candidate type owns a [`Scorer`]: a base constant plus an ordered
//! table of predicate rules over [`DocumentFeatures`]. Scores are capped at
//! 1.0 and the highest wins; ties keep the earlier entry in [`SCORERS`].

use super::types::DocumentType;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref HEADING_RE: Regex = Regex::new(r"(?m)^(#{1,6}\s+|\d+\.\s+|[A-Z][A-Z ]+$)").unwrap();
    static ref CODE_FENCE_RE: Regex = Regex::new(r"```[\s\S]*?```").unwrap();
    static ref INDENTED_CODE_RE: Regex = Regex::new(r"(?m)^(?: {4,}|\t+)\S").unwrap();
    static ref PIPE_TABLE_RE: Regex = Regex::new(r"(?m)\|.*\|.*\||^\s*\|.*\|").unwrap();
    static ref MATRIX_ROW_RE: Regex = Regex::new(r"(?m)^(?:CO|PO|LO)\d*\s+[\d\s\-]+$").unwrap();
    static ref MARKDOWN_RE: Regex = Regex::new(r"[*_`#\[\]()]").unwrap();
    static ref SQL_RE: Regex = Regex::new(
        r"(?i)\b(SELECT|INSERT|UPDATE|DELETE|CREATE|DROP|ALTER|FROM|WHERE|JOIN|UNION)\b"
    )
    .unwrap();
    static ref CSV_RE: Regex = Regex::new(r#"(?m)"[^"\n]*",|^[^,\n]*,[^,\n]*,[^,\n]*$"#).unwrap();
}

/// Confidence reported when a file extension decides the type outright
pub const EXTENSION_CONFIDENCE: f64 = 0.95;

const TABLE_EXTENSIONS: &[&str] = &["sql", "csv", "tsv"];
const CODE_EXTENSIONS: &[&str] = &[
    "js", "ts", "py", "java", "cpp", "c", "go", "rs", "php", "rb",
];

/// Observable characteristics used by the scorers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFeatures {
    pub has_headings: bool,
    pub has_code_blocks: bool,
    pub has_tables: bool,
    pub has_markdown: bool,
    pub has_sql: bool,
    pub has_csv: bool,
    pub average_line_length: f64,
    pub total_lines: usize,
}

impl DocumentFeatures {
    /// Extract features from raw content
    pub fn extract(content: &str) -> Self {
        let (average_line_length, total_lines) = line_stats(content);
        Self {
            has_headings: HEADING_RE.is_match(content),
            has_code_blocks: CODE_FENCE_RE.is_match(content) || INDENTED_CODE_RE.is_match(content),
            has_tables: PIPE_TABLE_RE.is_match(content) || MATRIX_ROW_RE.is_match(content),
            has_markdown: MARKDOWN_RE.is_match(content),
            has_sql: SQL_RE.is_match(content),
            has_csv: CSV_RE.is_match(content),
            average_line_length,
            total_lines,
        }
    }

    fn structural_count(&self) -> usize {
        [
            self.has_headings,
            self.has_code_blocks,
            self.has_tables,
            self.has_markdown,
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }
}

fn line_stats(content: &str) -> (f64, usize) {
    let lines: Vec<&str> = content.split('\n').collect();
    let total = lines.len();
    let chars: usize = lines.iter().map(|l| l.chars().count()).sum();
    (chars as f64 / total.max(1) as f64, total)
}

/// One additive adjustment within a scorer
#[derive(Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub weight: f64,
    pub applies: fn(&DocumentFeatures) -> bool,
}

/// Base constant plus rules for one candidate type
#[derive(Clone, Copy)]
pub struct Scorer {
    pub doc_type: DocumentType,
    pub base: f64,
    pub rules: &'static [Rule],
}

impl Scorer {
    pub fn score(&self, features: &DocumentFeatures) -> f64 {
        let raw = self
            .rules
            .iter()
            .filter(|r| (r.applies)(features))
            .fold(self.base, |acc, r| acc + r.weight);
        raw.min(1.0)
    }

    /// Names of the rules that fired
    pub fn fired(&self, features: &DocumentFeatures) -> Vec<&'static str> {
        self.rules
            .iter()
            .filter(|r| (r.applies)(features))
            .map(|r| r.name)
            .collect()
    }
}

const PLAIN_RULES: &[Rule] = &[
    Rule {
        name: "unstructured",
        weight: 0.3,
        applies: |f| !f.has_headings && !f.has_code_blocks && !f.has_tables,
    },
    Rule {
        name: "prose_line_length",
        weight: 0.2,
        applies: |f| f.average_line_length > 50.0 && f.average_line_length < 200.0,
    },
    Rule {
        name: "many_lines",
        weight: 0.1,
        applies: |f| f.total_lines > 10,
    },
];

const RESEARCH_RULES: &[Rule] = &[
    Rule {
        name: "headings",
        weight: 0.4,
        applies: |f| f.has_headings,
    },
    Rule {
        name: "markdown",
        weight: 0.2,
        applies: |f| f.has_markdown,
    },
    Rule {
        name: "long_lines",
        weight: 0.1,
        applies: |f| f.average_line_length > 30.0,
    },
    Rule {
        name: "many_lines",
        weight: 0.1,
        applies: |f| f.total_lines > 20,
    },
];

const CODE_RULES: &[Rule] = &[
    Rule {
        name: "code_blocks",
        weight: 0.4,
        applies: |f| f.has_code_blocks,
    },
    Rule {
        name: "short_lines",
        weight: 0.2,
        applies: |f| f.average_line_length < 100.0,
    },
    Rule {
        name: "several_lines",
        weight: 0.1,
        applies: |f| f.total_lines > 5,
    },
];

const TABLE_RULES: &[Rule] = &[
    Rule {
        name: "tables",
        weight: 0.4,
        applies: |f| f.has_tables,
    },
    Rule {
        name: "sql",
        weight: 0.3,
        applies: |f| f.has_sql,
    },
    Rule {
        name: "csv",
        weight: 0.3,
        applies: |f| f.has_csv,
    },
    Rule {
        name: "bounded_lines",
        weight: 0.1,
        applies: |f| f.average_line_length < 200.0,
    },
];

const MIXED_RULES: &[Rule] = &[
    Rule {
        name: "two_structures",
        weight: 0.3,
        applies: |f| f.structural_count() >= 2,
    },
    Rule {
        name: "three_structures",
        weight: 0.2,
        applies: |f| f.structural_count() >= 3,
    },
];

/// Candidate scorers in tie-break order
pub const SCORERS: [Scorer; 5] = [
    Scorer {
        doc_type: DocumentType::PlainText,
        base: 0.5,
        rules: PLAIN_RULES,
    },
    Scorer {
        doc_type: DocumentType::ResearchTechnical,
        base: 0.2,
        rules: RESEARCH_RULES,
    },
    Scorer {
        doc_type: DocumentType::Code,
        base: 0.3,
        rules: CODE_RULES,
    },
    Scorer {
        doc_type: DocumentType::TableCsvSql,
        base: 0.2,
        rules: TABLE_RULES,
    },
    Scorer {
        doc_type: DocumentType::Mixed,
        base: 0.1,
        rules: MIXED_RULES,
    },
];

/// Classifier output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub doc_type: DocumentType,
    pub confidence: f64,
    pub features: DocumentFeatures,
    /// Per-type scores in tie-break order
    pub scores: Vec<(DocumentType, f64)>,
    /// Set when the filename extension decided the type
    pub by_extension: bool,
}

/// Classify content, optionally hinted by a filename
pub fn classify(content: &str, filename: Option<&str>) -> Classification {
    if let Some(c) = filename.and_then(|f| classify_by_extension(content, f)) {
        return c;
    }

    let features = DocumentFeatures::extract(content);
    let scores: Vec<(DocumentType, f64)> = SCORERS
        .iter()
        .map(|s| (s.doc_type, s.score(&features)))
        .collect();

    let (doc_type, confidence) = scores.iter().fold(
        (DocumentType::PlainText, f64::MIN),
        |best, &(t, s)| if s > best.1 { (t, s) } else { best },
    );

    Classification {
        doc_type,
        confidence,
        features,
        scores,
        by_extension: false,
    }
}

fn extension_of(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn classify_by_extension(content: &str, filename: &str) -> Option<Classification> {
    let ext = extension_of(filename)?;
    let (average_line_length, total_lines) = line_stats(content);

    let (doc_type, features) = if TABLE_EXTENSIONS.contains(&ext.as_str()) {
        (
            DocumentType::TableCsvSql,
            DocumentFeatures {
                has_headings: false,
                has_code_blocks: false,
                has_tables: true,
                has_markdown: false,
                has_sql: ext == "sql",
                has_csv: ext == "csv" || ext == "tsv",
                average_line_length,
                total_lines,
            },
        )
    } else if CODE_EXTENSIONS.contains(&ext.as_str()) {
        (
            DocumentType::Code,
            DocumentFeatures {
                has_headings: false,
                has_code_blocks: true,
                has_tables: false,
                has_markdown: false,
                has_sql: false,
                has_csv: false,
                average_line_length,
                total_lines,
            },
        )
    } else {
        return None;
    };

    Some(Classification {
        doc_type,
        confidence: EXTENSION_CONFIDENCE,
        features,
        scores: vec![(doc_type, EXTENSION_CONFIDENCE)],
        by_extension: true,
    })
}
