//! Metadata enhancement for retrieval
//!
//! Three passes over an immutable chunk slice: per-chunk analysis,
//! relationship linking, then retrieval scoring.

use super::types::Chunk;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

lazy_static! {
    static ref LIST_LINE_RE: Regex = Regex::new(r"^\s*([-*+]|\d+\.)\s").unwrap();
    static ref BULLET_RE: Regex = Regex::new(r"(?m)^\s*[-*+]\s").unwrap();
    static ref MATRIX_RE: Regex = Regex::new(r"^(CO|PO|LO)\d*\s+[\d\s\-]+$").unwrap();
    static ref TECH_TERM_RE: Regex =
        Regex::new(r"(?i)\b(algorithm|implementation|architecture|framework|methodology)\b")
            .unwrap();
    static ref ACRONYM_RE: Regex = Regex::new(r"\b[A-Z]{2,}\b").unwrap();
    static ref NUMBER_RE: Regex = Regex::new(r"\d+").unwrap();
    static ref SENTENCE_SPLIT_RE: Regex = Regex::new(r"[.!?]+").unwrap();
    static ref REFERENCE_RES: Vec<Regex> = vec![
        Regex::new(r"(?i)see\s+(above|below|section|chapter)").unwrap(),
        Regex::new(r"(?i)as\s+mentioned\s+(above|below|earlier)").unwrap(),
        Regex::new(r"(?i)refer\s+to").unwrap(),
        Regex::new(r"(?i)see\s+also").unwrap(),
    ];
}

const INCOMPLETE_MARKERS: &[&str] = &[
    "However,",
    "But",
    "Although",
    "Despite",
    "Nevertheless",
    "In contrast,",
    "On the other hand,",
    "Meanwhile,",
];

/// Keyword dictionary: tag, then trigger substrings (lowercase)
const TOPIC_DICTIONARY: &[(&str, &[&str])] = &[
    ("academic", &["course", "curriculum"]),
    ("assessment", &["assessment", "grading"]),
    ("learning-outcomes", &["outcome", "objective"]),
    ("programming", &["programming", "code"]),
    ("database", &["database", "sql"]),
    ("algorithms", &["algorithm", "data structure"]),
    ("policy", &["policy", "procedure"]),
    ("requirements", &["requirement", "standard"]),
];

const MAX_RELATED: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Narrative,
    Table,
    List,
    Policy,
    Code,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Narrative => "narrative",
            ContentType::Table => "table",
            ContentType::List => "list",
            ContentType::Policy => "policy",
            ContentType::Code => "code",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derived retrieval metadata attached to a chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedMetadata {
    pub content_type: ContentType,
    /// In [0, 1]
    pub complexity: f64,
    pub topic_tags: Vec<String>,
    pub sentence_count: usize,
    pub self_contained: bool,
    pub incomplete_context: bool,
    pub contains_acronyms: bool,
    pub contains_references: bool,
    pub context_dependencies: Vec<String>,
    pub provides_context: Vec<String>,
    pub follows_from: Option<usize>,
    pub related_to: Vec<usize>,
    /// In [0, 1]
    pub retrieval_score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnhancementResult {
    pub chunks: Vec<Chunk>,
    pub relationships_found: usize,
    pub quality_issues: Vec<String>,
}

/// Summary over an enhanced collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataSummary {
    pub total_chunks: usize,
    pub content_types: BTreeMap<String, usize>,
    pub average_complexity: f64,
    pub total_topic_tags: usize,
    pub incomplete_chunks: usize,
    pub relationships: usize,
}

pub fn content_type(content: &str) -> ContentType {
    if content.matches('|').count() > 5 {
        return ContentType::Table;
    }
    if content.lines().any(|l| LIST_LINE_RE.is_match(l)) {
        return ContentType::List;
    }
    if content.contains("```") || content.contains("function") || content.contains("class") {
        return ContentType::Code;
    }
    if ["shall", "must", "required", "policy", "procedure"]
        .iter()
        .any(|w| content.contains(w))
    {
        return ContentType::Policy;
    }
    if MATRIX_RE.is_match(content) {
        return ContentType::Table;
    }
    ContentType::Narrative
}

pub fn complexity_score(content: &str) -> f64 {
    let words = content.split_whitespace().count() as f64;
    let mut score = (words / 500.0).min(0.3);
    score += TECH_TERM_RE.find_iter(content).count() as f64 * 0.1;
    score += (ACRONYM_RE.find_iter(content).count() as f64 * 0.05).min(0.2);
    score += (NUMBER_RE.find_iter(content).count() as f64 * 0.02).min(0.1);
    score += (BULLET_RE.find_iter(content).count() as f64 * 0.03).min(0.1);
    if content.contains('|') {
        score += 0.2;
    }
    score.min(1.0)
}

/// Dictionary tags followed by the three most frequent long alphabetic words
pub fn topic_tags(content: &str) -> Vec<String> {
    let lower = content.to_lowercase();
    let mut tags: Vec<String> = TOPIC_DICTIONARY
        .iter()
        .filter(|(_, triggers)| triggers.iter().any(|t| lower.contains(t)))
        .map(|(tag, _)| tag.to_string())
        .collect();

    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (pos, word) in content
        .split_whitespace()
        .filter(|w| w.len() > 4 && w.chars().all(|c| c.is_ascii_alphabetic()))
        .enumerate()
    {
        let entry = counts.entry(word.to_lowercase()).or_insert((0, pos));
        entry.0 += 1;
    }
    let mut frequent: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    // Highest count first, earliest occurrence breaks ties
    frequent.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));

    for (word, _) in frequent.into_iter().take(3) {
        if !tags.contains(&word) {
            tags.push(word);
        }
    }
    tags
}

fn is_self_contained(content: &str) -> bool {
    if content.contains("However,") && !content.contains("but") {
        return false;
    }
    if content.contains("Therefore,") && !content.contains("so") {
        return false;
    }
    if content.contains("In addition,") && content.split('\n').count() < 3 {
        return false;
    }
    !(content.contains("see above") || content.contains("as mentioned"))
}

fn has_incomplete_context(content: &str) -> bool {
    content.split('\n').count() < 5 && INCOMPLETE_MARKERS.iter().any(|m| content.contains(m))
}

fn context_dependencies(content: &str) -> Vec<String> {
    [
        ("see above", "previous-content"),
        ("as mentioned", "previous-mention"),
        ("However,", "contrasting-context"),
        ("Therefore,", "conclusion-context"),
    ]
    .iter()
    .filter(|(marker, _)| content.contains(marker))
    .map(|(_, tag)| tag.to_string())
    .collect()
}

fn provides_context(content: &str) -> Vec<String> {
    [
        ("definition", &["definition", "means"][..]),
        ("example", &["example", "for instance"][..]),
        ("procedure", &["procedure", "steps"][..]),
        ("requirement", &["requirement", "must"][..]),
    ]
    .iter()
    .filter(|(_, markers)| markers.iter().any(|m| content.contains(m)))
    .map(|(tag, _)| tag.to_string())
    .collect()
}

/// Per-chunk analysis without relationships or scoring
pub fn analyze(content: &str) -> EnhancedMetadata {
    EnhancedMetadata {
        content_type: content_type(content),
        complexity: complexity_score(content),
        topic_tags: topic_tags(content),
        sentence_count: SENTENCE_SPLIT_RE
            .split(content)
            .filter(|s| !s.trim().is_empty())
            .count(),
        self_contained: is_self_contained(content),
        incomplete_context: has_incomplete_context(content),
        contains_acronyms: ACRONYM_RE.find_iter(content).count() > 2,
        contains_references: REFERENCE_RES.iter().any(|re| re.is_match(content)),
        context_dependencies: context_dependencies(content),
        provides_context: provides_context(content),
        follows_from: None,
        related_to: Vec::new(),
        retrieval_score: 0.0,
    }
}

pub fn retrieval_score(meta: &EnhancedMetadata) -> f64 {
    let mut score: f64 = 0.5;
    if meta.self_contained {
        score += 0.2;
    }
    if meta.provides_context.iter().any(|p| p == "definition") {
        score += 0.15;
    }
    if meta.incomplete_context {
        score -= 0.1;
    }
    if meta.content_type == ContentType::Policy {
        score += 0.1;
    }
    if meta.topic_tags.len() > 3 {
        score += 0.05;
    }
    score.clamp(0.0, 1.0)
}

/// Attach `EnhancedMetadata` to every chunk
pub fn enhance_metadata(chunks: &[Chunk]) -> EnhancementResult {
    let analyzed: Vec<EnhancedMetadata> = chunks.iter().map(|c| analyze(&c.content)).collect();

    let mut enhanced = Vec::with_capacity(chunks.len());
    let mut relationships_found = 0;
    let mut quality_issues = Vec::new();

    for (i, chunk) in chunks.iter().enumerate() {
        let mut meta = analyzed[i].clone();

        if i > 0 && chunks[i - 1].section == chunk.section {
            meta.follows_from = Some(chunks[i - 1].chunk_index);
        }
        meta.related_to = analyzed
            .iter()
            .enumerate()
            .filter(|(j, other)| {
                *j != i && other.topic_tags.iter().any(|t| meta.topic_tags.contains(t))
            })
            .map(|(j, _)| chunks[j].chunk_index)
            .take(MAX_RELATED)
            .collect();
        meta.retrieval_score = retrieval_score(&meta);

        if meta.follows_from.is_some() || !meta.related_to.is_empty() {
            relationships_found += 1;
        }
        if meta.topic_tags.is_empty() {
            quality_issues.push(format!("chunk {}: no topic tags found", i));
        }
        if meta.incomplete_context {
            quality_issues.push(format!("chunk {}: has incomplete context", i));
        }
        if meta.contains_references && meta.related_to.is_empty() {
            quality_issues.push(format!(
                "chunk {}: contains references but no related chunks",
                i
            ));
        }

        let mut out = chunk.clone();
        out.enhanced = Some(meta);
        enhanced.push(out);
    }

    debug!(
        chunks = enhanced.len(),
        relationships = relationships_found,
        "enhanced chunk metadata"
    );

    EnhancementResult {
        chunks: enhanced,
        relationships_found,
        quality_issues,
    }
}

pub fn metadata_summary(chunks: &[Chunk]) -> MetadataSummary {
    let mut summary = MetadataSummary {
        total_chunks: chunks.len(),
        ..Default::default()
    };
    let mut complexity = 0.0;

    for meta in chunks.iter().filter_map(|c| c.enhanced.as_ref()) {
        *summary
            .content_types
            .entry(meta.content_type.as_str().to_string())
            .or_insert(0) += 1;
        complexity += meta.complexity;
        summary.total_topic_tags += meta.topic_tags.len();
        if meta.incomplete_context {
            summary.incomplete_chunks += 1;
        }
        summary.relationships +=
            usize::from(meta.follows_from.is_some()) + usize::from(!meta.related_to.is_empty());
    }

    if !chunks.is_empty() {
        summary.average_complexity = complexity / chunks.len() as f64;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::types::{renumber, DocumentType, LineRange};

    fn chunk(content: &str, section: &str) -> Chunk {
        Chunk::new(content, DocumentType::PlainText, LineRange::new(0, 0)).with_section(section)
    }

    #[test]
    fn test_content_type_rules() {
        assert_eq!(content_type("| a | b |\n| 1 | 2 |"), ContentType::Table);
        assert_eq!(content_type("Steps:\n- one\n- two"), ContentType::List);
        assert_eq!(content_type("```rust\nfn x() {}\n```"), ContentType::Code);
        assert_eq!(content_type("Students must attend."), ContentType::Policy);
        assert_eq!(content_type("CO1 1 2 3"), ContentType::Table);
        assert_eq!(content_type("A calm afternoon."), ContentType::Narrative);
    }

    #[test]
    fn test_complexity_is_bounded() {
        let dense = "algorithm implementation architecture framework methodology ".repeat(40)
            + "| API SDK CLI TUI GPU 1 2 3 4 5 6";
        assert_eq!(complexity_score(&dense), 1.0);
        assert!(complexity_score("short text") < 0.1);
    }

    #[test]
    fn test_topic_tags_dictionary_and_frequency() {
        let tags = topic_tags(
            "The database schema uses indexes. Indexes speed lookups of rows. Schema first.",
        );
        assert_eq!(tags[0], "database");
        assert!(tags.contains(&"schema".to_string()));
        assert!(tags.len() <= 4);
    }

    #[test]
    fn test_relationships() {
        let chunks = renumber(vec![
            chunk("Course outcomes are listed here.", "Intro"),
            chunk("More about the course structure.", "Intro"),
            chunk("Unrelated weather notes.", "Other"),
        ]);
        let result = enhance_metadata(&chunks);
        let metas: Vec<&EnhancedMetadata> =
            result.chunks.iter().map(|c| c.enhanced.as_ref().unwrap()).collect();

        assert_eq!(metas[0].follows_from, None);
        assert_eq!(metas[1].follows_from, Some(0));
        assert_eq!(metas[2].follows_from, None);
        assert!(metas[0].related_to.contains(&1));
        assert!(metas.iter().all(|m| m.related_to.len() <= MAX_RELATED));
    }

    #[test]
    fn test_retrieval_score_adjustments() {
        let meta = analyze("A policy definition: the term means a rule that staff must follow.");
        // self-contained + definition + policy
        assert!((retrieval_score(&meta) - 0.95).abs() < 1e-9);

        let weak = analyze("However, see above.");
        assert!(weak.incomplete_context);
        assert!(!weak.self_contained);
        assert!((retrieval_score(&weak) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_summary_counts_types() {
        let chunks = renumber(vec![chunk("- a\n- b", "S"), chunk("Plain prose here.", "S")]);
        let enhanced = enhance_metadata(&chunks).chunks;
        let summary = metadata_summary(&enhanced);
        assert_eq!(summary.content_types["list"], 1);
        assert_eq!(summary.content_types["narrative"], 1);
        assert_eq!(summary.relationships, 1);
    }
}
