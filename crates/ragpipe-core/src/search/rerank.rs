//! Second-pass scoring: rerank signals, TOC penalty and narrative boost

use super::query::{command_mentions, detect_intent, extract_keywords, keyword_tokens, QueryIntent};
use super::{RetrievalMethod, RetrievalResult};
use crate::config::RerankWeights;
use crate::store::{lexical_terms, StoredChunk};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Minimum word count for a chunk to read as narrative
pub const NARRATIVE_MIN_WORDS: usize = 40;

lazy_static! {
    static ref SQL_EXAMPLE: Vec<Regex> = vec![
        Regex::new(r"(?i)\bSELECT\b[\s\S]+?\bFROM\b").unwrap(),
        Regex::new(
            r"(?i)\bCREATE\s+(?:UNIQUE\s+)?(?:TABLE|INDEX|VIEW|FUNCTION|TRIGGER|PROCEDURE)\b"
        )
        .unwrap(),
        Regex::new(r"(?i)\bINSERT\s+INTO\b").unwrap(),
        Regex::new(r"(?i)\bUPDATE\s+\w+\s+SET\b").unwrap(),
        Regex::new(r"(?i)\bDELETE\s+FROM\b").unwrap(),
        Regex::new(r"(?i)\bALTER\s+TABLE\b").unwrap(),
        Regex::new(r"(?i)\bDROP\s+(?:TABLE|INDEX|VIEW)\b").unwrap(),
    ];
    static ref MARKDOWN_TABLE: Regex = Regex::new(r"\|.*\|.*\n.*---").unwrap();
    static ref WARNING_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\b(note|caution|warning|important|tip|hint)\s*:").unwrap(),
        Regex::new(r"(?i)\b(deprecated|obsolete|legacy|removed)\s*:").unwrap(),
        Regex::new(r"(?i)\b(security|permission|privilege|access)\s*:").unwrap(),
    ];
    static ref REFERENCE_SECTION: Regex = Regex::new(
        r"(?i)^\s*(references|bibliography|see also|further reading|index|appendix)"
    )
    .unwrap();
    static ref CITATION: Regex = Regex::new(r"(?i)\bet al\.|\bdoi:|\bISBN\b|\[\d+\]").unwrap();
    static ref IMPORTANT_SECTION: Regex = Regex::new(
        r"(?i)\b(overview|introduction|summary|definition|syntax|usage|examples?|description|conclusion)\b"
    ).unwrap();
    static ref DOTTED_LEADER: Regex = Regex::new(r"(?:\.{3,}|…+)\s*\d+\s*$").unwrap();
    static ref HEADING_PAGE: Regex =
        Regex::new(r"^\s*(?:\d+(?:\.\d+)*\s+)?[A-Za-z][^.!?|]{0,60}?\s+\d{1,4}\s*$").unwrap();
    static ref CONTENTS_TITLE: Regex = Regex::new(r"(?i)^\s*(table of )?contents\s*$").unwrap();
    static ref SENTENCE_END: Regex = Regex::new(r"[.!?](\s|$)").unwrap();
}

/// Query-time view of what a chunk holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Example,
    Table,
    Warning,
    Reference,
    Narrative,
    Text,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Example => "example",
            Self::Table => "table",
            Self::Warning => "warning",
            Self::Reference => "reference",
            Self::Narrative => "narrative",
            Self::Text => "text",
        }
    }
}

pub fn detect_content_kind(chunk: &StoredChunk) -> ContentKind {
    let content = &chunk.content;
    if content.contains("```")
        || chunk.metadata_str("content_type") == Some("code")
        || SQL_EXAMPLE.iter().any(|re| re.is_match(content))
    {
        return ContentKind::Example;
    }
    if chunk.has_table || MARKDOWN_TABLE.is_match(content) {
        return ContentKind::Table;
    }
    if WARNING_PATTERNS.iter().any(|re| re.is_match(content)) {
        return ContentKind::Warning;
    }
    let reference_section = chunk
        .section
        .as_deref()
        .map(|s| REFERENCE_SECTION.is_match(s))
        .unwrap_or(false);
    if reference_section || CITATION.find_iter(content).count() >= 2 {
        return ContentKind::Reference;
    }
    if is_narrative(chunk) {
        return ContentKind::Narrative;
    }
    ContentKind::Text
}

/// At least [`NARRATIVE_MIN_WORDS`] words and one terminated sentence
pub fn is_narrative(chunk: &StoredChunk) -> bool {
    chunk.word_count >= NARRATIVE_MIN_WORDS && SENTENCE_END.is_match(&chunk.content)
}

/// Dotted leaders, or mostly short headings ending in a page number
pub fn is_toc_like(chunk: &StoredChunk) -> bool {
    if chunk.has_table {
        return false;
    }
    let lines: Vec<&str> = chunk
        .content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return false;
    }
    if lines.iter().any(|l| CONTENTS_TITLE.is_match(l)) && lines.len() > 1 {
        return true;
    }
    let dotted = lines.iter().filter(|l| DOTTED_LEADER.is_match(l)).count();
    if dotted >= 2 {
        return true;
    }
    let heading_page = lines.iter().filter(|l| HEADING_PAGE.is_match(l)).count();
    lines.len() >= 3 && heading_page * 2 > lines.len()
}

/// Query features computed once and reused for every candidate
#[derive(Debug, Clone)]
pub struct QuerySignals {
    phrase: String,
    terms: Vec<String>,
    keyword_tokens: Vec<String>,
    commands: Vec<String>,
    pub intent: QueryIntent,
}

impl QuerySignals {
    pub fn new(query: &str) -> Self {
        let mut keyword_tokens = keyword_tokens(&extract_keywords(query));
        for term in lexical_terms(query) {
            if !keyword_tokens.contains(&term) {
                keyword_tokens.push(term);
            }
        }
        Self {
            phrase: normalize(query),
            terms: lexical_terms(query),
            keyword_tokens,
            commands: command_mentions(query),
            intent: detect_intent(query),
        }
    }
}

fn normalize(text: &str) -> String {
    text.trim()
        .trim_end_matches(['?', '.', '!'])
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn intent_tokens(intent: QueryIntent) -> &'static [&'static str] {
    match intent {
        QueryIntent::HowTo => &["step", "example", "syntax", "usage", "create", "run", "use"],
        QueryIntent::Definition => &["is a", "refers to", "defined as", "means", "definition"],
        QueryIntent::Warning => &["warning", "caution", "note", "important", "deprecated", "avoid"],
        QueryIntent::Performance => &[
            "performance",
            "index",
            "speed",
            "fast",
            "slow",
            "optimiz",
            "cost",
        ],
        QueryIntent::General => &[],
    }
}

fn intent_matches(intent: QueryIntent, kind: ContentKind) -> bool {
    matches!(
        (intent, kind),
        (QueryIntent::HowTo, ContentKind::Example)
            | (QueryIntent::Definition, ContentKind::Narrative)
            | (QueryIntent::Warning, ContentKind::Warning)
            | (QueryIntent::Performance, ContentKind::Table)
    )
}

/// Additive rerank boost for one chunk
pub fn rerank_boost(chunk: &StoredChunk, signals: &QuerySignals, w: &RerankWeights) -> f64 {
    let lowered = chunk.content.to_lowercase();
    let tokens: HashSet<&str> = lowered
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .collect();
    let kind = detect_content_kind(chunk);
    let mut boost = 0.0;

    if !signals.keyword_tokens.is_empty() {
        let present = signals
            .keyword_tokens
            .iter()
            .filter(|t| tokens.contains(t.as_str()))
            .count();
        boost += w.keyword_density * present as f64 / signals.keyword_tokens.len() as f64;
    }

    if signals.phrase.split(' ').count() >= 2
        && normalize(&chunk.content).contains(&signals.phrase)
    {
        boost += w.exact_phrase;
    }

    let exact_words = signals
        .terms
        .iter()
        .filter(|t| tokens.contains(t.as_str()))
        .count();
    boost += (exact_words as f64 * w.exact_word).min(w.exact_word_cap);

    if chunk.total_chunks > 1 {
        let mut position =
            w.position_max * chunk.chunk_index as f64 / (chunk.total_chunks - 1) as f64;
        if kind == ContentKind::Reference {
            position *= w.reference_position_factor;
        }
        boost += position.min(w.position_max);
    }

    if chunk
        .section
        .as_deref()
        .map(|s| IMPORTANT_SECTION.is_match(s))
        .unwrap_or(false)
    {
        boost += w.important_section;
    }

    if intent_matches(signals.intent, kind) {
        boost += w.intent_type_match;
    }

    let intent_hits = intent_tokens(signals.intent)
        .iter()
        .filter(|t| lowered.contains(*t))
        .count();
    boost += (intent_hits as f64 * w.intent_token).min(w.intent_token_cap);

    let chunk_keywords: Vec<String> = chunk.keywords().iter().map(|k| k.to_lowercase()).collect();
    let overlap = signals
        .keyword_tokens
        .iter()
        .filter(|t| chunk_keywords.iter().any(|k| k == *t || k.contains(t.as_str())))
        .count();
    boost += (overlap as f64 * w.metadata_overlap).min(w.metadata_overlap_cap);

    if signals.commands.iter().any(|c| lowered.contains(c.as_str())) {
        boost += w.function_mention;
    }

    boost
}

/// Apply rerank boosts and the hybrid multiplier, then sort descending
///
/// Context results keep their fixed score.
pub fn rerank(
    mut results: Vec<RetrievalResult>,
    query: &str,
    w: &RerankWeights,
) -> Vec<RetrievalResult> {
    let signals = QuerySignals::new(query);
    for r in &mut results {
        if r.method == RetrievalMethod::Context {
            continue;
        }
        let boost = rerank_boost(&r.chunk, &signals, w);
        r.scores.rerank = boost;
        let multiplier = if r.method == RetrievalMethod::Hybrid {
            w.hybrid_multiplier
        } else {
            1.0
        };
        r.final_score = (r.fused_score + boost) * multiplier;
    }
    sort_by_final(&mut results);
    results
}

/// TOC penalty and narrative boost, then re-sort
pub fn adjust(mut results: Vec<RetrievalResult>, w: &RerankWeights) -> Vec<RetrievalResult> {
    for r in &mut results {
        if r.method == RetrievalMethod::Context {
            continue;
        }
        let mut delta = 0.0;
        if is_toc_like(&r.chunk) {
            delta -= w.toc_penalty;
        }
        if is_narrative(&r.chunk) {
            delta += w.narrative_boost;
        }
        r.scores.boosts = delta;
        r.final_score = (r.final_score + delta).max(0.0);
    }
    sort_by_final(&mut results);
    results
}

pub(crate) fn sort_by_final(results: &mut [RetrievalResult]) {
    results.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.key().cmp(&b.chunk.key()))
    });
}
