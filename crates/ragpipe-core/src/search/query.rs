//! Query expansion, weighted keywords and intent detection

use crate::store::StoredChunk;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bounds for renormalized variant weights
pub const MIN_VARIANT_WEIGHT: f64 = 0.8;
pub const MAX_VARIANT_WEIGHT: f64 = 1.2;

/// Queries longer than this (in chars) trigger multi-hop retrieval
pub const MULTI_HOP_QUERY_LEN: usize = 80;

/// Upper bound on terms mined for a multi-hop follow-up
pub const MAX_HOP_TERMS: usize = 8;

const KEYWORD_STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "is", "was", "are", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "may", "might", "can", "what", "where", "when", "who",
    "how", "why",
];

lazy_static! {
    static ref QUESTION_PREFIX: Regex =
        Regex::new(r"(?i)^(what|who|where|when|why|how|tell me|show me|find|search for)").unwrap();
    static ref DATE: Regex = Regex::new(r"(?i)\d+\s*(?:CE|AD|BCE|BC)\b").unwrap();
    static ref LOCATION: Regex =
        Regex::new(r"(?:at|in|near)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)").unwrap();
    static ref PROPER_NOUN: Regex = Regex::new(r"[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*").unwrap();
    static ref BIRTH: Regex = Regex::new(r"(?i)(?:born|birth)\s+(?:in|at|near)\s+(.+)").unwrap();
    static ref PERSON: Regex = Regex::new(r"(?i)(?:who|about)\s+(?:is|was)\s+([^?]+)").unwrap();
    static ref RELATIONSHIP: Regex = Regex::new(
        r"(?i)\b(relationship|related|relate[sd]?|depend(?:s|ent|ency|encies)?|between|compare[sd]?|comparison|versus|vs\.?|affect(?:s|ed)?|impact(?:s|ed)?|cause[sd]?|leads? to|difference|connect(?:ed|ion)?)\b"
    ).unwrap();
    static ref CAPITALIZED_NGRAM: Regex =
        Regex::new(r"\b[A-Z][a-zA-Z0-9]+(?:\s+[A-Z][a-zA-Z0-9]+){0,2}\b").unwrap();
    static ref UPPER_COMMAND: Regex = Regex::new(r"\b[A-Z]{2,}(?:\s+[A-Z]{2,})*\b").unwrap();
    static ref FUNCTION_CALL: Regex = Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(\)").unwrap();
    static ref BACKTICK: Regex = Regex::new(r"`([^`]+)`").unwrap();

    static ref HOW_TO: Regex = Regex::new(
        r"(?i)\b(how (do|to|can|should)|steps? to|example|syntax|usage|create|set up|configure)\b"
    )
    .unwrap();
    static ref DEFINITION: Regex = Regex::new(
        r"(?i)\b(what (is|are|does)|define|definition|meaning of|explain|describe)\b"
    )
    .unwrap();
    static ref WARNING: Regex = Regex::new(
        r"(?i)\b(warning|caution|pitfall|avoid|danger|risk|deprecated|limitation|careful)\b"
    )
    .unwrap();
    static ref PERFORMANCE: Regex = Regex::new(
        r"(?i)\b(performance|fast(er|est)?|slow(er)?|speed|optimi[sz]e|latency|throughput|benchmark|efficient|cost)\b"
    )
    .unwrap();
}

/// A rewritten query and its relative importance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryVariant {
    pub text: String,
    pub weight: f64,
}

/// A query keyword and its priority tier weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedKeyword {
    pub term: String,
    pub weight: f64,
}

/// What the user is trying to do, as far as ranking cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    HowTo,
    Definition,
    Warning,
    Performance,
    General,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HowTo => "how_to",
            Self::Definition => "definition",
            Self::Warning => "warning",
            Self::Performance => "performance",
            Self::General => "general",
        }
    }
}

/// First matching intent, checked warning → performance → how-to → definition
pub fn detect_intent(query: &str) -> QueryIntent {
    if WARNING.is_match(query) {
        QueryIntent::Warning
    } else if PERFORMANCE.is_match(query) {
        QueryIntent::Performance
    } else if HOW_TO.is_match(query) {
        QueryIntent::HowTo
    } else if DEFINITION.is_match(query) {
        QueryIntent::Definition
    } else {
        QueryIntent::General
    }
}

/// Produce weighted query variants, renormalized into
/// [`MIN_VARIANT_WEIGHT`, `MAX_VARIANT_WEIGHT`]
///
/// The original query is always first and always carries the top weight.
pub fn expand_query(query: &str) -> Vec<QueryVariant> {
    let query = query.trim();
    let mut variants: Vec<QueryVariant> = Vec::new();
    let mut push = |text: &str, weight: f64| {
        let text = text.trim();
        if !text.is_empty() && !variants.iter().any(|v| v.text.eq_ignore_ascii_case(text)) {
            variants.push(QueryVariant {
                text: text.to_string(),
                weight,
            });
        }
    };

    push(query, 1.0);

    let cleaned = QUESTION_PREFIX.replace(query, "");
    if cleaned.trim() != query {
        push(&cleaned, 0.9);
    }

    let entities: Vec<&str> = DATE
        .find_iter(query)
        .chain(LOCATION.find_iter(query))
        .chain(PROPER_NOUN.find_iter(query))
        .map(|m| m.as_str())
        .collect();
    if entities.len() > 1 {
        push(&entities.join(" "), 0.85);
    }

    if let Some(caps) = BIRTH.captures(query) {
        let place = caps[1].to_string();
        push(&place, 0.8);
        let without_date = DATE.replace(&place, "");
        if without_date.trim() != place.trim() {
            push(&without_date, 0.75);
        }
    }

    if let Some(caps) = PERSON.captures(query) {
        push(&caps[1], 0.95);
    }

    normalize_weights(variants)
}

/// Linearly rescale weights into the variant weight bounds
///
/// A single variant (or all-equal weights) maps to 1.0.
pub fn normalize_weights(mut variants: Vec<QueryVariant>) -> Vec<QueryVariant> {
    let min = variants.iter().map(|v| v.weight).fold(f64::INFINITY, f64::min);
    let max = variants
        .iter()
        .map(|v| v.weight)
        .fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    for v in &mut variants {
        v.weight = if span > f64::EPSILON {
            MIN_VARIANT_WEIGHT + (v.weight - min) / span * (MAX_VARIANT_WEIGHT - MIN_VARIANT_WEIGHT)
        } else {
            1.0
        };
    }
    variants
}

/// Extract keywords by priority: dates (1.0), locations (0.9), proper
/// nouns (0.8), then remaining non-stop-words (0.6)
///
/// A term already captured at a higher tier is not added again lower.
pub fn extract_keywords(query: &str) -> Vec<WeightedKeyword> {
    let mut keywords: Vec<WeightedKeyword> = Vec::new();
    let add = |term: String, weight: f64, keywords: &mut Vec<WeightedKeyword>| {
        if !term.is_empty() && !keywords.iter().any(|k| k.term == term) {
            keywords.push(WeightedKeyword { term, weight });
        }
    };

    for m in DATE.find_iter(query) {
        let normalized: String = m.as_str().split_whitespace().collect::<String>().to_uppercase();
        add(normalized, 1.0, &mut keywords);
    }
    for caps in LOCATION.captures_iter(query) {
        add(caps[1].trim().to_string(), 0.9, &mut keywords);
    }
    for m in PROPER_NOUN.find_iter(query) {
        add(m.as_str().to_string(), 0.8, &mut keywords);
    }

    let lowered = query.to_lowercase();
    let words = lowered
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| w.chars().count() > 2 && !KEYWORD_STOP_WORDS.contains(w));
    for word in words {
        let covered = keywords.iter().any(|k| k.term.to_lowercase().contains(word));
        if !covered {
            add(word.to_string(), 0.6, &mut keywords);
        }
    }

    keywords
}

/// Space-joined keyword terms for lexical search
pub fn keyword_query(keywords: &[WeightedKeyword]) -> String {
    keywords
        .iter()
        .map(|k| k.term.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercased keyword tokens used for overlap checks
pub fn keyword_tokens(keywords: &[WeightedKeyword]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for k in keywords {
        for t in k.term.to_lowercase().split_whitespace() {
            if !out.iter().any(|o| o == t) {
                out.push(t.to_string());
            }
        }
    }
    out
}

/// Long queries and relationship language warrant a second hop
pub fn needs_multi_hop(query: &str) -> bool {
    query.chars().count() > MULTI_HOP_QUERY_LEN || RELATIONSHIP.is_match(query)
}

/// Mine follow-up terms from the top preliminary results
///
/// Metadata keywords and capitalized n-grams not already in the query,
/// ranked by how many of the given chunks mention them.
pub fn mine_hop_terms(query: &str, top: &[StoredChunk]) -> Vec<String> {
    let lowered_query = query.to_lowercase();
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut order = 0usize;

    let mut record = |term: &str, counts: &mut HashMap<String, (usize, usize)>| {
        let term = term.trim();
        if term.chars().count() < 3 || lowered_query.contains(&term.to_lowercase()) {
            return;
        }
        let entry = counts.entry(term.to_string()).or_insert_with(|| {
            order += 1;
            (0, order)
        });
        entry.0 += 1;
    };

    for chunk in top.iter().take(3) {
        for kw in chunk.keywords() {
            record(&kw, &mut counts);
        }
        for m in CAPITALIZED_NGRAM.find_iter(&chunk.content) {
            record(m.as_str(), &mut counts);
        }
    }

    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked
        .into_iter()
        .take(MAX_HOP_TERMS)
        .map(|(t, _)| t)
        .collect()
}

/// Explicit function or command mentions: `name()`, backticked spans and
/// runs of upper-case words such as `CREATE INDEX`
pub fn command_mentions(query: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |s: &str| {
        let s = s.trim().to_lowercase();
        if !s.is_empty() && !out.contains(&s) {
            out.push(s);
        }
    };
    for caps in FUNCTION_CALL.captures_iter(query) {
        push(&caps[1]);
    }
    for caps in BACKTICK.captures_iter(query) {
        push(&caps[1]);
    }
    for m in UPPER_COMMAND.find_iter(query) {
        push(m.as_str());
    }
    out
}
