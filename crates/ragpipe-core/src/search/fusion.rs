//! Candidate fusion, deduplication, diversification and confidence

use super::rerank::sort_by_final;
use super::{RetrievalMethod, RetrievalResult, SignalScores};
use crate::store::StoredChunk;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Which search produced a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Vector,
    Lexical,
}

/// A raw search hit before fusion
#[derive(Debug, Clone)]
pub struct Hit {
    pub chunk: StoredChunk,
    pub signal: Signal,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Merge hits by structural key, keeping the max score per signal
///
/// The fused score is the weighted sum of the vector and lexical signals.
/// Output is sorted by fused score, descending.
pub fn fuse(hits: Vec<Hit>, vector_weight: f64, lexical_weight: f64) -> Vec<RetrievalResult> {
    let mut merged: BTreeMap<(String, usize), (StoredChunk, Option<f64>, Option<f64>)> =
        BTreeMap::new();

    for hit in hits {
        let entry = merged
            .entry(hit.chunk.key())
            .or_insert_with(|| (hit.chunk.clone(), None, None));
        let slot = match hit.signal {
            Signal::Vector => &mut entry.1,
            Signal::Lexical => &mut entry.2,
        };
        *slot = Some(slot.map_or(hit.score, |s| s.max(hit.score)));
    }

    let mut results: Vec<RetrievalResult> = merged
        .into_values()
        .map(|(chunk, vector, lexical)| {
            let method = match (vector, lexical) {
                (Some(_), Some(_)) => RetrievalMethod::Hybrid,
                (Some(_), None) => RetrievalMethod::Vector,
                _ => RetrievalMethod::Keyword,
            };
            let scores = SignalScores {
                vector: vector.unwrap_or(0.0),
                lexical: lexical.unwrap_or(0.0),
                ..Default::default()
            };
            let fused = vector_weight * scores.vector + lexical_weight * scores.lexical;
            RetrievalResult {
                chunk,
                scores,
                fused_score: fused,
                final_score: fused,
                method,
            }
        })
        .collect();

    sort_by_final(&mut results);
    results
}

fn token_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Token-set Jaccard similarity; two empty texts are identical
pub fn jaccard(a: &str, b: &str) -> f64 {
    let a = token_set(a);
    let b = token_set(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let inter = a.intersection(&b).count() as f64;
    let union = a.union(&b).count() as f64;
    inter / union
}

/// Greedy near-duplicate removal in score order
///
/// A result is dropped if a higher-scored kept result has Jaccard
/// similarity of at least `threshold` with it.
pub fn remove_near_duplicates(
    mut results: Vec<RetrievalResult>,
    threshold: f64,
) -> Vec<RetrievalResult> {
    sort_by_final(&mut results);
    let mut kept: Vec<(RetrievalResult, HashSet<String>)> = Vec::with_capacity(results.len());

    for r in results {
        let tokens = token_set(&r.chunk.content);
        let duplicate = kept.iter().any(|(_, other)| {
            let union = tokens.union(other).count();
            let sim = if union == 0 {
                1.0
            } else {
                tokens.intersection(other).count() as f64 / union as f64
            };
            sim >= threshold
        });
        if !duplicate {
            kept.push((r, tokens));
        }
    }

    kept.into_iter().map(|(r, _)| r).collect()
}

/// Keep at most `cap` results per source document, preserving order
pub fn diversify(results: Vec<RetrievalResult>, cap: usize) -> Vec<RetrievalResult> {
    let mut per_source: HashMap<String, usize> = HashMap::new();
    results
        .into_iter()
        .filter(|r| {
            let count = per_source.entry(r.chunk.document_id.clone()).or_insert(0);
            *count += 1;
            *count <= cap
        })
        .collect()
}

/// `high` needs a clear leader among at least five results
pub fn confidence(results: &[RetrievalResult]) -> Confidence {
    let top = results.first().map(|r| r.final_score).unwrap_or(0.0);
    let second = results.get(1).map(|r| r.final_score).unwrap_or(0.0);

    if top >= 0.7 && top - second >= 0.1 && results.len() >= 5 {
        Confidence::High
    } else if top >= 0.5 && results.len() >= 3 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{Chunk, DocumentType, LineRange};

    fn chunk(doc: &str, idx: usize, text: &str) -> StoredChunk {
        let mut c = Chunk::new(text, DocumentType::PlainText, LineRange::new(idx, idx));
        c.chunk_index = idx;
        c.total_chunks = 10;
        StoredChunk::from_chunk("o", doc, format!("{doc}.md"), &c)
    }

    fn hit(doc: &str, idx: usize, signal: Signal, score: f64) -> Hit {
        Hit {
            chunk: chunk(doc, idx, &format!("{doc} chunk {idx}")),
            signal,
            score,
        }
    }

    fn scored(doc: &str, idx: usize, text: &str, score: f64) -> RetrievalResult {
        RetrievalResult {
            chunk: chunk(doc, idx, text),
            scores: SignalScores::default(),
            fused_score: score,
            final_score: score,
            method: RetrievalMethod::Vector,
        }
    }

    #[test]
    fn test_fuse_keeps_max_and_tags_method() {
        let fused = fuse(
            vec![
                hit("a", 0, Signal::Vector, 0.5),
                hit("a", 0, Signal::Vector, 0.8),
                hit("a", 0, Signal::Lexical, 0.5),
                hit("b", 1, Signal::Lexical, 0.9),
                hit("c", 2, Signal::Vector, 0.4),
            ],
            0.6,
            0.4,
        );
        assert_eq!(fused.len(), 3);
        assert_eq!(fused[0].chunk.document_id, "a");
        assert_eq!(fused[0].method, RetrievalMethod::Hybrid);
        assert!((fused[0].scores.vector - 0.8).abs() < 1e-9);
        assert!((fused[0].final_score - (0.6 * 0.8 + 0.4 * 0.5)).abs() < 1e-9);
        assert_eq!(fused[1].method, RetrievalMethod::Keyword);
        assert_eq!(fused[2].method, RetrievalMethod::Vector);
    }

    #[test]
    fn test_near_duplicates_keep_higher_score() {
        let results = vec![
            scored("a", 0, "vacuum reclaims storage from dead tuples", 0.4),
            scored("b", 0, "Vacuum reclaims storage from dead tuples.", 0.9),
            scored("c", 0, "indexes speed up lookups", 0.5),
        ];
        let kept = remove_near_duplicates(results, 0.92);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].chunk.document_id, "b");
        assert_eq!(kept[1].chunk.document_id, "c");
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard("a b c", "a b c"), 1.0);
        assert_eq!(jaccard("a b", "c d"), 0.0);
        assert!((jaccard("a b c", "a b d") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_diversify_caps_per_source() {
        let results: Vec<RetrievalResult> = (0..5)
            .map(|i| scored("a", i, &format!("a {i}"), 1.0 - i as f64 * 0.1))
            .chain(std::iter::once(scored("b", 0, "b", 0.2)))
            .collect();
        let out = diversify(results, 3);
        assert_eq!(out.len(), 4);
        assert_eq!(out.iter().filter(|r| r.chunk.document_id == "a").count(), 3);
        assert_eq!(out[3].chunk.document_id, "b");
    }

    #[test]
    fn test_confidence_levels() {
        let make = |scores: &[f64]| -> Vec<RetrievalResult> {
            scores
                .iter()
                .enumerate()
                .map(|(i, s)| scored("d", i, "x", *s))
                .collect()
        };
        assert_eq!(confidence(&make(&[0.9, 0.5, 0.4, 0.3, 0.2])), Confidence::High);
        assert_eq!(confidence(&make(&[0.9, 0.85, 0.4, 0.3, 0.2])), Confidence::Medium);
        assert_eq!(confidence(&make(&[0.9, 0.5, 0.4])), Confidence::Medium);
        assert_eq!(confidence(&make(&[0.9, 0.5])), Confidence::Low);
        assert_eq!(confidence(&[]), Confidence::Low);
    }
}
