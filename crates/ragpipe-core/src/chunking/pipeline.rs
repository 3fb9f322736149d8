//! Document chunking entry points

use super::boundary::{detect_boundaries, BoundaryLock, TableBoundary};
use super::classify::{classify, Classification, DocumentFeatures};
use super::consolidate::consolidate_tables;
use super::enhance::enhance_metadata;
use super::optimize::{chunk_metrics, optimize_chunks, ChunkMetrics, OptimizationConfig};
use super::strategies::Strategy;
use super::types::{renumber, Chunk, ChunkingConfig, DocumentType, Lines};
use crate::error::{RagPipeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};

/// Per-call chunking options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingOptions {
    pub config: ChunkingConfig,
    pub filename: Option<String>,
    /// Skip classification and use this strategy
    pub force_type: Option<DocumentType>,
    pub enable_table_consolidation: bool,
    pub enable_optimization: bool,
    pub enable_metadata_enhancement: bool,
    pub enable_analysis: bool,
    pub optimization: OptimizationConfig,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            config: ChunkingConfig::default(),
            filename: None,
            force_type: None,
            enable_table_consolidation: true,
            enable_optimization: true,
            enable_metadata_enhancement: true,
            enable_analysis: true,
            optimization: OptimizationConfig::default(),
        }
    }
}

impl ChunkingOptions {
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_config(mut self, config: ChunkingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_type(mut self, doc_type: DocumentType) -> Self {
        self.force_type = Some(doc_type);
        self
    }

    /// Strategy output plus post-processing only
    pub fn raw(mut self) -> Self {
        self.enable_table_consolidation = false;
        self.enable_optimization = false;
        self.enable_metadata_enhancement = false;
        self.enable_analysis = false;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsolidationStats {
    pub fragments_merged: usize,
    pub tables_restored: usize,
    pub report: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizationStats {
    pub merged: usize,
    pub split: usize,
    pub overlaps_added: usize,
    pub quality_issues: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnhancementStats {
    pub relationships_found: usize,
    pub quality_issues: Vec<String>,
}

/// Retrieval priority buckets from enhanced metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorityCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Whole-result quality assessment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkingAnalysis {
    /// In [0, 1]
    pub quality_score: f64,
    pub self_contained: usize,
    pub incomplete_context: usize,
    pub orphaned_references: usize,
    pub priority: PriorityCounts,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Structured record of every pipeline stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub strategy: String,
    pub table_boundaries: Vec<TableBoundary>,
    pub boundary_confidence: f64,
    pub chunks_from_strategy: usize,
    pub chunks_after_post_process: usize,
    pub consolidation: Option<ConsolidationStats>,
    pub optimization: Option<OptimizationStats>,
    pub enhancement: Option<EnhancementStats>,
    pub analysis: Option<ChunkingAnalysis>,
    pub metrics: ChunkMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingResult {
    pub chunks: Vec<Chunk>,
    pub metadata: Classification,
    pub config: ChunkingConfig,
    pub processing_time_ms: u64,
    pub diagnostics: Diagnostics,
}

/// Violations of the chunking size rules; empty when valid
pub fn validate_config(config: &ChunkingConfig) -> Vec<String> {
    let mut errors = Vec::new();
    if config.chunk_size < 50 {
        errors.push("chunk_size must be at least 50 characters".to_string());
    }
    if config.min_chunk_size < 10 {
        errors.push("min_chunk_size must be at least 10 characters".to_string());
    }
    if config.max_chunk_size < config.chunk_size {
        errors.push("max_chunk_size must be greater than or equal to chunk_size".to_string());
    }
    if config.overlap >= config.chunk_size {
        errors.push("overlap must be less than chunk_size".to_string());
    }
    errors
}

fn forced_classification(content: &str, doc_type: DocumentType) -> Classification {
    Classification {
        doc_type,
        confidence: 1.0,
        features: DocumentFeatures::extract(content),
        scores: Vec::new(),
        by_extension: false,
    }
}

/// Trim, drop empties, fold sub-minimum prose into a neighbour, renumber
fn post_process(chunks: Vec<Chunk>, config: &ChunkingConfig) -> Vec<Chunk> {
    let trimmed: Vec<Chunk> = chunks
        .into_iter()
        .filter_map(|c| {
            let text = c.content.trim().to_string();
            (!text.is_empty()).then(|| c.with_content(text))
        })
        .collect();

    let mut out: Vec<Chunk> = Vec::with_capacity(trimmed.len());
    let mut pending: Option<Chunk> = None;

    for chunk in trimmed {
        let chunk = match pending.take() {
            Some(small) if !chunk.atomic => absorb(small, chunk),
            Some(small) => {
                out.push(small);
                chunk
            }
            None => chunk,
        };

        if chunk.atomic || chunk.content.chars().count() >= config.min_chunk_size {
            out.push(chunk);
            continue;
        }
        match out.last_mut() {
            Some(prev) if !prev.atomic => *prev = absorb(prev.clone(), chunk),
            _ => pending = Some(chunk),
        }
    }
    out.extend(pending);

    renumber(out)
}

fn absorb(first: Chunk, second: Chunk) -> Chunk {
    let lines = match (first.lines, second.lines) {
        (Some(a), Some(b)) => Some(a.union(&b)),
        (a, b) => a.or(b),
    };
    let content = format!("{}\n{}", first.content, second.content);
    let mut merged = first.with_content(content);
    merged.lines = lines;
    merged
}

fn analyze(
    chunks: &[Chunk],
    optimization: Option<&OptimizationStats>,
    enhancement: Option<&EnhancementStats>,
) -> ChunkingAnalysis {
    let mut analysis = ChunkingAnalysis::default();
    if chunks.is_empty() {
        return analysis;
    }

    let mut quality = 0.0;
    for chunk in chunks {
        let lines = chunk.content.split('\n').count();
        match &chunk.enhanced {
            Some(meta) => {
                if meta.self_contained {
                    analysis.self_contained += 1;
                    quality += 1.0;
                } else {
                    quality += 0.5;
                }
                if meta.incomplete_context {
                    analysis.incomplete_context += 1;
                    quality -= 0.2;
                }
                if meta.contains_references && meta.related_to.is_empty() {
                    analysis.orphaned_references += 1;
                    quality -= 0.3;
                }
                match meta.retrieval_score {
                    s if s >= 0.7 => analysis.priority.high += 1,
                    s if s >= 0.4 => analysis.priority.medium += 1,
                    _ => analysis.priority.low += 1,
                }
            }
            None => {
                quality += 0.5;
                analysis.priority.medium += 1;
            }
        }
        if (15..=80).contains(&lines) {
            quality += 0.1;
        } else if !(5..=150).contains(&lines) {
            quality -= 0.2;
        }
    }
    let total = chunks.len() as f64;
    analysis.quality_score = (quality / total).clamp(0.0, 1.0);

    let metrics = chunk_metrics(chunks);
    let tiny = metrics.size_distribution.get("1-10 lines").copied().unwrap_or(0);
    if tiny as f64 > total * 0.3 {
        analysis
            .issues
            .push(format!("too many tiny chunks ({}/{})", tiny, chunks.len()));
    }
    let huge = metrics.size_distribution.get("100+ lines").copied().unwrap_or(0);
    if huge as f64 > total * 0.2 {
        analysis
            .issues
            .push(format!("too many large chunks ({}/{})", huge, chunks.len()));
    }
    if analysis.incomplete_context as f64 > total * 0.2 {
        analysis.issues.push(format!(
            "many chunks have incomplete context ({}/{})",
            analysis.incomplete_context,
            chunks.len()
        ));
    }
    if analysis.orphaned_references > 0 {
        analysis.issues.push(format!(
            "{} chunks have orphaned references",
            analysis.orphaned_references
        ));
    }

    if metrics.average_lines < 15.0 {
        analysis
            .recommendations
            .push("increase minimum chunk size to improve context".to_string());
    } else if metrics.average_lines > 60.0 {
        analysis
            .recommendations
            .push("decrease maximum chunk size for better precision".to_string());
    }
    if analysis.quality_score < 0.6 {
        analysis
            .recommendations
            .push("review chunk self-containment".to_string());
    }
    if analysis.incomplete_context > 0 {
        analysis
            .recommendations
            .push("enable sentence overlap to improve continuity".to_string());
    }
    if analysis.priority.low as f64 > total * 0.4 {
        analysis
            .recommendations
            .push("many chunks have low retrieval priority".to_string());
    }
    if let Some(opt) = optimization {
        if opt.merged > 0 {
            analysis
                .recommendations
                .push(format!("merged {} small chunks", opt.merged));
        }
        if opt.split > 0 {
            analysis
                .recommendations
                .push(format!("split {} large chunks", opt.split));
        }
    }
    if let Some(enh) = enhancement {
        if !enh.quality_issues.is_empty() {
            analysis.recommendations.push(format!(
                "address {} metadata quality issues",
                enh.quality_issues.len()
            ));
        }
    }

    analysis
}

/// Classify, chunk and post-process one document.
///
/// Fails on empty input or an invalid configuration; every later stage is
/// best-effort and reported through `diagnostics`.
pub fn chunk_document(content: &str, options: &ChunkingOptions) -> Result<ChunkingResult> {
    let start = Instant::now();

    if content.trim().is_empty() {
        return Err(RagPipeError::EmptyDocument);
    }
    let violations = validate_config(&options.config);
    if !violations.is_empty() {
        return Err(RagPipeError::InvalidConfig(violations));
    }

    let metadata = match options.force_type {
        Some(t) => forced_classification(content, t),
        None => classify(content, options.filename.as_deref()),
    };

    let lines = Lines::new(content);
    let detection = detect_boundaries(lines.as_slice());
    let lock = if options.config.preserve_table_integrity {
        BoundaryLock::from_boundaries(detection.boundaries.clone())
    } else {
        BoundaryLock::default()
    };

    let strategy = Strategy::for_type(metadata.doc_type);
    let raw = strategy.chunk(&lines, &options.config, &lock);

    let mut diagnostics = Diagnostics {
        strategy: strategy.name().to_string(),
        table_boundaries: detection.boundaries,
        boundary_confidence: detection.average_confidence,
        chunks_from_strategy: raw.len(),
        ..Default::default()
    };

    let mut chunks = post_process(raw, &options.config);
    diagnostics.chunks_after_post_process = chunks.len();

    if options.enable_table_consolidation {
        let result = consolidate_tables(&chunks);
        diagnostics.consolidation = Some(ConsolidationStats {
            fragments_merged: result.fragments_merged,
            tables_restored: result.tables_restored,
            report: result.report,
        });
        chunks = result.chunks;
    }

    if options.enable_optimization {
        let result = optimize_chunks(&chunks, &options.optimization);
        diagnostics.optimization = Some(OptimizationStats {
            merged: result.merged,
            split: result.split,
            overlaps_added: result.overlaps_added,
            quality_issues: result.quality_issues,
        });
        chunks = result.chunks;
    }

    if options.enable_metadata_enhancement {
        let result = enhance_metadata(&chunks);
        diagnostics.enhancement = Some(EnhancementStats {
            relationships_found: result.relationships_found,
            quality_issues: result.quality_issues,
        });
        chunks = result.chunks;
    }

    if options.enable_analysis {
        diagnostics.analysis = Some(analyze(
            &chunks,
            diagnostics.optimization.as_ref(),
            diagnostics.enhancement.as_ref(),
        ));
    }
    diagnostics.metrics = chunk_metrics(&chunks);

    let processing_time_ms = start.elapsed().as_millis() as u64;
    info!(
        doc_type = %metadata.doc_type,
        confidence = metadata.confidence,
        strategy = %diagnostics.strategy,
        chunks = chunks.len(),
        tables = diagnostics.table_boundaries.len(),
        elapsed_ms = processing_time_ms,
        "chunked document"
    );

    Ok(ChunkingResult {
        chunks,
        metadata,
        config: options.config.clone(),
        processing_time_ms,
        diagnostics,
    })
}

/// One input to `chunk_documents`
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub content: String,
    pub filename: Option<String>,
}

/// Chunk several documents; each failure is captured in place
pub fn chunk_documents(
    documents: &[DocumentInput],
    options: &ChunkingOptions,
) -> Vec<Result<ChunkingResult>> {
    documents
        .iter()
        .map(|doc| {
            let mut opts = options.clone();
            if doc.filename.is_some() {
                opts.filename = doc.filename.clone();
            }
            let result = chunk_document(&doc.content, &opts);
            if let Err(ref e) = result {
                warn!(
                    filename = doc.filename.as_deref().unwrap_or("<inline>"),
                    error = %e,
                    "failed to chunk document"
                );
            }
            result
        })
        .collect()
}

/// Size and distribution summary of a chunking result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkingStats {
    pub total_chunks: usize,
    pub total_chars: usize,
    pub average_chars: usize,
    pub min_chars: usize,
    pub max_chars: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_section: BTreeMap<String, usize>,
    pub table_chunks: usize,
    pub doc_type: Option<DocumentType>,
    pub confidence: f64,
    pub processing_time_ms: u64,
}

pub fn chunking_stats(result: &ChunkingResult) -> ChunkingStats {
    let sizes: Vec<usize> = result
        .chunks
        .iter()
        .map(|c| c.content.chars().count())
        .collect();
    let total_chars: usize = sizes.iter().sum();

    let mut stats = ChunkingStats {
        total_chunks: sizes.len(),
        total_chars,
        average_chars: if sizes.is_empty() {
            0
        } else {
            (total_chars as f64 / sizes.len() as f64).round() as usize
        },
        min_chars: sizes.iter().copied().min().unwrap_or(0),
        max_chars: sizes.iter().copied().max().unwrap_or(0),
        table_chunks: result.chunks.iter().filter(|c| c.is_table()).count(),
        doc_type: Some(result.metadata.doc_type),
        confidence: result.metadata.confidence,
        processing_time_ms: result.processing_time_ms,
        ..Default::default()
    };

    for chunk in &result.chunks {
        *stats
            .by_type
            .entry(chunk.doc_type.as_str().to_string())
            .or_insert(0) += 1;
        let section = chunk.section.clone().unwrap_or_else(|| "(none)".to_string());
        *stats.by_section.entry(section).or_insert(0) += 1;
    }
    stats
}
