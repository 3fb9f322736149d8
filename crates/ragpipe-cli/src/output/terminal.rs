//! Terminal output formatter

use ragpipe_core::chunking::chunking_stats;
use ragpipe_core::index::IngestReport;
use ragpipe_core::{ChunkingResult, ContextResponse};

const PREVIEW_LINES: usize = 5;

fn preview(text: &str, full: bool, output: &mut String) {
    let total = text.lines().count();
    let take = if full { total } else { PREVIEW_LINES };
    for line in text.lines().take(take) {
        output.push_str(&format!("  {}\n", line));
    }
    if total > take {
        output.push_str("  ...\n");
    }
}

pub fn format_chunking(result: &ChunkingResult, full: bool) -> String {
    let stats = chunking_stats(result);
    let mut output = format!(
        "Type: {} ({:.0}%)  Strategy: {}  Chunks: {}  Avg chars: {}  Time: {} ms\n",
        result.metadata.doc_type,
        result.metadata.confidence * 100.0,
        result.diagnostics.strategy,
        stats.total_chunks,
        stats.average_chars,
        result.processing_time_ms
    );
    if !result.diagnostics.table_boundaries.is_empty() {
        output.push_str(&format!(
            "Table boundaries: {}\n",
            result.diagnostics.table_boundaries.len()
        ));
    }
    output.push('\n');

    for chunk in &result.chunks {
        let lines = chunk
            .lines
            .map(|l| format!("L{}-{}", l.start + 1, l.end + 1))
            .unwrap_or_default();
        output.push_str(&format!(
            "#{:<3} {:>5} words {} {}{}\n",
            chunk.chunk_index,
            chunk.word_count,
            lines,
            chunk.section.as_deref().unwrap_or(""),
            if chunk.has_table { " [table]" } else { "" }
        ));
        preview(&chunk.content, full, &mut output);
    }

    output
}

pub fn format_ingest(reports: &[IngestReport]) -> String {
    let mut output = String::new();
    for r in reports {
        let status = if r.failed { "FAILED" } else { "ok" };
        output.push_str(&format!(
            "{:<6} {} ({} chunks, {} stored)\n",
            status, r.source, r.total_chunks, r.stored
        ));
        if r.placeholder_embeddings > 0 {
            output.push_str(&format!(
                "       {} placeholder embeddings\n",
                r.placeholder_embeddings
            ));
        }
        for e in &r.errors {
            output.push_str(&format!("       {}\n", e));
        }
    }
    let stored: usize = reports.iter().map(|r| r.stored).sum();
    output.push_str(&format!("Ingested {} documents, {} chunks\n", reports.len(), stored));
    output
}

pub fn format_context(response: &ContextResponse, debug: bool) -> String {
    let mut output = format!("Confidence: {}\n", response.confidence);

    for r in &response.results {
        let score_pct = (r.final_score * 100.0).round() as i64;
        output.push_str(&format!(
            "{:>4}% {} #{} [{}]\n",
            score_pct, r.chunk.source, r.chunk.chunk_index, r.method
        ));
    }

    output.push('\n');
    output.push_str(&response.context);
    output.push('\n');

    if debug {
        let d = &response.debug;
        output.push_str(&format!(
            "\nvariants: {}  vector: {}  lexical: {}  multi-hop: {}  deduplicated: {}  failed: {}  retried: {}  threshold: {:.2}\n",
            d.variants.len(),
            d.vector_results,
            d.lexical_results,
            d.multi_hop_results,
            d.deduplicated,
            d.failed_branches,
            d.retried,
            d.final_threshold
        ));
    }
    output
}
