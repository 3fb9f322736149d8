//! JSON output formatter

use ragpipe_core::chunking::chunking_stats;
use ragpipe_core::index::IngestReport;
use ragpipe_core::{ChunkingResult, ContextResponse};

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string()) + "\n"
}

pub fn format_chunking(result: &ChunkingResult) -> String {
    pretty(&serde_json::json!({
        "doc_type": result.metadata.doc_type,
        "confidence": result.metadata.confidence,
        "processing_time_ms": result.processing_time_ms,
        "stats": chunking_stats(result),
        "chunks": result.chunks,
        "diagnostics": result.diagnostics,
    }))
}

pub fn format_ingest(reports: &[IngestReport]) -> String {
    serde_json::to_string_pretty(reports).unwrap_or_else(|_| "[]".to_string()) + "\n"
}

pub fn format_context(response: &ContextResponse) -> String {
    let results: Vec<serde_json::Value> = response
        .results
        .iter()
        .map(|r| {
            serde_json::json!({
                "source": r.chunk.source,
                "document_id": r.chunk.document_id,
                "chunk_index": r.chunk.chunk_index,
                "section": r.chunk.section,
                "method": r.method,
                "score": r.final_score,
                "scores": r.scores,
            })
        })
        .collect();

    pretty(&serde_json::json!({
        "confidence": response.confidence,
        "results": results,
        "context": response.context,
        "debug": response.debug,
    }))
}
