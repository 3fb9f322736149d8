//! Output formatters

pub mod json;
pub mod markdown;
pub mod terminal;

use crate::app::OutputFormat;
use ragpipe_core::index::IngestReport;
use ragpipe_core::{ChunkingResult, ContextResponse};

pub fn format_chunking(result: &ChunkingResult, format: OutputFormat, full: bool) -> String {
    match format {
        OutputFormat::Json => json::format_chunking(result),
        OutputFormat::Md => markdown::format_chunking(result),
        OutputFormat::Cli => terminal::format_chunking(result, full),
    }
}

pub fn format_ingest(reports: &[IngestReport], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::format_ingest(reports),
        OutputFormat::Md | OutputFormat::Cli => terminal::format_ingest(reports),
    }
}

pub fn format_context(response: &ContextResponse, format: OutputFormat, debug: bool) -> String {
    match format {
        OutputFormat::Json => json::format_context(response),
        OutputFormat::Md => markdown::format_context(response),
        OutputFormat::Cli => terminal::format_context(response, debug),
    }
}
