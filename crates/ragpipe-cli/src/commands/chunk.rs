//! Chunk command

use crate::app::{ChunkArgs, OutputFormat};
use crate::output::format_chunking;
use anyhow::Result;
use ragpipe_core::chunking::{chunk_document, ChunkingConfig, ChunkingOptions, DocumentType};
use ragpipe_core::{Config, RagPipeError};

pub fn run(args: ChunkArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let content = std::fs::read_to_string(&args.file)?;

    let chunking = match args.preset.as_deref() {
        Some(name) => ChunkingConfig::preset(name)?,
        None => config.chunking.clone(),
    };
    let mut options = ChunkingOptions {
        config: chunking,
        optimization: config.optimization.clone(),
        ..Default::default()
    };
    if let Some(name) = args.file.file_name() {
        options = options.with_filename(name.to_string_lossy());
    }
    if let Some(t) = args.doc_type.as_deref() {
        let doc_type = DocumentType::parse(t)
            .ok_or_else(|| RagPipeError::InvalidInput(format!("unknown document type: {}", t)))?;
        options = options.with_type(doc_type);
    }
    if args.no_optimize {
        options.enable_optimization = false;
    }

    let result = chunk_document(&content, &options)?;
    print!("{}", format_chunking(&result, format, args.full));
    Ok(())
}
