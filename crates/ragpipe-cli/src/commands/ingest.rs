//! Ingest command

use super::{load_embedder, open_database};
use crate::app::{IngestArgs, OutputFormat};
use crate::output::format_ingest;
use crate::progress::ProgressReporter;
use anyhow::Result;
use ragpipe_core::chunking::{ChunkingConfig, ChunkingOptions};
use ragpipe_core::index::{collect_paths, ScanOptions};
use ragpipe_core::{Config, DocumentRef, Ingestor, RagPipeError, SHARED_OWNER};
use std::sync::Arc;

pub async fn run(args: IngestArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let mut scan = ScanOptions::default();
    if let Some(pattern) = args.pattern {
        scan = scan.with_pattern(pattern);
    }
    let files = collect_paths(&args.paths, &scan)?;
    if files.is_empty() {
        println!("No files to ingest");
        return Ok(());
    }

    let chunking = match args.preset.as_deref() {
        Some(name) => ChunkingConfig::preset(name)?,
        None => config.chunking.clone(),
    };
    let owner = if args.shared {
        SHARED_OWNER.to_string()
    } else {
        args.owner
    };

    let db = Arc::new(open_database()?);
    let embedder = load_embedder(args.embedder.embedder, config)?;
    let ingestor = Ingestor::new(embedder, db, config.ingest.clone())
        .with_dimensions(config.embedding.dimensions);

    let mut progress = ProgressReporter::new(files.len());
    let mut reports = Vec::with_capacity(files.len());

    for file in files {
        progress.set_message(&format!("Ingesting {}", file.relative_path));
        let content = match std::fs::read_to_string(&file.path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %file.path.display(), error = %e, "skipping unreadable file");
                progress.increment();
                continue;
            }
        };

        let path = file.path.canonicalize().unwrap_or_else(|_| file.path.clone());
        let document = DocumentRef::for_path(&path);
        let options = ChunkingOptions {
            config: chunking.clone(),
            optimization: config.optimization.clone(),
            ..Default::default()
        }
        .with_filename(document.source.clone());

        match ingestor.ingest_text(&owner, &document, &content, &options).await {
            Ok(report) => reports.push(report),
            Err(RagPipeError::EmptyDocument) => {
                tracing::info!(path = %file.path.display(), "skipping empty document");
            }
            Err(e) => return Err(e.into()),
        }
        progress.increment();
    }
    progress.finish();

    print!("{}", format_ingest(&reports, format));
    Ok(())
}
