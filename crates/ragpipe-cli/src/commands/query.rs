//! Query command

use super::{load_embedder, open_database};
use crate::app::{OutputFormat, QueryArgs};
use crate::output::format_context;
use anyhow::Result;
use ragpipe_core::{Config, RagPipeError, RetrievalEngine, Scope};
use std::sync::Arc;

pub async fn run(args: QueryArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let query = args.query.join(" ");

    let mut retrieval = config.retrieval.clone();
    if let Some(n) = args.limit {
        if n == 0 {
            return Err(RagPipeError::InvalidInput("-n must be positive".to_string()).into());
        }
        retrieval.max_results = n;
    }
    if let Some(t) = args.threshold {
        if !(0.0..=1.0).contains(&t) {
            return Err(RagPipeError::InvalidInput(
                "--threshold must be within [0, 1]".to_string(),
            )
            .into());
        }
        retrieval.similarity_threshold = t;
    }
    if args.no_rerank {
        retrieval.reranking = false;
    }
    if let Some(w) = args.context_window {
        retrieval.context_window = w;
    }

    let db = Arc::new(open_database()?);
    let embedder = load_embedder(args.embedder.embedder, config)?;
    let engine = RetrievalEngine::new(db, embedder, retrieval);

    let response = engine.retrieve_context(&query, &Scope::new(args.owner)).await;
    print!("{}", format_context(&response, format, args.debug));
    Ok(())
}
