//! CLI command handlers

pub mod chunk;
pub mod ingest;
pub mod query;
pub mod stats;

use crate::app::EmbedderKind;
use anyhow::Result;
use ragpipe_core::{Config, Database, Embedder, HashEmbedder, HttpEmbedder};
use std::sync::Arc;

/// Open the database at `RAGPIPE_DB` or the default data dir
pub fn open_database() -> Result<Database> {
    let path = Database::default_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::open(&path)?;
    db.initialize()?;
    Ok(db)
}

pub fn load_embedder(kind: EmbedderKind, config: &Config) -> Result<Arc<dyn Embedder>> {
    Ok(match kind {
        EmbedderKind::Http => Arc::new(HttpEmbedder::new(config.embedding.clone())?),
        EmbedderKind::Hash => Arc::new(HashEmbedder::new(config.embedding.dimensions)),
    })
}
