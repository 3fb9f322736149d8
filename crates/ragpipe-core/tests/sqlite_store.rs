//! SQLite-backed ingestion and retrieval
//!
//! Tests:
//! 1. Ingest through the file database and query it back
//! 2. Re-ingesting a document replaces its chunks
//! 3. Owner scoping with shared documents
//! 4. Chunks survive reopening the database file

use ragpipe_core::config::IngestConfig;
use ragpipe_core::{
    ChunkStore, ChunkingOptions, Confidence, Database, DocumentRef, HashEmbedder, Ingestor,
    RetrievalConfig, RetrievalEngine, RetrievalMethod, Scope, NO_CONTEXT, SHARED_OWNER,
};
use std::sync::Arc;
use tempfile::TempDir;

const DIMS: usize = 128;

const VACUUM: &str = "# Vacuum\n\n\
Vacuum reclaims storage occupied by dead tuples. Autovacuum runs it in the background \
so tables do not bloat between manual maintenance windows.\n\n\
## Freezing\n\n\
Freezing marks old tuples so transaction id wraparound cannot make them invisible.";

const INDEXES: &str = "# Indexes\n\n\
A btree index speeds up equality and range lookups on the indexed columns.\n\n\
```sql\nCREATE INDEX idx_orders_customer ON orders (customer_id, created_at);\n```";

fn open(dir: &TempDir) -> Arc<Database> {
    let db = Database::open(dir.path().join("ragpipe.sqlite")).unwrap();
    db.initialize().unwrap();
    Arc::new(db)
}

fn ingestor(db: &Arc<Database>) -> Ingestor {
    let config = IngestConfig {
        batch_delay_ms: 0,
        ..Default::default()
    };
    Ingestor::new(Arc::new(HashEmbedder::new(DIMS)), db.clone(), config).with_dimensions(DIMS)
}

fn engine(db: &Arc<Database>) -> RetrievalEngine {
    RetrievalEngine::new(
        db.clone(),
        Arc::new(HashEmbedder::new(DIMS)),
        RetrievalConfig::default(),
    )
}

async fn ingest(db: &Arc<Database>, owner: &str, id: &str, content: &str) {
    let report = ingestor(db)
        .ingest_text(
            owner,
            &DocumentRef::new(id, format!("{id}.md")),
            content,
            &ChunkingOptions::default().with_filename(format!("{id}.md")),
        )
        .await
        .unwrap();
    assert!(!report.failed, "{id}: {:?}", report.errors);
    assert_eq!(report.placeholder_embeddings, 0);
}

#[tokio::test]
async fn test_ingest_and_retrieve() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    ingest(&db, "alice", "vacuum", VACUUM).await;
    ingest(&db, "alice", "indexes", INDEXES).await;

    let stats = db.stats().await.unwrap();
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.owners, 1);

    let response = engine(&db)
        .retrieve_context("how does autovacuum reclaim dead tuples", &Scope::new("alice"))
        .await;
    assert!(!response.results.is_empty());
    assert_eq!(response.results[0].chunk.document_id, "vacuum");
    assert_ne!(response.results[0].method, RetrievalMethod::Context);
    assert!(response.context.starts_with("[Source: vacuum.md]"));
}

#[tokio::test]
async fn test_reingest_replaces_chunks() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    ingest(&db, "alice", "vacuum", VACUUM).await;
    let before = db.stats().await.unwrap();

    ingest(&db, "alice", "vacuum", "Vacuum was rewritten into a single short note.").await;
    let after = db.stats().await.unwrap();
    assert_eq!(after.documents, 1);
    assert_eq!(after.chunks, 1);
    assert!(before.chunks >= after.chunks);

    let hits = db
        .lexical_search("wraparound", &Scope::new("alice"), 10)
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_scope_hides_other_owners() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    ingest(&db, "alice", "vacuum", VACUUM).await;
    ingest(&db, SHARED_OWNER, "indexes", INDEXES).await;

    let engine = engine(&db);
    let bob = engine
        .retrieve_context("autovacuum dead tuples", &Scope::owner_only("bob"))
        .await;
    assert_eq!(bob.context, NO_CONTEXT);
    assert_eq!(bob.confidence, Confidence::Low);

    let shared = engine
        .retrieve_context("btree index lookups", &Scope::new("bob"))
        .await;
    assert!(!shared.results.is_empty());
    assert!(shared.results.iter().all(|r| r.chunk.owner == SHARED_OWNER));
}

#[tokio::test]
async fn test_chunks_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let db = open(&dir);
        ingest(&db, "alice", "indexes", INDEXES).await;
    }
    let db = open(&dir);
    let hits = db
        .lexical_search("btree index", &Scope::new("alice"), 10)
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.score > 0.0 && h.score <= 1.0));
    assert_eq!(db.list_documents(Some("alice")).unwrap().len(), 1);
}
