//! Integration tests for ingest, query and stats

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const DOCS: &[(&str, &str)] = &[
    (
        "indexes.md",
        "# Indexes\n\nUse CREATE INDEX to build an index on one or more columns.\n\n\
         ```sql\nCREATE INDEX idx ON t (a, b);\n```\n\n\
         A multi-column index helps queries that filter on the leading column.\n",
    ),
    (
        "vacuum.md",
        "# Vacuum\n\nVacuum reclaims storage occupied by dead tuples. \
         Autovacuum runs it in the background when enough rows change.\n",
    ),
    (
        "notes.txt",
        "Checkpoints flush dirty pages to disk. Frequent checkpoints shorten recovery.\n",
    ),
];

fn ragpipe_cmd(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("ragpipe").unwrap();
    cmd.env("RAGPIPE_CONFIG", home.path().join("config.yml"))
        .env("RAGPIPE_DB", home.path().join("index.sqlite"))
        .env("RAGPIPE_EMBEDDER", "hash")
        .env("RAGPIPE_EMBEDDING_DIMS", "128");
    cmd
}

/// Config without inter-batch delays, plus a docs dir ingested for `owner`
fn setup(owner: &str) -> (TempDir, TempDir) {
    let home = TempDir::new().unwrap();
    fs::write(home.path().join("config.yml"), "ingest:\n  batch_delay_ms: 0\n").unwrap();

    let docs = TempDir::new().unwrap();
    for (name, content) in DOCS {
        fs::write(docs.path().join(name), content).unwrap();
    }

    ragpipe_cmd(&home)
        .args(["ingest", "--owner", owner])
        .arg(docs.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Ingested 3 documents"));

    (home, docs)
}

#[test]
fn test_ingest_then_stats() {
    let (home, _docs) = setup("alice");

    let output = ragpipe_cmd(&home)
        .args(["--format", "json", "stats"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["documents"], 3);
    assert_eq!(stats["owners"], 1);
    assert_eq!(stats["placeholder_embeddings"], 0);

    ragpipe_cmd(&home)
        .args(["stats", "--documents", "--owner", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vacuum.md"));
}

#[test]
fn test_reingest_replaces_document() {
    let (home, docs) = setup("alice");

    ragpipe_cmd(&home)
        .args(["ingest", "--owner", "alice"])
        .arg(docs.path().join("vacuum.md"))
        .assert()
        .success();

    let output = ragpipe_cmd(&home)
        .args(["--format", "json", "stats"])
        .output()
        .unwrap();
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["documents"], 3);
}

#[test]
fn test_query_returns_context() {
    let (home, _docs) = setup("alice");

    ragpipe_cmd(&home)
        .args(["query", "--owner", "alice", "CREATE INDEX on multiple columns"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Confidence:"))
        .stdout(predicate::str::contains("[Source: indexes.md]"));
}

#[test]
fn test_query_json_ranks_index_doc_first() {
    let (home, _docs) = setup("alice");

    let output = ragpipe_cmd(&home)
        .args(["--format", "json", "query", "--owner", "alice", "-n", "3"])
        .arg("CREATE INDEX on multiple columns")
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let results = value["results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0]["source"], "indexes.md");
    assert!(["low", "medium", "high"].contains(&value["confidence"].as_str().unwrap()));
    assert_eq!(value["debug"]["original_query"], "CREATE INDEX on multiple columns");
}

#[test]
fn test_query_other_owner_sees_nothing() {
    let (home, _docs) = setup("alice");

    ragpipe_cmd(&home)
        .args(["query", "--owner", "bob", "vacuum dead tuples"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No relevant context found."))
        .stdout(predicate::str::contains("Confidence: low"));
}

#[test]
fn test_shared_documents_visible_to_all_owners() {
    let (home, docs) = setup("alice");

    ragpipe_cmd(&home)
        .args(["ingest", "--shared"])
        .arg(docs.path().join("notes.txt"))
        .assert()
        .success();

    ragpipe_cmd(&home)
        .args(["query", "--owner", "bob", "checkpoints recovery"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[Source: notes.txt]"));
}

#[test]
fn test_query_rejects_bad_threshold() {
    let (home, _docs) = setup("alice");

    ragpipe_cmd(&home)
        .args(["query", "--threshold", "1.5", "vacuum"])
        .assert()
        .code(3);
}
