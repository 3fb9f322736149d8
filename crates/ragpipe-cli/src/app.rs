//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ragpipe")]
#[command(
    author,
    version,
    about = "Structure-aware document chunking and hybrid retrieval"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Chunk a file and print chunks with diagnostics
    Chunk(ChunkArgs),

    /// Chunk, embed and store files or directories
    Ingest(IngestArgs),

    /// Retrieve context for a query
    Query(QueryArgs),

    /// Show store statistics
    Stats(StatsArgs),
}

#[derive(Args)]
pub struct ChunkArgs {
    /// File to chunk
    pub file: PathBuf,

    /// Chunking preset (general, code, research, tabular, small)
    #[arg(long)]
    pub preset: Option<String>,

    /// Force a document type instead of classifying
    #[arg(long = "type")]
    pub doc_type: Option<String>,

    /// Skip the optimization pass
    #[arg(long)]
    pub no_optimize: bool,

    /// Print full chunk content
    #[arg(long)]
    pub full: bool,
}

#[derive(Args)]
pub struct IngestArgs {
    /// Files or directories to ingest
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Owner the documents are stored under
    #[arg(long, default_value = "local")]
    pub owner: String,

    /// Store as shared documents visible to every owner
    #[arg(long, conflicts_with = "owner")]
    pub shared: bool,

    /// Glob pattern for directory scans
    #[arg(long)]
    pub pattern: Option<String>,

    /// Chunking preset
    #[arg(long)]
    pub preset: Option<String>,

    #[command(flatten)]
    pub embedder: EmbedderArgs,
}

#[derive(Args)]
pub struct QueryArgs {
    /// Query text
    #[arg(required = true)]
    pub query: Vec<String>,

    /// Owner whose documents (plus shared ones) are searched
    #[arg(long, default_value = "local")]
    pub owner: String,

    /// Number of results
    #[arg(short = 'n')]
    pub limit: Option<usize>,

    /// Minimum vector similarity
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Disable reranking
    #[arg(long)]
    pub no_rerank: bool,

    /// Neighbour chunks to include around top results
    #[arg(long)]
    pub context_window: Option<usize>,

    /// Print retrieval debug info
    #[arg(long)]
    pub debug: bool,

    #[command(flatten)]
    pub embedder: EmbedderArgs,
}

#[derive(Args)]
pub struct StatsArgs {
    /// List documents, optionally for one owner
    #[arg(long)]
    pub documents: bool,

    #[arg(long, requires = "documents")]
    pub owner: Option<String>,
}

#[derive(Args)]
pub struct EmbedderArgs {
    /// Embedding backend
    #[arg(long, value_enum, default_value = "http", env = "RAGPIPE_EMBEDDER")]
    pub embedder: EmbedderKind,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    /// OpenAI-compatible embeddings service
    Http,
    /// Offline feature hashing
    Hash,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Cli,
    Json,
    Md,
}
