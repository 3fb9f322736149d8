//! Error types for ragpipe

use thiserror::Error;

/// Result type alias using RagPipeError
pub type Result<T> = std::result::Result<T, RagPipeError>;

/// Error type alias for convenience
pub type Error = RagPipeError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
}

/// Main error type for ragpipe
#[derive(Debug, Error)]
pub enum RagPipeError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Glob pattern error: {0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Document is empty")]
    EmptyDocument,

    #[error("No text blocks found in document")]
    NoBlocks,

    #[error("Invalid chunking configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Operation timed out after {0} ms")]
    Timeout(u64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External service error: {0}")]
    ExternalError(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl RagPipeError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnknownPreset(_) => exit_codes::NOT_FOUND,
            Self::InvalidConfig(_)
            | Self::Config(_)
            | Self::EmptyDocument
            | Self::NoBlocks
            | Self::GlobPattern(_)
            | Self::InvalidInput(_) => exit_codes::INVALID_INPUT,
            _ => exit_codes::GENERAL_ERROR,
        }
    }

    /// True for errors raised by a remote provider signalling throttling
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Http(e) => e.status().map(|s| s.as_u16() == 429).unwrap_or(false),
            Self::ExternalError(msg) | Self::Embedding(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("429") || lower.contains("rate limit") || lower.contains("quota")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_lists_violations() {
        let err = RagPipeError::InvalidConfig(vec![
            "chunk_size must be at least 50".into(),
            "overlap must be less than chunk_size".into(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("chunk_size must be at least 50"));
        assert!(msg.contains("overlap must be less than chunk_size"));
        assert_eq!(err.exit_code(), exit_codes::INVALID_INPUT);
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(RagPipeError::Embedding("HTTP 429 Too Many Requests".into()).is_rate_limited());
        assert!(RagPipeError::ExternalError("Rate limit exceeded".into()).is_rate_limited());
        assert!(!RagPipeError::Embedding("connection refused".into()).is_rate_limited());
        assert!(!RagPipeError::EmptyDocument.is_rate_limited());
    }
}
