//! File scanning for ingestion

use crate::error::Result;
use glob::Pattern;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Directories to exclude from scanning
const EXCLUDE_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".cache",
    "vendor",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    "target",
];

/// Text formats the chunkers understand
const DEFAULT_PATTERNS: &[&str] = &[
    "**/*.md", "**/*.txt", "**/*.csv", "**/*.tsv", "**/*.sql", "**/*.rs", "**/*.py", "**/*.js",
    "**/*.ts", "**/*.go", "**/*.java", "**/*.json", "**/*.yaml", "**/*.yml",
];

/// Scan result
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub path: PathBuf,
    pub relative_path: String,
}

/// Scan options
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// A file is kept if any pattern matches its path relative to the root
    pub patterns: Vec<String>,
    pub follow_symlinks: bool,
    pub exclude_dirs: Vec<String>,
    pub exclude_hidden: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS.iter().map(|s| s.to_string()).collect(),
            follow_symlinks: true,
            exclude_dirs: EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect(),
            exclude_hidden: true,
        }
    }
}

impl ScanOptions {
    /// Restrict scanning to a single glob pattern
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns = vec![pattern.into()];
        self
    }
}

/// Scan directory for files matching the configured patterns
pub fn scan_files(root: &Path, options: &ScanOptions) -> Result<Vec<ScanResult>> {
    let patterns = options
        .patterns
        .iter()
        .map(|p| Pattern::new(p))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut results = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(options.follow_symlinks)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !should_skip(e, options));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| path.to_string_lossy().to_string());

        if patterns.iter().any(|p| p.matches(&relative)) {
            results.push(ScanResult {
                path: path.to_path_buf(),
                relative_path: relative,
            });
        }
    }

    Ok(results)
}

/// Expand a mix of files and directories into files to ingest
///
/// Explicit file arguments are always kept; directories are scanned.
pub fn collect_paths(paths: &[PathBuf], options: &ScanOptions) -> Result<Vec<ScanResult>> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_dir() {
            out.extend(scan_files(path, options)?);
        } else {
            out.push(ScanResult {
                path: path.clone(),
                relative_path: path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.to_string_lossy().to_string()),
            });
        }
    }
    Ok(out)
}

fn should_skip(entry: &DirEntry, options: &ScanOptions) -> bool {
    let name = entry.file_name().to_string_lossy();

    if options.exclude_hidden && name.starts_with('.') {
        return true;
    }

    if entry.file_type().is_dir() && options.exclude_dirs.iter().any(|d| name == *d) {
        return true;
    }

    false
}
