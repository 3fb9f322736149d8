//! Progress reporting on stderr

use std::io::{self, Write};

/// Per-file progress line for long-running commands
pub struct ProgressReporter {
    total: usize,
    processed: usize,
}

impl ProgressReporter {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            processed: 0,
        }
    }

    pub fn set_message(&self, msg: &str) {
        eprint!("\r[{}/{}] {:<60}", self.processed + 1, self.total, msg);
        io::stderr().flush().ok();
    }

    pub fn increment(&mut self) {
        self.processed += 1;
    }

    pub fn finish(&self) {
        eprintln!("\r{:<72}", format!("Processed {}/{} files", self.processed, self.total));
    }
}
