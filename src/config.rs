//! RANGEINGEST - Evaluation Configuration
//! Defines tunable parameters for the ingestion evaluator.

use std::path::PathBuf;

/// Configuration for sorted-table evaluation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory sorted-table files are loaded from by the CLI.
    pub data_dir: PathBuf,

    /// Recompute caller-supplied statistics and compare them against a full
    /// scan when shadowing is disallowed.
    pub verify_statistics: bool,

    /// Namespace stamped on the columnar projection of ingested tables.
    pub projection_namespace: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            verify_statistics: cfg!(debug_assertions),
            projection_namespace: 0,
        }
    }
}

impl Config {
    /// Create a new Config with a custom data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Force statistics verification on or off.
    pub fn with_verify_statistics(mut self, verify: bool) -> Self {
        self.verify_statistics = verify;
        self
    }

    /// Ensure the data directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}
