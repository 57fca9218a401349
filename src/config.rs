// ==============================================================================
// config.rs - Run Configuration
// ==============================================================================
// Description: JSON run configuration, structural column layout and validation
// Author: Matt Barham
// Created: 2025-11-20
// Modified: 2025-12-02
// Version: 1.1.0
// ==============================================================================
// Format: JSON object; key names match existing configurations.json files
// Example:
//   {
//     "data_url": "https://example.org/cohort.vcf.gz",
//     "API_URL": "https://annotator.example.org/gene",
//     "cache_file": "cache.json",
//     "progress_file": "progress.json",
//     "limit": 50, "max_limit": 1000,
//     "start": 1, "end": 1000000, "minDP": 10,
//     "chrom": 0, "pos": 1, "ref": 3, "alt": 4, "format": 8, "info": 7
//   }
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Number of fixed structural columns preceding the sample columns
pub const FIXED_COLUMNS: usize = 9;

/// Configuration errors (always fatal, raised before any processing)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("The limit must be an integer less than {max_limit} (got {limit})")]
    LimitOutOfRange { limit: u64, max_limit: u64 },

    #[error("Invalid position window: start {start} > end {end}")]
    InvalidWindow { start: u64, end: u64 },

    #[error("Column index for {name} must address one of the 9 fixed columns (got {index})")]
    ColumnOutOfRange { name: &'static str, index: usize },

    #[error("Depth key must not be empty")]
    EmptyDepthKey,
}

/// Indices of the structural columns inside the fixed block
///
/// Columns are located by position, not by name, so nonstandard layouts work
/// as long as the indices are configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLayout {
    #[serde(rename = "chrom", default = "default_chrom")]
    pub chromosome: usize,
    #[serde(rename = "pos", default = "default_pos")]
    pub position: usize,
    #[serde(rename = "ref", default = "default_ref")]
    pub reference: usize,
    #[serde(rename = "alt", default = "default_alt")]
    pub alternate: usize,
    #[serde(default = "default_format")]
    pub format: usize,
    #[serde(default = "default_info")]
    pub info: usize,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            chromosome: default_chrom(),
            position: default_pos(),
            reference: default_ref(),
            alternate: default_alt(),
            format: default_format(),
            info: default_info(),
        }
    }
}

impl ColumnLayout {
    fn validate(&self) -> Result<(), ConfigError> {
        let indices = [
            ("chrom", self.chromosome),
            ("pos", self.position),
            ("ref", self.reference),
            ("alt", self.alternate),
            ("format", self.format),
            ("info", self.info),
        ];

        for (name, index) in indices {
            if index >= FIXED_COLUMNS {
                return Err(ConfigError::ColumnOutOfRange { name, index });
            }
        }

        Ok(())
    }
}

/// Read-only configuration for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfiguration {
    /// http(s) URL, file:// URL or local path of the gzip-compressed input
    pub data_url: String,

    /// Annotation service endpoint
    #[serde(rename = "API_URL")]
    pub api_url: String,

    /// Annotation cache file
    pub cache_file: PathBuf,

    /// Checkpoint file
    pub progress_file: PathBuf,

    /// Per-sample emission limit
    pub limit: u64,

    /// Exclusive upper bound for `limit`
    pub max_limit: u64,

    /// Inclusive position window
    pub start: u64,
    pub end: u64,

    /// Depth must be strictly greater than this value
    #[serde(rename = "minDP")]
    pub min_depth: i64,

    #[serde(flatten)]
    pub columns: ColumnLayout,

    /// Genotype key holding the read depth
    #[serde(default = "default_depth_key")]
    pub depth_key: String,

    /// Reference genome build sent with every annotation request
    #[serde(default = "default_reference_version")]
    pub reference_version: String,

    /// Directory receiving the per-sample output files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Timeout applied to each annotation request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl RunConfiguration {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: RunConfiguration =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the pipeline relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limit >= self.max_limit {
            return Err(ConfigError::LimitOutOfRange {
                limit: self.limit,
                max_limit: self.max_limit,
            });
        }

        if self.start > self.end {
            return Err(ConfigError::InvalidWindow {
                start: self.start,
                end: self.end,
            });
        }

        if self.depth_key.is_empty() {
            return Err(ConfigError::EmptyDepthKey);
        }

        self.columns.validate()
    }

    /// Thresholds consumed by the variant filter
    pub fn thresholds(&self) -> FilterThresholds {
        FilterThresholds {
            start: self.start,
            end: self.end,
            min_depth: self.min_depth,
        }
    }
}

/// Position window and depth threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterThresholds {
    pub start: u64,
    pub end: u64,
    pub min_depth: i64,
}

fn default_chrom() -> usize {
    0
}

fn default_pos() -> usize {
    1
}

fn default_ref() -> usize {
    3
}

fn default_alt() -> usize {
    4
}

fn default_format() -> usize {
    8
}

fn default_info() -> usize {
    7
}

fn default_depth_key() -> String {
    "DP".to_string()
}

fn default_reference_version() -> String {
    "hg19".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_request_timeout_secs() -> u64 {
    30
}
