// ==============================================================================
// checkpoint.rs - Resumable Progress Checkpoint
// ==============================================================================
// Description: Persisted processing progress, overwritten after every line
// Author: Matt Barham
// Created: 2025-11-21
// Modified: 2025-12-06
// Version: 1.2.0
// ==============================================================================
// File format (JSON):
//   {
//     "line_number": 1042,
//     "samples": {"father": "father_filtered.vcf"},
//     "samples_counter": {"father": 17},
//     "samples_offset": {"father": 48211}
//   }
// `samples_offset` is optional so checkpoints without it still load.
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::persist::{self, PersistError};

/// Progress after the last fully processed data line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Ordinal of the last completed line
    pub line_number: u64,

    /// Sample -> output file name (relative to the output directory)
    pub samples: BTreeMap<String, String>,

    /// Sample -> records emitted so far
    pub samples_counter: BTreeMap<String, u64>,

    /// Sample -> committed byte length of its output file
    #[serde(default)]
    pub samples_offset: BTreeMap<String, u64>,
}

impl Checkpoint {
    /// Registry and counters cover the same samples; offsets cover no others
    pub fn is_consistent(&self) -> bool {
        self.samples.keys().eq(self.samples_counter.keys())
            && self
                .samples_offset
                .keys()
                .all(|sample| self.samples.contains_key(sample))
    }
}

/// Load/save access to the checkpoint file
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last saved checkpoint, if a usable one exists
    pub fn load(&self) -> Option<Checkpoint> {
        info!("Searching for saved progress in {:?}", self.path);

        let checkpoint: Checkpoint = persist::load_json(&self.path, "checkpoint")?;
        if !checkpoint.is_consistent() {
            warn!(
                "Ignoring checkpoint {:?}: sample registry and counters disagree",
                self.path
            );
            return None;
        }

        info!(
            "Loaded checkpoint: line {}, {} samples",
            checkpoint.line_number,
            checkpoint.samples.len()
        );
        Some(checkpoint)
    }

    /// Atomically replace the checkpoint file
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), PersistError> {
        persist::save_json(&self.path, checkpoint, "checkpoint")
    }
}
