// ==============================================================================
// output.rs - Per-Sample Output Router
// ==============================================================================
// Description: One append-only VCF file per sample, created lazily with the
//              stream header and truncated back to the checkpoint on resume
// Author: Matt Barham
// Created: 2025-11-06
// Modified: 2025-12-06
// Version: 2.0.0
// ==============================================================================
// Layout of <output_dir>/<sample>_filtered.vcf:
//   ##...                       <- every meta-header line of the input
//   #CHROM ... FORMAT <sample>  <- fixed columns plus this sample only
//   chr1 100 ... DP:GT 30:0/1   <- one row per accepted record
// ==============================================================================

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::checkpoint::Checkpoint;
use crate::models::StreamHeader;

/// Suffix appended to the sample identifier to form its file name
const OUTPUT_SUFFIX: &str = "_filtered.vcf";

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("I/O error on output file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Output for sample '{sample}' ({path:?}) does not match the checkpoint: {details}")]
    Diverged {
        sample: String,
        path: PathBuf,
        details: String,
    },

    #[error("Sample identifier '{0}' cannot be used as a file name")]
    UnsafeSampleName(String),
}

/// Output file name for a sample, rejecting identifiers that would escape
/// the output directory
pub fn file_name_for(sample: &str) -> Result<String, OutputError> {
    let unsafe_name = sample.is_empty()
        || sample.contains(['/', '\\', '\0'])
        || sample == "."
        || sample == "..";

    if unsafe_name {
        return Err(OutputError::UnsafeSampleName(sample.to_string()));
    }

    Ok(format!("{}{}", sample, OUTPUT_SUFFIX))
}

/// Registered destination of one sample
#[derive(Debug)]
struct SampleOutput {
    file_name: String,
    /// Opened on first append of this run
    file: Option<File>,
    counter: u64,
    /// Byte length of the file after the last emitted row
    offset: u64,
}

/// Owns every per-sample output file of a run
#[derive(Debug)]
pub struct SampleOutputRouter {
    output_dir: PathBuf,
    outputs: BTreeMap<String, SampleOutput>,
}

impl SampleOutputRouter {
    /// Router with no registered samples
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            outputs: BTreeMap::new(),
        }
    }

    /// Rebuild the registry from a checkpoint
    ///
    /// Files longer than their recorded offset hold rows of a line whose
    /// checkpoint was never written; they are cut back to the offset. A
    /// missing or shorter file cannot be reconciled and fails the run.
    pub fn restore(output_dir: impl AsRef<Path>, checkpoint: &Checkpoint) -> Result<Self, OutputError> {
        let mut router = Self::new(output_dir);

        for (sample, file_name) in &checkpoint.samples {
            let path = router.output_dir.join(file_name);
            let diverged = |details: String| OutputError::Diverged {
                sample: sample.clone(),
                path: path.clone(),
                details,
            };

            let length = fs::metadata(&path)
                .map_err(|e| diverged(format!("cannot stat file: {}", e)))?
                .len();

            let offset = match checkpoint.samples_offset.get(sample) {
                Some(&offset) if length < offset => {
                    return Err(diverged(format!(
                        "file has {} bytes, checkpoint recorded {}",
                        length, offset
                    )));
                }
                Some(&offset) if length > offset => {
                    warn!(
                        "Discarding {} uncommitted bytes from {:?}",
                        length - offset,
                        path
                    );
                    let file = OpenOptions::new()
                        .write(true)
                        .open(&path)
                        .map_err(|source| OutputError::Io {
                            path: path.clone(),
                            source,
                        })?;
                    file.set_len(offset).map_err(|source| OutputError::Io {
                        path: path.clone(),
                        source,
                    })?;
                    offset
                }
                Some(&offset) => offset,
                None => length,
            };

            let counter = checkpoint.samples_counter.get(sample).copied().unwrap_or(0);
            debug!("Restored output for {}: {} records, {} bytes", sample, counter, offset);

            router.outputs.insert(
                sample.clone(),
                SampleOutput {
                    file_name: file_name.clone(),
                    file: None,
                    counter,
                    offset,
                },
            );
        }

        info!("Restored {} sample outputs", router.outputs.len());
        Ok(router)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Records emitted for `sample` so far (0 for an unseen sample)
    pub fn counter(&self, sample: &str) -> u64 {
        self.outputs.get(sample).map_or(0, |output| output.counter)
    }

    /// Append one annotated row to the sample's output
    ///
    /// The first row of a sample creates its file (replacing any stale one)
    /// and writes the meta-header lines and the sample column header with it.
    /// Every write is flushed before returning.
    pub fn emit(&mut self, sample: &str, row: &str, header: &StreamHeader) -> Result<(), OutputError> {
        if let Some(output) = self.outputs.get_mut(sample) {
            let path = self.output_dir.join(&output.file_name);
            let io_error = |source| OutputError::Io {
                path: path.clone(),
                source,
            };

            let mut file = match output.file.take() {
                Some(file) => file,
                None => OpenOptions::new().append(true).open(&path).map_err(io_error)?,
            };
            file.write_all(row.as_bytes()).map_err(io_error)?;
            file.flush().map_err(io_error)?;
            output.file = Some(file);

            output.counter += 1;
            output.offset += row.len() as u64;
            return Ok(());
        }

        let file_name = file_name_for(sample)?;
        let path = self.output_dir.join(&file_name);
        let io_error = |source| OutputError::Io {
            path: path.clone(),
            source,
        };

        let mut contents = String::new();
        for line in &header.meta_lines {
            contents.push_str(line);
            contents.push('\n');
        }
        contents.push_str(&header.sample_column_header(sample));
        contents.push('\n');
        contents.push_str(row);

        fs::create_dir_all(&self.output_dir).map_err(io_error)?;
        let mut file = File::create(&path).map_err(io_error)?;
        file.write_all(contents.as_bytes()).map_err(io_error)?;
        file.flush().map_err(io_error)?;

        info!("Created output for sample {} at {:?}", sample, path);
        self.outputs.insert(
            sample.to_string(),
            SampleOutput {
                file_name,
                file: Some(file),
                counter: 1,
                offset: contents.len() as u64,
            },
        );

        Ok(())
    }

    /// Checkpoint describing the outputs after line `line_number`
    pub fn checkpoint(&self, line_number: u64) -> Checkpoint {
        let mut checkpoint = Checkpoint {
            line_number,
            ..Checkpoint::default()
        };

        for (sample, output) in &self.outputs {
            checkpoint
                .samples
                .insert(sample.clone(), output.file_name.clone());
            checkpoint.samples_counter.insert(sample.clone(), output.counter);
            checkpoint.samples_offset.insert(sample.clone(), output.offset);
        }

        checkpoint
    }
}
