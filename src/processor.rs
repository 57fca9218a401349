// ==============================================================================
// processor.rs - Resumable Fan-out Pipeline
// ==============================================================================
// Description: Drives the line source through the per-sample filter, the
//              annotation cache and the output router, checkpointing after
//              every data line
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2025-12-06
// Version: 3.0.0
// ==============================================================================
// States: Init -> Skipping (resume only) -> Processing -> Done
//         any state -> Failed on stream, config or persistence errors
// ==============================================================================

use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::AsyncBufRead;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::annotation::GeneAnnotator;
use crate::audit::{self, AuditEventType};
use crate::cache::AnnotationCache;
use crate::checkpoint::CheckpointStore;
use crate::config::{ConfigError, RunConfiguration};
use crate::filter::{VariantFilter, Verdict};
use crate::models::{DataLine, StreamHeader};
use crate::output::{self, OutputError, SampleOutputRouter};
use crate::parsers::{LineSource, StreamError};
use crate::persist::PersistError;

/// Data lines between two progress log records
const PROGRESS_INTERVAL: u64 = 10_000;

/// Fatal pipeline errors; persisted state is left in place for resume
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    Skipping,
    Processing,
    Done,
    Failed,
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Decoded lines, header and blank lines included
    pub lines_read: u64,
    /// Data lines already covered by the checkpoint
    pub lines_skipped: u64,
    pub lines_processed: u64,
    pub records_emitted: u64,
    pub malformed_records: u64,
    pub annotation_failures: u64,
    pub cache_hits: u64,
    pub annotation_calls: u64,
    /// Every sample reached the limit before the input was exhausted
    pub stopped_early: bool,
}

pub struct Pipeline<A: GeneAnnotator> {
    run_id: Uuid,
    limit: u64,
    output_dir: PathBuf,
    filter: VariantFilter,
    cache: AnnotationCache,
    annotator: A,
    checkpoints: CheckpointStore,
    state: PipelineState,
}

impl<A: GeneAnnotator> Pipeline<A> {
    /// Validate the configuration and load the annotation cache
    pub fn new(config: &RunConfiguration, annotator: A) -> Result<Self, PipelineError> {
        config.validate()?;

        Ok(Self {
            run_id: Uuid::new_v4(),
            limit: config.limit,
            output_dir: config.output_dir.clone(),
            filter: VariantFilter::from_config(config),
            cache: AnnotationCache::load(&config.cache_file),
            annotator,
            checkpoints: CheckpointStore::new(&config.progress_file),
            state: PipelineState::Init,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn cache(&self) -> &AnnotationCache {
        &self.cache
    }

    pub fn annotator(&self) -> &A {
        &self.annotator
    }

    /// Process a gzip-compressed input stream from the start
    ///
    /// Lines covered by the saved checkpoint are skipped, so calling this
    /// again after a crash continues where the last run stopped.
    pub async fn run<R>(&mut self, input: R) -> Result<RunSummary, PipelineError>
    where
        R: AsyncBufRead + Unpin,
    {
        let result = self.drive(input).await;
        self.state = match result {
            Ok(_) => PipelineState::Done,
            Err(_) => PipelineState::Failed,
        };
        result
    }

    async fn drive<R>(&mut self, input: R) -> Result<RunSummary, PipelineError>
    where
        R: AsyncBufRead + Unpin,
    {
        self.state = PipelineState::Init;

        let checkpoint = self.checkpoints.load();
        let mut router = match &checkpoint {
            Some(checkpoint) => SampleOutputRouter::restore(&self.output_dir, checkpoint)?,
            None => SampleOutputRouter::new(&self.output_dir),
        };
        let resume_after = checkpoint.as_ref().map(|checkpoint| checkpoint.line_number);

        if let Some(checkpoint) = &checkpoint {
            audit::log_event(
                self.run_id,
                AuditEventType::RunResumed,
                serde_json::json!({
                    "line_number": checkpoint.line_number,
                    "samples_counter": checkpoint.samples_counter,
                }),
            );
        }

        let mut source = LineSource::new(input).await?;
        let mut summary = RunSummary::default();
        let mut unwritable: Option<HashSet<String>> = None;

        self.state = match resume_after {
            Some(_) => PipelineState::Skipping,
            None => PipelineState::Processing,
        };

        while let Some(line) = source.next_data_line().await? {
            if resume_after.is_some_and(|last| line.ordinal <= last) {
                summary.lines_skipped += 1;
                continue;
            }

            if self.state == PipelineState::Skipping {
                info!(
                    "Skipped {} completed data lines, resuming at line {}",
                    summary.lines_skipped, line.ordinal
                );
                self.state = PipelineState::Processing;
            }

            let unwritable = unwritable.get_or_insert_with(|| unwritable_samples(&line.header));

            if self.is_saturated(&line.header, &router, unwritable) {
                info!(
                    "Every sample reached the limit of {} records, stopping at line {}",
                    self.limit, line.ordinal
                );
                summary.stopped_early = true;
                break;
            }

            self.process_line(&line, &mut router, unwritable, &mut summary)
                .await?;
            self.checkpoints.save(&router.checkpoint(line.ordinal))?;

            summary.lines_processed += 1;
            debug!("Line {} processed", line.ordinal);
            if summary.lines_processed % PROGRESS_INTERVAL == 0 {
                info!(
                    "Progress: line {}, {} lines processed, {} records emitted",
                    line.ordinal, summary.lines_processed, summary.records_emitted
                );
            }
        }

        if let Some(last) = resume_after {
            if last >= source.lines_read() {
                warn!(
                    "Checkpoint at line {} is beyond the end of the input ({} lines)",
                    last,
                    source.lines_read()
                );
            } else if self.state == PipelineState::Skipping {
                info!("Input already fully processed");
            }
        }

        let stats = self.cache.stats();
        summary.lines_read = source.lines_read();
        summary.cache_hits = stats.hits;
        summary.annotation_calls = stats.annotation_calls;
        summary.annotation_failures = stats.annotation_failures;

        info!("Run {} finished: {:?}", self.run_id, summary);
        Ok(summary)
    }

    /// Filter, annotate and route every sample of one data line
    async fn process_line(
        &mut self,
        line: &DataLine,
        router: &mut SampleOutputRouter,
        unwritable: &HashSet<String>,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        let fields = line.fields();

        for (index, sample) in line.header.sample_ids().iter().enumerate() {
            if unwritable.contains(sample) {
                debug!("Skipping line {} for unwritable sample {}", line.ordinal, sample);
                summary.malformed_records += 1;
                continue;
            }

            if router.counter(sample) >= self.limit {
                continue;
            }

            let record = match self.filter.evaluate(&fields, index) {
                Ok(Verdict::Accepted(record)) => record,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Skipping line {} for sample {}: {}", line.ordinal, sample, e);
                    summary.malformed_records += 1;
                    continue;
                }
            };

            let gene = self.cache.resolve(record.locus(), &self.annotator).await?;
            router.emit(sample, &record.into_row(&gene), &line.header)?;
            summary.records_emitted += 1;

            if router.counter(sample) == self.limit {
                audit::log_event(
                    self.run_id,
                    AuditEventType::SampleLimitReached,
                    serde_json::json!({
                        "sample": sample,
                        "limit": self.limit,
                        "line_number": line.ordinal,
                    }),
                );
            }
        }

        Ok(())
    }

    fn is_saturated(
        &self,
        header: &StreamHeader,
        router: &SampleOutputRouter,
        unwritable: &HashSet<String>,
    ) -> bool {
        header
            .sample_ids()
            .iter()
            .all(|sample| unwritable.contains(sample) || router.counter(sample) >= self.limit)
    }
}

/// Samples whose identifier cannot name an output file
fn unwritable_samples(header: &StreamHeader) -> HashSet<String> {
    header
        .sample_ids()
        .iter()
        .filter(|sample| match output::file_name_for(sample) {
            Ok(_) => false,
            Err(e) => {
                warn!("Ignoring sample: {}", e);
                true
            }
        })
        .cloned()
        .collect()
}
