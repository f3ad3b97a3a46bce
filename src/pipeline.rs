//! Pipeline orchestrator
//!
//! Wires the shard reader and the merge integrator together: the reader
//! pool runs as a producer while this loop drains newly completed shards
//! in batches and folds them, together with the previous round's result,
//! into a single database. The orchestrator suspends in exactly two
//! places: waiting for shard batches and waiting for a merge round.
//! Successive merge invocations never overlap.
//!
//! The final publish is one atomic rename of the last merged file onto
//! the configured output path.

use crate::config::{MergeStrategy, PipelineConfig};
use crate::error::{ConfigError, PipelineError, Result};
use crate::mapper::RecordMapper;
use crate::merge::{Integrator, MergeConfig};
use crate::progress::ProgressReporter;
use crate::reader::{source, ReaderConfig, ShardReader, ShardStream};
use crate::schema::TableSchema;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Result of a completed run
#[derive(Debug)]
pub struct PipelineReport {
    /// Published output path
    pub output: PathBuf,

    /// Input files fully processed
    pub files_processed: u64,

    /// Input files aborted by contained errors
    pub files_failed: u64,

    /// Lines scanned
    pub lines_read: u64,

    /// Lines dropped by mapping failures
    pub lines_skipped: u64,

    /// Rows written into shards
    pub rows_written: u64,

    /// Input bytes scanned
    pub bytes_read: u64,

    /// Merge rounds executed
    pub merge_rounds: u64,

    /// Shard files absorbed during merging
    pub shards_absorbed: u64,

    /// Wall-clock duration of the run
    pub duration: Duration,

    /// Unmerged shard paths (populated only when integration is skipped)
    pub shard_paths: Vec<PathBuf>,
}

/// The assembled pipeline
pub struct Pipeline {
    config: PipelineConfig,
    tables: Arc<Vec<TableSchema>>,
    mapper: Arc<dyn RecordMapper>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        tables: Vec<TableSchema>,
        mapper: Arc<dyn RecordMapper>,
    ) -> Self {
        Self {
            config,
            tables: Arc::new(tables),
            mapper,
        }
    }

    /// Run the pipeline to completion
    pub fn run(self) -> Result<PipelineReport> {
        let start = Instant::now();

        let inputs = source::discover(&self.config.input, self.config.since, self.config.until)?;
        if inputs.is_empty() {
            return Err(ConfigError::NoInputFiles {
                path: self.config.input.clone(),
            }
            .into());
        }
        let total_files = inputs.len() as u64;

        info!(
            files = total_files,
            readers = self.config.readers,
            mergers = self.config.mergers,
            "Starting pipeline"
        );

        let reader = ShardReader::new(
            ReaderConfig {
                workers: self.config.readers.min(inputs.len()),
                batch_size: self.config.batch_size,
                handoff_capacity: self.config.handoff_capacity,
                output_dir: self.config.shard_dir.clone(),
            },
            Arc::clone(&self.tables),
            Arc::clone(&self.mapper),
        );
        let stats = reader.stats();
        let (stream, handle) = reader.start(inputs)?;

        let progress = self
            .config
            .show_progress
            .then(ProgressReporter::new);

        if self.config.skip_integration {
            let shards = drain_all(&stream, self.config.handoff_capacity);
            handle.join()?;
            if let Some(p) = &progress {
                p.finish("Shards produced, integration skipped");
            }
            info!(shards = shards.len(), "Integration skipped, shards left on disk");

            return Ok(self.report(&stats, start, 0, 0, shards));
        }

        let integrator = self.build_integrator();
        let mut merged: Option<PathBuf> = None;
        let mut pending: Vec<PathBuf> = Vec::new();

        while let Some(batch) = stream.recv_batch(self.config.handoff_capacity) {
            if let Some(p) = &progress {
                p.update(&stats, total_files, batch.len());
            }

            // Carry the previous round's result into this one
            if let Some(prev) = merged.take() {
                pending.push(prev);
            }
            pending.extend(batch);

            debug!(pending = pending.len(), "Integrating shard batch");
            merged = Some(integrator.run(std::mem::take(&mut pending))?);
        }

        handle.join()?;

        let last = merged.ok_or(PipelineError::NoShards)?;
        std::fs::rename(&last, &self.config.output).map_err(|e| PipelineError::Rename {
            path: last.clone(),
            source: e,
        })?;
        info!(output = %self.config.output.display(), "Published merged database");

        if let Some(p) = &progress {
            p.finish("Pipeline complete");
        }

        let (rounds, absorbed) = integrator
            .stats()
            .map(|s| (s.rounds(), s.shards_absorbed()))
            .unwrap_or((0, 0));

        Ok(self.report(&stats, start, rounds, absorbed, Vec::new()))
    }

    fn build_integrator(&self) -> Integrator {
        match self.config.strategy {
            MergeStrategy::Simple => {
                Integrator::simple(Arc::clone(&self.tables), self.config.keep_intermediates)
            }
            MergeStrategy::Tournament => Integrator::tournament(
                MergeConfig {
                    workers: self.config.mergers,
                    group_size: self.config.group_size,
                    retain_sources: self.config.keep_intermediates,
                },
                Arc::clone(&self.tables),
            ),
        }
    }

    fn report(
        &self,
        stats: &crate::reader::ReaderStats,
        start: Instant,
        merge_rounds: u64,
        shards_absorbed: u64,
        shard_paths: Vec<PathBuf>,
    ) -> PipelineReport {
        PipelineReport {
            output: self.config.output.clone(),
            files_processed: stats.files_processed(),
            files_failed: stats.files_failed(),
            lines_read: stats.lines_read(),
            lines_skipped: stats.lines_skipped(),
            rows_written: stats.rows_written(),
            bytes_read: stats.bytes_read(),
            merge_rounds,
            shards_absorbed,
            duration: start.elapsed(),
            shard_paths,
        }
    }
}

fn drain_all(stream: &ShardStream, batch_max: usize) -> Vec<PathBuf> {
    let mut shards = Vec::new();
    while let Some(batch) = stream.recv_batch(batch_max) {
        shards.extend(batch);
    }
    shards
}
