//! Shard-producing reader
//!
//! A pool of worker threads turns input files into independent shard
//! databases. Each worker owns at most one input stream and one SQLite
//! connection at a time, so open file handles stay bounded by the worker
//! count. Finished shard paths are published through the bounded handoff
//! queue; the orchestrator drains them concurrently.
//!
//! ```text
//!  inputs ──▶ work queue ──▶ ┌──────────┐
//!                            │ worker 0 │──▶ shard.db ─┐
//!                            │ worker 1 │──▶ shard.db ─┤  bounded
//!                            │   ...    │              ├─ handoff ──▶ orchestrator
//!                            │ worker N │──▶ shard.db ─┘   queue
//!                            └──────────┘
//! ```
//!
//! Error containment: a bad line is logged and skipped; a failed file is
//! logged, its partial shard removed, and the worker moves on. Neither
//! is fatal to the run.

pub mod handoff;
pub mod source;

pub use handoff::{HandoffStats, ShardQueue, ShardSender, ShardStream};

use crate::db::{RowBatch, ShardDb};
use crate::error::{ReadError, WorkerError};
use crate::mapper::RecordMapper;
use crate::schema::TableSchema;
use crossbeam_channel::Receiver;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Emit a progress log line every this many input lines
const LINE_LOG_INTERVAL: u64 = 100_000;

/// Reader pool configuration
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Number of worker threads
    pub workers: usize,

    /// Rows buffered per table before a flush
    pub batch_size: usize,

    /// Handoff queue capacity (bound on finished, unconsumed shards)
    pub handoff_capacity: usize,

    /// Directory shard databases are written into
    pub output_dir: PathBuf,
}

/// Counters shared by all reader workers
#[derive(Debug, Default)]
pub struct ReaderStats {
    /// Input files fully processed into a published shard
    pub files_processed: AtomicU64,

    /// Input files aborted by a read or write failure
    pub files_failed: AtomicU64,

    /// Lines scanned across all files
    pub lines_read: AtomicU64,

    /// Lines dropped by mapping failures
    pub lines_skipped: AtomicU64,

    /// Rows handed to bulk inserts
    pub rows_written: AtomicU64,

    /// Input bytes scanned (before decompression accounting)
    pub bytes_read: AtomicU64,
}

impl ReaderStats {
    pub fn files_processed(&self) -> u64 {
        self.files_processed.load(Ordering::Relaxed)
    }

    pub fn files_failed(&self) -> u64 {
        self.files_failed.load(Ordering::Relaxed)
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read.load(Ordering::Relaxed)
    }

    pub fn lines_skipped(&self) -> u64 {
        self.lines_skipped.load(Ordering::Relaxed)
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written.load(Ordering::Relaxed)
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }
}

/// Handle to a running reader pool
pub struct ReaderHandle {
    workers: Vec<(usize, JoinHandle<()>)>,
}

impl ReaderHandle {
    /// Wait for every worker to finish
    pub fn join(self) -> Result<(), WorkerError> {
        for (id, handle) in self.workers {
            handle.join().map_err(|_| WorkerError::Panicked { id })?;
        }
        Ok(())
    }
}

/// Worker pool turning input files into shard databases
pub struct ShardReader {
    config: ReaderConfig,
    tables: Arc<Vec<TableSchema>>,
    mapper: Arc<dyn RecordMapper>,
    stats: Arc<ReaderStats>,
}

impl ShardReader {
    pub fn new(
        config: ReaderConfig,
        tables: Arc<Vec<TableSchema>>,
        mapper: Arc<dyn RecordMapper>,
    ) -> Self {
        Self {
            config,
            tables,
            mapper,
            stats: Arc::new(ReaderStats::default()),
        }
    }

    /// Shared reader statistics
    pub fn stats(&self) -> Arc<ReaderStats> {
        Arc::clone(&self.stats)
    }

    /// Spawn the worker pool over `inputs`
    ///
    /// Returns the consuming end of the handoff queue plus a join
    /// handle. The queue closes by itself once every worker has drained
    /// the work queue and exited.
    pub fn start(&self, inputs: Vec<PathBuf>) -> Result<(ShardStream, ReaderHandle), WorkerError> {
        let (work_tx, work_rx) = crossbeam_channel::bounded(inputs.len().max(1));
        for input in inputs {
            // Capacity covers every input, so this cannot block
            work_tx.send(input).expect("work queue rejected input");
        }
        drop(work_tx);

        let queue = ShardQueue::new(self.config.handoff_capacity);
        let stream = queue.stream();

        let mut workers = Vec::with_capacity(self.config.workers);
        for id in 0..self.config.workers {
            let worker = WorkerContext {
                id,
                config: self.config.clone(),
                tables: Arc::clone(&self.tables),
                mapper: Arc::clone(&self.mapper),
                stats: Arc::clone(&self.stats),
                work: work_rx.clone(),
                publish: queue.sender(),
            };

            let handle = thread::Builder::new()
                .name(format!("shard-reader-{}", id))
                .spawn(move || worker.run())
                .map_err(|e| WorkerError::InitFailed {
                    id,
                    reason: e.to_string(),
                })?;

            workers.push((id, handle));
        }

        // Drop the queue so only worker senders keep it open; its close
        // then marks end of production for the stream.
        drop(queue);

        info!(workers = self.config.workers, "Reader workers spawned");
        Ok((stream, ReaderHandle { workers }))
    }
}

/// Everything one reader worker needs
struct WorkerContext {
    id: usize,
    config: ReaderConfig,
    tables: Arc<Vec<TableSchema>>,
    mapper: Arc<dyn RecordMapper>,
    stats: Arc<ReaderStats>,
    work: Receiver<PathBuf>,
    publish: ShardSender,
}

impl WorkerContext {
    fn run(self) {
        debug!(worker = self.id, "Reader worker starting");

        while let Ok(input) = self.work.recv() {
            match self.process_file(&input) {
                Ok(shard) => {
                    self.stats.files_processed.fetch_add(1, Ordering::Relaxed);
                    if self.publish.publish(shard).is_err() {
                        // Consumer is gone; the run has been abandoned
                        warn!(worker = self.id, "Handoff queue closed, stopping");
                        return;
                    }
                }
                Err(e) => {
                    self.stats.files_failed.fetch_add(1, Ordering::Relaxed);
                    error!(
                        worker = self.id,
                        path = %input.display(),
                        error = %e,
                        "Failed to process input file"
                    );
                }
            }
        }

        debug!(worker = self.id, "Reader worker finished");
    }

    /// Stream one input file into a fresh shard database
    ///
    /// On failure the partial shard is removed so an aborted file never
    /// leaves a stray database on disk.
    fn process_file(&self, input: &Path) -> Result<PathBuf, ReadError> {
        let shard = source::shard_path(input, &self.config.output_dir);

        let result = self.read_into_shard(input, &shard);
        if result.is_err() {
            if let Err(e) = std::fs::remove_file(&shard) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %shard.display(), error = %e, "Failed to remove partial shard");
                }
            }
        }

        result.map(|_| shard)
    }

    fn read_into_shard(&self, input: &Path, shard: &Path) -> Result<(), ReadError> {
        info!(worker = self.id, path = %input.display(), "Reading input file");

        let mut db = ShardDb::create(shard, Arc::clone(&self.tables))?;
        let mut batch = RowBatch::new(&self.tables, self.config.batch_size);
        let mut reader = source::open_lines(input).map_err(|e| ReadError::Io {
            path: input.to_path_buf(),
            source: e,
        })?;

        let mut line_buf: Vec<u8> = Vec::with_capacity(4096);
        let mut scratch: Vec<crate::schema::Row> = Vec::new();
        let mut line_no: u64 = 0;

        loop {
            line_buf.clear();
            let n = reader
                .read_until(b'\n', &mut line_buf)
                .map_err(|e| ReadError::Io {
                    path: input.to_path_buf(),
                    source: e,
                })?;
            if n == 0 {
                break;
            }

            line_no += 1;
            self.stats.lines_read.fetch_add(1, Ordering::Relaxed);
            self.stats.bytes_read.fetch_add(n as u64, Ordering::Relaxed);

            let line = trim_line(&line_buf);
            if !line.is_empty() {
                self.map_line(input, line_no, line, &mut scratch, &mut batch);
            }

            if line_no % self.config.batch_size as u64 == 0 || batch.is_full() {
                self.flush(&mut db, &mut batch)?;
            }

            if line_no % LINE_LOG_INTERVAL == 0 {
                debug!(worker = self.id, path = %input.display(), lines = line_no, "Read lines");
            }
        }

        self.flush(&mut db, &mut batch)?;
        db.close()?;

        info!(
            worker = self.id,
            path = %input.display(),
            lines = line_no,
            shard = %shard.display(),
            "Finished input file"
        );
        Ok(())
    }

    /// Map one line, containing mapper failures to that line
    fn map_line(
        &self,
        input: &Path,
        line_no: u64,
        line: &[u8],
        scratch: &mut Vec<crate::schema::Row>,
        batch: &mut RowBatch,
    ) {
        scratch.clear();
        if let Err(e) = self.mapper.map_line(line, scratch) {
            self.stats.lines_skipped.fetch_add(1, Ordering::Relaxed);
            warn!(
                worker = self.id,
                path = %input.display(),
                line = line_no,
                error = %e,
                "Skipping unmappable line"
            );
            return;
        }

        for row in scratch.drain(..) {
            match batch.push(row) {
                Ok(()) => {
                    self.stats.rows_written.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.stats.lines_skipped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        worker = self.id,
                        path = %input.display(),
                        line = line_no,
                        error = %e,
                        "Dropping row from unmappable line"
                    );
                }
            }
        }
    }

    fn flush(&self, db: &mut ShardDb, batch: &mut RowBatch) -> Result<(), ReadError> {
        db.bulk_insert(batch)?;
        Ok(())
    }
}

/// Strip the trailing newline (and carriage return) from a raw line
fn trim_line(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
