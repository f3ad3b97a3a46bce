//! Tournament-merge integrator
//!
//! Folds a list of shard database paths down to one file through
//! repeated rounds of pairwise (or G-wise) merges. Within a round the
//! groups merge concurrently on a small worker pool; rounds themselves
//! are strictly sequential. Each full group merges into its first
//! member in place, so a round creates no new files and the reduction
//! needs no extra disk headroom beyond the shards themselves.
//!
//! ```text
//!  round 0:  [a b] [c d] [e]        round 1:  [a c] [e]       round 2: [a e]
//!             a◀─b  c◀─d  pass                 a◀─c  pass               a◀─e
//! ```
//!
//! A merge failure is fatal for the whole run: a partially merged group
//! would leave the frontier inconsistent, and silently dropping or
//! duplicating rows is worse than failing loudly.

use crate::db::ShardDb;
use crate::error::{DbError, PipelineError, Result};
use crate::schema::TableSchema;
use crossbeam_channel::{Receiver, Sender};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default number of shards merged per group
pub const DEFAULT_GROUP_SIZE: usize = 2;

/// Integrator configuration
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Concurrent group merges per round
    pub workers: usize,

    /// Shards per merge group
    pub group_size: usize,

    /// Keep absorbed shard files instead of deleting them
    pub retain_sources: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            group_size: DEFAULT_GROUP_SIZE,
            retain_sources: false,
        }
    }
}

/// Counters for the merge stage
#[derive(Debug, Default)]
pub struct MergeStats {
    /// Completed reduction rounds
    pub rounds: AtomicU64,

    /// Shard files absorbed into a base
    pub shards_absorbed: AtomicU64,
}

impl MergeStats {
    pub fn rounds(&self) -> u64 {
        self.rounds.load(Ordering::Relaxed)
    }

    pub fn shards_absorbed(&self) -> u64 {
        self.shards_absorbed.load(Ordering::Relaxed)
    }
}

/// Merge strategy, chosen at construction
///
/// `Simple` folds every path into the first sequentially; useful for
/// debugging and for tiny runs. `Tournament` is the default grouped
/// reduction.
pub enum Integrator {
    Simple(SimpleIntegrator),
    Tournament(TournamentIntegrator),
}

impl Integrator {
    pub fn simple(tables: Arc<Vec<TableSchema>>, retain_sources: bool) -> Self {
        Integrator::Simple(SimpleIntegrator {
            tables,
            retain_sources,
        })
    }

    pub fn tournament(config: MergeConfig, tables: Arc<Vec<TableSchema>>) -> Self {
        Integrator::Tournament(TournamentIntegrator {
            config,
            tables,
            stats: Arc::new(MergeStats::default()),
        })
    }

    /// Reduce `paths` to a single database file and return its path
    pub fn run(&self, paths: Vec<PathBuf>) -> Result<PathBuf> {
        match self {
            Integrator::Simple(s) => s.run(paths),
            Integrator::Tournament(t) => t.run(paths),
        }
    }

    /// Merge statistics (tournament only)
    pub fn stats(&self) -> Option<Arc<MergeStats>> {
        match self {
            Integrator::Simple(_) => None,
            Integrator::Tournament(t) => Some(Arc::clone(&t.stats)),
        }
    }
}

/// Sequential fold of every path into the first
pub struct SimpleIntegrator {
    tables: Arc<Vec<TableSchema>>,
    retain_sources: bool,
}

impl SimpleIntegrator {
    pub fn run(&self, mut paths: Vec<PathBuf>) -> Result<PathBuf> {
        let Some(base) = paths.first().cloned() else {
            return Err(PipelineError::NoShards);
        };
        let members = paths.split_off(1);

        merge_group(&base, &members, &self.tables, self.retain_sources, None)?;
        Ok(base)
    }
}

/// Grouped reduction with a per-round worker pool
pub struct TournamentIntegrator {
    config: MergeConfig,
    tables: Arc<Vec<TableSchema>>,
    stats: Arc<MergeStats>,
}

/// One full group: merge `members` into `base`
struct MergeJob {
    base: PathBuf,
    members: Vec<PathBuf>,
}

impl TournamentIntegrator {
    /// Repeat rounds until one path remains
    pub fn run(&self, mut frontier: Vec<PathBuf>) -> Result<PathBuf> {
        if frontier.is_empty() {
            return Err(PipelineError::NoShards);
        }

        while frontier.len() > 1 {
            debug!(frontier = frontier.len(), "Starting merge round");
            frontier = self.run_round(frontier)?;
            self.stats.rounds.fetch_add(1, Ordering::Relaxed);
        }

        frontier.pop().ok_or(PipelineError::NoShards)
    }

    /// Run one reduction round over the frontier
    ///
    /// Consecutive groups of `group_size` paths are formed in order; a
    /// trailing group shorter than that passes through unchanged. Full
    /// groups merge concurrently; the returned frontier preserves group
    /// order regardless of completion order, because every full group
    /// reduces to its own first element.
    pub fn run_round(&self, paths: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
        let group_size = self.config.group_size;
        let mut next = Vec::with_capacity(paths.len().div_ceil(group_size));
        let mut jobs = Vec::new();

        for group in paths.chunks(group_size) {
            if group.len() == group_size {
                next.push(group[0].clone());
                jobs.push(MergeJob {
                    base: group[0].clone(),
                    members: group[1..].to_vec(),
                });
            } else {
                // Short trailing group: pass through untouched
                next.extend(group.iter().cloned());
            }
        }

        if !jobs.is_empty() {
            self.run_jobs(jobs)?;
        }

        Ok(next)
    }

    fn run_jobs(&self, jobs: Vec<MergeJob>) -> Result<()> {
        let workers = self.config.workers.min(jobs.len()).max(1);

        let (job_tx, job_rx): (Sender<MergeJob>, Receiver<MergeJob>) =
            crossbeam_channel::bounded(jobs.len());
        for job in jobs {
            job_tx.send(job).expect("job queue rejected merge group");
        }
        drop(job_tx);

        let (err_tx, err_rx) = crossbeam_channel::unbounded::<DbError>();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let err_tx = err_tx.clone();
                scope.spawn(move || {
                    while let Ok(job) = job_rx.recv() {
                        let merged = merge_group(
                            &job.base,
                            &job.members,
                            &self.tables,
                            self.config.retain_sources,
                            Some(self.stats.as_ref()),
                        );
                        if let Err(e) = merged {
                            let _ = err_tx.send(e);
                            return;
                        }
                    }
                });
            }
        });
        drop(err_tx);

        match err_rx.try_recv() {
            Ok(e) => Err(e.into()),
            Err(_) => Ok(()),
        }
    }
}

/// Merge `members` into `base` in order, deleting each on success
fn merge_group(
    base: &std::path::Path,
    members: &[PathBuf],
    tables: &Arc<Vec<TableSchema>>,
    retain_sources: bool,
    stats: Option<&MergeStats>,
) -> std::result::Result<(), DbError> {
    if members.is_empty() {
        return Ok(());
    }

    let mut db = ShardDb::open(base, Arc::clone(tables))?;
    db.create_tables_if_not_exist()?;

    for member in members {
        db.merge(member)?;
        if let Some(stats) = stats {
            stats.shards_absorbed.fetch_add(1, Ordering::Relaxed);
        }

        if retain_sources {
            continue;
        }
        if let Err(e) = std::fs::remove_file(member) {
            // The merged data is already safe in the base; a stray
            // source file is not worth failing the run over.
            warn!(path = %member.display(), error = %e, "Failed to delete absorbed shard");
        }
    }

    db.close()?;
    info!(base = %base.display(), absorbed = members.len(), "Merged group");
    Ok(())
}
