//! Configuration types for ndjson2sqlite
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Table/column specification parsing for the built-in JSON mapper

use crate::error::ConfigError;
use crate::schema::{ColumnSpec, ColumnType, TableSchema};
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 256;

/// Batch size limits
const MIN_BATCH_SIZE: usize = 1;
const MAX_BATCH_SIZE: usize = 1_000_000;

/// Smallest group that still reduces the frontier
const MIN_GROUP_SIZE: usize = 2;

/// Smallest handoff queue that makes progress
const MIN_HANDOFF_CAPACITY: usize = 1;

/// Parallel NDJSON log to SQLite converter
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ndjson2sqlite",
    version,
    about = "Parallel NDJSON log to SQLite converter",
    long_about = "Converts a corpus of newline-delimited JSON log files (optionally \
                  gzip-compressed) into a single queryable SQLite database.\n\n\
                  Each input file is read into its own shard database by a worker \
                  pool, then the shards are folded into one file by repeated \
                  pairwise merges.",
    after_help = "EXAMPLES:\n    \
        ndjson2sqlite logs/ -o logs.db --table events --columns id:integer,value:text\n    \
        ndjson2sqlite app.ndjson.gz --table events --columns ts:text,level:text,msg:text\n    \
        ndjson2sqlite logs/ --since 2026-08-01T00:00:00Z --readers 8 -b 5000"
)]
pub struct CliArgs {
    /// Input file or directory of NDJSON files (.gz handled transparently)
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output database file
    #[arg(short, long, default_value = "logs.db", value_name = "FILE")]
    pub output: PathBuf,

    /// Table name the built-in JSON mapper writes into
    #[arg(long, default_value = "events", value_name = "NAME")]
    pub table: String,

    /// Column list for the built-in mapper, e.g. id:integer,value:text
    #[arg(long, default_value = "ts:text,level:text,message:text", value_name = "SPEC")]
    pub columns: String,

    /// Number of reader worker threads
    #[arg(short = 'r', long, default_value_t = default_readers(), value_name = "NUM")]
    pub readers: usize,

    /// Number of concurrent merges per round
    #[arg(short = 'm', long, default_value = "2", value_name = "NUM")]
    pub mergers: usize,

    /// Rows buffered per table before a flush
    #[arg(short = 'b', long, default_value = "1000", value_name = "NUM")]
    pub batch_size: usize,

    /// Shards merged per group
    #[arg(short = 'g', long, default_value = "2", value_name = "NUM")]
    pub group_size: usize,

    /// Completed shards that may wait unconsumed before readers block
    #[arg(long, default_value = "32", value_name = "NUM")]
    pub handoff_capacity: usize,

    /// Only ingest files modified at or after this RFC 3339 timestamp
    #[arg(long, value_name = "TIMESTAMP")]
    pub since: Option<String>,

    /// Only ingest files modified at or before this RFC 3339 timestamp
    #[arg(long, value_name = "TIMESTAMP")]
    pub until: Option<String>,

    /// Fold shards sequentially instead of tournament-merging
    #[arg(long)]
    pub simple_merge: bool,

    /// Produce shards but skip merging them (debugging aid)
    #[arg(long)]
    pub skip_integration: bool,

    /// Keep absorbed shard files instead of deleting them (debugging aid)
    #[arg(long)]
    pub keep_intermediates: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn default_readers() -> usize {
    num_cpus::get()
}

/// Which merge strategy the orchestrator builds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    Simple,
    Tournament,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Input file or directory
    pub input: PathBuf,

    /// Published output database path
    pub output: PathBuf,

    /// Directory shards are written into (the output's directory, so the
    /// final publish rename never crosses a filesystem)
    pub shard_dir: PathBuf,

    /// Reader worker count
    pub readers: usize,

    /// Merge worker count
    pub mergers: usize,

    /// Rows buffered per table before a flush
    pub batch_size: usize,

    /// Shards merged per group
    pub group_size: usize,

    /// Handoff queue capacity
    pub handoff_capacity: usize,

    /// Modification-time lower bound for inputs
    pub since: Option<DateTime<Utc>>,

    /// Modification-time upper bound for inputs
    pub until: Option<DateTime<Utc>>,

    /// Merge strategy
    pub strategy: MergeStrategy,

    /// Produce shards but skip merging
    pub skip_integration: bool,

    /// Keep absorbed shard files
    pub keep_intermediates: bool,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl PipelineConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        if args.readers == 0 || args.readers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.readers,
                max: MAX_WORKERS,
            });
        }
        if args.mergers == 0 || args.mergers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.mergers,
                max: MAX_WORKERS,
            });
        }
        if args.batch_size < MIN_BATCH_SIZE || args.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::InvalidBatchSize {
                size: args.batch_size,
                min: MIN_BATCH_SIZE,
                max: MAX_BATCH_SIZE,
            });
        }
        if args.group_size < MIN_GROUP_SIZE {
            return Err(ConfigError::InvalidGroupSize {
                size: args.group_size,
                min: MIN_GROUP_SIZE,
            });
        }
        if args.handoff_capacity < MIN_HANDOFF_CAPACITY {
            return Err(ConfigError::InvalidHandoffCapacity {
                size: args.handoff_capacity,
                min: MIN_HANDOFF_CAPACITY,
            });
        }

        let since = args.since.as_deref().map(parse_timestamp).transpose()?;
        let until = args.until.as_deref().map(parse_timestamp).transpose()?;

        let shard_dir = match args.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                if !parent.exists() {
                    return Err(ConfigError::InvalidOutputPath {
                        path: args.output.clone(),
                        reason: format!("parent directory '{}' does not exist", parent.display()),
                    });
                }
                parent.to_path_buf()
            }
            _ => PathBuf::from("."),
        };

        let strategy = if args.simple_merge {
            MergeStrategy::Simple
        } else {
            MergeStrategy::Tournament
        };

        Ok(Self {
            input: args.input.clone(),
            output: args.output.clone(),
            shard_dir,
            readers: args.readers,
            mergers: args.mergers,
            batch_size: args.batch_size,
            group_size: args.group_size,
            handoff_capacity: args.handoff_capacity,
            since,
            until,
            strategy,
            skip_integration: args.skip_integration,
            keep_intermediates: args.keep_intermediates,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ConfigError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ConfigError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Parse a `name:type,name:type` column list into a table schema
pub fn parse_table_spec(table: &str, columns: &str) -> Result<TableSchema, ConfigError> {
    let mut specs = Vec::new();

    for part in columns.split(',') {
        let part = part.trim();
        let (name, type_name) = part.split_once(':').ok_or_else(|| {
            ConfigError::InvalidColumnSpec {
                spec: part.to_string(),
                reason: "expected name:type".into(),
            }
        })?;

        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidColumnSpec {
                spec: part.to_string(),
                reason: "empty column name".into(),
            });
        }

        let col_type = ColumnType::parse(type_name.trim()).ok_or_else(|| {
            ConfigError::InvalidColumnSpec {
                spec: part.to_string(),
                reason: format!("unknown type '{}'", type_name.trim()),
            }
        })?;

        specs.push(ColumnSpec::new(name, col_type));
    }

    if specs.is_empty() {
        return Err(ConfigError::InvalidColumnSpec {
            spec: columns.to_string(),
            reason: "no columns declared".into(),
        });
    }

    Ok(TableSchema::new(table, specs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> CliArgs {
        CliArgs::parse_from(["ndjson2sqlite", "logs/"])
    }

    #[test]
    fn test_defaults_validate() {
        let config = PipelineConfig::from_args(&base_args()).unwrap();
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.group_size, 2);
        assert_eq!(config.strategy, MergeStrategy::Tournament);
        assert!(config.show_progress);
    }

    #[test]
    fn test_zero_readers_rejected() {
        let mut args = base_args();
        args.readers = 0;
        assert!(matches!(
            PipelineConfig::from_args(&args),
            Err(ConfigError::InvalidWorkerCount { .. })
        ));
    }

    #[test]
    fn test_group_size_of_one_rejected() {
        let mut args = base_args();
        args.group_size = 1;
        assert!(matches!(
            PipelineConfig::from_args(&args),
            Err(ConfigError::InvalidGroupSize { .. })
        ));
    }

    #[test]
    fn test_timestamp_parsing() {
        let mut args = base_args();
        args.since = Some("2026-08-01T00:00:00Z".into());
        let config = PipelineConfig::from_args(&args).unwrap();
        assert!(config.since.is_some());

        args.since = Some("yesterday".into());
        assert!(matches!(
            PipelineConfig::from_args(&args),
            Err(ConfigError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_parse_table_spec() {
        let schema = parse_table_spec("events", "id:integer, value:text").unwrap();
        assert_eq!(schema.name, "events");
        assert_eq!(schema.columns.len(), 2);
        assert_eq!(schema.columns[0].name, "id");
        assert_eq!(schema.columns[0].col_type, ColumnType::Integer);
        assert_eq!(schema.columns[1].col_type, ColumnType::Text);
    }

    #[test]
    fn test_parse_table_spec_rejects_bad_type() {
        assert!(matches!(
            parse_table_spec("events", "id:widget"),
            Err(ConfigError::InvalidColumnSpec { .. })
        ));
        assert!(matches!(
            parse_table_spec("events", "no-type-here"),
            Err(ConfigError::InvalidColumnSpec { .. })
        ));
    }
}
