//! ndjson2sqlite - Parallel NDJSON Log to SQLite Converter
//!
//! A batch pipeline that turns a corpus of newline-delimited JSON log
//! files (optionally gzip-compressed) into one queryable SQLite database.
//! Designed for offline transformation of large log corpora where the
//! downstream consumer speaks SQL rather than grep.
//!
//! # Features
//!
//! - **Sharded Ingest**: Every input file becomes its own small SQLite
//!   shard, written by a bounded worker pool with backpressure, so memory
//!   and open file handles stay flat no matter how many files arrive.
//!
//! - **Tournament Merging**: Shards fold down to a single file through
//!   repeated pairwise merges (SQLite ATTACH + insert-select) executed by
//!   a second worker pool.
//!
//! - **Contained Failures**: A bad line skips the line, a bad file skips
//!   the file; only merge and publish failures abort the run.
//!
//! - **Pluggable Mapping**: A [`mapper::RecordMapper`] turns each decoded
//!   line into zero or more typed rows; schemas are plain data.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        Input Files                             │
//! │              (*.ndjson, *.ndjson.gz, directories)              │
//! └─────────────────────────────┬──────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Reader Workers                            │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐    │
//! │  │Worker 1 │  │Worker 2 │  │Worker 3 │  ...    │Worker N │    │
//! │  │ shard.db│  │ shard.db│  │ shard.db│         │ shard.db│    │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘    │
//! │       └────────────┴──────┬─────┴────────────────────┘        │
//! │                           ▼                                   │
//! │            ┌──────────────────────────┐                       │
//! │            │    Handoff Queue         │                       │
//! │            │  (crossbeam bounded)     │                       │
//! │            └────────────┬─────────────┘                       │
//! │                         ▼                                     │
//! │            ┌──────────────────────────┐                       │
//! │            │   Merge Integrator       │                       │
//! │            │  - groups of G shards    │                       │
//! │            │  - rounds until one left │                       │
//! │            └────────────┬─────────────┘                       │
//! └─────────────────────────┼─────────────────────────────────────┘
//!                           ▼
//!                ┌──────────────────┐
//!                │   SQLite DB      │
//!                │   (logs.db)      │
//!                └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Convert a directory of rotated logs
//! ndjson2sqlite logs/ -o logs.db --table events --columns id:integer,value:text
//!
//! # Query results
//! sqlite3 logs.db "SELECT value FROM events WHERE id > 100"
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod mapper;
pub mod merge;
pub mod pipeline;
pub mod progress;
pub mod reader;
pub mod schema;

pub use config::{CliArgs, MergeStrategy, PipelineConfig};
pub use error::{ConfigError, DbError, MapError, PipelineError, ReadError, Result, WorkerError};
pub use mapper::{JsonColumnMapper, RecordMapper};
pub use merge::{Integrator, MergeConfig};
pub use pipeline::{Pipeline, PipelineReport};
pub use reader::{ReaderConfig, ShardReader};
pub use schema::{ColumnSpec, ColumnType, Row, SqlValue, TableSchema};
