//! Error types for ndjson2sqlite
//!
//! This module defines the error hierarchy for the pipeline:
//! - Database errors (schema, bulk insert, cross-file merge)
//! - Per-file read errors (open, decompress, scan)
//! - Per-line mapping errors
//! - Configuration and CLI errors
//! - Worker thread errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Severity is encoded in where an error can surface: mapping errors skip
//!   a line, read and write errors abort a file, merge and rename errors
//!   abort the run
//! - Preserve error chains for debugging

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Database errors
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors (input discovery, file operations)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Final publish rename failed; the merged database survives at `path`
    #[error("Failed to publish merged database (preserved at '{path}'): {source}")]
    Rename {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Every input file failed, so there is nothing to publish
    #[error("No shard databases were produced")]
    NoShards,
}

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLite error outside the more specific cases below
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A declared table conflicts with a differently-shaped existing one
    #[error("Schema conflict on table '{table}': {reason}")]
    Schema { table: String, reason: String },

    /// Bulk insert failed; the transaction was rolled back
    #[error("Bulk insert into '{table}' failed: {source}")]
    Write {
        table: String,
        source: rusqlite::Error,
    },

    /// Cross-file merge failed; the source at `path` must not be deleted
    #[error("Merge from '{path}' failed: {source}")]
    Merge {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

/// Per-file read errors (abort only the file being read)
#[derive(Error, Debug)]
pub enum ReadError {
    /// Failed to open, decompress or scan an input file
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Shard database error while processing the file
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Per-line mapping errors (skip only the offending line)
#[derive(Error, Debug)]
pub enum MapError {
    /// The line could not be decoded into rows
    #[error("Failed to map record: {reason}")]
    Parse { reason: String },

    /// The mapper produced a row for a table that was never declared
    #[error("Row targets undeclared table '{table}'")]
    UnknownTable { table: String },

    /// The mapper produced a row whose width does not match the table
    #[error("Row for '{table}' has {got} values, expected {expected}")]
    Arity {
        table: String,
        expected: usize,
        got: usize,
    },
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid batch size
    #[error("Invalid batch size {size}: must be between {min} and {max}")]
    InvalidBatchSize {
        size: usize,
        min: usize,
        max: usize,
    },

    /// Invalid merge group size
    #[error("Invalid merge group size {size}: must be at least {min}")]
    InvalidGroupSize { size: usize, min: usize },

    /// Invalid handoff queue capacity
    #[error("Invalid handoff capacity {size}: must be at least {min}")]
    InvalidHandoffCapacity { size: usize, min: usize },

    /// Invalid timestamp argument
    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },

    /// Invalid column specification
    #[error("Invalid column spec '{spec}': {reason}")]
    InvalidColumnSpec { spec: String, reason: String },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },

    /// Input path does not exist or matched no files
    #[error("No input files found under '{path}'")]
    NoInputFiles { path: PathBuf },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked")]
    Panicked { id: usize },

    /// Worker initialization failed
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },
}

/// Result type alias for PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result type alias for DbError
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Result type alias for ReadError
pub type ReadResult<T> = std::result::Result<T, ReadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let db_err = DbError::Schema {
            table: "events".into(),
            reason: "column count mismatch".into(),
        };
        let pipeline_err: PipelineError = db_err.into();
        assert!(matches!(pipeline_err, PipelineError::Db(_)));
    }

    #[test]
    fn test_read_error_wraps_db_error() {
        let db_err = DbError::Write {
            table: "events".into(),
            source: rusqlite::Error::ExecuteReturnedResults,
        };
        let read_err: ReadError = db_err.into();
        assert!(matches!(read_err, ReadError::Db(DbError::Write { .. })));
    }

    #[test]
    fn test_rename_error_preserves_path() {
        let err = PipelineError::Rename {
            path: PathBuf::from("/tmp/merged.db"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/tmp/merged.db"));
    }
}
