//! Shard database handle
//!
//! One `ShardDb` owns one rusqlite connection to one database file. The
//! reader gives every input file its own shard, so no two threads ever
//! share a connection or hold write handles to the same file. The same
//! handle type drives the merge side: a second file is attached under a
//! private alias, copied table by table with an insert-select, and
//! detached again.

use crate::db::RowBatch;
use crate::error::{DbError, DbResult};
use crate::schema::TableSchema;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Schema alias used while another database file is attached for merging
const MERGE_ALIAS: &str = "absorbed";

/// SQLite pragmas for bulk-write workloads
///
/// Shards are throwaway until published; durability is restored by the
/// final clean close before the publish rename.
const WRITE_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = OFF;
PRAGMA temp_store = MEMORY;
PRAGMA cache_size = -64000;
"#;

/// Handle to one shard database file
pub struct ShardDb {
    conn: Connection,
    path: PathBuf,
    tables: Arc<Vec<TableSchema>>,
}

impl std::fmt::Debug for ShardDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardDb")
            .field("path", &self.path)
            .field("tables", &self.tables)
            .finish_non_exhaustive()
    }
}

impl ShardDb {
    /// Create (or reopen) a shard and ensure the declared tables exist
    pub fn create(path: &Path, tables: Arc<Vec<TableSchema>>) -> DbResult<Self> {
        let db = Self::open(path, tables)?;
        db.create_tables_if_not_exist()?;
        Ok(db)
    }

    /// Open an existing shard without touching its schema
    pub fn open(path: &Path, tables: Arc<Vec<TableSchema>>) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(WRITE_PRAGMAS)?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            tables,
        })
    }

    /// Path of the underlying database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create every declared table, verifying existing ones
    ///
    /// Idempotent: calling this twice is a no-op. A table that already
    /// exists with a different column list or different column types is a
    /// schema conflict and fails instead of being silently reused.
    pub fn create_tables_if_not_exist(&self) -> DbResult<()> {
        for table in self.tables.iter() {
            match self.existing_columns(&table.name)? {
                None => {
                    self.conn.execute(&table.create_sql(), [])?;
                }
                Some(existing) => {
                    verify_columns(table, &existing)?;
                }
            }
        }
        Ok(())
    }

    /// Insert every pending row of the batch in one transaction
    ///
    /// All-or-nothing per flush: any failure rolls the whole transaction
    /// back and leaves the batch contents untouched for the caller to
    /// inspect. On success the batch is cleared.
    pub fn bulk_insert(&mut self, batch: &mut RowBatch) -> DbResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let tables = Arc::clone(&self.tables);
        let tx = self.conn.transaction()?;

        for (name, rows) in batch.buffers() {
            if rows.is_empty() {
                continue;
            }

            // Batch contents are validated against the declared tables on
            // push, so the lookup cannot miss.
            let Some(schema) = tables.iter().find(|t| t.name == name) else {
                continue;
            };

            let mut stmt = tx
                .prepare_cached(&schema.insert_sql())
                .map_err(|e| DbError::Write {
                    table: name.to_string(),
                    source: e,
                })?;

            for row in rows {
                stmt.execute(rusqlite::params_from_iter(row.values.iter()))
                    .map_err(|e| DbError::Write {
                        table: name.to_string(),
                        source: e,
                    })?;
            }
        }

        tx.commit()?;
        batch.clear();
        Ok(())
    }

    /// Copy every declared table's rows from `other` into this database
    ///
    /// Attaches `other` under a private alias, runs one insert-select per
    /// table inside a transaction, and detaches. The detach is attempted
    /// on every exit path, success or failure, so a failed copy never
    /// leaks an attached file handle. On failure this database may hold a
    /// partial copy but stays openable; the caller must not delete
    /// `other` unless `Ok` was returned.
    ///
    /// Copied rows append after the existing ones, so the destination's
    /// rows always precede the absorbed file's rows.
    pub fn merge(&mut self, other: &Path) -> DbResult<()> {
        let merge_err = |e: rusqlite::Error| DbError::Merge {
            path: other.to_path_buf(),
            source: e,
        };

        debug!(base = %self.path.display(), absorbed = %other.display(), "attaching shard");
        let other_str = other.to_string_lossy();
        self.conn
            .execute(
                "ATTACH DATABASE ?1 AS ?2",
                params![other_str.as_ref(), MERGE_ALIAS],
            )
            .map_err(merge_err)?;

        let copied = self.copy_attached();
        let detached = self
            .conn
            .execute("DETACH DATABASE ?1", params![MERGE_ALIAS]);

        copied.map_err(merge_err)?;
        detached.map_err(merge_err)?;
        Ok(())
    }

    fn copy_attached(&mut self) -> rusqlite::Result<()> {
        let tables = Arc::clone(&self.tables);
        let tx = self.conn.transaction()?;
        for table in tables.iter() {
            tx.execute(&table.copy_from_sql(MERGE_ALIAS), [])?;
        }
        tx.commit()
    }

    /// Number of rows currently in `table`
    pub fn row_count(&self, table: &str) -> DbResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}",
            crate::schema::quote_ident(table)
        );
        let count = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count)
    }

    /// Close the connection, surfacing any final flush error
    pub fn close(self) -> DbResult<()> {
        self.conn.close().map_err(|(_, e)| DbError::Sqlite(e))
    }

    /// Column (name, declared type) pairs of an existing table, if any
    fn existing_columns(&self, table: &str) -> DbResult<Option<Vec<(String, String)>>> {
        let sql = format!(
            "PRAGMA table_info({})",
            crate::schema::quote_ident(table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let columns = stmt
            .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if columns.is_empty() {
            Ok(None)
        } else {
            Ok(Some(columns))
        }
    }
}

/// Compare a declared table against the columns found on disk
fn verify_columns(table: &TableSchema, existing: &[(String, String)]) -> DbResult<()> {
    if existing.len() != table.columns.len() {
        return Err(DbError::Schema {
            table: table.name.clone(),
            reason: format!(
                "existing table has {} columns, declared {}",
                existing.len(),
                table.columns.len()
            ),
        });
    }

    for (declared, (name, sql_type)) in table.columns.iter().zip(existing) {
        if !declared.name.eq_ignore_ascii_case(name) {
            return Err(DbError::Schema {
                table: table.name.clone(),
                reason: format!("existing column '{}' where '{}' declared", name, declared.name),
            });
        }
        if !declared.col_type.sql_name().eq_ignore_ascii_case(sql_type) {
            warn!(
                table = %table.name,
                column = %name,
                existing = %sql_type,
                declared = declared.col_type.sql_name(),
                "column type mismatch"
            );
            return Err(DbError::Schema {
                table: table.name.clone(),
                reason: format!(
                    "column '{}' is {} on disk, declared {}",
                    name,
                    sql_type,
                    declared.col_type.sql_name()
                ),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSpec, ColumnType, Row, SqlValue};
    use tempfile::tempdir;

    fn events_tables() -> Arc<Vec<TableSchema>> {
        Arc::new(vec![TableSchema::new(
            "events",
            vec![
                ColumnSpec::new("id", ColumnType::Integer),
                ColumnSpec::new("value", ColumnType::Text),
            ],
        )])
    }

    fn event_row(id: i64) -> Row {
        Row::new(
            "events",
            vec![SqlValue::Integer(id), SqlValue::Text(format!("v{}", id))],
        )
    }

    fn make_shard(path: &Path, ids: std::ops::Range<i64>) -> ShardDb {
        let mut db = ShardDb::create(path, events_tables()).unwrap();
        let mut batch = RowBatch::new(&events_tables(), 64);
        for id in ids {
            batch.push(event_row(id)).unwrap();
        }
        db.bulk_insert(&mut batch).unwrap();
        db
    }

    #[test]
    fn test_create_tables_is_idempotent() {
        let dir = tempdir().unwrap();
        let db = ShardDb::create(&dir.path().join("a.db"), events_tables()).unwrap();
        db.create_tables_if_not_exist().unwrap();
        db.create_tables_if_not_exist().unwrap();
        assert_eq!(db.row_count("events").unwrap(), 0);
    }

    #[test]
    fn test_schema_conflict_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.db");
        let db = ShardDb::create(&path, events_tables()).unwrap();
        db.close().unwrap();

        // Same table name, different column type
        let conflicting = Arc::new(vec![TableSchema::new(
            "events",
            vec![
                ColumnSpec::new("id", ColumnType::Text),
                ColumnSpec::new("value", ColumnType::Text),
            ],
        )]);
        let err = ShardDb::create(&path, conflicting).unwrap_err();
        assert!(matches!(err, DbError::Schema { .. }));
    }

    #[test]
    fn test_bulk_insert_clears_batch() {
        let dir = tempdir().unwrap();
        let mut db = ShardDb::create(&dir.path().join("a.db"), events_tables()).unwrap();

        let mut batch = RowBatch::new(&events_tables(), 8);
        for id in 0..5 {
            batch.push(event_row(id)).unwrap();
        }
        db.bulk_insert(&mut batch).unwrap();

        assert!(batch.is_empty());
        assert_eq!(db.row_count("events").unwrap(), 5);
    }

    #[test]
    fn test_merge_appends_other_rows() {
        let dir = tempdir().unwrap();
        let base_path = dir.path().join("base.db");
        let other_path = dir.path().join("other.db");

        let mut base = make_shard(&base_path, 0..3);
        let other = make_shard(&other_path, 3..8);
        other.close().unwrap();

        base.merge(&other_path).unwrap();
        assert_eq!(base.row_count("events").unwrap(), 8);

        // Base rows keep their original positions, absorbed rows follow
        let first: i64 = base
            .conn
            .query_row("SELECT id FROM events ORDER BY rowid LIMIT 1", [], |r| {
                r.get(0)
            })
            .unwrap();
        let last: i64 = base
            .conn
            .query_row(
                "SELECT id FROM events ORDER BY rowid DESC LIMIT 1",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(first, 0);
        assert_eq!(last, 7);
    }

    #[test]
    fn test_failed_merge_detaches_and_leaves_db_usable() {
        let dir = tempdir().unwrap();
        let base_path = dir.path().join("base.db");
        let empty_path = dir.path().join("empty.db");

        // A database without the declared table makes the copy fail
        Connection::open(&empty_path)
            .unwrap()
            .close()
            .map_err(|(_, e)| e)
            .unwrap();

        let mut base = make_shard(&base_path, 0..3);
        let err = base.merge(&empty_path).unwrap_err();
        assert!(matches!(err, DbError::Merge { .. }));

        // Destination still usable, and the alias was detached: a
        // subsequent merge can attach again
        assert_eq!(base.row_count("events").unwrap(), 3);
        let other_path = dir.path().join("other.db");
        let other = make_shard(&other_path, 3..5);
        other.close().unwrap();
        base.merge(&other_path).unwrap();
        assert_eq!(base.row_count("events").unwrap(), 5);
    }
}
