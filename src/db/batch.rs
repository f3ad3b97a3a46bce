//! Per-table row buffering between flushes
//!
//! A `RowBatch` holds rows destined for every declared table until the
//! reader decides to flush them in one transaction. Buffers are cleared,
//! not reallocated, after each flush so a long-running worker settles
//! into a steady allocation footprint.

use crate::error::MapError;
use crate::schema::{Row, TableSchema};
use std::collections::HashMap;

struct TableBuffer {
    arity: usize,
    rows: Vec<Row>,
}

/// Buffer of pending rows, keyed by declared table name
pub struct RowBatch {
    tables: HashMap<String, TableBuffer>,
    capacity: usize,
}

impl RowBatch {
    /// Create a batch with per-table buffers pre-sized to `capacity`
    pub fn new(tables: &[TableSchema], capacity: usize) -> Self {
        let tables = tables
            .iter()
            .map(|t| {
                let buffer = TableBuffer {
                    arity: t.columns.len(),
                    rows: Vec::with_capacity(capacity),
                };
                (t.name.clone(), buffer)
            })
            .collect();

        Self { tables, capacity }
    }

    /// Append a row to its table's buffer
    ///
    /// Rejects rows that target an undeclared table or whose width does
    /// not match the declared column count; the caller treats either as a
    /// mapping failure for the current line.
    pub fn push(&mut self, row: Row) -> Result<(), MapError> {
        let buffer = self
            .tables
            .get_mut(&row.table)
            .ok_or_else(|| MapError::UnknownTable {
                table: row.table.clone(),
            })?;

        if row.values.len() != buffer.arity {
            return Err(MapError::Arity {
                table: row.table.clone(),
                expected: buffer.arity,
                got: row.values.len(),
            });
        }

        buffer.rows.push(row);
        Ok(())
    }

    /// True once any table's buffer has reached capacity
    pub fn is_full(&self) -> bool {
        self.tables.values().any(|b| b.rows.len() >= self.capacity)
    }

    /// True when no table has pending rows
    pub fn is_empty(&self) -> bool {
        self.tables.values().all(|b| b.rows.is_empty())
    }

    /// Total pending rows across all tables
    pub fn len(&self) -> usize {
        self.tables.values().map(|b| b.rows.len()).sum()
    }

    /// Configured per-table capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Truncate every buffer, retaining allocations
    pub fn clear(&mut self) {
        for buffer in self.tables.values_mut() {
            buffer.rows.clear();
        }
    }

    /// Pending rows per table, for the flush path
    pub(crate) fn buffers(&self) -> impl Iterator<Item = (&str, &[Row])> {
        self.tables
            .iter()
            .map(|(name, buffer)| (name.as_str(), buffer.rows.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSpec, ColumnType, SqlValue};

    fn events_schema() -> Vec<TableSchema> {
        vec![TableSchema::new(
            "events",
            vec![
                ColumnSpec::new("id", ColumnType::Integer),
                ColumnSpec::new("value", ColumnType::Text),
            ],
        )]
    }

    fn event_row(id: i64) -> Row {
        Row::new(
            "events",
            vec![SqlValue::Integer(id), SqlValue::Text(format!("v{}", id))],
        )
    }

    #[test]
    fn test_push_and_fill() {
        let schema = events_schema();
        let mut batch = RowBatch::new(&schema, 2);
        assert!(batch.is_empty());

        batch.push(event_row(1)).unwrap();
        assert!(!batch.is_full());

        batch.push(event_row(2)).unwrap();
        assert!(batch.is_full());
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_clear_empties_every_table() {
        let schema = events_schema();
        let mut batch = RowBatch::new(&schema, 2);
        batch.push(event_row(1)).unwrap();
        batch.push(event_row(2)).unwrap();

        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);

        // Reusable after clearing
        batch.push(event_row(3)).unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_unknown_table_rejected() {
        let schema = events_schema();
        let mut batch = RowBatch::new(&schema, 2);
        let err = batch
            .push(Row::new("nope", vec![SqlValue::Null]))
            .unwrap_err();
        assert!(matches!(err, MapError::UnknownTable { .. }));
    }

    #[test]
    fn test_arity_mismatch_rejected() {
        let schema = events_schema();
        let mut batch = RowBatch::new(&schema, 2);
        let err = batch
            .push(Row::new("events", vec![SqlValue::Integer(1)]))
            .unwrap_err();
        assert!(matches!(
            err,
            MapError::Arity {
                expected: 2,
                got: 1,
                ..
            }
        ));
    }
}
