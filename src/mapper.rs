//! Record mapping boundary
//!
//! The pipeline core never interprets log lines itself; an application
//! supplies a [`RecordMapper`] that turns one decoded line into zero or
//! more rows. The shipped binary uses [`JsonColumnMapper`], which pulls
//! declared columns out of flat JSON objects.

use crate::error::MapError;
use crate::schema::{ColumnType, Row, SqlValue, TableSchema};
use serde_json::Value;

/// Maps one input line to zero or more rows
///
/// Implementations must be thread-safe: every reader worker shares one
/// mapper instance. A returned error marks only the offending line as
/// failed; the file continues.
pub trait RecordMapper: Send + Sync {
    /// Decode `line` and append the resulting rows to `out`
    ///
    /// `out` is a scratch buffer reused across lines; it arrives empty.
    fn map_line(&self, line: &[u8], out: &mut Vec<Row>) -> Result<(), MapError>;
}

/// Extracts declared columns from flat JSON objects into one table
///
/// Every line must be one JSON object. For each declared column the value
/// under the same key is converted to the column's storage class; a
/// missing key or JSON null becomes SQL NULL. Nested values targeted at a
/// TEXT column are stored as their compact JSON rendering.
pub struct JsonColumnMapper {
    table: TableSchema,
}

impl JsonColumnMapper {
    pub fn new(table: TableSchema) -> Self {
        Self { table }
    }

    fn convert(column: &str, ty: ColumnType, value: &Value) -> Result<SqlValue, MapError> {
        if value.is_null() {
            return Ok(SqlValue::Null);
        }

        let mismatch = || MapError::Parse {
            reason: format!(
                "field '{}' is not representable as {}",
                column,
                ty.sql_name()
            ),
        };

        match ty {
            ColumnType::Integer => match value {
                Value::Number(n) => n.as_i64().map(SqlValue::Integer).ok_or_else(mismatch),
                Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
                _ => Err(mismatch()),
            },
            ColumnType::Real => value.as_f64().map(SqlValue::Real).ok_or_else(mismatch),
            ColumnType::Text => match value {
                Value::String(s) => Ok(SqlValue::Text(s.clone())),
                other => Ok(SqlValue::Text(other.to_string())),
            },
            ColumnType::Blob => match value {
                Value::String(s) => Ok(SqlValue::Blob(s.as_bytes().to_vec())),
                _ => Err(mismatch()),
            },
        }
    }
}

impl RecordMapper for JsonColumnMapper {
    fn map_line(&self, line: &[u8], out: &mut Vec<Row>) -> Result<(), MapError> {
        let parsed: Value = serde_json::from_slice(line).map_err(|e| MapError::Parse {
            reason: e.to_string(),
        })?;

        let object = parsed.as_object().ok_or_else(|| MapError::Parse {
            reason: "line is not a JSON object".into(),
        })?;

        let values = self
            .table
            .columns
            .iter()
            .map(|c| match object.get(&c.name) {
                Some(v) => Self::convert(&c.name, c.col_type, v),
                None => Ok(SqlValue::Null),
            })
            .collect::<Result<Vec<_>, _>>()?;

        out.push(Row::new(self.table.name.clone(), values));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnSpec;

    fn mapper() -> JsonColumnMapper {
        JsonColumnMapper::new(TableSchema::new(
            "events",
            vec![
                ColumnSpec::new("id", ColumnType::Integer),
                ColumnSpec::new("value", ColumnType::Text),
            ],
        ))
    }

    #[test]
    fn test_maps_flat_object() {
        let mut out = Vec::new();
        mapper()
            .map_line(br#"{"id": 7, "value": "hello"}"#, &mut out)
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].table, "events");
        assert_eq!(out[0].values[0], SqlValue::Integer(7));
        assert_eq!(out[0].values[1], SqlValue::Text("hello".into()));
    }

    #[test]
    fn test_missing_key_becomes_null() {
        let mut out = Vec::new();
        mapper().map_line(br#"{"id": 7}"#, &mut out).unwrap();
        assert_eq!(out[0].values[1], SqlValue::Null);
    }

    #[test]
    fn test_nested_value_rendered_as_json_text() {
        let mut out = Vec::new();
        mapper()
            .map_line(br#"{"id": 1, "value": {"a": [1, 2]}}"#, &mut out)
            .unwrap();
        assert_eq!(out[0].values[1], SqlValue::Text(r#"{"a":[1,2]}"#.into()));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let mut out = Vec::new();
        let err = mapper().map_line(b"not json", &mut out).unwrap_err();
        assert!(matches!(err, MapError::Parse { .. }));
        assert!(out.is_empty());
    }

    #[test]
    fn test_non_object_line_is_parse_error() {
        let mut out = Vec::new();
        let err = mapper().map_line(b"[1, 2, 3]", &mut out).unwrap_err();
        assert!(matches!(err, MapError::Parse { .. }));
    }

    #[test]
    fn test_type_mismatch_is_parse_error() {
        let mut out = Vec::new();
        let err = mapper()
            .map_line(br#"{"id": "seven", "value": "x"}"#, &mut out)
            .unwrap_err();
        assert!(matches!(err, MapError::Parse { .. }));
    }
}
