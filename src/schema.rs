//! Table schema configuration and SQL generation
//!
//! Schemas are plain data: a set of named tables with ordered, typed
//! columns. The pipeline never inspects row contents; it only needs the
//! declared column lists to build CREATE TABLE, INSERT and merge
//! statements. Schema derivation from sample documents happens outside
//! this crate and arrives here as configuration.

use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::ToSql;

/// SQLite storage class for a declared column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Blob,
}

impl ColumnType {
    /// SQL type name as written into CREATE TABLE statements
    pub fn sql_name(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::Blob => "BLOB",
        }
    }

    /// Parse a type name as accepted on the command line
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "integer" | "int" => Some(ColumnType::Integer),
            "real" | "float" => Some(ColumnType::Real),
            "text" | "string" => Some(ColumnType::Text),
            "blob" => Some(ColumnType::Blob),
            _ => None,
        }
    }
}

/// One declared column
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub col_type: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, col_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            col_type,
        }
    }
}

/// One declared table: a name plus ordered typed columns
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// CREATE TABLE IF NOT EXISTS statement for this table
    pub fn create_sql(&self) -> String {
        let cols = self
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.col_type.sql_name()))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&self.name),
            cols
        )
    }

    /// Parameterized INSERT statement covering every declared column
    pub fn insert_sql(&self) -> String {
        let placeholders = (1..=self.columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.name),
            self.column_list(),
            placeholders
        )
    }

    /// INSERT..SELECT statement copying this table from an attached schema
    ///
    /// Column lists are explicit on both sides so the copy stays correct
    /// even if the physical column order ever diverges between files.
    pub fn copy_from_sql(&self, alias: &str) -> String {
        let table = quote_ident(&self.name);
        let cols = self.column_list();
        format!(
            "INSERT INTO {table} ({cols}) SELECT {cols} FROM {}.{table}",
            quote_ident(alias)
        )
    }

    fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Quote an identifier for embedding into generated SQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// One column value produced by a record mapper
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

/// One decoded record: target table plus ordered column values
#[derive(Debug, Clone)]
pub struct Row {
    pub table: String,
    pub values: Vec<SqlValue>,
}

impl Row {
    pub fn new(table: impl Into<String>, values: Vec<SqlValue>) -> Self {
        Self {
            table: table.into(),
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events_schema() -> TableSchema {
        TableSchema::new(
            "events",
            vec![
                ColumnSpec::new("id", ColumnType::Integer),
                ColumnSpec::new("value", ColumnType::Text),
            ],
        )
    }

    #[test]
    fn test_create_sql() {
        let sql = events_schema().create_sql();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"events\" (\"id\" INTEGER, \"value\" TEXT)"
        );
    }

    #[test]
    fn test_insert_sql() {
        let sql = events_schema().insert_sql();
        assert_eq!(
            sql,
            "INSERT INTO \"events\" (\"id\", \"value\") VALUES (?1, ?2)"
        );
    }

    #[test]
    fn test_copy_from_sql() {
        let sql = events_schema().copy_from_sql("absorbed");
        assert_eq!(
            sql,
            "INSERT INTO \"events\" (\"id\", \"value\") \
             SELECT \"id\", \"value\" FROM \"absorbed\".\"events\""
        );
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_column_type_parse() {
        assert_eq!(ColumnType::parse("int"), Some(ColumnType::Integer));
        assert_eq!(ColumnType::parse("TEXT"), Some(ColumnType::Text));
        assert_eq!(ColumnType::parse("float"), Some(ColumnType::Real));
        assert_eq!(ColumnType::parse("bogus"), None);
    }
}
