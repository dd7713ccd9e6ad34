//! SQL parameter and column values.
//!
//! [`SqlValue`] is the closed set of value shapes the access layer moves
//! between the caller and the wire driver. It also knows how to render
//! itself as a SQL-ish literal for diagnostic dumps: strings single-quoted
//! with quote doubling, datetimes in round-trip ISO form, GUIDs dashed,
//! tabular values as a text grid. The literal form is only ever used in
//! exception payloads, never for execution.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A SQL value bound to a parameter or read from a column.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// BIT.
    Bool(bool),
    /// INT.
    Int(i32),
    /// BIGINT.
    BigInt(i64),
    /// FLOAT.
    Double(f64),
    /// NVARCHAR.
    String(String),
    /// DATETIME2 / DATETIMEOFFSET, normalized to UTC.
    DateTime(DateTime<Utc>),
    /// UNIQUEIDENTIFIER.
    Uuid(Uuid),
    /// VARBINARY.
    Binary(Vec<u8>),
    /// A table-valued parameter.
    Table(TableValue),
}

/// A tabular parameter value: named columns and rows of values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableValue {
    /// Column names, in order.
    pub columns: Vec<String>,
    /// Rows; each row has one value per column.
    pub rows: Vec<Vec<SqlValue>>,
}

impl SqlValue {
    /// Name of the value's SQL shape, for messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "BIT",
            Self::Int(_) => "INT",
            Self::BigInt(_) => "BIGINT",
            Self::Double(_) => "FLOAT",
            Self::String(_) => "NVARCHAR",
            Self::DateTime(_) => "DATETIME2",
            Self::Uuid(_) => "UNIQUEIDENTIFIER",
            Self::Binary(_) => "VARBINARY",
            Self::Table(_) => "TABLE",
        }
    }

    /// Render the value as a SQL-style literal for diagnostics.
    #[must_use]
    pub fn sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(v) => if *v { "1" } else { "0" }.to_string(),
            Self::Int(v) => v.to_string(),
            Self::BigInt(v) => v.to_string(),
            Self::Double(v) => v.to_string(),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::DateTime(dt) => format!("'{}'", dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Self::Uuid(u) => format!("'{}'", u.hyphenated()),
            Self::Binary(b) => {
                let mut out = String::with_capacity(2 + b.len() * 2);
                out.push_str("0x");
                for byte in b {
                    out.push_str(&format!("{byte:02X}"));
                }
                out
            }
            Self::Table(table) => table.render_grid(),
        }
    }
}

impl TableValue {
    /// Render the table as a text grid, one line per row, columns padded to
    /// the widest literal in each column.
    #[must_use]
    pub fn render_grid(&self) -> String {
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(SqlValue::sql_literal).collect())
            .collect();

        let mut widths: Vec<usize> = self.columns.iter().map(String::len).collect();
        for row in &cells {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() && cell.len() > widths[i] {
                    widths[i] = cell.len();
                }
            }
        }

        let mut out = String::new();
        let header: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{name:<width$}", width = widths[i]))
            .collect();
        out.push_str(&header.join(" | "));
        out.push('\n');

        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str(&rule.join("-+-"));

        for row in &cells {
            out.push('\n');
            let line: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(i, cell)| {
                    let width = widths.get(i).copied().unwrap_or(cell.len());
                    format!("{cell:<width$}")
                })
                .collect();
            out.push_str(&line.join(" | "));
        }

        out
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::BigInt(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Binary(v)
    }
}

impl From<TableValue> for SqlValue {
    fn from(v: TableValue) -> Self {
        Self::Table(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Conversion from a column [`SqlValue`] into a Rust type.
pub trait FromSql: Sized {
    /// Convert the value, failing with [`Error::Type`] when the shapes do
    /// not line up.
    fn from_sql(value: &SqlValue) -> Result<Self>;
}

fn type_mismatch<T>(value: &SqlValue, wanted: &str) -> Result<T> {
    Err(Error::Type(format!(
        "cannot read {} as {wanted}",
        value.type_name()
    )))
}

impl FromSql for bool {
    fn from_sql(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Bool(v) => Ok(*v),
            other => type_mismatch(other, "bool"),
        }
    }
}

impl FromSql for i32 {
    fn from_sql(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Int(v) => Ok(*v),
            other => type_mismatch(other, "i32"),
        }
    }
}

impl FromSql for i64 {
    fn from_sql(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::BigInt(v) => Ok(*v),
            SqlValue::Int(v) => Ok(i64::from(*v)),
            other => type_mismatch(other, "i64"),
        }
    }
}

impl FromSql for f64 {
    fn from_sql(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Double(v) => Ok(*v),
            SqlValue::Int(v) => Ok(f64::from(*v)),
            other => type_mismatch(other, "f64"),
        }
    }
}

impl FromSql for String {
    fn from_sql(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::String(v) => Ok(v.clone()),
            other => type_mismatch(other, "String"),
        }
    }
}

impl FromSql for DateTime<Utc> {
    fn from_sql(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::DateTime(v) => Ok(*v),
            other => type_mismatch(other, "DateTime<Utc>"),
        }
    }
}

impl FromSql for Uuid {
    fn from_sql(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Uuid(v) => Ok(*v),
            other => type_mismatch(other, "Uuid"),
        }
    }
}

impl<T: FromSql> FromSql for Option<T> {
    fn from_sql(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql(other).map(Some),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn string_literal_doubles_quotes() {
        let v = SqlValue::from("O'Brien");
        assert_eq!(v.sql_literal(), "'O''Brien'");
    }

    #[test]
    fn datetime_literal_round_trips_iso() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 7, 12, 30, 45).unwrap();
        assert_eq!(
            SqlValue::from(dt).sql_literal(),
            "'2024-03-07T12:30:45Z'"
        );
    }

    #[test]
    fn uuid_literal_is_dashed() {
        let u = Uuid::nil();
        assert_eq!(
            SqlValue::from(u).sql_literal(),
            "'00000000-0000-0000-0000-000000000000'"
        );
    }

    #[test]
    fn binary_literal_is_hex() {
        assert_eq!(SqlValue::from(vec![0xAB, 0x01]).sql_literal(), "0xAB01");
    }

    #[test]
    fn option_none_maps_to_null() {
        assert_eq!(SqlValue::from(None::<i32>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(7)), SqlValue::Int(7));
    }

    #[test]
    fn table_renders_as_grid() {
        let table = TableValue {
            columns: vec!["id".into(), "name".into()],
            rows: vec![
                vec![SqlValue::Int(1), SqlValue::from("alpha")],
                vec![SqlValue::Int(22), SqlValue::from("b")],
            ],
        };
        let grid = SqlValue::from(table).sql_literal();
        let lines: Vec<&str> = grid.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("id") && lines[0].contains("name"));
        assert!(lines[2].starts_with("1 "));
        assert!(lines[3].starts_with("22"));
    }

    #[test]
    fn from_sql_conversions() {
        assert_eq!(i64::from_sql(&SqlValue::Int(5)).unwrap(), 5);
        assert_eq!(
            Option::<i32>::from_sql(&SqlValue::Null).unwrap(),
            None
        );
        assert!(i32::from_sql(&SqlValue::from("x")).is_err());
    }
}
