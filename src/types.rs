//! Tabular data model shared by the filter evaluator, tabular ingestion, and the exporter.
//!
//! A [`RecordSet`] is an ordered list of rows described by a [`Schema`] (a list of typed
//! [`Field`]s). Rows produced from a parsed report and rows read from a spreadsheet end up in the
//! same shape, so filtering and export never need to know where the data came from.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Logical data type for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// Exact decimal number. Monetary columns always use this type.
    Decimal,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Utf8,
    /// Calendar date.
    Date,
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// A list of fields describing the shape of a [`RecordSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// A single typed value in a [`RecordSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// Exact decimal.
    Decimal(Decimal),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
    /// Calendar date.
    Date(NaiveDate),
}

impl Value {
    /// Numeric view of the value, if it has one.
    ///
    /// Strings are coerced when they read as a decimal (thousands separators allowed).
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Int64(v) => Some(Decimal::from(*v)),
            Value::Decimal(d) => Some(*d),
            Value::Utf8(s) => parse_decimal(s),
            Value::Null | Value::Bool(_) | Value::Date(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Display form used for string comparisons and substring matching. `Null` renders as `""`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Utf8(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// Parse a decimal the way settlement reports print them: optional sign, optional `,`
/// thousands separators.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let cleaned: String = trimmed.chars().filter(|c| *c != ',').collect();
    cleaned.parse::<Decimal>().ok()
}

/// Date formats accepted in text cells and filter values.
pub const TEXT_DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%d%b%y"];

/// Parse a date written as text in any of [`TEXT_DATE_FORMATS`].
pub fn parse_text_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    TEXT_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// In-memory tabular record set.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the [`Schema`] fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet {
    /// Schema describing row shape.
    pub schema: Schema,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
}

impl RecordSet {
    /// Create a record set from schema and rows.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// An empty record set with the given schema.
    pub fn empty(schema: Schema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    /// Number of rows in the record set.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Value at (`row`, `column`), if both exist.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.schema.index_of(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Create a new record set containing only rows that match `predicate`.
    ///
    /// The returned record set preserves the original schema and row order.
    pub fn filter_rows<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&[Value]) -> bool,
    {
        let rows = self
            .rows
            .iter()
            .filter(|row| predicate(row.as_slice()))
            .cloned()
            .collect();
        Self {
            schema: self.schema.clone(),
            rows,
        }
    }

    /// Reduce (fold) all rows into an accumulator value.
    pub fn reduce_rows<A, F>(&self, init: A, mut reducer: F) -> A
    where
        F: FnMut(A, &[Value]) -> A,
    {
        self.rows
            .iter()
            .fold(init, |acc, row| reducer(acc, row.as_slice()))
    }

    /// Exact sum of a numeric column, ignoring nulls and non-numeric cells.
    ///
    /// Returns `None` if the column does not exist.
    pub fn sum_decimal(&self, column: &str) -> Option<Decimal> {
        let idx = self.schema.index_of(column)?;
        Some(self.reduce_rows(Decimal::ZERO, |acc, row| {
            match row.get(idx).and_then(Value::as_decimal) {
                Some(v) => acc + v,
                None => acc,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> RecordSet {
        let schema = Schema::new(vec![
            Field::new("MajorType", DataType::Utf8),
            Field::new("Amount", DataType::Decimal),
        ]);
        RecordSet::new(
            schema,
            vec![
                vec![Value::Utf8("Interchange".into()), Value::Decimal(dec!(120.50))],
                vec![Value::Utf8("Reimbursement".into()), Value::Null],
                vec![Value::Utf8("Visa Charges".into()), Value::Decimal(dec!(-0.10))],
            ],
        )
    }

    #[test]
    fn schema_index_of_works() {
        let rs = sample();
        assert_eq!(rs.schema.index_of("MajorType"), Some(0));
        assert_eq!(rs.schema.index_of("Amount"), Some(1));
        assert_eq!(rs.schema.index_of("missing"), None);
    }

    #[test]
    fn filter_rows_preserves_schema_and_leaves_input_alone() {
        let rs = sample();
        let out = rs.filter_rows(|row| !row[1].is_null());
        assert_eq!(out.schema, rs.schema);
        assert_eq!(out.row_count(), 2);
        assert_eq!(rs.row_count(), 3);
    }

    #[test]
    fn sum_decimal_is_exact_and_skips_nulls() {
        let rs = sample();
        assert_eq!(rs.sum_decimal("Amount"), Some(dec!(120.40)));
        assert_eq!(rs.sum_decimal("missing"), None);
    }

    #[test]
    fn parse_decimal_accepts_thousands_separators() {
        assert_eq!(parse_decimal("1,234.56"), Some(dec!(1234.56)));
        assert_eq!(parse_decimal(" -7 "), Some(dec!(-7)));
        assert_eq!(parse_decimal("Interchange"), None);
        assert_eq!(parse_decimal(""), None);
    }

    #[test]
    fn display_renders_null_as_empty_and_dates_iso() {
        assert_eq!(Value::Null.to_string(), "");
        let d = NaiveDate::from_ymd_opt(2025, 7, 14).unwrap();
        assert_eq!(Value::Date(d).to_string(), "2025-07-14");
        assert_eq!(Value::Decimal(dec!(120.50)).to_string(), "120.50");
    }
}
