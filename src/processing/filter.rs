//! Predicate filtering for [`crate::types::RecordSet`].
//!
//! Predicates are AND-combined in list order. A predicate whose value or cell cannot be coerced
//! for an ordering comparison evaluates to `false` for that row; it never aborts the filter.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, ReportResult};
use crate::types::{RecordSet, Schema, Value, parse_decimal, parse_text_date};

/// Comparison operator of a [`FilterPredicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Contains,
    NotContains,
}

impl FilterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Gt => ">",
            FilterOp::Lt => "<",
            FilterOp::Ge => ">=",
            FilterOp::Le => "<=",
            FilterOp::Contains => "contains",
            FilterOp::NotContains => "not_contains",
        }
    }
}

impl FromStr for FilterOp {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Ok(FilterOp::Eq),
            "!=" | "<>" => Ok(FilterOp::Ne),
            ">" => Ok(FilterOp::Gt),
            "<" => Ok(FilterOp::Lt),
            ">=" => Ok(FilterOp::Ge),
            "<=" => Ok(FilterOp::Le),
            "contains" => Ok(FilterOp::Contains),
            "not_contains" | "not contains" => Ok(FilterOp::NotContains),
            _ => Err(ReportError::UnsupportedOperator { op: s.to_string() }),
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `column <op> value` condition.
///
/// JSON form: `{"column": "Amount", "operation": ">", "value": 200}`. `operator` is accepted as an
/// alias of `operation`; `value` may be a string, number or bool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPredicate", into = "RawPredicate")]
pub struct FilterPredicate {
    pub column: String,
    pub op: FilterOp,
    /// Raw comparison value, coerced per operator at evaluation time.
    pub value: String,
}

impl FilterPredicate {
    pub fn new(column: impl Into<String>, op: FilterOp, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// Build a predicate from the operator as the user typed it.
    pub fn parse(
        column: impl Into<String>,
        op: &str,
        value: impl Into<String>,
    ) -> ReportResult<Self> {
        Ok(Self::new(column, op.parse()?, value))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawPredicate {
    column: String,
    #[serde(alias = "operator")]
    operation: String,
    #[serde(default)]
    value: serde_json::Value,
}

impl TryFrom<RawPredicate> for FilterPredicate {
    type Error = ReportError;

    fn try_from(raw: RawPredicate) -> Result<Self, Self::Error> {
        let value = match raw.value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Null => String::new(),
            other => {
                return Err(ReportError::InvalidConfig {
                    message: format!(
                        "filter value for '{}' must be a string, number or bool, got {other}",
                        raw.column
                    ),
                });
            }
        };
        FilterPredicate::parse(raw.column, &raw.operation, value)
    }
}

impl From<FilterPredicate> for RawPredicate {
    fn from(p: FilterPredicate) -> Self {
        RawPredicate {
            column: p.column,
            operation: p.op.as_str().to_string(),
            value: serde_json::Value::String(p.value),
        }
    }
}

/// Parse a JSON array of predicates, as sent by the upload form.
pub fn parse_predicates_json(input: &str) -> ReportResult<Vec<FilterPredicate>> {
    Ok(serde_json::from_str(input)?)
}

/// Predicates resolved against a schema: column indexes looked up and the comparison value
/// pre-coerced once instead of per row.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    predicates: Vec<CompiledPredicate>,
}

static NULL: Value = Value::Null;

#[derive(Debug, Clone)]
struct CompiledPredicate {
    idx: Option<usize>,
    op: FilterOp,
    text: String,
    lowered: String,
    number: Option<Decimal>,
    date: Option<NaiveDate>,
}

impl CompiledFilter {
    pub fn new(schema: &Schema, predicates: &[FilterPredicate]) -> Self {
        let predicates = predicates
            .iter()
            .map(|p| {
                let idx = schema.index_of(&p.column);
                if idx.is_none() {
                    tracing::warn!(
                        column = %p.column,
                        "filter column not in schema; cells read as null"
                    );
                }
                let text = p.value.trim().to_string();
                CompiledPredicate {
                    idx,
                    op: p.op,
                    lowered: text.to_lowercase(),
                    number: parse_decimal(&text),
                    date: parse_text_date(&text),
                    text,
                }
            })
            .collect();
        Self { predicates }
    }

    /// `true` when every predicate holds for `row`.
    pub fn matches(&self, row: &[Value]) -> bool {
        self.predicates.iter().all(|p| p.matches(row))
    }
}

impl CompiledPredicate {
    fn matches(&self, row: &[Value]) -> bool {
        let cell = self
            .idx
            .and_then(|i| row.get(i))
            .unwrap_or(&NULL);

        match self.op {
            FilterOp::Eq => self.equals(cell),
            FilterOp::Ne => !self.equals(cell),
            FilterOp::Gt => self.ordering(cell) == Some(Ordering::Greater),
            FilterOp::Lt => self.ordering(cell) == Some(Ordering::Less),
            FilterOp::Ge => matches!(
                self.ordering(cell),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Le => matches!(self.ordering(cell), Some(Ordering::Less | Ordering::Equal)),
            FilterOp::Contains => self.contains(cell),
            FilterOp::NotContains => !self.contains(cell),
        }
    }

    /// Numeric or date comparison; `None` when either side does not coerce.
    fn ordering(&self, cell: &Value) -> Option<Ordering> {
        match cell {
            Value::Date(d) => self.date.map(|v| d.cmp(&v)),
            _ => Some(cell.as_decimal()?.cmp(self.number.as_ref()?)),
        }
    }

    fn equals(&self, cell: &Value) -> bool {
        match self.ordering(cell) {
            Some(ord) => ord == Ordering::Equal,
            None => cell.to_string() == self.text,
        }
    }

    fn contains(&self, cell: &Value) -> bool {
        cell.to_string().to_lowercase().contains(&self.lowered)
    }
}

/// Returns a new [`RecordSet`] with the rows matching every predicate, in original order.
///
/// The input is left untouched and applying the same predicates again yields the same set.
pub fn apply_filters(record_set: &RecordSet, predicates: &[FilterPredicate]) -> RecordSet {
    if predicates.is_empty() {
        return record_set.clone();
    }
    let compiled = CompiledFilter::new(&record_set.schema, predicates);
    record_set.filter_rows(|row| compiled.matches(row))
}

/// Like [`apply_filters`], but a predicate naming a column the record set does not have is a
/// [`ReportError::SchemaMismatch`] instead of a null read. Use it for user-entered filters.
pub fn try_apply_filters(
    record_set: &RecordSet,
    predicates: &[FilterPredicate],
) -> ReportResult<RecordSet> {
    if let Some(p) = predicates
        .iter()
        .find(|p| record_set.schema.index_of(&p.column).is_none())
    {
        let known: Vec<_> = record_set.schema.field_names().collect();
        return Err(ReportError::SchemaMismatch {
            field: p.column.clone(),
            message: format!("filter column is not in the record set. columns={known:?}"),
            parse_errors: Vec::new(),
        });
    }
    Ok(apply_filters(record_set, predicates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, Field};
    use rust_decimal_macros::dec;

    fn sample() -> RecordSet {
        let schema = Schema::new(vec![
            Field::new("MajorType", DataType::Utf8),
            Field::new("MinorType", DataType::Utf8),
            Field::new("Amount", DataType::Decimal),
            Field::new("ProcessingDate", DataType::Date),
            Field::new("Note", DataType::Utf8),
        ]);
        let day = |d| Value::Date(NaiveDate::from_ymd_opt(2025, 7, d).unwrap());
        RecordSet::new(
            schema,
            vec![
                vec![
                    Value::Utf8("Interchange".into()),
                    Value::Utf8("Acquirer".into()),
                    Value::Decimal(dec!(120.50)),
                    day(14),
                    Value::Utf8("1,500.00".into()),
                ],
                vec![
                    Value::Utf8("Visa Charges".into()),
                    Value::Utf8("Other".into()),
                    Value::Decimal(dec!(-3.00)),
                    day(15),
                    Value::Utf8("n/a".into()),
                ],
                vec![
                    Value::Utf8("Interchange".into()),
                    Value::Utf8("Issuer".into()),
                    Value::Null,
                    day(15),
                    Value::Null,
                ],
            ],
        )
    }

    fn minors(rs: &RecordSet) -> Vec<String> {
        (0..rs.row_count())
            .map(|r| rs.value(r, "MinorType").map(|v| v.to_string()).unwrap_or_default())
            .collect()
    }

    #[test]
    fn string_equality_falls_back_when_value_is_not_numeric() {
        let out = apply_filters(
            &sample(),
            &[FilterPredicate::new("MajorType", FilterOp::Eq, "Interchange")],
        );
        assert_eq!(minors(&out), vec!["Acquirer", "Issuer"]);
    }

    #[test]
    fn numeric_comparisons_coerce_and_skip_nulls() {
        let rs = sample();
        let gt = apply_filters(&rs, &[FilterPredicate::new("Amount", FilterOp::Gt, "100")]);
        assert_eq!(minors(&gt), vec!["Acquirer"]);

        let le = apply_filters(&rs, &[FilterPredicate::new("Amount", FilterOp::Le, "120.5")]);
        assert_eq!(minors(&le), vec!["Acquirer", "Other"]);

        let none = apply_filters(&rs, &[FilterPredicate::new("Amount", FilterOp::Gt, "200")]);
        assert_eq!(none.row_count(), 0);
        assert_eq!(none.schema, rs.schema);
    }

    #[test]
    fn numeric_text_cells_are_coerced() {
        let out = apply_filters(&sample(), &[FilterPredicate::new("Note", FilterOp::Ge, "1500")]);
        assert_eq!(minors(&out), vec!["Acquirer"]);
    }

    #[test]
    fn non_numeric_value_makes_ordering_false() {
        let out = apply_filters(&sample(), &[FilterPredicate::new("Amount", FilterOp::Gt, "lots")]);
        assert_eq!(out.row_count(), 0);
    }

    #[test]
    fn dates_compare_chronologically() {
        let out = apply_filters(
            &sample(),
            &[FilterPredicate::new("ProcessingDate", FilterOp::Ge, "2025-07-15")],
        );
        assert_eq!(minors(&out), vec!["Other", "Issuer"]);
    }

    #[test]
    fn predicates_are_and_combined() {
        let out = apply_filters(
            &sample(),
            &[
                FilterPredicate::new("MajorType", FilterOp::Eq, "Interchange"),
                FilterPredicate::new("ProcessingDate", FilterOp::Eq, "07/15/2025"),
            ],
        );
        assert_eq!(minors(&out), vec!["Issuer"]);
    }

    #[test]
    fn contains_and_not_contains_partition_rows() {
        let rs = sample();
        let yes = apply_filters(
            &rs,
            &[FilterPredicate::new("MajorType", FilterOp::Contains, "CHANGE")],
        );
        let no = apply_filters(
            &rs,
            &[FilterPredicate::new("MajorType", FilterOp::NotContains, "CHANGE")],
        );
        assert_eq!(yes.row_count() + no.row_count(), rs.row_count());
        assert_eq!(minors(&no), vec!["Other"]);
    }

    #[test]
    fn unknown_column_reads_as_null() {
        let rs = sample();
        let eq_empty = apply_filters(&rs, &[FilterPredicate::new("Nope", FilterOp::Eq, "")]);
        assert_eq!(eq_empty.row_count(), 3);
        let gt = apply_filters(&rs, &[FilterPredicate::new("Nope", FilterOp::Gt, "0")]);
        assert_eq!(gt.row_count(), 0);
    }

    #[test]
    fn checked_filters_reject_unknown_columns() {
        let rs = sample();
        let err =
            try_apply_filters(&rs, &[FilterPredicate::new("Nope", FilterOp::Ne, "x")]).unwrap_err();
        assert!(matches!(err, ReportError::SchemaMismatch { field, .. } if field == "Nope"));

        let preds = [FilterPredicate::new("MinorType", FilterOp::Ne, "Other")];
        assert_eq!(try_apply_filters(&rs, &preds).unwrap(), apply_filters(&rs, &preds));
    }

    #[test]
    fn filtering_is_idempotent_and_leaves_input_alone() {
        let rs = sample();
        let before = rs.clone();
        let preds = [FilterPredicate::new("Amount", FilterOp::Ne, "-3")];
        let once = apply_filters(&rs, &preds);
        let twice = apply_filters(&once, &preds);
        assert_eq!(once, twice);
        assert_eq!(rs, before);
        assert_eq!(minors(&once), vec!["Acquirer", "Issuer"]);
    }

    #[test]
    fn unsupported_operator_is_rejected() {
        let err = FilterPredicate::parse("Amount", "~=", "1").unwrap_err();
        assert!(matches!(err, ReportError::UnsupportedOperator { op } if op == "~="));
    }

    #[test]
    fn predicates_parse_from_form_json() {
        let preds = parse_predicates_json(
            r#"[{"column":"Amount","operation":">","value":200},
                {"column":"MajorType","operator":"=","value":"Interchange"},
                {"column":"Settled","operation":"!=","value":true}]"#,
        )
        .unwrap();
        assert_eq!(preds[0], FilterPredicate::new("Amount", FilterOp::Gt, "200"));
        assert_eq!(preds[1].op, FilterOp::Eq);
        assert_eq!(preds[2].value, "true");

        let like = r#"[{"column":"A","operation":"like","value":"x"}]"#;
        assert!(parse_predicates_json(like).is_err());
    }
}
