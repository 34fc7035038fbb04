//! Canonical settlement report model.
//!
//! A [`Report`] is exactly one [`ReportHeader`] plus an ordered list of [`LineItem`]s. Reports
//! are produced by [`crate::ingestion::mapper`] (or read back from an exported workbook) and are
//! treated as values: filtering and aggregation build new reports instead of editing old ones.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{DataType, Field, RecordSet, Schema, Value};

/// Canonical column names used in record sets, workbooks, and field configuration.
pub mod columns {
    pub const REPORT_ID: &str = "ReportID";
    pub const REPORTING_FOR: &str = "ReportingFor";
    pub const TRANSACTION_TYPE: &str = "TransactionType";
    pub const ROLLUP_TO: &str = "RollupTo";
    pub const FUNDS_XFER_ENTITY: &str = "FundsXferEntity";
    pub const SETTLEMENT_CURRENCY: &str = "SettlementCurrency";
    pub const PROCESSING_DATE: &str = "ProcessingDate";
    pub const REPORT_DATE: &str = "ReportDate";
    pub const LINE_KIND: &str = "LineKind";
    pub const MAJOR_TYPE: &str = "MajorType";
    pub const MINOR_TYPE: &str = "MinorType";
    pub const COUNT: &str = "Count";
    pub const CREDIT_AMOUNT: &str = "CreditAmount";
    pub const DEBIT_AMOUNT: &str = "DebitAmount";
    pub const AMOUNT: &str = "Amount";
    pub const CRDB: &str = "CrDb";
    pub const CURRENCY: &str = "Currency";
    pub const CREDIT_ACCOUNT: &str = "CreditAccount";
    pub const DEBIT_ACCOUNT: &str = "DebitAccount";
}

/// The required header fields of a settlement report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HeaderField {
    #[serde(rename = "ReportID")]
    ReportId,
    ReportingFor,
    TransactionType,
    RollupTo,
    FundsXferEntity,
    SettlementCurrency,
    ProcessingDate,
    ReportDate,
}

impl HeaderField {
    /// All header fields in canonical (export) order.
    pub const ALL: [HeaderField; 8] = [
        HeaderField::ReportId,
        HeaderField::ReportingFor,
        HeaderField::TransactionType,
        HeaderField::RollupTo,
        HeaderField::FundsXferEntity,
        HeaderField::SettlementCurrency,
        HeaderField::ProcessingDate,
        HeaderField::ReportDate,
    ];

    /// Canonical column name.
    pub fn name(self) -> &'static str {
        match self {
            HeaderField::ReportId => columns::REPORT_ID,
            HeaderField::ReportingFor => columns::REPORTING_FOR,
            HeaderField::TransactionType => columns::TRANSACTION_TYPE,
            HeaderField::RollupTo => columns::ROLLUP_TO,
            HeaderField::FundsXferEntity => columns::FUNDS_XFER_ENTITY,
            HeaderField::SettlementCurrency => columns::SETTLEMENT_CURRENCY,
            HeaderField::ProcessingDate => columns::PROCESSING_DATE,
            HeaderField::ReportDate => columns::REPORT_DATE,
        }
    }

    pub fn is_date(self) -> bool {
        matches!(self, HeaderField::ProcessingDate | HeaderField::ReportDate)
    }
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportHeader {
    pub report_id: String,
    pub reporting_for: String,
    pub transaction_type: String,
    pub rollup_to: String,
    pub funds_xfer_entity: String,
    pub settlement_currency: String,
    pub processing_date: NaiveDate,
    pub report_date: NaiveDate,
}

impl ReportHeader {
    pub fn key(&self) -> AggregationKey {
        AggregationKey {
            report_id: self.report_id.clone(),
            reporting_for: self.reporting_for.clone(),
            settlement_currency: self.settlement_currency.clone(),
            processing_date: self.processing_date,
        }
    }

    /// Value of a header field as a typed cell.
    pub fn value(&self, field: HeaderField) -> Value {
        match field {
            HeaderField::ReportId => Value::Utf8(self.report_id.clone()),
            HeaderField::ReportingFor => Value::Utf8(self.reporting_for.clone()),
            HeaderField::TransactionType => Value::Utf8(self.transaction_type.clone()),
            HeaderField::RollupTo => Value::Utf8(self.rollup_to.clone()),
            HeaderField::FundsXferEntity => Value::Utf8(self.funds_xfer_entity.clone()),
            HeaderField::SettlementCurrency => Value::Utf8(self.settlement_currency.clone()),
            HeaderField::ProcessingDate => Value::Date(self.processing_date),
            HeaderField::ReportDate => Value::Date(self.report_date),
        }
    }
}

/// Whether a line is a category detail or a subtotal/grand total printed by the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Detail,
    Total,
}

impl LineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LineKind::Detail => "detail",
            LineKind::Total => "total",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "detail" => Some(LineKind::Detail),
            "total" => Some(LineKind::Total),
            _ => None,
        }
    }
}

/// One categorized amount line of a report.
///
/// `amount` is the signed net amount (credit positive, debit negative); `credit_amount` and
/// `debit_amount` are the unsigned column values as printed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub kind: LineKind,
    pub major_type: String,
    pub minor_type: String,
    pub count: i64,
    pub credit_amount: Decimal,
    pub debit_amount: Decimal,
    pub amount: Decimal,
    pub currency: String,
    pub credit_account: Option<String>,
    pub debit_account: Option<String>,
}

impl LineItem {
    /// `CR` for non-negative net amounts, `DB` otherwise.
    pub fn crdb_label(&self) -> &'static str {
        if self.amount.is_sign_negative() && !self.amount.is_zero() {
            "DB"
        } else {
            "CR"
        }
    }

    /// Merge identity of the line within a report.
    pub fn category(&self) -> (LineKind, &str, &str) {
        (self.kind, self.major_type.as_str(), self.minor_type.as_str())
    }
}

/// Identity under which report instances are considered the same logical report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregationKey {
    pub report_id: String,
    pub reporting_for: String,
    pub settlement_currency: String,
    pub processing_date: NaiveDate,
}

impl fmt::Display for AggregationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.report_id, self.reporting_for, self.settlement_currency, self.processing_date
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub header: ReportHeader,
    pub items: Vec<LineItem>,
}

impl Report {
    pub fn new(header: ReportHeader, items: Vec<LineItem>) -> Self {
        Self { header, items }
    }

    pub fn key(&self) -> AggregationKey {
        self.header.key()
    }

    pub fn details(&self) -> impl Iterator<Item = &LineItem> {
        self.items.iter().filter(|i| i.kind == LineKind::Detail)
    }

    pub fn totals(&self) -> impl Iterator<Item = &LineItem> {
        self.items.iter().filter(|i| i.kind == LineKind::Total)
    }

    /// Flatten the report into item rows carrying the identity columns.
    pub fn to_record_set(&self) -> RecordSet {
        items_record_set(std::slice::from_ref(self), |_| true)
    }
}

/// Schema of one header row per report.
pub fn header_schema() -> Schema {
    Schema::new(
        HeaderField::ALL
            .iter()
            .map(|f| {
                let ty = if f.is_date() {
                    DataType::Date
                } else {
                    DataType::Utf8
                };
                Field::new(f.name(), ty)
            })
            .collect(),
    )
}

/// Schema of item rows: identity columns first, then the line columns.
pub fn item_schema() -> Schema {
    use columns::*;
    Schema::new(vec![
        Field::new(REPORT_ID, DataType::Utf8),
        Field::new(REPORTING_FOR, DataType::Utf8),
        Field::new(SETTLEMENT_CURRENCY, DataType::Utf8),
        Field::new(PROCESSING_DATE, DataType::Date),
        Field::new(REPORT_DATE, DataType::Date),
        Field::new(LINE_KIND, DataType::Utf8),
        Field::new(MAJOR_TYPE, DataType::Utf8),
        Field::new(MINOR_TYPE, DataType::Utf8),
        Field::new(COUNT, DataType::Int64),
        Field::new(CREDIT_AMOUNT, DataType::Decimal),
        Field::new(DEBIT_AMOUNT, DataType::Decimal),
        Field::new(AMOUNT, DataType::Decimal),
        Field::new(CRDB, DataType::Utf8),
        Field::new(CURRENCY, DataType::Utf8),
        Field::new(CREDIT_ACCOUNT, DataType::Utf8),
        Field::new(DEBIT_ACCOUNT, DataType::Utf8),
    ])
}

/// One header row per report, in input order.
pub fn headers_record_set(reports: &[Report]) -> RecordSet {
    let rows = reports
        .iter()
        .map(|r| {
            HeaderField::ALL
                .iter()
                .map(|f| r.header.value(*f))
                .collect()
        })
        .collect();
    RecordSet::new(header_schema(), rows)
}

/// Item rows of every report whose line matches `keep`, in report then line order.
pub fn items_record_set<F>(reports: &[Report], mut keep: F) -> RecordSet
where
    F: FnMut(&LineItem) -> bool,
{
    let mut rows = Vec::new();
    for report in reports {
        let h = &report.header;
        for item in report.items.iter().filter(|i| keep(i)) {
            rows.push(vec![
                Value::Utf8(h.report_id.clone()),
                Value::Utf8(h.reporting_for.clone()),
                Value::Utf8(h.settlement_currency.clone()),
                Value::Date(h.processing_date),
                Value::Date(h.report_date),
                Value::Utf8(item.kind.as_str().to_string()),
                Value::Utf8(item.major_type.clone()),
                Value::Utf8(item.minor_type.clone()),
                Value::Int64(item.count),
                Value::Decimal(item.credit_amount),
                Value::Decimal(item.debit_amount),
                Value::Decimal(item.amount),
                Value::Utf8(item.crdb_label().to_string()),
                Value::Utf8(item.currency.clone()),
                optional_text(&item.credit_account),
                optional_text(&item.debit_account),
            ]);
        }
    }
    RecordSet::new(item_schema(), rows)
}

fn optional_text(v: &Option<String>) -> Value {
    match v {
        Some(s) => Value::Utf8(s.clone()),
        None => Value::Null,
    }
}
