//! Versioned line layout of the settlement report text format.
//!
//! The layout is label-driven rather than offset-driven: lines are recognized by the labels they
//! carry, and amount columns are aligned right-to-left against [`ReportLayout::amount_columns`].
//! A new report revision only needs a new layout document.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, ReportResult};
use crate::report::HeaderField;

/// A header label and the canonical field its value feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderLabel {
    /// Label as printed, e.g. `PROC DATE:`. Matched case-insensitively.
    pub label: String,
    pub field: HeaderField,
}

/// A section heading that sets the MajorType of the lines below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionLabel {
    pub label: String,
    pub major_type: String,
}

/// A line label that starts an item or total line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineLabel {
    pub label: String,
    pub minor_type: String,
    /// Lines with this label are subtotals / grand totals.
    #[serde(default)]
    pub total: bool,
}

/// Numeric columns of an item line, in printed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountColumn {
    Count,
    CreditAmount,
    DebitAmount,
    TotalAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportLayout {
    /// Layout revision, e.g. `vss-110/1`.
    pub version: String,
    pub header_labels: Vec<HeaderLabel>,
    pub sections: Vec<SectionLabel>,
    pub line_labels: Vec<LineLabel>,
    pub amount_columns: Vec<AmountColumn>,
    /// Minimum run of spaces that ends a header value.
    #[serde(default = "default_value_gap")]
    pub value_gap: usize,
    /// `chrono` formats tried in order when normalizing header dates.
    pub date_formats: Vec<String>,
    #[serde(default = "default_credit_marker")]
    pub credit_marker: String,
    #[serde(default = "default_debit_marker")]
    pub debit_marker: String,
}

fn default_value_gap() -> usize {
    2
}

fn default_credit_marker() -> String {
    "CR".to_string()
}

fn default_debit_marker() -> String {
    "DB".to_string()
}

impl ReportLayout {
    /// Built-in layout for the VSS-110 settlement summary report.
    pub fn vss110() -> Self {
        let header = |label: &str, field| HeaderLabel {
            label: label.to_string(),
            field,
        };
        let section = |label: &str, major: &str| SectionLabel {
            label: label.to_string(),
            major_type: major.to_string(),
        };
        let line = |label: &str, minor: &str, total| LineLabel {
            label: label.to_string(),
            minor_type: minor.to_string(),
            total,
        };

        Self {
            version: "vss-110/1".to_string(),
            header_labels: vec![
                header("REPORT ID:", HeaderField::ReportId),
                header("REPORTING FOR:", HeaderField::ReportingFor),
                header("TRANSACTION TYPE:", HeaderField::TransactionType),
                header("ROLLUP TO:", HeaderField::RollupTo),
                header("FUNDS XFER ENTITY:", HeaderField::FundsXferEntity),
                header("SETTLEMENT CURRENCY:", HeaderField::SettlementCurrency),
                header("PROC DATE:", HeaderField::ProcessingDate),
                header("REPORT DATE:", HeaderField::ReportDate),
            ],
            sections: vec![
                section("INTERCHANGE VALUE", "Interchange"),
                section("REIMBURSEMENT FEES", "Reimbursement"),
                section("VISA CHARGES", "Visa Charges"),
                section("TOTAL", "Total"),
            ],
            line_labels: vec![
                line("ACQUIRER", "Acquirer", false),
                line("ISSUER", "Issuer", false),
                line("OTHER", "Other", false),
                line("NET SETTLEMENT AMOUNT", "Net Settlement Amount", true),
                line("TOTAL", "Total", true),
            ],
            amount_columns: vec![
                AmountColumn::Count,
                AmountColumn::CreditAmount,
                AmountColumn::DebitAmount,
                AmountColumn::TotalAmount,
            ],
            value_gap: default_value_gap(),
            date_formats: vec![
                "%d%b%y".to_string(),
                "%Y-%m-%d".to_string(),
                "%m/%d/%Y".to_string(),
            ],
            credit_marker: default_credit_marker(),
            debit_marker: default_debit_marker(),
        }
    }

    /// Reject layouts the parser cannot work with.
    pub fn validate(&self) -> ReportResult<()> {
        let invalid = |message: String| Err(ReportError::InvalidConfig { message });

        if self.version.trim().is_empty() {
            return invalid("layout version is empty".to_string());
        }
        if self.value_gap == 0 {
            return invalid("value_gap must be > 0".to_string());
        }
        if self.date_formats.is_empty() {
            return invalid("date_formats must not be empty".to_string());
        }
        if self.amount_columns.is_empty() {
            return invalid("amount_columns must not be empty".to_string());
        }
        let unique: BTreeSet<_> = self.amount_columns.iter().collect();
        if unique.len() != self.amount_columns.len() {
            return invalid("amount_columns contains duplicates".to_string());
        }

        let labels = self
            .header_labels
            .iter()
            .map(|h| h.label.as_str())
            .chain(self.sections.iter().map(|s| s.label.as_str()))
            .chain(self.line_labels.iter().map(|l| l.label.as_str()));
        for label in labels {
            if label.trim().is_empty() {
                return invalid("layout contains an empty label".to_string());
            }
        }

        for field in HeaderField::ALL {
            if !self.header_labels.iter().any(|h| h.field == field) {
                return invalid(format!("no header label configured for {field}"));
            }
        }
        Ok(())
    }

    /// Normalize a printed date using the configured formats.
    pub fn parse_date(&self, raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        self.date_formats
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
    }
}
