use chrono::NaiveDate;
use thiserror::Error;

/// Convenience result type for pipeline operations.
pub type ReportResult<T> = Result<T, ReportError>;

/// A recoverable failure on a single report line.
///
/// These are collected while parsing; the rest of the file is still processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line_number}: {reason}")]
pub struct ParseError {
    /// 1-based line number in the original report text.
    pub line_number: usize,
    pub reason: String,
}

impl ParseError {
    pub fn new(line_number: usize, reason: impl Into<String>) -> Self {
        Self {
            line_number,
            reason: reason.into(),
        }
    }
}

/// A value that falls outside its configured enumeration, or a date that cannot be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value for '{field}': {reason} (value='{value}'{})", line_suffix(.line_number))]
pub struct ValidationError {
    /// Canonical field name (e.g. `SettlementCurrency`).
    pub field: String,
    pub value: String,
    pub reason: String,
    /// Source line, when the value came from report text.
    pub line_number: Option<usize>,
}

fn line_suffix(line_number: &Option<usize>) -> String {
    match line_number {
        Some(n) => format!(", line {n}"),
        None => String::new(),
    }
}

/// Error type returned by parsing, aggregation, and export.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Underlying I/O error (e.g. config file not found).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration or stored-row JSON could not be (de)serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV ingestion error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(feature = "excel")]
    /// Workbook read error (feature-gated behind `excel`).
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// Workbook write error.
    #[error("xlsx write error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// Row store error.
    #[error("storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A required field or column is missing. Fatal for the whole report.
    #[error(
        "schema mismatch on '{field}': {message} ({} line error(s) collected)",
        .parse_errors.len()
    )]
    SchemaMismatch {
        field: String,
        message: String,
        /// Line errors collected before the report was rejected.
        parse_errors: Vec<ParseError>,
    },

    /// Enumeration or date violation under the strict policy.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Reports (or line items) with different settlement currencies were asked to merge.
    #[error("currency conflict for report '{report_id}': expected {expected}, found {found}")]
    CurrencyConflict {
        report_id: String,
        expected: String,
        found: String,
    },

    /// A merged count or amount left the representable range.
    #[error("overflow merging '{column}' of {category} in report '{report_id}'")]
    AmountOverflow {
        report_id: String,
        category: String,
        column: &'static str,
    },

    /// Two reports with different identities were asked to merge.
    #[error("cannot merge report {found} into {expected}: aggregation keys differ")]
    KeyMismatch { expected: String, found: String },

    /// A write collided with a concurrent writer (or an existing row of another identity)
    /// and could not be retried.
    #[error("storage conflict for ({report_id}, {processing_date}): {message}")]
    StorageConflict {
        report_id: String,
        processing_date: NaiveDate,
        message: String,
    },

    /// A filter used an operator outside `=, !=, >, <, >=, <=, contains, not_contains`.
    #[error("unsupported filter operation '{op}'")]
    UnsupportedOperator { op: String },

    /// Layout/field configuration is unusable.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The caller cancelled the operation; nothing was committed.
    #[error("operation cancelled")]
    Cancelled,
}
