//! Path-based entry point for already-tabular input (CSV or a spreadsheet).
//!
//! [`ingest_table_from_path`] picks the reader from the file extension unless
//! [`TabularOptions::format`] forces one, and reports the outcome to an optional
//! [`PipelineObserver`]. The resulting [`RecordSet`] is what the filter evaluator works on.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{ReportError, ReportResult};
use crate::types::{RecordSet, Schema};

use super::csv;
use super::observability::{
    PipelineContext, PipelineObserver, PipelineSeverity, PipelineStage, PipelineStats, notify,
};

/// Tabular formats readable by [`ingest_table_from_path`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabularFormat {
    Csv,
    /// Spreadsheet/workbook formats (feature-gated behind `excel`).
    Excel,
}

impl TabularFormat {
    /// Parse a format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Some(Self::Excel),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct TabularOptions {
    /// If `None`, the format is inferred from the file extension.
    pub format: Option<TabularFormat>,
    /// Sheet to read from a workbook; the first sheet when `None`.
    pub sheet: Option<String>,
    pub observer: Option<Arc<dyn PipelineObserver>>,
    pub alert_at_or_above: PipelineSeverity,
}

impl fmt::Debug for TabularOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabularOptions")
            .field("format", &self.format)
            .field("sheet", &self.sheet)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for TabularOptions {
    fn default() -> Self {
        Self {
            format: None,
            sheet: None,
            observer: None,
            alert_at_or_above: PipelineSeverity::Critical,
        }
    }
}

/// Read a CSV or workbook file into a [`RecordSet`].
///
/// With `schema`, every schema field must be present as a column and cells are parsed to the field
/// types; without one, all columns are kept and typed by inference.
pub fn ingest_table_from_path(
    path: impl AsRef<Path>,
    schema: Option<&Schema>,
    options: &TabularOptions,
) -> ReportResult<RecordSet> {
    let path = path.as_ref();
    let ctx = PipelineContext::new(path.display().to_string(), PipelineStage::Parse);

    let result = match options.format {
        Some(f) => Ok(f),
        None => infer_format_from_path(path),
    }
    .and_then(|format| match format {
        TabularFormat::Csv => csv::ingest_csv_from_path(path, schema),
        TabularFormat::Excel => ingest_excel_dispatch(path, schema, options.sheet.as_deref()),
    });

    notify(
        options.observer.as_ref(),
        &ctx,
        options.alert_at_or_above,
        &result,
        |rs| PipelineStats {
            items: rs.row_count(),
            ..PipelineStats::default()
        },
    );
    result
}

fn infer_format_from_path(path: &Path) -> ReportResult<TabularFormat> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ReportError::InvalidConfig {
            message: format!("cannot infer format: path has no extension ({})", path.display()),
        })?;

    TabularFormat::from_extension(ext).ok_or_else(|| ReportError::InvalidConfig {
        message: format!(
            "cannot infer format from extension '{ext}' for path ({})",
            path.display()
        ),
    })
}

fn ingest_excel_dispatch(
    path: &Path,
    schema: Option<&Schema>,
    sheet: Option<&str>,
) -> ReportResult<RecordSet> {
    #[cfg(feature = "excel")]
    {
        super::excel::ingest_excel_from_path(path, sheet, schema)
    }

    #[cfg(not(feature = "excel"))]
    {
        let _ = (path, schema, sheet);
        Err(ReportError::InvalidConfig {
            message: "workbook input not enabled (enable cargo feature 'excel')".to_string(),
        })
    }
}
