//! Boundary operations: bytes in, reports / record sets / export output out.
//!
//! Everything the callers (an HTTP handler, a batch job, a CLI) need is here; the submodules hold
//! the individual stages.
//!
//! ```no_run
//! use settlement_pipeline::config::PipelineConfig;
//! use settlement_pipeline::export::ReportStore;
//! use settlement_pipeline::pipeline::{
//!     ExportDestination, ParseOptions, aggregate_and_export, parse_report,
//! };
//! use settlement_pipeline::processing::AggregationMode;
//!
//! # fn main() -> Result<(), settlement_pipeline::ReportError> {
//! let config = PipelineConfig::default();
//! let raw = std::fs::read("VSS-110.txt")?;
//! let options = ParseOptions::default().with_source("VSS-110.txt");
//! let parsed = parse_report(&raw, &config, &options)?;
//!
//! let store = ReportStore::in_memory()?;
//! let destination = ExportDestination::Store(&store);
//! aggregate_and_export(&[parsed.report], AggregationMode::Aggregate, destination)?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::{ReportError, ReportResult};
use crate::execution::CancellationToken;
use crate::export::{ReportStore, StorageWriteResult, StoredReport, reports_to_workbook};
use crate::ingestion::observability::notify;
use crate::ingestion::{
    ParsedReport, PipelineContext, PipelineObserver, PipelineSeverity, PipelineStage,
    PipelineStats, map_report, parse_lines,
};
use crate::processing::{AggregationMode, aggregate};
use crate::report::Report;

pub use crate::processing::{apply_filters, try_apply_filters};

/// Per-call options shared by the pipeline operations.
#[derive(Clone)]
pub struct ParseOptions {
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn PipelineObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: PipelineSeverity,
    pub cancel: Option<CancellationToken>,
    /// Label reported to observers.
    pub source: String,
}

impl fmt::Debug for ParseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseOptions")
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .field("cancel", &self.cancel)
            .field("source", &self.source)
            .finish()
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            observer: None,
            alert_at_or_above: PipelineSeverity::Critical,
            cancel: None,
            source: "input".to_string(),
        }
    }
}

impl ParseOptions {
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_observer(
        mut self,
        observer: Arc<dyn PipelineObserver>,
        alert_at_or_above: PipelineSeverity,
    ) -> Self {
        self.observer = Some(observer);
        self.alert_at_or_above = alert_at_or_above;
        self
    }

    fn context(&self, stage: PipelineStage) -> PipelineContext {
        PipelineContext::new(self.source.clone(), stage)
    }

    fn check_cancelled(&self) -> ReportResult<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(ReportError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Where [`aggregate_and_export`] sends its output.
#[derive(Debug, Clone, Copy)]
pub enum ExportDestination<'a> {
    /// Serialize to `.xlsx` bytes.
    Workbook,
    /// Upsert into a row store.
    Store(&'a ReportStore),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutput {
    Workbook(Vec<u8>),
    Stored(StorageWriteResult),
}

/// Parse one report file.
///
/// Text is decoded as UTF-8 (invalid sequences are replaced, not rejected). Line-level problems
/// end up in [`ParsedReport::parse_errors`]; a missing header field, an unparseable date, or (in
/// strict mode) a value outside its enumeration fails the whole report.
pub fn parse_report(
    raw: &[u8],
    config: &PipelineConfig,
    options: &ParseOptions,
) -> ReportResult<ParsedReport> {
    let result = parse_inner(raw, config, options);
    notify(
        options.observer.as_ref(),
        &options.context(PipelineStage::Parse),
        options.alert_at_or_above,
        &result,
        |parsed| PipelineStats {
            reports: 1,
            items: parsed.report.items.len(),
            parse_errors: parsed.parse_errors.len(),
            flags: parsed.flags.len(),
        },
    );
    result
}

fn parse_inner(
    raw: &[u8],
    config: &PipelineConfig,
    options: &ParseOptions,
) -> ReportResult<ParsedReport> {
    config.layout.validate()?;
    options.check_cancelled()?;

    let text = String::from_utf8_lossy(raw);
    let lines = parse_lines(&text, &config.layout, options.cancel.as_ref())?;
    let parsed = map_report(lines, &config.layout, &config.fields, config.policy)?;

    options.check_cancelled()?;
    if !parsed.is_clean() {
        tracing::warn!(
            source = %options.source,
            parse_errors = parsed.parse_errors.len(),
            flags = parsed.flags.len(),
            "report parsed with issues"
        );
    }
    Ok(parsed)
}

/// [`parse_report`] for a file on disk; the path becomes the observer source.
pub fn parse_report_file(
    path: impl AsRef<Path>,
    config: &PipelineConfig,
    options: &ParseOptions,
) -> ReportResult<ParsedReport> {
    let path = path.as_ref();
    let options = options.clone().with_source(path.display().to_string());
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) => {
            let result = Err(ReportError::from(e));
            notify(
                options.observer.as_ref(),
                &options.context(PipelineStage::Parse),
                options.alert_at_or_above,
                &result,
                |_: &ParsedReport| PipelineStats::default(),
            );
            return result;
        }
    };
    parse_report(&raw, config, &options)
}

/// Roll reports up under `mode` and export the result.
pub fn aggregate_and_export(
    reports: &[Report],
    mode: AggregationMode,
    destination: ExportDestination<'_>,
) -> ReportResult<ExportOutput> {
    aggregate_and_export_with(reports, mode, destination, &ParseOptions::default())
}

/// [`aggregate_and_export`] with an observer and cancellation.
///
/// Nothing is exported once cancellation is seen; store writes are all-or-nothing.
pub fn aggregate_and_export_with(
    reports: &[Report],
    mode: AggregationMode,
    destination: ExportDestination<'_>,
    options: &ParseOptions,
) -> ReportResult<ExportOutput> {
    let aggregated = options.check_cancelled().and_then(|()| aggregate(reports, mode));
    notify(
        options.observer.as_ref(),
        &options.context(PipelineStage::Aggregate),
        options.alert_at_or_above,
        &aggregated,
        |out| report_stats(out),
    );
    let aggregated = aggregated?;

    let exported = options.check_cancelled().and_then(|()| export(&aggregated, destination));
    notify(
        options.observer.as_ref(),
        &options.context(PipelineStage::Export),
        options.alert_at_or_above,
        &exported,
        |_| report_stats(&aggregated),
    );
    exported
}

fn export(reports: &[Report], destination: ExportDestination<'_>) -> ReportResult<ExportOutput> {
    match destination {
        ExportDestination::Workbook => reports_to_workbook(reports).map(ExportOutput::Workbook),
        ExportDestination::Store(store) => store.upsert_all(reports).map(ExportOutput::Stored),
    }
}

fn report_stats(reports: &[Report]) -> PipelineStats {
    PipelineStats {
        reports: reports.len(),
        items: reports.iter().map(|r| r.items.len()).sum(),
        ..PipelineStats::default()
    }
}

/// Merge `report` into the copy already persisted under its key (or store it as-is).
pub fn merge_into_store(store: &ReportStore, report: &Report) -> ReportResult<StoredReport> {
    store.merge_upsert(report)
}

/// Aggregate `reports` into a previously exported workbook and return the new workbook.
///
/// The prior workbook is re-validated against `config`; reports in it that share an identity with
/// an incoming report are merged, the rest are carried over unchanged.
#[cfg(feature = "excel")]
pub fn merge_into_workbook(
    prior: &[u8],
    reports: &[Report],
    config: &PipelineConfig,
) -> ReportResult<Vec<u8>> {
    let mut all: Vec<Report> = crate::ingestion::excel::read_report_workbook(prior, config)?
        .into_iter()
        .map(|parsed| parsed.report)
        .collect();
    all.extend_from_slice(reports);
    let merged = aggregate(&all, AggregationMode::Aggregate)?;
    reports_to_workbook(&merged)
}
