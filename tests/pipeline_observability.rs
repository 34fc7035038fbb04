use std::sync::{Arc, Mutex};

use settlement_pipeline::config::PipelineConfig;
use settlement_pipeline::export::ReportStore;
use settlement_pipeline::ingestion::{
    CompositeObserver, PipelineContext, PipelineObserver, PipelineSeverity, PipelineStage,
    PipelineStats, TabularFormat, TabularOptions, TracingObserver, ingest_table_from_path,
};
use settlement_pipeline::pipeline::{
    ExportDestination, ParseOptions, aggregate_and_export_with, parse_report, parse_report_file,
};
use settlement_pipeline::processing::AggregationMode;
use settlement_pipeline::types::{DataType, Field, Schema};
use settlement_pipeline::ReportError;

#[derive(Default)]
struct RecordingObserver {
    successes: Mutex<Vec<(PipelineStage, PipelineStats)>>,
    failures: Mutex<Vec<PipelineSeverity>>,
    alerts: Mutex<Vec<PipelineSeverity>>,
    sources: Mutex<Vec<String>>,
}

impl PipelineObserver for RecordingObserver {
    fn on_success(&self, ctx: &PipelineContext, stats: PipelineStats) {
        self.successes.lock().unwrap().push((ctx.stage, stats));
        self.sources.lock().unwrap().push(ctx.source.clone());
    }

    fn on_failure(&self, ctx: &PipelineContext, severity: PipelineSeverity, _error: &ReportError) {
        self.failures.lock().unwrap().push(severity);
        self.sources.lock().unwrap().push(ctx.source.clone());
    }

    fn on_alert(&self, _ctx: &PipelineContext, severity: PipelineSeverity, _error: &ReportError) {
        self.alerts.lock().unwrap().push(severity);
    }
}

fn options(obs: &Arc<RecordingObserver>, alert_at_or_above: PipelineSeverity) -> ParseOptions {
    ParseOptions::default().with_observer(obs.clone(), alert_at_or_above)
}

#[test]
fn observer_receives_failure_and_alert_on_critical_io_error() {
    let obs = Arc::new(RecordingObserver::default());
    let opts = options(&obs, PipelineSeverity::Critical);

    // Missing file -> Io error -> Critical
    let missing = "tests/fixtures/does_not_exist.txt";
    let _ = parse_report_file(missing, &PipelineConfig::default(), &opts).unwrap_err();

    assert_eq!(*obs.failures.lock().unwrap(), vec![PipelineSeverity::Critical]);
    assert_eq!(*obs.alerts.lock().unwrap(), vec![PipelineSeverity::Critical]);
    assert_eq!(
        *obs.sources.lock().unwrap(),
        vec!["tests/fixtures/does_not_exist.txt".to_string()]
    );
}

#[test]
fn schema_mismatch_is_an_error_without_alert() {
    let obs = Arc::new(RecordingObserver::default());
    let opts = options(&obs, PipelineSeverity::Critical);

    let raw = std::fs::read("tests/fixtures/vss110_bad_header.txt").unwrap();
    let _ = parse_report(&raw, &PipelineConfig::default(), &opts).unwrap_err();

    assert_eq!(*obs.failures.lock().unwrap(), vec![PipelineSeverity::Error]);
    assert!(obs.alerts.lock().unwrap().is_empty());
}

#[test]
fn lower_threshold_alerts_on_errors_too() {
    let obs = Arc::new(RecordingObserver::default());
    let opts = options(&obs, PipelineSeverity::Error);

    let raw = std::fs::read("tests/fixtures/vss110_unknown_entity.txt").unwrap();
    let _ = parse_report(&raw, &PipelineConfig::default(), &opts).unwrap_err();

    assert_eq!(*obs.alerts.lock().unwrap(), vec![PipelineSeverity::Error]);
}

#[test]
fn success_reports_item_and_error_counts() {
    let obs = Arc::new(RecordingObserver::default());
    let opts = options(&obs, PipelineSeverity::Critical).with_source("upload-42");

    let raw = std::fs::read("tests/fixtures/vss110_line_errors.txt").unwrap();
    parse_report(&raw, &PipelineConfig::default(), &opts).unwrap();

    let successes = obs.successes.lock().unwrap().clone();
    assert_eq!(successes.len(), 1);
    let (stage, stats) = successes[0];
    assert_eq!(stage, PipelineStage::Parse);
    assert_eq!(
        stats,
        PipelineStats {
            reports: 1,
            items: 1,
            parse_errors: 1,
            flags: 0,
        }
    );
    assert_eq!(*obs.sources.lock().unwrap(), vec!["upload-42".to_string()]);
}

#[test]
fn export_reports_aggregate_and_export_stages() {
    let obs = Arc::new(RecordingObserver::default());
    let opts = options(&obs, PipelineSeverity::Critical);
    let raw = std::fs::read("tests/fixtures/vss110_sample.txt").unwrap();
    let report = parse_report(&raw, &PipelineConfig::default(), &ParseOptions::default())
        .unwrap()
        .report;

    let store = ReportStore::in_memory().unwrap();
    aggregate_and_export_with(
        &[report.clone(), report],
        AggregationMode::Aggregate,
        ExportDestination::Store(&store),
        &opts,
    )
    .unwrap();

    let stages: Vec<_> = obs
        .successes
        .lock()
        .unwrap()
        .iter()
        .map(|(stage, stats)| (*stage, stats.reports))
        .collect();
    assert_eq!(stages, vec![(PipelineStage::Aggregate, 1), (PipelineStage::Export, 1)]);
}

#[test]
fn composite_fans_out_to_every_observer() {
    let a = Arc::new(RecordingObserver::default());
    let b = Arc::new(RecordingObserver::default());
    let composite = Arc::new(CompositeObserver::new(vec![
        a.clone() as Arc<dyn PipelineObserver>,
        b.clone() as Arc<dyn PipelineObserver>,
        Arc::new(TracingObserver) as Arc<dyn PipelineObserver>,
    ]));

    let opts = ParseOptions::default().with_observer(composite, PipelineSeverity::Critical);
    let raw = std::fs::read("tests/fixtures/vss110_sample.txt").unwrap();
    parse_report(&raw, &PipelineConfig::default(), &opts).unwrap();

    assert_eq!(a.successes.lock().unwrap().len(), 1);
    assert_eq!(b.successes.lock().unwrap().len(), 1);
}

#[test]
fn tabular_ingestion_reports_missing_columns() {
    let obs = Arc::new(RecordingObserver::default());
    let opts = TabularOptions {
        format: Some(TabularFormat::Csv),
        observer: Some(obs.clone()),
        alert_at_or_above: PipelineSeverity::Critical,
        ..TabularOptions::default()
    };
    let schema = Schema::new(vec![Field::new("definitely_missing", DataType::Utf8)]);

    let csv = "tests/fixtures/settlement_lines.csv";
    let err = ingest_table_from_path(csv, Some(&schema), &opts).unwrap_err();
    assert!(matches!(err, ReportError::SchemaMismatch { .. }));
    assert_eq!(*obs.failures.lock().unwrap(), vec![PipelineSeverity::Error]);
    assert!(obs.alerts.lock().unwrap().is_empty());
}
