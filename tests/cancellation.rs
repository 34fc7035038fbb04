use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use settlement_pipeline::config::PipelineConfig;
use settlement_pipeline::execution::{ExecutionEngine, ExecutionOptions, ReportSource};
use settlement_pipeline::export::ReportStore;
use settlement_pipeline::ingestion::{
    PipelineContext, PipelineObserver, PipelineSeverity, PipelineStats,
};
use settlement_pipeline::pipeline::{
    ExportDestination, ParseOptions, aggregate_and_export_with, parse_report,
};
use settlement_pipeline::processing::AggregationMode;
use settlement_pipeline::{CancellationToken, ReportError};

fn sample_bytes() -> Vec<u8> {
    std::fs::read("tests/fixtures/vss110_sample.txt").unwrap()
}

fn engine() -> ExecutionEngine {
    ExecutionEngine::new(ExecutionOptions {
        num_threads: Some(2),
        chunk_size: 16,
        max_in_flight: 2,
    })
    .unwrap()
}

#[test]
fn cancelled_parse_returns_no_partial_report() {
    let token = CancellationToken::new();
    token.cancel();
    let opts = ParseOptions::default().with_cancel(token);

    let err = parse_report(&sample_bytes(), &PipelineConfig::default(), &opts).unwrap_err();
    assert!(matches!(err, ReportError::Cancelled));
}

#[test]
fn cancellation_is_reported_as_info_and_never_alerts() {
    #[derive(Default)]
    struct Counter {
        info: AtomicUsize,
        alerts: AtomicUsize,
    }
    impl PipelineObserver for Counter {
        fn on_success(&self, _ctx: &PipelineContext, _stats: PipelineStats) {}
        fn on_failure(&self, _ctx: &PipelineContext, severity: PipelineSeverity, _e: &ReportError) {
            if severity == PipelineSeverity::Info {
                self.info.fetch_add(1, Ordering::SeqCst);
            }
        }
        fn on_alert(&self, _ctx: &PipelineContext, _severity: PipelineSeverity, _e: &ReportError) {
            self.alerts.fetch_add(1, Ordering::SeqCst);
        }
    }

    let counter = Arc::new(Counter::default());
    let token = CancellationToken::new();
    token.cancel();
    let opts = ParseOptions::default()
        .with_observer(counter.clone(), PipelineSeverity::Warning)
        .with_cancel(token);

    let _ = parse_report(&sample_bytes(), &PipelineConfig::default(), &opts);
    assert_eq!(counter.info.load(Ordering::SeqCst), 1);
    assert_eq!(counter.alerts.load(Ordering::SeqCst), 0);
}

#[test]
fn batch_parse_keeps_order_and_isolates_failures() {
    let good = sample_bytes();
    let bad = std::fs::read("tests/fixtures/vss110_bad_header.txt").unwrap();
    let sources = [
        ReportSource { name: "a.txt", bytes: &good },
        ReportSource { name: "b.txt", bytes: &bad },
        ReportSource { name: "c.txt", bytes: &good },
    ];

    let out = engine().parse_many(&sources, &PipelineConfig::default(), &ParseOptions::default());
    assert_eq!(out.len(), 3);
    assert!(out[0].is_ok());
    assert!(matches!(out[1], Err(ReportError::SchemaMismatch { .. })));
    assert_eq!(out[0].as_ref().unwrap(), out[2].as_ref().unwrap());
}

#[test]
fn cancelled_batch_produces_only_cancellations() {
    let good = sample_bytes();
    let sources: Vec<_> = (0..8)
        .map(|_| ReportSource { name: "r.txt", bytes: &good })
        .collect();
    let token = CancellationToken::new();
    token.cancel();

    let out = engine().parse_many(
        &sources,
        &PipelineConfig::default(),
        &ParseOptions::default().with_cancel(token),
    );
    assert!(out.iter().all(|r| matches!(r, Err(ReportError::Cancelled))));
}

#[test]
fn cancelled_export_leaves_the_store_untouched() {
    let report = parse_report(&sample_bytes(), &PipelineConfig::default(), &ParseOptions::default())
        .unwrap()
        .report;
    let store = ReportStore::in_memory().unwrap();
    let token = CancellationToken::new();
    let opts = ParseOptions::default().with_cancel(token.clone());
    token.cancel();

    let err = aggregate_and_export_with(
        &[report],
        AggregationMode::New,
        ExportDestination::Store(&store),
        &opts,
    )
    .unwrap_err();
    assert!(matches!(err, ReportError::Cancelled));
    assert!(store.list().unwrap().is_empty());
}
