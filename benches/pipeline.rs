use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use settlement_pipeline::config::PipelineConfig;
use settlement_pipeline::execution::{ExecutionEngine, ExecutionOptions};
use settlement_pipeline::export::reports_to_workbook;
use settlement_pipeline::pipeline::{ParseOptions, apply_filters, parse_report};
use settlement_pipeline::processing::{AggregationMode, FilterPredicate, aggregate};
use settlement_pipeline::report::Report;

const HEADER: &str = "\
REPORT ID:  VSS-110                                              PROC DATE:   14JUL25
REPORTING FOR:  1000313555 BA INT                                REPORT DATE:  14JUL25
ROLLUP TO:  1000313555 BA INT
FUNDS XFER ENTITY:  1000313555 BA INT
SETTLEMENT CURRENCY:  USD
TRANSACTION TYPE:  International Settlement Service
";

/// A report with `sections` repeated blocks of detail lines.
fn synthetic_report(sections: usize) -> String {
    let mut text = HEADER.to_string();
    for i in 0..sections {
        let cents = i % 100;
        text.push_str("INTERCHANGE VALUE\n");
        let amount = format!("{i}.{cents:02}");
        text.push_str(&format!("  ACQUIRER    {i:>6}   {amount}        0.00   {amount} CR\n"));
        text.push_str(&format!("  ISSUER      {i:>6}     0.00   {amount}   {amount} DB\n"));
        text.push_str("VISA CHARGES\n");
        text.push_str(&format!("  OTHER       {i:>6}     0.00       1.25       1.25 DB\n"));
    }
    text
}

fn parse(text: &str) -> Report {
    parse_report(text.as_bytes(), &PipelineConfig::default(), &ParseOptions::default())
        .unwrap()
        .report
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_report");
    let config = PipelineConfig::default();
    for sections in [10usize, 1_000] {
        let text = synthetic_report(sections);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(sections), &text, |b, text| {
            b.iter(|| {
                parse_report(black_box(text.as_bytes()), &config, &ParseOptions::default()).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_filter(c: &mut Criterion) {
    let rows = parse(&synthetic_report(5_000)).to_record_set();
    let preds = [
        FilterPredicate::parse("MajorType", "=", "Interchange").unwrap(),
        FilterPredicate::parse("Amount", ">", "100").unwrap(),
    ];
    let engine = ExecutionEngine::new(ExecutionOptions::default()).unwrap();

    let mut group = c.benchmark_group("filter");
    group.throughput(Throughput::Elements(rows.row_count() as u64));
    group.bench_function("sequential", |b| b.iter(|| apply_filters(black_box(&rows), &preds)));
    group.bench_function("parallel", |b| {
        b.iter(|| engine.filter_parallel(black_box(&rows), &preds))
    });
    group.finish();
}

fn bench_aggregate_and_write(c: &mut Criterion) {
    let report = parse(&synthetic_report(500));
    let reports = vec![report; 20];

    c.bench_function("aggregate/20x500", |b| {
        b.iter(|| aggregate(black_box(&reports), AggregationMode::Aggregate).unwrap())
    });

    let merged = aggregate(&reports, AggregationMode::Aggregate).unwrap();
    c.bench_function("workbook/500", |b| {
        b.iter(|| reports_to_workbook(black_box(&merged)).unwrap())
    });
}

criterion_group!(benches, bench_parse, bench_filter, bench_aggregate_and_write);
criterion_main!(benches);
