use rust_decimal_macros::dec;

use settlement_pipeline::config::PipelineConfig;
use settlement_pipeline::execution::{ExecutionEngine, ExecutionOptions};
use settlement_pipeline::ingestion::{TabularFormat, TabularOptions, ingest_table_from_path};
use settlement_pipeline::pipeline::{ParseOptions, apply_filters, parse_report, try_apply_filters};
use settlement_pipeline::processing::{FilterOp, FilterPredicate, parse_predicates_json};
use settlement_pipeline::types::{DataType, RecordSet, Value};
use settlement_pipeline::ReportError;

fn sample_rows() -> RecordSet {
    let raw = std::fs::read("tests/fixtures/vss110_sample.txt").unwrap();
    parse_report(&raw, &PipelineConfig::default(), &ParseOptions::default())
        .unwrap()
        .report
        .to_record_set()
}

fn pred(column: &str, op: &str, value: &str) -> FilterPredicate {
    FilterPredicate::parse(column, op, value).unwrap()
}

#[test]
fn major_type_equality_keeps_interchange_lines() {
    let rows = sample_rows();
    let out = apply_filters(&rows, &[pred("MajorType", "=", "Interchange")]);
    // Acquirer, Issuer and the section subtotal.
    assert_eq!(out.row_count(), 3);
    for row in 0..out.row_count() {
        assert_eq!(out.value(row, "MajorType"), Some(&Value::Utf8("Interchange".to_string())));
    }
}

#[test]
fn no_line_exceeds_two_hundred() {
    let out = apply_filters(&sample_rows(), &[pred("Amount", ">", "200")]);
    assert_eq!(out.row_count(), 0);
    assert_eq!(out.schema, sample_rows().schema);
}

#[test]
fn predicates_are_conjunctive_and_idempotent() {
    let rows = sample_rows();
    let preds = [pred("LineKind", "=", "detail"), pred("Amount", "<", "0")];
    let once = apply_filters(&rows, &preds);
    assert_eq!(once.row_count(), 2);
    assert_eq!(apply_filters(&once, &preds), once);
}

#[test]
fn contains_and_not_contains_partition_the_rows() {
    let rows = sample_rows();
    let yes = apply_filters(&rows, &[pred("MinorType", "contains", "ACQ")]);
    let no = apply_filters(&rows, &[pred("MinorType", "not_contains", "ACQ")]);
    assert_eq!(yes.row_count(), 2);
    assert_eq!(yes.row_count() + no.row_count(), rows.row_count());
}

#[test]
fn mistyped_filter_column_is_reported_by_the_checked_entry_point() {
    let rows = sample_rows();
    let preds = [pred("MinorTyp", "!=", "Issuer")];
    // The lenient path keeps every row, since a missing cell never equals "Issuer".
    assert_eq!(apply_filters(&rows, &preds).row_count(), rows.row_count());

    let err = try_apply_filters(&rows, &preds).unwrap_err();
    assert!(matches!(err, ReportError::SchemaMismatch { field, .. } if field == "MinorTyp"));
}

#[test]
fn non_numeric_value_for_ordering_matches_nothing() {
    let out = apply_filters(&sample_rows(), &[pred("Amount", ">", "lots")]);
    assert_eq!(out.row_count(), 0);
}

#[test]
fn dates_compare_as_dates() {
    let rows = sample_rows();
    let on_or_after = apply_filters(&rows, &[pred("ProcessingDate", ">=", "2025-07-14")]);
    assert_eq!(on_or_after.row_count(), rows.row_count());
    assert_eq!(apply_filters(&rows, &[pred("ProcessingDate", "<", "07/14/2025")]).row_count(), 0);
}

#[test]
fn unknown_operator_is_rejected() {
    let err = FilterPredicate::parse("Amount", "~=", "1").unwrap_err();
    assert!(matches!(err, ReportError::UnsupportedOperator { ref op } if op == "~="));
}

#[test]
fn predicates_load_from_form_json() {
    let json = std::fs::read_to_string("tests/fixtures/filters.json").unwrap();
    let preds = parse_predicates_json(&json).unwrap();
    assert_eq!(
        preds,
        vec![
            FilterPredicate::new("MajorType", FilterOp::Eq, "Interchange"),
            FilterPredicate::new("Amount", FilterOp::Gt, "0"),
        ]
    );
    let out = apply_filters(&sample_rows(), &preds);
    assert_eq!(out.row_count(), 1);
    assert_eq!(out.value(0, "Amount"), Some(&Value::Decimal(dec!(120.50))));
}

#[test]
fn csv_input_is_typed_and_filterable() {
    let csv = "tests/fixtures/settlement_lines.csv";
    let rows = ingest_table_from_path(csv, None, &TabularOptions::default()).unwrap();
    let types: Vec<_> = rows.schema.fields.iter().map(|f| f.data_type).collect();
    assert_eq!(
        types,
        vec![
            DataType::Utf8,
            DataType::Utf8,
            DataType::Utf8,
            DataType::Int64,
            DataType::Decimal,
            DataType::Date,
        ]
    );

    let out = apply_filters(&rows, &[pred("ProcessingDate", "=", "2025-07-15")]);
    assert_eq!(out.row_count(), 1);
    assert_eq!(out.value(0, "MinorType"), Some(&Value::Utf8("Other".to_string())));
    assert_eq!(rows.sum_decimal("Amount"), Some(dec!(-961.55)));
}

#[test]
fn forced_format_overrides_extension() {
    let opts = TabularOptions {
        format: Some(TabularFormat::Csv),
        ..TabularOptions::default()
    };
    // `.txt` is not a known extension; with the format forced, the CSV reader gets the file.
    let result = ingest_table_from_path("tests/fixtures/vss110_sample.txt", None, &opts);
    assert!(!matches!(result, Err(ReportError::InvalidConfig { .. })));
}

#[test]
fn parallel_filter_agrees_with_sequential() {
    let rows = sample_rows();
    let preds = [pred("Amount", "<", "100")];
    let engine = ExecutionEngine::new(ExecutionOptions {
        num_threads: Some(2),
        chunk_size: 2,
        max_in_flight: 2,
    })
    .unwrap();
    assert_eq!(engine.filter_parallel(&rows, &preds), apply_filters(&rows, &preds));
}
