//! `settlement-pipeline` turns card-network settlement report files (VSS-110 layout) into typed
//! reports, filters and rolls them up with exact decimal arithmetic, and exports the result as an
//! `.xlsx` workbook or rows in a SQLite store.
//!
//! The boundary operations live in [`pipeline`]:
//!
//! - [`pipeline::parse_report`]: raw bytes → [`ingestion::ParsedReport`]
//! - [`pipeline::apply_filters`]: ordered column/operator/value predicates over a
//!   [`types::RecordSet`]
//! - [`pipeline::aggregate_and_export`]: rollup by report identity, then workbook bytes or a
//!   store write
//!
//! ## What a report looks like
//!
//! A parsed [`report::Report`] has one [`report::ReportHeader`] (ReportID, ReportingFor,
//! ProcessingDate, ...) and ordered [`report::LineItem`]s categorized by MajorType/MinorType with
//! a signed [`rust_decimal::Decimal`] amount. The text layout and the accepted field values come
//! from a [`config::PipelineConfig`]; the default is the built-in VSS-110 configuration.
//!
//! ## Quick example
//!
//! ```rust
//! use settlement_pipeline::config::PipelineConfig;
//! use settlement_pipeline::pipeline::{apply_filters, parse_report, ParseOptions};
//! use settlement_pipeline::processing::FilterPredicate;
//!
//! # fn main() -> Result<(), settlement_pipeline::ReportError> {
//! let raw = b"\
//! REPORT ID:  VSS-110                      PROC DATE:   14JUL25
//! REPORTING FOR:  1000313555 BA INT        REPORT DATE: 14JUL25
//! ROLLUP TO:  1000313555 BA INT
//! FUNDS XFER ENTITY:  1000313555 BA INT
//! TRANSACTION TYPE:  International Settlement Service
//! SETTLEMENT CURRENCY:  USD
//! INTERCHANGE VALUE
//!   ACQUIRER                  12           120.50           0.00         120.50 CR
//! ";
//! let parsed = parse_report(raw, &PipelineConfig::default(), &ParseOptions::default())?;
//! let rows = parsed.report.to_record_set();
//!
//! let preds = [FilterPredicate::parse("MajorType", "=", "Interchange")?];
//! assert_eq!(apply_filters(&rows, &preds).row_count(), 1);
//!
//! let preds = [FilterPredicate::parse("Amount", ">", "200")?];
//! assert_eq!(apply_filters(&rows, &preds).row_count(), 0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: report layout, field enumerations, validation policy
//! - [`ingestion`]: line parser, schema mapper, CSV / workbook readers, observers
//! - [`processing`]: filter evaluator and aggregator
//! - [`export`]: workbook writer and SQLite store
//! - [`execution`]: parallel parsing / filtering with throttling and cancellation
//! - [`types`] and [`report`]: record sets and the canonical report model
//! - [`error`]: error types shared across the crate

pub mod config;
pub mod error;
pub mod execution;
pub mod export;
pub mod ingestion;
pub mod pipeline;
pub mod processing;
pub mod report;
pub mod types;

pub use error::{ParseError, ReportError, ReportResult, ValidationError};
pub use execution::CancellationToken;
