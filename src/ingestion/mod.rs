//! Input side of the pipeline.
//!
//! Report text goes through two stages:
//!
//! - [`lines`]: tokenize raw text into typed lines using a [`crate::config::ReportLayout`]
//! - [`mapper`]: turn typed lines into a validated [`crate::report::Report`]
//!
//! Already-tabular input (CSV, spreadsheets, previously exported report workbooks) is read by
//! [`csv`], [`excel`] (feature `excel`) and the path-based [`ingest_table_from_path`].
//! Outcomes can be reported to a [`PipelineObserver`].

pub mod csv;
#[cfg(feature = "excel")]
pub mod excel;
pub mod lines;
pub mod mapper;
pub mod observability;
pub mod unified;

pub use lines::{ItemLine, LineParse, TypedLine, parse_lines};
pub use mapper::{ParsedReport, map_report, validate_report};
pub use observability::{
    CompositeObserver, PipelineContext, PipelineObserver, PipelineSeverity, PipelineStage,
    PipelineStats, TracingObserver,
};
pub use unified::{TabularFormat, TabularOptions, ingest_table_from_path};
