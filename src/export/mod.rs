//! Output side of the pipeline: `.xlsx` bytes or rows in a SQLite store.
//!
//! - [`workbook`]: fixed-layout `Header` / `Items` / `Totals` workbook, or a single `Records`
//!   sheet for an arbitrary (e.g. filtered) record set
//! - [`store`]: idempotent upserts keyed by (ReportID, ProcessingDate)

pub mod store;
pub mod workbook;

pub use store::{ReportStore, StorageWriteResult, StoreOptions, StoredReport, WriteOutcome};
pub use workbook::{record_set_to_workbook, reports_to_workbook};
