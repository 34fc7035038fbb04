//! In-memory transformations over parsed reports and record sets.
//!
//! Nothing here does I/O, and nothing mutates its input:
//!
//! - [`apply_filters()`]: column/operator/value predicates over a [`crate::types::RecordSet`];
//!   [`try_apply_filters()`] also rejects unknown columns
//! - [`aggregate()`]: rollup of reports sharing an identity, with exact decimal sums
//!
//! ## Example: keep Interchange lines above 100
//!
//! ```rust
//! use settlement_pipeline::processing::{apply_filters, FilterOp, FilterPredicate};
//! use settlement_pipeline::types::{DataType, Field, RecordSet, Schema, Value};
//! use rust_decimal::Decimal;
//!
//! let schema = Schema::new(vec![
//!     Field::new("MajorType", DataType::Utf8),
//!     Field::new("Amount", DataType::Decimal),
//! ]);
//! let rs = RecordSet::new(
//!     schema,
//!     vec![
//!         vec![Value::Utf8("Interchange".into()), Value::Decimal(Decimal::new(12050, 2))],
//!         vec![Value::Utf8("Interchange".into()), Value::Decimal(Decimal::new(5, 0))],
//!         vec![Value::Utf8("Visa Charges".into()), Value::Decimal(Decimal::new(300, 0))],
//!     ],
//! );
//!
//! let out = apply_filters(
//!     &rs,
//!     &[
//!         FilterPredicate::new("MajorType", FilterOp::Eq, "Interchange"),
//!         FilterPredicate::new("Amount", FilterOp::Gt, "100"),
//!     ],
//! );
//! assert_eq!(out.row_count(), 1);
//! ```

pub mod aggregate;
pub mod filter;

pub use aggregate::{AggregationMode, aggregate, merge_reports};
pub use filter::{
    CompiledFilter, FilterOp, FilterPredicate, apply_filters, parse_predicates_json,
    try_apply_filters,
};
