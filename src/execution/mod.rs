//! Execution engine for running the pipeline with bounded parallelism.
//!
//! This module sits "above" [`crate::pipeline`] and [`crate::processing`] and provides:
//!
//! - Parallel parsing of unrelated report files (one task per file)
//! - Chunked parallel filtering of large record sets, preserving row order
//! - A throttle on in-flight tasks on top of the thread count
//! - Cooperative cancellation via [`CancellationToken`]

mod cancel;
mod semaphore;

use std::ops::Range;
use std::time::{Duration, Instant};

use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::config::PipelineConfig;
use crate::error::{ReportError, ReportResult};
use crate::ingestion::ParsedReport;
use crate::pipeline::{ParseOptions, parse_report};
use crate::processing::{CompiledFilter, FilterPredicate};
use crate::types::{RecordSet, Value};

pub use cancel::CancellationToken;

use semaphore::Semaphore;

/// Configuration for the [`ExecutionEngine`].
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Number of worker threads used by the engine.
    ///
    /// If `None`, uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Number of rows per filter chunk.
    pub chunk_size: usize,
    /// Upper bound on concurrently executing tasks (files or chunks).
    pub max_in_flight: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        let n = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            num_threads: Some(n),
            chunk_size: 4_096,
            max_in_flight: n.max(1),
        }
    }
}

/// One report file to parse.
#[derive(Debug, Clone, Copy)]
pub struct ReportSource<'a> {
    /// Label reported to observers (file name, upload id, ...).
    pub name: &'a str,
    pub bytes: &'a [u8],
}

pub struct ExecutionEngine {
    pool: ThreadPool,
    opts: ExecutionOptions,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("threads", &self.pool.current_num_threads())
            .field("opts", &self.opts)
            .finish()
    }
}

impl ExecutionEngine {
    /// Create a new engine with the given options.
    ///
    /// Fails with [`ReportError::InvalidConfig`] if `chunk_size == 0`, `max_in_flight == 0`, or
    /// `num_threads == Some(0)`.
    pub fn new(opts: ExecutionOptions) -> ReportResult<Self> {
        let invalid = |message: &str| ReportError::InvalidConfig {
            message: message.to_string(),
        };
        if opts.chunk_size == 0 {
            return Err(invalid("chunk_size must be > 0"));
        }
        if opts.max_in_flight == 0 {
            return Err(invalid("max_in_flight must be > 0"));
        }
        if opts.num_threads == Some(0) {
            return Err(invalid("num_threads must be > 0 when set"));
        }

        let n_threads = opts
            .num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1));

        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|i| format!("settlement-worker-{i}"))
            .build()
            .map_err(|e| ReportError::InvalidConfig {
                message: format!("failed to build worker pool: {e}"),
            })?;

        Ok(Self { pool, opts })
    }

    /// Parse unrelated report files in parallel.
    ///
    /// Results come back in input order; one file failing does not affect the others. Every
    /// task shares `options.cancel`, so cancelling stops the files still being parsed.
    pub fn parse_many(
        &self,
        sources: &[ReportSource<'_>],
        config: &PipelineConfig,
        options: &ParseOptions,
    ) -> Vec<ReportResult<ParsedReport>> {
        let start = Instant::now();
        let sem = Semaphore::new(self.opts.max_in_flight);

        let out: Vec<_> = self.pool.install(|| {
            sources
                .par_iter()
                .map(|source| {
                    let (_permit, waited) = sem.acquire();
                    log_wait(waited);
                    let options = options.clone().with_source(source.name);
                    parse_report(source.bytes, config, &options)
                })
                .collect()
        });

        tracing::debug!(
            files = sources.len(),
            failed = out.iter().filter(|r| r.is_err()).count(),
            elapsed = ?start.elapsed(),
            "parsed report batch"
        );
        out
    }

    /// Filter a record set in ordered chunks; same result as [`crate::processing::apply_filters`].
    pub fn filter_parallel(
        &self,
        record_set: &RecordSet,
        predicates: &[FilterPredicate],
    ) -> RecordSet {
        let compiled = CompiledFilter::new(&record_set.schema, predicates);
        let sem = Semaphore::new(self.opts.max_in_flight);
        let ranges = chunk_ranges(record_set.row_count(), self.opts.chunk_size);

        let per_chunk: Vec<Vec<Vec<Value>>> = self.pool.install(|| {
            ranges
                .into_par_iter()
                .map(|range| {
                    let (_permit, waited) = sem.acquire();
                    log_wait(waited);
                    record_set.rows[range]
                        .iter()
                        .filter(|row| compiled.matches(row))
                        .cloned()
                        .collect()
                })
                .collect()
        });

        let rows = per_chunk.into_iter().flatten().collect();
        RecordSet::new(record_set.schema.clone(), rows)
    }
}

fn log_wait(waited: Duration) {
    if waited > Duration::ZERO {
        tracing::trace!(?waited, "throttled");
    }
}

fn chunk_ranges(row_count: usize, chunk_size: usize) -> Vec<Range<usize>> {
    if row_count == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(row_count.div_ceil(chunk_size));
    let mut start = 0usize;
    while start < row_count {
        let end = (start + chunk_size).min(row_count);
        out.push(start..end);
        start = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::{FilterOp, apply_filters};
    use crate::types::{DataType, Field, Schema};

    fn record_set_of_n(n: usize) -> RecordSet {
        let schema = Schema::new(vec![Field::new("id", DataType::Int64)]);
        let rows = (0..n as i64).map(|i| vec![Value::Int64(i)]).collect();
        RecordSet::new(schema, rows)
    }

    fn engine(chunk_size: usize, max_in_flight: usize) -> ExecutionEngine {
        ExecutionEngine::new(ExecutionOptions {
            num_threads: Some(4),
            chunk_size,
            max_in_flight,
        })
        .unwrap()
    }

    #[test]
    fn chunk_ranges_cover_all_rows() {
        assert_eq!(chunk_ranges(0, 3), Vec::<Range<usize>>::new());
        assert_eq!(chunk_ranges(7, 3), vec![0..3, 3..6, 6..7]);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let bad = ExecutionOptions {
            chunk_size: 0,
            ..ExecutionOptions::default()
        };
        assert!(matches!(ExecutionEngine::new(bad), Err(ReportError::InvalidConfig { .. })));
    }

    #[test]
    fn parallel_filter_matches_sequential_and_keeps_order() {
        let rs = record_set_of_n(1_000);
        let preds = [FilterPredicate::new("id", FilterOp::Ge, "250")];
        let expected = apply_filters(&rs, &preds);
        for (chunk, in_flight) in [(1, 1), (7, 2), (64, 4), (5_000, 4)] {
            assert_eq!(engine(chunk, in_flight).filter_parallel(&rs, &preds), expected);
        }
    }

    #[test]
    fn parse_many_returns_results_in_input_order() {
        let sources = [
            ReportSource {
                name: "empty",
                bytes: b"",
            },
            ReportSource {
                name: "also-empty",
                bytes: b"\n\n",
            },
        ];
        let out =
            engine(1, 2).parse_many(&sources, &PipelineConfig::default(), &ParseOptions::default());
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| matches!(r, Err(ReportError::SchemaMismatch { .. }))));
    }

    #[test]
    fn cancelled_batch_parses_nothing() {
        let options = ParseOptions::default();
        let token = CancellationToken::new();
        token.cancel();
        let options = options.with_cancel(token);
        let sources = [ReportSource {
            name: "a",
            bytes: b"REPORT ID: VSS-110\n",
        }];
        let out = engine(1, 1).parse_many(&sources, &PipelineConfig::default(), &options);
        assert!(matches!(out[0], Err(ReportError::Cancelled)));
    }
}
