//! SQLite row store for parsed and aggregated reports.
//!
//! Reports are keyed by (ReportID, ProcessingDate). Writes are upserts: storing the same content
//! twice leaves one row and reports [`WriteOutcome::Unchanged`]. Only this module talks to the
//! database.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::NaiveDate;
use rusqlite::{
    Connection, ErrorCode, OpenFlags, OptionalExtension, Transaction, TransactionBehavior, params,
};

use crate::error::{ReportError, ReportResult};
use crate::processing::merge_reports;
use crate::report::{AggregationKey, LineItem, Report, ReportHeader};

/// Options for opening a file-backed [`ReportStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How long SQLite waits on a lock held by another connection before reporting busy.
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// What a single write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Summary of a batch write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageWriteResult {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Keys written, in input order.
    pub keys: Vec<AggregationKey>,
}

impl StorageWriteResult {
    fn record(&mut self, key: AggregationKey, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Inserted => self.inserted += 1,
            WriteOutcome::Updated => self.updated += 1,
            WriteOutcome::Unchanged => self.unchanged += 1,
        }
        self.keys.push(key);
    }
}

/// A report as persisted, with its revision counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReport {
    pub report: Report,
    /// Starts at 1 and increases on every content change.
    pub revision: i64,
}

pub struct ReportStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for ReportStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportStore").finish_non_exhaustive()
    }
}

impl ReportStore {
    /// Open (or create) a database file and apply migrations.
    pub fn open(path: impl AsRef<Path>, opts: &StoreOptions) -> ReportResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?;
        conn.busy_timeout(opts.busy_timeout)?;
        // WAL only matters for real files; ignore failures on exotic filesystems.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Self::init(conn)
    }

    /// Open an in-memory database (used in tests and one-shot exports).
    pub fn in_memory() -> ReportResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> ReportResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(include_str!("../../migrations/001_settlement_reports.sql"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace one report.
    pub fn upsert(&self, report: &Report) -> ReportResult<WriteOutcome> {
        let header = &report.header;
        self.with_retry(&header.report_id, header.processing_date, |tx| write_report(tx, report))
    }

    /// Insert or replace several reports in one transaction; all or nothing.
    pub fn upsert_all(&self, reports: &[Report]) -> ReportResult<StorageWriteResult> {
        let Some(first) = reports.first() else {
            return Ok(StorageWriteResult::default());
        };
        let (report_id, date) = (first.header.report_id.clone(), first.header.processing_date);
        self.with_retry(&report_id, date, |tx| {
            let mut result = StorageWriteResult::default();
            for report in reports {
                let outcome = write_report(tx, report)?;
                result.record(report.key(), outcome);
            }
            Ok(result)
        })
    }

    /// Merge `report` into whatever is stored under its key, then write the result.
    ///
    /// Read, merge and write happen inside one `IMMEDIATE` transaction, so two concurrent merges
    /// of the same key cannot both start from the same prior state.
    pub fn merge_upsert(&self, report: &Report) -> ReportResult<StoredReport> {
        let header = &report.header;
        self.with_retry(&header.report_id, header.processing_date, |tx| {
            let merged = match read_report(tx, &header.report_id, header.processing_date)? {
                Some(prior) => {
                    check_identity(&prior.report.header, header, false)?;
                    merge_reports(&prior.report, report)?
                }
                None => report.clone(),
            };
            write_report(tx, &merged)?;
            let revision = read_revision(tx, &header.report_id, header.processing_date)?;
            Ok(StoredReport {
                report: merged,
                revision,
            })
        })
    }

    /// Load the report stored under (`report_id`, `processing_date`).
    pub fn load(
        &self,
        report_id: &str,
        processing_date: NaiveDate,
    ) -> ReportResult<Option<StoredReport>> {
        let conn = self.lock();
        read_report(&conn, report_id, processing_date)
    }

    /// Every stored report, ordered by processing date then report id.
    pub fn list(&self) -> ReportResult<Vec<StoredReport>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT header_json, items_json, revision FROM settlement_reports
             ORDER BY processing_date, report_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (header_json, items_json, revision) = row?;
            out.push(decode(&header_json, &items_json, revision)?);
        }
        Ok(out)
    }

    /// Number of rows in the flat per-line table for one report.
    pub fn line_count(&self, report_id: &str, processing_date: NaiveDate) -> ReportResult<usize> {
        let conn = self.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM settlement_report_lines \
             WHERE report_id = ?1 AND processing_date = ?2",
            params![report_id, processing_date.to_string()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// Run `f` in an `IMMEDIATE` transaction, retrying once if the database is busy.
    fn with_retry<T>(
        &self,
        report_id: &str,
        processing_date: NaiveDate,
        f: impl Fn(&Transaction<'_>) -> ReportResult<T>,
    ) -> ReportResult<T> {
        let mut conn = self.lock();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = run_immediate(&mut conn, &f);
            match result {
                Err(e) if is_busy(&e) && attempt == 1 => {
                    tracing::warn!(
                        %report_id,
                        %processing_date,
                        "database busy, retrying write once"
                    );
                }
                Err(e) if is_busy(&e) => {
                    return Err(ReportError::StorageConflict {
                        report_id: report_id.to_string(),
                        processing_date,
                        message: format!("database stayed busy: {e}"),
                    });
                }
                other => return other,
            }
        }
    }
}

fn run_immediate<T>(
    conn: &mut Connection,
    f: &impl Fn(&Transaction<'_>) -> ReportResult<T>,
) -> ReportResult<T> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let out = f(&tx)?;
    tx.commit()?;
    Ok(out)
}

fn is_busy(e: &ReportError) -> bool {
    matches!(
        e,
        ReportError::Sqlite(rusqlite::Error::SqliteFailure(f, _))
            if matches!(f.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// A stored row must describe the same reporting entity (and, for replacement, the same currency).
fn check_identity(
    stored: &ReportHeader,
    incoming: &ReportHeader,
    same_currency: bool,
) -> ReportResult<()> {
    let conflict = |message: String| ReportError::StorageConflict {
        report_id: incoming.report_id.clone(),
        processing_date: incoming.processing_date,
        message,
    };
    if stored.reporting_for != incoming.reporting_for {
        return Err(conflict(format!(
            "stored report belongs to ReportingFor '{}', not '{}'",
            stored.reporting_for, incoming.reporting_for
        )));
    }
    if same_currency && stored.settlement_currency != incoming.settlement_currency {
        return Err(conflict(format!(
            "stored report is settled in {}, not {}",
            stored.settlement_currency, incoming.settlement_currency
        )));
    }
    Ok(())
}

fn write_report(conn: &Connection, report: &Report) -> ReportResult<WriteOutcome> {
    let h = &report.header;
    let date = h.processing_date.to_string();
    let header_json = serde_json::to_string(h)?;
    let items_json = serde_json::to_string(&report.items)?;

    let existing = conn
        .query_row(
            "SELECT header_json, items_json FROM settlement_reports
             WHERE report_id = ?1 AND processing_date = ?2",
            params![h.report_id, date],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    let outcome = match &existing {
        None => WriteOutcome::Inserted,
        Some((stored_header, stored_items)) => {
            let stored: ReportHeader = serde_json::from_str(stored_header)?;
            check_identity(&stored, h, true)?;
            if *stored_header == header_json && *stored_items == items_json {
                return Ok(WriteOutcome::Unchanged);
            }
            WriteOutcome::Updated
        }
    };

    conn.execute(
        "INSERT INTO settlement_reports (
             report_id, processing_date, reporting_for, settlement_currency, report_date,
             header_json, items_json, revision
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)
         ON CONFLICT(report_id, processing_date) DO UPDATE SET
             report_date = excluded.report_date,
             header_json = excluded.header_json,
             items_json  = excluded.items_json,
             revision    = settlement_reports.revision + 1,
             updated_at  = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        params![
            h.report_id,
            date,
            h.reporting_for,
            h.settlement_currency,
            h.report_date.to_string(),
            header_json,
            items_json,
        ],
    )?;

    conn.execute(
        "DELETE FROM settlement_report_lines WHERE report_id = ?1 AND processing_date = ?2",
        params![h.report_id, date],
    )?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO settlement_report_lines (
             report_id, processing_date, line_no, report_date, line_kind, major_type, minor_type,
             count, credit_amount, debit_amount, total_amount, crdb_label, currency,
             credit_account, debit_account
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
    )?;
    for (idx, item) in report.items.iter().enumerate() {
        let line_no = i64::try_from(idx + 1).unwrap_or(i64::MAX);
        insert_line(&mut stmt, h, &date, line_no, item)?;
    }

    tracing::debug!(report = %report.key(), ?outcome, items = report.items.len(), "stored report");
    Ok(outcome)
}

fn insert_line(
    stmt: &mut rusqlite::CachedStatement<'_>,
    h: &ReportHeader,
    date: &str,
    line_no: i64,
    item: &LineItem,
) -> ReportResult<()> {
    stmt.execute(params![
        h.report_id,
        date,
        line_no,
        h.report_date.to_string(),
        item.kind.as_str(),
        item.major_type,
        item.minor_type,
        item.count,
        item.credit_amount.to_string(),
        item.debit_amount.to_string(),
        item.amount.to_string(),
        item.crdb_label(),
        item.currency,
        item.credit_account,
        item.debit_account,
    ])?;
    Ok(())
}

fn read_report(
    conn: &Connection,
    report_id: &str,
    processing_date: NaiveDate,
) -> ReportResult<Option<StoredReport>> {
    let row = conn
        .query_row(
            "SELECT header_json, items_json, revision FROM settlement_reports
             WHERE report_id = ?1 AND processing_date = ?2",
            params![report_id, processing_date.to_string()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?)),
        )
        .optional()?;
    row.map(|(header_json, items_json, revision)| decode(&header_json, &items_json, revision))
        .transpose()
}

fn read_revision(
    conn: &Connection,
    report_id: &str,
    processing_date: NaiveDate,
) -> ReportResult<i64> {
    Ok(conn.query_row(
        "SELECT revision FROM settlement_reports WHERE report_id = ?1 AND processing_date = ?2",
        params![report_id, processing_date.to_string()],
        |row| row.get(0),
    )?)
}

fn decode(header_json: &str, items_json: &str, revision: i64) -> ReportResult<StoredReport> {
    let header: ReportHeader = serde_json::from_str(header_json)?;
    let items: Vec<LineItem> = serde_json::from_str(items_json)?;
    Ok(StoredReport {
        report: Report::new(header, items),
        revision,
    })
}
