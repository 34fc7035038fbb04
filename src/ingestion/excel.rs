#![cfg(feature = "excel")]

//! Workbook ingestion: arbitrary sheets into a [`RecordSet`], and exported report workbooks back
//! into [`Report`]s for the "aggregate into an existing report" flow.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Range, Reader, Sheets, open_workbook_auto, open_workbook_auto_from_rs};
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;

use crate::config::PipelineConfig;
use crate::error::{ReportError, ReportResult, ValidationError};
use crate::export::workbook::{HEADER_SHEET, ITEMS_SHEET, TOTALS_SHEET};
use crate::report::{
    AggregationKey, LineItem, LineKind, Report, ReportHeader, columns, header_schema, item_schema,
};
use crate::types::{DataType, Field, RecordSet, Schema, Value, parse_decimal, parse_text_date};

use super::csv::{infer_column_type, parse_bool, parse_typed_value};
use super::mapper::{ParsedReport, validate_report};

/// Read one sheet of a workbook file (`.xlsx`, `.xls`, `.ods`, ...) into a [`RecordSet`].
///
/// Behavior:
/// - Picks `sheet_name` if provided; otherwise uses the first sheet in the workbook
/// - Detects the first non-empty row as the header row
/// - With a schema, validates that all schema fields exist as headers; without one, keeps every
///   column and infers its type
pub fn ingest_excel_from_path(
    path: impl AsRef<Path>,
    sheet_name: Option<&str>,
    schema: Option<&Schema>,
) -> ReportResult<RecordSet> {
    let mut workbook = open_workbook_auto(path)?;
    read_sheet(&mut workbook, sheet_name, schema)
}

/// Same as [`ingest_excel_from_path`] for workbook bytes (e.g. an upload).
pub fn ingest_excel_from_bytes(
    bytes: &[u8],
    sheet_name: Option<&str>,
    schema: Option<&Schema>,
) -> ReportResult<RecordSet> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    read_sheet(&mut workbook, sheet_name, schema)
}

/// Read a workbook written by [`crate::export::workbook::reports_to_workbook`] back into reports.
///
/// Item and total rows are joined to their header row by [`AggregationKey`]. Every report is
/// re-checked against `config.fields` under `config.policy`; detail lines come before total lines
/// in each returned report.
pub fn read_report_workbook(
    bytes: &[u8],
    config: &PipelineConfig,
) -> ReportResult<Vec<ParsedReport>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;

    let headers = read_sheet(&mut workbook, Some(HEADER_SHEET), Some(&header_schema()))?;
    let mut reports: Vec<Report> = Vec::with_capacity(headers.row_count());
    let mut by_key: HashMap<AggregationKey, usize> = HashMap::new();
    for row in 0..headers.row_count() {
        let header = header_from_row(&headers, row)?;
        let key = header.key();
        if by_key.insert(key.clone(), reports.len()).is_some() {
            return Err(ReportError::SchemaMismatch {
                field: columns::REPORT_ID.to_string(),
                message: format!("sheet '{HEADER_SHEET}' lists report {key} twice"),
                parse_errors: Vec::new(),
            });
        }
        reports.push(Report::new(header, Vec::new()));
    }

    for sheet in [ITEMS_SHEET, TOTALS_SHEET] {
        let rows = read_sheet(&mut workbook, Some(sheet), Some(&item_schema()))?;
        for row in 0..rows.row_count() {
            let (key, item) = item_from_row(&rows, row)?;
            let Some(&idx) = by_key.get(&key) else {
                return Err(ReportError::SchemaMismatch {
                    field: columns::REPORT_ID.to_string(),
                    message: format!(
                        "sheet '{sheet}' row {} belongs to report {key}, which has no header row",
                        row + 2
                    ),
                    parse_errors: Vec::new(),
                });
            };
            reports[idx].items.push(item);
        }
    }

    reports
        .into_iter()
        .map(|report| {
            let flags = validate_report(&report, &config.fields, config.policy)?;
            Ok(ParsedReport {
                report,
                parse_errors: Vec::new(),
                flags,
            })
        })
        .collect()
}

fn read_sheet<RS>(
    workbook: &mut Sheets<RS>,
    sheet_name: Option<&str>,
    schema: Option<&Schema>,
) -> ReportResult<RecordSet>
where
    RS: std::io::Read + std::io::Seek,
{
    let sheet = match sheet_name {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ReportError::SchemaMismatch {
                field: "sheet".to_string(),
                message: "workbook has no sheets".to_string(),
                parse_errors: Vec::new(),
            })?,
    };
    let range = workbook.worksheet_range(&sheet)?;
    ingest_sheet_range(&sheet, &range, schema)
}

fn ingest_sheet_range(
    sheet: &str,
    range: &Range<Data>,
    schema: Option<&Schema>,
) -> ReportResult<RecordSet> {
    let Some((header_row_idx, header_cells)) = find_header_row(range) else {
        return match schema {
            // An exported sheet with no rows still has its header; a truly blank sheet is an
            // empty record set only when the caller knows the shape.
            Some(schema) => Ok(RecordSet::empty(schema.clone())),
            None => Err(ReportError::SchemaMismatch {
                field: "sheet".to_string(),
                message: format!("sheet '{sheet}' has no non-empty rows (no header row found)"),
                parse_errors: Vec::new(),
            }),
        };
    };

    let body: Vec<&[Data]> = range.rows().skip(header_row_idx + 1).collect();
    let schema = match schema {
        Some(schema) => schema.clone(),
        None => infer_schema(&header_cells, &body),
    };

    let mut col_idxs: Vec<usize> = Vec::with_capacity(schema.fields.len());
    for f in &schema.fields {
        match header_cells.iter().position(|h| h.trim() == f.name) {
            Some(idx) => col_idxs.push(idx),
            None => {
                return Err(ReportError::SchemaMismatch {
                    field: f.name.clone(),
                    message: format!(
                        "sheet '{sheet}' is missing the column. headers={header_cells:?}"
                    ),
                    parse_errors: Vec::new(),
                });
            }
        }
    }

    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(body.len());
    for (offset, row) in body.iter().enumerate() {
        if row.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }
        // 1-based row number, as the spreadsheet shows it.
        let user_row = header_row_idx + offset + 2;

        let mut out_row: Vec<Value> = Vec::with_capacity(schema.fields.len());
        for (field, &col_idx) in schema.fields.iter().zip(col_idxs.iter()) {
            let cell = row.get(col_idx).unwrap_or(&Data::Empty);
            let col_label = format!("{sheet}:{name}", name = field.name);
            out_row.push(convert_cell(user_row, &col_label, field.data_type, cell)?);
        }
        rows.push(out_row);
    }

    Ok(RecordSet::new(schema, rows))
}

fn find_header_row(range: &Range<Data>) -> Option<(usize, Vec<String>)> {
    range.rows().enumerate().find_map(|(idx0, row)| {
        row.iter()
            .any(|c| !matches!(c, Data::Empty))
            .then(|| (idx0, row.iter().map(cell_to_string).collect()))
    })
}

fn infer_schema(header_cells: &[String], body: &[&[Data]]) -> Schema {
    let fields = header_cells
        .iter()
        .enumerate()
        .filter(|(_, name)| !name.trim().is_empty())
        .map(|(idx, name)| {
            let cells: Vec<&Data> = body
                .iter()
                .filter_map(|row| row.get(idx))
                .filter(|c| !matches!(c, Data::Empty))
                .collect();
            Field::new(name.trim(), infer_cell_type(&cells))
        })
        .collect();
    Schema::new(fields)
}

fn infer_cell_type(cells: &[&Data]) -> DataType {
    if cells.is_empty() {
        return DataType::Utf8;
    }
    if cells.iter().all(|c| matches!(c, Data::Int(_))) {
        return DataType::Int64;
    }
    if cells.iter().all(|c| matches!(c, Data::Int(_) | Data::Float(_))) {
        return DataType::Decimal;
    }
    if cells.iter().all(|c| matches!(c, Data::Bool(_))) {
        return DataType::Bool;
    }
    if cells.iter().all(|c| matches!(c, Data::DateTime(_) | Data::DateTimeIso(_))) {
        return DataType::Date;
    }
    if cells.iter().all(|c| matches!(c, Data::String(_))) {
        let text: Vec<String> = cells.iter().map(|c| cell_to_string(c)).collect();
        return infer_column_type(text.iter().map(String::as_str));
    }
    DataType::Utf8
}

fn cell_to_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.clone(),
        Data::Empty => String::new(),
        _ => c.to_string(),
    }
}

fn convert_cell(row: usize, column: &str, data_type: DataType, c: &Data) -> ReportResult<Value> {
    if matches!(c, Data::Empty) {
        return Ok(Value::Null);
    }
    // Text cells follow the same rules as CSV text.
    if let Data::String(s) = c {
        return parse_typed_value(row, column, data_type, s);
    }

    let invalid = |reason: &str| -> ReportError {
        ValidationError {
            field: column.to_string(),
            value: c.to_string(),
            reason: reason.to_string(),
            line_number: Some(row),
        }
        .into()
    };

    match data_type {
        DataType::Utf8 => Ok(Value::Utf8(cell_to_string(c))),
        DataType::Bool => match c {
            Data::Bool(b) => Ok(Value::Bool(*b)),
            Data::Int(i) => Ok(Value::Bool(*i != 0)),
            Data::Float(f) => Ok(Value::Bool(*f != 0.0)),
            _ => parse_bool(&c.to_string())
                .map(Value::Bool)
                .map_err(|reason| invalid(&reason)),
        },
        DataType::Int64 => match c {
            Data::Int(i) => Ok(Value::Int64(*i)),
            Data::Float(f) if f.fract() == 0.0 => Ok(Value::Int64(*f as i64)),
            _ => Err(invalid("expected integer")),
        },
        DataType::Decimal => match c {
            Data::Int(i) => Ok(Value::Decimal(Decimal::from(*i))),
            Data::Float(f) => float_to_decimal(*f)
                .map(Value::Decimal)
                .ok_or_else(|| invalid("expected finite number")),
            _ => Err(invalid("expected number")),
        },
        DataType::Date => match c {
            Data::DateTime(dt) => serial_to_date(dt.as_f64())
                .map(Value::Date)
                .ok_or_else(|| invalid("date serial out of range")),
            Data::DateTimeIso(s) => parse_text_date(s.get(..10).unwrap_or(s))
                .map(Value::Date)
                .ok_or_else(|| invalid("expected ISO date")),
            _ => Err(invalid("expected date")),
        },
    }
}

/// Numeric cells (hand-edited or foreign sheets) are f64; the shortest decimal rendering is the
/// closest to what was typed. Exported amounts are text cells and never take this path.
fn float_to_decimal(f: f64) -> Option<Decimal> {
    if !f.is_finite() {
        return None;
    }
    parse_decimal(&f.to_string())
}

/// Excel serial day number (1900 date system) to a calendar date.
fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(serial.floor() as u64))
}

fn text(rs: &RecordSet, row: usize, column: &str) -> ReportResult<String> {
    match rs.value(row, column) {
        Some(Value::Null) | None => Err(missing(row, column)),
        Some(v) => Ok(v.to_string()),
    }
}

fn optional_text(rs: &RecordSet, row: usize, column: &str) -> Option<String> {
    match rs.value(row, column) {
        Some(Value::Null) | None => None,
        Some(v) => Some(v.to_string()),
    }
}

fn date(rs: &RecordSet, row: usize, column: &str) -> ReportResult<NaiveDate> {
    match rs.value(row, column) {
        Some(Value::Date(d)) => Ok(*d),
        _ => Err(missing(row, column)),
    }
}

fn decimal(rs: &RecordSet, row: usize, column: &str) -> Decimal {
    rs.value(row, column)
        .and_then(Value::as_decimal)
        .unwrap_or(Decimal::ZERO)
}

fn missing(row: usize, column: &str) -> ReportError {
    ReportError::SchemaMismatch {
        field: column.to_string(),
        message: format!("row {} has no value", row + 2),
        parse_errors: Vec::new(),
    }
}

fn header_from_row(rs: &RecordSet, row: usize) -> ReportResult<ReportHeader> {
    Ok(ReportHeader {
        report_id: text(rs, row, columns::REPORT_ID)?,
        reporting_for: text(rs, row, columns::REPORTING_FOR)?,
        transaction_type: text(rs, row, columns::TRANSACTION_TYPE)?,
        rollup_to: text(rs, row, columns::ROLLUP_TO)?,
        funds_xfer_entity: text(rs, row, columns::FUNDS_XFER_ENTITY)?,
        settlement_currency: text(rs, row, columns::SETTLEMENT_CURRENCY)?,
        processing_date: date(rs, row, columns::PROCESSING_DATE)?,
        report_date: date(rs, row, columns::REPORT_DATE)?,
    })
}

fn item_from_row(rs: &RecordSet, row: usize) -> ReportResult<(AggregationKey, LineItem)> {
    let key = AggregationKey {
        report_id: text(rs, row, columns::REPORT_ID)?,
        reporting_for: text(rs, row, columns::REPORTING_FOR)?,
        settlement_currency: text(rs, row, columns::SETTLEMENT_CURRENCY)?,
        processing_date: date(rs, row, columns::PROCESSING_DATE)?,
    };
    let kind_text = text(rs, row, columns::LINE_KIND)?;
    let kind = LineKind::from_name(&kind_text).ok_or_else(|| ValidationError {
        field: columns::LINE_KIND.to_string(),
        value: kind_text.clone(),
        reason: "expected 'detail' or 'total'".to_string(),
        line_number: Some(row + 2),
    })?;
    let count = match rs.value(row, columns::COUNT) {
        Some(Value::Int64(n)) => *n,
        _ => 0,
    };

    let item = LineItem {
        kind,
        major_type: text(rs, row, columns::MAJOR_TYPE)?,
        minor_type: text(rs, row, columns::MINOR_TYPE)?,
        count,
        credit_amount: decimal(rs, row, columns::CREDIT_AMOUNT),
        debit_amount: decimal(rs, row, columns::DEBIT_AMOUNT),
        amount: decimal(rs, row, columns::AMOUNT),
        currency: optional_text(rs, row, columns::CURRENCY)
            .unwrap_or_else(|| key.settlement_currency.clone()),
        credit_account: optional_text(rs, row, columns::CREDIT_ACCOUNT),
        debit_account: optional_text(rs, row, columns::DEBIT_ACCOUNT),
    };
    Ok((key, item))
}
