//! Spreadsheet export.
//!
//! [`reports_to_workbook`] writes three sheets with a fixed column order:
//!
//! | Sheet    | Rows                              | Columns                                   |
//! |----------|-----------------------------------|-------------------------------------------|
//! | `Header` | one per report                    | [`crate::report::header_schema`]          |
//! | `Items`  | detail lines of every report      | [`crate::report::item_schema`]            |
//! | `Totals` | subtotal / grand total lines      | [`crate::report::item_schema`]            |
//!
//! Item rows repeat the report identity columns, so the workbook can be read back with
//! [`crate::ingestion::excel::read_report_workbook`] and aggregated into later.
//!
//! Amounts are written as their exact decimal text (scale included) rather than as spreadsheet
//! numbers, which are `f64`. The document creation time is the latest report date, so exporting
//! the same reports twice yields identical bytes.

use chrono::Datelike;
use rust_xlsxwriter::{DocProperties, ExcelDateTime, Format, FormatAlign, Workbook, Worksheet};

use crate::error::ReportResult;
use crate::report::{LineKind, Report, headers_record_set, items_record_set};
use crate::types::{DataType, RecordSet, Value};

pub const HEADER_SHEET: &str = "Header";
pub const ITEMS_SHEET: &str = "Items";
pub const TOTALS_SHEET: &str = "Totals";
/// Sheet written by [`record_set_to_workbook`].
pub const RECORDS_SHEET: &str = "Records";

/// Largest integer an `f64` cell holds exactly.
const MAX_EXACT_INT: i64 = 1 << 53;

/// Serialize reports to `.xlsx` bytes.
pub fn reports_to_workbook(reports: &[Report]) -> ReportResult<Vec<u8>> {
    let mut workbook = Workbook::new();
    let formats = Formats::new();

    let created = match reports.iter().map(|r| r.header.report_date).max() {
        Some(d) => ExcelDateTime::from_ymd(
            u16::try_from(d.year()).unwrap_or(1900),
            u8::try_from(d.month()).unwrap_or(1),
            u8::try_from(d.day()).unwrap_or(1),
        )?,
        None => ExcelDateTime::from_ymd(2000, 1, 1)?,
    };
    workbook.set_properties(&DocProperties::new().set_creation_datetime(&created));

    write_sheet(&mut workbook, HEADER_SHEET, &headers_record_set(reports), &formats)?;
    write_sheet(
        &mut workbook,
        ITEMS_SHEET,
        &items_record_set(reports, |i| i.kind == LineKind::Detail),
        &formats,
    )?;
    write_sheet(
        &mut workbook,
        TOTALS_SHEET,
        &items_record_set(reports, |i| i.kind == LineKind::Total),
        &formats,
    )?;

    let bytes = workbook.save_to_buffer()?;
    tracing::debug!(reports = reports.len(), bytes = bytes.len(), "wrote report workbook");
    Ok(bytes)
}

/// Serialize any record set (e.g. a filtered selection) to a single-sheet `.xlsx`.
pub fn record_set_to_workbook(record_set: &RecordSet) -> ReportResult<Vec<u8>> {
    let mut workbook = Workbook::new();
    write_sheet(&mut workbook, RECORDS_SHEET, record_set, &Formats::new())?;
    Ok(workbook.save_to_buffer()?)
}

struct Formats {
    header: Format,
    amount: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            header: Format::new().set_bold(),
            amount: Format::new().set_align(FormatAlign::Right),
        }
    }
}

fn write_sheet(
    workbook: &mut Workbook,
    name: &str,
    record_set: &RecordSet,
    formats: &Formats,
) -> ReportResult<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name(name)?;

    for (col, field) in record_set.schema.fields.iter().enumerate() {
        let col = column_index(col);
        sheet.write_string_with_format(0, col, &field.name, &formats.header)?;
        let width = match field.data_type {
            DataType::Decimal => 16.0,
            DataType::Date => 12.0,
            _ => (field.name.len() as f64 + 2.0).max(10.0),
        };
        sheet.set_column_width(col, width)?;
    }
    sheet.set_freeze_panes(1, 0)?;

    for (r, row) in record_set.rows.iter().enumerate() {
        let r = u32::try_from(r + 1).unwrap_or(u32::MAX);
        for (c, value) in row.iter().enumerate() {
            write_cell(sheet, r, column_index(c), value, formats)?;
        }
    }
    Ok(())
}

fn write_cell(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &Value,
    formats: &Formats,
) -> ReportResult<()> {
    match value {
        Value::Null => {}
        Value::Int64(v) if (-MAX_EXACT_INT..=MAX_EXACT_INT).contains(v) => {
            sheet.write_number(row, col, *v as f64)?;
        }
        Value::Int64(v) => {
            sheet.write_string_with_format(row, col, v.to_string(), &formats.amount)?;
        }
        Value::Decimal(d) => {
            sheet.write_string_with_format(row, col, d.to_string(), &formats.amount)?;
        }
        Value::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        Value::Utf8(s) => {
            sheet.write_string(row, col, s)?;
        }
        // ISO text keeps the date free of the spreadsheet's serial-number epoch.
        Value::Date(d) => {
            sheet.write_string(row, col, d.format("%Y-%m-%d").to_string())?;
        }
    }
    Ok(())
}

fn column_index(c: usize) -> u16 {
    u16::try_from(c).unwrap_or(u16::MAX)
}
