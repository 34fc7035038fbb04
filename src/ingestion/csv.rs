//! CSV ingestion into a [`RecordSet`].

use std::path::Path;

use crate::error::{ReportError, ReportResult, ValidationError};
use crate::types::{
    DataType, Field, RecordSet, Schema, TEXT_DATE_FORMATS, Value, parse_decimal, parse_text_date,
};

/// Ingest a CSV file into an in-memory [`RecordSet`].
///
/// Rules:
///
/// - CSV must have headers.
/// - With a schema, headers must contain all schema fields (order can differ) and each value is
///   parsed according to the field type.
/// - Without a schema, every column is kept and typed by [`infer_column_type`].
pub fn ingest_csv_from_path(
    path: impl AsRef<Path>,
    schema: Option<&Schema>,
) -> ReportResult<RecordSet> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_path(path)?;
    ingest_csv_from_reader(&mut rdr, schema)
}

/// Ingest CSV data from an existing CSV reader.
pub fn ingest_csv_from_reader<R: std::io::Read>(
    rdr: &mut csv::Reader<R>,
    schema: Option<&Schema>,
) -> ReportResult<RecordSet> {
    let headers = rdr.headers()?.clone();
    let records = rdr.records().collect::<Result<Vec<_>, _>>()?;

    let schema = match schema {
        Some(schema) => schema.clone(),
        None => Schema::new(
            headers
                .iter()
                .enumerate()
                .map(|(idx, name)| {
                    let column = records.iter().map(|r| r.get(idx).unwrap_or(""));
                    Field::new(name, infer_column_type(column))
                })
                .collect(),
        ),
    };

    // Map schema fields -> CSV column indexes (allows re-ordered CSV columns).
    let mut col_idxs = Vec::with_capacity(schema.fields.len());
    for field in &schema.fields {
        match headers.iter().position(|h| h == field.name) {
            Some(idx) => col_idxs.push(idx),
            None => {
                return Err(ReportError::SchemaMismatch {
                    field: field.name.clone(),
                    message: format!(
                        "missing required column. headers={:?}",
                        headers.iter().collect::<Vec<_>>()
                    ),
                    parse_errors: Vec::new(),
                });
            }
        }
    }

    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(records.len());
    for (row_idx0, record) in records.iter().enumerate() {
        // Report 1-based row number for users; +1 again because header is row 1.
        let user_row = row_idx0 + 2;

        let mut row: Vec<Value> = Vec::with_capacity(schema.fields.len());
        for (field, &csv_idx) in schema.fields.iter().zip(col_idxs.iter()) {
            let raw = record.get(csv_idx).unwrap_or("");
            row.push(parse_typed_value(user_row, &field.name, field.data_type, raw)?);
        }
        rows.push(row);
    }

    Ok(RecordSet::new(schema, rows))
}

/// Pick the narrowest type every non-empty cell of a text column parses as.
///
/// Order of preference: `Int64`, `Decimal`, `Date`, `Bool`, then `Utf8`. An all-empty column is
/// `Utf8`.
pub fn infer_column_type<'a>(cells: impl Iterator<Item = &'a str>) -> DataType {
    let candidates = [DataType::Int64, DataType::Decimal, DataType::Date, DataType::Bool];
    let mut alive = [true; 4];
    let mut seen = false;
    for cell in cells.map(str::trim).filter(|c| !c.is_empty()) {
        seen = true;
        for (i, ty) in candidates.iter().enumerate() {
            if alive[i] && parse_text(*ty, cell).is_err() {
                alive[i] = false;
            }
        }
    }
    if !seen {
        return DataType::Utf8;
    }
    candidates
        .iter()
        .zip(alive)
        .find(|(_, ok)| *ok)
        .map(|(ty, _)| *ty)
        .unwrap_or(DataType::Utf8)
}

/// Parse one text cell as `data_type`. Empty cells are `Null`.
pub(crate) fn parse_typed_value(
    row: usize,
    column: &str,
    data_type: DataType,
    raw: &str,
) -> ReportResult<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    parse_text(data_type, trimmed).map_err(|reason| {
        ValidationError {
            field: column.to_owned(),
            value: raw.to_owned(),
            reason,
            line_number: Some(row),
        }
        .into()
    })
}

fn parse_text(data_type: DataType, s: &str) -> Result<Value, String> {
    match data_type {
        DataType::Utf8 => Ok(Value::Utf8(s.to_owned())),
        DataType::Int64 => s.parse::<i64>().map(Value::Int64).map_err(|e| e.to_string()),
        DataType::Decimal => parse_decimal(s)
            .map(Value::Decimal)
            .ok_or_else(|| "expected decimal number".to_string()),
        DataType::Bool => parse_bool(s).map(Value::Bool),
        DataType::Date => parse_text_date(s)
            .map(Value::Date)
            .ok_or_else(|| format!("expected date ({})", TEXT_DATE_FORMATS.join(", "))),
    }
}

pub(crate) fn parse_bool(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Ok(true),
        "false" | "f" | "0" | "no" | "n" => Ok(false),
        _ => Err("expected bool (true/false/1/0/yes/no)".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn reader(data: &str) -> csv::Reader<&[u8]> {
        csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(data.as_bytes())
    }

    #[test]
    fn schema_projection_allows_reordered_columns() {
        let schema = Schema::new(vec![
            Field::new("MajorType", DataType::Utf8),
            Field::new("Amount", DataType::Decimal),
        ]);
        let mut rdr = reader("Amount,Extra,MajorType\n\"1,075.25\",x,Interchange\n,y,Issuer\n");
        let rs = ingest_csv_from_reader(&mut rdr, Some(&schema)).unwrap();
        assert_eq!(
            rs.rows[0],
            vec![Value::Utf8("Interchange".into()), Value::Decimal(dec!(1075.25))]
        );
        assert_eq!(rs.rows[1][1], Value::Null);
    }

    #[test]
    fn bad_cell_reports_one_based_row() {
        let schema = Schema::new(vec![Field::new("Count", DataType::Int64)]);
        let mut rdr = reader("Count\n1\nabc\n");
        let err = ingest_csv_from_reader(&mut rdr, Some(&schema)).unwrap_err();
        match err {
            ReportError::Validation(v) => {
                assert_eq!(v.field, "Count");
                assert_eq!(v.line_number, Some(3));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn missing_column_is_schema_mismatch() {
        let schema = Schema::new(vec![Field::new("Amount", DataType::Decimal)]);
        let mut rdr = reader("Total\n1\n");
        assert!(matches!(
            ingest_csv_from_reader(&mut rdr, Some(&schema)),
            Err(ReportError::SchemaMismatch { field, .. }) if field == "Amount"
        ));
    }

    #[test]
    fn inference_picks_narrowest_type() {
        let mut rdr = reader("n,amt,day,name\n1,1.50,2025-07-14,a\n2,,2025-07-15,b\n");
        let rs = ingest_csv_from_reader(&mut rdr, None).unwrap();
        let types: Vec<_> = rs.schema.fields.iter().map(|f| f.data_type).collect();
        assert_eq!(
            types,
            vec![DataType::Int64, DataType::Decimal, DataType::Date, DataType::Utf8]
        );
        assert_eq!(rs.rows[1][1], Value::Null);
    }
}
