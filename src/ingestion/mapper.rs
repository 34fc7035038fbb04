//! Schema mapper: typed lines → a validated [`Report`].
//!
//! Header values are gathered (first value wins; conflicts were already reported by the line
//! parser), dates are normalized with the layout's formats, and every enumerated field is checked
//! against the [`FieldConfig`]. Item lines become [`LineItem`]s with posting accounts filled in.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::config::{FieldConfig, ReportLayout, ValidationPolicy};
use crate::error::{ParseError, ReportError, ReportResult, ValidationError};
use crate::report::{HeaderField, LineItem, LineKind, Report, ReportHeader, columns};

use super::lines::{ItemLine, LineParse, TypedLine};

/// A report produced from text, with the non-fatal problems found on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReport {
    pub report: Report,
    /// Line-level problems; the lines involved were skipped.
    pub parse_errors: Vec<ParseError>,
    /// Enumeration violations kept under [`ValidationPolicy::Lenient`].
    pub flags: Vec<ValidationError>,
}

impl ParsedReport {
    /// `true` when the report parsed without line errors or validation flags.
    pub fn is_clean(&self) -> bool {
        self.parse_errors.is_empty() && self.flags.is_empty()
    }
}

/// Build a [`ParsedReport`] from the line parser's output.
pub fn map_report(
    parsed: LineParse,
    layout: &ReportLayout,
    fields: &FieldConfig,
    policy: ValidationPolicy,
) -> ReportResult<ParsedReport> {
    let LineParse { lines, errors } = parsed;

    let mut header_values: HashMap<HeaderField, (String, usize)> = HashMap::new();
    let mut item_lines: Vec<(LineKind, ItemLine)> = Vec::new();
    for line in lines {
        match line {
            TypedLine::Header {
                line_number,
                fields: found,
            } => {
                for (field, value) in found {
                    header_values.entry(field).or_insert((value, line_number));
                }
            }
            TypedLine::Item(item) => item_lines.push((LineKind::Detail, item)),
            TypedLine::Total(item) => item_lines.push((LineKind::Total, item)),
            TypedLine::Section { .. } | TypedLine::Unrecognized { .. } => {}
        }
    }

    let mut checker = Checker::new(fields, policy);
    let header = match build_header(&header_values, layout, &mut checker) {
        Ok(header) => header,
        Err(ReportError::SchemaMismatch { field, message, .. }) => {
            return Err(ReportError::SchemaMismatch {
                field,
                message,
                parse_errors: errors,
            });
        }
        Err(e) => return Err(e),
    };

    let mut items = Vec::with_capacity(item_lines.len());
    for (kind, line) in item_lines {
        let n = Some(line.line_number);
        checker.check(columns::MAJOR_TYPE, &line.major_type, n)?;
        checker.check(columns::MINOR_TYPE, &line.minor_type, n)?;
        if let Some(currency) = &line.currency {
            checker.check_currency(currency, n)?;
        }
        items.push(to_line_item(kind, line, &header.settlement_currency, fields));
    }

    if items.is_empty() {
        tracing::warn!(report_id = %header.report_id, "report has no item lines");
    }

    Ok(ParsedReport {
        report: Report::new(header, items),
        parse_errors: errors,
        flags: checker.flags,
    })
}

/// Check an already-built report against the field configuration.
///
/// Used for reports that did not come from text (e.g. a workbook read back for aggregation).
/// Returns the flags collected under [`ValidationPolicy::Lenient`].
pub fn validate_report(
    report: &Report,
    fields: &FieldConfig,
    policy: ValidationPolicy,
) -> ReportResult<Vec<ValidationError>> {
    let mut checker = Checker::new(fields, policy);
    for field in HeaderField::ALL {
        if !field.is_date() {
            checker.check(field.name(), &report.header.value(field).to_string(), None)?;
        }
    }
    for item in &report.items {
        checker.check(columns::MAJOR_TYPE, &item.major_type, None)?;
        checker.check(columns::MINOR_TYPE, &item.minor_type, None)?;
        if item.currency != report.header.settlement_currency {
            checker.check_currency(&item.currency, None)?;
        }
    }
    Ok(checker.flags)
}

struct Checker<'a> {
    fields: &'a FieldConfig,
    policy: ValidationPolicy,
    flags: Vec<ValidationError>,
}

impl<'a> Checker<'a> {
    fn new(fields: &'a FieldConfig, policy: ValidationPolicy) -> Self {
        Self {
            fields,
            policy,
            flags: Vec::new(),
        }
    }

    fn check(&mut self, field: &str, value: &str, line_number: Option<usize>) -> ReportResult<()> {
        if self.fields.accepts(field, value) {
            return Ok(());
        }
        self.reject(field, value, line_number)
    }

    fn check_currency(&mut self, value: &str, line_number: Option<usize>) -> ReportResult<()> {
        if self.fields.accepts_currency(value) {
            return Ok(());
        }
        self.reject(columns::CURRENCY, value, line_number)
    }

    fn reject(&mut self, field: &str, value: &str, line_number: Option<usize>) -> ReportResult<()> {
        let error = ValidationError {
            field: field.to_string(),
            value: value.to_string(),
            reason: "not in configured value set".to_string(),
            line_number,
        };
        match self.policy {
            ValidationPolicy::Strict => Err(error.into()),
            ValidationPolicy::Lenient => {
                tracing::warn!(%error, "keeping out-of-enumeration value");
                self.flags.push(error);
                Ok(())
            }
        }
    }
}

fn build_header(
    values: &HashMap<HeaderField, (String, usize)>,
    layout: &ReportLayout,
    checker: &mut Checker<'_>,
) -> ReportResult<ReportHeader> {
    let text = |field: HeaderField| -> ReportResult<(&str, usize)> {
        values
            .get(&field)
            .map(|(v, n)| (v.as_str(), *n))
            .ok_or_else(|| ReportError::SchemaMismatch {
                field: field.name().to_string(),
                message: "required header field missing".to_string(),
                parse_errors: Vec::new(),
            })
    };

    // Every field must be present before any value is judged.
    for field in HeaderField::ALL {
        text(field)?;
    }

    let mut enumerated = |field: HeaderField| -> ReportResult<String> {
        let (value, n) = text(field)?;
        checker.check(field.name(), value, Some(n))?;
        Ok(value.to_string())
    };
    let report_id = enumerated(HeaderField::ReportId)?;
    let reporting_for = enumerated(HeaderField::ReportingFor)?;
    let transaction_type = enumerated(HeaderField::TransactionType)?;
    let rollup_to = enumerated(HeaderField::RollupTo)?;
    let funds_xfer_entity = enumerated(HeaderField::FundsXferEntity)?;
    let settlement_currency = enumerated(HeaderField::SettlementCurrency)?.to_ascii_uppercase();

    let date = |field: HeaderField| -> ReportResult<NaiveDate> {
        let (value, n) = text(field)?;
        layout.parse_date(value).ok_or_else(|| {
            ValidationError {
                field: field.name().to_string(),
                value: value.to_string(),
                reason: format!("date does not match any of {:?}", layout.date_formats),
                line_number: Some(n),
            }
            .into()
        })
    };

    Ok(ReportHeader {
        report_id,
        reporting_for,
        transaction_type,
        rollup_to,
        funds_xfer_entity,
        settlement_currency,
        processing_date: date(HeaderField::ProcessingDate)?,
        report_date: date(HeaderField::ReportDate)?,
    })
}

fn to_line_item(
    kind: LineKind,
    line: ItemLine,
    header_currency: &str,
    fields: &FieldConfig,
) -> LineItem {
    let credit_amount = line.credit_amount.unwrap_or(Decimal::ZERO);
    let debit_amount = line.debit_amount.unwrap_or(Decimal::ZERO);
    let amount = line.total_amount.unwrap_or(credit_amount - debit_amount);
    let (credit_account, debit_account) = fields.accounts_for(&line.major_type, &line.minor_type);

    LineItem {
        kind,
        major_type: line.major_type,
        minor_type: line.minor_type,
        count: line.count.unwrap_or(0),
        credit_amount,
        debit_amount,
        amount,
        currency: line.currency.unwrap_or_else(|| header_currency.to_string()),
        credit_account,
        debit_account,
    }
}
