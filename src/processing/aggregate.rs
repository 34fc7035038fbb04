//! Rollup of report instances that describe the same logical report.
//!
//! Reports are grouped by (ReportID, ReportingFor, ProcessingDate). Members of a group must agree
//! on SettlementCurrency; their line items are merged by category with exact decimal sums.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, ReportResult};
use crate::report::{LineItem, LineKind, Report, columns};

/// Whether an export writes the reports as given or rolled up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    /// Pass reports through unchanged.
    #[default]
    New,
    /// Merge reports sharing an identity into one.
    Aggregate,
}

type GroupKey<'a> = (&'a str, &'a str, NaiveDate);

fn group_key(report: &Report) -> GroupKey<'_> {
    let h = &report.header;
    (h.report_id.as_str(), h.reporting_for.as_str(), h.processing_date)
}

/// Apply `mode` to `reports`, returning new reports in first-appearance order.
///
/// Fails with [`ReportError::CurrencyConflict`] if a group mixes settlement currencies, or if the
/// same category carries different item currencies. Nothing is returned on failure.
pub fn aggregate(reports: &[Report], mode: AggregationMode) -> ReportResult<Vec<Report>> {
    if mode == AggregationMode::New {
        return Ok(reports.to_vec());
    }

    let mut order: Vec<Vec<&Report>> = Vec::new();
    let mut index: HashMap<GroupKey<'_>, usize> = HashMap::new();
    for report in reports {
        let slot = *index.entry(group_key(report)).or_insert_with(|| {
            order.push(Vec::new());
            order.len() - 1
        });
        order[slot].push(report);
    }

    let merged = order
        .into_iter()
        .map(merge_group)
        .collect::<ReportResult<Vec<_>>>()?;
    tracing::debug!(input = reports.len(), output = merged.len(), "aggregated reports");
    Ok(merged)
}

/// Merge `incoming` into a previously produced report with the same identity.
///
/// Fails with [`ReportError::KeyMismatch`] when the two describe different reports.
pub fn merge_reports(prior: &Report, incoming: &Report) -> ReportResult<Report> {
    if group_key(prior) != group_key(incoming) {
        return Err(ReportError::KeyMismatch {
            expected: prior.key().to_string(),
            found: incoming.key().to_string(),
        });
    }
    merge_group(vec![prior, incoming])
}

fn merge_group(members: Vec<&Report>) -> ReportResult<Report> {
    let Some((first, rest)) = members.split_first() else {
        return Err(ReportError::InvalidConfig {
            message: "cannot merge an empty group".to_string(),
        });
    };
    if rest.is_empty() {
        return Ok((*first).clone());
    }

    let mut header = first.header.clone();
    for other in rest {
        if other.header.settlement_currency != header.settlement_currency {
            return Err(ReportError::CurrencyConflict {
                report_id: header.report_id.clone(),
                expected: header.settlement_currency.clone(),
                found: other.header.settlement_currency.clone(),
            });
        }
        header.report_date = header.report_date.max(other.header.report_date);
    }

    let mut items: Vec<LineItem> = Vec::new();
    let mut by_category: HashMap<(LineKind, String, String), usize> = HashMap::new();
    for item in members.iter().flat_map(|r| r.items.iter()) {
        let key = (item.kind, item.major_type.clone(), item.minor_type.clone());
        match by_category.get(&key) {
            Some(&idx) => add_into(&mut items[idx], item, &header.report_id)?,
            None => {
                by_category.insert(key, items.len());
                items.push(item.clone());
            }
        }
    }

    Ok(Report::new(header, items))
}

fn add_into(acc: &mut LineItem, item: &LineItem, report_id: &str) -> ReportResult<()> {
    if acc.currency != item.currency {
        return Err(ReportError::CurrencyConflict {
            report_id: report_id.to_string(),
            expected: acc.currency.clone(),
            found: item.currency.clone(),
        });
    }
    let overflow = |column: &'static str| ReportError::AmountOverflow {
        report_id: report_id.to_string(),
        category: format!("{} / {}", acc.major_type, acc.minor_type),
        column,
    };
    let count = acc
        .count
        .checked_add(item.count)
        .ok_or_else(|| overflow(columns::COUNT))?;
    let credit = acc
        .credit_amount
        .checked_add(item.credit_amount)
        .ok_or_else(|| overflow(columns::CREDIT_AMOUNT))?;
    let debit = acc
        .debit_amount
        .checked_add(item.debit_amount)
        .ok_or_else(|| overflow(columns::DEBIT_AMOUNT))?;
    let amount = acc
        .amount
        .checked_add(item.amount)
        .ok_or_else(|| overflow(columns::AMOUNT))?;
    acc.count = count;
    acc.credit_amount = credit;
    acc.debit_amount = debit;
    acc.amount = amount;
    if acc.credit_account.is_none() {
        acc.credit_account = item.credit_account.clone();
    }
    if acc.debit_account.is_none() {
        acc.debit_account = item.debit_account.clone();
    }
    Ok(())
}
