//! Line parser: raw report text → typed lines.
//!
//! Recognition is driven entirely by a [`ReportLayout`]:
//!
//! - **header** lines carry one or more header labels (`REPORT ID:`, `PROC DATE:`, ...)
//! - **section** lines are a bare section heading (`INTERCHANGE VALUE`) and set the MajorType
//! - **item** / **total** lines start with a line label (`ACQUIRER`, `TOTAL`) followed by amounts
//! - everything else (banners, column headings, blank lines) is **unrecognized**
//!
//! A malformed line produces a [`ParseError`] and parsing moves on to the next line.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::config::{AmountColumn, LineLabel, ReportLayout};
use crate::error::{ParseError, ReportError, ReportResult};
use crate::execution::CancellationToken;
use crate::report::HeaderField;
use crate::types::parse_decimal;

/// Amounts and labels extracted from an item or total line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemLine {
    pub line_number: usize,
    pub major_type: String,
    pub minor_type: String,
    pub count: Option<i64>,
    pub credit_amount: Option<Decimal>,
    pub debit_amount: Option<Decimal>,
    /// Signed by the CR/DB marker when one is printed.
    pub total_amount: Option<Decimal>,
    /// Currency printed on the line, overriding the settlement currency.
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedLine {
    Header {
        line_number: usize,
        fields: Vec<(HeaderField, String)>,
    },
    Section {
        line_number: usize,
        major_type: String,
    },
    Item(ItemLine),
    Total(ItemLine),
    Unrecognized {
        line_number: usize,
        text: String,
    },
}

impl TypedLine {
    pub fn line_number(&self) -> usize {
        match self {
            TypedLine::Header { line_number, .. }
            | TypedLine::Section { line_number, .. }
            | TypedLine::Unrecognized { line_number, .. } => *line_number,
            TypedLine::Item(item) | TypedLine::Total(item) => item.line_number,
        }
    }
}

/// Output of [`parse_lines`]: every recognized line plus the errors collected on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineParse {
    pub lines: Vec<TypedLine>,
    pub errors: Vec<ParseError>,
}

/// Tokenize report text into typed lines.
///
/// Returns `Err` only on cancellation; malformed lines end up in [`LineParse::errors`].
pub fn parse_lines(
    text: &str,
    layout: &ReportLayout,
    cancel: Option<&CancellationToken>,
) -> ReportResult<LineParse> {
    let matcher = Matcher::new(layout);
    let mut out = LineParse::default();
    let mut seen: HashMap<HeaderField, String> = HashMap::new();
    let mut current_section: Option<String> = None;

    for (idx0, raw) in text.lines().enumerate() {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(ReportError::Cancelled);
        }
        let line_number = idx0 + 1;
        let raw = if idx0 == 0 {
            raw.trim_start_matches('\u{feff}')
        } else {
            raw
        };
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            out.lines.push(TypedLine::Unrecognized {
                line_number,
                text: String::new(),
            });
            continue;
        }
        let upper = normalized.to_ascii_uppercase();

        if let Some(major_type) = matcher.section(&upper) {
            current_section = Some(major_type.to_string());
            out.lines.push(TypedLine::Section {
                line_number,
                major_type: major_type.to_string(),
            });
            continue;
        }

        if let Some((matched_len, label)) = matcher.line_label(&upper) {
            // `upper` and `normalized` share byte offsets; the configured label may not.
            let rest = &normalized[matched_len..];
            let Some(major_type) = current_section.as_deref() else {
                out.errors.push(ParseError::new(
                    line_number,
                    format!("'{}' line appears before any section heading", label.label),
                ));
                continue;
            };
            match parse_item(line_number, major_type, label, rest, layout) {
                Ok(item) if label.total => out.lines.push(TypedLine::Total(item)),
                Ok(item) => out.lines.push(TypedLine::Item(item)),
                Err(e) => out.errors.push(e),
            }
            continue;
        }

        let found = matcher.header_labels(raw);
        if !found.is_empty() {
            let mut fields = Vec::with_capacity(found.len());
            for (field, label, value) in found {
                if value.is_empty() {
                    out.errors.push(ParseError::new(
                        line_number,
                        format!("header label '{label}' has no value"),
                    ));
                    continue;
                }
                match seen.get(&field) {
                    Some(prev) if *prev != value => {
                        out.errors.push(ParseError::new(
                            line_number,
                            format!("{field} '{value}' conflicts with earlier value '{prev}'"),
                        ));
                    }
                    Some(_) => {}
                    None => {
                        seen.insert(field, value.clone());
                    }
                }
                fields.push((field, value));
            }
            if !fields.is_empty() {
                out.lines.push(TypedLine::Header {
                    line_number,
                    fields,
                });
            }
            continue;
        }

        out.lines.push(TypedLine::Unrecognized {
            line_number,
            text: normalized,
        });
    }

    tracing::debug!(
        lines = out.lines.len(),
        errors = out.errors.len(),
        layout = %layout.version,
        "parsed report lines"
    );
    Ok(out)
}

/// Pre-uppercased labels, line labels sorted longest first so `NET SETTLEMENT AMOUNT` is not
/// shadowed by a shorter prefix.
struct Matcher<'a> {
    headers: Vec<(String, &'a str, HeaderField)>,
    sections: Vec<(String, &'a str)>,
    line_labels: Vec<(String, &'a LineLabel)>,
    value_gap: String,
}

impl<'a> Matcher<'a> {
    fn new(layout: &'a ReportLayout) -> Self {
        let norm = |s: &str| {
            s.split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_ascii_uppercase()
        };
        let mut line_labels: Vec<_> = layout
            .line_labels
            .iter()
            .map(|l| (norm(&l.label), l))
            .collect();
        line_labels.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            headers: layout
                .header_labels
                .iter()
                .map(|h| (h.label.to_ascii_uppercase(), h.label.as_str(), h.field))
                .collect(),
            sections: layout
                .sections
                .iter()
                .map(|s| (norm(&s.label), s.major_type.as_str()))
                .collect(),
            line_labels,
            value_gap: " ".repeat(layout.value_gap.max(1)),
        }
    }

    fn section(&self, upper: &str) -> Option<&'a str> {
        self.sections
            .iter()
            .find(|(label, _)| label == upper)
            .map(|(_, major)| *major)
    }

    /// Longest configured line label that starts `upper`, with its normalized byte length.
    fn line_label(&self, upper: &str) -> Option<(usize, &'a LineLabel)> {
        self.line_labels
            .iter()
            .find(|(label, _)| {
                upper.starts_with(label.as_str())
                    && upper[label.len()..].chars().next().is_none_or(|c| c == ' ')
            })
            .map(|(label, l)| (label.len(), *l))
    }

    /// Header labels present on `raw`, in position order, with their values.
    fn header_labels(&self, raw: &str) -> Vec<(HeaderField, &'a str, String)> {
        let upper = raw.to_ascii_uppercase();
        let mut hits: Vec<(usize, usize, &'a str, HeaderField)> = self
            .headers
            .iter()
            .filter_map(|(label_upper, label, field)| {
                find_label(&upper, label_upper)
                    .map(|pos| (pos, pos + label_upper.len(), *label, *field))
            })
            .collect();
        hits.sort_by_key(|h| h.0);
        // A label found inside another label's span is not a separate label.
        let mut kept: Vec<(usize, usize, &'a str, HeaderField)> = Vec::with_capacity(hits.len());
        for hit in hits {
            match kept.last() {
                Some(prev) if hit.0 < prev.1 => {}
                _ => kept.push(hit),
            }
        }

        kept.iter()
            .enumerate()
            .map(|(i, &(_, end, label, field))| {
                let stop = kept.get(i + 1).map(|n| n.0).unwrap_or(raw.len());
                let region = raw[end..stop].trim_start();
                let value = match region.find(self.value_gap.as_str()) {
                    Some(cut) => &region[..cut],
                    None => region,
                };
                (field, label, value.trim().to_string())
            })
            .collect()
    }
}

/// Position of `label` in `upper`, only where it starts a word.
fn find_label(upper: &str, label: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = upper[from..].find(label) {
        let pos = from + rel;
        let at_boundary = upper[..pos]
            .chars()
            .next_back()
            .is_none_or(char::is_whitespace);
        if at_boundary {
            return Some(pos);
        }
        from = pos + label.len();
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Credit,
    Debit,
}

fn parse_item(
    line_number: usize,
    major_type: &str,
    label: &LineLabel,
    rest: &str,
    layout: &ReportLayout,
) -> Result<ItemLine, ParseError> {
    let err = |reason: String| ParseError::new(line_number, reason);
    let mut tokens: Vec<String> = rest.split_whitespace().map(str::to_string).collect();

    let marker = take_marker(&mut tokens, layout);

    let mut currency = None;
    let mut amounts: Vec<&str> = Vec::with_capacity(tokens.len());
    for token in &tokens {
        if token.len() == 3 && token.chars().all(|c| c.is_ascii_alphabetic()) {
            if currency.is_some() {
                return Err(err(format!("more than one currency on '{}' line", label.label)));
            }
            currency = Some(token.to_ascii_uppercase());
        } else {
            amounts.push(token.as_str());
        }
    }

    if amounts.is_empty() {
        return Err(err(format!("'{}' line has no amount columns", label.label)));
    }
    let columns = &layout.amount_columns;
    if amounts.len() > columns.len() {
        return Err(err(format!(
            "'{}' line has {} amount columns, layout {} expects at most {}",
            label.label,
            amounts.len(),
            layout.version,
            columns.len()
        )));
    }

    let mut item = ItemLine {
        line_number,
        major_type: major_type.to_string(),
        minor_type: label.minor_type.clone(),
        count: None,
        credit_amount: None,
        debit_amount: None,
        total_amount: None,
        currency,
    };

    // Short lines (e.g. a grand total printing only the net amount) align to the right.
    let offset = columns.len() - amounts.len();
    for (column, raw) in columns[offset..].iter().zip(amounts) {
        let value = parse_amount_token(raw)
            .ok_or_else(|| err(format!("{column:?} value '{raw}' is not numeric")))?;
        match column {
            AmountColumn::Count => {
                if !value.fract().is_zero() {
                    return Err(err(format!("count '{raw}' is not a whole number")));
                }
                let count = value
                    .to_i64()
                    .ok_or_else(|| err(format!("count '{raw}' is out of range")))?;
                item.count = Some(count);
            }
            AmountColumn::CreditAmount => item.credit_amount = Some(value),
            AmountColumn::DebitAmount => item.debit_amount = Some(value),
            AmountColumn::TotalAmount => {
                item.total_amount = Some(match marker {
                    Some(Marker::Debit) => -value.abs(),
                    Some(Marker::Credit) => value.abs(),
                    None => value,
                });
            }
        }
    }
    Ok(item)
}

/// Remove a trailing CR/DB marker, whether printed as its own token or glued to the amount.
fn take_marker(tokens: &mut Vec<String>, layout: &ReportLayout) -> Option<Marker> {
    let last = tokens.last()?.to_ascii_uppercase();
    let credit = layout.credit_marker.to_ascii_uppercase();
    let debit = layout.debit_marker.to_ascii_uppercase();

    for (suffix, marker) in [(credit, Marker::Credit), (debit, Marker::Debit)] {
        if suffix.is_empty() {
            continue;
        }
        if last == suffix {
            tokens.pop();
            return Some(marker);
        }
        let glued = last
            .strip_suffix(suffix.as_str())
            .filter(|amount| parse_amount_token(amount).is_some());
        if let Some(amount) = glued {
            let amount = amount.to_string();
            if let Some(slot) = tokens.last_mut() {
                *slot = amount;
            }
            return Some(marker);
        }
    }
    None
}

/// Decimal with optional thousands separators; `(12.00)` reads as negative.
fn parse_amount_token(raw: &str) -> Option<Decimal> {
    match raw.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => parse_decimal(inner).map(|d| -d),
        None => parse_decimal(raw),
    }
}
