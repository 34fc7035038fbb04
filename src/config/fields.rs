//! Field configuration: allowed values per canonical field and GL posting accounts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::report::columns;

/// Posting accounts for one report category.
///
/// `minor_type: None` applies to every MinorType under `major_type`; an exact match wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRule {
    pub major_type: String,
    #[serde(default)]
    pub minor_type: Option<String>,
    #[serde(default)]
    pub credit_account: Option<String>,
    #[serde(default)]
    pub debit_account: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Canonical field name → allowed values. A field with no entry (or an empty list) accepts
    /// any non-empty value.
    #[serde(default)]
    pub allowed: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub accounts: Vec<AccountRule>,
}

impl FieldConfig {
    /// Value sets used by the VSS-110 upload form.
    pub fn vss110() -> Self {
        let list = |values: &[&str]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>();

        let mut allowed = BTreeMap::new();
        allowed.insert(columns::REPORT_ID.to_string(), list(&["VSS-110"]));
        allowed.insert(
            columns::REPORTING_FOR.to_string(),
            list(&[
                "1000313555 BA INT",
                "1000313557 BA 463764 INT",
                "1000313559 BA 463766 INT",
                "1000313562 BA 463764 DOM",
                "1000513697 BIN 469343 INTL",
                "1000513698 BIN 469343 NNSS",
                "1000670630 BIN 403993 INTL",
                "1000670631 BIN 403993 NNSS",
                "1000728502 41993000 INTL",
                "1000728503 41993000 NNSS",
                "9000497680 435634 VDIRECT",
                "9000497681 435634 NW2",
                "9000497682 435634 SMSVROL",
                "9000497686 435634 ALL",
                "9000533759 405736 MVISAORI",
                "9000533760 405736 ALL",
                "9000533761 405736 NW2",
                "9000533762 405736 SMSVROL",
            ]),
        );
        allowed.insert(
            columns::TRANSACTION_TYPE.to_string(),
            list(&[
                "International Settlement Service",
                "Bangladesh National Net Service",
            ]),
        );
        allowed.insert(
            columns::ROLLUP_TO.to_string(),
            list(&[
                "1000313555 BA INT",
                "1000313560 BA DOM",
                "9000497680 435634 VDIRECT",
                "9000533759 405736 MVISAORI",
            ]),
        );
        allowed.insert(
            columns::FUNDS_XFER_ENTITY.to_string(),
            list(&["1000313555 BA INT", "1000313560 BA DOM"]),
        );
        allowed.insert(
            columns::SETTLEMENT_CURRENCY.to_string(),
            list(&["USD", "BDT"]),
        );
        allowed.insert(
            columns::MAJOR_TYPE.to_string(),
            list(&["Interchange", "Reimbursement", "Visa Charges", "Total"]),
        );
        allowed.insert(
            columns::MINOR_TYPE.to_string(),
            list(&["Acquirer", "Issuer", "Other", "Total", "Net Settlement Amount"]),
        );

        Self {
            allowed,
            accounts: Vec::new(),
        }
    }

    /// Configured value set for `field`, if it is restricted.
    pub fn allowed_values(&self, field: &str) -> Option<&[String]> {
        self.allowed
            .get(field)
            .map(|v| v.as_slice())
            .filter(|v| !v.is_empty())
    }

    /// Whether `value` is acceptable for `field`. Comparison is exact after trimming.
    pub fn accepts(&self, field: &str, value: &str) -> bool {
        match self.allowed_values(field) {
            Some(values) => values.iter().any(|v| v == value.trim()),
            None => !value.trim().is_empty(),
        }
    }

    /// Currencies a line item may override the header currency with.
    ///
    /// Falls back to the settlement currency value set.
    pub fn accepts_currency(&self, value: &str) -> bool {
        match self.allowed_values(columns::CURRENCY) {
            Some(_) => self.accepts(columns::CURRENCY, value),
            None => self.accepts(columns::SETTLEMENT_CURRENCY, value),
        }
    }

    /// Posting accounts for a category: `(credit_account, debit_account)`.
    pub fn accounts_for(
        &self,
        major_type: &str,
        minor_type: &str,
    ) -> (Option<String>, Option<String>) {
        let exact = self.accounts.iter().find(|r| {
            r.major_type == major_type && r.minor_type.as_deref() == Some(minor_type)
        });
        let fallback = || {
            self.accounts
                .iter()
                .find(|r| r.major_type == major_type && r.minor_type.is_none())
        };
        match exact.or_else(fallback) {
            Some(rule) => (rule.credit_account.clone(), rule.debit_account.clone()),
            None => (None, None),
        }
    }
}
