//! Declarative configuration for the pipeline.
//!
//! Nothing about the report text format or the accepted field values is hard-coded in the parser
//! or the schema mapper. Both read a [`PipelineConfig`]:
//!
//! - [`ReportLayout`]: how to recognize header, section, item, and total lines (versioned)
//! - [`FieldConfig`]: allowed values per canonical field, plus GL posting accounts per category
//! - [`ValidationPolicy`]: whether out-of-enumeration values reject the report or are flagged
//!
//! [`PipelineConfig::default`] is the built-in VSS-110 configuration. Deployments that receive a
//! different layout revision load theirs from JSON:
//!
//! ```no_run
//! use settlement_pipeline::config::PipelineConfig;
//!
//! # fn main() -> Result<(), settlement_pipeline::ReportError> {
//! let config = PipelineConfig::from_path("config/vss-110.json")?;
//! println!("layout version {}", config.layout.version);
//! # Ok(())
//! # }
//! ```

pub mod fields;
pub mod layout;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ReportResult;

pub use fields::{AccountRule, FieldConfig};
pub use layout::{AmountColumn, HeaderLabel, LineLabel, ReportLayout, SectionLabel};

/// What to do with a value outside its configured enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Reject the report with [`crate::ReportError::Validation`].
    #[default]
    Strict,
    /// Keep the value and record a [`crate::ValidationError`] flag on the parsed report.
    Lenient,
}

/// Complete configuration consumed by [`crate::pipeline::parse_report`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub layout: ReportLayout,
    pub fields: FieldConfig,
    #[serde(default)]
    pub policy: ValidationPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            layout: ReportLayout::vss110(),
            fields: FieldConfig::vss110(),
            policy: ValidationPolicy::Strict,
        }
    }
}

impl PipelineConfig {
    /// Deserialize and validate a configuration from JSON text.
    pub fn from_json_str(input: &str) -> ReportResult<Self> {
        let config: PipelineConfig = serde_json::from_str(input)?;
        config.layout.validate()?;
        Ok(config)
    }

    /// Read a configuration file (JSON).
    pub fn from_path(path: impl AsRef<Path>) -> ReportResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Same configuration with a different validation policy.
    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }
}
