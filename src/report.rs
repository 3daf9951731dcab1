//! Validated per-document records.
//!
//! These are the wire contract with downstream consumers: field names and
//! nesting must stay stable. Every [`EsgReport`] is fully typed; a document
//! whose accumulator cannot be coerced into one produces no report at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An emissions measurement as reported, plus its canonical magnitude.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EmissionValue {
    /// Number as printed in the report.
    pub value: Option<f64>,
    /// Unit text as printed, e.g. `tCO2e`, `million tonnes`, `kt`.
    pub unit: Option<String>,
    /// `value` rescaled to plain tonnes from the unit text.
    #[serde(default)]
    pub normalized_value: Option<f64>,
}

/// One GHG reduction target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReductionTarget {
    /// Free text such as `30%` or `Net Zero`.
    pub target_reduction_percentage: Option<String>,
    pub target_year: i32,
    pub base_year: Option<i32>,
}

/// Where a report came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub company_name: String,
    pub reporting_year: i32,
    pub filename: String,
    pub timestamp: DateTime<Utc>,
}

/// A validated, normalised extraction result for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EsgReport {
    pub company_name: String,
    pub reporting_year: i32,
    pub scope_1: EmissionValue,
    pub scope_2_market: EmissionValue,
    pub assurance_present: bool,
    pub targets: Vec<ReductionTarget>,
    pub action_plan_summary: Option<String>,
    pub meta_data: SourceMetadata,
}

impl EsgReport {
    /// First target for `year`, if any.
    pub fn target_for(&self, year: i32) -> Option<&ReductionTarget> {
        self.targets.iter().find(|t| t.target_year == year)
    }
}
