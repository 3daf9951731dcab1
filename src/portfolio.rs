//! Portfolio view over an [`AggregateTable`]: per-company emissions trend
//! and analyst decision.

use crate::aggregate::{AggregateRow, AggregateTable};
use crate::decisions::{Decision, DecisionStore};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fewer rows than this and no trend is reported.
pub const MIN_YEARS_FOR_TREND: usize = 3;

/// Scope-1 growth (percent, first to last year) above which risk is high.
pub const HIGH_RISK_GROWTH_PCT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Scope-1 up by more than 10 %.
    High,
    /// Scope-1 up, but by 10 % or less.
    Medium,
    /// Scope-1 flat or down.
    Low,
    Insufficient,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::High => "high",
            RiskLevel::Medium => "medium",
            RiskLevel::Low => "low",
            RiskLevel::Insufficient => "insufficient",
        })
    }
}

/// Risk from the raw scope-1 trend of one company's rows.
///
/// Compares the earliest and latest years that report a scope-1 value. A
/// baseline that is not positive gives no meaningful trend.
pub fn assess_risk(rows: &[&AggregateRow]) -> RiskLevel {
    if rows.len() < MIN_YEARS_FOR_TREND {
        return RiskLevel::Insufficient;
    }
    let mut by_year: Vec<&AggregateRow> = rows.to_vec();
    by_year.sort_by_key(|r| r.reporting_year);

    let values: Vec<f64> = by_year.iter().filter_map(|r| r.scope_1_value).collect();
    let (Some(&first), Some(&last)) = (values.first(), values.last()) else {
        return RiskLevel::Insufficient;
    };
    if values.len() < 2 || first <= 0.0 {
        return RiskLevel::Insufficient;
    }

    let change_pct = (last - first) / first * 100.0;
    if change_pct > HIGH_RISK_GROWTH_PCT {
        RiskLevel::High
    } else if change_pct > 0.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// One company's slice of the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanySummary {
    pub name: String,
    pub years_available: Vec<i32>,
    pub years_count: usize,
    pub risk_level: RiskLevel,
    pub decision: Option<Decision>,
    pub latest_scope_1: Option<f64>,
    pub latest_scope_1_unit: Option<String>,
    pub latest_scope_2: Option<f64>,
    pub latest_scope_2_unit: Option<String>,
    pub has_assurance: bool,
    pub target_2030: Option<String>,
    pub action_plan: Option<String>,
    pub data: Vec<AggregateRow>,
}

/// Summary for `company`, or `None` when the table has no rows for it.
pub fn summarize_company(
    table: &AggregateTable,
    company: &str,
    decisions: &dyn DecisionStore,
) -> Option<CompanySummary> {
    let rows: Vec<&AggregateRow> = table.rows_for(company).collect();
    // First of the most recent year's rows.
    let latest = rows.iter().rev().max_by_key(|r| r.reporting_year)?;

    let mut years: Vec<i32> = rows.iter().map(|r| r.reporting_year).collect();
    years.sort_unstable();

    Some(CompanySummary {
        name: company.to_string(),
        years_count: years.len(),
        years_available: years,
        risk_level: assess_risk(&rows),
        decision: decisions.get(company),
        latest_scope_1: latest.scope_1_value,
        latest_scope_1_unit: latest.scope_1_unit.clone(),
        latest_scope_2: latest.scope_2_market_value,
        latest_scope_2_unit: latest.scope_2_market_unit.clone(),
        has_assurance: latest.assurance_present,
        target_2030: latest.target_2030_pct.clone(),
        action_plan: latest.action_plan_summary.clone(),
        data: rows.into_iter().cloned().collect(),
    })
}

/// Summaries for every company in the table, ordered by name.
pub fn summarize_companies(
    table: &AggregateTable,
    decisions: &dyn DecisionStore,
) -> Vec<CompanySummary> {
    table
        .companies()
        .into_iter()
        .filter(|c| !c.is_empty())
        .filter_map(|c| summarize_company(table, c, decisions))
        .collect()
}
