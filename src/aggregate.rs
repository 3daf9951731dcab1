//! The batch table: one flat row per validated record.
//!
//! Column names and order are fixed; downstream spreadsheets key on them.
//! Rows are sorted by company, then reporting year, regardless of the order
//! in which documents finished.

use crate::error::EsgError;
use crate::output::write_atomic;
use crate::report::EsgReport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Target year surfaced in the `Target_2030_*` columns.
pub const FOCUS_TARGET_YEAR: i32 = 2030;

/// Raw scope-1 value above which a row is flagged.
pub const HIGH_SCOPE1_THRESHOLD: f64 = 50_000_000.0;

pub const HIGH_SCOPE1_FLAG: &str = "Warning: High S1";

pub const COLUMNS: [&str; 13] = [
    "Company",
    "Reporting_Year",
    "Scope_1_Value",
    "Scope_1_Unit",
    "Scope_1_Calculated",
    "Scope_2_Market_Value",
    "Scope_2_Market_Unit",
    "Scope_2_Calculated",
    "Assurance_Present",
    "Target_2030_Pct",
    "Target_Base_Year",
    "Action_Plan_Summary",
    "Flags",
];

/// One row of the aggregate table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Reporting_Year")]
    pub reporting_year: i32,
    #[serde(rename = "Scope_1_Value")]
    pub scope_1_value: Option<f64>,
    #[serde(rename = "Scope_1_Unit")]
    pub scope_1_unit: Option<String>,
    #[serde(rename = "Scope_1_Calculated")]
    pub scope_1_calculated: Option<f64>,
    #[serde(rename = "Scope_2_Market_Value")]
    pub scope_2_market_value: Option<f64>,
    #[serde(rename = "Scope_2_Market_Unit")]
    pub scope_2_market_unit: Option<String>,
    #[serde(rename = "Scope_2_Calculated")]
    pub scope_2_calculated: Option<f64>,
    #[serde(rename = "Assurance_Present")]
    pub assurance_present: bool,
    #[serde(rename = "Target_2030_Pct")]
    pub target_2030_pct: Option<String>,
    #[serde(rename = "Target_Base_Year")]
    pub target_base_year: Option<i32>,
    #[serde(rename = "Action_Plan_Summary")]
    pub action_plan_summary: Option<String>,
    /// `"; "`-joined warnings, empty when none apply.
    #[serde(rename = "Flags")]
    pub flags: String,
}

impl From<&EsgReport> for AggregateRow {
    fn from(r: &EsgReport) -> Self {
        let focus = r.target_for(FOCUS_TARGET_YEAR);
        let mut flags = Vec::new();
        if r.scope_1.value.is_some_and(|v| v > HIGH_SCOPE1_THRESHOLD) {
            flags.push(HIGH_SCOPE1_FLAG);
        }

        Self {
            company: r.company_name.clone(),
            reporting_year: r.reporting_year,
            scope_1_value: r.scope_1.value,
            scope_1_unit: r.scope_1.unit.clone(),
            scope_1_calculated: r.scope_1.normalized_value,
            scope_2_market_value: r.scope_2_market.value,
            scope_2_market_unit: r.scope_2_market.unit.clone(),
            scope_2_calculated: r.scope_2_market.normalized_value,
            assurance_present: r.assurance_present,
            target_2030_pct: focus.and_then(|t| t.target_reduction_percentage.clone()),
            target_base_year: focus.and_then(|t| t.base_year),
            action_plan_summary: r.action_plan_summary.clone(),
            flags: flags.join("; "),
        }
    }
}

impl AggregateRow {
    fn cells(&self) -> [String; 13] {
        [
            self.company.clone(),
            self.reporting_year.to_string(),
            num_cell(self.scope_1_value),
            self.scope_1_unit.clone().unwrap_or_default(),
            num_cell(self.scope_1_calculated),
            num_cell(self.scope_2_market_value),
            self.scope_2_market_unit.clone().unwrap_or_default(),
            num_cell(self.scope_2_calculated),
            bool_cell(self.assurance_present).to_string(),
            self.target_2030_pct.clone().unwrap_or_default(),
            self.target_base_year.map(|y| y.to_string()).unwrap_or_default(),
            self.action_plan_summary.clone().unwrap_or_default(),
            self.flags.clone(),
        ]
    }

    fn from_cells(cells: &[String], line: usize) -> Result<Self, EsgError> {
        let get = |i: usize| cells.get(i).map(String::as_str).unwrap_or("");
        let text = |i: usize| Some(get(i).to_string()).filter(|s| !s.is_empty());
        let bad = |col: &str, v: &str| {
            EsgError::Internal(format!("CSV line {line}: bad {col} value {v:?}"))
        };
        let num = |i: usize| -> Result<Option<f64>, EsgError> {
            match get(i) {
                "" => Ok(None),
                v => v.parse().map(Some).map_err(|_| bad(COLUMNS[i], v)),
            }
        };

        Ok(Self {
            company: get(0).to_string(),
            reporting_year: get(1).parse().map_err(|_| bad(COLUMNS[1], get(1)))?,
            scope_1_value: num(2)?,
            scope_1_unit: text(3),
            scope_1_calculated: num(4)?,
            scope_2_market_value: num(5)?,
            scope_2_market_unit: text(6),
            scope_2_calculated: num(7)?,
            assurance_present: get(8).eq_ignore_ascii_case("true"),
            target_2030_pct: text(9),
            target_base_year: match get(10) {
                "" => None,
                v => Some(
                    v.parse::<f64>()
                        .ok()
                        .filter(|y| y.fract() == 0.0)
                        .map(|y| y as i32)
                        .ok_or_else(|| bad(COLUMNS[10], v))?,
                ),
            },
            action_plan_summary: text(11),
            flags: get(12).to_string(),
        })
    }
}

/// The sorted batch table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateTable {
    rows: Vec<AggregateRow>,
}

/// Flatten `records` into a table sorted by `(company, year)`.
///
/// # Errors
/// [`EsgError::NoRecords`] when `records` is empty; an empty table is never
/// a successful result.
pub fn aggregate(records: &[EsgReport]) -> Result<AggregateTable, EsgError> {
    if records.is_empty() {
        return Err(EsgError::NoRecords {
            total: 0,
            first_error: "no validated records to aggregate".to_string(),
        });
    }
    Ok(AggregateTable::from_rows(
        records.iter().map(AggregateRow::from).collect(),
    ))
}

impl AggregateTable {
    /// Sort `rows` into table order. The sort is stable: duplicate
    /// `(company, year)` pairs keep their relative order.
    pub fn from_rows(mut rows: Vec<AggregateRow>) -> Self {
        rows.sort_by(|a, b| {
            a.company
                .cmp(&b.company)
                .then(a.reporting_year.cmp(&b.reporting_year))
        });
        Self { rows }
    }

    pub fn rows(&self) -> &[AggregateRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn companies(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|r| r.company.as_str()).collect()
    }

    /// Rows for one company, in year order.
    pub fn rows_for<'a>(&'a self, company: &'a str) -> impl Iterator<Item = &'a AggregateRow> {
        self.rows.iter().filter(move |r| r.company == company)
    }

    /// Render as CSV: header line, then one line per row.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        push_record(&mut out, COLUMNS.iter().copied());
        for row in &self.rows {
            push_record(&mut out, row.cells().iter().map(String::as_str));
        }
        out
    }

    /// Parse a CSV written by [`to_csv`](Self::to_csv). Columns are matched
    /// by header name, so extra or reordered columns are tolerated.
    pub fn from_csv(input: &str) -> Result<Self, EsgError> {
        let mut records = parse_csv(input)?.into_iter();
        let Some(header) = records.next() else {
            return Ok(Self::default());
        };
        let positions: Vec<Option<usize>> = COLUMNS
            .iter()
            .map(|c| header.iter().position(|h| h.trim() == *c))
            .collect();
        if positions[0].is_none() || positions[1].is_none() {
            return Err(EsgError::Internal(
                "CSV header lacks Company/Reporting_Year".into(),
            ));
        }

        let mut rows = Vec::new();
        for (i, record) in records.enumerate() {
            if record.iter().all(|c| c.is_empty()) {
                continue;
            }
            let cells: Vec<String> = positions
                .iter()
                .map(|p| p.and_then(|p| record.get(p).cloned()).unwrap_or_default())
                .collect();
            rows.push(AggregateRow::from_cells(&cells, i + 2)?);
        }
        Ok(Self::from_rows(rows))
    }

    /// Write the whole table to `path`, replacing any previous file.
    pub async fn write_csv(&self, path: &Path) -> Result<(), EsgError> {
        write_atomic(path, self.to_csv().as_bytes())
            .await
            .map_err(|e| EsgError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })
    }

    pub async fn read_csv(path: &Path) -> Result<Self, EsgError> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EsgError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => EsgError::Internal(format!("reading {}: {e}", path.display())),
        })?;
        Self::from_csv(&text)
    }
}

// ── CSV ──────────────────────────────────────────────────────────────────

fn num_cell(v: Option<f64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_default()
}

fn bool_cell(b: bool) -> &'static str {
    if b {
        "True"
    } else {
        "False"
    }
}

fn push_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push('\n');
}

/// RFC 4180 reader: quoted fields may hold commas, doubled quotes and
/// newlines. Accepts `\n` and `\r\n` line endings.
fn parse_csv(input: &str) -> Result<Vec<Vec<String>>, EsgError> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                c => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            c => field.push(c),
        }
    }

    if in_quotes {
        return Err(EsgError::Internal("CSV ends inside a quoted field".into()));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}
