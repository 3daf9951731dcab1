//! Source documents and their fallback identity.
//!
//! Reports are expected under `.../reports/{Company}/{Year}/{file}.pdf`.
//! When the oracle cannot read the company name or reporting year off the
//! pages, the values derived here are used instead.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Reporting year used when neither the folder layout nor the filename
/// carries one.
pub const DEFAULT_REPORTING_YEAR: i32 = 2023;

/// Folder name that anchors the `{Company}/{Year}` convention.
const REPORTS_DIR: &str = "reports";

static RE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"202[0-9]").unwrap());
static RE_YEAR_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^202[0-9]").unwrap());

/// One source PDF plus its derived identity. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub path: PathBuf,
    pub filename: String,
    pub fallback_company: String,
    pub fallback_year: i32,
}

impl Document {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (fallback_company, fallback_year) = derive_identity(&path);
        Self {
            path,
            filename,
            fallback_company,
            fallback_year,
        }
    }
}

/// Derive `(company, year)` from the path.
fn derive_identity(path: &Path) -> (String, i32) {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let mut company = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
        .split('_')
        .next()
        .unwrap_or_default()
        .to_string();

    if let Some(idx) = parts.iter().position(|p| p == REPORTS_DIR) {
        if parts.len() > idx + 2 {
            company = parts[idx + 1].clone();
            let year_part = &parts[idx + 2];
            if !RE_YEAR_PREFIX.is_match(year_part) {
                return (company, DEFAULT_REPORTING_YEAR);
            }
            if let Ok(year) = year_part.parse::<i32>() {
                return (company, year);
            }
            // `2023-restated` and friends: keep the company, look at the filename.
        }
    }

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    let year = RE_YEAR
        .find(&filename)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(DEFAULT_REPORTING_YEAR);

    (company, year)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_convention_wins() {
        let doc = Document::from_path("/data/reports/AcmeCo/2022/annual_report.pdf");
        assert_eq!(doc.fallback_company, "AcmeCo");
        assert_eq!(doc.fallback_year, 2022);
        assert_eq!(doc.filename, "annual_report.pdf");
    }

    #[test]
    fn non_year_folder_keeps_default_year() {
        let doc = Document::from_path("reports/AcmeCo/archive/AcmeCo_2021.pdf");
        assert_eq!(doc.fallback_company, "AcmeCo");
        assert_eq!(doc.fallback_year, DEFAULT_REPORTING_YEAR);
    }

    #[test]
    fn unparseable_year_folder_falls_back_to_filename() {
        let doc = Document::from_path("reports/AcmeCo/2022-restated/acme_2021.pdf");
        assert_eq!(doc.fallback_company, "AcmeCo");
        assert_eq!(doc.fallback_year, 2021);
    }

    #[test]
    fn filename_year_without_reports_folder() {
        let doc = Document::from_path("/tmp/uploads/BetaCo_sustainability_2024.pdf");
        assert_eq!(doc.fallback_company, "BetaCo");
        assert_eq!(doc.fallback_year, 2024);
    }

    #[test]
    fn hard_default_when_nothing_matches() {
        let doc = Document::from_path("GammaInc.pdf");
        assert_eq!(doc.fallback_company, "GammaInc");
        assert_eq!(doc.fallback_year, DEFAULT_REPORTING_YEAR);
    }

    #[test]
    fn shallow_reports_folder_uses_filename_rules() {
        let doc = Document::from_path("reports/DeltaAG_2020.pdf");
        assert_eq!(doc.fallback_company, "DeltaAG");
        assert_eq!(doc.fallback_year, 2020);
    }
}
