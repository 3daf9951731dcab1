//! Final validation and unit normalisation.
//!
//! The accumulator is untyped; an [`EsgReport`] is not. Coercion here is
//! strict: a field that is *absent* takes its default (null, `false`, empty
//! list), but a field that is *present with the wrong type* rejects the whole
//! document. No partially-typed record is ever emitted.

use crate::pipeline::merge::RequiredField;
use crate::report::{EmissionValue, EsgReport, ReductionTarget, SourceMetadata};
use crate::schema::{FieldValue, Record};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// A present field that could not be coerced to its schema type.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: expected {expected}, got {found}")]
pub struct CoercionError {
    pub field: String,
    pub expected: &'static str,
    pub found: String,
}

impl CoercionError {
    fn new(field: impl Into<String>, expected: &'static str, found: &FieldValue) -> Self {
        let found = match found {
            FieldValue::Text(s) => format!("string {s:?}"),
            FieldValue::Number(n) => format!("number {n}"),
            other => other.kind().to_string(),
        };
        Self {
            field: field.into(),
            expected,
            found,
        }
    }
}

static RE_MT_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bmt\b").unwrap());

/// Rescale `value` to plain tonnes according to its unit text.
///
/// `million` / `mmt` / `megatonnes` / a standalone `mt` → × 1,000,000;
/// `thousand` / `kt` → × 1,000; anything else is returned unchanged.
pub fn normalize(value: f64, unit: &str) -> f64 {
    let unit = unit.trim().to_lowercase();
    if ["million", "mmt", "megatonnes"].iter().any(|u| unit.contains(u))
        || RE_MT_TOKEN.is_match(&unit)
    {
        value * 1_000_000.0
    } else if ["thousand", "kt"].iter().any(|u| unit.contains(u)) {
        value * 1_000.0
    } else {
        value
    }
}

/// Company and year for logs and file names: oracle values when usable,
/// document-derived fallbacks otherwise. Never fails.
pub fn resolve_identity(
    accumulator: &Record,
    fallback_company: &str,
    fallback_year: i32,
) -> (String, i32) {
    let company = accumulator
        .get("company_name")
        .and_then(FieldValue::as_text)
        .filter(|s| !s.trim().is_empty())
        .map_or_else(|| fallback_company.to_string(), |s| s.trim().to_string());
    let year = accumulator
        .get("reporting_year")
        .and_then(|v| int_opt("reporting_year", Some(v)).ok().flatten())
        .filter(|y| *y != 0)
        .unwrap_or(fallback_year);
    (company, year)
}

/// Coerce an accumulator into a typed [`EsgReport`].
pub fn validate(
    accumulator: &Record,
    fallback_company: &str,
    fallback_year: i32,
    filename: &str,
) -> Result<EsgReport, CoercionError> {
    let company = text_opt("company_name", accumulator.get("company_name"))?
        .filter(|s| !s.trim().is_empty())
        .map_or_else(|| fallback_company.to_string(), |s| s.trim().to_string());
    let year = int_opt("reporting_year", accumulator.get("reporting_year"))?
        .filter(|y| *y != 0)
        .unwrap_or(fallback_year);

    Ok(EsgReport {
        company_name: company.clone(),
        reporting_year: year,
        scope_1: emission("scope_1", accumulator.get("scope_1"))?,
        scope_2_market: emission("scope_2_market", accumulator.get("scope_2_market"))?,
        assurance_present: boolean("assurance_present", accumulator.get("assurance_present"))?,
        targets: targets(accumulator.get("targets"))?,
        action_plan_summary: text_opt("action_plan_summary", accumulator.get("action_plan_summary"))?,
        meta_data: SourceMetadata {
            company_name: company,
            reporting_year: year,
            filename: filename.to_string(),
            timestamp: Utc::now(),
        },
    })
}

fn text_opt(field: &str, value: Option<&FieldValue>) -> Result<Option<String>, CoercionError> {
    match value {
        None | Some(FieldValue::Null) => Ok(None),
        Some(FieldValue::Text(s)) => Ok(Some(s.clone())),
        Some(other) => Err(CoercionError::new(field, "string", other)),
    }
}

fn int_opt(field: &str, value: Option<&FieldValue>) -> Result<Option<i32>, CoercionError> {
    let bad = |v: &FieldValue| CoercionError::new(field, "integer", v);
    match value {
        None | Some(FieldValue::Null) => Ok(None),
        Some(v @ FieldValue::Number(n)) => {
            if n.fract() == 0.0 && *n >= i32::MIN as f64 && *n <= i32::MAX as f64 {
                Ok(Some(*n as i32))
            } else {
                Err(bad(v))
            }
        }
        Some(v @ FieldValue::Text(s)) => s.trim().parse::<i32>().map(Some).map_err(|_| bad(v)),
        Some(other) => Err(bad(other)),
    }
}

fn number_opt(field: &str, value: Option<&FieldValue>) -> Result<Option<f64>, CoercionError> {
    match value {
        None | Some(FieldValue::Null) => Ok(None),
        Some(FieldValue::Number(n)) => Ok(Some(*n)),
        Some(v @ FieldValue::Text(s)) => {
            let cleaned: String = s.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
            if cleaned.is_empty() {
                return Ok(None);
            }
            cleaned
                .parse::<f64>()
                .map(Some)
                .map_err(|_| CoercionError::new(field, "number", v))
        }
        Some(other) => Err(CoercionError::new(field, "number", other)),
    }
}

/// Booleans only; `"true"`/`"false"` spelled out are accepted, nothing else.
fn boolean(field: &str, value: Option<&FieldValue>) -> Result<bool, CoercionError> {
    match value {
        None | Some(FieldValue::Null) => Ok(false),
        Some(FieldValue::Bool(b)) => Ok(*b),
        Some(v @ FieldValue::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(CoercionError::new(field, "boolean", v)),
        },
        Some(other) => Err(CoercionError::new(field, "boolean", other)),
    }
}

fn emission(field: &str, value: Option<&FieldValue>) -> Result<EmissionValue, CoercionError> {
    let obj = match value {
        None | Some(FieldValue::Null) => return Ok(EmissionValue::default()),
        Some(FieldValue::Object(obj)) => obj,
        Some(other) => return Err(CoercionError::new(field, "object", other)),
    };
    let value = number_opt(&format!("{field}.value"), obj.get("value"))?;
    let unit = text_opt(&format!("{field}.unit"), obj.get("unit"))?;
    let normalized_value = value.map(|v| unit.as_deref().map_or(v, |u| normalize(v, u)));
    Ok(EmissionValue {
        value,
        unit,
        normalized_value,
    })
}

fn targets(value: Option<&FieldValue>) -> Result<Vec<ReductionTarget>, CoercionError> {
    let field = RequiredField::Targets.path();
    let items = match value {
        None | Some(FieldValue::Null) => return Ok(Vec::new()),
        Some(FieldValue::List(items)) => items,
        Some(other) => return Err(CoercionError::new(field, "list", other)),
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let prefix = format!("{field}[{i}]");
            let FieldValue::Object(obj) = item else {
                return Err(CoercionError::new(prefix, "object", item));
            };
            let year_field = format!("{prefix}.target_year");
            let target_year = match int_opt(&year_field, obj.get("target_year"))? {
                Some(y) => y,
                None => {
                    return Err(CoercionError::new(
                        year_field,
                        "integer",
                        obj.get("target_year").unwrap_or(&FieldValue::Null),
                    ))
                }
            };
            Ok(ReductionTarget {
                target_reduction_percentage: text_opt(
                    &format!("{prefix}.target_reduction_percentage"),
                    obj.get("target_reduction_percentage"),
                )?,
                target_year,
                base_year: int_opt(&format!("{prefix}.base_year"), obj.get("base_year"))?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emission_obj(value: impl Into<FieldValue>, unit: &str) -> FieldValue {
        Record::new().with("value", value).with("unit", unit).into()
    }

    fn target(year: impl Into<FieldValue>) -> FieldValue {
        Record::new()
            .with("target_year", year)
            .with("target_reduction_percentage", "30%")
            .with("base_year", 2019.0)
            .into()
    }

    #[test]
    fn normalisation_examples() {
        assert_eq!(normalize(3.2, "million tonnes"), 3_200_000.0);
        assert_eq!(normalize(50.0, "kt"), 50_000.0);
        assert_eq!(normalize(12.0, "tCO2e"), 12.0);
        assert_eq!(normalize(7.5, "not-a-number-unit"), 7.5);
    }

    #[test]
    fn normalisation_unit_variants() {
        assert_eq!(normalize(2.0, "Mt CO2e"), 2_000_000.0);
        assert_eq!(normalize(2.0, "megatonnes"), 2_000_000.0);
        assert_eq!(normalize(2.0, "MMT"), 2_000_000.0);
        assert_eq!(normalize(2.0, "thousand tonnes"), 2_000.0);
        assert_eq!(normalize(2.0, "ktCO2e"), 2_000.0);
        // "mt" only counts as a standalone token.
        assert_eq!(normalize(2.0, "mtco2e"), 2.0);
    }

    #[test]
    fn empty_accumulator_validates_with_fallbacks() {
        let report = validate(&Record::new(), "AcmeCo", 2022, "acme.pdf").unwrap();
        assert_eq!(report.company_name, "AcmeCo");
        assert_eq!(report.reporting_year, 2022);
        assert_eq!(report.scope_1, EmissionValue::default());
        assert_eq!(report.scope_2_market.value, None);
        assert!(!report.assurance_present);
        assert!(report.targets.is_empty());
        assert_eq!(report.meta_data.filename, "acme.pdf");
    }

    #[test]
    fn oracle_identity_preferred_over_fallback() {
        let acc = Record::new()
            .with("company_name", "Acme Holdings")
            .with("reporting_year", 2021.0);
        let report = validate(&acc, "AcmeCo", 2022, "acme.pdf").unwrap();
        assert_eq!(report.company_name, "Acme Holdings");
        assert_eq!(report.reporting_year, 2021);
        assert_eq!(report.meta_data.company_name, "Acme Holdings");
        assert_eq!(resolve_identity(&acc, "AcmeCo", 2022), ("Acme Holdings".into(), 2021));
    }

    #[test]
    fn full_record_is_typed_and_normalised() {
        let acc = Record::new()
            .with("company_name", "BetaCo")
            .with("reporting_year", "2023")
            .with("scope_1", emission_obj(3.2, "million tonnes"))
            .with("scope_2_market", emission_obj("923,832", "tCO2e"))
            .with("assurance_present", true)
            .with("targets", vec![target(2030.0)])
            .with("action_plan_summary", "Electrify fleet");
        let report = validate(&acc, "x", 2000, "beta.pdf").unwrap();

        assert_eq!(report.reporting_year, 2023);
        assert_eq!(report.scope_1.value, Some(3.2));
        assert_eq!(report.scope_1.normalized_value, Some(3_200_000.0));
        assert_eq!(report.scope_2_market.value, Some(923_832.0));
        assert_eq!(report.scope_2_market.normalized_value, Some(923_832.0));
        assert!(report.assurance_present);
        assert_eq!(report.targets[0].target_year, 2030);
        assert_eq!(report.targets[0].base_year, Some(2019));
        assert_eq!(report.action_plan_summary.as_deref(), Some("Electrify fleet"));
    }

    #[test]
    fn truthy_string_is_not_a_boolean() {
        let acc = Record::new().with("assurance_present", "yes");
        let err = validate(&acc, "A", 2022, "a.pdf").unwrap_err();
        assert_eq!(err.field, "assurance_present");
        assert_eq!(err.expected, "boolean");
    }

    #[test]
    fn spelled_out_boolean_is_accepted() {
        let acc = Record::new().with("assurance_present", "False");
        assert!(!validate(&acc, "A", 2022, "a.pdf").unwrap().assurance_present);
    }

    #[test]
    fn fractional_year_is_rejected() {
        let acc = Record::new().with("reporting_year", 2022.5);
        let err = validate(&acc, "A", 2022, "a.pdf").unwrap_err();
        assert_eq!(err.field, "reporting_year");
    }

    #[test]
    fn target_without_year_rejects_document() {
        let acc = Record::new().with("targets", vec![target(FieldValue::Null)]);
        let err = validate(&acc, "A", 2022, "a.pdf").unwrap_err();
        assert_eq!(err.field, "targets[0].target_year");
    }

    #[test]
    fn target_with_text_year_is_rejected() {
        let acc = Record::new().with("targets", vec![target("by 2030")]);
        assert!(validate(&acc, "A", 2022, "a.pdf").is_err());
    }

    #[test]
    fn scalar_emission_is_rejected() {
        let acc = Record::new().with("scope_1", 12.0);
        let err = validate(&acc, "A", 2022, "a.pdf").unwrap_err();
        assert_eq!(err.field, "scope_1");
        assert_eq!(err.expected, "object");
    }

    #[test]
    fn malformed_emission_text_is_rejected() {
        let acc = Record::new().with("scope_1", emission_obj("approx. 40k", "t"));
        let err = validate(&acc, "A", 2022, "a.pdf").unwrap_err();
        assert_eq!(err.field, "scope_1.value");
    }

    #[test]
    fn numeric_company_name_is_rejected() {
        let acc = Record::new().with("company_name", 42.0);
        assert!(validate(&acc, "A", 2022, "a.pdf").is_err());
        // Logging still gets an identity.
        assert_eq!(resolve_identity(&acc, "A", 2022), ("A".into(), 2022));
    }

    #[test]
    fn zero_year_falls_back() {
        let acc = Record::new().with("reporting_year", 0.0);
        assert_eq!(validate(&acc, "A", 2022, "a.pdf").unwrap().reporting_year, 2022);
    }
}
