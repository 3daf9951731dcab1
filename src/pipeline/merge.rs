//! Fill-only merging of partial guesses, and the completeness check that
//! decides whether another scan attempt is needed.
//!
//! Attempts are applied in chronological order and a filled field is never
//! overwritten, so the first attempt that finds a value wins. Later attempts
//! can only fill gaps.

use crate::schema::{FieldValue, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A field whose absence forces another extraction attempt.
///
/// Other schema fields (assurance flag, action-plan summary) are
/// nice-to-have and never trigger a further attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RequiredField {
    CompanyName,
    Scope1,
    Scope2,
    Targets,
}

impl RequiredField {
    pub const ALL: [RequiredField; 4] = [
        RequiredField::CompanyName,
        RequiredField::Scope1,
        RequiredField::Scope2,
        RequiredField::Targets,
    ];

    /// Human-readable label, as shown to the oracle in the steering hint.
    pub fn label(self) -> &'static str {
        match self {
            RequiredField::CompanyName => "Company Name",
            RequiredField::Scope1 => "Scope 1",
            RequiredField::Scope2 => "Scope 2",
            RequiredField::Targets => "Targets",
        }
    }

    /// Dotted path of the field inside an accumulator.
    pub fn path(self) -> &'static str {
        match self {
            RequiredField::CompanyName => "company_name",
            RequiredField::Scope1 => "scope_1.value",
            RequiredField::Scope2 => "scope_2_market.value",
            RequiredField::Targets => "targets",
        }
    }

    /// The full required set; what is missing before any attempt.
    pub fn all() -> BTreeSet<RequiredField> {
        Self::ALL.into_iter().collect()
    }
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fold `guess` into `accumulator`, filling only what is absent or empty.
///
/// * absent/empty in the accumulator → adopt the guess's value
/// * both nested objects → recurse with the same rule
/// * both lists → adopt the guess's list only when ours is empty
///   (no element-wise union)
///
/// Order matters: `merge(merge(a, b), c)` is not `merge(merge(a, c), b)`.
pub fn merge(accumulator: Record, guess: Record) -> Record {
    let mut merged = accumulator;
    for (key, incoming) in guess {
        match merged.entry_mut(&key) {
            None => merged.insert(key, incoming),
            Some(existing) if existing.is_empty() => *existing = incoming,
            Some(FieldValue::Object(current)) => {
                if let FieldValue::Object(new) = incoming {
                    let inner = std::mem::take(current);
                    *current = merge(inner, new);
                }
            }
            // Non-empty lists and scalars stay as they are.
            Some(_) => {}
        }
    }
    merged
}

/// Which required fields are still unfilled in `accumulator`.
///
/// A numeric value of zero counts as missing; a list counts only when it has
/// at least one entry.
pub fn missing_fields(accumulator: &Record) -> BTreeSet<RequiredField> {
    RequiredField::ALL
        .into_iter()
        .filter(|field| {
            accumulator
                .get_path(field.path())
                .is_none_or(FieldValue::is_empty)
        })
        .collect()
}

/// Render a missing set as `["Scope 1", "Targets"]` for prompts and logs.
pub fn format_missing(missing: &BTreeSet<RequiredField>) -> String {
    let labels: Vec<String> = missing.iter().map(|f| format!("'{}'", f.label())).collect();
    format!("[{}]", labels.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emission(value: f64, unit: &str) -> FieldValue {
        Record::new().with("value", value).with("unit", unit).into()
    }

    fn target(year: f64) -> FieldValue {
        Record::new()
            .with("target_year", year)
            .with("target_reduction_percentage", "30%")
            .into()
    }

    fn complete() -> Record {
        Record::new()
            .with("company_name", "Acme")
            .with("scope_1", emission(100.0, "tCO2e"))
            .with("scope_2_market", emission(200.0, "tCO2e"))
            .with("targets", vec![target(2030.0)])
    }

    #[test]
    fn empty_accumulator_adopts_everything() {
        let merged = merge(Record::new(), complete());
        assert_eq!(merged, complete());
    }

    #[test]
    fn filled_fields_are_never_overwritten() {
        let first = Record::new().with("company_name", "Acme");
        let second = Record::new().with("company_name", "Acme Holdings plc");
        let merged = merge(first, second);
        assert_eq!(merged.get("company_name"), Some(&FieldValue::from("Acme")));
    }

    #[test]
    fn null_fields_are_filled() {
        let first = Record::new().with("company_name", FieldValue::Null);
        let second = Record::new().with("company_name", "Acme");
        let merged = merge(first, second);
        assert_eq!(merged.get("company_name"), Some(&FieldValue::from("Acme")));
    }

    #[test]
    fn nested_objects_merge_field_by_field() {
        let first = Record::new().with(
            "scope_1",
            Record::new()
                .with("value", FieldValue::Null)
                .with("unit", "tCO2e"),
        );
        let second = Record::new().with("scope_1", emission(5.0, "kt"));
        let merged = merge(first, second);
        assert_eq!(merged.get_path("scope_1.value"), Some(&FieldValue::Number(5.0)));
        assert_eq!(merged.get_path("scope_1.unit"), Some(&FieldValue::from("tCO2e")));
    }

    #[test]
    fn non_empty_target_list_is_kept_whole() {
        let first = Record::new().with("targets", vec![target(2030.0)]);
        let second = Record::new().with("targets", vec![target(2040.0), target(2050.0)]);
        let merged = merge(first.clone(), second);
        assert_eq!(merged, first);
    }

    #[test]
    fn empty_target_list_is_replaced() {
        let first = Record::new().with("targets", FieldValue::List(vec![]));
        let second = Record::new().with("targets", vec![target(2040.0)]);
        let merged = merge(first, second.clone());
        assert_eq!(merged, second);
    }

    #[test]
    fn merge_is_idempotent() {
        let a = complete().with("action_plan_summary", "Solar rollout");
        assert_eq!(merge(a.clone(), a.clone()), a);
    }

    #[test]
    fn order_of_application_matters() {
        let a = Record::new().with("company_name", "A");
        let b = Record::new().with("company_name", "B");
        assert_ne!(merge(a.clone(), b.clone()), merge(b, a));
    }

    #[test]
    fn everything_missing_from_empty_record() {
        assert_eq!(missing_fields(&Record::new()), RequiredField::all());
    }

    #[test]
    fn nothing_missing_from_complete_record() {
        assert!(missing_fields(&complete()).is_empty());
    }

    #[test]
    fn zero_emission_counts_as_missing() {
        let record = complete().with("scope_2_market", emission(0.0, "tCO2e"));
        let missing = missing_fields(&record);
        assert_eq!(missing.into_iter().collect::<Vec<_>>(), vec![RequiredField::Scope2]);
    }

    #[test]
    fn empty_target_list_counts_as_missing() {
        let record = complete().with("targets", FieldValue::List(vec![]));
        assert!(missing_fields(&record).contains(&RequiredField::Targets));
    }

    #[test]
    fn optional_fields_never_reported() {
        let record = complete().with("assurance_present", false);
        assert!(missing_fields(&record).is_empty());
    }

    #[test]
    fn format_missing_lists_labels() {
        let missing: BTreeSet<_> = [RequiredField::Scope2, RequiredField::Targets].into();
        assert_eq!(format_missing(&missing), "['Scope 2', 'Targets']");
    }
}
