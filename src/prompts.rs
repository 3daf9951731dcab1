//! Prompts for the extraction oracle.
//!
//! The system prompt fixes the task and the JSON shape; the per-attempt user
//! text is where iterative deepening happens. From the second attempt on it
//! names the fields still missing so the model looks for exactly those on
//! the fresh batch of pages.
//!
//! Callers can override the system prompt via
//! [`crate::config::ExtractionConfig::system_prompt`].

use crate::pipeline::merge::{format_missing, RequiredField};
use std::collections::BTreeSet;

/// Default system prompt: the metrics to extract and the JSON schema.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert ESG Data Analyst. Extract specific sustainability metrics from the annual report.

TASK:
Extract ONLY the following fields:
1. **Company Name**: The name of the company that published this report.
2. **Reporting Year**: The year covered by the report (e.g. 2023).
3. **Scope 1 Emissions**: Direct GHG emissions. Extract value and unit. (e.g. 482123, tCO2e).
4. **Scope 2 Emissions (Market-Based)**: Indirect GHG emissions. Extract value and unit. (e.g. 923832, tCO2e).
5. **Assurance**: Boolean. True if "Limited" or "Reasonable" external assurance is explicitly stated. False otherwise.
6. **Targets**: GHG reduction targets. Extract target value (e.g. "30% reduction") and year (e.g. 2030).
7. **Action Plans**: A summary of planned actions/strategies (e.g. "Investing in renewable energy...").

RULES:
- Normalize values: If text says "3.2 million tonnes", value should be 3200000.
- IGNORE Location-Based Scope 2.
- IGNORE Scope 3.
- For company name, extract the actual company/organization name from the report cover or header.
- Use null for anything the pages do not show. Never guess.

OUTPUT FORMAT:
Return strictly valid JSON (no prose, no code fences) matching exactly this schema:
{
  "company_name": <str>,
  "reporting_year": <int>,
  "scope_1": { "value": <float>, "unit": <str> },
  "scope_2_market": { "value": <float>, "unit": <str> },
  "assurance_present": <bool>,
  "targets": [
      { "target_reduction_percentage": <str>, "target_year": <int>, "base_year": <int> }
  ],
  "action_plan_summary": <str>
}"#;

/// Instruction sent with every batch of page images.
pub const TASK_INSTRUCTION: &str =
    "Analyze this sustainability/annual report and extract ESG data.";

/// Steering text appended on attempts after the first.
pub fn missing_fields_hint(missing: &BTreeSet<RequiredField>) -> String {
    format!(
        " We previously found some data but are MISSING: {}. \
Please check these new pages specifically for these missing fields.",
        format_missing(missing)
    )
}

/// Full user text for one attempt.
pub fn user_instruction(missing: Option<&BTreeSet<RequiredField>>) -> String {
    match missing {
        Some(m) if !m.is_empty() => format!("{TASK_INSTRUCTION}{}", missing_fields_hint(m)),
        _ => TASK_INSTRUCTION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_has_no_hint() {
        assert_eq!(user_instruction(None), TASK_INSTRUCTION);
    }

    #[test]
    fn later_attempts_name_missing_fields() {
        let missing: BTreeSet<_> = [RequiredField::Scope2].into();
        let text = user_instruction(Some(&missing));
        assert!(text.starts_with(TASK_INSTRUCTION));
        assert!(text.contains("MISSING: ['Scope 2']"));
    }

    #[test]
    fn system_prompt_names_every_wire_field() {
        for field in [
            "company_name",
            "reporting_year",
            "scope_1",
            "scope_2_market",
            "assurance_present",
            "targets",
            "action_plan_summary",
        ] {
            assert!(DEFAULT_SYSTEM_PROMPT.contains(field), "missing {field}");
        }
    }
}
