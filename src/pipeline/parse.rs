//! Turning a model's text reply into a JSON object.
//!
//! Even when told to answer with bare JSON, models sometimes wrap the object
//! in a ```json fence or put a sentence in front of it. These rules peel that
//! off before parsing; anything that still is not a JSON object is a
//! malformed response.

use crate::error::OracleError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n(.*)\n```\s*$").unwrap());

/// Parse the oracle's reply into a JSON object.
pub fn parse_response(raw: &str) -> Result<Map<String, Value>, OracleError> {
    let body = strip_fences(raw.trim());
    let candidate = match serde_json::from_str::<Value>(body) {
        Ok(v) => v,
        Err(first_err) => {
            let Some(slice) = outermost_object(body) else {
                return Err(OracleError::Malformed(format!(
                    "no JSON object in response: {first_err}"
                )));
            };
            serde_json::from_str::<Value>(slice)
                .map_err(|e| OracleError::Malformed(e.to_string()))?
        }
    };

    match candidate {
        Value::Object(map) => Ok(map),
        other => Err(OracleError::Malformed(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn strip_fences(input: &str) -> &str {
    RE_OUTER_FENCES
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map_or(input, |m| m.as_str())
}

/// The span from the first `{` to the last `}`.
fn outermost_object(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let end = input.rfind('}')?;
    (end > start).then(|| &input[start..=end])
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_object() {
        let map = parse_response(r#"{"company_name": "Acme"}"#).unwrap();
        assert_eq!(map["company_name"], "Acme");
    }

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n{\"reporting_year\": 2022}\n```";
        let map = parse_response(raw).unwrap();
        assert_eq!(map["reporting_year"], 2022);
    }

    #[test]
    fn tolerates_leading_prose() {
        let raw = "Here is the data:\n{\"targets\": []}\nHope this helps.";
        let map = parse_response(raw).unwrap();
        assert!(map["targets"].as_array().unwrap().is_empty());
    }

    #[test]
    fn empty_object_is_valid() {
        assert!(parse_response("{}").unwrap().is_empty());
    }

    #[test]
    fn array_is_malformed() {
        let err = parse_response("[1, 2]").unwrap_err();
        assert!(matches!(err, OracleError::Malformed(m) if m.contains("array")));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_response("I could not find any emissions data."),
            Err(OracleError::Malformed(_))
        ));
    }
}
