//! Field deserializers tolerant of how completion models actually format values.
//!
//! Models answer `"1.234,5"`, `"R$ 10"`, `12`, `"sim"` or `null` for the same field, so each
//! helper accepts any JSON scalar and never fails: values that cannot be coerced become `None`.

use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::LazyLock;

static SIGNED_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+\.?\d*").expect("valid number regex"));

/// Any scalar as text. Blank strings become `None`.
pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => None,
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        other => Some(other.to_string()),
    })
}

/// Numbers, or the first number found in a string after `,` is read as a decimal point.
pub fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => parse_number(&text),
        _ => None,
    })
}

/// Booleans, plus the usual textual and numeric spellings.
pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(flag) => Some(flag),
        Value::Number(number) => number.as_f64().map(|n| n != 0.0),
        Value::String(text) => match text.trim().to_lowercase().as_str() {
            "true" | "sim" | "yes" | "s" | "1" => Some(true),
            "false" | "nao" | "não" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// First signed number in `text`, reading `,` as the decimal separator.
pub fn parse_number(text: &str) -> Option<f64> {
    let normalized = text.replace(',', ".");
    SIGNED_NUMBER
        .find(&normalized)
        .and_then(|found| found.as_str().parse().ok())
}
