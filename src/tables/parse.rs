//! Recover a JSON array of rows from free-form completion output.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*?\]").expect("valid bracket regex"));

/// Strip a code fence if present. A ```` ```json ```` fence wins over a bare one; an
/// unterminated fence keeps everything after its opening marker.
fn strip_fence(response: &str) -> &str {
    if let Some((_, rest)) = response.split_once("```json") {
        return rest.split("```").next().unwrap_or(rest);
    }
    let mut parts = response.split("```");
    match (parts.next(), parts.next()) {
        (Some(_), Some(inner)) => inner,
        _ => response,
    }
}

fn candidates(text: &str) -> Vec<&str> {
    let mut found = Vec::new();
    if let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) {
        if end > start {
            found.push(&text[start..=end]);
        }
    }
    found.extend(BRACKETED.find_iter(text).map(|m| m.as_str()));
    found
}

/// Parse model output into row objects.
///
/// Tries the span from the first `[` to the last `]`, then every bracketed substring in order,
/// and returns the first candidate that parses to a non-empty array containing objects.
/// Non-object array elements are discarded. Returns an empty list when nothing parses.
pub fn parse_rows(response: &str, table_type: &str) -> Vec<Map<String, Value>> {
    let text = strip_fence(response).trim();

    for (attempt, candidate) in candidates(text).into_iter().enumerate() {
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Array(items)) if !items.is_empty() => {
                let rows: Vec<_> = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(object) => Some(object),
                        _ => None,
                    })
                    .collect();
                if !rows.is_empty() {
                    tracing::debug!(
                        table_type,
                        attempt = attempt + 1,
                        rows = rows.len(),
                        "Parsed table rows"
                    );
                    return rows;
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(
                    table_type,
                    attempt = attempt + 1,
                    error = %err,
                    "Candidate is not valid JSON"
                );
            }
        }
    }

    tracing::warn!(table_type, "No JSON array found in completion output");
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_values(rows: Vec<Map<String, Value>>) -> Vec<Value> {
        rows.into_iter().map(Value::Object).collect()
    }

    #[test]
    fn extracts_array_from_fenced_prose() {
        let rows = parse_rows("Here is the data:\n```json\n[{\"a\":1}]\n```\nThanks!", "t");
        assert_eq!(as_values(rows), vec![json!({"a": 1})]);
    }

    #[test]
    fn malformed_output_yields_no_rows() {
        assert!(parse_rows("[invalid json", "t").is_empty());
        assert!(parse_rows("", "t").is_empty());
        assert!(parse_rows("[]", "t").is_empty());
    }

    #[test]
    fn bare_fence_is_stripped() {
        let rows = parse_rows("```\n[{\"b\": \"x\"}]\n```", "t");
        assert_eq!(as_values(rows), vec![json!({"b": "x"})]);
    }

    #[test]
    fn falls_back_to_bracketed_substrings() {
        // The outer span mixes prose between two arrays and fails; the first inner array parses.
        let response = "Ativos: [{\"ativo\": \"CDB\"}] e notas [ver anexo]";
        let rows = parse_rows(response, "t");
        assert_eq!(as_values(rows), vec![json!({"ativo": "CDB"})]);
    }

    #[test]
    fn skips_arrays_without_objects() {
        let response = "[1, 2] then [{\"ok\": true}]";
        let rows = parse_rows(response, "t");
        assert_eq!(as_values(rows), vec![json!({"ok": true})]);
    }
}
