//! Dynamic-part extraction (§4.5 step 3).

use std::collections::HashSet;

use crate::model::RequestRecord;

const WELL_KNOWN_CONSTANTS: &[&str] = &[
    "application/json",
    "text/html",
    "text/plain",
    "application/x-www-form-urlencoded",
    "multipart/form-data",
    "gzip",
    "deflate",
    "br",
    "keep-alive",
    "no-cache",
    "no-store",
];

fn is_well_known_constant(value: &str) -> bool {
    WELL_KNOWN_CONSTANTS.contains(&value) || value.to_ascii_lowercase().starts_with("mozilla/")
}

/// Length >= 6 and (mixed case, contains a digit, or looks like a bare
/// JSON-ish token: alphanumeric plus `-_.`) — the entropy/structural
/// signal of §4.5 step 3(d).
fn has_sufficient_signal(value: &str) -> bool {
    if value.chars().count() < 6 {
        return false;
    }
    let has_upper = value.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = value.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = value.chars().any(|c| c.is_ascii_digit());
    let json_ish = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    (has_upper && has_lower) || has_digit || json_ish
}

fn tokenize_text(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ',' | ':' | '{' | '}' | '[' | ']'))
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn json_leaf_strings(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
    match value {
        serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
        serde_json::Value::Number(n) => out.push((prefix.to_string(), n.to_string())),
        serde_json::Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                json_leaf_strings(&format!("{prefix}[{i}]"), v, out);
            }
        }
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                json_leaf_strings(k, v, out);
            }
        }
        _ => {}
    }
}

/// A dynamic part together with the name of the parameter it came from
/// (query key, path segment slot, header name, or JSON body key) — the
/// classifier (§4.5 step 4) groups occurrences by this name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedPart {
    pub name: String,
    pub value: String,
}

/// Candidate (name, value) pairs drawn from the URL, headers, and body,
/// filtered to those that are not already a supplied input variable,
/// not a well-known constant, and carry sufficient entropy/structural
/// signal. Order is stable (first occurrence wins) and values are
/// deduplicated by value.
pub fn extract(record: &RequestRecord, input_variables: &std::collections::HashMap<String, String>) -> Vec<NamedPart> {
    let mut candidates: Vec<(String, String)> = Vec::new();

    for (k, v) in record.query_params() {
        candidates.push((k, v));
    }
    for (i, segment) in record.url.path_segments().into_iter().flatten().enumerate() {
        candidates.push((format!("path_segment_{i}"), segment.to_string()));
    }
    for (name, v) in &record.headers {
        if name.eq_ignore_ascii_case("host") || name.eq_ignore_ascii_case("accept") {
            continue;
        }
        candidates.push((name.clone(), v.clone()));
    }
    if let Some(body) = &record.body {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
            json_leaf_strings("body", &json, &mut candidates);
        } else {
            for (i, token) in tokenize_text(body).into_iter().enumerate() {
                candidates.push((format!("body_token_{i}"), token));
            }
        }
    }

    let input_values: HashSet<&str> = input_variables.values().map(|s| s.as_str()).collect();
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for (name, value) in candidates {
        if input_values.contains(value.as_str()) {
            continue;
        }
        if is_well_known_constant(&value) {
            continue;
        }
        if !has_sufficient_signal(&value) {
            continue;
        }
        if seen.insert(value.clone()) {
            result.push(NamedPart { name, value });
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use url::Url;

    fn record(url: &str, body: Option<&str>) -> RequestRecord {
        RequestRecord {
            method: "POST".into(),
            url: Url::parse(url).unwrap(),
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: body.map(String::from),
            response: None,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn extracts_dynamic_query_and_body_values_but_not_constants() {
        let r = record(
            "https://svc/api/search?q=foo&ctx=AB7x92",
            Some(r#"{"q":"foo","ctx":"AB7x92"}"#),
        );
        let inputs = HashMap::new();
        let parts = extract(&r, &inputs);
        assert!(parts.iter().any(|p| p.value == "AB7x92"));
        assert!(!parts.iter().any(|p| p.value == "application/json"));
    }

    #[test]
    fn excludes_values_already_supplied_as_input_variables() {
        let r = record("https://svc/api/search?q=foo&ctx=AB7x92", None);
        let mut inputs = HashMap::new();
        inputs.insert("q".to_string(), "foo".to_string());
        // "foo" is short (<6) so wouldn't qualify anyway; use a longer stand-in
        inputs.insert("ctx".to_string(), "AB7x92".to_string());
        let parts = extract(&r, &inputs);
        assert!(!parts.iter().any(|p| p.value == "AB7x92"));
    }
}
