//! Parameter classification (§4.5 step 4): for every dynamic part, scan
//! the rest of the trace for occurrences of the same value to decide
//! whether it is a constant, a session-scoped value, user input, or
//! truly dynamic.

use std::collections::{HashMap, HashSet};

use crate::auth::token_shaped;
use crate::params::{ClassificationMetadata, ClassificationSource, ClassifiedParameter, ParamClassification};
use crate::trace::ParsedTrace;

use super::dynamic_parts::NamedPart;

/// Distinct values observed for each parameter name across the whole
/// trace, used to compute the consistency score.
fn distinct_values_by_name(trace: &ParsedTrace) -> HashMap<String, HashSet<String>> {
    let mut map: HashMap<String, HashSet<String>> = HashMap::new();
    for record in &trace.entries {
        for (k, v) in record.query_params() {
            map.entry(k).or_default().insert(v);
        }
        for (i, segment) in record.url.path_segments().into_iter().flatten().enumerate() {
            map.entry(format!("path_segment_{i}")).or_default().insert(segment.to_string());
        }
    }
    map
}

fn endpoints_containing(trace: &ParsedTrace, value: &str) -> HashSet<(String, String)> {
    trace
        .entries
        .iter()
        .filter(|r| r.scannable_text().contains(value))
        .map(|r| (r.url.host_str().unwrap_or("").to_string(), r.url.path().to_string()))
        .collect()
}

fn occurrence_count(trace: &ParsedTrace, value: &str) -> usize {
    trace.entries.iter().filter(|r| r.scannable_text().contains(value)).count()
}

fn produced_by_some_response(trace: &ParsedTrace, value: &str) -> bool {
    trace
        .entries
        .iter()
        .filter_map(|r| r.response.as_ref())
        .filter_map(|r| r.body.as_ref())
        .any(|body| body.contains(value))
}

fn pattern_of(value: &str) -> String {
    if token_shaped(value) {
        "high-entropy token".to_string()
    } else if value.chars().all(|c| c.is_ascii_digit()) {
        "numeric".to_string()
    } else {
        "literal".to_string()
    }
}

/// A bootstrapped session value typically mixes letter case and digits
/// (a short nonce, a build id) — unlike a fixed literal constant (an
/// API version, a locale code), which is usually one case or one kind
/// of character throughout.
fn looks_session_scoped(value: &str) -> bool {
    let has_upper = value.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = value.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = value.chars().any(|c| c.is_ascii_digit());
    has_upper && has_lower && has_digit
}

/// Classify one named part against the trace and the user's supplied
/// input variables.
pub fn classify(
    part: &NamedPart,
    trace: &ParsedTrace,
    input_variables: &HashMap<String, String>,
    value_counts_by_name: &HashMap<String, HashSet<String>>,
) -> ClassifiedParameter {
    let distinct_count = value_counts_by_name
        .get(&part.name)
        .map(|set| set.len())
        .unwrap_or(1)
        .max(1);
    let consistency_score = 1.0 / distinct_count as f64;
    let occurrences = occurrence_count(trace, &part.value);
    let endpoints = endpoints_containing(trace, &part.value);

    let classification = if consistency_score >= 0.95 && distinct_count == 1 {
        // A single-request trace can never produce two "unrelated
        // endpoints" for the session-constant branch below to catch —
        // so a body-carried value that still looks bootstrapped (mixed
        // case and digits) is treated as session-scoped rather than a
        // fixed literal, which this consistency rule alone can't tell
        // apart from one it's never seen repeat.
        if trace.entries.len() <= 1 && looks_session_scoped(&part.value) {
            ParamClassification::SessionConstant
        } else {
            ParamClassification::StaticConstant
        }
    } else if consistency_score >= 0.8 && endpoints.len() >= 2 {
        ParamClassification::SessionConstant
    } else if input_variables.values().any(|v| v == &part.value) {
        ParamClassification::UserInput
    } else if produced_by_some_response(trace, &part.value) {
        ParamClassification::Dynamic
    } else {
        ParamClassification::Optional
    };

    let confidence = match classification {
        ParamClassification::StaticConstant | ParamClassification::SessionConstant => consistency_score,
        ParamClassification::UserInput => 1.0,
        ParamClassification::Dynamic => 0.75,
        ParamClassification::Optional => 0.4,
    };

    let requires_bootstrap = matches!(
        classification,
        ParamClassification::StaticConstant | ParamClassification::SessionConstant
    );

    ClassifiedParameter {
        name: part.name.clone(),
        value: part.value.clone(),
        classification,
        confidence,
        source: ClassificationSource::ConsistencyAnalysis,
        metadata: ClassificationMetadata {
            occurrence_count: occurrences,
            total_requests_scanned: trace.entries.len(),
            consistency_score,
            pattern: Some(pattern_of(&part.value)),
            domain_context: endpoints.iter().next().map(|(host, _)| host.clone()),
            bootstrap_source: None,
            requires_bootstrap,
        },
    }
}

/// Classify every named part extracted from one node's request,
/// precomputing the trace-wide distinct-value index once per call.
pub fn classify_all(
    parts: &[NamedPart],
    trace: &ParsedTrace,
    input_variables: &HashMap<String, String>,
) -> Vec<ClassifiedParameter> {
    let by_name = distinct_values_by_name(trace);
    parts
        .iter()
        .map(|p| classify(p, trace, input_variables, &by_name))
        .collect()
}
