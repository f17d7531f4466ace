//! The URL Scorer (§4.2): ranks request records by relevance to the
//! user's prompt using lexical and structural heuristics, the same
//! weighted-signal approach this crate's complexity classifier uses
//! elsewhere for query analysis.

use std::sync::LazyLock;

use regex::Regex;

use crate::trace::UrlDescriptor;

const WEIGHT_KEYWORD: f64 = 3.0;
const WEIGHT_API_PATTERN: f64 = 2.0;
const WEIGHT_PARAM_COMPLEXITY: f64 = 1.5;
const WEIGHT_METHOD: f64 = 1.0;
const WEIGHT_RESPONSE_TYPE: f64 = 0.8;

static STOPWORDS: &[&str] = &[
    "a", "an", "the", "to", "for", "of", "in", "on", "with", "and", "or", "is", "at", "by", "from",
];

static API_VERSION_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^v[1-9]$").expect("invalid regex"));
static UUID_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").expect("invalid regex")
});
static ACTION_VERBS: &[&str] = &["create", "submit", "update", "delete", "search", "login", "auth"];

fn tokenize(prompt: &str) -> Vec<String> {
    prompt
        .split(|c: char| !c.is_alphanumeric())
        .map(|t| t.to_ascii_lowercase())
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn path_segments(url: &url::Url) -> Vec<String> {
    url.path_segments()
        .map(|segs| segs.map(|s| s.to_ascii_lowercase()).collect())
        .unwrap_or_default()
}

fn keyword_relevance(tokens: &[String], segments: &[String]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let joined = segments.join("/");
    let matching = tokens.iter().filter(|t| joined.contains(t.as_str())).count();
    matching as f64 / tokens.len() as f64
}

fn longest_shared_token(tokens: &[String], segments: &[String]) -> usize {
    let joined = segments.join("/");
    tokens
        .iter()
        .filter(|t| joined.contains(t.as_str()))
        .map(|t| t.len())
        .max()
        .unwrap_or(0)
}

fn api_pattern_score(path: &str) -> f64 {
    let lower = path.to_ascii_lowercase();
    let mut score = 0.0;
    if lower.contains("/api/") {
        score += 2.0;
    }
    if lower
        .split('/')
        .any(|seg| API_VERSION_SEGMENT.is_match(seg))
    {
        score += 2.0;
    }
    if lower.ends_with(".json") {
        score += 2.0;
    }
    for bad in ["favicon", "analytics", "tracking"] {
        if lower.contains(bad) {
            score -= 2.0;
        }
    }
    for ext in [".css", ".js", ".png", ".jpg", ".ico", ".woff"] {
        if lower.ends_with(ext) {
            score -= 2.0;
        }
    }
    score
}

fn parameter_complexity_score(url: &url::Url, segments: &[String]) -> f64 {
    let distinct_query_keys = url.query_pairs().map(|(k, _)| k.into_owned()).collect::<std::collections::HashSet<_>>().len();
    let numeric_or_uuid_segments = segments
        .iter()
        .filter(|s| s.chars().all(|c| c.is_ascii_digit()) || UUID_LIKE.is_match(s))
        .count();
    (distinct_query_keys + numeric_or_uuid_segments) as f64
}

fn method_score(method: &str, tokens: &[String]) -> f64 {
    let is_mutating = matches!(method.to_ascii_uppercase().as_str(), "POST" | "PUT" | "PATCH" | "DELETE");
    let prompt_has_action_verb = tokens.iter().any(|t| ACTION_VERBS.contains(&t.as_str()));
    if is_mutating && prompt_has_action_verb {
        1.0
    } else {
        0.0
    }
}

fn response_type_score(kind: Option<crate::model::ContentKind>) -> f64 {
    use crate::model::ContentKind::*;
    match kind {
        Some(Json) => 3.0,
        Some(Html) => 2.0,
        Some(Text) => 1.0,
        Some(Binary) => 0.0,
        None => 0.0,
    }
}

#[derive(Debug, Clone)]
struct Scored {
    original_index: usize,
    score: f64,
    tie_break: usize,
}

/// Rank `descriptors` by relevance to `prompt`, descending. Stable
/// under ties: equal-scoring entries preserve their input order.
pub fn rank(prompt: &str, descriptors: &[UrlDescriptor]) -> Vec<UrlDescriptor> {
    let tokens = tokenize(prompt);

    let mut scored: Vec<Scored> = descriptors
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let url = url::Url::parse(&d.url).ok();
            let segments = url.as_ref().map(path_segments).unwrap_or_default();

            let keyword = keyword_relevance(&tokens, &segments);
            let tie_break = longest_shared_token(&tokens, &segments);
            let api_pattern = url
                .as_ref()
                .map(|u| api_pattern_score(u.path()))
                .unwrap_or(0.0);
            let param_complexity = url
                .as_ref()
                .map(|u| parameter_complexity_score(u, &segments))
                .unwrap_or(0.0);
            let method = method_score(&d.method, &tokens);
            let response_type = response_type_score(d.response_content_kind);

            let score = keyword * WEIGHT_KEYWORD
                + api_pattern * WEIGHT_API_PATTERN
                + param_complexity * WEIGHT_PARAM_COMPLEXITY
                + method * WEIGHT_METHOD
                + response_type * WEIGHT_RESPONSE_TYPE;

            Scored {
                original_index: i,
                score,
                tie_break,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.tie_break.cmp(&a.tie_break))
            .then(a.original_index.cmp(&b.original_index))
    });

    scored.into_iter().map(|s| descriptors[s.original_index].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(index: usize, method: &str, url: &str) -> UrlDescriptor {
        UrlDescriptor {
            index,
            method: method.into(),
            url: url.into(),
            request_content_kind: None,
            response_content_kind: Some(crate::model::ContentKind::Json),
        }
    }

    #[test]
    fn ranks_matching_api_endpoint_above_unrelated_asset() {
        let descriptors = vec![
            descriptor(0, "GET", "https://svc/favicon.ico"),
            descriptor(1, "POST", "https://svc/api/search?q=foo"),
        ];
        let ranked = rank("search", &descriptors);
        assert_eq!(ranked[0].url, "https://svc/api/search?q=foo");
    }

    #[test]
    fn ties_preserve_input_order() {
        let descriptors = vec![descriptor(0, "GET", "https://svc/a"), descriptor(1, "GET", "https://svc/b")];
        let ranked = rank("irrelevant prompt text", &descriptors);
        assert_eq!(ranked[0].index, 0);
        assert_eq!(ranked[1].index, 1);
    }

    #[test]
    fn mutating_method_outranks_get_when_prompt_has_action_verb() {
        let descriptors = vec![
            descriptor(0, "GET", "https://svc/api/order?id=1"),
            descriptor(1, "POST", "https://svc/api/order"),
        ];
        let ranked = rank("create an order", &descriptors);
        assert_eq!(ranked[0].method, "POST");
    }
}
