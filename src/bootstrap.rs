//! The Bootstrap Finder (§4.6): for a dynamic part that the resolver
//! found no prior-request producer for, look for it in the initial
//! page's HTML, the initial cookie snapshot, or a dedicated auth
//! response, in that order.

use std::collections::HashMap;

use crate::auth;
use crate::model::CookieSnapshot;
use crate::params::{BootstrapSource, BootstrapSourceType};
use crate::trace::ParsedTrace;

fn html_source(part: &str, trace: &ParsedTrace) -> Option<BootstrapSource> {
    let html_request = trace.first_html_response()?;
    let body = html_request.response.as_ref()?.body.as_ref()?;
    if !body.contains(part) {
        return None;
    }
    Some(BootstrapSource {
        source_type: BootstrapSourceType::InitialPageHtml,
        producing_url: html_request.url.to_string(),
        extraction: format!(r#"(?s).{{0,40}}{}.{{0,40}}"#, regex::escape(part)),
    })
}

fn cookie_source(part: &str, cookies: Option<&CookieSnapshot>) -> Option<BootstrapSource> {
    let cookies = cookies?;
    let (name, _) = cookies.containing(part).into_iter().next()?;
    Some(BootstrapSource {
        source_type: BootstrapSourceType::InitialPageCookie,
        producing_url: String::new(),
        extraction: name.to_string(),
    })
}

fn dedicated_auth_source(part: &str, trace: &ParsedTrace) -> Option<BootstrapSource> {
    let analysis = auth::analyze(trace);
    for endpoint in &analysis.auth_endpoints {
        let record = trace
            .entries
            .iter()
            .find(|r| r.url.to_string() == endpoint.url && r.method == endpoint.method)?;
        let response = record.response.as_ref()?;
        let body = response.body.as_ref()?;
        if !body.contains(part) {
            continue;
        }
        let json_path = response
            .parsed_body
            .as_ref()
            .and_then(|v| json_path_to(v, part))
            .unwrap_or_else(|| "$".to_string());
        return Some(BootstrapSource {
            source_type: BootstrapSourceType::DedicatedAuthRequest,
            producing_url: endpoint.url.clone(),
            extraction: json_path,
        });
    }
    None
}

/// Shared with the Code Emitter (§4.9), which prefers JSON-path
/// extraction over a regex fallback when a response parsed as JSON.
pub(crate) fn json_path_to(value: &serde_json::Value, needle: &str) -> Option<String> {
    fn walk(value: &serde_json::Value, needle: &str, path: &str) -> Option<String> {
        match value {
            serde_json::Value::String(s) if s == needle => Some(path.to_string()),
            serde_json::Value::Object(map) => {
                for (k, v) in map {
                    if let Some(found) = walk(v, needle, &format!("{path}.{k}")) {
                        return Some(found);
                    }
                }
                None
            }
            serde_json::Value::Array(items) => {
                for (i, v) in items.iter().enumerate() {
                    if let Some(found) = walk(v, needle, &format!("{path}[{i}]")) {
                        return Some(found);
                    }
                }
                None
            }
            _ => None,
        }
    }
    walk(value, needle, "$")
}

/// Find a bootstrap source for one unresolved part, in the §4.6
/// priority order: initial-page-html, initial-page-cookie, then
/// dedicated-auth-request.
pub fn find_one(part: &str, trace: &ParsedTrace, cookies: Option<&CookieSnapshot>) -> Option<BootstrapSource> {
    html_source(part, trace)
        .or_else(|| cookie_source(part, cookies))
        .or_else(|| dedicated_auth_source(part, trace))
}

/// Find bootstrap sources for a batch of unresolved parts (§4.6's
/// stated entry point). Parts with no source are simply absent from
/// the returned map; callers fall through to not-found handling.
pub fn find_all(parts: &[String], trace: &ParsedTrace, cookies: Option<&CookieSnapshot>) -> HashMap<String, BootstrapSource> {
    parts
        .iter()
        .filter_map(|part| find_one(part, trace, cookies).map(|source| (part.clone(), source)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Cookie;
    use crate::trace::{parse, ParseOptions};

    fn html_trace() -> ParsedTrace {
        let bytes = serde_json::to_vec(&serde_json::json!({
            "log": {
                "version": "1.2", "creator": {"name": "t", "version": "1"},
                "entries": [{
                    "startedDateTime": "2024-01-01T00:00:00Z", "time": 1.0,
                    "request": {"method": "GET", "url": "https://svc/", "httpVersion": "HTTP/1.1", "headers": [], "queryString": []},
                    "response": {
                        "status": 200, "statusText": "OK", "httpVersion": "HTTP/1.1", "headers": [],
                        "content": {"size": 40, "mimeType": "text/html", "text": "<meta name=\"csrf\" content=\"CSRFXYZ789\">"}
                    },
                    "timings": {"send": 0.0, "wait": 0.0, "receive": 0.0}
                }]
            }
        }))
        .unwrap();
        parse(&bytes, &ParseOptions::default()).unwrap()
    }

    #[test]
    fn finds_value_in_initial_page_html() {
        let trace = html_trace();
        let source = find_one("CSRFXYZ789", &trace, None).unwrap();
        assert_eq!(source.source_type, BootstrapSourceType::InitialPageHtml);
    }

    #[test]
    fn falls_back_to_cookie_when_not_in_html() {
        let trace = html_trace();
        let mut cookies = CookieSnapshot::new();
        cookies.insert("sid", Cookie::bare("session-value-999"));
        let source = find_one("session-value-999", &trace, Some(&cookies)).unwrap();
        assert_eq!(source.source_type, BootstrapSourceType::InitialPageCookie);
    }

    #[test]
    fn returns_none_when_no_source_found() {
        let trace = html_trace();
        assert!(find_one("totally-unseen-value", &trace, None).is_none());
    }
}
