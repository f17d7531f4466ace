//! The Trace Parser (§4.1): normalizes a recorded HTTP archive into
//! request/response records, computes quality stats, and pre-scans for
//! authentication signals.

mod filter;
mod har;
mod quality;

pub use filter::ParseOptions;
pub use quality::{AuthPreScan, QualityGrade, QualityStats, ValidationResult};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{ContentKind, RequestRecord};

/// One entry's method/URL/content-type summary, used by the URL scorer
/// and by master-node selection without needing the full request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlDescriptor {
    pub index: usize,
    pub method: String,
    pub url: String,
    pub request_content_kind: Option<ContentKind>,
    pub response_content_kind: Option<ContentKind>,
}

/// Ordered sequence of request records plus derived, immutable metadata
/// computed once at parse time (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedTrace {
    pub entries: Vec<RequestRecord>,
    pub url_descriptors: Vec<UrlDescriptor>,
    pub validation: ValidationResult,
}

impl ParsedTrace {
    fn from_entries(entries: Vec<RequestRecord>) -> Self {
        let url_descriptors = entries
            .iter()
            .enumerate()
            .map(|(index, r)| UrlDescriptor {
                index,
                method: r.method.clone(),
                url: r.url.to_string(),
                request_content_kind: r
                    .header("content-type")
                    .map(ContentKind::from_mime),
                response_content_kind: r.response.as_ref().map(|resp| resp.content_kind),
            })
            .collect();
        let validation = quality::validate(&entries);
        Self {
            entries,
            url_descriptors,
            validation,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The first HTML response in the trace, used by the Bootstrap
    /// Finder's initial-page-html source (§4.6).
    pub fn first_html_response(&self) -> Option<&RequestRecord> {
        self.entries.iter().find(|r| {
            r.response
                .as_ref()
                .map(|resp| resp.content_kind == ContentKind::Html)
                .unwrap_or(false)
        })
    }

    /// Requests earlier than `before`, ordered as captured — used by the
    /// resolver's producer search (§4.5 step 7b), which prefers the
    /// earliest matching response.
    pub fn entries_before(&self, before: chrono::DateTime<chrono::Utc>) -> impl Iterator<Item = &RequestRecord> {
        self.entries.iter().filter(move |r| r.captured_at < before)
    }
}

/// Parse a raw HAR JSON buffer into a [`ParsedTrace`] (§4.1, §6.1).
pub fn parse(buffer: &[u8], options: &ParseOptions) -> Result<ParsedTrace> {
    let har_file: har::HarFile = serde_json::from_slice(buffer)
        .map_err(|e| Error::malformed_archive(format!("top-level `log` structure missing or invalid: {e}")))?;

    if har_file.log.entries.is_empty() {
        return Err(Error::EmptyArchive);
    }

    let mut records = Vec::with_capacity(har_file.log.entries.len());
    for entry in har_file.log.entries {
        let record: RequestRecord = entry.try_into()?;
        records.push(record);
    }

    let filtered: Vec<_> = records.into_iter().filter(|r| filter::keep(r, options)).collect();

    Ok(ParsedTrace::from_entries(filtered))
}

/// Parse a HAR file from disk (§4.1 — synchronous; callers on an async
/// worker run this via `tokio::task::spawn_blocking`).
pub fn parse_path(path: &std::path::Path, options: &ParseOptions) -> Result<ParsedTrace> {
    let buffer = std::fs::read(path)?;
    parse(&buffer, options)
}

/// Re-serialize a parsed trace's entries back to the §6.1 archive
/// format, faithfully round-tripping the parser's original fields
/// (used by the Completed-Session Cache, §4.8).
pub fn to_har_bytes(trace: &ParsedTrace) -> Result<Vec<u8>> {
    let har_file = har::to_har_file(&trace.entries);
    Ok(serde_json::to_vec_pretty(&har_file)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bytes() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "log": {
                "version": "1.2",
                "creator": {"name": "test", "version": "1.0"},
                "entries": [{
                    "startedDateTime": "2024-01-01T00:00:00Z",
                    "time": 10.0,
                    "request": {
                        "method": "POST",
                        "url": "https://svc/api/search?q=foo",
                        "httpVersion": "HTTP/1.1",
                        "headers": [],
                        "queryString": [{"name": "q", "value": "foo"}],
                        "postData": {"mimeType": "application/json", "text": "{\"q\":\"foo\"}"}
                    },
                    "response": {
                        "status": 200,
                        "statusText": "OK",
                        "httpVersion": "HTTP/1.1",
                        "headers": [],
                        "content": {"size": 2, "mimeType": "application/json", "text": "{}"}
                    },
                    "timings": {"send": 0.0, "wait": 0.0, "receive": 0.0}
                }]
            }
        }))
        .unwrap()
    }

    #[test]
    fn parses_and_grades_a_minimal_trace() {
        let trace = parse(&sample_bytes(), &ParseOptions::default()).unwrap();
        assert_eq!(trace.entries.len(), 1);
        assert_eq!(trace.url_descriptors.len(), 1);
    }

    #[test]
    fn rejects_malformed_archive() {
        let err = parse(b"{\"not_log\": true}", &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedArchive(_)));
    }

    #[test]
    fn rejects_empty_archive() {
        let bytes = serde_json::to_vec(&serde_json::json!({
            "log": {"version": "1.2", "creator": {"name": "t", "version": "1"}, "entries": []}
        }))
        .unwrap();
        let err = parse(&bytes, &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, Error::EmptyArchive));
    }

    #[test]
    fn round_trips_to_har_bytes() {
        let trace = parse(&sample_bytes(), &ParseOptions::default()).unwrap();
        let bytes = to_har_bytes(&trace).unwrap();
        let reparsed = parse(&bytes, &ParseOptions::default()).unwrap();
        assert_eq!(reparsed.entries.len(), trace.entries.len());
        assert_eq!(reparsed.entries[0].url, trace.entries[0].url);
    }
}
