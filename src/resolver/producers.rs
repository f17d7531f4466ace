//! Producer search (§4.5 step 7): for a remaining dynamic part, look
//! for a cookie or an earlier request whose response produced it.

use chrono::{DateTime, Utc};

use crate::model::CookieSnapshot;
use crate::trace::ParsedTrace;

#[derive(Debug, Clone)]
pub enum Producer<'a> {
    Cookie { name: &'a str },
    Request { index: usize },
}

/// Any cookie whose value contains `part` literally (§4.5 step 7a).
/// When several match, the first by snapshot iteration order is used —
/// the snapshot does not impose an ordering beyond that, and picking
/// among multiple candidate cookies deterministically isn't required.
pub fn find_cookie_producer<'a>(part: &str, cookies: &'a CookieSnapshot) -> Option<Producer<'a>> {
    cookies.containing(part).into_iter().next().map(|(name, _)| Producer::Cookie { name })
}

/// An earlier request whose response body contains `part`, preferring
/// the earliest by timestamp, ties broken by response-body smallness
/// (§4.5 step 7b).
pub fn find_request_producer(part: &str, trace: &ParsedTrace, before: DateTime<Utc>) -> Option<Producer<'static>> {
    let mut candidates: Vec<(usize, DateTime<Utc>, usize)> = trace
        .entries
        .iter()
        .enumerate()
        .filter(|(_, r)| r.captured_at < before)
        .filter_map(|(i, r)| {
            let body = r.response.as_ref()?.body.as_ref()?;
            if body.contains(part) {
                Some((i, r.captured_at, body.len()))
            } else {
                None
            }
        })
        .collect();

    candidates.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));
    candidates.first().map(|(index, ..)| Producer::Request { index: *index })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Cookie;
    use crate::trace::{parse, ParseOptions};

    #[test]
    fn finds_cookie_containing_part() {
        let mut cookies = CookieSnapshot::new();
        cookies.insert("sid", Cookie::bare("abc123"));
        let producer = find_cookie_producer("abc123", &cookies).unwrap();
        assert!(matches!(producer, Producer::Cookie { name } if name == "sid"));
    }

    #[test]
    fn finds_earliest_request_producer() {
        let bytes = serde_json::to_vec(&serde_json::json!({
            "log": {
                "version": "1.2", "creator": {"name": "t", "version": "1"},
                "entries": [
                    {
                        "startedDateTime": "2024-01-01T00:00:00Z", "time": 1.0,
                        "request": {"method": "GET", "url": "https://svc/api/user", "httpVersion": "HTTP/1.1", "headers": [], "queryString": []},
                        "response": {"status": 200, "statusText": "OK", "httpVersion": "HTTP/1.1", "headers": [], "content": {"size": 10, "mimeType": "application/json", "text": "{\"uid\":\"u-42\"}"}},
                        "timings": {"send": 0.0, "wait": 0.0, "receive": 0.0}
                    },
                    {
                        "startedDateTime": "2024-01-01T00:00:01Z", "time": 1.0,
                        "request": {"method": "POST", "url": "https://svc/api/order?uid=u-42", "httpVersion": "HTTP/1.1", "headers": [], "queryString": [{"name": "uid", "value": "u-42"}]},
                        "response": null,
                        "timings": {"send": 0.0, "wait": 0.0, "receive": 0.0}
                    }
                ]
            }
        }))
        .unwrap();
        let trace = parse(&bytes, &ParseOptions::default()).unwrap();
        let producer = find_request_producer("u-42", &trace, trace.entries[1].captured_at).unwrap();
        assert!(matches!(producer, Producer::Request { index: 0 }));
    }
}
