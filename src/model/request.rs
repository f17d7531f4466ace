use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Coarse classification of a body's content type, used by the URL
/// scorer's response-type subscore and by the code emitter's choice of
/// JSON-path vs. regex extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentKind {
    Json,
    Html,
    Text,
    Binary,
}

impl ContentKind {
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.split(';').next().unwrap_or(mime).trim().to_ascii_lowercase();
        if mime.contains("json") {
            ContentKind::Json
        } else if mime.contains("html") {
            ContentKind::Html
        } else if mime.starts_with("text/") || mime.contains("xml") || mime.contains("javascript") {
            ContentKind::Text
        } else {
            ContentKind::Binary
        }
    }
}

/// A single captured HTTP response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub status: u16,
    pub status_text: String,
    /// Case-preserving, one value per name, in capture order.
    pub headers: Vec<(String, String)>,
    pub content_kind: ContentKind,
    pub body: Option<String>,
    /// Populated when `content_kind` is JSON-like and the body parses.
    pub parsed_body: Option<serde_json::Value>,
}

impl ResponseRecord {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_auth_failure(&self) -> bool {
        self.status == 401 || self.status == 403
    }
}

/// A single captured HTTP request, with its response if one was recorded.
///
/// Invariant: `url` is always fully qualified and absolute; the
/// query-parameter view is derived from it on every call rather than
/// cached, so the two can never drift out of sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub method: String,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub response: Option<ResponseRecord>,
    pub captured_at: DateTime<Utc>,
}

impl RequestRecord {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Derived query-parameter view over `url`; never stored separately.
    pub fn query_params(&self) -> Vec<(String, String)> {
        self.url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// All literal text a consumer of this record could scan for a
    /// dynamic part: the URL, header values, and the body.
    pub fn scannable_text(&self) -> String {
        let mut buf = String::new();
        buf.push_str(self.url.as_str());
        for (_, v) in &self.headers {
            buf.push('\n');
            buf.push_str(v);
        }
        if let Some(body) = &self.body {
            buf.push('\n');
            buf.push_str(body);
        }
        buf
    }
}
