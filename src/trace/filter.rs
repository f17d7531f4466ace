//! Entry filtering rules applied during parse (§4.1).

use crate::model::RequestRecord;

const STATIC_ASSET_EXTENSIONS: &[&str] =
    &["css", "js", "png", "jpg", "jpeg", "gif", "ico", "svg", "woff", "woff2", "ttf", "eot"];

fn path_extension(path: &str) -> Option<&str> {
    path.rsplit('.').next().filter(|ext| !ext.contains('/'))
}

fn is_static_asset(record: &RequestRecord) -> bool {
    path_extension(record.url.path())
        .map(|ext| {
            STATIC_ASSET_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known) || ext.to_ascii_lowercase().starts_with("woff"))
        })
        .unwrap_or(false)
}

fn contains_exclude_keyword(record: &RequestRecord, exclude_keywords: &[String]) -> bool {
    let url = record.url.as_str().to_ascii_lowercase();
    exclude_keywords
        .iter()
        .any(|kw| url.contains(&kw.to_ascii_lowercase()))
}

/// `parse` options (§4.1).
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub exclude_keywords: Vec<String>,
    pub include_all_api_requests: bool,
    pub minimum_quality: Option<super::QualityGrade>,
    pub preserve_analytics: bool,
}

/// True if a request survives the default filtering rules: static
/// assets and excluded keywords are dropped unless
/// `include_all_api_requests` is set or the request is JSON-like /
/// non-GET, in which case it is always kept.
pub fn keep(record: &RequestRecord, options: &ParseOptions) -> bool {
    let is_json_like_response = record
        .response
        .as_ref()
        .map(|r| r.content_kind == crate::model::ContentKind::Json)
        .unwrap_or(false);

    if is_json_like_response || !record.is_get() {
        return true;
    }

    if options.include_all_api_requests {
        return true;
    }

    if is_static_asset(record) {
        return false;
    }

    if !options.preserve_analytics && contains_exclude_keyword(record, &options.exclude_keywords) {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentKind, ResponseRecord};
    use chrono::Utc;
    use url::Url;

    fn record(url: &str, method: &str, response_kind: Option<ContentKind>) -> RequestRecord {
        RequestRecord {
            method: method.into(),
            url: Url::parse(url).unwrap(),
            headers: vec![],
            body: None,
            response: response_kind.map(|content_kind| ResponseRecord {
                status: 200,
                status_text: "OK".into(),
                headers: vec![],
                content_kind,
                body: None,
                parsed_body: None,
            }),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn drops_static_assets_by_default() {
        let r = record("https://svc/app.js", "GET", None);
        assert!(!keep(&r, &ParseOptions::default()));
    }

    #[test]
    fn keeps_json_responses_even_if_asset_like_extension() {
        let r = record("https://svc/data.js", "GET", Some(ContentKind::Json));
        assert!(keep(&r, &ParseOptions::default()));
    }

    #[test]
    fn keeps_non_get_regardless_of_extension() {
        let r = record("https://svc/upload.png", "POST", None);
        assert!(keep(&r, &ParseOptions::default()));
    }

    #[test]
    fn drops_excluded_keywords() {
        let r = record("https://svc/api/tracking/event", "GET", Some(ContentKind::Json));
        let opts = ParseOptions::default();
        assert!(keep(&r, &opts));
        // non-JSON GET honors exclude keywords
        let r2 = record("https://svc/tracking/pixel.gif", "GET", None);
        let opts2 = ParseOptions {
            exclude_keywords: vec!["tracking".into()],
            ..Default::default()
        };
        assert!(!keep(&r2, &opts2));
    }
}
