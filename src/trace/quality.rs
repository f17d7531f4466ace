//! Quality grading and the authentication pre-scan (§4.1).

use serde::{Deserialize, Serialize};

use crate::auth::token_shaped;
use crate::model::RequestRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityGrade {
    Excellent,
    Good,
    Poor,
    Empty,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityStats {
    pub total_entries: usize,
    pub relevant_entries: usize,
    pub api_like_requests: usize,
    pub non_get_requests: usize,
    pub responses_with_bodies: usize,
    pub auth_bearing_requests: usize,
    pub token_bearing_requests: usize,
    pub auth_errors: usize,
}

/// The §4.1 authentication signal pre-scan, folded into trace
/// validation rather than a full auth analysis (that's §4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthPreScan {
    pub any_authorization_header: bool,
    pub any_cookies_sent: bool,
    pub any_token_shaped_param: bool,
    pub any_auth_error_response: bool,
    pub observed_auth_schemes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub grade: QualityGrade,
    pub stats: QualityStats,
    pub auth_pre_scan: AuthPreScan,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

fn is_api_like(record: &RequestRecord) -> bool {
    let path = record.url.path().to_ascii_lowercase();
    path.contains("/api/")
        || path.ends_with(".json")
        || record
            .response
            .as_ref()
            .map(|r| r.content_kind == crate::model::ContentKind::Json)
            .unwrap_or(false)
}

pub fn validate(entries: &[RequestRecord]) -> ValidationResult {
    let mut stats = QualityStats {
        total_entries: entries.len(),
        ..Default::default()
    };
    let mut pre_scan = AuthPreScan::default();

    for record in entries {
        stats.relevant_entries += 1;
        if is_api_like(record) {
            stats.api_like_requests += 1;
        }
        if !record.is_get() {
            stats.non_get_requests += 1;
        }
        if record.response.as_ref().and_then(|r| r.body.as_ref()).is_some() {
            stats.responses_with_bodies += 1;
        }

        let has_auth_header = record.header("authorization").is_some();
        let has_cookie_header = record.header("cookie").is_some();
        let url_has_token_param = record
            .query_params()
            .iter()
            .any(|(_, v)| token_shaped(v));

        if has_auth_header {
            stats.auth_bearing_requests += 1;
            pre_scan.any_authorization_header = true;
            if let Some(scheme) = record.header("authorization").and_then(|h| h.split_whitespace().next()) {
                if !pre_scan.observed_auth_schemes.iter().any(|s| s == scheme) {
                    pre_scan.observed_auth_schemes.push(scheme.to_string());
                }
            }
        }
        if has_cookie_header {
            pre_scan.any_cookies_sent = true;
        }
        if has_auth_header || url_has_token_param {
            stats.token_bearing_requests += 1;
        }
        if url_has_token_param {
            pre_scan.any_token_shaped_param = true;
        }
        if record.response.as_ref().map(|r| r.is_auth_failure()).unwrap_or(false) {
            stats.auth_errors += 1;
            pre_scan.any_auth_error_response = true;
        }
    }

    let grade = if stats.relevant_entries == 0 {
        QualityGrade::Empty
    } else if stats.relevant_entries < 5 || (stats.api_like_requests == 0 && stats.non_get_requests == 0) {
        QualityGrade::Poor
    } else if stats.relevant_entries >= 20 && stats.api_like_requests >= 5 && stats.auth_errors == 0 {
        QualityGrade::Excellent
    } else {
        QualityGrade::Good
    };

    let mut issues = Vec::new();
    let mut recommendations = Vec::new();
    match grade {
        QualityGrade::Empty => {
            issues.push("no relevant requests found in the archive".to_string());
            recommendations.push("record a new trace covering the target action".to_string());
        }
        QualityGrade::Poor => {
            issues.push("archive has too few API-like or non-GET requests to resolve dependencies reliably".to_string());
            recommendations.push("re-record the session with the target action performed end to end".to_string());
        }
        _ => {}
    }
    if stats.auth_errors > 0 {
        issues.push(format!("{} auth failure responses observed in the archive", stats.auth_errors));
        recommendations.push("re-record with a fresh, authenticated session".to_string());
    }

    ValidationResult {
        grade,
        stats,
        auth_pre_scan: pre_scan,
        issues,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use url::Url;

    fn record(url: &str, method: &str, status: Option<u16>) -> RequestRecord {
        RequestRecord {
            method: method.into(),
            url: Url::parse(url).unwrap(),
            headers: vec![],
            body: None,
            response: status.map(|status| crate::model::ResponseRecord {
                status,
                status_text: "".into(),
                headers: vec![],
                content_kind: crate::model::ContentKind::Json,
                body: Some("{}".into()),
                parsed_body: Some(serde_json::json!({})),
            }),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn empty_archive_grades_empty() {
        let result = validate(&[]);
        assert_eq!(result.grade, QualityGrade::Empty);
    }

    #[test]
    fn few_entries_grade_poor() {
        let entries = vec![record("https://svc/api/x", "GET", Some(200))];
        let result = validate(&entries);
        assert_eq!(result.grade, QualityGrade::Poor);
    }

    #[test]
    fn enough_api_entries_with_no_auth_errors_grade_excellent() {
        let entries: Vec<_> = (0..25)
            .map(|i| record(&format!("https://svc/api/item/{i}"), "GET", Some(200)))
            .collect();
        let result = validate(&entries);
        assert_eq!(result.grade, QualityGrade::Excellent);
    }

    #[test]
    fn auth_errors_prevent_excellent() {
        let mut entries: Vec<_> = (0..25)
            .map(|i| record(&format!("https://svc/api/item/{i}"), "GET", Some(200)))
            .collect();
        entries.push(record("https://svc/api/login", "POST", Some(401)));
        let result = validate(&entries);
        assert_eq!(result.grade, QualityGrade::Good);
        assert_eq!(result.stats.auth_errors, 1);
    }
}
