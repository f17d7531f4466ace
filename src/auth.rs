//! The Authentication Analyzer (§4.3): classifies the auth scheme used
//! across a trace, extracts tokens, detects auth failures, and
//! summarizes flow complexity for the resolver and code emitter.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::RequestRecord;
use crate::trace::ParsedTrace;

/// Header/query-param names that, by name alone, strongly suggest a
/// credential is carried there even without checking the value's shape.
static API_KEY_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(x-api-key|api-key|x-auth-token)$").expect("invalid regex"));
static TOKEN_QUERY_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(token|access_token|api_key|auth)$").expect("invalid regex"));
static SESSION_COOKIE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(session|sid|sess|auth|token)").expect("invalid regex"));
static AUTH_ENDPOINT_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(login|signin|sign-in|refresh|logout|signout|sign-out|validate|verify)").expect("invalid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthType {
    BearerToken,
    ApiKey,
    BasicAuth,
    SessionCookie,
    OAuth,
    CustomHeader,
    UrlParameter,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenLocation {
    Header,
    Cookie,
    UrlParameter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthEndpointPurpose {
    Login,
    Refresh,
    Logout,
    Validate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowComplexity {
    Simple,
    Moderate,
    Complex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedToken {
    pub token_type: AuthType,
    pub location: TokenLocation,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerRequestAuthInfo {
    pub index: usize,
    pub authenticated: bool,
    pub auth_types: Vec<AuthType>,
    pub is_failure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthEndpoint {
    pub url: String,
    pub method: String,
    pub purpose: AuthEndpointPurpose,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenLifecycleSummary {
    pub any_refresh_observed: bool,
    pub any_logout_observed: bool,
    pub distinct_token_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationAnalysis {
    pub has_auth: bool,
    pub primary_auth_type: AuthType,
    pub observed_auth_types: Vec<AuthType>,
    pub per_request: Vec<PerRequestAuthInfo>,
    pub extracted_tokens: Vec<ExtractedToken>,
    pub token_lifecycle: TokenLifecycleSummary,
    pub auth_endpoints: Vec<AuthEndpoint>,
    pub flow_complexity: FlowComplexity,
    pub security_issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub code_generation_readiness: bool,
}

/// A long, high-entropy-looking literal: mixed case/digits and length
/// at least 16, or JSON Web Token shape (three dot-separated segments).
/// Shared with the dynamic-part entropy check (§4.5 step 3) and the
/// trace pre-scan (§4.1).
pub fn token_shaped(value: &str) -> bool {
    if value.len() < 16 {
        return false;
    }
    if value.matches('.').count() == 2 && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_') {
        return true;
    }
    let has_upper = value.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = value.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = value.chars().any(|c| c.is_ascii_digit());
    [has_upper, has_lower, has_digit].iter().filter(|b| **b).count() >= 2
}

fn auth_types_for(record: &RequestRecord) -> Vec<AuthType> {
    let mut types = Vec::new();

    if let Some(header) = record.header("authorization") {
        let lower = header.to_ascii_lowercase();
        if lower.starts_with("bearer ") {
            types.push(AuthType::BearerToken);
        } else if lower.starts_with("basic ") {
            types.push(AuthType::BasicAuth);
        } else {
            types.push(AuthType::CustomHeader);
        }
    }

    if record
        .headers
        .iter()
        .any(|(name, _)| API_KEY_HEADER.is_match(name))
    {
        types.push(AuthType::ApiKey);
    }

    if let Some(cookie_header) = record.header("cookie") {
        if SESSION_COOKIE_NAME.is_match(cookie_header) {
            types.push(AuthType::SessionCookie);
        }
    }

    if record
        .query_params()
        .iter()
        .any(|(name, _)| TOKEN_QUERY_PARAM.is_match(name))
    {
        types.push(AuthType::UrlParameter);
    }

    if types.is_empty() {
        types.push(AuthType::None);
    }
    types
}

fn classify_endpoint_purpose(record: &RequestRecord) -> Option<AuthEndpointPurpose> {
    let path = record.url.path().to_ascii_lowercase();
    if !AUTH_ENDPOINT_PATH.is_match(&path) {
        return None;
    }
    if path.contains("refresh") {
        Some(AuthEndpointPurpose::Refresh)
    } else if path.contains("logout") || path.contains("signout") || path.contains("sign-out") {
        Some(AuthEndpointPurpose::Logout)
    } else if path.contains("validate") || path.contains("verify") {
        Some(AuthEndpointPurpose::Validate)
    } else {
        Some(AuthEndpointPurpose::Login)
    }
}

pub fn analyze(trace: &ParsedTrace) -> AuthenticationAnalysis {
    let mut observed = Vec::new();
    let mut per_request = Vec::new();
    let mut extracted_tokens = Vec::new();
    let mut auth_endpoints = Vec::new();
    let mut lifecycle = TokenLifecycleSummary::default();
    let mut security_issues = Vec::new();

    for (index, record) in trace.entries.iter().enumerate() {
        let types = auth_types_for(record);
        let authenticated = !types.iter().all(|t| *t == AuthType::None);
        let is_failure = record.response.as_ref().map(|r| r.is_auth_failure()).unwrap_or(false);

        for t in &types {
            if *t != AuthType::None && !observed.contains(t) {
                observed.push(*t);
            }
        }

        if let Some(header) = record.header("authorization") {
            if let Some(token) = header.split_whitespace().nth(1) {
                extracted_tokens.push(ExtractedToken {
                    token_type: if header.to_ascii_lowercase().starts_with("bearer") {
                        AuthType::BearerToken
                    } else {
                        AuthType::BasicAuth
                    },
                    location: TokenLocation::Header,
                    name: "authorization".to_string(),
                });
                if token_shaped(token) {
                    lifecycle.distinct_token_count += 1;
                }
            }
        }
        for (name, _) in &record.headers {
            if API_KEY_HEADER.is_match(name) {
                extracted_tokens.push(ExtractedToken {
                    token_type: AuthType::ApiKey,
                    location: TokenLocation::Header,
                    name: name.clone(),
                });
            }
        }
        for (name, value) in record.query_params() {
            if TOKEN_QUERY_PARAM.is_match(&name) && token_shaped(&value) {
                extracted_tokens.push(ExtractedToken {
                    token_type: AuthType::UrlParameter,
                    location: TokenLocation::UrlParameter,
                    name,
                });
            }
        }

        if let Some(purpose) = classify_endpoint_purpose(record) {
            if purpose == AuthEndpointPurpose::Refresh {
                lifecycle.any_refresh_observed = true;
            }
            if purpose == AuthEndpointPurpose::Logout {
                lifecycle.any_logout_observed = true;
            }
            auth_endpoints.push(AuthEndpoint {
                url: record.url.to_string(),
                method: record.method.clone(),
                purpose,
            });
        }

        if is_failure {
            security_issues.push(format!(
                "request {} to {} failed authentication (status {})",
                index,
                record.url,
                record.response.as_ref().map(|r| r.status).unwrap_or(0)
            ));
        }

        per_request.push(PerRequestAuthInfo {
            index,
            authenticated,
            auth_types: types,
            is_failure,
        });
    }

    let has_auth = !observed.is_empty();
    let primary_auth_type = observed.first().copied().unwrap_or(AuthType::None);

    let flow_complexity = match observed.len() {
        0 => FlowComplexity::Simple,
        1 if !lifecycle.any_refresh_observed => FlowComplexity::Simple,
        1 => FlowComplexity::Moderate,
        _ => FlowComplexity::Complex,
    };

    let mut recommendations = Vec::new();
    if !security_issues.is_empty() {
        recommendations.push("re-record the trace with a valid, unexpired session".to_string());
    }
    if has_auth && auth_endpoints.is_empty() {
        recommendations.push(
            "no dedicated auth endpoint found in the trace; session constants will need a bootstrap source from initial page state".to_string(),
        );
    }

    let code_generation_readiness = security_issues.is_empty();

    AuthenticationAnalysis {
        has_auth,
        primary_auth_type,
        observed_auth_types: observed,
        per_request,
        extracted_tokens,
        token_lifecycle: lifecycle,
        auth_endpoints,
        flow_complexity,
        security_issues,
        recommendations,
        code_generation_readiness,
    }
}
