use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cookie {
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: bool,
    pub http_only: bool,
}

impl Cookie {
    pub fn bare(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            domain: None,
            path: None,
            secure: false,
            http_only: false,
        }
    }
}

/// Mapping from cookie name to its value and attributes (§3, §6.2).
/// Keys are unique per snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CookieSnapshot {
    cookies: HashMap<String, Cookie>,
}

impl CookieSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, cookie: Cookie) {
        self.cookies.insert(name.into(), cookie);
    }

    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Cookie)> {
        self.cookies.iter()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Every cookie whose value contains `part` literally, per §4.5 step
    /// 7(a) and §4.6's initial-page-cookie bootstrap source.
    pub fn containing(&self, part: &str) -> Vec<(&str, &Cookie)> {
        self.cookies
            .iter()
            .filter(|(_, c)| c.value.contains(part))
            .map(|(name, c)| (name.as_str(), c))
            .collect()
    }

    /// Parse the §6.2 JSON shape: name -> bare string or
    /// `{value, domain?, path?, secure?, httpOnly?}`. Unknown fields are
    /// ignored by serde's default (non-deny-unknown-fields) behavior.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let obj = value.as_object()?;
        let mut snapshot = Self::new();
        for (name, v) in obj {
            let cookie = if let Some(s) = v.as_str() {
                Cookie::bare(s)
            } else if v.is_object() {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Raw {
                    value: String,
                    domain: Option<String>,
                    path: Option<String>,
                    #[serde(default)]
                    secure: bool,
                    #[serde(default)]
                    http_only: bool,
                }
                let raw: Raw = serde_json::from_value(v.clone()).ok()?;
                Cookie {
                    value: raw.value,
                    domain: raw.domain,
                    path: raw.path,
                    secure: raw.secure,
                    http_only: raw.http_only,
                }
            } else {
                continue;
            };
            snapshot.insert(name.clone(), cookie);
        }
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_bare_and_object_cookies() {
        let raw = json!({
            "sid": "abc123",
            "pref": {"value": "dark", "domain": "example.com", "httpOnly": true}
        });
        let snapshot = CookieSnapshot::from_json(&raw).unwrap();
        assert_eq!(snapshot.get("sid").unwrap().value, "abc123");
        let pref = snapshot.get("pref").unwrap();
        assert_eq!(pref.domain.as_deref(), Some("example.com"));
        assert!(pref.http_only);
    }

    #[test]
    fn containing_finds_substring_matches() {
        let mut s = CookieSnapshot::new();
        s.insert("sid", Cookie::bare("abc123"));
        assert_eq!(s.containing("abc123").len(), 1);
        assert_eq!(s.containing("xyz").len(), 0);
    }
}
