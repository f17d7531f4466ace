//! Parameter classification and bootstrap-source types shared by the
//! DAG, the Dependency Resolver, and the Bootstrap Finder (§3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamClassification {
    Dynamic,
    SessionConstant,
    StaticConstant,
    UserInput,
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassificationSource {
    Heuristic,
    Llm,
    Manual,
    ConsistencyAnalysis,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationMetadata {
    pub occurrence_count: usize,
    pub total_requests_scanned: usize,
    pub consistency_score: f64,
    pub pattern: Option<String>,
    pub domain_context: Option<String>,
    pub bootstrap_source: Option<BootstrapSource>,
    pub requires_bootstrap: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedParameter {
    pub name: String,
    pub value: String,
    pub classification: ParamClassification,
    pub confidence: f64,
    pub source: ClassificationSource,
    pub metadata: ClassificationMetadata,
}

impl ClassifiedParameter {
    /// Identity for the additive reclassification policy (§9 open
    /// question): history is preserved by (name, value) key rather than
    /// replaced wholesale on re-run.
    pub fn key(&self) -> (&str, &str) {
        (self.name.as_str(), self.value.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootstrapSourceType {
    InitialPageHtml,
    InitialPageCookie,
    DedicatedAuthRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapSource {
    pub source_type: BootstrapSourceType,
    pub producing_url: String,
    /// A regex/selector pattern, the cookie name, or a JSON path,
    /// depending on `source_type`.
    pub extraction: String,
}
