//! The error taxonomy for the analysis engine.
//!
//! Every fallible operation returns [`Result<T>`], an alias over this
//! crate's single `Error` enum. Each variant is one of the stable error
//! codes a caller can branch on; several carry the diagnostic payload a
//! user-visible failure report needs (blockers, recommendations, the
//! offending cycle) so a boundary like the Workflow Orchestrator can turn
//! it into a structured report without re-deriving context.

use thiserror::Error;

use crate::dag::NodeId;
use crate::session::CompletionDiagnostics;
use crate::trace::QualityGrade;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("no request in the archive matches the requested url")]
    UrlNotFoundInArchive,

    #[error("trace quality insufficient (grade {grade:?}): {issues:?}")]
    HarQualityInsufficient {
        grade: QualityGrade,
        issues: Vec<String>,
        recommendations: Vec<String>,
    },

    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    #[error("archive contains no entries")]
    EmptyArchive,

    #[error("circular dependency detected: {}", cycle.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(" -> "))]
    CircularDependencies { cycle: Vec<NodeId> },

    #[error("no LLM collaborator configured and heuristic fallback is not viable: {0}")]
    NoProviderConfigured(String),

    #[error("analysis incomplete: {blockers:?}")]
    AnalysisIncomplete {
        blockers: Vec<String>,
        diagnostics: Box<CompletionDiagnostics>,
    },

    #[error("code generation failed: {0}")]
    CodeGenerationFailed(#[source] Box<Error>),

    #[error("session capacity exceeded (max {max})")]
    CapacityExceeded { max: usize },

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("cache miss for session {0}, artifact {1}")]
    CacheMiss(String, String),

    #[error("cache write failed: {0}")]
    CacheWriteFailed(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn session_not_found(id: impl std::fmt::Display) -> Self {
        Self::SessionNotFound(id.to_string())
    }

    pub fn node_not_found(id: NodeId) -> Self {
        Self::NodeNotFound(id)
    }

    pub fn har_quality_insufficient(
        grade: QualityGrade,
        issues: Vec<String>,
        recommendations: Vec<String>,
    ) -> Self {
        Self::HarQualityInsufficient {
            grade,
            issues,
            recommendations,
        }
    }

    pub fn malformed_archive(message: impl Into<String>) -> Self {
        Self::MalformedArchive(message.into())
    }

    pub fn circular_dependencies(cycle: Vec<NodeId>) -> Self {
        Self::CircularDependencies { cycle }
    }

    pub fn no_provider_configured(reason: impl Into<String>) -> Self {
        Self::NoProviderConfigured(reason.into())
    }

    pub fn analysis_incomplete(blockers: Vec<String>, diagnostics: CompletionDiagnostics) -> Self {
        Self::AnalysisIncomplete {
            blockers,
            diagnostics: Box::new(diagnostics),
        }
    }

    pub fn code_generation_failed(source: Error) -> Self {
        Self::CodeGenerationFailed(Box::new(source))
    }

    pub fn capacity_exceeded(max: usize) -> Self {
        Self::CapacityExceeded { max }
    }

    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    pub fn cache_miss(session_id: impl std::fmt::Display, kind: impl Into<String>) -> Self {
        Self::CacheMiss(session_id.to_string(), kind.into())
    }

    pub fn cache_write_failed(message: impl Into<String>) -> Self {
        Self::CacheWriteFailed(message.into())
    }

    /// One-sentence explanation suitable for a user-visible failure report
    /// (§7 propagation policy: every such report carries the code, this
    /// sentence, blockers, and at least one recommendation).
    pub fn explanation(&self) -> String {
        self.to_string()
    }
}
