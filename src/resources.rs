//! The Resource Surface (§6.4): read-only addressable views over live
//! and completed sessions. Every method here only reads through
//! [`SessionManager`]/[`CompletedSessionCache`] — it never mutates a
//! session's invariants (§3's stated division of responsibility).

use serde::Serialize;

use crate::cache::{ArtifactKind, CacheMetadata, CompletedSessionCache};
use crate::dag::DagEdge;
use crate::error::Result;
use crate::ids::SessionId;
use crate::session::{CompletionRecord, SessionManager};

/// `{session-id}/dag.json` (§6.4): the current DAG, nodes and edges, as
/// it stands at the moment of the call.
#[derive(Debug, Serialize)]
pub struct DagView {
    pub nodes: Vec<serde_json::Value>,
    pub edges: Vec<DagEdge>,
}

/// `artifacts/list.json` (§6.4): one entry per completed session.
#[derive(Debug, Serialize)]
pub struct CompletedSessionSummary {
    pub session_id: SessionId,
    pub prompt: String,
    pub code_generated: bool,
    pub generated_code_uri: String,
    pub manifest_uri: String,
}

pub struct ResourceSurface<'a> {
    manager: &'a SessionManager,
    cache: &'a CompletedSessionCache,
}

impl<'a> ResourceSurface<'a> {
    pub fn new(manager: &'a SessionManager, cache: &'a CompletedSessionCache) -> Self {
        Self { manager, cache }
    }

    /// `{session-id}/dag.json`.
    pub async fn dag_json(&self, id: SessionId) -> Result<DagView> {
        self.manager
            .with_session(id, |session| {
                let nodes = session
                    .dag
                    .all_nodes()
                    .into_iter()
                    .map(|n| serde_json::to_value(n).unwrap_or(serde_json::Value::Null))
                    .collect();
                let edges = session.dag.edges().to_vec();
                DagView { nodes, edges }
            })
            .await
    }

    /// `{session-id}/log.txt`.
    pub async fn log_text(&self, id: SessionId) -> Result<String> {
        self.manager.with_session(id, |session| session.log.to_text()).await
    }

    /// `{session-id}/status.json`.
    pub async fn status_json(&self, id: SessionId) -> Result<CompletionRecord> {
        self.manager.analyze_completion_state(id).await
    }

    /// `{session-id}/generated_code`; absent when not yet emitted.
    pub async fn generated_code(&self, id: SessionId) -> Result<Option<String>> {
        self.manager.with_session(id, |session| session.generated_script.clone()).await
    }

    /// `completed/{session-id}/artifacts.json`.
    pub async fn completed_manifest(&self, id: SessionId) -> Result<CacheMetadata> {
        self.cache.get_cached_metadata(id).await
    }

    /// `completed/{session-id}/har/original.har`.
    pub async fn completed_trace(&self, id: SessionId) -> Result<Vec<u8>> {
        self.cache.get_cached_artifact(id, ArtifactKind::Trace).await
    }

    /// `completed/{session-id}/cookies/original.json`.
    pub async fn completed_cookies(&self, id: SessionId) -> Result<Vec<u8>> {
        self.cache.get_cached_artifact(id, ArtifactKind::Cookies).await
    }

    /// `artifacts/list.json`: enumeration of completed sessions with
    /// quick-access URIs.
    pub async fn completed_sessions_list(&self) -> Result<Vec<CompletedSessionSummary>> {
        let metadata = self.cache.all_cached_sessions().await?;
        Ok(metadata
            .into_iter()
            .map(|m| CompletedSessionSummary {
                session_id: m.session_id,
                prompt: m.prompt,
                code_generated: m.code_generated,
                generated_code_uri: format!("completed/{}/generated.ts", m.session_id),
                manifest_uri: format!("completed/{}/artifacts.json", m.session_id),
            })
            .collect())
    }
}
