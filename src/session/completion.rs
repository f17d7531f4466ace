//! Completion-state analysis (§4.7): the single source of truth for
//! readiness used by the Code Emitter, the Resource Surface, and the
//! Workflow Orchestrator. Pure: two calls with no intervening mutation
//! return equal records (testable property 7).

use serde::{Deserialize, Serialize};

use crate::params::ParamClassification;

use super::Session;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionDiagnostics {
    pub has_master_node: bool,
    pub has_action_url: bool,
    pub dag_complete: bool,
    pub queue_empty: bool,
    pub total_nodes: usize,
    pub unresolved_nodes: usize,
    pub pending_in_queue: usize,
    pub auth_analysis_complete: bool,
    pub auth_readiness: bool,
    pub auth_errors: usize,
    pub all_nodes_classified: bool,
    pub nodes_needing_classification: usize,
    pub bootstrap_analysis_complete: bool,
    pub session_constants_count: usize,
    pub unresolved_session_constants: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub is_complete: bool,
    pub blockers: Vec<String>,
    pub recommendations: Vec<String>,
    pub diagnostics: CompletionDiagnostics,
}

pub fn analyze(session: &Session) -> CompletionRecord {
    let has_master_node = session.master_node_id.is_some();
    let has_action_url = session.action_url.is_some();
    let dag_complete = session.dag.is_complete();
    let queue_empty = session.queue.is_empty();
    let total_nodes = session.dag.node_count();
    let unresolved = session.dag.unresolved_nodes();
    let unresolved_nodes = unresolved.len();
    let pending_in_queue = session.queue.len();

    let auth_analysis_complete = session.auth_analysis.is_some();
    let auth_errors = session
        .auth_analysis
        .as_ref()
        .map(|a| a.security_issues.len())
        .unwrap_or(0);
    let auth_readiness = session
        .auth_analysis
        .as_ref()
        .map(|a| a.code_generation_readiness)
        .unwrap_or(!auth_analysis_complete);

    let all_nodes: Vec<_> = session.dag.all_nodes();
    let nodes_needing_classification = all_nodes
        .iter()
        .filter(|n| n.kind.request().is_some() && n.classified_parameters.is_none())
        .count();
    let all_nodes_classified = nodes_needing_classification == 0;

    let session_constants: Vec<_> = all_nodes
        .iter()
        .flat_map(|n| n.classified_parameters.iter().flatten())
        .filter(|p| p.classification == ParamClassification::SessionConstant)
        .collect();
    let session_constants_count = session_constants.len();
    let unresolved_session_constants = session_constants
        .iter()
        .filter(|p| p.metadata.requires_bootstrap && p.metadata.bootstrap_source.is_none())
        .count();

    let bootstrap_analysis_complete = all_nodes
        .iter()
        .filter(|n| n.is_not_found())
        .count()
        == 0;

    let diagnostics = CompletionDiagnostics {
        has_master_node,
        has_action_url,
        dag_complete,
        queue_empty,
        total_nodes,
        unresolved_nodes,
        pending_in_queue,
        auth_analysis_complete,
        auth_readiness,
        auth_errors,
        all_nodes_classified,
        nodes_needing_classification,
        bootstrap_analysis_complete,
        session_constants_count,
        unresolved_session_constants,
    };

    let mut blockers = Vec::new();
    let mut recommendations = Vec::new();

    if !has_master_node {
        blockers.push("no master node has been selected for this session".to_string());
        recommendations.push("select or score a master request before resolving".to_string());
    }
    if !dag_complete || !queue_empty {
        for (id, parts) in &unresolved {
            blockers.push(format!("node {id} still has unresolved parts: {}", parts.join(", ")));
        }
        if !queue_empty {
            recommendations.push(format!("{pending_in_queue} node(s) still pending resolution"));
        }
    }
    if auth_errors > 0 {
        blockers.push(format!("{auth_errors} authentication failures observed in the trace"));
        recommendations.push("re-record with a valid authenticated session".to_string());
    }

    let is_complete = has_master_node && dag_complete && queue_empty && blockers.is_empty();

    CompletionRecord {
        is_complete,
        blockers,
        recommendations,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::trace::{parse, ParseOptions};

    fn minimal_session() -> Session {
        let bytes = serde_json::to_vec(&serde_json::json!({
            "log": {
                "version": "1.2", "creator": {"name": "t", "version": "1"},
                "entries": [{
                    "startedDateTime": "2024-01-01T00:00:00Z", "time": 1.0,
                    "request": {"method": "GET", "url": "https://svc/api/x", "httpVersion": "HTTP/1.1", "headers": [], "queryString": []},
                    "response": {"status": 200, "statusText": "OK", "httpVersion": "HTTP/1.1", "headers": [], "content": {"size": 2, "mimeType": "application/json", "text": "{}"}},
                    "timings": {"send": 0.0, "wait": 0.0, "receive": 0.0}
                }]
            }
        }))
        .unwrap();
        let trace = parse(&bytes, &ParseOptions::default()).unwrap();
        Session::new(crate::ids::SessionId::new(), "do a thing".to_string(), trace, None)
    }

    #[test]
    fn analysis_is_pure() {
        let session = minimal_session();
        let first = analyze(&session);
        let second = analyze(&session);
        assert_eq!(first, second);
    }

    #[test]
    fn reports_missing_master_node_as_blocker() {
        let session = minimal_session();
        let record = analyze(&session);
        assert!(!record.is_complete);
        assert!(!record.blockers.is_empty());
    }
}
