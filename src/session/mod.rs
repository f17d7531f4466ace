//! The session lifecycle (§3, §4.7): a live analysis in progress, its
//! DAG, its processing queue, and its append-only log.

mod completion;
mod log;
mod manager;

pub use completion::{analyze as analyze_completion_state, CompletionDiagnostics, CompletionRecord};
pub use log::{LogEntry, LogLevel, SessionLog};
pub use manager::{SessionHandle, SessionManager};

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::auth::AuthenticationAnalysis;
use crate::dag::{Dag, NodeId};
use crate::error::Result;
use crate::ids::{GroupId, SessionId};
use crate::model::CookieSnapshot;
use crate::params::BootstrapSource;
use crate::resolver::{self, IterationOutcome};
use crate::trace::ParsedTrace;

/// A named, master-centered subset of the DAG corresponding to one
/// coherent user intent (§3). Single-URL identification is the
/// degenerate case of exactly one group with one master node (§9
/// design note).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowGroup {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub priority: u32,
    pub complexity_estimate: f64,
    pub category: String,
    pub master_node_id: Option<NodeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub prompt: String,
    pub trace: ParsedTrace,
    pub cookies: Option<CookieSnapshot>,
    pub dag: Dag,
    pub action_url: Option<String>,
    pub master_node_id: Option<NodeId>,
    pub current_node_id: Option<NodeId>,
    pub queue: VecDeque<NodeId>,
    pub input_variables: HashMap<String, String>,
    pub is_complete: bool,
    pub log: SessionLog,
    pub generated_script: Option<String>,
    pub auth_analysis: Option<AuthenticationAnalysis>,
    pub auth_readiness: Option<bool>,
    pub bootstrap_analysis: Option<HashMap<String, BootstrapSource>>,
    pub workflow_groups: HashMap<GroupId, WorkflowGroup>,
    pub active_workflow_id: Option<GroupId>,
}

impl Session {
    pub fn new(id: SessionId, prompt: String, trace: ParsedTrace, cookies: Option<CookieSnapshot>) -> Self {
        Self {
            id,
            prompt,
            trace,
            cookies,
            dag: Dag::new(),
            action_url: None,
            master_node_id: None,
            current_node_id: None,
            queue: VecDeque::new(),
            input_variables: HashMap::new(),
            is_complete: false,
            log: SessionLog::new(),
            generated_script: None,
            auth_analysis: None,
            auth_readiness: None,
            bootstrap_analysis: None,
            workflow_groups: HashMap::new(),
            active_workflow_id: None,
        }
    }

    pub fn add_log(&mut self, level: LogLevel, message: impl Into<String>, data: Option<serde_json::Value>) {
        self.log.push(level, message, data);
    }

    /// Recompute `is_complete` from the DAG and queue (§4.7).
    pub fn sync_completion_state(&mut self) {
        self.is_complete = self.dag.is_complete() && self.queue.is_empty();
    }

    pub fn analyze_completion_state(&self) -> CompletionRecord {
        completion::analyze(self)
    }

    /// Run one resolver iteration with the §5 copy-on-iterate rollback
    /// discipline: the DAG and queue are cloned beforehand and only
    /// swapped in on success, so a cycle or any other failure leaves
    /// the session exactly as it was before the call.
    pub fn run_resolver_iteration(&mut self) -> Result<IterationOutcome> {
        let mut dag = self.dag.clone();
        let mut queue = self.queue.clone();

        let outcome = resolver::iterate(
            &mut dag,
            &mut queue,
            &self.trace,
            self.cookies.as_ref(),
            &self.input_variables,
        )?;

        self.dag = dag;
        self.queue = queue;
        self.sync_completion_state();

        match &outcome {
            IterationOutcome::AnalysisComplete => {
                self.add_log(LogLevel::Info, "analysis complete", None);
            }
            IterationOutcome::BlockedOnDependencies(blockers) => {
                self.add_log(
                    LogLevel::Warn,
                    format!("blocked on {} unresolved node(s)", blockers.len()),
                    None,
                );
            }
            IterationOutcome::Skipped(id) => {
                self.add_log(LogLevel::Debug, format!("skipped node {id}"), None);
            }
            IterationOutcome::Progressed(id) => {
                self.current_node_id = Some(*id);
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{parse, ParseOptions};

    fn trace_with_one_entry() -> ParsedTrace {
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
        parse(&bytes, &ParseOptions::default()).unwrap()
    }

    #[test]
    fn empty_queue_with_no_master_completes_immediately() {
        let trace = trace_with_one_entry();
        let mut session = Session::new(SessionId::new(), "do thing".into(), trace, None);
        let outcome = session.run_resolver_iteration().unwrap();
        assert!(matches!(outcome, IterationOutcome::AnalysisComplete));
        assert!(session.is_complete);
    }
}
