//! The Workflow Orchestrator (§4.10): binds the whole pipeline for
//! one-shot use — create, rank, resolve-to-completion, emit — the same
//! kind of thin driving loop this crate's workspace lineage uses to
//! bind a multi-stage pipeline behind one call.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, info_span, warn};

use crate::cache::{CacheMetadata, CompletedSessionCache};
use crate::dag::NodeKind;
use crate::emit;
use crate::error::Result;
use crate::ids::SessionId;
use crate::llm::{HeuristicLlmCollaborator, LlmCollaborator};
use crate::scoring;
use crate::session::{CompletionRecord, SessionManager};
use crate::trace::ParseOptions;

/// The outcome of one `run()` call (§4.10).
pub enum OrchestrationOutcome {
    /// The pipeline reached *analysis-complete* and code generation
    /// succeeded.
    Completed {
        session_id: SessionId,
        script: String,
        cache_manifest: CacheMetadata,
    },
    /// The resolver hit the iteration cap before completing; the caller
    /// may keep driving the session interactively.
    IterationCapReached {
        session_id: SessionId,
        analysis: CompletionRecord,
    },
}

pub struct WorkflowOrchestrator<'a> {
    manager: &'a SessionManager,
    cache: &'a CompletedSessionCache,
    llm: &'a dyn LlmCollaborator,
}

impl<'a> WorkflowOrchestrator<'a> {
    pub fn new(manager: &'a SessionManager, cache: &'a CompletedSessionCache) -> Self {
        Self {
            manager,
            cache,
            llm: &HeuristicLlmCollaborator,
        }
    }

    pub fn with_llm_collaborator(mut self, llm: &'a dyn LlmCollaborator) -> Self {
        self.llm = llm;
        self
    }

    /// Run the pipeline end-to-end for one trace/prompt pair (§4.10).
    pub async fn run(
        &self,
        trace_path: impl AsRef<Path>,
        cookie_path: Option<&Path>,
        prompt: String,
        input_variables: HashMap<String, String>,
        parse_options: ParseOptions,
    ) -> Result<OrchestrationOutcome> {
        let span = info_span!("orchestrate");
        let _enter = span.enter();

        let session_id = self
            .manager
            .create_session(trace_path, cookie_path, prompt.clone(), input_variables, parse_options)
            .await?;

        self.select_master(session_id, &prompt).await?;

        let cap = self.manager.config().resolver_iteration_cap;
        for _ in 0..cap {
            let outcome = self
                .manager
                .with_session_mut(session_id, |session| session.run_resolver_iteration())
                .await??;
            if matches!(outcome, crate::resolver::IterationOutcome::AnalysisComplete) {
                break;
            }
        }

        let analysis = self.manager.analyze_completion_state(session_id).await?;
        if !analysis.is_complete {
            warn!(session = %session_id, "iteration cap reached before analysis completed");
            return Ok(OrchestrationOutcome::IterationCapReached { session_id, analysis });
        }

        let snapshot = self.manager.get_session(session_id).await?;
        let script = emit::emit(&snapshot)?;

        self.manager
            .with_session_mut(session_id, |session| session.generated_script = Some(script.clone()))
            .await?;
        let snapshot = self.manager.get_session(session_id).await?;

        let cache_manifest = self.cache.cache(&snapshot, analysis).await?;
        info!(session = %session_id, "emitted and cached script");

        Ok(OrchestrationOutcome::Completed {
            session_id,
            script,
            cache_manifest,
        })
    }

    /// Select and enqueue the master node: the LLM collaborator's
    /// choice when configured, otherwise the top-ranked URL (§4.2,
    /// §6.3).
    async fn select_master(&self, session_id: SessionId, prompt: &str) -> Result<()> {
        let descriptors = self.manager.with_session(session_id, |s| s.trace.url_descriptors.clone()).await?;

        let chosen_url = match self.llm.identify_url(prompt, &descriptors).await {
            Ok(answer) => answer.url,
            Err(_) => {
                let ranked = scoring::rank(prompt, &descriptors);
                let top = ranked
                    .first()
                    .ok_or_else(|| crate::error::Error::malformed_archive("no urls to rank"))?;
                top.url.clone()
            }
        };

        self.manager
            .with_session_mut(session_id, |session| -> Result<()> {
                let index = session
                    .trace
                    .url_descriptors
                    .iter()
                    .find(|d| d.url == chosen_url)
                    .map(|d| d.index)
                    .ok_or_else(|| crate::error::Error::malformed_archive("selected url not found in trace"))?;
                let request = session.trace.entries[index].clone();
                let node_id = session.dag.add_node(NodeKind::MasterRequest(request), None)?;
                session.master_node_id = Some(node_id);
                session.action_url = Some(chosen_url);
                session.queue.push_back(node_id);
                Ok(())
            })
            .await??;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::io::Write;

    fn sample_har_bytes() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "log": {
                "version": "1.2", "creator": {"name": "t", "version": "1"},
                "entries": [{
                    "startedDateTime": "2024-01-01T00:00:00Z", "time": 1.0,
                    "request": {
                        "method": "POST", "url": "https://svc/api/search?q=foo", "httpVersion": "HTTP/1.1",
                        "headers": [], "queryString": [{"name": "q", "value": "foo"}],
                        "postData": {"mimeType": "application/json", "text": "{\"q\":\"foo\"}"}
                    },
                    "response": {
                        "status": 200, "statusText": "OK", "httpVersion": "HTTP/1.1", "headers": [],
                        "content": {"size": 10, "mimeType": "application/json", "text": "{\"items\":[]}"}
                    },
                    "timings": {"send": 0.0, "wait": 0.0, "receive": 0.0}
                }]
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn runs_a_single_node_pipeline_to_completion() {
        let manager = SessionManager::new(Config::default());
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = CompletedSessionCache::new(cache_dir.path());
        let orchestrator = WorkflowOrchestrator::new(&manager, &cache);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&sample_har_bytes()).unwrap();

        let mut inputs = HashMap::new();
        inputs.insert("q".to_string(), "foo".to_string());

        let outcome = orchestrator
            .run(file.path(), None, "search for foo".to_string(), inputs, ParseOptions::default())
            .await
            .unwrap();

        match outcome {
            OrchestrationOutcome::Completed { script, cache_manifest, .. } => {
                assert!(script.contains("export async function run"));
                assert!(cache_manifest.code_generated);
            }
            OrchestrationOutcome::IterationCapReached { analysis, .. } => {
                panic!("expected completion, got cap reached: {analysis:?}");
            }
        }
    }
}
