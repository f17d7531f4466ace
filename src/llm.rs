//! The LLM collaborator (§6.3): four function-shaped calls with fixed
//! structured answer schemas. The concrete provider is an external
//! collaborator — this module defines its contract as a trait plus a
//! [`HeuristicLlmCollaborator`] default (no network, always declines)
//! and, behind the `llm-anthropic` feature, a concrete
//! [`AnthropicLlmCollaborator`] built the way this crate's other
//! provider client would be: a `reqwest::Client`, a small config, the
//! same `x-api-key`/`anthropic-version` headers.
//!
//! When the collaborator declines (the default), callers fall back to
//! the URL Scorer and to the §4.5 step 3-4 heuristics and log the
//! fallback at `warn`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::trace::UrlDescriptor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyUrlAnswer {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyDynamicPartsAnswer {
    pub dynamic_parts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifiedVariable {
    pub variable_name: String,
    pub variable_value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyInputVariablesAnswer {
    pub identified_variables: Vec<IdentifiedVariable>,
    pub removed_dynamic_parts: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowEndpointRole {
    Primary,
    Secondary,
    Supporting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredEndpoint {
    pub url: String,
    pub method: String,
    pub role: WorkflowEndpointRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredWorkflow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub priority: u32,
    pub complexity: String,
    pub requires_user_input: bool,
    pub endpoints: Vec<DiscoveredEndpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverWorkflowsAnswer {
    pub workflows: Vec<DiscoveredWorkflow>,
}

/// The four §6.3 structured calls. Implementors are external
/// collaborators from this crate's perspective (§1 scope); the trait is
/// what lets the resolver and orchestrator depend on the contract
/// rather than a concrete provider.
#[async_trait]
pub trait LlmCollaborator: Send + Sync {
    async fn identify_url(&self, prompt: &str, descriptors: &[UrlDescriptor]) -> Result<IdentifyUrlAnswer>;

    async fn identify_dynamic_parts(
        &self,
        request_text: &str,
        known_variables: &HashMap<String, String>,
    ) -> Result<IdentifyDynamicPartsAnswer>;

    async fn identify_input_variables(
        &self,
        request_text: &str,
        user_variables: &HashMap<String, String>,
        current_dynamic_parts: &[String],
    ) -> Result<IdentifyInputVariablesAnswer>;

    async fn discover_workflows(&self, trace_summary: &str, prompt: &str) -> Result<DiscoverWorkflowsAnswer>;
}

/// No network, always declines with `no-provider-configured`. This is
/// what the Dependency Resolver and URL Scorer actually exercise in
/// tests, per the "unconfigured" fallback path (§6.3, §7).
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicLlmCollaborator;

#[async_trait]
impl LlmCollaborator for HeuristicLlmCollaborator {
    async fn identify_url(&self, _prompt: &str, _descriptors: &[UrlDescriptor]) -> Result<IdentifyUrlAnswer> {
        Err(Error::no_provider_configured("identify-url: no collaborator configured"))
    }

    async fn identify_dynamic_parts(
        &self,
        _request_text: &str,
        _known_variables: &HashMap<String, String>,
    ) -> Result<IdentifyDynamicPartsAnswer> {
        Err(Error::no_provider_configured(
            "identify-dynamic-parts: no collaborator configured",
        ))
    }

    async fn identify_input_variables(
        &self,
        _request_text: &str,
        _user_variables: &HashMap<String, String>,
        _current_dynamic_parts: &[String],
    ) -> Result<IdentifyInputVariablesAnswer> {
        Err(Error::no_provider_configured(
            "identify-input-variables: no collaborator configured",
        ))
    }

    async fn discover_workflows(&self, _trace_summary: &str, _prompt: &str) -> Result<DiscoverWorkflowsAnswer> {
        Err(Error::no_provider_configured("discover-workflows: no collaborator configured"))
    }
}

#[cfg(feature = "llm-anthropic")]
mod anthropic {
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::time::Duration;

    use reqwest::Client;
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone)]
    pub struct AnthropicConfig {
        pub api_key: String,
        pub base_url: Option<String>,
        pub model: String,
        pub timeout_secs: u64,
    }

    impl AnthropicConfig {
        pub fn new(api_key: impl Into<String>) -> Self {
            Self {
                api_key: api_key.into(),
                base_url: None,
                model: "claude-3-5-sonnet-20241022".to_string(),
                timeout_secs: 60,
            }
        }

        pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
            self.base_url = Some(url.into());
            self
        }

        pub fn with_model(mut self, model: impl Into<String>) -> Self {
            self.model = model.into();
            self
        }
    }

    fn build_http_client(timeout_secs: u64) -> Client {
        let timeout = Duration::from_secs(timeout_secs);
        // Some sandboxed environments panic during proxy auto-detection in
        // reqwest's default client builder; fall back to no-proxy.
        match catch_unwind(AssertUnwindSafe(|| Client::builder().timeout(timeout).build())) {
            Ok(Ok(client)) => client,
            _ => Client::builder()
                .no_proxy()
                .timeout(timeout)
                .build()
                .expect("no-proxy client builder should not fail"),
        }
    }

    /// The §6.3 LLM collaborator backed by the Anthropic Messages API.
    /// Each of the four calls is a single-turn request whose system
    /// prompt demands a JSON object matching the answer schema; the
    /// reply's first text block is parsed as that JSON.
    pub struct AnthropicLlmCollaborator {
        config: AnthropicConfig,
        http: Client,
    }

    impl AnthropicLlmCollaborator {
        const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";
        const API_VERSION: &'static str = "2023-06-01";

        pub fn new(config: AnthropicConfig) -> Self {
            let http = build_http_client(config.timeout_secs);
            Self { config, http }
        }

        fn base_url(&self) -> &str {
            self.config.base_url.as_deref().unwrap_or(Self::DEFAULT_BASE_URL)
        }

        async fn ask_json(&self, system: &str, user: &str) -> Result<serde_json::Value> {
            #[derive(Serialize)]
            struct Message {
                role: &'static str,
                content: String,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                system: &'a str,
                messages: Vec<Message>,
                max_tokens: u32,
            }
            #[derive(Deserialize)]
            struct Content {
                text: Option<String>,
            }
            #[derive(Deserialize)]
            struct Resp {
                content: Vec<Content>,
            }

            let body = Req {
                model: &self.config.model,
                system,
                messages: vec![Message {
                    role: "user",
                    content: user.to_string(),
                }],
                max_tokens: 1024,
            };

            let url = format!("{}/v1/messages", self.base_url());
            let response = self
                .http
                .post(&url)
                .header("x-api-key", &self.config.api_key)
                .header("anthropic-version", Self::API_VERSION)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| Error::no_provider_configured(format!("anthropic request failed: {e}")))?;

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                return Err(Error::no_provider_configured(format!("anthropic error {status}: {text}")));
            }

            let parsed: Resp = response
                .json()
                .await
                .map_err(|e| Error::no_provider_configured(format!("anthropic response parse failed: {e}")))?;
            let text = parsed
                .content
                .into_iter()
                .find_map(|c| c.text)
                .ok_or_else(|| Error::no_provider_configured("anthropic response had no text content"))?;

            serde_json::from_str(&text)
                .map_err(|e| Error::no_provider_configured(format!("collaborator answer was not valid json: {e}")))
        }
    }

    #[async_trait]
    impl LlmCollaborator for AnthropicLlmCollaborator {
        async fn identify_url(&self, prompt: &str, descriptors: &[UrlDescriptor]) -> Result<IdentifyUrlAnswer> {
            let listing = descriptors
                .iter()
                .map(|d| format!("{} {}", d.method, d.url))
                .collect::<Vec<_>>()
                .join("\n");
            let answer = self
                .ask_json(
                    "Given a user's described action and a list of candidate HTTP requests from a recorded trace, \
                     reply with exactly one JSON object {\"url\": \"<the chosen url>\"} naming the request that \
                     realizes the action. Choose a url verbatim from the list.",
                    &format!("Action: {prompt}\n\nCandidates:\n{listing}"),
                )
                .await?;
            serde_json::from_value(answer).map_err(|e| Error::no_provider_configured(e.to_string()))
        }

        async fn identify_dynamic_parts(
            &self,
            request_text: &str,
            known_variables: &HashMap<String, String>,
        ) -> Result<IdentifyDynamicPartsAnswer> {
            let answer = self
                .ask_json(
                    "Given a reconstructed HTTP request and a map of already-known input variables, reply with \
                     exactly one JSON object {\"dynamic_parts\": [\"...\"]} listing literal substrings of the \
                     request that must be produced by an earlier request.",
                    &format!(
                        "Request:\n{request_text}\n\nKnown variables: {}",
                        serde_json::to_string(known_variables).unwrap_or_default()
                    ),
                )
                .await?;
            serde_json::from_value(answer).map_err(|e| Error::no_provider_configured(e.to_string()))
        }

        async fn identify_input_variables(
            &self,
            request_text: &str,
            user_variables: &HashMap<String, String>,
            current_dynamic_parts: &[String],
        ) -> Result<IdentifyInputVariablesAnswer> {
            let answer = self
                .ask_json(
                    "Given a reconstructed HTTP request, user-supplied variables, and the current list of dynamic \
                     parts, reply with exactly one JSON object {\"identified_variables\": [{\"variable_name\": \
                     \"...\", \"variable_value\": \"...\"}], \"removed_dynamic_parts\": [\"...\"]}.",
                    &format!(
                        "Request:\n{request_text}\n\nUser variables: {}\n\nCurrent dynamic parts: {}",
                        serde_json::to_string(user_variables).unwrap_or_default(),
                        serde_json::to_string(current_dynamic_parts).unwrap_or_default()
                    ),
                )
                .await?;
            serde_json::from_value(answer).map_err(|e| Error::no_provider_configured(e.to_string()))
        }

        async fn discover_workflows(&self, trace_summary: &str, prompt: &str) -> Result<DiscoverWorkflowsAnswer> {
            let answer = self
                .ask_json(
                    "Given a summary of a recorded HTTP trace and a user's described action, reply with exactly \
                     one JSON object {\"workflows\": [{\"id\": \"...\", \"name\": \"...\", \"description\": \"...\", \
                     \"category\": \"...\", \"priority\": 0, \"complexity\": \"simple|moderate|complex\", \
                     \"requires_user_input\": false, \"endpoints\": [{\"url\": \"...\", \"method\": \"...\", \
                     \"role\": \"primary|secondary|supporting\"}]}]} grouping the trace into coherent user intents.",
                    &format!("Trace summary:\n{trace_summary}\n\nAction: {prompt}"),
                )
                .await?;
            serde_json::from_value(answer).map_err(|e| Error::no_provider_configured(e.to_string()))
        }
    }
}

#[cfg(feature = "llm-anthropic")]
pub use anthropic::{AnthropicConfig, AnthropicLlmCollaborator};
