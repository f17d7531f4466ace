//! # traceweave
//!
//! An analysis engine that turns a recorded HTTP trace (a browser HAR
//! archive) into a runnable TypeScript client script reproducing one
//! target request and everything it transitively depends on.
//!
//! The pipeline: the [`trace`] parser normalizes an archive into typed
//! records; [`scoring`] ranks them by relevance to a user prompt;
//! [`dag`] holds the dependency graph a [`resolver`] iteratively grows,
//! consulting [`bootstrap`] and [`auth`] when a dependency has no
//! in-trace producer; [`session`] owns the live state machine across
//! that whole process; [`emit`] turns a completed graph into a script;
//! [`cache`] persists finished sessions; [`resources`] exposes
//! read-only views over both; and [`orchestrator`] binds the pipeline
//! end-to-end for one-shot use.
//!
//! [`llm`] is an optional collaborator consulted at a few decision
//! points (master-URL selection, dynamic-part identification); every
//! caller works with or without one configured.

pub mod auth;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod dag;
pub mod emit;
pub mod error;
pub mod ids;
pub mod llm;
pub mod model;
pub mod orchestrator;
pub mod params;
pub mod resolver;
pub mod resources;
pub mod scoring;
pub mod session;
pub mod trace;

pub use cache::{ArtifactKind, CacheMetadata, CompletedSessionCache};
pub use config::Config;
pub use dag::{Dag, DagEdge, DagNode, NodeId, NodeKind};
pub use error::{Error, Result};
pub use ids::{GroupId, SessionId};
pub use llm::{HeuristicLlmCollaborator, LlmCollaborator};
pub use orchestrator::{OrchestrationOutcome, WorkflowOrchestrator};
pub use resources::ResourceSurface;
pub use session::{Session, SessionManager};

#[cfg(feature = "llm-anthropic")]
pub use llm::{AnthropicConfig, AnthropicLlmCollaborator};
