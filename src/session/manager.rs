//! The Session Manager (§4.7): owns the live set of sessions, their
//! state machines, logs, and completion analysis.
//!
//! Sessions are stored behind one `tokio::sync::Mutex` each in a
//! `dashmap::DashMap` table (the same concurrent-table shape this
//! crate's workspace lineage uses for shared session/connection state),
//! so independent sessions never serialize behind one global lock
//! while all mutation of a single session's DAG, state, and log is
//! still strictly ordered (§5).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info_span, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ids::SessionId;
use crate::model::CookieSnapshot;
use crate::trace::{self, ParseOptions, QualityGrade};

use super::{CompletionRecord, LogLevel, Session};

/// A handle to one session's serialized state, shared by every caller
/// holding the same [`SessionId`].
pub type SessionHandle = Arc<Mutex<Session>>;

pub struct SessionManager {
    config: Config,
    sessions: DashMap<SessionId, SessionHandle>,
}

impl SessionManager {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Parse the trace (and optional cookie snapshot) and construct a
    /// new session (§4.7). Parsing runs on a blocking thread pool so a
    /// large archive never stalls the caller's executor.
    pub async fn create_session(
        &self,
        trace_path: impl AsRef<Path>,
        cookie_path: Option<&Path>,
        prompt: String,
        input_variables: HashMap<String, String>,
        parse_options: ParseOptions,
    ) -> Result<SessionId> {
        if self.sessions.len() >= self.config.max_concurrent_sessions {
            return Err(Error::capacity_exceeded(self.config.max_concurrent_sessions));
        }

        let span = info_span!("create_session");
        let _enter = span.enter();

        let trace_path = trace_path.as_ref().to_path_buf();
        let trace = tokio::task::spawn_blocking(move || trace::parse_path(&trace_path, &parse_options))
            .await
            .map_err(|e| Error::Internal(format!("trace parse task panicked: {e}")))??;

        if trace.validation.grade == QualityGrade::Empty {
            return Err(Error::har_quality_insufficient(
                trace.validation.grade,
                trace.validation.issues.clone(),
                trace.validation.recommendations.clone(),
            ));
        }

        let cookies = match cookie_path {
            Some(path) => {
                let bytes = tokio::fs::read(path).await?;
                let value: serde_json::Value = serde_json::from_slice(&bytes)?;
                CookieSnapshot::from_json(&value)
            }
            None => None,
        };

        let id = SessionId::new();
        let mut session = Session::new(id, prompt, trace, cookies);
        session.input_variables = input_variables;

        if session.trace.validation.grade == QualityGrade::Poor {
            warn!(session = %id, "trace quality is poor; resolution may leave nodes unresolved");
            session.add_log(
                LogLevel::Warn,
                "trace quality graded poor; some dependencies may not resolve",
                None,
            );
        }

        self.sessions.insert(id, Arc::new(Mutex::new(session)));
        Ok(id)
    }

    /// Internal accessor shared by the read/write helpers below.
    fn handle(&self, id: SessionId) -> Result<SessionHandle> {
        self.sessions.get(&id).map(|entry| entry.clone()).ok_or_else(|| Error::session_not_found(id))
    }

    pub async fn with_session<R>(&self, id: SessionId, f: impl FnOnce(&Session) -> R) -> Result<R> {
        let handle = self.handle(id)?;
        let guard = handle.lock().await;
        Ok(f(&guard))
    }

    pub async fn with_session_mut<R>(&self, id: SessionId, f: impl FnOnce(&mut Session) -> R) -> Result<R> {
        let handle = self.handle(id)?;
        let mut guard = handle.lock().await;
        Ok(f(&mut guard))
    }

    /// A cloned snapshot of the session, for callers (cache, emitter)
    /// that need to operate on owned state outside the lock.
    pub async fn get_session(&self, id: SessionId) -> Result<Session> {
        self.with_session(id, |s| s.clone()).await
    }

    pub fn list_sessions(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    pub fn delete_session(&self, id: SessionId) -> Result<()> {
        self.sessions
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::session_not_found(id))
    }

    pub async fn add_log(&self, id: SessionId, level: LogLevel, message: impl Into<String>, data: Option<serde_json::Value>) -> Result<()> {
        let message = message.into();
        self.with_session_mut(id, move |s| s.add_log(level, message, data)).await
    }

    pub async fn sync_completion_state(&self, id: SessionId) -> Result<()> {
        self.with_session_mut(id, |s| s.sync_completion_state()).await
    }

    pub async fn analyze_completion_state(&self, id: SessionId) -> Result<CompletionRecord> {
        self.with_session(id, |s| s.analyze_completion_state()).await
    }

    pub fn clear_all_sessions(&self) {
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_har_bytes() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "log": {
                "version": "1.2", "creator": {"name": "t", "version": "1"},
                "entries": (0..6).map(|i| serde_json::json!({
                    "startedDateTime": "2024-01-01T00:00:00Z", "time": 1.0,
                    "request": {"method": "GET", "url": format!("https://svc/api/item/{i}"), "httpVersion": "HTTP/1.1", "headers": [], "queryString": []},
                    "response": {"status": 200, "statusText": "OK", "httpVersion": "HTTP/1.1", "headers": [], "content": {"size": 2, "mimeType": "application/json", "text": "{}"}},
                    "timings": {"send": 0.0, "wait": 0.0, "receive": 0.0}
                })).collect::<Vec<_>>()
            }
        })).unwrap()
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[tokio::test]
    async fn creates_and_retrieves_a_session() {
        let manager = SessionManager::new(Config::default());
        let file = write_temp(&sample_har_bytes());
        let id = manager
            .create_session(file.path(), None, "browse items".to_string(), HashMap::new(), ParseOptions::default())
            .await
            .unwrap();
        let session = manager.get_session(id).await.unwrap();
        assert_eq!(session.trace.entries.len(), 6);
    }

    #[tokio::test]
    async fn rejects_empty_trace_with_quality_insufficient() {
        let manager = SessionManager::new(Config::default());
        let empty = serde_json::to_vec(&serde_json::json!({
            "log": {"version": "1.2", "creator": {"name": "t", "version": "1"}, "entries": []}
        }))
        .unwrap();
        let file = write_temp(&empty);
        let err = manager
            .create_session(file.path(), None, "x".to_string(), HashMap::new(), ParseOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyArchive));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let manager = SessionManager::new(Config::default());
        let err = manager.get_session(SessionId::new()).await.unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn enforces_capacity() {
        let manager = SessionManager::new(Config::default().with_max_concurrent_sessions(1));
        let file = write_temp(&sample_har_bytes());
        manager
            .create_session(file.path(), None, "a".to_string(), HashMap::new(), ParseOptions::default())
            .await
            .unwrap();
        let err = manager
            .create_session(file.path(), None, "b".to_string(), HashMap::new(), ParseOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { .. }));
    }
}
