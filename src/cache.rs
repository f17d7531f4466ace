//! The Completed-Session Cache (§4.8): on successful code emission the
//! session manager hands the session here, which materializes a
//! per-session directory under a shared root and serves it back on
//! demand.
//!
//! Writes use a temp-file-then-rename discipline so a reader never
//! observes a partially written artifact (§5, testable property 8).
//! Metadata is loaded lazily and held in a process-local map guarded by
//! one `std::sync::Mutex`, matching §5's "append-only metadata map
//! entries guarded by a mutex" — the same `Arc<Mutex<_>>`-per-store
//! shape used elsewhere in this crate's lineage, just holding a
//! `HashMap` instead of a connection handle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::info_span;

use crate::error::{Error, Result};
use crate::ids::SessionId;
use crate::session::{CompletionRecord, Session};
use crate::trace::{self, QualityGrade};

const TRACE_FILE: &str = "original.har";
const COOKIES_FILE: &str = "cookies.json";
const SCRIPT_FILE: &str = "generated.ts";
const METADATA_FILE: &str = "artifacts.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Trace,
    Cookies,
    Script,
}

impl ArtifactKind {
    fn filename(self) -> &'static str {
        match self {
            ArtifactKind::Trace => TRACE_FILE,
            ArtifactKind::Cookies => COOKIES_FILE,
            ArtifactKind::Script => SCRIPT_FILE,
        }
    }

    fn label(self) -> &'static str {
        match self {
            ArtifactKind::Trace => "trace",
            ArtifactKind::Cookies => "cookies",
            ArtifactKind::Script => "script",
        }
    }
}

/// §4.8's cache manifest / metadata document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub session_id: SessionId,
    pub completed_at: DateTime<Utc>,
    pub prompt: String,
    pub analysis: CompletionRecord,
    pub quality_grade: QualityGrade,
    pub total_nodes: usize,
    pub code_generated: bool,
    pub available_artifacts: Vec<String>,
    pub last_accessed_at: DateTime<Utc>,
}

pub struct CompletedSessionCache {
    root: PathBuf,
    metadata: Mutex<HashMap<SessionId, CacheMetadata>>,
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("part")
    ));
    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| Error::cache_write_failed(e.to_string()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::cache_write_failed(e.to_string()))?;
    Ok(())
}

impl CompletedSessionCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            metadata: Mutex::new(HashMap::new()),
        }
    }

    fn session_dir(&self, id: SessionId) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Persist a finished session's artifacts and record its metadata
    /// (§4.8). The caller runs completion analysis and code emission
    /// beforehand and passes the result in; this never re-derives them.
    pub async fn cache(&self, session: &Session, analysis: CompletionRecord) -> Result<CacheMetadata> {
        let span = info_span!("cache_session", session = %session.id);
        let _enter = span.enter();

        let dir = self.session_dir(session.id);
        tokio::fs::create_dir_all(&dir).await?;

        let mut available = Vec::new();

        let trace_bytes = trace::to_har_bytes(&session.trace)?;
        write_atomic(&dir.join(TRACE_FILE), &trace_bytes).await?;
        available.push(ArtifactKind::Trace.label().to_string());

        if let Some(cookies) = &session.cookies {
            let bytes = serde_json::to_vec_pretty(cookies)?;
            write_atomic(&dir.join(COOKIES_FILE), &bytes).await?;
            available.push(ArtifactKind::Cookies.label().to_string());
        }

        let code_generated = session.generated_script.is_some();
        if let Some(script) = &session.generated_script {
            write_atomic(&dir.join(SCRIPT_FILE), script.as_bytes()).await?;
            available.push(ArtifactKind::Script.label().to_string());
        }

        let metadata = CacheMetadata {
            session_id: session.id,
            completed_at: Utc::now(),
            prompt: session.prompt.clone(),
            analysis,
            quality_grade: session.trace.validation.grade,
            total_nodes: session.dag.node_count(),
            code_generated,
            available_artifacts: available,
            last_accessed_at: Utc::now(),
        };

        let metadata_bytes = serde_json::to_vec_pretty(&metadata)?;
        write_atomic(&dir.join(METADATA_FILE), &metadata_bytes).await?;

        self.metadata.lock().unwrap().insert(session.id, metadata.clone());
        Ok(metadata)
    }

    async fn load_metadata_from_disk(&self, id: SessionId) -> Result<CacheMetadata> {
        let path = self.session_dir(id).join(METADATA_FILE);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| Error::cache_miss(id, "metadata"))?;
        let metadata: CacheMetadata = serde_json::from_slice(&bytes)?;
        Ok(metadata)
    }

    /// Metadata is loaded lazily on first access and held in the
    /// process-local map from then on (§4.8).
    pub async fn get_cached_metadata(&self, id: SessionId) -> Result<CacheMetadata> {
        if let Some(cached) = self.metadata.lock().unwrap().get(&id).cloned() {
            return Ok(cached);
        }
        let mut metadata = self.load_metadata_from_disk(id).await?;
        metadata.last_accessed_at = Utc::now();
        self.metadata.lock().unwrap().insert(id, metadata.clone());
        Ok(metadata)
    }

    /// Artifacts are loaded on demand, never cached in memory (§4.8).
    pub async fn get_cached_artifact(&self, id: SessionId, kind: ArtifactKind) -> Result<Vec<u8>> {
        let path = self.session_dir(id).join(kind.filename());
        tokio::fs::read(&path).await.map_err(|_| Error::cache_miss(id, kind.label()))
    }

    /// All sessions with a cache directory under the root, loaded
    /// concurrently (§9: the `futures::future::join_all` fan-out this
    /// crate's lineage uses for independent I/O-bound loads).
    pub async fn all_cached_sessions(&self) -> Result<Vec<CacheMetadata>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(id) = SessionId::parse(name) {
                    ids.push(id);
                }
            }
        }

        let loads = ids.into_iter().map(|id| self.get_cached_metadata(id));
        let results = join_all(loads).await;
        Ok(results.into_iter().filter_map(|r| r.ok()).collect())
    }

    pub async fn remove_cached(&self, id: SessionId) -> Result<()> {
        let dir = self.session_dir(id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::cache_miss(id, "session directory"));
            }
            Err(e) => return Err(e.into()),
        }
        self.metadata.lock().unwrap().remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::analyze_completion_state;
    use crate::trace::{parse, ParseOptions};

    fn sample_session() -> Session {
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
        let mut session = Session::new(SessionId::new(), "browse".to_string(), trace, None);
        session.generated_script = Some("export async function run() {}".to_string());
        session
    }

    #[tokio::test]
    async fn caches_and_retrieves_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CompletedSessionCache::new(dir.path());
        let session = sample_session();
        let analysis = analyze_completion_state(&session);

        let manifest = cache.cache(&session, analysis).await.unwrap();
        assert!(manifest.code_generated);
        assert!(manifest.available_artifacts.contains(&"script".to_string()));

        let fetched = cache.get_cached_metadata(session.id).await.unwrap();
        assert_eq!(fetched.session_id, session.id);

        let script = cache.get_cached_artifact(session.id, ArtifactKind::Script).await.unwrap();
        assert_eq!(script, b"export async function run() {}");
    }

    #[tokio::test]
    async fn reports_cache_miss_for_unknown_session() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CompletedSessionCache::new(dir.path());
        let err = cache.get_cached_metadata(SessionId::new()).await.unwrap_err();
        assert!(matches!(err, Error::CacheMiss(..)));
    }

    #[tokio::test]
    async fn remove_cached_clears_disk_and_memory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CompletedSessionCache::new(dir.path());
        let session = sample_session();
        let analysis = analyze_completion_state(&session);
        cache.cache(&session, analysis).await.unwrap();

        cache.remove_cached(session.id).await.unwrap();
        let err = cache.get_cached_metadata(session.id).await.unwrap_err();
        assert!(matches!(err, Error::CacheMiss(..)));
    }

    #[tokio::test]
    async fn all_cached_sessions_lists_every_materialized_session() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CompletedSessionCache::new(dir.path());
        for _ in 0..3 {
            let session = sample_session();
            let analysis = analyze_completion_state(&session);
            cache.cache(&session, analysis).await.unwrap();
        }
        let all = cache.all_cached_sessions().await.unwrap();
        assert_eq!(all.len(), 3);
    }
}
