use super::artifacts::ArtifactStore;
use super::collaborators::{AcceptanceFlow, NetworkCapture, UnconfiguredAcceptance, UnconfiguredCapture};
use super::page::PageFetcher;
use crate::audit::{AuditEntry, AuditStore, EntryDraft};
use crate::config::{CaptureConfig, Config};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use strum::{Display, EnumString};

/// Which extraction path the caller would like tried first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Prefer {
    Static,
    Dynamic,
    #[default]
    Auto,
}

/// What a run was asked to do.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    /// Name to store the finalized artifact under.
    #[serde(default)]
    pub algo_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub prefer: Prefer,
    /// Per-run step budget; falls back to the configured one.
    #[serde(default)]
    pub max_steps: Option<i64>,
}

impl TaskInput {
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// One-line summary handed to every session as upstream context.
    pub fn summary(&self) -> String {
        let notes: String = self.notes.as_deref().unwrap_or_default().chars().take(80).collect();
        format!(
            "AlgoName={} | URL={} | HTML={} | Prefer={} | Notes={}",
            self.algo_name.as_deref().unwrap_or_default(),
            self.url.as_deref().unwrap_or_default(),
            self.html.as_deref().is_some_and(|h| !h.is_empty()),
            self.prefer,
            notes
        )
    }
}

/// Facts a run picks up along the way and later capabilities fall back to.
#[derive(Debug, Clone, Default)]
pub struct RunMemory {
    pub last_headers: Option<Value>,
    pub last_manifest_url: Option<String>,
    /// Preprocessed or fetched page HTML, preferred over the task's own HTML.
    pub working_html: Option<String>,
}

/// External collaborators capabilities may hand work to.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<PageFetcher>,
    pub capture: Arc<dyn NetworkCapture>,
    pub acceptance: Arc<dyn AcceptanceFlow>,
}

impl Collaborators {
    /// Real page fetcher, nothing wired for capture or acceptance.
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            fetcher: Arc::new(PageFetcher::from_config(config)),
            capture: Arc::new(UnconfiguredCapture),
            acceptance: Arc::new(UnconfiguredAcceptance),
        }
    }

    pub fn with_capture(mut self, capture: Arc<dyn NetworkCapture>) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_acceptance(mut self, acceptance: Arc<dyn AcceptanceFlow>) -> Self {
        self.acceptance = acceptance;
        self
    }
}

/// Everything a capability may touch during one call.
#[derive(Clone)]
pub struct CapabilityContext {
    pub run_id: String,
    /// Agent name entries written on behalf of the calling session carry.
    pub agent: String,
    pub input: Arc<TaskInput>,
    pub config: Arc<Config>,
    pub audit: Arc<AuditStore>,
    pub artifacts: Arc<ArtifactStore>,
    pub collaborators: Collaborators,
    pub memory: Arc<Mutex<RunMemory>>,
}

impl CapabilityContext {
    /// Same run, entries attributed to another agent.
    pub fn for_agent(&self, agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            ..self.clone()
        }
    }

    /// Append to the shared audit store.
    pub fn record(&self, draft: EntryDraft) -> anyhow::Result<AuditEntry> {
        Ok(self.audit.append(draft)?)
    }

    /// Root of this run's trace files.
    pub fn debug_dir(&self) -> PathBuf {
        debug_dir(self.audit.log_dir(), &self.run_id)
    }

    pub fn memory(&self) -> MutexGuard<'_, RunMemory> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// HTML to work on: the run's working copy first, then the task's own.
    pub fn known_html(&self) -> Option<String> {
        self.memory()
            .working_html
            .clone()
            .or_else(|| self.input.html.clone())
            .filter(|html| !html.is_empty())
    }

    pub fn task_url(&self) -> Option<&str> {
        self.input.url.as_deref().filter(|u| !u.trim().is_empty())
    }

    /// Keep non-empty headers and a manifest URL from a capture-shaped value.
    pub fn remember_capture(&self, value: &Value) {
        let mut memory = self.memory();
        if let Some(headers) = value.get("headers").and_then(Value::as_object)
            && !headers.is_empty()
        {
            memory.last_headers = Some(Value::Object(headers.clone()));
        }
        if let Some(url) = value.get("manifestUrl").and_then(Value::as_str)
            && !url.is_empty()
        {
            memory.last_manifest_url = Some(url.to_string());
        }
    }
}

/// `<log_dir>/debug/<run_id>`.
pub fn debug_dir(log_dir: &Path, run_id: &str) -> PathBuf {
    log_dir.join("debug").join(run_id)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::RetentionConfig;
    use tempfile::TempDir;

    /// A context over a throwaway log directory.
    pub(crate) fn context(dir: &TempDir, input: TaskInput) -> CapabilityContext {
        let config = Config::default();
        let audit = Arc::new(AuditStore::open(dir.path(), RetentionConfig::default()).unwrap());
        let artifacts = Arc::new(ArtifactStore::open(dir.path()).unwrap());
        CapabilityContext {
            run_id: "run_test".into(),
            agent: crate::audit::agents::COORDINATOR.into(),
            input: Arc::new(input),
            collaborators: Collaborators::from_config(&config.capture),
            config: Arc::new(config),
            audit,
            artifacts,
            memory: Arc::new(Mutex::new(RunMemory::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn summary_truncates_notes() {
        let input = TaskInput {
            url: Some("https://a.test/v".into()),
            notes: Some("n".repeat(200)),
            ..TaskInput::default()
        };
        let summary = input.summary();
        assert!(summary.starts_with("AlgoName= | URL=https://a.test/v | HTML=false | Prefer=auto"));
        assert!(summary.ends_with(&"n".repeat(80)));
    }

    #[test]
    fn remember_capture_ignores_empty_headers() {
        let dir = TempDir::new().unwrap();
        let ctx = testing::context(&dir, TaskInput::default());
        ctx.remember_capture(&json!({"headers": {}, "manifestUrl": "https://cdn/a.m3u8"}));
        assert!(ctx.memory().last_headers.is_none());
        ctx.remember_capture(&json!({"headers": {"Referer": "https://a"}}));
        let memory = ctx.memory();
        assert_eq!(memory.last_headers, Some(json!({"Referer": "https://a"})));
        assert_eq!(memory.last_manifest_url.as_deref(), Some("https://cdn/a.m3u8"));
    }

    #[test]
    fn working_html_shadows_task_html() {
        let dir = TempDir::new().unwrap();
        let ctx = testing::context(
            &dir,
            TaskInput {
                html: Some("<p>task</p>".into()),
                ..TaskInput::default()
            },
        );
        assert_eq!(ctx.known_html().as_deref(), Some("<p>task</p>"));
        ctx.memory().working_html = Some("<p>work</p>".into());
        assert_eq!(ctx.known_html().as_deref(), Some("<p>work</p>"));
    }
}
