//! Per-step diagnostic dumps of what was sent to and received from the
//! reasoning service. Separate from tracing logs; writes never fail a run.

use crate::llm::{ChatMessage, ChatResponse};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const TAIL_CHARS: usize = 4000;
const TOP_OUTPUT_PREFIX: &str = "llm_output_step_";

/// Which session a trace directory belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceScope {
    TopLevel,
    StaticParser,
    NetworkCapture,
}

impl TraceScope {
    fn subdir(self) -> Option<&'static str> {
        match self {
            Self::TopLevel => None,
            Self::StaticParser => Some("subagent_static"),
            Self::NetworkCapture => Some("subagent_network"),
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::TopLevel => "LLM",
            Self::StaticParser => "Static SubAgent",
            Self::NetworkCapture => "Network SubAgent",
        }
    }

    fn input_file(self, step: u32) -> String {
        match self {
            Self::TopLevel => format!("llm_input_step_{step}.md"),
            _ => format!("input_{step}.md"),
        }
    }

    fn output_file(self, step: u32) -> String {
        match self {
            Self::TopLevel => format!("{TOP_OUTPUT_PREFIX}{step}.md"),
            _ => format!("output_{step}.md"),
        }
    }
}

pub struct TraceWriter {
    run_id: String,
    dir: PathBuf,
    scope: TraceScope,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn render_messages(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("### {}\n\n{}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

impl TraceWriter {
    /// `run_dir` is `<log_dir>/debug/<run_id>`.
    pub fn new(run_dir: &Path, run_id: &str, scope: TraceScope) -> Self {
        let dir = match scope.subdir() {
            Some(sub) => run_dir.join(sub),
            None => run_dir.to_path_buf(),
        };
        Self {
            run_id: run_id.to_string(),
            dir,
            scope,
        }
    }

    fn write(&self, file: &str, content: &str) {
        let path = self.dir.join(file);
        let result = fs::create_dir_all(&self.dir).and_then(|()| fs::write(&path, content));
        if let Err(err) = result {
            warn!(path = %path.display(), error = %err, "trace write failed");
        }
    }

    fn preamble(&self, heading: &str) -> String {
        match self.scope {
            TraceScope::TopLevel => format!(
                "{heading}\n- runId: {}\n- timestamp: {}\n",
                self.run_id,
                now()
            ),
            _ => heading.to_string(),
        }
    }

    pub fn write_initial(&self, messages: &[ChatMessage]) {
        let body = format!(
            "{}\n## Messages\n{}",
            self.preamble("# Initial LLM Input"),
            render_messages(messages)
        );
        self.write("initial_input.md", &body);
    }

    pub fn write_input(&self, step: u32, messages: &[ChatMessage]) {
        let heading = format!("# {} Input · Step {step}", self.scope.title());
        let body = format!(
            "{}\n## Messages\n{}",
            self.preamble(&heading),
            render_messages(messages)
        );
        self.write(&self.scope.input_file(step), &body);
    }

    pub fn write_output(&self, step: u32, response: &ChatResponse) {
        let heading = format!("# {} Output · Step {step}", self.scope.title());
        let raw = serde_json::to_string_pretty(response).unwrap_or_default();
        let body = format!(
            "{}\n## content\n{}\n\n## raw\n```json\n{raw}\n```",
            self.preamble(&heading),
            response.content
        );
        self.write(&self.scope.output_file(step), &body);
    }

    /// Record a transport failure in place of an output.
    pub fn write_failure(&self, step: u32, error: &str) {
        let heading = format!("# {} Output · Step {step}", self.scope.title());
        let body = format!("{}\n## error\n{error}", self.preamble(&heading));
        self.write(&self.scope.output_file(step), &body);
    }
}

// ── Reading back ─────────────────────────────────────────────────────────────

/// Tails of the most recent output traces of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugRecent {
    pub llm_outputs: Vec<String>,
    pub sub_outputs: Vec<String>,
}

/// Numeric step in `<prefix><N>.md`.
fn step_of(name: &str, prefix: &str) -> Option<u32> {
    name.strip_prefix(prefix)?.strip_suffix(".md")?.parse().ok()
}

/// The newest `limit` files in `dir` named `<prefix><N>.md`, oldest first.
fn newest_steps(dir: &Path, prefix: &str, limit: usize) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut found: Vec<(u32, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            step_of(&name, prefix).map(|step| (step, entry.path()))
        })
        .collect();
    found.sort_by_key(|(step, _)| *step);
    let skip = found.len().saturating_sub(limit);
    found.into_iter().skip(skip).map(|(_, path)| path).collect()
}

fn tail(path: &Path) -> String {
    let Ok(content) = fs::read_to_string(path) else {
        return String::new();
    };
    let total = content.chars().count();
    content.chars().skip(total.saturating_sub(TAIL_CHARS)).collect()
}

pub fn read_recent(run_dir: &Path, limit: usize) -> DebugRecent {
    let llm_outputs = newest_steps(run_dir, TOP_OUTPUT_PREFIX, limit)
        .iter()
        .map(|p| tail(p))
        .collect();
    let sub_outputs = [TraceScope::StaticParser, TraceScope::NetworkCapture]
        .into_iter()
        .filter_map(TraceScope::subdir)
        .flat_map(|sub| newest_steps(&run_dir.join(sub), "output_", limit))
        .map(|p| tail(&p))
        .collect();
    DebugRecent {
        llm_outputs,
        sub_outputs,
    }
}
