//! The top-level session of a run: seeds the conversation, drives the
//! coordinator through [`BoundedLoop`], and turns whatever happens into a
//! terminal outcome.

use super::bounded_loop::{BoundedLoop, SessionPolicy, StopReason, Verdict};
use super::budget::SessionBudget;
use super::catalog;
use super::protocol;
use super::seed;
use super::trace::{TraceScope, TraceWriter};
use crate::audit::{AuditStore, EntryDraft, Flag, agents};
use crate::capabilities::traits::arg_str;
use crate::capabilities::{
    ArtifactStore, ArtifactTarget, CapabilityContext, CapabilityOutcome, CapabilityRegistry,
    Collaborators, RunMemory, TaskInput, diagnose, finalize_artifact,
};
use crate::config::Config;
use crate::error::SessionError;
use crate::llm::{ChatMessage, ReasoningService, ServiceSet};
use crate::retention::{CompactionSettings, Compactor};
use crate::session::trace::read_recent;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Capabilities whose output carries manifest candidates.
const CANDIDATE_SOURCES: [&str; 2] = ["static_extract_html_candidates", "call_static_parser_agent"];

// ── Workspace ────────────────────────────────────────────────────────────────

/// State shared by every run of the process.
pub struct Workspace {
    pub config: Arc<Config>,
    pub audit: Arc<AuditStore>,
    pub artifacts: Arc<ArtifactStore>,
    pub coordinator: Arc<dyn ReasoningService>,
    pub registry: Arc<CapabilityRegistry>,
    pub collaborators: Collaborators,
}

impl Workspace {
    /// Services built from `config`.
    pub fn open(config: Config) -> anyhow::Result<Self> {
        let services = ServiceSet::from_config(&config)?;
        Self::with_services(config, &services)
    }

    pub fn with_services(config: Config, services: &ServiceSet) -> anyhow::Result<Self> {
        let log_dir = config.log_dir();
        let audit = Arc::new(AuditStore::open(&log_dir, config.retention.clone())?);
        audit.set_compactor(Arc::new(Compactor::new(
            Arc::clone(&services.history_compressor),
            CompactionSettings::from_config(&config.retention),
        )));
        let artifacts = Arc::new(ArtifactStore::open(&log_dir)?);
        let registry = Arc::new(catalog::top_level_registry(services)?);
        let collaborators = Collaborators::from_config(&config.capture);
        Ok(Self {
            config: Arc::new(config),
            audit,
            artifacts,
            coordinator: Arc::clone(&services.coordinator),
            registry,
            collaborators,
        })
    }

    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    /// Coordinator-side context for one run.
    pub fn context(&self, run_id: &str, input: TaskInput) -> CapabilityContext {
        CapabilityContext {
            run_id: run_id.to_string(),
            agent: agents::COORDINATOR.to_string(),
            input: Arc::new(input),
            config: Arc::clone(&self.config),
            audit: Arc::clone(&self.audit),
            artifacts: Arc::clone(&self.artifacts),
            collaborators: self.collaborators.clone(),
            memory: Arc::new(Mutex::new(RunMemory::default())),
        }
    }
}

// ── Run ──────────────────────────────────────────────────────────────────────

/// Terminal outcome of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Done { result: Value, steps: u32 },
    Failed { error: String, steps: u32 },
}

/// Drive one run to a terminal outcome. Never returns while still iterating.
///
/// `progress` is told the current step before every service call.
pub async fn run_session(
    workspace: &Workspace,
    run_id: &str,
    input: TaskInput,
    progress: &(dyn Fn(u32) + Send + Sync),
) -> RunOutcome {
    let raw_steps = input.max_steps.unwrap_or(workspace.config.session.max_steps);
    let ctx = workspace.context(run_id, input);
    let session = BoundedLoop {
        service: workspace.coordinator.as_ref(),
        registry: &workspace.registry,
        ctx: &ctx,
        budget: SessionBudget::top_level(raw_steps),
        trace: TraceWriter::new(&ctx.debug_dir(), run_id, TraceScope::TopLevel),
    };
    info!(run_id, max_steps = session.budget.max_steps, "run started");

    let mut messages = seed::top_level_messages(
        &ctx.input,
        &ctx.audit,
        &ctx.artifacts,
        &workspace.registry.describe(),
    );
    session.trace.write_initial(&messages);

    let mut policy = CoordinatorPolicy {
        ctx: &ctx,
        progress,
        step: 0,
    };
    let ended = session.run(&mut messages, &mut policy).await;
    let outcome = match ended {
        Ok(ended) => match ended.stop {
            StopReason::Final(result) | StopReason::Completed(result) => RunOutcome::Done {
                result,
                steps: ended.steps,
            },
            StopReason::Failed(error) => fail(&ctx, error, ended.steps, false),
            StopReason::BudgetExhausted => {
                let error = SessionError::BudgetExhausted(session.budget.max_steps).to_string();
                fail(&ctx, error, ended.steps, true)
            }
        },
        Err(err) => fail(&ctx, format!("{err:#}"), policy.step, true),
    };

    match &outcome {
        RunOutcome::Done { steps, .. } => info!(run_id, steps, "run done"),
        RunOutcome::Failed { error, steps } => warn!(run_id, steps, error = %error, "run failed"),
    }
    outcome
}

/// Record the failure and its diagnosis. `record_error` is false when the
/// loop already wrote the error entry.
fn fail(ctx: &CapabilityContext, error: String, steps: u32, record_error: bool) -> RunOutcome {
    if record_error
        && let Err(err) = ctx.record(EntryDraft::new(agents::COORDINATOR, "error", error.as_str()))
    {
        warn!(run_id = %ctx.run_id, error = %err, "could not record run failure");
    }
    if let Err(err) = diagnose(ctx, &error, &[Flag::Error]) {
        warn!(run_id = %ctx.run_id, error = %err, "could not record diagnosis");
    }
    RunOutcome::Failed { error, steps }
}

// ── Policy ───────────────────────────────────────────────────────────────────

struct CoordinatorPolicy<'a> {
    ctx: &'a CapabilityContext,
    progress: &'a (dyn Fn(u32) + Send + Sync),
    step: u32,
}

impl SessionPolicy for CoordinatorPolicy<'_> {
    fn on_step(&mut self, step: u32) {
        self.step = step;
        (self.progress)(step);
    }

    fn on_unparseable(&mut self, detail: &str, _messages: &mut Vec<ChatMessage>) -> Verdict {
        Verdict::Stop(StopReason::Failed(detail.to_string()))
    }

    /// Informational at this level.
    fn on_result(
        &mut self,
        payload: &Value,
        flags: &[Flag],
        messages: &mut Vec<ChatMessage>,
    ) -> anyhow::Result<Verdict> {
        self.ctx.record(
            EntryDraft::new(agents::COORDINATOR, "result", "intermediate result")
                .payload(payload.clone())
                .flags(flags.iter().copied()),
        )?;
        messages.push(ChatMessage::user(protocol::RESULT_ACKNOWLEDGED));
        Ok(Verdict::Continue)
    }

    fn on_final(
        &mut self,
        payload: &Value,
        flags: &[Flag],
        messages: &mut Vec<ChatMessage>,
    ) -> anyhow::Result<Verdict> {
        let field = |key: &str| payload.get(key).cloned().unwrap_or(Value::Null);
        let result = json!({
            "manifestUrl": field("manifestUrl"),
            "filePath": field("filePath"),
            "notes": field("notes"),
        });
        self.ctx.record(
            EntryDraft::new(
                agents::COORDINATOR,
                "final",
                format!(
                    "done: manifest={} file={}",
                    arg_str(payload, "manifestUrl").unwrap_or("null"),
                    arg_str(payload, "filePath").unwrap_or("null")
                ),
            )
            .payload(result.clone())
            .flags(flags.iter().copied()),
        )?;

        let pick = ArtifactTarget::from_arg(payload.get("algo_pick")).unwrap_or(ArtifactTarget::Static);
        let finalized = finalize_artifact(self.ctx, pick, self.ctx.input.algo_name.as_deref())?;
        messages.push(protocol::tool_output("code_maintainer_agent_finalize", &finalized));
        Ok(Verdict::Stop(StopReason::Final(result)))
    }

    fn on_tool_call(&mut self, name: &str, args: &Value, flags: &[Flag]) -> anyhow::Result<()> {
        self.ctx.record(
            EntryDraft::new(agents::COORDINATOR, "tool_call", format!("call {name}"))
                .payload(json!({ "tool": name, "args": args }))
                .flags(flags.iter().copied()),
        )?;
        Ok(())
    }

    fn after_tool(
        &mut self,
        name: &str,
        outcome: &CapabilityOutcome,
        messages: &mut Vec<ChatMessage>,
    ) -> anyhow::Result<()> {
        let limit = self.ctx.config.session.debug_feedback_limit;
        let recent = read_recent(&self.ctx.debug_dir(), limit);
        messages.push(protocol::debug_recent(&json!(recent)));

        if CANDIDATE_SOURCES.contains(&name)
            && let Some(candidates) = outcome.output.get("candidates").and_then(Value::as_array)
        {
            if candidates.is_empty() {
                messages.push(protocol::comment(protocol::NO_CANDIDATES_COMMENT));
            } else {
                messages.push(protocol::candidates_hint(candidates.len()));
            }
        }
        Ok(())
    }
}
