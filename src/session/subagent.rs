//! Delegated sub-sessions: the static parser and the network capture roles.
//!
//! Each runs its own [`BoundedLoop`] with a smaller capability set and must
//! write an artifact and a report before a `Result` may end it. The parent
//! session waits for the child to finish.

use super::bounded_loop::{BoundedLoop, SessionPolicy, StopReason, Verdict};
use super::budget::SessionBudget;
use super::prompts;
use super::protocol;
use super::seed;
use super::trace::{TraceScope, TraceWriter};
use crate::audit::{EntryDraft, Flag, agents};
use crate::capabilities::traits::{arg_object, arg_str};
use crate::capabilities::{
    ActionKind, ArtifactTarget, Capability, CapabilityContext, CapabilityOutcome,
    CapabilityRegistry,
};
use crate::error::SessionError;
use crate::llm::{ChatMessage, ReasoningService};
use serde_json::{Value, json};
use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{info, warn};

/// One of the two delegating capabilities.
pub struct SubAgent {
    target: ArtifactTarget,
    service: Arc<dyn ReasoningService>,
    registry: Arc<CapabilityRegistry>,
}

impl SubAgent {
    /// `call_static_parser_agent {html?}`.
    pub fn static_parser(service: Arc<dyn ReasoningService>, registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            target: ArtifactTarget::Static,
            service,
            registry,
        }
    }

    /// `call_network_capture_agent {url?, headers?}`.
    pub fn network_capture(service: Arc<dyn ReasoningService>, registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            target: ArtifactTarget::Dynamic,
            service,
            registry,
        }
    }

    fn agent(&self) -> &'static str {
        match self.target {
            ArtifactTarget::Static => agents::STATIC_PARSER,
            ArtifactTarget::Dynamic => agents::NETWORK_CAPTURE,
        }
    }

    fn role(&self) -> &'static str {
        match self.target {
            ArtifactTarget::Static => "static_parser",
            ArtifactTarget::Dynamic => "network_capture",
        }
    }

    /// What the session hands back when it ended without a result.
    fn empty_result(&self) -> Value {
        match self.target {
            ArtifactTarget::Static => json!({ "candidates": [] }),
            ArtifactTarget::Dynamic => json!({ "manifestUrl": null, "headers": null }),
        }
    }

    fn opening_messages(&self, args: &Value, ctx: &CapabilityContext) -> Vec<ChatMessage> {
        let html = match self.target {
            ArtifactTarget::Static => arg_str(args, "html"),
            ArtifactTarget::Dynamic => None,
        };
        let mut prompt_ctx =
            seed::sub_prompt_context(&ctx.input, &ctx.audit, &ctx.artifacts, self.target, html);
        if let Some(url) = arg_str(args, "url") {
            prompt_ctx.url = Some(url.to_string());
        }
        let mut system = match self.target {
            ArtifactTarget::Static => prompts::static_parser_prompt(&prompt_ctx),
            ArtifactTarget::Dynamic => prompts::network_capture_prompt(&prompt_ctx),
        };
        if let Some(headers) = arg_object(args, "headers") {
            let _ = writeln!(system, "Suggested request headers: {headers}");
        }
        vec![
            ChatMessage::system(system),
            ChatMessage::user(protocol::NEXT_ACTION_REQUEST),
        ]
    }

    async fn delegate(&self, args: Value, ctx: &CapabilityContext) -> anyhow::Result<Value> {
        let sub_ctx = ctx.for_agent(self.agent());
        let scope = match self.target {
            ArtifactTarget::Static => TraceScope::StaticParser,
            ArtifactTarget::Dynamic => TraceScope::NetworkCapture,
        };
        let session = BoundedLoop {
            service: self.service.as_ref(),
            registry: &self.registry,
            ctx: &sub_ctx,
            budget: SessionBudget::delegated(ctx.config.session.sub_max_steps),
            trace: TraceWriter::new(&ctx.debug_dir(), &ctx.run_id, scope),
        };
        let mut messages = self.opening_messages(&args, ctx);
        info!(run_id = %ctx.run_id, role = self.role(), "sub-session started");

        let mut policy = DelegatePolicy {
            ctx: &sub_ctx,
            target: self.target,
        };
        let outcome = session.run(&mut messages, &mut policy).await?;

        let output = match outcome.stop {
            StopReason::Completed(result) | StopReason::Final(result) => result,
            StopReason::BudgetExhausted => {
                warn!(run_id = %ctx.run_id, role = self.role(), steps = outcome.steps, "sub-session exhausted its budget");
                outcome.last_result.unwrap_or_else(|| self.empty_result())
            }
            StopReason::Failed(message) => {
                let error = SessionError::SubSession {
                    role: self.role().to_string(),
                    message,
                };
                warn!(run_id = %ctx.run_id, error = %error, "sub-session failed");
                json!({
                    "ok": false,
                    "error": error.to_string(),
                    "partial": outcome.last_result.unwrap_or_else(|| self.empty_result()),
                })
            }
        };
        Ok(output)
    }
}

impl Capability for SubAgent {
    fn name(&self) -> &str {
        match self.target {
            ArtifactTarget::Static => "call_static_parser_agent",
            ArtifactTarget::Dynamic => "call_network_capture_agent",
        }
    }

    fn description(&self) -> &str {
        match self.target {
            ArtifactTarget::Static => {
                "Delegate to the static parser sub-agent; it extracts manifest candidates and maintains the static algorithm. Args: {html?}"
            }
            ArtifactTarget::Dynamic => {
                "Delegate to the network capture sub-agent; it captures traffic and maintains the dynamic algorithm. Args: {url?, headers?}"
            }
        }
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a CapabilityContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CapabilityOutcome>> + Send + 'a>> {
        Box::pin(async move { self.delegate(args, ctx).await.map(CapabilityOutcome::new) })
    }
}

// ── Policy ───────────────────────────────────────────────────────────────────

struct DelegatePolicy<'a> {
    ctx: &'a CapabilityContext,
    target: ArtifactTarget,
}

impl DelegatePolicy<'_> {
    fn record_result(&self, payload: &Value, flags: &[Flag]) -> anyhow::Result<()> {
        let text = match self.target {
            ArtifactTarget::Static => {
                let count = payload
                    .get("candidates")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                format!("{count} candidates")
            }
            ArtifactTarget::Dynamic => match arg_str(payload, "manifestUrl") {
                Some(url) => format!("manifest {url}"),
                None => "no manifest".to_string(),
            },
        };
        self.ctx.record(
            EntryDraft::new(self.ctx.agent.as_str(), "result", text)
                .payload(payload.clone())
                .flags(flags.iter().copied()),
        )?;
        if self.target == ArtifactTarget::Dynamic {
            if let Some(headers) = arg_object(payload, "headers")
                .and_then(Value::as_object)
                .filter(|h| !h.is_empty())
            {
                self.ctx.record(
                    EntryDraft::new(self.ctx.agent.as_str(), "headers", "key request headers")
                        .payload(Value::Object(headers.clone())),
                )?;
            }
            self.ctx.remember_capture(payload);
        }
        Ok(())
    }
}

impl SessionPolicy for DelegatePolicy<'_> {
    fn on_unparseable(&mut self, _detail: &str, messages: &mut Vec<ChatMessage>) -> Verdict {
        messages.push(ChatMessage::user(protocol::STRICT_RETRY));
        Verdict::Continue
    }

    fn on_result(
        &mut self,
        payload: &Value,
        flags: &[Flag],
        _messages: &mut Vec<ChatMessage>,
    ) -> anyhow::Result<Verdict> {
        self.record_result(payload, flags)?;
        Ok(Verdict::Stop(StopReason::Completed(payload.clone())))
    }

    /// Delegated roles have no final say; a `Final` is read as a result.
    fn on_final(
        &mut self,
        payload: &Value,
        flags: &[Flag],
        messages: &mut Vec<ChatMessage>,
    ) -> anyhow::Result<Verdict> {
        self.on_result(payload, flags, messages)
    }

    fn after_tool(
        &mut self,
        _name: &str,
        outcome: &CapabilityOutcome,
        messages: &mut Vec<ChatMessage>,
    ) -> anyhow::Result<()> {
        if outcome.action == Some(ActionKind::ArtifactWritten) {
            messages.push(ChatMessage::user(protocol::MANDATORY_REPORT));
        }
        Ok(())
    }
}
