//! The directive loop shared by the top-level run and delegated sub-sessions.
//!
//! Each step normalizes the conversation, asks the reasoning service for the
//! next directive, and dispatches it. What a `Result`, a `Final` or an
//! unusable reply means is left to a [`SessionPolicy`]; the loop itself owns
//! the step budget and the mandatory-action gate.

use super::budget::{ActionTracker, SessionBudget};
use super::protocol;
use super::trace::TraceWriter;
use crate::audit::{EntryDraft, Flag};
use crate::capabilities::{CapabilityContext, CapabilityOutcome, CapabilityRegistry};
use crate::directive::{Directive, parse_directive};
use crate::error::{CapabilityError, SessionError};
use crate::llm::{ChatMessage, ReasoningService};
use serde_json::Value;
use tracing::{debug, info, warn};

// ── Public types ─────────────────────────────────────────────────────────────

/// Why a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// A `Final` directive was accepted.
    Final(Value),
    /// A `Result` directive ended the session after its mandatory actions.
    Completed(Value),
    /// The session cannot go on.
    Failed(String),
    /// The step budget ran out without a terminal directive.
    BudgetExhausted,
}

/// What a policy hook wants the loop to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Continue,
    Stop(StopReason),
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub stop: StopReason,
    /// Steps actually taken.
    pub steps: u32,
    /// The most recent `Result` payload seen, if any.
    pub last_result: Option<Value>,
}

/// Per-session behaviour plugged into [`BoundedLoop`].
///
/// Hooks may append feedback to `messages`; they never remove any.
pub trait SessionPolicy: Send {
    /// Before the service call of `step` (1-based).
    fn on_step(&mut self, _step: u32) {}

    /// The reply could not be turned into a directive. The loop has already
    /// recorded an error entry carrying `detail`.
    fn on_unparseable(&mut self, detail: &str, messages: &mut Vec<ChatMessage>) -> Verdict;

    /// Return `Stop(Completed(..))` to end the session; the loop holds it back
    /// until every mandatory action has happened.
    fn on_result(
        &mut self,
        payload: &Value,
        flags: &[Flag],
        messages: &mut Vec<ChatMessage>,
    ) -> anyhow::Result<Verdict>;

    fn on_final(
        &mut self,
        payload: &Value,
        flags: &[Flag],
        messages: &mut Vec<ChatMessage>,
    ) -> anyhow::Result<Verdict>;

    /// A known capability is about to run.
    fn on_tool_call(&mut self, _name: &str, _args: &Value, _flags: &[Flag]) -> anyhow::Result<()> {
        Ok(())
    }

    /// After the standard feedback for a capability call was appended.
    fn after_tool(
        &mut self,
        _name: &str,
        _outcome: &CapabilityOutcome,
        _messages: &mut Vec<ChatMessage>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// One session's fixed collaborators.
pub struct BoundedLoop<'a> {
    pub service: &'a dyn ReasoningService,
    pub registry: &'a CapabilityRegistry,
    /// Its `agent` names the session in audit entries.
    pub ctx: &'a CapabilityContext,
    pub budget: SessionBudget,
    pub trace: TraceWriter,
}

// ── Implementation ───────────────────────────────────────────────────────────

impl BoundedLoop<'_> {
    /// Iterate until a policy stops the session or the budget runs out.
    ///
    /// Errors are capability failures and audit write failures; everything
    /// the reasoning service does wrong is handled through the policy.
    pub async fn run<P: SessionPolicy>(
        &self,
        messages: &mut Vec<ChatMessage>,
        policy: &mut P,
    ) -> anyhow::Result<SessionOutcome> {
        let mut tracker = ActionTracker::default();
        let mut last_result = None;

        for step in 1..=self.budget.max_steps {
            policy.on_step(step);
            protocol::ensure_trailing_user(messages);
            self.trace.write_input(step, messages);

            let Some(directive) = self.next_directive(step, messages).await else {
                let detail = SessionError::Unparseable.to_string();
                self.ctx
                    .record(EntryDraft::new(self.ctx.agent.as_str(), "error", detail.as_str()))?;
                match policy.on_unparseable(&detail, messages) {
                    Verdict::Continue => continue,
                    Verdict::Stop(stop) => return Ok(self.finish(stop, step, last_result)),
                }
            };
            debug!(
                run_id = %self.ctx.run_id,
                agent = %self.ctx.agent,
                step,
                kind = %directive.kind(),
                "directive parsed"
            );

            let verdict = match directive {
                Directive::Final { payload, flags } => {
                    last_result = Some(payload.clone());
                    let verdict = policy.on_final(&payload, &flags, messages)?;
                    self.gate(verdict, &tracker, messages)
                }
                Directive::Result { payload, flags } => {
                    last_result = Some(payload.clone());
                    let verdict = policy.on_result(&payload, &flags, messages)?;
                    self.gate(verdict, &tracker, messages)
                }
                Directive::ToolCall {
                    name,
                    args,
                    comment,
                    flags,
                } => {
                    self.dispatch(step, &name, args, comment.as_deref(), &flags, &mut tracker, messages, policy)
                        .await?
                }
            };

            if let Verdict::Stop(stop) = verdict {
                return Ok(self.finish(stop, step, last_result));
            }
        }

        Ok(self.finish(StopReason::BudgetExhausted, self.budget.max_steps, last_result))
    }

    /// A failed service call is indistinguishable from an unusable reply.
    async fn next_directive(&self, step: u32, messages: &[ChatMessage]) -> Option<Directive> {
        match self.service.chat(messages).await {
            Ok(response) => {
                self.trace.write_output(step, &response);
                parse_directive(&response.content)
            }
            Err(err) => {
                warn!(
                    run_id = %self.ctx.run_id,
                    service = self.service.name(),
                    step,
                    error = %format!("{err:#}"),
                    "reasoning service call failed"
                );
                self.trace.write_failure(step, &format!("{err:#}"));
                None
            }
        }
    }

    /// Hold back a completion until the mandatory actions have happened.
    fn gate(&self, verdict: Verdict, tracker: &ActionTracker, messages: &mut Vec<ChatMessage>) -> Verdict {
        match verdict {
            Verdict::Stop(StopReason::Completed(_)) if !tracker.satisfies(&self.budget) => {
                debug!(agent = %self.ctx.agent, "result held back, mandatory actions pending");
                messages.push(ChatMessage::user(protocol::MANDATORY_CONTINUE));
                Verdict::Continue
            }
            other => other,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn dispatch<P: SessionPolicy>(
        &self,
        step: u32,
        name: &str,
        args: Value,
        comment: Option<&str>,
        flags: &[Flag],
        tracker: &mut ActionTracker,
        messages: &mut Vec<ChatMessage>,
        policy: &mut P,
    ) -> anyhow::Result<Verdict> {
        let Some(capability) = self.registry.get(name) else {
            let message = CapabilityError::Unknown {
                name: name.to_string(),
            }
            .to_string();
            warn!(run_id = %self.ctx.run_id, agent = %self.ctx.agent, step, capability = name, "unknown capability");
            self.ctx
                .record(EntryDraft::new(self.ctx.agent.as_str(), "error", message.as_str()))?;
            return Ok(Verdict::Stop(StopReason::Failed(message)));
        };

        policy.on_tool_call(name, &args, flags)?;
        info!(run_id = %self.ctx.run_id, agent = %self.ctx.agent, step, capability = name, "dispatching");

        let outcome = capability
            .execute(args, self.ctx)
            .await
            .map_err(|err| CapabilityError::Execution {
                name: name.to_string(),
                message: format!("{err:#}"),
            })?;

        if let Some(action) = outcome.action {
            tracker.record(action);
        }
        messages.push(protocol::tool_output(name, &outcome.output));
        if let Some(follow_up) = &outcome.follow_up {
            messages.push(ChatMessage::user(follow_up.as_str()));
        }
        if let Some(comment) = comment {
            messages.push(protocol::comment(comment));
        }
        policy.after_tool(name, &outcome, messages)?;
        Ok(Verdict::Continue)
    }

    fn finish(&self, stop: StopReason, steps: u32, last_result: Option<Value>) -> SessionOutcome {
        info!(
            run_id = %self.ctx.run_id,
            agent = %self.ctx.agent,
            steps,
            stop = ?stop,
            "session ended"
        );
        SessionOutcome {
            stop,
            steps,
            last_result,
        }
    }
}
