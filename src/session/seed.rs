//! Initial conversation state built from the task and prior audit entries.

use super::prompts::{self, SubPromptContext};
use crate::audit::{AuditEntry, AuditStore, Flag};
use crate::capabilities::{ArtifactStore, ArtifactTarget, TaskInput};
use crate::llm::ChatMessage;

const CONTEXT_ENTRIES: usize = 3;
const PINNED_ENTRIES: usize = 5;
const ERROR_ENTRIES: usize = 5;
const DIRECTIVE_ENTRIES: usize = 8;

fn lines(entries: &[AuditEntry]) -> String {
    entries
        .iter()
        .map(AuditEntry::summary_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt context for a delegated role. `html` overrides the task's HTML.
pub fn sub_prompt_context(
    input: &TaskInput,
    audit: &AuditStore,
    artifacts: &ArtifactStore,
    target: ArtifactTarget,
    html: Option<&str>,
) -> SubPromptContext {
    let directives = audit.recent(DIRECTIVE_ENTRIES, AuditEntry::is_reasoning_agent);
    SubPromptContext {
        upstream_summary: input.summary(),
        directives: lines(&directives),
        url: input.url.clone(),
        html: html.map(String::from).or_else(|| input.html.clone()),
        artifact_log: artifacts.log_path(target),
        current_code: artifacts.last_code(target),
    }
}

/// Opening messages of a top-level run.
///
/// Excerpts of the working log are injected as assistant turns, so the
/// conversation never ends on a user turn here; the loop adds the request.
pub fn top_level_messages(
    input: &TaskInput,
    audit: &AuditStore,
    artifacts: &ArtifactStore,
    catalog: &str,
) -> Vec<ChatMessage> {
    let mut messages = vec![
        ChatMessage::system(prompts::coordinator_prompt(catalog)),
        prompts::task_message(input),
    ];

    let context = audit.recent(CONTEXT_ENTRIES, AuditEntry::is_reasoning_agent);
    if !context.is_empty() {
        messages.push(ChatMessage::assistant(format!(
            "CONTEXT (agents.md):\n{}",
            lines(&context)
        )));
    }

    let pinned = audit.recent(PINNED_ENTRIES, |e| e.has_any(&[Flag::Decision, Flag::Critical]));
    if !pinned.is_empty() {
        messages.push(ChatMessage::assistant(format!(
            "PINNED (agents.md):\n{}",
            lines(&pinned)
        )));
    }

    let errors = audit.recent(ERROR_ENTRIES, |e| e.kind.eq_ignore_ascii_case("error"));
    if !errors.is_empty() {
        messages.push(ChatMessage::assistant(format!(
            "PREVIOUS_ERROR:\n{}\nReview these errors, do not repeat them, and propose a diagnosis or fallback first.",
            lines(&errors)
        )));
    }

    let static_ctx = sub_prompt_context(input, audit, artifacts, ArtifactTarget::Static, None);
    messages.push(ChatMessage::assistant(format!(
        "SUBAGENT_PROMPT(static_parser):\n{}",
        prompts::static_parser_prompt(&static_ctx)
    )));
    let network_ctx = sub_prompt_context(input, audit, artifacts, ArtifactTarget::Dynamic, None);
    messages.push(ChatMessage::assistant(format!(
        "SUBAGENT_PROMPT(network_capture):\n{}",
        prompts::network_capture_prompt(&network_ctx)
    )));
    messages
}
