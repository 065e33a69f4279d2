//! Fixed instruction texts and feedback formats exchanged with the reasoning
//! service between steps.

use crate::capabilities::ArtifactTarget;
use crate::llm::{ChatMessage, MessageRole};
use serde_json::Value;

// ── Instructions ─────────────────────────────────────────────────────────────

pub const NEXT_ACTION_REQUEST: &str = "NEXT_ACTION_REQUEST: Based on the context above, reply with the JSON for the next step only ({\"tool\":...,\"args\":...,\"comment\":...}). Do not explain.";

pub const STRICT_RETRY: &str = "STRICT_RETRY: The previous output could not be parsed. Reply with a single JSON object only (no code fences, no explanation), e.g. {\"tool\":\"...\",\"args\":{...}} or {\"result\":{...}}.";

pub const MANDATORY_CONTINUE: &str = "MANDATORY_CONTINUE: A result was received, but this session must still submit its code and a report. Reply now with code_maintainer_agent_write (complete, non-empty code) or record_message (report). Single JSON object only.";

pub const MANDATORY_REPORT: &str = "MANDATORY_REPORT: The code was written. Reply now with record_message (a short report, required); if you already have the result you may return it. JSON only.";

/// Retry instruction after a rejected artifact write.
pub fn artifact_retry(target: ArtifactTarget, min_chars: usize) -> String {
    format!(
        "STRICT_RETRY: The code was empty or too short. Submit the complete {target} algorithm code (at least {min_chars} characters). JSON only."
    )
}

/// Services of this family reject a conversation that does not end on a user
/// turn. Returns whether a request was appended.
pub fn ensure_trailing_user(messages: &mut Vec<ChatMessage>) -> bool {
    if messages.last().is_some_and(|m| m.role == MessageRole::User) {
        return false;
    }
    messages.push(ChatMessage::user(NEXT_ACTION_REQUEST));
    true
}

// ── Feedback ─────────────────────────────────────────────────────────────────

pub fn tool_output(name: &str, output: &Value) -> ChatMessage {
    ChatMessage::user(format!("TOOL_OUTPUT({name}): {output}"))
}

pub fn comment(text: &str) -> ChatMessage {
    ChatMessage::assistant(format!("COMMENT: {text}"))
}

pub fn debug_recent(recent: &Value) -> ChatMessage {
    ChatMessage::assistant(format!("DEBUG_RECENT: {recent}"))
}

pub fn candidates_hint(count: usize) -> ChatMessage {
    ChatMessage::user(format!(
        "HINT: Found {count} manifest candidates. You may pick best or finalize."
    ))
}

pub const NO_CANDIDATES_COMMENT: &str =
    "No static candidates were found; consider trying network capture.";

/// Top-level feedback after an intermediate result.
pub const RESULT_ACKNOWLEDGED: &str =
    "HINT: Result noted. Finalize with {\"final\":{...}} or continue with the next tool call.";
