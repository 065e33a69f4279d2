//! System prompts for the coordinator and the two delegated roles.

use crate::capabilities::{ArtifactTarget, TaskInput};
use crate::llm::ChatMessage;
use std::fmt::Write as _;
use std::path::PathBuf;

const HTML_SNIPPET_CHARS: usize = 2000;
const NONE: &str = "(none)";

const COORDINATOR_PROMPT: &str = r#"You are the Coordinator. Goal: find the main video stream of a page, preferring the highest resolution, without circumventing DRM.

You work only through capability calls. Reply with exactly one JSON object and nothing else.

Logs:
- agents.md is the working log injected into your context. It may be cropped or compacted; entries flagged KEEP, CRITICAL, DECISION or ERROR are never removed.
- agents_raw.md is the full, uncropped copy.
- algorithm_static.md and algorithm_dynamic.md hold the code written by the static parser and the network capture sub-agents. You never write code yourself.

Flags: KEEP and CRITICAL mark evidence that must survive (headers, key links). DECISION marks your decisions. ERROR is added by the error diagnoser. CROP_LOG and COMPRESS_LOG are reserved for the system.

PREVIOUS_ERROR, when present, lists recent failures. Read it first and do not repeat them.

Workflow:
1. Analyse the input. Delegate to call_static_parser_agent when HTML is available, or to call_network_capture_agent when dynamic capture is needed. You may interleave both.
2. Record key evidence and decisions with record_message and the appropriate flags.
3. If the input is too large, run call_html_preprocessor first.
4. When a path works, pick the algorithm (static or dynamic), run human_acceptance_flow, and only after acceptance return the final JSON.

Reply formats:
{"tool": "...", "args": {...}, "comment": "why", "flags": []}
or
{"final": {"manifestUrl": "...", "filePath": "...", "notes": "...", "algo_pick": "static|dynamic"}, "flags": []}

Available capabilities:
"#;

/// Coordinator system prompt listing the capabilities it may call.
pub fn coordinator_prompt(catalog: &str) -> String {
    format!("{COORDINATOR_PROMPT}{catalog}\n")
}

/// User-role summary of what the run was asked to do.
pub fn task_message(input: &TaskInput) -> ChatMessage {
    let mut parts = Vec::new();
    if let Some(url) = input.url.as_deref().filter(|u| !u.is_empty()) {
        parts.push(format!("Example URL: {url}"));
    }
    parts.push(format!("Prefer: {}", input.prefer));
    if let Some(name) = input.algo_name.as_deref().filter(|n| !n.is_empty()) {
        parts.push(format!("Algorithm name: {name}"));
    }
    if let Some(notes) = input.notes.as_deref().filter(|n| !n.is_empty()) {
        parts.push(format!("Notes: {}", notes.chars().take(60).collect::<String>()));
    }
    let has_html = input.html.as_deref().is_some_and(|h| !h.is_empty());
    ChatMessage::user(format!(
        "Input summary: {} | HTML provided: {has_html}",
        parts.join(" | ")
    ))
}

/// Context injected into a delegated role's prompt.
#[derive(Debug, Clone, Default)]
pub struct SubPromptContext {
    pub upstream_summary: String,
    /// Recent coordinator-side entries, one summary line each.
    pub directives: String,
    pub url: Option<String>,
    pub html: Option<String>,
    pub artifact_log: PathBuf,
    pub current_code: Option<String>,
}

fn role_prompt(target: ArtifactTarget, ctx: &SubPromptContext) -> String {
    let (title, mission, capabilities, result_shape) = match target {
        ArtifactTarget::Static => (
            "the Static Parser",
            "extract manifest links (.m3u8/.mpd) and player parameters from the page source",
            "- static_extract_html_candidates {html?} -> {candidates}\n\
             - fetch_page_html {url?, headers?} -> {ok, html}\n",
            r#"{"result": {"candidates": ["..."], "playerParams": {}}}"#,
        ),
        ArtifactTarget::Dynamic => (
            "the Network Capture agent",
            "load the page, watch its network requests, and identify the manifest and the request headers needed to replay it",
            "- capture_network {url?, headers?} -> {manifestUrl?, headers?, notes?}\n\
             - call_html_preprocessor {html?, maxChars?} -> {processed, originalChars, processedChars, removedBytes, notes}\n",
            r#"{"result": {"manifestUrl": "...", "headers": {}, "notes": "..."}}"#,
        ),
    };

    let mut prompt = format!(
        "You are {title}. Goal: {mission}.\n\n\
         Every change to the algorithm must be submitted as complete code through \
         code_maintainer_agent_write (target \"{target}\"); never send partial patches.\n\
         This session must write the code and a report (record_message) before a result is accepted.\n\n\
         Reply with a single JSON object, no code fences, in one of two shapes:\n\
         {{\"tool\": \"...\", \"args\": {{...}}, \"comment\": \"...\"}}\n\
         {result_shape}\n\
         If your previous reply could not be parsed, retry with JSON only.\n\n\
         Capabilities:\n{capabilities}\
         - code_maintainer_agent_write {{title, language, code, meta?}}\n\
         - record_message {{text, payload?, flags?}}\n\
         - read_debug_recent {{limit?}} -> tails of recent model outputs\n\n"
    );

    let html = ctx
        .html
        .as_deref()
        .map(|h| h.chars().take(HTML_SNIPPET_CHARS).collect::<String>())
        .filter(|h| !h.trim().is_empty());
    let _ = writeln!(
        prompt,
        "Upstream summary: {}",
        non_empty(&ctx.upstream_summary)
    );
    let _ = writeln!(
        prompt,
        "Recent coordinator entries:\n{}",
        non_empty(&ctx.directives)
    );
    let _ = writeln!(
        prompt,
        "Initial URL: {}",
        ctx.url.as_deref().unwrap_or(NONE)
    );
    let _ = writeln!(
        prompt,
        "HTML snippet (may be truncated):\n```html\n{}\n```",
        html.as_deref().map_or(NONE, str::trim)
    );
    let _ = writeln!(prompt, "Artifact log: {}", ctx.artifact_log.display());
    let _ = write!(
        prompt,
        "Current algorithm code:\n```javascript\n{}\n```\n",
        ctx.current_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or("// nothing submitted yet")
    );
    prompt
}

fn non_empty(text: &str) -> &str {
    if text.trim().is_empty() { NONE } else { text }
}

pub fn static_parser_prompt(ctx: &SubPromptContext) -> String {
    role_prompt(ArtifactTarget::Static, ctx)
}

pub fn network_capture_prompt(ctx: &SubPromptContext) -> String {
    role_prompt(ArtifactTarget::Dynamic, ctx)
}
