use super::types::Directive;
use serde_json::Value;
use strum::Display;
use tracing::debug;

const FENCE: &str = "```";
const JSON_TAG: &str = "json";

/// Where in the response a directive was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ParseStage {
    WholeText,
    JsonFence,
    GenericFence,
    BraceScan,
}

/// Extract a directive from free-form model output, or `None` when nothing
/// in the text satisfies the acceptance rule. Never panics.
pub fn parse_directive(text: &str) -> Option<Directive> {
    parse_directive_traced(text).map(|(directive, _)| directive)
}

/// Like [`parse_directive`], also reporting which stage matched.
pub fn parse_directive_traced(text: &str) -> Option<(Directive, ParseStage)> {
    let found = whole_text(text)
        .map(|d| (d, ParseStage::WholeText))
        .or_else(|| json_fence(text).map(|d| (d, ParseStage::JsonFence)))
        .or_else(|| generic_fences(text).map(|d| (d, ParseStage::GenericFence)))
        .or_else(|| brace_scan(text).map(|d| (d, ParseStage::BraceScan)));
    if let Some((directive, stage)) = &found {
        debug!(stage = %stage, kind = %directive.kind(), "directive parsed");
    }
    found
}

fn accept(candidate: &str) -> Option<Directive> {
    serde_json::from_str::<Value>(candidate.trim())
        .ok()
        .and_then(Directive::from_value)
}

fn whole_text(text: &str) -> Option<Directive> {
    accept(text)
}

/// Byte offset of the first case-insensitive occurrence of `` ```json ``.
fn find_json_fence_open(text: &str) -> Option<usize> {
    let tag_len = FENCE.len() + JSON_TAG.len();
    text.match_indices(FENCE).map(|(at, _)| at).find(|&at| {
        text.get(at + FENCE.len()..at + tag_len)
            .is_some_and(|tag| tag.eq_ignore_ascii_case(JSON_TAG))
    })
}

fn json_fence(text: &str) -> Option<Directive> {
    let open = find_json_fence_open(text)?;
    let body_start = open + FENCE.len() + JSON_TAG.len();
    let body_len = text[body_start..].find(FENCE)?;
    accept(&text[body_start..body_start + body_len])
}

/// Fence bodies in order, pairing markers as they appear.
fn fence_bodies(text: &str) -> Vec<&str> {
    let markers: Vec<usize> = text.match_indices(FENCE).map(|(at, _)| at).collect();
    markers
        .chunks_exact(2)
        .map(|pair| &text[pair[0] + FENCE.len()..pair[1]])
        .collect()
}

fn generic_fences(text: &str) -> Option<Directive> {
    fence_bodies(text).into_iter().find_map(accept)
}

/// Walk the text tracking brace depth outside string literals and try every
/// top-level `{...}` span in order.
fn brace_scan(text: &str) -> Option<Directive> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (at, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(at);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0
                    && let Some(begin) = start.take()
                    && let Some(directive) = accept(&text[begin..=at])
                {
                    return Some(directive);
                }
            }
            _ => {}
        }
    }
    None
}
