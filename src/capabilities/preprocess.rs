use super::context::CapabilityContext;
use super::traits::{Capability, CapabilityOutcome};
use crate::audit::{EntryDraft, agents};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;

const MIN_LIMIT: usize = 20_000;
const MAX_LIMIT: usize = 500_000;
const SNIPPET_WINDOW: usize = 5_000;
const NEEDLES: [&str; 8] = [
    ".m3u8", ".mpd", "<video", "<source", "hls", "dash", "manifest", "player",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preprocessed {
    pub processed: String,
    pub original_chars: usize,
    pub processed_chars: usize,
    pub removed_bytes: usize,
    pub notes: String,
}

/// Shrinks oversized HTML so it fits a prompt.
pub struct HtmlPreprocessor {
    script: Regex,
    style: Regex,
    whitespace: Regex,
}

impl HtmlPreprocessor {
    pub fn new() -> anyhow::Result<Self> {
        let block = |tag: &str| {
            RegexBuilder::new(&format!(r"<{tag}[^>]*>[\s\S]*?</{tag}>"))
                .case_insensitive(true)
                .build()
        };
        Ok(Self {
            script: block("script")?,
            style: block("style")?,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    /// Strip script/style, collapse whitespace, keep windows around media
    /// hints if still too long, then truncate. `max_chars` is clamped.
    pub fn process(&self, html: &str, max_chars: usize) -> Preprocessed {
        let limit = max_chars.clamp(MIN_LIMIT, MAX_LIMIT);
        let original_chars = html.chars().count();
        let mut strategy = vec!["strip<script|style>", "collapse_whitespace"];

        let stripped = self.script.replace_all(html, "");
        let stripped = self.style.replace_all(&stripped, "");
        let mut work = self.whitespace.replace_all(&stripped, " ").trim().to_string();

        if work.chars().count() > limit
            && let Some(picked) = pick_snippets(&work, SNIPPET_WINDOW)
        {
            work = picked;
            strategy.push("pick_snippets_around_candidates");
        }

        let mut truncated = None;
        if work.chars().count() > limit {
            work = work.chars().take(limit).collect();
            truncated = Some(format!("truncated_to_{limit}"));
            strategy.push("truncate_soft");
        }

        let processed_chars = work.chars().count();
        let mut notes = format!("strategy={}", strategy.join("+"));
        if let Some(truncated) = truncated {
            notes.push_str("; ");
            notes.push_str(&truncated);
        }
        Preprocessed {
            processed: work,
            original_chars,
            processed_chars,
            removed_bytes: original_chars.saturating_sub(processed_chars),
            notes,
        }
    }
}

/// Merge `±window` byte spans around every needle hit; `None` when nothing hits.
fn pick_snippets(html: &str, window: usize) -> Option<String> {
    let haystack = html.to_ascii_lowercase();
    let mut spans: Vec<(usize, usize)> = NEEDLES
        .iter()
        .flat_map(|needle| haystack.match_indices(needle).map(|(at, _)| at))
        .map(|at| (at.saturating_sub(window), (at + window).min(html.len())))
        .collect();
    if spans.is_empty() {
        return None;
    }
    spans.sort_unstable();

    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (start, end) in spans {
        match merged.last_mut() {
            Some(last) if start <= last.1 + 1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }

    let mut out = String::new();
    for (start, end) in merged {
        let start = floor_char_boundary(html, start);
        let end = floor_char_boundary(html, end);
        out.push_str(&html[start..end]);
        out.push('\n');
    }
    Some(out)
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// `call_html_preprocessor {html?, maxChars?}`.
pub struct PreprocessHtml {
    preprocessor: HtmlPreprocessor,
}

impl PreprocessHtml {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            preprocessor: HtmlPreprocessor::new()?,
        })
    }

    fn run(&self, args: &Value, ctx: &CapabilityContext) -> anyhow::Result<CapabilityOutcome> {
        let original = args
            .get("html")
            .and_then(Value::as_str)
            .filter(|html| !html.is_empty())
            .map(String::from)
            .or_else(|| ctx.known_html());
        let Some(original) = original else {
            ctx.record(EntryDraft::new(
                agents::HTML_PREPROCESSOR,
                "html_preprocess_skip",
                "no HTML to process",
            ))?;
            return Ok(CapabilityOutcome::new(json!({
                "processed": "",
                "originalChars": 0,
                "processedChars": 0,
                "removedBytes": 0,
                "notes": "no_html",
            })));
        };

        let max_chars = args
            .get("maxChars")
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(ctx.config.capture.html_max_chars);
        let out = self.preprocessor.process(&original, max_chars);

        ctx.audit.append_raw_only(
            EntryDraft::new(agents::HTML_PREPROCESSOR, "original_html", "original HTML (raw log only)")
                .payload(json!({"length": out.original_chars, "html": original})),
        )?;
        ctx.record(
            EntryDraft::new(
                agents::HTML_PREPROCESSOR,
                "processed_html",
                format!("processed oversized HTML: {}/{} chars", out.processed_chars, out.original_chars),
            )
            .payload(json!({"notes": out.notes, "html": out.processed})),
        )?;
        ctx.memory().working_html = Some(out.processed.clone());
        Ok(CapabilityOutcome::new(json!(out)))
    }
}

impl Capability for PreprocessHtml {
    fn name(&self) -> &str {
        "call_html_preprocessor"
    }

    fn description(&self) -> &str {
        "Shrink oversized HTML (strip scripts/styles, keep media windows, truncate). Args: {html?, maxChars?}"
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a CapabilityContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CapabilityOutcome>> + Send + 'a>> {
        Box::pin(async move { self.run(&args, ctx) })
    }
}
