use super::context::CapabilityContext;
use super::page::fetch_into_run;
use super::traits::{Capability, CapabilityOutcome};
use crate::audit::{EntryDraft, Flag, agents};
use regex::{Regex, RegexBuilder};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

/// Finds HLS/DASH manifest links in page source.
pub struct ManifestScanner {
    absolute: Regex,
    attribute: Regex,
}

impl ManifestScanner {
    pub fn new() -> anyhow::Result<Self> {
        let build = |pattern: &str| RegexBuilder::new(pattern).case_insensitive(true).build();
        Ok(Self {
            absolute: build(r#"(https?:[^\s"']+\.(?:m3u8|mpd))(?:\?[^\s"']*)?"#)?,
            attribute: build(r#"(src|href)=["']([^"']+\.(?:m3u8|mpd))(?:\?[^"']*)?["']"#)?,
        })
    }

    /// Absolute URLs first, then `src`/`href` values; deduplicated, first seen wins.
    pub fn scan(&self, html: &str) -> Vec<String> {
        let absolute = self
            .absolute
            .captures_iter(html)
            .filter_map(|caps| caps.get(1));
        let attributes = self
            .attribute
            .captures_iter(html)
            .filter_map(|caps| caps.get(2));
        let mut seen = HashSet::new();
        absolute
            .chain(attributes)
            .map(|m| m.as_str().to_string())
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }
}

/// Scan HTML (argument, run HTML, or a fresh fetch of the task URL) for
/// manifest candidates and record what was found.
pub(crate) async fn extract_candidates(
    scanner: &ManifestScanner,
    args: &Value,
    ctx: &CapabilityContext,
) -> anyhow::Result<Vec<String>> {
    let supplied = args
        .get("html")
        .and_then(Value::as_str)
        .filter(|html| !html.is_empty())
        .map(String::from);
    let html = match supplied.or_else(|| ctx.known_html()) {
        Some(html) => html,
        None if ctx.task_url().is_some() => fetch_into_run(ctx, None, None).await?.html,
        None => String::new(),
    };
    if html.is_empty() {
        return Ok(Vec::new());
    }

    let candidates = scanner.scan(&html);
    let mut draft = EntryDraft::new(
        agents::STATIC_ENGINE,
        "candidates",
        format!("static extraction found {} candidates", candidates.len()),
    )
    .payload(json!({ "candidates": candidates }));
    if !candidates.is_empty() {
        draft = draft.flag(Flag::Candidate);
    }
    ctx.record(draft)?;
    Ok(candidates)
}

/// `static_extract_html_candidates {html?}`.
pub struct StaticExtract {
    scanner: ManifestScanner,
}

impl StaticExtract {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            scanner: ManifestScanner::new()?,
        })
    }
}

impl Capability for StaticExtract {
    fn name(&self) -> &str {
        "static_extract_html_candidates"
    }

    fn description(&self) -> &str {
        "Regex scan of page HTML for .m3u8/.mpd manifest links. Args: {html?}"
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a CapabilityContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CapabilityOutcome>> + Send + 'a>> {
        Box::pin(async move {
            let candidates = extract_candidates(&self.scanner, &args, ctx).await?;
            Ok(CapabilityOutcome::new(json!({ "candidates": candidates })))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::TaskInput;
    use crate::capabilities::context::testing;
    use tempfile::TempDir;

    #[test]
    fn scan_finds_absolute_and_attribute_links_once() {
        let html = r#"
            <script>var a = "https://cdn.x/live/a.m3u8?token=1";</script>
            <video src="/vod/b.MPD"></video>
            <a href='https://cdn.x/live/a.m3u8'>again</a>
            <img src="poster.jpg">
        "#;
        let found = ManifestScanner::new().unwrap().scan(html);
        assert_eq!(
            found,
            vec!["https://cdn.x/live/a.m3u8".to_string(), "/vod/b.MPD".to_string()]
        );
    }

    #[test]
    fn scan_of_plain_text_is_empty() {
        assert!(ManifestScanner::new().unwrap().scan("no media here").is_empty());
    }

    #[tokio::test]
    async fn capability_prefers_argument_html() {
        let dir = TempDir::new().unwrap();
        let ctx = testing::context(
            &dir,
            TaskInput {
                html: Some("<source src=\"https://cdn.x/task.m3u8\">".into()),
                ..TaskInput::default()
            },
        );
        let extract = StaticExtract::new().unwrap();

        let outcome = extract
            .execute(json!({"html": "https://cdn.x/arg.mpd"}), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.output, json!({"candidates": ["https://cdn.x/arg.mpd"]}));

        let outcome = extract.execute(json!({}), &ctx).await.unwrap();
        assert_eq!(outcome.output, json!({"candidates": ["https://cdn.x/task.m3u8"]}));
        let last = ctx.audit.working_entries().pop().unwrap();
        assert!(last.has_flag(Flag::Candidate));
    }

    #[tokio::test]
    async fn no_html_and_no_url_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let ctx = testing::context(&dir, TaskInput::default());
        let outcome = StaticExtract::new().unwrap().execute(json!({}), &ctx).await.unwrap();
        assert_eq!(outcome.output, json!({"candidates": []}));
        assert!(ctx.audit.working_entries().is_empty());
    }
}
