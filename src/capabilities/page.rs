use super::context::CapabilityContext;
use super::traits::{Capability, CapabilityOutcome, arg_object, arg_str};
use crate::audit::{EntryDraft, agents};
use crate::config::CaptureConfig;
use crate::llm::http_client::build_fetch_client;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

/// Outcome of a page fetch. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchedPage {
    pub ok: bool,
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl FetchedPage {
    fn failed(notes: impl Into<String>) -> Self {
        Self {
            ok: false,
            html: String::new(),
            notes: Some(notes.into()),
        }
    }
}

/// Plain HTTP GET with a browser user agent; follows redirects, caps the body.
pub struct PageFetcher {
    client: Client,
    max_chars: usize,
}

impl PageFetcher {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            client: build_fetch_client(config.fetch_timeout_secs),
            max_chars: config.fetch_max_chars,
        }
    }

    pub async fn fetch(&self, url: &str, headers: Option<&Value>) -> FetchedPage {
        let response = self
            .client
            .get(url)
            .headers(header_map(headers))
            .send()
            .await;
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!(url, error = %err, "page fetch failed");
                return FetchedPage::failed(err.to_string());
            }
        };
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return FetchedPage::failed(format!("http {}", status.as_u16()));
        }
        match response.text().await {
            Ok(body) => {
                let html: String = body.chars().take(self.max_chars).collect();
                debug!(url, chars = html.len(), "page fetched");
                FetchedPage {
                    ok: true,
                    html,
                    notes: None,
                }
            }
            Err(err) => FetchedPage::failed(err.to_string()),
        }
    }
}

/// String-valued entries of a JSON object as request headers; invalid ones are skipped.
fn header_map(headers: Option<&Value>) -> HeaderMap {
    let mut map = HeaderMap::new();
    let Some(object) = headers.and_then(Value::as_object) else {
        return map;
    };
    for (name, value) in object {
        if let Some(value) = value.as_str()
            && let Ok(name) = HeaderName::from_bytes(name.as_bytes())
            && let Ok(value) = HeaderValue::from_str(value)
        {
            map.insert(name, value);
        }
    }
    map
}

/// Fetch `url` (or the task URL) and remember the HTML for later capabilities.
pub(crate) async fn fetch_into_run(
    ctx: &CapabilityContext,
    url: Option<&str>,
    headers: Option<&Value>,
) -> anyhow::Result<FetchedPage> {
    let Some(url) = url.or_else(|| ctx.task_url()) else {
        return Ok(FetchedPage::failed("no url"));
    };
    let page = ctx.collaborators.fetcher.fetch(url, headers).await;
    let text = if page.ok {
        format!("fetched {url} · {} chars", page.html.chars().count())
    } else {
        format!("fetch failed: {}", page.notes.as_deref().unwrap_or_default())
    };
    ctx.record(EntryDraft::new(agents::PAGE_FETCHER, "html_fetched", text))?;
    if page.ok {
        ctx.memory().working_html = Some(page.html.clone());
    }
    Ok(page)
}

/// `fetch_page_html {url?, headers?}`.
pub struct FetchPage;

impl Capability for FetchPage {
    fn name(&self) -> &str {
        "fetch_page_html"
    }

    fn description(&self) -> &str {
        "Fetch page HTML. Args: {url?, headers?}; defaults to the task URL"
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a CapabilityContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CapabilityOutcome>> + Send + 'a>> {
        Box::pin(async move {
            let page = fetch_into_run(ctx, arg_str(&args, "url"), arg_object(&args, "headers")).await?;
            Ok(CapabilityOutcome::new(json!(page)))
        })
    }
}
