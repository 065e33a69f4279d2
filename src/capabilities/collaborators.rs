//! Seams for work that happens outside this crate: browser-driven network
//! capture and the human acceptance hand-off.

use super::artifacts::ArtifactTarget;
use super::context::CapabilityContext;
use super::traits::{Capability, CapabilityOutcome, arg_object, arg_str};
use crate::audit::{EntryDraft, agents};
use serde::Serialize;
use serde_json::{Value, json};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

/// Observes the network traffic of a page load and reports manifest URLs and
/// the request headers needed to replay them.
pub trait NetworkCapture: Send + Sync {
    fn name(&self) -> &str;

    /// Expected output shape: `{manifestUrl?, headers?, ...}`.
    fn capture<'a>(
        &'a self,
        url: &'a str,
        headers: Option<&'a Value>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send + 'a>>;
}

/// Everything the acceptance collaborator needs to try an artifact end to end.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptanceRequest {
    pub pick: ArtifactTarget,
    pub artifact_log: PathBuf,
    pub page_url: Option<String>,
    pub headers: Option<Value>,
    pub manifest_url: Option<String>,
}

/// Hands an artifact to a human (or a harness) for validation.
pub trait AcceptanceFlow: Send + Sync {
    fn name(&self) -> &str;

    fn run<'a>(
        &'a self,
        request: AcceptanceRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send + 'a>>;
}

pub struct UnconfiguredCapture;

impl NetworkCapture for UnconfiguredCapture {
    fn name(&self) -> &str {
        "unconfigured"
    }

    fn capture<'a>(
        &'a self,
        _url: &'a str,
        _headers: Option<&'a Value>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send + 'a>> {
        Box::pin(async { Ok(json!({"ok": false, "notes": "network capture not configured"})) })
    }
}

pub struct UnconfiguredAcceptance;

impl AcceptanceFlow for UnconfiguredAcceptance {
    fn name(&self) -> &str {
        "unconfigured"
    }

    fn run<'a>(
        &'a self,
        _request: AcceptanceRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send + 'a>> {
        Box::pin(async { Ok(json!({"ok": false, "notes": "acceptance flow not configured"})) })
    }
}

/// Run a capture and record it. Shared by the top-level capability and the
/// network sub-session.
pub(crate) async fn capture_and_record(
    ctx: &CapabilityContext,
    url: Option<&str>,
    headers: Option<&Value>,
) -> anyhow::Result<Value> {
    let Some(url) = url.or_else(|| ctx.task_url()) else {
        return Ok(json!({"ok": false, "notes": "no url"}));
    };
    let result = ctx.collaborators.capture.capture(url, headers).await?;
    ctx.record(
        EntryDraft::new(agents::NETWORK_ENGINE, "capture", format!("network capture of {url}"))
            .payload(json!({"url": url, "result": result})),
    )?;
    if let Some(found) = result.get("headers").and_then(Value::as_object)
        && !found.is_empty()
    {
        ctx.record(
            EntryDraft::new(agents::NETWORK_ENGINE, "headers", "key request headers")
                .payload(Value::Object(found.clone())),
        )?;
    }
    ctx.remember_capture(&result);
    Ok(result)
}

/// `capture_network {url?, headers?}`.
pub struct CaptureNetwork;

impl Capability for CaptureNetwork {
    fn name(&self) -> &str {
        "capture_network"
    }

    fn description(&self) -> &str {
        "Capture network traffic of a page load. Args: {url?, headers?}"
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a CapabilityContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CapabilityOutcome>> + Send + 'a>> {
        Box::pin(async move {
            let result =
                capture_and_record(ctx, arg_str(&args, "url"), arg_object(&args, "headers")).await?;
            Ok(CapabilityOutcome::new(result))
        })
    }
}

/// `human_acceptance_flow {algo_pick?, url?, headers?, manifestUrl?}`.
pub struct HumanAcceptance;

impl Capability for HumanAcceptance {
    fn name(&self) -> &str {
        "human_acceptance_flow"
    }

    fn description(&self) -> &str {
        "Hand the static or dynamic artifact to the acceptance flow. Args: {algo_pick?, url?, headers?, manifestUrl?}"
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a CapabilityContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CapabilityOutcome>> + Send + 'a>> {
        Box::pin(async move {
            let pick = ArtifactTarget::from_arg(args.get("algo_pick")).unwrap_or(ArtifactTarget::Dynamic);
            let request = {
                let memory = ctx.memory();
                AcceptanceRequest {
                    pick,
                    artifact_log: ctx.artifacts.log_path(pick),
                    page_url: arg_str(&args, "url")
                        .or_else(|| ctx.task_url())
                        .map(String::from),
                    headers: arg_object(&args, "headers")
                        .cloned()
                        .or_else(|| memory.last_headers.clone()),
                    manifest_url: arg_str(&args, "manifestUrl")
                        .map(String::from)
                        .or_else(|| memory.last_manifest_url.clone()),
                }
            };
            ctx.record(EntryDraft::new(
                ctx.agent.as_str(),
                "start_human_acceptance",
                format!(
                    "submitted to acceptance: {pick} @ {}",
                    request
                        .artifact_log
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default()
                ),
            ))?;
            let result = ctx.collaborators.acceptance.run(request).await?;
            ctx.record(
                EntryDraft::new(agents::ACCEPTANCE, "acceptance", "acceptance flow returned")
                    .payload(result.clone()),
            )?;
            Ok(CapabilityOutcome::new(result))
        })
    }
}
