use super::context::CapabilityContext;
use super::traits::{Capability, CapabilityOutcome};
use crate::audit::{EntryDraft, Flag, agents};
use serde::Serialize;
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorClass {
    InputLimit,
    #[serde(rename = "network_403")]
    #[strum(serialize = "network_403")]
    Network403,
    DrmProtected,
    ManifestParseError,
    VariantsEmpty,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposedFix {
    pub action: &'static str,
    pub notes: &'static str,
}

const INPUT_LIMIT_MARKERS: [&str; 2] = ["input limit", "context length"];

/// First matching class wins; matching is case-insensitive.
pub fn classify_error(logs: &str) -> ErrorClass {
    let s = logs.to_lowercase();
    if INPUT_LIMIT_MARKERS.iter().any(|m| s.contains(m)) {
        ErrorClass::InputLimit
    } else if s.contains("403") {
        ErrorClass::Network403
    } else if s.contains("drm") {
        ErrorClass::DrmProtected
    } else if s.contains("parse") && s.contains("manifest") {
        ErrorClass::ManifestParseError
    } else if s.contains("variants") && s.contains("empty") {
        ErrorClass::VariantsEmpty
    } else {
        ErrorClass::Unknown
    }
}

pub fn propose_fix(class: ErrorClass) -> ProposedFix {
    let (action, notes) = match class {
        ErrorClass::InputLimit => (
            "crop_or_compress",
            "crop the window, then compress non-critical entries or retrieve only flagged ones",
        ),
        ErrorClass::Network403 => (
            "add_headers_or_retry",
            "add the required headers or cookies and retry with backoff",
        ),
        ErrorClass::DrmProtected => ("stop", "DRM detected; stop and record a compliance note"),
        ErrorClass::ManifestParseError => (
            "fallback_capture",
            "switch parser or fall back to the network capture result",
        ),
        ErrorClass::VariantsEmpty => (
            "fallback_capture",
            "fall back to the capture result or flag the site as needing an adapter",
        ),
        ErrorClass::Unknown => ("inspect", "inspect the logs and propose a manual fix"),
    };
    ProposedFix { action, notes }
}

pub fn is_input_limit(error: &str) -> bool {
    let s = error.to_lowercase();
    INPUT_LIMIT_MARKERS.iter().any(|m| s.contains(m)) || s.contains("too many tokens")
}

/// Classify `logs` and write a `diagnose` entry. Returns `{type, fix}`.
pub fn diagnose(ctx: &CapabilityContext, logs: &str, flags: &[Flag]) -> anyhow::Result<Value> {
    let class = classify_error(logs);
    let fix = propose_fix(class);
    ctx.record(
        EntryDraft::new(agents::ERROR_DIAGNOSER, "diagnose", format!("diagnosis: {class}"))
            .payload(json!(fix))
            .flags(flags.iter().copied()),
    )?;
    Ok(json!({ "type": class, "fix": fix }))
}

/// `diagnose_error {logs}`.
pub struct DiagnoseError;

impl Capability for DiagnoseError {
    fn name(&self) -> &str {
        "diagnose_error"
    }

    fn description(&self) -> &str {
        "Classify an error log and propose a fix. Args: {logs}"
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a CapabilityContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CapabilityOutcome>> + Send + 'a>> {
        Box::pin(async move {
            let logs = args.get("logs").and_then(Value::as_str).unwrap_or_default();
            diagnose(ctx, logs, &[]).map(CapabilityOutcome::new)
        })
    }
}

/// `detect_input_limit {error}`.
pub struct DetectInputLimit;

impl Capability for DetectInputLimit {
    fn name(&self) -> &str {
        "detect_input_limit"
    }

    fn description(&self) -> &str {
        "Tell whether an error message means the prompt was too large. Args: {error}"
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a CapabilityContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CapabilityOutcome>> + Send + 'a>> {
        Box::pin(async move {
            let error = args.get("error").and_then(Value::as_str).unwrap_or_default();
            let output = json!({ "isInputLimit": is_input_limit(error) });
            ctx.record(
                EntryDraft::new(
                    agents::ERROR_DIAGNOSER,
                    "detect_input_limit",
                    if is_input_limit(error) {
                        "input limit exceeded"
                    } else {
                        "not an input limit"
                    },
                )
                .payload(output.clone()),
            )?;
            Ok(CapabilityOutcome::new(output))
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
    fn classification_order() {
        assert_eq!(classify_error("Context Length exceeded (403)"), ErrorClass::InputLimit);
        assert_eq!(classify_error("HTTP 403 Forbidden"), ErrorClass::Network403);
        assert_eq!(classify_error("Widevine DRM"), ErrorClass::DrmProtected);
        assert_eq!(classify_error("failed to parse manifest"), ErrorClass::ManifestParseError);
        assert_eq!(classify_error("variants list empty"), ErrorClass::VariantsEmpty);
        assert_eq!(classify_error("boom"), ErrorClass::Unknown);
        assert_eq!(ErrorClass::Network403.to_string(), "network_403");
    }

    #[test]
    fn input_limit_detection() {
        assert!(is_input_limit("Too many tokens in request"));
        assert!(is_input_limit("input limit reached"));
        assert!(!is_input_limit(""));
        assert!(!is_input_limit("timeout"));
    }

    #[tokio::test]
    async fn diagnose_records_entry() {
        let dir = TempDir::new().unwrap();
        let ctx = testing::context(&dir, TaskInput::default());
        let outcome = DiagnoseError
            .execute(json!({"logs": "got 403"}), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.output["type"], "network_403");
        assert_eq!(outcome.output["fix"]["action"], "add_headers_or_retry");
        let last = ctx.audit.working_entries().pop().unwrap();
        assert_eq!(last.kind, "diagnose");
        assert_eq!(last.text, "diagnosis: network_403");
    }
}
