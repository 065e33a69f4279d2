use super::context::CapabilityContext;
use super::traits::{ActionKind, Capability, CapabilityOutcome};
use crate::audit::{EntryDraft, Flag};
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;

/// `record_message {text, payload?, flags?}`: a report from the calling session.
pub struct RecordMessage;

impl Capability for RecordMessage {
    fn name(&self) -> &str {
        "record_message"
    }

    fn description(&self) -> &str {
        "Write a note or report to the audit log. Args: {text, payload?, flags?}"
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a CapabilityContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CapabilityOutcome>> + Send + 'a>> {
        Box::pin(async move {
            let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
            let mut draft = EntryDraft::new(ctx.agent.as_str(), "note", text)
                .flags(Flag::from_json(args.get("flags")));
            if let Some(payload) = args.get("payload").filter(|p| !p.is_null()) {
                draft = draft.payload(payload.clone());
            }
            ctx.record(draft)?;
            Ok(CapabilityOutcome::new(json!({"ok": true})).with_action(ActionKind::ReportWritten))
        })
    }
}

/// `finalize {manifestUrl?, filePath?, notes?}`: echoes a final payload.
pub struct Finalize;

impl Capability for Finalize {
    fn name(&self) -> &str {
        "finalize"
    }

    fn description(&self) -> &str {
        "Shape a final result. Args: {manifestUrl?, filePath?, notes?}"
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        _ctx: &'a CapabilityContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CapabilityOutcome>> + Send + 'a>> {
        Box::pin(async move {
            let field = |key: &str| args.get(key).cloned().unwrap_or(Value::Null);
            Ok(CapabilityOutcome::new(json!({
                "final": {
                    "manifestUrl": field("manifestUrl"),
                    "filePath": field("filePath"),
                    "notes": field("notes"),
                }
            })))
        })
    }
}
