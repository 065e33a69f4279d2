use super::context::CapabilityContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use strum::{Display, EnumString};

/// Session-level action a capability can mark as done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionKind {
    ArtifactWritten,
    ReportWritten,
}

/// What a capability hands back to the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityOutcome {
    /// Structured output fed back to the model as `TOOL_OUTPUT`.
    pub output: Value,
    /// Action completed by this call, if any.
    pub action: Option<ActionKind>,
    /// Follow-up instruction for the model (e.g. a retry request).
    pub follow_up: Option<String>,
}

impl CapabilityOutcome {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            action: None,
            follow_up: None,
        }
    }

    pub fn with_action(mut self, action: ActionKind) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_follow_up(mut self, instruction: impl Into<String>) -> Self {
        self.follow_up = Some(instruction.into());
        self
    }
}

impl From<Value> for CapabilityOutcome {
    fn from(output: Value) -> Self {
        Self::new(output)
    }
}

/// A named handler the reasoning service can invoke with untyped arguments.
pub trait Capability: Send + Sync {
    /// Name used in `{"tool": ...}` directives.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Run the capability. Errors are caught at the dispatch boundary.
    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a CapabilityContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CapabilityOutcome>> + Send + 'a>>;
}

// ── Argument helpers ─────────────────────────────────────────────────────────

/// Non-empty string argument, trimmed.
pub(crate) fn arg_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Argument as an object value, ignoring null and non-objects.
pub(crate) fn arg_object<'a>(args: &'a Value, key: &str) -> Option<&'a Value> {
    args.get(key).filter(|v| v.is_object())
}

/// String list argument accepting either a single string or an array.
pub(crate) fn arg_list(args: &Value, key: &str) -> Vec<String> {
    match args.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
