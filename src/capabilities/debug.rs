use super::context::CapabilityContext;
use super::traits::{Capability, CapabilityOutcome};
use crate::session::trace::read_recent;
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;

const DEFAULT_LIMIT: usize = 3;

/// `read_debug_recent {limit?}`: tails of this run's latest trace files.
pub struct ReadDebugRecent;

impl Capability for ReadDebugRecent {
    fn name(&self) -> &str {
        "read_debug_recent"
    }

    fn description(&self) -> &str {
        "Tails of the most recent model outputs of this run, top level and sub-sessions. Args: {limit?}"
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a CapabilityContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CapabilityOutcome>> + Send + 'a>> {
        Box::pin(async move {
            let limit = args
                .get("limit")
                .and_then(Value::as_u64)
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_LIMIT);
            Ok(CapabilityOutcome::new(json!(read_recent(&ctx.debug_dir(), limit))))
        })
    }
}
