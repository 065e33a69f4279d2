use super::context::CapabilityContext;
use super::traits::{Capability, CapabilityOutcome, arg_list, arg_str};
use crate::audit::{EntryDraft, EntryFilter, Flag, agents};
use crate::retention::{PrunePolicy, estimate_entries_tokens, plan_prune};
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;

/// `read_md_messages {agent?, type?, sinceMsgId?}`.
pub struct ReadMessages;

impl Capability for ReadMessages {
    fn name(&self) -> &str {
        "read_md_messages"
    }

    fn description(&self) -> &str {
        "Read working-log entries. Args: {agent?, type?, sinceMsgId?}; agent/type accept a string or a list"
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a CapabilityContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CapabilityOutcome>> + Send + 'a>> {
        Box::pin(async move {
            let filter = EntryFilter {
                agents: arg_list(&args, "agent"),
                kinds: arg_list(&args, "type"),
                since_id: arg_str(&args, "sinceMsgId").map(String::from),
            };
            let messages = ctx.audit.query(&filter, false)?;
            Ok(CapabilityOutcome::new(json!({ "messages": messages })))
        })
    }
}

/// `measure_md_file`.
pub struct MeasureLog;

impl Capability for MeasureLog {
    fn name(&self) -> &str {
        "measure_md_file"
    }

    fn description(&self) -> &str {
        "Size of the working log file in characters and lines"
    }

    fn execute<'a>(
        &'a self,
        _args: Value,
        ctx: &'a CapabilityContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CapabilityOutcome>> + Send + 'a>> {
        Box::pin(async move {
            let measure = ctx.audit.measure()?;
            ctx.record(EntryDraft::new(
                agents::CONTEXT_CROPPER,
                "measure",
                format!(
                    "agents.md size: {} chars, {} lines",
                    measure.file_chars, measure.file_lines
                ),
            ))?;
            Ok(CapabilityOutcome::new(json!(measure)))
        })
    }
}

/// `estimate_tokens`.
pub struct EstimateTokens;

impl Capability for EstimateTokens {
    fn name(&self) -> &str {
        "estimate_tokens"
    }

    fn description(&self) -> &str {
        "Estimated token count of the working log"
    }

    fn execute<'a>(
        &'a self,
        _args: Value,
        ctx: &'a CapabilityContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CapabilityOutcome>> + Send + 'a>> {
        Box::pin(async move {
            let tokens = estimate_entries_tokens(&ctx.audit.working_entries());
            Ok(CapabilityOutcome::new(json!({ "tokens": tokens })))
        })
    }
}

/// `crop_history`: plan a tight prune at the window floor without applying it.
pub struct CropHistory;

impl Capability for CropHistory {
    fn name(&self) -> &str {
        "crop_history"
    }

    fn description(&self) -> &str {
        "Plan how far the working log could be cropped (nothing is removed)"
    }

    fn execute<'a>(
        &'a self,
        _args: Value,
        ctx: &'a CapabilityContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CapabilityOutcome>> + Send + 'a>> {
        Box::pin(async move {
            let mut policy = PrunePolicy::from_config(ctx.audit.retention());
            policy.window = policy.min_window;
            let plan = plan_prune(&ctx.audit.working_entries(), &policy);
            let summary = json!({
                "keptCount": plan.keep_ids.len(),
                "removedCount": plan.removed.len(),
                "window": plan.window,
                "estimatedTokens": plan.estimated_tokens,
                "targetTokens": plan.target_tokens,
            });
            ctx.record(
                EntryDraft::new(
                    agents::CONTEXT_CROPPER,
                    "crop",
                    format!(
                        "crop plan: keep={} remove={}",
                        plan.keep_ids.len(),
                        plan.removed.len()
                    ),
                )
                .payload(summary.clone())
                .flag(Flag::CropLog),
            )?;
            Ok(CapabilityOutcome::new(summary))
        })
    }
}
