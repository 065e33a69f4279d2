use super::estimate::estimate_entries_tokens;
use crate::audit::{AuditEntry, Flag};
use crate::config::RetentionConfig;
use serde::Serialize;
use std::collections::HashSet;

/// Parameters of the sliding-window pass.
#[derive(Debug, Clone)]
pub struct PrunePolicy {
    pub window: usize,
    pub min_window: usize,
    pub damping: f64,
    pub target_tokens: u64,
    pub protected: Vec<Flag>,
}

impl PrunePolicy {
    pub fn from_config(config: &RetentionConfig) -> Self {
        Self {
            window: config.window,
            min_window: config.min_window.max(1),
            damping: config.damping,
            target_tokens: target_tokens(config.token_budget, config.reserve_ratio),
            protected: config.protected_flags.clone(),
        }
    }
}

/// `max(1000, floor(budget × (1 − reserve)))`.
pub fn target_tokens(budget: u64, reserve_ratio: f64) -> u64 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let usable = (budget as f64 * (1.0 - reserve_ratio)).floor().max(0.0) as u64;
    usable.max(1000)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrunePlan {
    pub keep_ids: Vec<String>,
    pub removed: Vec<String>,
    /// Window size the damping loop settled on.
    pub window: usize,
    pub estimated_tokens: u64,
    pub target_tokens: u64,
}

fn shrink(window: usize, damping: f64, floor: usize) -> usize {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let next = (window as f64 * damping).floor() as usize;
    next.max(floor).min(window)
}

/// Plan which working entries survive: every protected entry plus the newest
/// `window` unprotected ones, shrinking the window while the kept set is over
/// the token target. Pure, so running it on its own output removes nothing.
pub fn plan_prune(entries: &[AuditEntry], policy: &PrunePolicy) -> PrunePlan {
    let unprotected: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| !entry.has_any(&policy.protected))
        .map(|(index, _)| index)
        .collect();

    let assemble = |window: usize| -> Vec<AuditEntry> {
        let cutoff = unprotected.len().saturating_sub(window);
        let dropped: HashSet<usize> = unprotected[..cutoff].iter().copied().collect();
        entries
            .iter()
            .enumerate()
            .filter(|(index, _)| !dropped.contains(index))
            .map(|(_, entry)| entry.clone())
            .collect()
    };

    let floor = policy.min_window.min(policy.window);
    let mut window = policy.window;
    let mut kept = assemble(window);
    let mut tokens = estimate_entries_tokens(&kept);
    while tokens > policy.target_tokens && window > floor {
        window = shrink(window, policy.damping, floor);
        kept = assemble(window);
        tokens = estimate_entries_tokens(&kept);
    }

    let keep: HashSet<&str> = kept.iter().map(|entry| entry.id.as_str()).collect();
    let removed = entries
        .iter()
        .filter(|entry| !keep.contains(entry.id.as_str()))
        .map(|entry| entry.id.clone())
        .collect();

    PrunePlan {
        keep_ids: kept.into_iter().map(|entry| entry.id).collect(),
        removed,
        window,
        estimated_tokens: tokens,
        target_tokens: policy.target_tokens,
    }
}
