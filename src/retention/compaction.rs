//! Model-assisted compaction of the working log.
//!
//! The working log is sent to the history-compressor role with instructions to
//! summarize old records and leave protected ones alone. The reply is trusted
//! only after checking: it must carry the log header and at least one entry,
//! and every protected entry is restored verbatim afterwards. Anything else
//! falls back to a local summary.

use super::estimate::estimate_entries_tokens;
use crate::audit::codec::{self, WORKING_HEADER};
use crate::audit::{AuditEntry, AuditStore, EntryDraft, Flag, agents};
use crate::config::RetentionConfig;
use crate::llm::{ChatMessage, ReasoningService};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;
use strum::Display;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct CompactionSettings {
    pub max_tokens: u64,
    pub target_tokens: u64,
    pub keep_recent: usize,
    pub protected: Vec<Flag>,
}

impl CompactionSettings {
    pub fn from_config(config: &RetentionConfig) -> Self {
        Self {
            max_tokens: config.compact_max_tokens,
            target_tokens: config.compact_target_tokens,
            keep_recent: config.compact_keep_recent,
            protected: config.protected_flags.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CompactionStrategy {
    Model,
    LocalFallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionReport {
    pub before_tokens: u64,
    pub after_tokens: u64,
    pub replaced_count: usize,
    pub after_chars: usize,
    pub target_tokens: u64,
    pub strategy: CompactionStrategy,
}

pub struct Compactor {
    service: Arc<dyn ReasoningService>,
    settings: CompactionSettings,
}

impl Compactor {
    pub fn new(service: Arc<dyn ReasoningService>, settings: CompactionSettings) -> Self {
        Self { service, settings }
    }

    pub fn settings(&self) -> &CompactionSettings {
        &self.settings
    }

    /// Compact `store` when it is over the ceiling (or always, with `force`).
    ///
    /// Returns `None` when another compaction holds the gate or nothing qualifies.
    pub async fn run(
        &self,
        store: &Arc<AuditStore>,
        force: bool,
    ) -> anyhow::Result<Option<CompactionReport>> {
        let Ok(_gate) = store.compaction_gate.try_lock() else {
            debug!("compaction already in progress; skipping");
            return Ok(None);
        };

        let snapshot = store.working_entries();
        let before_tokens = estimate_entries_tokens(&snapshot);
        let unprotected = snapshot
            .iter()
            .filter(|entry| !entry.has_any(&self.settings.protected))
            .count();
        if !force
            && (before_tokens <= self.settings.max_tokens
                || unprotected <= self.settings.keep_recent)
        {
            return Ok(None);
        }
        if snapshot.is_empty() {
            return Ok(None);
        }

        let (compacted, strategy) = match self.ask_model(&snapshot, before_tokens).await {
            Ok(Some(entries)) => (entries, CompactionStrategy::Model),
            Ok(None) => {
                warn!("compaction reply rejected; using local summary");
                (self.local_summary(&snapshot), CompactionStrategy::LocalFallback)
            }
            Err(error) => {
                warn!(%error, "compaction call failed; using local summary");
                (self.local_summary(&snapshot), CompactionStrategy::LocalFallback)
            }
        };

        let compacted = reconcile(&snapshot, compacted, &self.settings.protected);
        let snapshot_ids: HashSet<String> = snapshot.iter().map(|e| e.id.clone()).collect();
        let after = store.replace_working(compacted, &snapshot_ids)?;

        let after_ids: HashSet<&str> = after.iter().map(|e| e.id.as_str()).collect();
        let report = CompactionReport {
            before_tokens,
            after_tokens: estimate_entries_tokens(&after),
            replaced_count: snapshot
                .iter()
                .filter(|e| !after_ids.contains(e.id.as_str()))
                .count(),
            after_chars: codec::render_log(WORKING_HEADER, &after)?.chars().count(),
            target_tokens: self.settings.target_tokens,
            strategy,
        };

        store.append(
            EntryDraft::new(
                agents::HISTORY_COMPRESSOR,
                "history_compress",
                format!(
                    "history compacted: tokens {} -> {}, replaced {}, target {}",
                    report.before_tokens,
                    report.after_tokens,
                    report.replaced_count,
                    report.target_tokens
                ),
            )
            .flag(Flag::CompressLog)
            .payload(serde_json::to_value(&report)?),
        )?;

        info!(
            before = report.before_tokens,
            after = report.after_tokens,
            replaced = report.replaced_count,
            strategy = %report.strategy,
            "working log compacted"
        );
        Ok(Some(report))
    }

    fn prompt(&self) -> String {
        let flags: Vec<String> = self.settings.protected.iter().map(ToString::to_string).collect();
        format!(
            "You are the history compressor for an agent audit log (agents.md).\n\
             Summarize older, unrelated records aggressively. Keep recent and unfinished work \
             (pending, in progress) as complete as possible.\n\n\
             Hard rules:\n\
             - Never delete or modify records flagged with: {flags}.\n\
             - Output the complete agents.md text and nothing else.\n\
             - Keep the file header \"{WORKING_HEADER}\".\n\
             - Keep every record's structure: heading line, optional flag line, text, fenced json block.\n\
             - Replace compressed records with one summary record flagged only COMPRESS_LOG, \
             stating how many records it replaces and their key points.\n\n\
             Target: at most {target} estimated tokens for the whole file.",
            flags = flags.join(", "),
            target = self.settings.target_tokens,
        )
    }

    async fn ask_model(
        &self,
        snapshot: &[AuditEntry],
        before_tokens: u64,
    ) -> anyhow::Result<Option<Vec<AuditEntry>>> {
        let messages = [
            ChatMessage::system(self.prompt()),
            ChatMessage::user(codec::render_log(WORKING_HEADER, snapshot)?),
        ];
        let response = self.service.chat(&messages).await?;
        if !response.content.contains(WORKING_HEADER) {
            return Ok(None);
        }
        let entries = codec::parse_entries(&response.content);
        if entries.is_empty() || estimate_entries_tokens(&entries) >= before_tokens {
            return Ok(None);
        }
        Ok(Some(entries))
    }

    /// Keep protected entries and the newest `keep_recent` others; fold the rest into one summary.
    fn local_summary(&self, snapshot: &[AuditEntry]) -> Vec<AuditEntry> {
        let unprotected: Vec<usize> = snapshot
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.has_any(&self.settings.protected))
            .map(|(i, _)| i)
            .collect();
        let cutoff = unprotected.len().saturating_sub(self.settings.keep_recent);
        let dropped: HashSet<usize> = unprotected[..cutoff].iter().copied().collect();
        if dropped.is_empty() {
            return snapshot.to_vec();
        }

        let mut tags: Vec<(String, usize)> = Vec::new();
        for index in &unprotected[..cutoff] {
            let entry = &snapshot[*index];
            let tag = format!("{}@{}", entry.kind, entry.agent);
            match tags.iter_mut().find(|(seen, _)| *seen == tag) {
                Some((_, count)) => *count += 1,
                None => tags.push((tag, 1)),
            }
        }
        let mut text = format!("summary of {} compacted entries:", dropped.len());
        for (tag, count) in &tags {
            let _ = write!(text, " {tag}");
            if *count > 1 {
                let _ = write!(text, " x{count}");
            }
            text.push(';');
        }

        let tag_counts: HashMap<&str, usize> =
            tags.iter().map(|(tag, count)| (tag.as_str(), *count)).collect();
        let summary = EntryDraft::new(agents::HISTORY_COMPRESSOR, "history_summary", text)
            .flag(Flag::CompressLog)
            .payload(serde_json::json!({
                "replacedCount": dropped.len(),
                "tags": tag_counts,
            }))
            .into_entry();

        let mut out = Vec::with_capacity(snapshot.len() - dropped.len() + 1);
        out.push(summary);
        out.extend(
            snapshot
                .iter()
                .enumerate()
                .filter(|(i, _)| !dropped.contains(i))
                .map(|(_, e)| e.clone()),
        );
        out
    }
}

/// Entries already in the snapshot come back verbatim whatever the reply
/// made of them; only new ids (summaries) pass through. Protected entries the
/// reply lost are re-appended.
fn reconcile(snapshot: &[AuditEntry], compacted: Vec<AuditEntry>, protected: &[Flag]) -> Vec<AuditEntry> {
    let originals: HashMap<&str, &AuditEntry> =
        snapshot.iter().map(|e| (e.id.as_str(), e)).collect();

    let mut out: Vec<AuditEntry> = compacted
        .into_iter()
        .map(|entry| match originals.get(entry.id.as_str()) {
            Some(original) => (*original).clone(),
            None => entry,
        })
        .collect();

    let present: HashSet<String> = out.iter().map(|e| e.id.clone()).collect();
    let missing: Vec<AuditEntry> = snapshot
        .iter()
        .filter(|e| e.has_any(protected) && !present.contains(&e.id))
        .cloned()
        .collect();
    if !missing.is_empty() {
        debug!(restored = missing.len(), "protected entries re-appended after compaction");
    }
    out.extend(missing);
    out
}
