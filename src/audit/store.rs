use super::codec::{self, RAW_HEADER, WORKING_HEADER};
use super::entry::{AuditEntry, EntryDraft};
use crate::config::RetentionConfig;
use crate::error::AuditError;
use crate::retention::compaction::{CompactionReport, Compactor};
use crate::retention::estimate::estimate_entries_tokens;
use crate::retention::prune::{PrunePlan, PrunePolicy, plan_prune};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, info, warn};

/// Selection over stored entries. Empty lists match everything.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub agents: Vec<String>,
    pub kinds: Vec<String>,
    /// Only entries strictly after this id. An unknown id selects everything.
    pub since_id: Option<String>,
}

impl EntryFilter {
    pub fn apply(&self, entries: Vec<AuditEntry>) -> Vec<AuditEntry> {
        let start = self
            .since_id
            .as_deref()
            .and_then(|since| entries.iter().position(|entry| entry.id == since))
            .map_or(0, |index| index + 1);
        entries
            .into_iter()
            .skip(start)
            .filter(|entry| self.agents.is_empty() || self.agents.contains(&entry.agent))
            .filter(|entry| self.kinds.is_empty() || self.kinds.contains(&entry.kind))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeasure {
    pub file_chars: usize,
    pub file_lines: usize,
}

/// Dual-channel audit ledger: a prunable working log and an append-only raw mirror.
///
/// Both files live in one directory. All writes go through a single mutex so
/// raw and working stay totally ordered; compaction is serialized separately
/// through `compaction_gate`.
pub struct AuditStore {
    log_dir: PathBuf,
    working_path: PathBuf,
    raw_path: PathBuf,
    retention: RetentionConfig,
    working: Mutex<Vec<AuditEntry>>,
    compactor: OnceLock<Arc<Compactor>>,
    pub(crate) compaction_gate: tokio::sync::Mutex<()>,
}

impl AuditStore {
    pub const WORKING_FILE: &'static str = "agents.md";
    pub const RAW_FILE: &'static str = "agents_raw.md";

    pub fn open(log_dir: impl Into<PathBuf>, retention: RetentionConfig) -> Result<Self, AuditError> {
        let log_dir = log_dir.into();
        fs::create_dir_all(&log_dir).map_err(|source| AuditError::Io {
            path: log_dir.clone(),
            source,
        })?;
        let working_path = log_dir.join(Self::WORKING_FILE);
        let raw_path = log_dir.join(Self::RAW_FILE);
        ensure_log_file(&working_path, WORKING_HEADER)?;
        ensure_log_file(&raw_path, RAW_HEADER)?;

        let existing = codec::parse_entries(&read_file(&working_path)?);
        debug!(entries = existing.len(), path = %working_path.display(), "audit store opened");

        Ok(Self {
            log_dir,
            working_path,
            raw_path,
            retention,
            working: Mutex::new(existing),
            compactor: OnceLock::new(),
            compaction_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Attach the compactor used for automatic compaction. Only the first call wins.
    pub fn set_compactor(&self, compactor: Arc<Compactor>) {
        if self.compactor.set(compactor).is_err() {
            warn!("audit store compactor already configured; ignoring replacement");
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn working_path(&self) -> &Path {
        &self.working_path
    }

    pub fn raw_path(&self) -> &Path {
        &self.raw_path
    }

    pub fn retention(&self) -> &RetentionConfig {
        &self.retention
    }

    fn lock_working(&self) -> std::sync::MutexGuard<'_, Vec<AuditEntry>> {
        self.working.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Writes ───────────────────────────────────────────────────────────

    /// Write an entry to raw, then working, then re-evaluate retention.
    ///
    /// When the working log grows past the compaction ceiling and a compactor
    /// is attached, compaction is spawned on the current tokio runtime.
    pub fn append(self: &Arc<Self>, draft: EntryDraft) -> Result<AuditEntry, AuditError> {
        let entry = draft.into_entry();
        let tokens = {
            let mut working = self.lock_working();
            let block = codec::render_entry(&entry)?;
            append_to_file(&self.raw_path, &block)?;
            append_to_file(&self.working_path, &block)?;
            working.push(entry.clone());
            self.prune_locked(&mut working)?;
            estimate_entries_tokens(&working)
        };
        self.schedule_compaction(tokens);
        Ok(entry)
    }

    /// Record an entry in the raw log only, for bulky originals the working log should not carry.
    pub fn append_raw_only(&self, draft: EntryDraft) -> Result<AuditEntry, AuditError> {
        let entry = draft.into_entry();
        let _working = self.lock_working();
        append_to_file(&self.raw_path, &codec::render_entry(&entry)?)?;
        Ok(entry)
    }

    fn schedule_compaction(self: &Arc<Self>, tokens: u64) {
        if tokens <= self.retention.compact_max_tokens {
            return;
        }
        let Some(compactor) = self.compactor.get().cloned() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(tokens, "no runtime available; compaction deferred");
            return;
        };
        let store = Arc::clone(self);
        handle.spawn(async move {
            if let Err(error) = compactor.run(&store, false).await {
                warn!(%error, "background compaction failed");
            }
        });
    }

    // ── Retention ────────────────────────────────────────────────────────

    fn prune_locked(&self, working: &mut Vec<AuditEntry>) -> Result<Option<PrunePlan>, AuditError> {
        let plan = plan_prune(working, &PrunePolicy::from_config(&self.retention));
        if plan.removed.is_empty() {
            return Ok(None);
        }
        let removed: HashSet<&str> = plan.removed.iter().map(String::as_str).collect();
        working.retain(|entry| !removed.contains(entry.id.as_str()));
        write_file(&self.working_path, &codec::render_log(WORKING_HEADER, working)?)?;
        debug!(
            removed = plan.removed.len(),
            kept = working.len(),
            window = plan.window,
            "working log pruned"
        );
        Ok(Some(plan))
    }

    /// Run the pruning pass immediately. Returns the plan when anything was removed.
    pub fn prune_now(&self) -> Result<Option<PrunePlan>, AuditError> {
        let mut working = self.lock_working();
        self.prune_locked(&mut working)
    }

    /// Compact the working log now. With `force` the ceiling check is skipped.
    ///
    /// Uses the attached compactor, or `compactor` when given explicitly.
    pub async fn compact_now(
        self: &Arc<Self>,
        compactor: Option<&Compactor>,
        force: bool,
    ) -> anyhow::Result<Option<CompactionReport>> {
        let attached = self.compactor.get().cloned();
        let Some(compactor) = compactor.or(attached.as_deref()) else {
            anyhow::bail!("no compactor configured for {}", self.working_path.display());
        };
        compactor.run(self, force).await
    }

    /// Swap in a compacted working body.
    ///
    /// Entries appended after `snapshot_ids` was taken are kept after the
    /// compacted body; entries new to the store are mirrored into raw.
    /// Snapshot entries pruned while compaction ran stay gone, and retention
    /// is re-applied to the result.
    pub(crate) fn replace_working(
        &self,
        compacted: Vec<AuditEntry>,
        snapshot_ids: &HashSet<String>,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let mut working = self.lock_working();
        let mut next: Vec<AuditEntry> = {
            let current: HashSet<&str> = working.iter().map(|entry| entry.id.as_str()).collect();
            compacted
                .into_iter()
                .filter(|entry| !snapshot_ids.contains(&entry.id) || current.contains(entry.id.as_str()))
                .collect()
        };
        let mut seen: HashSet<String> = next.iter().map(|entry| entry.id.clone()).collect();
        for entry in working.iter() {
            if !snapshot_ids.contains(&entry.id) && seen.insert(entry.id.clone()) {
                next.push(entry.clone());
            }
        }

        let raw_ids: HashSet<String> = codec::parse_entries(&read_file(&self.raw_path)?)
            .into_iter()
            .map(|entry| entry.id)
            .collect();
        for entry in &next {
            if !raw_ids.contains(&entry.id) {
                append_to_file(&self.raw_path, &codec::render_entry(entry)?)?;
            }
        }

        write_file(&self.working_path, &codec::render_log(WORKING_HEADER, &next)?)?;
        info!(before = working.len(), after = next.len(), "working log replaced");
        *working = next;
        self.prune_locked(&mut working)?;
        Ok(working.clone())
    }

    // ── Reads ────────────────────────────────────────────────────────────

    pub fn working_entries(&self) -> Vec<AuditEntry> {
        self.lock_working().clone()
    }

    pub fn read_raw(&self) -> Result<Vec<AuditEntry>, AuditError> {
        let _working = self.lock_working();
        Ok(codec::parse_entries(&read_file(&self.raw_path)?))
    }

    pub fn query(&self, filter: &EntryFilter, raw: bool) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = if raw {
            self.read_raw()?
        } else {
            self.working_entries()
        };
        Ok(filter.apply(entries))
    }

    /// The newest `limit` working entries matching `predicate`, oldest first.
    pub fn recent<F>(&self, limit: usize, predicate: F) -> Vec<AuditEntry>
    where
        F: Fn(&AuditEntry) -> bool,
    {
        let working = self.lock_working();
        let mut picked: Vec<AuditEntry> = working
            .iter()
            .rev()
            .filter(|entry| predicate(entry))
            .take(limit)
            .cloned()
            .collect();
        picked.reverse();
        picked
    }

    pub fn estimated_tokens(&self) -> u64 {
        estimate_entries_tokens(&self.lock_working())
    }

    pub fn measure(&self) -> Result<FileMeasure, AuditError> {
        let _working = self.lock_working();
        let content = read_file(&self.working_path)?;
        Ok(FileMeasure {
            file_chars: content.chars().count(),
            file_lines: content.lines().count(),
        })
    }
}

// ── File helpers ─────────────────────────────────────────────────────────────

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> AuditError + '_ {
    move |source| AuditError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn ensure_log_file(path: &Path, header: &str) -> Result<(), AuditError> {
    if path.exists() {
        return Ok(());
    }
    write_file(path, &format!("{header}\n\n"))
}

fn read_file(path: &Path) -> Result<String, AuditError> {
    fs::read_to_string(path).map_err(io_error(path))
}

fn write_file(path: &Path, content: &str) -> Result<(), AuditError> {
    fs::write(path, content).map_err(io_error(path))
}

fn append_to_file(path: &Path, block: &str) -> Result<(), AuditError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_error(path))?;
    file.write_all(block.as_bytes()).map_err(io_error(path))
}
