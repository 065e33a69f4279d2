//! Markdown block format for the audit logs.
//!
//! Each entry is a heading line, an optional `!FLAG` line, the human-readable
//! text and a fenced `json` block holding the full entry. Parsing only looks at
//! the fenced blocks, so the rest of the file can be edited freely.

use super::entry::AuditEntry;
use crate::error::AuditError;
use std::collections::HashSet;

pub const WORKING_HEADER: &str = "# Agents Prompt Log";
pub const RAW_HEADER: &str = "# Agents Raw Log (Full, Uncropped)";

const FENCE: &str = "```";
const NEUTRAL_FENCE: &str = "'''";

/// Render one entry as a self-delimited block, terminated by a blank line.
pub fn render_entry(entry: &AuditEntry) -> Result<String, AuditError> {
    let json = serde_json::to_string_pretty(entry).map_err(|e| AuditError::Encode(e.to_string()))?;
    // Backticks only occur inside JSON strings, where the escape decodes back to the original.
    let json = json.replace('`', "\\u0060");

    let mut block = format!("### [msg:{}] {} → {}\n", entry.timestamp, entry.agent, entry.kind);
    if !entry.flags.is_empty() {
        let flags: Vec<String> = entry.flags.iter().map(|flag| format!("!{flag}")).collect();
        block.push_str(&flags.join(" "));
        block.push('\n');
    }
    block.push_str(&entry.text.replace(FENCE, NEUTRAL_FENCE));
    block.push_str("\n\n");
    block.push_str("```json\n");
    block.push_str(&json);
    block.push_str("\n```\n\n");
    Ok(block)
}

/// Render a whole log file: header followed by every entry block.
pub fn render_log(header: &str, entries: &[AuditEntry]) -> Result<String, AuditError> {
    let mut out = format!("{header}\n\n");
    for entry in entries {
        out.push_str(&render_entry(entry)?);
    }
    Ok(out)
}

/// Recover every entry from a log body by scanning its fenced `json` blocks.
///
/// Blocks that do not decode into an entry (artifact metadata, model noise)
/// are skipped. Duplicate ids keep their first occurrence.
pub fn parse_entries(content: &str) -> Vec<AuditEntry> {
    let mut entries: Vec<AuditEntry> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut block: Option<Vec<&str>> = None;

    for line in content.lines() {
        let trimmed = line.trim();
        match block.as_mut() {
            None => {
                if trimmed == "```json" {
                    block = Some(Vec::new());
                }
            }
            Some(lines) => {
                if trimmed == FENCE {
                    let body = lines.join("\n");
                    block = None;
                    if let Ok(entry) = serde_json::from_str::<AuditEntry>(&body)
                        && seen.insert(entry.id.clone())
                    {
                        entries.push(entry);
                    }
                } else {
                    lines.push(line);
                }
            }
        }
    }

    entries
}
