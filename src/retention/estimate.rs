use crate::audit::AuditEntry;

/// Estimate token count from text using the chars/4 heuristic.
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    chars.div_ceil(4)
}

/// Estimate tokens for a set of entries from their compact JSON encoding.
///
/// Summing characters before dividing keeps the estimate stable under
/// regrouping, which the pruning loop relies on.
pub fn estimate_entries_tokens(entries: &[AuditEntry]) -> u64 {
    let chars: u64 = entries.iter().map(|entry| entry_chars(entry) as u64).sum();
    chars.div_ceil(4)
}

pub(crate) fn entry_chars(entry: &AuditEntry) -> usize {
    serde_json::to_string(entry)
        .map(|json| json.chars().count())
        .unwrap_or_default()
}
