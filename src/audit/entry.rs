use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::str::FromStr;
use strum::{Display, EnumString};
use uuid::Uuid;

/// Retention flag attached to an audit entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Flag {
    Keep,
    Critical,
    Decision,
    Error,
    Final,
    Candidate,
    CropLog,
    CompressLog,
}

impl Flag {
    /// Parse a list of loosely typed flag names, dropping anything outside the vocabulary.
    pub fn parse_lenient<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<Flag> {
        let mut flags = Vec::new();
        for name in names {
            if let Ok(flag) = Flag::from_str(name.trim())
                && !flags.contains(&flag)
            {
                flags.push(flag);
            }
        }
        flags
    }

    /// Same as [`Flag::parse_lenient`] for a JSON array; non-arrays yield nothing.
    pub fn from_json(value: Option<&Value>) -> Vec<Flag> {
        value
            .and_then(Value::as_array)
            .map(|items| Flag::parse_lenient(items.iter().filter_map(Value::as_str)))
            .unwrap_or_default()
    }
}

fn lenient_flags<'de, D>(deserializer: D) -> Result<Vec<Flag>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(Flag::from_json(raw.as_ref()))
}

/// One immutable record in the audit log.
///
/// Field order and names follow the embedded JSON block written to the log
/// files, so a serialized entry can be parsed back without a mapping layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub agent: String,
    #[serde(rename = "ts")]
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default, deserialize_with = "lenient_flags")]
    pub flags: Vec<Flag>,
    #[serde(rename = "parentMsgId", default)]
    pub parent_id: Option<String>,
    #[serde(rename = "msgId")]
    pub id: String,
}

impl AuditEntry {
    pub fn has_flag(&self, flag: Flag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn has_any(&self, flags: &[Flag]) -> bool {
        self.flags.iter().any(|flag| flags.contains(flag))
    }

    /// Entries written on behalf of a reasoning-service role.
    pub fn is_reasoning_agent(&self) -> bool {
        self.agent.ends_with(agents::REASONING_SUFFIX)
    }

    /// One-line rendering used when entries are injected into prompts.
    pub fn summary_line(&self) -> String {
        format!("- {} · {} · {}", self.agent, self.kind, self.text)
    }
}

/// An entry that has not been written yet; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    pub agent: String,
    pub kind: String,
    pub text: String,
    pub payload: Option<Value>,
    pub flags: Vec<Flag>,
    pub parent_id: Option<String>,
}

impl EntryDraft {
    pub fn new(agent: impl Into<String>, kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            kind: kind.into(),
            text: text.into(),
            payload: None,
            flags: Vec::new(),
            parent_id: None,
        }
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn flag(mut self, flag: Flag) -> Self {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
        self
    }

    pub fn flags(self, flags: impl IntoIterator<Item = Flag>) -> Self {
        flags.into_iter().fold(self, EntryDraft::flag)
    }

    pub fn parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub(crate) fn into_entry(self) -> AuditEntry {
        let now = Utc::now();
        AuditEntry {
            agent: self.agent,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            kind: self.kind,
            text: self.text,
            payload: self.payload,
            flags: self.flags,
            parent_id: self.parent_id,
            id: format!("{}_{}", now.timestamp_millis(), Uuid::new_v4().simple()),
        }
    }
}

/// Agent labels written into the audit log.
pub mod agents {
    /// Suffix marking entries authored by a reasoning-service role.
    pub const REASONING_SUFFIX: &str = "(llm)";

    pub const COORDINATOR: &str = "coordinator (llm)";
    pub const STATIC_PARSER: &str = "static_parser (llm)";
    pub const NETWORK_CAPTURE: &str = "network_capture (llm)";
    pub const CODE_MAINTAINER: &str = "code_maintainer";
    pub const ERROR_DIAGNOSER: &str = "error_diagnoser";
    pub const CONTEXT_CROPPER: &str = "context_cropper";
    pub const HISTORY_COMPRESSOR: &str = "history_compressor";
    pub const STATIC_ENGINE: &str = "static_engine";
    pub const NETWORK_ENGINE: &str = "network_engine";
    pub const HTML_PREPROCESSOR: &str = "html_preprocessor";
    pub const PAGE_FETCHER: &str = "page_fetcher";
    pub const ACCEPTANCE: &str = "acceptance_flow";
}
