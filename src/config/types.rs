use crate::audit::Flag;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory - computed from home, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub reasoning: ReasoningConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub sensitive: SensitiveConfig,

    #[serde(default)]
    pub capture: CaptureConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from("."),
            config_path: PathBuf::from("config.toml"),
            reasoning: ReasoningConfig::default(),
            session: SessionConfig::default(),
            audit: AuditConfig::default(),
            retention: RetentionConfig::default(),
            sensitive: SensitiveConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

// ── Reasoning service ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Ask the service for a JSON-object response format.
    #[serde(default = "default_true")]
    pub json_mode: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Per-role key/model overrides, keyed by role name (`static_parser`, ...).
    #[serde(default)]
    pub roles: HashMap<String, RoleOverride>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleOverride {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

fn default_endpoint() -> String {
    "https://ark.cn-beijing.volces.com/api/v3/chat/completions".into()
}

fn default_model() -> String {
    "doubao-1-5-pro-32k-250115".into()
}

fn default_temperature() -> f64 {
    0.2
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            json_mode: true,
            timeout_secs: default_timeout_secs(),
            roles: HashMap::new(),
        }
    }
}

// ── Session loop ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Top-level step budget. Non-positive values fall back to the default.
    #[serde(default = "default_max_steps")]
    pub max_steps: i64,
    /// Step budget for each delegated sub-session.
    #[serde(default = "default_sub_max_steps")]
    pub sub_max_steps: i64,
    /// Minimum trimmed length of an artifact write.
    #[serde(default = "default_min_artifact_chars")]
    pub min_artifact_chars: usize,
    /// How many recent trace files to echo back after each top-level call (0 disables).
    #[serde(default = "default_debug_feedback_limit")]
    pub debug_feedback_limit: usize,
}

fn default_max_steps() -> i64 {
    100
}

fn default_sub_max_steps() -> i64 {
    8
}

fn default_min_artifact_chars() -> usize {
    50
}

fn default_debug_feedback_limit() -> usize {
    2
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            sub_max_steps: default_sub_max_steps(),
            min_artifact_chars: default_min_artifact_chars(),
            debug_feedback_limit: default_debug_feedback_limit(),
        }
    }
}

// ── Audit store ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Log directory; defaults to `<workspace>/logs`. Accepts `~`.
    #[serde(default)]
    pub log_dir: Option<String>,
}

// ── Retention ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_min_window")]
    pub min_window: usize,
    #[serde(default = "default_damping")]
    pub damping: f64,
    #[serde(default = "default_token_budget")]
    pub token_budget: u64,
    #[serde(default = "default_reserve_ratio")]
    pub reserve_ratio: f64,
    #[serde(default = "default_protected_flags")]
    pub protected_flags: Vec<Flag>,
    #[serde(default = "default_compact_max_tokens")]
    pub compact_max_tokens: u64,
    #[serde(default = "default_compact_target_tokens")]
    pub compact_target_tokens: u64,
    #[serde(default = "default_compact_keep_recent")]
    pub compact_keep_recent: usize,
}

fn default_window() -> usize {
    30
}

fn default_min_window() -> usize {
    3
}

fn default_damping() -> f64 {
    0.7
}

fn default_token_budget() -> u64 {
    8000
}

fn default_reserve_ratio() -> f64 {
    0.25
}

pub(crate) fn default_protected_flags() -> Vec<Flag> {
    vec![Flag::Critical, Flag::Decision, Flag::Keep, Flag::Error]
}

fn default_compact_max_tokens() -> u64 {
    50_000
}

fn default_compact_target_tokens() -> u64 {
    20_000
}

fn default_compact_keep_recent() -> usize {
    5
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            min_window: default_min_window(),
            damping: default_damping(),
            token_budget: default_token_budget(),
            reserve_ratio: default_reserve_ratio(),
            protected_flags: default_protected_flags(),
            compact_max_tokens: default_compact_max_tokens(),
            compact_target_tokens: default_compact_target_tokens(),
            compact_keep_recent: default_compact_keep_recent(),
        }
    }
}

// ── Sensitive-term filter ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitiveConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Outbound term → placeholder. Must be one-to-one.
    #[serde(default)]
    pub replacements: BTreeMap<String, String>,
}

impl Default for SensitiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            replacements: BTreeMap::new(),
        }
    }
}

// ── Capture / fetch limits ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_html_max_chars")]
    pub html_max_chars: usize,
    #[serde(default = "default_fetch_max_chars")]
    pub fetch_max_chars: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_html_max_chars() -> usize {
    120_000
}

fn default_fetch_max_chars() -> usize {
    180_000
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            html_max_chars: default_html_max_chars(),
            fetch_max_chars: default_fetch_max_chars(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

// ── Derived values and validation ────────────────────────────────────────────

impl Config {
    /// Resolved audit log directory.
    pub fn log_dir(&self) -> PathBuf {
        match self.audit.log_dir.as_deref() {
            Some(dir) if !dir.trim().is_empty() => {
                PathBuf::from(shellexpand::tilde(dir.trim()).into_owned())
            }
            _ => self.workspace_dir.join("logs"),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.reasoning.temperature) {
            return Err(ConfigError::Validation(format!(
                "reasoning.temperature must be within 0..=2, got {}",
                self.reasoning.temperature
            )));
        }
        let retention = &self.retention;
        if !(0.0..1.0).contains(&retention.reserve_ratio) {
            return Err(ConfigError::Validation(format!(
                "retention.reserve_ratio must be within 0..1, got {}",
                retention.reserve_ratio
            )));
        }
        if !(retention.damping > 0.0 && retention.damping < 1.0) {
            return Err(ConfigError::Validation(format!(
                "retention.damping must be strictly between 0 and 1, got {}",
                retention.damping
            )));
        }
        if retention.min_window == 0 {
            return Err(ConfigError::Validation(
                "retention.min_window must be at least 1".into(),
            ));
        }
        if retention.compact_target_tokens > retention.compact_max_tokens {
            return Err(ConfigError::Validation(format!(
                "retention.compact_target_tokens ({}) exceeds compact_max_tokens ({})",
                retention.compact_target_tokens, retention.compact_max_tokens
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.session.max_steps, 100);
        assert_eq!(config.session.sub_max_steps, 8);
        assert_eq!(config.retention.window, 30);
        assert_eq!(config.retention.min_window, 3);
        assert_eq!(config.retention.compact_max_tokens, 50_000);
        assert_eq!(
            config.retention.protected_flags,
            vec![Flag::Critical, Flag::Decision, Flag::Keep, Flag::Error]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_toml_deserializes_to_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.reasoning.model, default_model());
        assert_eq!(config.capture.html_max_chars, 120_000);
        assert!(config.sensitive.enabled);
    }

    #[test]
    fn protected_flags_parse_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [retention]
            protected_flags = ["KEEP", "FINAL"]
            "#,
        )
        .unwrap();
        assert_eq!(config.retention.protected_flags, vec![Flag::Keep, Flag::Final]);
    }

    #[test]
    fn role_overrides_parse_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [reasoning.roles.static_parser]
            model = "parser-model"
            "#,
        )
        .unwrap();
        let role = config.reasoning.roles.get("static_parser").unwrap();
        assert_eq!(role.model.as_deref(), Some("parser-model"));
        assert!(role.api_key.is_none());
    }

    #[test]
    fn validate_rejects_bad_reserve_ratio() {
        let mut config = Config::default();
        config.retention.reserve_ratio = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("reserve_ratio"));
    }

    #[test]
    fn validate_rejects_target_above_ceiling() {
        let mut config = Config::default();
        config.retention.compact_target_tokens = 60_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn log_dir_defaults_under_workspace() {
        let config = Config {
            workspace_dir: PathBuf::from("/tmp/ws"),
            ..Config::default()
        };
        assert_eq!(config.log_dir(), PathBuf::from("/tmp/ws/logs"));
    }

    #[test]
    fn log_dir_honors_explicit_setting() {
        let mut config = Config::default();
        config.audit.log_dir = Some("/var/log/conductor".into());
        assert_eq!(config.log_dir(), PathBuf::from("/var/log/conductor"));
    }
}
