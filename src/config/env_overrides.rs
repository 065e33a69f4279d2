use super::Config;
use crate::audit::Flag;
use std::str::FromStr;

/// Roles whose key/model can be overridden through `<ROLE>_API_KEY` / `<ROLE>_MODEL_ID`.
const ROLE_ENV_PREFIXES: [(&str, &str); 3] = [
    ("STATIC_PARSER", "static_parser"),
    ("NETWORK_CAPTURE", "network_capture"),
    ("HISTORY_COMPRESSOR", "history_compressor"),
];

fn non_empty(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Some(key) = non_empty(&["CONDUCTOR_API_KEY", "ARK_API_KEY"]) {
            self.reasoning.api_key = Some(key);
        }

        if let Some(model) = non_empty(&["CONDUCTOR_MODEL", "ARK_MODEL_ID"]) {
            self.reasoning.model = model;
        }

        if let Some(endpoint) = non_empty(&["CONDUCTOR_ENDPOINT"]) {
            self.reasoning.endpoint = endpoint;
        }

        if let Some(steps) = non_empty(&["COORDINATOR_MAX_STEPS", "LLM_MAX_STEPS"])
            && let Ok(steps) = steps.parse::<i64>()
        {
            self.session.max_steps = steps;
        }

        if let Some(dir) = non_empty(&["AGENTS_LOG_DIR"]) {
            self.audit.log_dir = Some(dir);
        }

        if let Some(window) = non_empty(&["AGENTS_PROMPT_WINDOW"])
            && let Ok(window) = window.parse::<usize>()
        {
            self.retention.window = window;
        }

        if let Some(flags) = non_empty(&["AGENTS_PROMPT_KEEP_FLAGS"]) {
            let parsed: Vec<Flag> = flags
                .split(',')
                .filter_map(|raw| Flag::from_str(raw.trim()).ok())
                .collect();
            if !parsed.is_empty() {
                self.retention.protected_flags = parsed;
            }
        }

        if let Some(max) = non_empty(&["AGENTS_PROMPT_COMPRESS_MAX_TOKENS"])
            && let Ok(max) = max.parse::<u64>()
        {
            self.retention.compact_max_tokens = max;
        }

        if let Some(target) = non_empty(&["AGENTS_PROMPT_COMPRESS_TARGET_TOKENS"])
            && let Ok(target) = target.parse::<u64>()
        {
            self.retention.compact_target_tokens = target;
        }

        if let Some(budget) = non_empty(&["TOKEN_BUDGET", "COORDINATOR_TOKEN_BUDGET"])
            && let Ok(budget) = budget.parse::<u64>()
        {
            self.retention.token_budget = budget;
        }

        if let Some(ratio) = non_empty(&["CONTEXT_RESERVE_RATIO"])
            && let Ok(ratio) = ratio.parse::<f64>()
            && (0.0..1.0).contains(&ratio)
        {
            self.retention.reserve_ratio = ratio;
        }

        if let Some(enabled) = non_empty(&["SENSITIVE_FILTER_ENABLED"]) {
            self.sensitive.enabled = enabled.eq_ignore_ascii_case("true");
        }

        for (prefix, role) in ROLE_ENV_PREFIXES {
            let api_key = non_empty(&[&format!("{prefix}_API_KEY")]);
            let model = non_empty(&[&format!("{prefix}_MODEL_ID")]);
            if api_key.is_none() && model.is_none() {
                continue;
            }
            let entry = self.reasoning.roles.entry(role.to_string()).or_default();
            if api_key.is_some() {
                entry.api_key = api_key;
            }
            if model.is_some() {
                entry.model = model;
            }
        }
    }
}
