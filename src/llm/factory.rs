use super::compatible::CompatibleService;
use super::sensitive::SensitiveFilter;
use super::traits::ReasoningService;
use crate::config::{Config, ReasoningConfig};
use std::sync::Arc;
use strum::{Display, EnumString};

/// Which part of the system a reasoning service speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ServiceRole {
    Coordinator,
    StaticParser,
    NetworkCapture,
    HistoryCompressor,
}

/// Resolve key and model for a role: role override first, then the global values.
fn resolve_credentials(config: &ReasoningConfig, role: ServiceRole) -> (Option<String>, String) {
    let role_override = config.roles.get(&role.to_string());
    let api_key = role_override
        .and_then(|o| o.api_key.as_deref())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(ToString::to_string)
        .or_else(|| config.api_key.clone());
    let model = role_override
        .and_then(|o| o.model.as_deref())
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map_or_else(|| config.model.clone(), ToString::to_string);
    (api_key, model)
}

pub fn create_service(
    config: &ReasoningConfig,
    role: ServiceRole,
    filter: Option<Arc<SensitiveFilter>>,
) -> Arc<dyn ReasoningService> {
    let (api_key, model) = resolve_credentials(config, role);
    Arc::new(
        CompatibleService::new(&role.to_string(), &config.endpoint, api_key.as_deref(), &model)
            .with_temperature(config.temperature)
            // Compaction replies are a markdown log, not a JSON object.
            .with_json_mode(config.json_mode && role != ServiceRole::HistoryCompressor)
            .with_timeout(config.timeout_secs)
            .with_filter(filter),
    )
}

/// One service per role, shared by every run in the process.
#[derive(Clone)]
pub struct ServiceSet {
    pub coordinator: Arc<dyn ReasoningService>,
    pub static_parser: Arc<dyn ReasoningService>,
    pub network_capture: Arc<dyn ReasoningService>,
    pub history_compressor: Arc<dyn ReasoningService>,
}

impl ServiceSet {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let filter = SensitiveFilter::from_config(&config.sensitive)?.map(Arc::new);
        let build = |role| create_service(&config.reasoning, role, filter.clone());
        Ok(Self {
            coordinator: build(ServiceRole::Coordinator),
            static_parser: build(ServiceRole::StaticParser),
            network_capture: build(ServiceRole::NetworkCapture),
            history_compressor: build(ServiceRole::HistoryCompressor),
        })
    }

    /// Every role backed by the same service.
    pub fn uniform(service: Arc<dyn ReasoningService>) -> Self {
        Self {
            coordinator: Arc::clone(&service),
            static_parser: Arc::clone(&service),
            network_capture: Arc::clone(&service),
            history_compressor: service,
        }
    }

    pub fn get(&self, role: ServiceRole) -> &Arc<dyn ReasoningService> {
        match role {
            ServiceRole::Coordinator => &self.coordinator,
            ServiceRole::StaticParser => &self.static_parser,
            ServiceRole::NetworkCapture => &self.network_capture,
            ServiceRole::HistoryCompressor => &self.history_compressor,
        }
    }
}
