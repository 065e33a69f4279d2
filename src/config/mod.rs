mod env_overrides;
mod loader;
#[cfg(test)]
pub(crate) mod test_env;
mod types;

pub(crate) use types::default_protected_flags;
pub use types::{
    AuditConfig, CaptureConfig, Config, ReasoningConfig, RetentionConfig, RoleOverride,
    SensitiveConfig, SessionConfig,
};
