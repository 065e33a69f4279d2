use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `conductor`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum ConductorError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Reasoning service ───────────────────────────────────────────────
    #[error("llm: {0}")]
    Llm(#[from] LlmError),

    // ── Audit store ─────────────────────────────────────────────────────
    #[error("audit: {0}")]
    Audit(#[from] AuditError),

    // ── Capabilities ────────────────────────────────────────────────────
    #[error("capability: {0}")]
    Capability(#[from] CapabilityError),

    // ── Session loop ────────────────────────────────────────────────────
    #[error("session: {0}")]
    Session(#[from] SessionError),

    // ── Run registry ────────────────────────────────────────────────────
    #[error("run: {0}")]
    Run(#[from] RunError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Reasoning service errors ────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("service {service} request failed: {message}")]
    Request { service: String, message: String },

    #[error("service {service} authentication failed: missing api key")]
    Auth { service: String },

    #[error("service {service} returned no usable content")]
    EmptyResponse { service: String },
}

// ─── Audit store errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("io on {}: {source}", path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("entry encoding failed: {0}")]
    Encode(String),
}

// ─── Capability errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("unknown capability: {name}")]
    Unknown { name: String },

    #[error("capability {name} rejected arguments: {message}")]
    InvalidArgs { name: String, message: String },

    #[error("capability {name} failed: {message}")]
    Execution { name: String, message: String },
}

// ─── Session errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("reasoning output unusable")]
    Unparseable,

    #[error("reached max steps ({0}) without completing")]
    BudgetExhausted(u32),

    #[error("sub-session {role} failed: {message}")]
    SubSession { role: String, message: String },
}

// ─── Run errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RunError {
    #[error("run already registered: {0}")]
    Duplicate(String),

    #[error("run not found: {0}")]
    NotFound(String),
}

// ─── Convenience alias ───────────────────────────────────────────────────────

pub type Result<T> = std::result::Result<T, ConductorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_displays_correctly() {
        let err = ConductorError::Config(ConfigError::Validation("bad ratio".into()));
        assert_eq!(err.to_string(), "config: validation failed: bad ratio");
    }

    #[test]
    fn capability_error_converts_into_top_level() {
        let err: ConductorError = CapabilityError::Unknown {
            name: "teleport".into(),
        }
        .into();
        assert!(matches!(err, ConductorError::Capability(_)));
        assert_eq!(err.to_string(), "capability: unknown capability: teleport");
    }

    #[test]
    fn budget_exhaustion_mentions_limit() {
        let err = SessionError::BudgetExhausted(3);
        assert_eq!(err.to_string(), "reached max steps (3) without completing");
    }

    #[test]
    fn anyhow_errors_pass_through_transparently() {
        let err: ConductorError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn audit_io_error_keeps_source() {
        let err = AuditError::Io {
            path: "logs/agents.md".into(),
            source: std::io::Error::other("denied"),
        };
        assert!(err.to_string().contains("logs/agents.md"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
