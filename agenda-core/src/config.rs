//! Configuration types

use crate::time::SystemClock;
use crate::{AgendaError, AgendaResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Pipeline configuration.
///
/// Built once per process and handed to the assistant explicitly; nothing
/// reads the environment after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantConfig {
    // Routing
    pub clarify_threshold: f64,
    pub router_timeout: Duration,

    // Proposal
    pub max_operations: usize,
    pub model_timeout: Duration,
    pub convo_model: String,
    pub code_model: String,

    // Context
    pub context_item_cap: usize,
    pub backlog_sample: usize,

    // Checkpoints
    pub checkpoint_dir: PathBuf,
    pub checkpoint_max_age_days: i64,

    // Idempotency
    pub idempotency_ttl: Duration,

    // Timezone
    pub timezone_name: String,
    pub timezone_offset_minutes: i32,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            clarify_threshold: 0.45,
            router_timeout: Duration::from_secs(10),
            max_operations: 20,
            model_timeout: Duration::from_secs(30),
            convo_model: "llama3.2:3b".to_string(),
            code_model: "granite-code:8b".to_string(),
            context_item_cap: 50,
            backlog_sample: 40,
            checkpoint_dir: PathBuf::from("data/checkpoints"),
            checkpoint_max_age_days: 7,
            idempotency_ttl: Duration::from_secs(24 * 3600),
            timezone_name: "UTC".to_string(),
            timezone_offset_minutes: 0,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl AssistantConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `AGENDA_CLARIFY_THRESHOLD` (default: 0.45)
    /// - `AGENDA_ROUTER_TIMEOUT_MS` (default: 10000)
    /// - `AGENDA_MAX_OPERATIONS` (default: 20)
    /// - `AGENDA_LLM_TIMEOUT_MS` (default: 30000)
    /// - `AGENDA_CONVO_MODEL` / `AGENDA_CODE_MODEL`
    /// - `AGENDA_CONTEXT_ITEM_CAP` (default: 50)
    /// - `AGENDA_BACKLOG_SAMPLE` (default: 40)
    /// - `AGENDA_CHECKPOINT_DIR` (default: data/checkpoints)
    /// - `AGENDA_CHECKPOINT_MAX_DAYS` (default: 7)
    /// - `AGENDA_IDEMPOTENCY_TTL_SECS` (default: 86400)
    /// - `AGENDA_TZ_NAME` / `AGENDA_TZ_OFFSET_MINUTES` (default: UTC / 0)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            clarify_threshold: env_parse("AGENDA_CLARIFY_THRESHOLD")
                .unwrap_or(defaults.clarify_threshold),
            router_timeout: env_parse("AGENDA_ROUTER_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.router_timeout),
            max_operations: env_parse("AGENDA_MAX_OPERATIONS").unwrap_or(defaults.max_operations),
            model_timeout: env_parse("AGENDA_LLM_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.model_timeout),
            convo_model: std::env::var("AGENDA_CONVO_MODEL").unwrap_or(defaults.convo_model),
            code_model: std::env::var("AGENDA_CODE_MODEL").unwrap_or(defaults.code_model),
            context_item_cap: env_parse("AGENDA_CONTEXT_ITEM_CAP")
                .unwrap_or(defaults.context_item_cap),
            backlog_sample: env_parse("AGENDA_BACKLOG_SAMPLE").unwrap_or(defaults.backlog_sample),
            checkpoint_dir: std::env::var("AGENDA_CHECKPOINT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.checkpoint_dir),
            checkpoint_max_age_days: env_parse("AGENDA_CHECKPOINT_MAX_DAYS")
                .unwrap_or(defaults.checkpoint_max_age_days),
            idempotency_ttl: env_parse("AGENDA_IDEMPOTENCY_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.idempotency_ttl),
            timezone_name: std::env::var("AGENDA_TZ_NAME").unwrap_or(defaults.timezone_name),
            timezone_offset_minutes: env_parse("AGENDA_TZ_OFFSET_MINUTES")
                .unwrap_or(defaults.timezone_offset_minutes),
        }
    }

    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(AgendaError::Config) for the first violation.
    pub fn validate(&self) -> AgendaResult<()> {
        if !(0.0..=1.0).contains(&self.clarify_threshold) {
            return Err(invalid(
                "clarify_threshold",
                self.clarify_threshold,
                "clarify_threshold must be between 0.0 and 1.0",
            ));
        }

        if self.max_operations == 0 {
            return Err(invalid(
                "max_operations",
                self.max_operations,
                "max_operations must be greater than 0",
            ));
        }

        if self.context_item_cap == 0 {
            return Err(invalid(
                "context_item_cap",
                self.context_item_cap,
                "context_item_cap must be greater than 0",
            ));
        }

        if self.router_timeout.is_zero() {
            return Err(invalid(
                "router_timeout",
                format!("{:?}", self.router_timeout),
                "router_timeout must be positive",
            ));
        }

        if self.model_timeout.is_zero() {
            return Err(invalid(
                "model_timeout",
                format!("{:?}", self.model_timeout),
                "model_timeout must be positive",
            ));
        }

        if self.checkpoint_max_age_days < 1 {
            return Err(invalid(
                "checkpoint_max_age_days",
                self.checkpoint_max_age_days,
                "checkpoint_max_age_days must be at least 1",
            ));
        }

        if self.code_model.trim().is_empty() {
            return Err(AgendaError::Config(ConfigError::MissingRequired {
                field: "code_model".to_string(),
            }));
        }

        if self.clock().is_none() {
            return Err(invalid(
                "timezone_offset_minutes",
                self.timezone_offset_minutes,
                "offset must be within ±24 hours",
            ));
        }

        Ok(())
    }

    /// Wall clock for the configured timezone, `None` if the offset is out of range.
    pub fn clock(&self) -> Option<SystemClock> {
        SystemClock::with_offset_minutes(self.timezone_offset_minutes, self.timezone_name.clone())
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> AgendaError {
    AgendaError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Clock;

    #[test]
    fn test_default_config_is_valid() {
        let config = AssistantConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.clarify_threshold, 0.45);
        assert_eq!(config.max_operations, 20);
    }

    #[test]
    fn test_threshold_out_of_range() {
        let config = AssistantConfig {
            clarify_threshold: 1.2,
            ..AssistantConfig::default()
        };
        match config.validate() {
            Err(AgendaError::Config(ConfigError::InvalidValue { field, .. })) => {
                assert_eq!(field, "clarify_threshold")
            }
            other => panic!("expected invalid threshold, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_caps_rejected() {
        let config = AssistantConfig {
            max_operations: 0,
            ..AssistantConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AssistantConfig {
            router_timeout: Duration::ZERO,
            ..AssistantConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_code_model_is_missing() {
        let config = AssistantConfig {
            code_model: "  ".to_string(),
            ..AssistantConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AgendaError::Config(ConfigError::MissingRequired { .. }))
        ));
    }

    #[test]
    fn test_clock_uses_configured_zone() {
        let config = AssistantConfig {
            timezone_name: "Asia/Kolkata".to_string(),
            timezone_offset_minutes: 330,
            ..AssistantConfig::default()
        };
        let clock = config.clock().unwrap();
        assert_eq!(clock.zone_name(), "Asia/Kolkata");
        assert_eq!(clock.now().offset().local_minus_utc(), 330 * 60);
    }
}
