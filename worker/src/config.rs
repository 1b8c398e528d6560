//! Configuration loading
//!
//! YAML file plus environment overrides, with code-side defaults for every
//! field. Only the inputs that affect core behaviour live here: retry
//! defaults, concurrency caps, cache TTLs, rate limits and circuit
//! thresholds, and the valuation bounds.

use crate::artifacts::ValuationBounds;
use crate::cache::CacheTtls;
use crate::llm::{CircuitSettings, RateLimitSettings};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub system: SystemConfig,
    pub engine: EngineConfig,
    pub cache: CacheTtls,
    pub llm: LlmConfig,
    pub valuation: ValuationBounds,
    pub dlq: DlqConfig,
}

/// Service identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub env: String,
    pub service_name: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            env: "dev".to_string(),
            service_name: "biovalue-worker".to_string(),
        }
    }
}

/// Engine-facing settings: task queue, retry defaults, concurrency caps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub task_queue: String,
    pub max_concurrent_activities: usize,
    pub max_concurrent_workflows: usize,
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            task_queue: "biovalue-task-queue".to_string(),
            max_concurrent_activities: 20,
            max_concurrent_workflows: 10,
            retry: RetryConfig::default(),
        }
    }
}

/// Retry defaults applied to agent activities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_interval_ms: u64,
    pub backoff_coefficient: f64,
    pub maximum_interval_ms: u64,
    pub maximum_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 5_000,
            backoff_coefficient: 2.0,
            maximum_interval_ms: 60_000,
            maximum_attempts: 5,
        }
    }
}

impl RetryConfig {
    /// Engine retry policy with this config's intervals and the given
    /// attempt cap
    pub fn policy(&self, max_attempts: u32) -> biovalue_engine::RetryPolicy {
        biovalue_engine::RetryPolicy {
            max_attempts,
            initial_interval: std::time::Duration::from_millis(self.initial_interval_ms),
            backoff_coefficient: self.backoff_coefficient,
            max_interval: std::time::Duration::from_millis(self.maximum_interval_ms),
        }
    }
}

/// LLM collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub timeout_secs: u64,
    pub rate_limit: RateLimitSettings,
    pub circuit: CircuitSettings,
    pub fallback: FallbackConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "primary".to_string(),
            model: "default".to_string(),
            timeout_secs: 120,
            rate_limit: RateLimitSettings::default(),
            circuit: CircuitSettings::default(),
            fallback: FallbackConfig::default(),
        }
    }
}

/// Fallback provider settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub enabled: bool,
    pub provider: String,
    pub model: String,
}

/// Dead-letter queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DlqConfig {
    pub stream: String,
    pub alert_threshold: u64,
}

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            stream: crate::dlq::DEFAULT_STREAM.to_string(),
            alert_threshold: 100,
        }
    }
}

impl Config {
    /// Load configuration: the file at `BIOVALUE_CONFIG` (or the given
    /// path), falling back to defaults when absent.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var("BIOVALUE_CONFIG").ok().map(Into::into),
        };

        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config: {}", path.display()))?;
                serde_yaml::from_str(&raw)
                    .with_context(|| format!("failed to parse config: {}", path.display()))?
            }
            None => Config::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(queue) = std::env::var("BIOVALUE_TASK_QUEUE") {
            self.engine.task_queue = queue;
        }
        if let Ok(model) = std::env::var("BIOVALUE_LLM_MODEL") {
            self.llm.model = model;
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.engine.max_concurrent_activities > 0,
            "max_concurrent_activities must be positive"
        );
        anyhow::ensure!(
            self.engine.max_concurrent_workflows > 0,
            "max_concurrent_workflows must be positive"
        );
        anyhow::ensure!(
            self.engine.retry.backoff_coefficient >= 1.0,
            "backoff_coefficient must be >= 1.0"
        );
        anyhow::ensure!(
            self.valuation.wacc_min < self.valuation.wacc_max,
            "wacc_min must be below wacc_max"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.engine.max_concurrent_activities, 20);
        assert_eq!(config.engine.max_concurrent_workflows, 10);
        assert_eq!(config.engine.retry.maximum_attempts, 5);
        assert_eq!(config.cache.financials_secs, 86400);
        assert_eq!(config.valuation.wacc_min, 0.08);
        assert_eq!(config.valuation.wacc_max, 0.20);
        assert_eq!(config.dlq.stream, "biovalue:dlq");
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
engine:
  max_concurrent_activities: 4
llm:
  model: "small"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.engine.max_concurrent_activities, 4);
        assert_eq!(config.llm.model, "small");
        // Untouched sections keep their defaults
        assert_eq!(config.engine.max_concurrent_workflows, 10);
        assert_eq!(config.cache.clinical_secs, 43200);
    }

    #[test]
    fn test_retry_policy_conversion() {
        let retry = RetryConfig::default();
        let policy = retry.policy(3);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_interval, std::time::Duration::from_secs(5));
        assert_eq!(policy.max_interval, std::time::Duration::from_secs(60));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.engine.max_concurrent_activities = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.valuation.wacc_min = 0.5;
        assert!(config.validate().is_err());
    }
}
