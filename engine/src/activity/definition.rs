//! ActivityDefinition trait

use crate::activity::context::ActivityContext;
use crate::error::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

/// Retry policy for activity execution
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts including the first
    pub max_attempts: u32,
    /// Initial backoff interval
    pub initial_interval: Duration,
    /// Backoff multiplier applied after each failed attempt
    pub backoff_coefficient: f64,
    /// Maximum backoff interval
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_secs(5),
            backoff_coefficient: 2.0,
            max_interval: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given attempt (attempt is 1-based; there is no
    /// backoff before the first attempt).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2) as i32;
        let backoff = self.initial_interval.as_secs_f64()
            * self.backoff_coefficient.powi(exponent);
        Duration::from_secs_f64(backoff.min(self.max_interval.as_secs_f64()))
    }
}

/// Definition of an activity with typed input and output.
///
/// Activities are the side-effectful units of work scheduled from
/// workflows: LLM calls, cache access, tool invocations. They run on the
/// worker pool with a start-to-close timeout, a heartbeat watchdog and the
/// retry policy declared here.
#[async_trait]
pub trait ActivityDefinition: Send + Sync {
    /// Input type for the activity
    type Input: Serialize + DeserializeOwned + Send;
    /// Output type for the activity
    type Output: Serialize + DeserializeOwned + Send;

    /// Unique identifier for this activity type
    fn kind(&self) -> &str;

    /// Execute the activity with the given input and context
    async fn execute(&self, input: Self::Input, ctx: &dyn ActivityContext)
        -> Result<Self::Output>;

    /// Human-readable name for the activity (defaults to kind)
    fn name(&self) -> &str {
        self.kind()
    }

    /// Optional description of the activity
    fn description(&self) -> Option<&str> {
        None
    }

    /// Start-to-close timeout (None = executor default)
    fn start_to_close_timeout(&self) -> Option<Duration> {
        None
    }

    /// Heartbeat timeout (None = no heartbeat watchdog)
    fn heartbeat_timeout(&self) -> Option<Duration> {
        None
    }

    /// Retry policy for this activity
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    /// Tags for categorizing the activity
    fn tags(&self) -> Vec<String> {
        vec![]
    }
}
