//! ActivityExecutor - supervised activity execution
//!
//! Runs a registered activity to a final result across retry attempts:
//! each attempt gets a start-to-close timeout and a heartbeat watchdog, and
//! failed attempts back off per the activity's retry policy. Non-retryable
//! errors short-circuit the attempt loop.

use crate::activity::context_impl::ActivityContextImpl;
use crate::activity::definition::RetryPolicy;
use crate::activity::registry::ActivityRegistry;
use crate::error::EngineError;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

/// Configuration for activity execution
#[derive(Debug, Clone)]
pub struct ActivityExecutorConfig {
    /// Default start-to-close timeout when an activity does not declare one
    pub default_timeout: Duration,
    /// Interval at which the heartbeat watchdog checks for staleness
    pub heartbeat_check_interval: Duration,
}

impl Default for ActivityExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(600),
            heartbeat_check_interval: Duration::from_secs(1),
        }
    }
}

/// Final result of activity execution (after all retries)
#[derive(Debug, Clone)]
pub enum ActivityExecutionResult {
    /// Activity completed successfully
    Completed { output: Value },
    /// Activity failed terminally
    Failed {
        error_message: String,
        attempts: u32,
        is_retryable: bool,
    },
    /// Activity was cancelled
    Cancelled,
}

/// Per-dispatch overrides carried on the schedule command
#[derive(Debug, Clone, Default)]
pub struct ActivityDispatchOptions {
    /// Start-to-close timeout override
    pub timeout: Option<Duration>,
    /// Heartbeat timeout override
    pub heartbeat_timeout: Option<Duration>,
    /// Max attempts override
    pub max_attempts: Option<u32>,
}

/// Activity executor that handles supervised execution with retries
pub struct ActivityExecutor {
    registry: Arc<ActivityRegistry>,
    config: ActivityExecutorConfig,
}

impl ActivityExecutor {
    /// Create a new ActivityExecutor
    pub fn new(registry: Arc<ActivityRegistry>, config: ActivityExecutorConfig) -> Self {
        Self { registry, config }
    }

    /// Execute an activity to a final result, retrying per its policy.
    pub async fn execute(
        &self,
        activity_execution_id: Uuid,
        workflow_execution_id: Uuid,
        kind: &str,
        input: Value,
        options: ActivityDispatchOptions,
        cancelled: Arc<AtomicBool>,
    ) -> ActivityExecutionResult {
        let registered = match self.registry.get(kind) {
            Some(r) => r,
            None => {
                return ActivityExecutionResult::Failed {
                    error_message: format!("Activity kind not found: {}", kind),
                    attempts: 0,
                    is_retryable: false,
                };
            }
        };

        let start_to_close = options
            .timeout
            .or(registered.metadata.start_to_close_timeout)
            .unwrap_or(self.config.default_timeout);
        let heartbeat_timeout = options
            .heartbeat_timeout
            .or(registered.metadata.heartbeat_timeout);
        let policy = {
            let mut p = registered.metadata.retry_policy.clone();
            if let Some(max_attempts) = options.max_attempts {
                p.max_attempts = max_attempts;
            }
            p
        };

        let mut attempt: u32 = 0;
        let mut last_error = String::new();

        while attempt < policy.max_attempts.max(1) {
            attempt += 1;

            if cancelled.load(Ordering::SeqCst) {
                return ActivityExecutionResult::Cancelled;
            }

            let backoff = policy.backoff_for_attempt(attempt);
            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }

            let ctx = Arc::new(ActivityContextImpl::new(
                activity_execution_id,
                workflow_execution_id,
                attempt,
                Arc::clone(&cancelled),
            ));
            let heartbeat_stamp = ctx.heartbeat_stamp();

            debug!(
                kind,
                %activity_execution_id,
                attempt,
                "Executing activity attempt"
            );

            let attempt_result = self
                .run_attempt(
                    &registered,
                    input.clone(),
                    ctx,
                    start_to_close,
                    heartbeat_timeout,
                    heartbeat_stamp,
                )
                .await;

            match attempt_result {
                Ok(output) => {
                    return ActivityExecutionResult::Completed { output };
                }
                Err(e) => {
                    if cancelled.load(Ordering::SeqCst) {
                        return ActivityExecutionResult::Cancelled;
                    }
                    let retryable = e.is_retryable();
                    last_error = e.to_string();
                    warn!(
                        kind,
                        %activity_execution_id,
                        attempt,
                        retryable,
                        error = %last_error,
                        "Activity attempt failed"
                    );
                    if !retryable {
                        return ActivityExecutionResult::Failed {
                            error_message: last_error,
                            attempts: attempt,
                            is_retryable: false,
                        };
                    }
                }
            }
        }

        ActivityExecutionResult::Failed {
            error_message: last_error,
            attempts: attempt,
            is_retryable: true,
        }
    }

    async fn run_attempt(
        &self,
        registered: &crate::activity::registry::RegisteredActivity,
        input: Value,
        ctx: Arc<ActivityContextImpl>,
        start_to_close: Duration,
        heartbeat_timeout: Option<Duration>,
        heartbeat_stamp: Arc<AtomicI64>,
    ) -> crate::error::Result<Value> {
        let execute = registered.execute(input, ctx);

        match heartbeat_timeout {
            Some(hb_timeout) => {
                let check_interval = self.config.heartbeat_check_interval.min(hb_timeout);
                let watchdog = Self::heartbeat_watchdog(heartbeat_stamp, hb_timeout, check_interval);
                tokio::select! {
                    result = timeout(start_to_close, execute) => match result {
                        Ok(r) => r,
                        Err(_) => Err(EngineError::Timeout(format!(
                            "Activity exceeded start-to-close timeout of {:?}",
                            start_to_close
                        ))),
                    },
                    _ = watchdog => Err(EngineError::HeartbeatMissed(format!(
                        "No heartbeat within {:?}",
                        hb_timeout
                    ))),
                }
            }
            None => match timeout(start_to_close, execute).await {
                Ok(r) => r,
                Err(_) => Err(EngineError::Timeout(format!(
                    "Activity exceeded start-to-close timeout of {:?}",
                    start_to_close
                ))),
            },
        }
    }

    /// Resolves when the heartbeat goes stale.
    async fn heartbeat_watchdog(
        heartbeat_stamp: Arc<AtomicI64>,
        heartbeat_timeout: Duration,
        check_interval: Duration,
    ) {
        loop {
            tokio::time::sleep(check_interval).await;
            let last = heartbeat_stamp.load(Ordering::SeqCst);
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);
            if now - last > heartbeat_timeout.as_millis() as i64 {
                return;
            }
        }
    }
}
