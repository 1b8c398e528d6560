//! WorkflowContext trait definition

use crate::error::Result;
use crate::workflow::future::{
    ActivityFutureRaw, ChildWorkflowFutureRaw, OperationFutureRaw, Signal, SignalFuture,
    TimerFuture,
};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

pub use biovalue_core::DeterministicRandom;

/// Options for scheduling an activity
#[derive(Debug, Clone, Default)]
pub struct ScheduleActivityOptions {
    /// Start-to-close timeout override
    pub start_to_close_timeout: Option<Duration>,
    /// Heartbeat timeout; a live activity must heartbeat at least this often
    pub heartbeat_timeout: Option<Duration>,
    /// Maximum attempts including the first
    pub max_attempts: Option<u32>,
}

/// Context for workflow execution providing deterministic APIs and side
/// effect management.
///
/// Workflow code must consult only this context for time, randomness and
/// side effects. Scheduling methods return futures immediately so that
/// multiple operations can run in parallel and be multiplexed with
/// [`join_all`](crate::workflow::combinators::join_all) and
/// [`select`](crate::workflow::combinators::select); awaiting a future whose
/// result is not yet in the history suspends the workflow.
///
/// This trait uses `Value` types for object-safety. For typed APIs, use the
/// extension methods provided by [`WorkflowContextExt`].
#[async_trait]
pub trait WorkflowContext: Send + Sync {
    // === Identifiers ===

    /// Get the unique id of this workflow execution
    fn workflow_execution_id(&self) -> Uuid;

    /// Get the run identifier used in deterministic child workflow names
    fn run_id(&self) -> String;

    /// Get the raw workflow input as JSON Value
    fn input_raw(&self) -> &Value;

    // === Deterministic APIs (recorded/replayed) ===

    /// Get the current time in milliseconds (deterministic - same on replay)
    fn current_time_millis(&self) -> i64;

    /// Generate a deterministic UUID (same on replay)
    fn random_uuid(&self) -> Uuid;

    /// Get a deterministic random number generator (same sequence on replay)
    fn random(&self) -> &dyn DeterministicRandom;

    // === Side Effects (cached via event sourcing) ===

    /// Record a side-effect result and cache it. On replay, returns the
    /// recorded result without re-executing.
    fn run_raw(&self, name: &str, result: Value) -> OperationFutureRaw;

    // === Activity Scheduling ===

    /// Schedule an activity and return a future for its completion
    fn schedule_activity_raw(&self, kind: &str, input: Value) -> ActivityFutureRaw;

    /// Schedule an activity with custom options
    fn schedule_activity_with_options_raw(
        &self,
        kind: &str,
        input: Value,
        options: ScheduleActivityOptions,
    ) -> ActivityFutureRaw;

    // === Child Workflows ===

    /// Start a child workflow under a deterministic execution name
    fn schedule_child_workflow_raw(
        &self,
        name: &str,
        kind: &str,
        input: Value,
    ) -> ChildWorkflowFutureRaw;

    // === Timers ===

    /// Start a durable timer (survives restarts)
    fn sleep(&self, duration: Duration) -> TimerFuture;

    // === Signals ===

    /// Wait for the next signal on the named channel. Suspends until one
    /// arrives. Consumption is recorded, so replay sees the same signal at
    /// the same point.
    fn wait_for_signal_raw(&self, signal_name: &str) -> SignalFuture;

    /// Consume the next pending signal on the named channel without
    /// suspending. Returns `None` when the inbox is empty. The outcome of
    /// every poll (including the empty ones) is recorded, so replay repeats
    /// the original answers regardless of when signals actually arrived.
    fn poll_signal(&self, signal_name: &str) -> Result<Option<Signal>>;

    // === State Management ===

    /// Get a value from workflow state
    async fn get_raw(&self, key: &str) -> Result<Option<Value>>;

    /// Set a value in workflow state
    async fn set_raw(&self, key: &str, value: Value) -> Result<()>;

    /// Clear a specific key from workflow state
    async fn clear(&self, key: &str) -> Result<()>;

    /// Get all keys in workflow state
    async fn state_keys(&self) -> Result<Vec<String>>;

    // === Cancellation ===

    /// Check if cancellation has been requested
    fn is_cancellation_requested(&self) -> bool;

    /// Check for cancellation and return an error if cancelled
    async fn check_cancellation(&self) -> Result<()>;
}

/// Extension trait for typed workflow context operations.
pub trait WorkflowContextExt: WorkflowContext {
    /// Get the workflow input as the specified type
    fn input<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.input_raw().clone())
            .map_err(crate::error::EngineError::Serialization)
    }

    /// Get a value from workflow state as the specified type
    fn get_typed<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<T>>> + Send
    where
        Self: Sync,
    {
        async move {
            match self.get_raw(key).await? {
                Some(v) => serde_json::from_value(v)
                    .map(Some)
                    .map_err(crate::error::EngineError::Serialization),
                None => Ok(None),
            }
        }
    }

    /// Set a value in workflow state
    fn set_typed<T: serde::Serialize + Send>(
        &self,
        key: &str,
        value: T,
    ) -> impl std::future::Future<Output = Result<()>> + Send
    where
        Self: Sync,
    {
        async move {
            let v =
                serde_json::to_value(value).map_err(crate::error::EngineError::Serialization)?;
            self.set_raw(key, v).await
        }
    }
}

impl<T: WorkflowContext + ?Sized> WorkflowContextExt for T {}
