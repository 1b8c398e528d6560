//! ActivityContext trait definition

use uuid::Uuid;

/// Context available to an executing activity.
///
/// Long-running activities must call [`record_heartbeat`] at least every
/// heartbeat interval or the executor considers the attempt stuck and
/// retries it.
///
/// [`record_heartbeat`]: ActivityContext::record_heartbeat
pub trait ActivityContext: Send + Sync {
    /// Get the unique id of this activity execution
    fn activity_execution_id(&self) -> Uuid;

    /// Get the id of the workflow execution that scheduled this activity
    fn workflow_execution_id(&self) -> Uuid;

    /// Get the current attempt number (1-based)
    fn attempt(&self) -> u32;

    /// Record a liveness heartbeat with a progress message
    fn record_heartbeat(&self, message: &str);

    /// Check whether cancellation has been requested for this activity
    fn is_cancellation_requested(&self) -> bool;
}
