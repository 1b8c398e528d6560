//! Mock activity context for unit testing activities in isolation.

use crate::activity::context::ActivityContext;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Mock implementation of ActivityContext.
///
/// Records heartbeats so tests can assert that long activities report
/// liveness, and allows cancellation to be requested externally.
pub struct MockActivityContext {
    activity_execution_id: Uuid,
    workflow_execution_id: Uuid,
    attempt: u32,
    heartbeats: RwLock<Vec<String>>,
    cancelled: AtomicBool,
}

impl MockActivityContext {
    /// Create a mock context for attempt 1
    pub fn new() -> Self {
        Self::with_attempt(1)
    }

    /// Create a mock context for a specific attempt number
    pub fn with_attempt(attempt: u32) -> Self {
        Self {
            activity_execution_id: Uuid::new_v4(),
            workflow_execution_id: Uuid::new_v4(),
            attempt,
            heartbeats: RwLock::new(Vec::new()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// All heartbeat messages recorded so far
    pub fn heartbeats(&self) -> Vec<String> {
        self.heartbeats.read().clone()
    }

    /// Request cancellation
    pub fn request_cancellation(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl Default for MockActivityContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityContext for MockActivityContext {
    fn activity_execution_id(&self) -> Uuid {
        self.activity_execution_id
    }

    fn workflow_execution_id(&self) -> Uuid {
        self.workflow_execution_id
    }

    fn attempt(&self) -> u32 {
        self.attempt
    }

    fn record_heartbeat(&self, message: &str) {
        self.heartbeats.write().push(message.to_string());
    }

    fn is_cancellation_requested(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_heartbeats() {
        let ctx = MockActivityContext::new();
        ctx.record_heartbeat("Scanning drug pipelines...");
        ctx.record_heartbeat("Still scanning...");

        assert_eq!(
            ctx.heartbeats(),
            vec!["Scanning drug pipelines...", "Still scanning..."]
        );
    }

    #[test]
    fn test_cancellation() {
        let ctx = MockActivityContext::with_attempt(3);
        assert_eq!(ctx.attempt(), 3);
        assert!(!ctx.is_cancellation_requested());
        ctx.request_cancellation();
        assert!(ctx.is_cancellation_requested());
    }
}
