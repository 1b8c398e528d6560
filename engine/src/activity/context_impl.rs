//! ActivityContextImpl - concrete implementation of ActivityContext

use crate::activity::context::ActivityContext;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Concrete implementation of ActivityContext.
///
/// Heartbeat timestamps are shared with the executor's watchdog through
/// atomics; the last progress message is retained for diagnostics.
pub struct ActivityContextImpl {
    activity_execution_id: Uuid,
    workflow_execution_id: Uuid,
    attempt: u32,
    last_heartbeat_millis: Arc<AtomicI64>,
    last_heartbeat_message: Mutex<String>,
    cancelled: Arc<AtomicBool>,
}

impl ActivityContextImpl {
    /// Create a new activity context for one attempt
    pub fn new(
        activity_execution_id: Uuid,
        workflow_execution_id: Uuid,
        attempt: u32,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            activity_execution_id,
            workflow_execution_id,
            attempt,
            last_heartbeat_millis: Arc::new(AtomicI64::new(now_millis())),
            last_heartbeat_message: Mutex::new(String::new()),
            cancelled,
        }
    }

    /// Shared heartbeat timestamp for the executor's watchdog
    pub fn heartbeat_stamp(&self) -> Arc<AtomicI64> {
        Arc::clone(&self.last_heartbeat_millis)
    }

    /// Last recorded progress message
    pub fn last_heartbeat_message(&self) -> String {
        self.last_heartbeat_message.lock().clone()
    }
}

impl ActivityContext for ActivityContextImpl {
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
        self.last_heartbeat_millis
            .store(now_millis(), Ordering::SeqCst);
        *self.last_heartbeat_message.lock() = message.to_string();
        tracing::trace!(
            activity_execution_id = %self.activity_execution_id,
            message,
            "Activity heartbeat"
        );
    }

    fn is_cancellation_requested(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_accessors() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let ctx = ActivityContextImpl::new(Uuid::new_v4(), Uuid::new_v4(), 2, cancelled.clone());

        assert_eq!(ctx.attempt(), 2);
        assert!(!ctx.is_cancellation_requested());

        cancelled.store(true, Ordering::SeqCst);
        assert!(ctx.is_cancellation_requested());
    }

    #[test]
    fn test_heartbeat_updates_stamp_and_message() {
        let ctx = ActivityContextImpl::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            1,
            Arc::new(AtomicBool::new(false)),
        );
        let stamp = ctx.heartbeat_stamp();
        let before = stamp.load(Ordering::SeqCst);

        ctx.record_heartbeat("Analyzing financial report...");

        assert!(stamp.load(Ordering::SeqCst) >= before);
        assert_eq!(ctx.last_heartbeat_message(), "Analyzing financial report...");
    }
}
