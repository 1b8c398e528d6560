//! Virtual time controller for deterministic tests

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Controls a virtual clock and the timers registered against it.
///
/// Tests advance time explicitly; timers whose deadline falls inside the
/// advanced window are reported as fired.
pub struct TimeController {
    current_time_millis: AtomicI64,
    pending_timers: RwLock<HashMap<String, i64>>,
}

impl TimeController {
    /// Create a controller starting at time zero
    pub fn new() -> Self {
        Self::with_initial_time(0)
    }

    /// Create a controller starting at the given epoch milliseconds
    pub fn with_initial_time(initial_time_millis: i64) -> Self {
        Self {
            current_time_millis: AtomicI64::new(initial_time_millis),
            pending_timers: RwLock::new(HashMap::new()),
        }
    }

    /// Current virtual time in epoch milliseconds
    pub fn current_time_millis(&self) -> i64 {
        self.current_time_millis.load(Ordering::SeqCst)
    }

    /// Register a timer to fire after `delay` from now
    pub fn register_timer_after(&self, timer_id: &str, delay: Duration) {
        let deadline = self.current_time_millis() + delay.as_millis() as i64;
        self.pending_timers
            .write()
            .insert(timer_id.to_string(), deadline);
    }

    /// Ids of timers that have not fired yet
    pub fn pending_timer_ids(&self) -> Vec<String> {
        self.pending_timers.read().keys().cloned().collect()
    }

    /// Advance the clock, returning the ids of timers that fired
    pub fn advance(&self, duration: Duration) -> Vec<String> {
        let now = self
            .current_time_millis
            .fetch_add(duration.as_millis() as i64, Ordering::SeqCst)
            + duration.as_millis() as i64;

        let mut fired = Vec::new();
        let mut timers = self.pending_timers.write();
        timers.retain(|id, deadline| {
            if *deadline <= now {
                fired.push(id.clone());
                false
            } else {
                true
            }
        });
        fired.sort();
        fired
    }

    /// Fire every pending timer regardless of deadline
    pub fn skip_all_timers(&self) -> Vec<String> {
        let mut timers = self.pending_timers.write();
        let mut fired: Vec<String> = timers.keys().cloned().collect();
        timers.clear();
        fired.sort();
        fired
    }
}

impl Default for TimeController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_time() {
        let controller = TimeController::with_initial_time(1000);
        assert_eq!(controller.current_time_millis(), 1000);
    }

    #[test]
    fn test_advance_fires_due_timers() {
        let controller = TimeController::with_initial_time(0);
        controller.register_timer_after("t1", Duration::from_secs(5));
        controller.register_timer_after("t2", Duration::from_secs(20));

        let fired = controller.advance(Duration::from_secs(10));
        assert_eq!(fired, vec!["t1".to_string()]);
        assert_eq!(controller.pending_timer_ids(), vec!["t2".to_string()]);
        assert_eq!(controller.current_time_millis(), 10_000);
    }

    #[test]
    fn test_skip_all_timers() {
        let controller = TimeController::new();
        controller.register_timer_after("t1", Duration::from_secs(60));
        controller.register_timer_after("t2", Duration::from_secs(120));

        let fired = controller.skip_all_timers();
        assert_eq!(fired.len(), 2);
        assert!(controller.pending_timer_ids().is_empty());
    }
}
