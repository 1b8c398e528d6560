//! Workflow execution utilities shared between replay and live execution

use crate::workflow::event::{EventType, ReplayEvent};
use parking_lot::RwLock;

/// Trait for deterministic random number generation.
///
/// Workflows must use deterministic random to ensure replay consistency.
/// All random values are derived from a seed (typically the workflow
/// execution id).
pub trait DeterministicRandom: Send + Sync {
    /// Generate a random integer in the range [min, max)
    fn next_int(&self, min: i32, max: i32) -> i32;

    /// Generate a random long in the range [min, max)
    fn next_long(&self, min: i64, max: i64) -> i64;

    /// Generate a random double in the range [0, 1)
    fn next_double(&self) -> f64;

    /// Generate a random boolean
    fn next_bool(&self) -> bool;
}

/// Seeded deterministic random number generator using xorshift64.
///
/// Produces identical sequences across replays when initialized with the
/// same seed.
pub struct SeededRandom {
    state: RwLock<u64>,
}

impl SeededRandom {
    /// Create a new seeded random with the given seed
    pub fn new(seed: u64) -> Self {
        Self {
            state: RwLock::new(seed.max(1)),
        }
    }

    fn next_u64(&self) -> u64 {
        let mut state = self.state.write();
        let mut x = *state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        *state = x;
        x
    }
}

impl DeterministicRandom for SeededRandom {
    fn next_int(&self, min: i32, max: i32) -> i32 {
        if min >= max {
            return min;
        }
        let range = (max - min) as u64;
        min + (self.next_u64() % range) as i32
    }

    fn next_long(&self, min: i64, max: i64) -> i64 {
        if min >= max {
            return min;
        }
        let range = (max - min) as u64;
        min + (self.next_u64() % range) as i64
    }

    fn next_double(&self) -> f64 {
        (self.next_u64() as f64) / (u64::MAX as f64)
    }

    fn next_bool(&self) -> bool {
        self.next_u64() % 2 == 0
    }
}

/// Utilities for finding events in replay history.
pub struct EventLookup;

impl EventLookup {
    /// Find the terminal event (ActivityCompleted, ActivityFailed or
    /// ActivityCancelled) for an activity by execution id. Returns the
    /// latest terminal event if multiple exist (retries).
    pub fn find_terminal_activity_event<'a>(
        events: &'a [ReplayEvent],
        activity_execution_id: &str,
    ) -> Option<&'a ReplayEvent> {
        events
            .iter()
            .filter(|e| {
                e.get_string("activityExecutionId")
                    .map(|id| id == activity_execution_id)
                    .unwrap_or(false)
                    && e.event_type().is_activity_terminal()
            })
            .max_by_key(|e| e.sequence_number())
    }

    /// Find the terminal event for a child workflow by execution name.
    pub fn find_terminal_child_workflow_event<'a>(
        events: &'a [ReplayEvent],
        name: &str,
    ) -> Option<&'a ReplayEvent> {
        events
            .iter()
            .filter(|e| {
                e.get_string("childExecutionName")
                    .map(|n| n == name)
                    .unwrap_or(false)
                    && e.event_type().is_child_workflow_terminal()
            })
            .max_by_key(|e| e.sequence_number())
    }

    /// Find the terminal event (TimerFired or TimerCancelled) for a timer.
    pub fn find_terminal_timer_event<'a>(
        events: &'a [ReplayEvent],
        timer_id: &str,
    ) -> Option<&'a ReplayEvent> {
        events
            .iter()
            .filter(|e| {
                e.get_string("timerId")
                    .map(|id| id == timer_id)
                    .unwrap_or(false)
                    && (e.event_type() == EventType::TimerFired
                        || e.event_type() == EventType::TimerCancelled)
            })
            .max_by_key(|e| e.sequence_number())
    }

    /// Filter events by type.
    pub fn filter_events_by_type(
        events: &[ReplayEvent],
        event_type: EventType,
    ) -> Vec<ReplayEvent> {
        events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }

    /// Filter events matching multiple types (e.g. StateSet or StateCleared).
    pub fn filter_events_by_types(
        events: &[ReplayEvent],
        event_types: &[EventType],
    ) -> Vec<ReplayEvent> {
        events
            .iter()
            .filter(|e| event_types.contains(&e.event_type()))
            .cloned()
            .collect()
    }
}

/// Pre-populated operation cache from existing events.
///
/// During replay, operation results are cached to avoid re-execution.
pub fn build_operation_cache(
    events: &[ReplayEvent],
) -> std::collections::HashMap<String, serde_json::Value> {
    let mut cache = std::collections::HashMap::new();
    for event in events {
        if event.event_type() == EventType::OperationCompleted {
            if let Some(name) = event.get_string("operationName") {
                if let Some(result) = event.get("result") {
                    cache.insert(name.to_string(), result.clone());
                }
            }
        }
    }
    cache
}

/// Build initial workflow state from existing events.
///
/// State is reconstructed by folding StateSet/StateCleared events in order.
pub fn build_initial_state(
    events: &[ReplayEvent],
) -> std::collections::HashMap<String, serde_json::Value> {
    let mut state = std::collections::HashMap::new();
    for event in events {
        match event.event_type() {
            EventType::StateSet => {
                if let Some(key) = event.get_string("key") {
                    if let Some(value) = event.get("value") {
                        state.insert(key.to_string(), value.clone());
                    }
                }
            }
            EventType::StateCleared => {
                if let Some(key) = event.get_string("key") {
                    state.remove(key);
                }
            }
            _ => {}
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn now() -> chrono::DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_seeded_random_deterministic() {
        let r1 = SeededRandom::new(12345);
        let r2 = SeededRandom::new(12345);

        assert_eq!(r1.next_int(0, 100), r2.next_int(0, 100));
        assert_eq!(r1.next_long(0, 1000), r2.next_long(0, 1000));
        assert_eq!(r1.next_double(), r2.next_double());
        assert_eq!(r1.next_bool(), r2.next_bool());
    }

    #[test]
    fn test_seeded_random_range() {
        let r = SeededRandom::new(42);
        for _ in 0..100 {
            let v = r.next_int(10, 20);
            assert!((10..20).contains(&v));
        }
        for _ in 0..100 {
            let v = r.next_double();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn test_seeded_random_degenerate_range() {
        let r = SeededRandom::new(1);
        assert_eq!(r.next_int(5, 5), 5);
        assert_eq!(r.next_int(10, 5), 10);
        assert_eq!(r.next_long(200, 100), 200);
    }

    #[test]
    fn test_find_terminal_activity_event() {
        let events = vec![
            ReplayEvent::new(
                1,
                EventType::ActivityScheduled,
                json!({"activityExecutionId": "act-1"}),
                now(),
            ),
            ReplayEvent::new(
                2,
                EventType::ActivityFailed,
                json!({"activityExecutionId": "act-1", "error": "timeout"}),
                now(),
            ),
            ReplayEvent::new(
                3,
                EventType::ActivityCompleted,
                json!({"activityExecutionId": "act-1", "result": "retry succeeded"}),
                now(),
            ),
        ];

        // Latest terminal event wins (retry then success)
        let terminal = EventLookup::find_terminal_activity_event(&events, "act-1").unwrap();
        assert_eq!(terminal.event_type(), EventType::ActivityCompleted);

        assert!(EventLookup::find_terminal_activity_event(&events, "act-2").is_none());
    }

    #[test]
    fn test_find_terminal_child_workflow_event() {
        let events = vec![
            ReplayEvent::new(
                1,
                EventType::ChildWorkflowInitiated,
                json!({"childExecutionName": "valuation-BGNE"}),
                now(),
            ),
            ReplayEvent::new(
                2,
                EventType::ChildWorkflowFailed,
                json!({"childExecutionName": "valuation-BGNE", "error": "config invalid"}),
                now(),
            ),
        ];

        let terminal =
            EventLookup::find_terminal_child_workflow_event(&events, "valuation-BGNE").unwrap();
        assert_eq!(terminal.event_type(), EventType::ChildWorkflowFailed);
    }

    #[test]
    fn test_find_terminal_timer_event() {
        let events = vec![
            ReplayEvent::new(1, EventType::TimerStarted, json!({"timerId": "t1"}), now()),
            ReplayEvent::new(2, EventType::TimerFired, json!({"timerId": "t1"}), now()),
        ];

        let terminal = EventLookup::find_terminal_timer_event(&events, "t1").unwrap();
        assert_eq!(terminal.event_type(), EventType::TimerFired);
    }

    #[test]
    fn test_filter_events_by_type() {
        let events = vec![
            ReplayEvent::new(1, EventType::ActivityScheduled, json!({}), now()),
            ReplayEvent::new(2, EventType::OperationCompleted, json!({}), now()),
            ReplayEvent::new(3, EventType::ActivityScheduled, json!({}), now()),
        ];

        let activities = EventLookup::filter_events_by_type(&events, EventType::ActivityScheduled);
        assert_eq!(activities.len(), 2);
    }

    #[test]
    fn test_build_operation_cache() {
        let events = vec![
            ReplayEvent::new(
                1,
                EventType::OperationCompleted,
                json!({"operationName": "stamp-run", "result": {"runId": "r-1"}}),
                now(),
            ),
            ReplayEvent::new(2, EventType::ActivityScheduled, json!({}), now()),
        ];

        let cache = build_operation_cache(&events);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("stamp-run"), Some(&json!({"runId": "r-1"})));
    }

    #[test]
    fn test_build_initial_state() {
        let events = vec![
            ReplayEvent::new(
                1,
                EventType::StateSet,
                json!({"key": "count", "value": 1}),
                now(),
            ),
            ReplayEvent::new(
                2,
                EventType::StateSet,
                json!({"key": "name", "value": "test"}),
                now(),
            ),
            ReplayEvent::new(3, EventType::StateCleared, json!({"key": "count"}), now()),
            ReplayEvent::new(
                4,
                EventType::StateSet,
                json!({"key": "count", "value": 5}),
                now(),
            ),
        ];

        let state = build_initial_state(&events);
        assert_eq!(state.len(), 2);
        assert_eq!(state.get("count"), Some(&json!(5)));
        assert_eq!(state.get("name"), Some(&json!("test")));
    }
}
