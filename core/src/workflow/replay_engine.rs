//! ReplayEngine - shared replay logic for workflow execution.
//!
//! The engine is created from the replay events of one execution. Events are
//! pre-filtered by type so that replay can match each context call to the
//! event recorded at the same per-type position:
//!
//! 1. Engine is created with the persisted history
//! 2. Events are pre-filtered by type for O(1) lookup
//! 3. Per-type sequence counters track replay progress
//! 4. Terminal events are looked up lazily when needed

use crate::workflow::event::{EventType, ReplayEvent};
use crate::workflow::execution::EventLookup;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Replay engine handling event pre-filtering, sequence management and
/// terminal event lookup for one workflow execution.
pub struct ReplayEngine {
    // Pre-filtered event lists by type
    activity_events: Vec<ReplayEvent>,
    timer_events: Vec<ReplayEvent>,
    child_workflow_events: Vec<ReplayEvent>,
    operation_events: Vec<ReplayEvent>,
    state_events: Vec<ReplayEvent>,
    signal_events: Vec<ReplayEvent>,
    signal_consumed_events: Vec<ReplayEvent>,

    // All events for terminal event lookup
    all_events: Vec<ReplayEvent>,

    // Per-type sequence counters
    next_activity_seq: AtomicU32,
    next_timer_seq: AtomicU32,
    next_child_workflow_seq: AtomicU32,
    next_operation_seq: AtomicU32,
    next_state_seq: AtomicU32,
    next_signal_seq: AtomicU32,
    next_signal_consumed_seq: AtomicU32,

    // Caches built from events
    operation_cache: HashMap<String, Value>,
    state: RwLock<HashMap<String, Value>>,
}

impl ReplayEngine {
    /// Create a new ReplayEngine from replay events.
    pub fn new(events: Vec<ReplayEvent>) -> Self {
        let activity_events =
            EventLookup::filter_events_by_type(&events, EventType::ActivityScheduled);
        let timer_events = EventLookup::filter_events_by_type(&events, EventType::TimerStarted);
        let child_workflow_events =
            EventLookup::filter_events_by_type(&events, EventType::ChildWorkflowInitiated);
        let operation_events =
            EventLookup::filter_events_by_type(&events, EventType::OperationCompleted);
        let state_events = EventLookup::filter_events_by_types(
            &events,
            &[EventType::StateSet, EventType::StateCleared],
        );
        let signal_events = EventLookup::filter_events_by_type(&events, EventType::SignalReceived);
        let signal_consumed_events =
            EventLookup::filter_events_by_type(&events, EventType::SignalConsumed);

        let operation_cache = crate::workflow::execution::build_operation_cache(&events);
        let state = crate::workflow::execution::build_initial_state(&events);

        Self {
            activity_events,
            timer_events,
            child_workflow_events,
            operation_events,
            state_events,
            signal_events,
            signal_consumed_events,
            all_events: events,
            next_activity_seq: AtomicU32::new(0),
            next_timer_seq: AtomicU32::new(0),
            next_child_workflow_seq: AtomicU32::new(0),
            next_operation_seq: AtomicU32::new(0),
            next_state_seq: AtomicU32::new(0),
            next_signal_seq: AtomicU32::new(0),
            next_signal_consumed_seq: AtomicU32::new(0),
            operation_cache,
            state: RwLock::new(state),
        }
    }

    // =========================================================================
    // Sequence Management
    // =========================================================================

    /// Get next activity sequence number and increment.
    pub fn next_activity_seq(&self) -> u32 {
        self.next_activity_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Get next timer sequence number and increment.
    pub fn next_timer_seq(&self) -> u32 {
        self.next_timer_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Get next child workflow sequence number and increment.
    pub fn next_child_workflow_seq(&self) -> u32 {
        self.next_child_workflow_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Get next operation sequence number and increment.
    pub fn next_operation_seq(&self) -> u32 {
        self.next_operation_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Get next state sequence number and increment.
    pub fn next_state_seq(&self) -> u32 {
        self.next_state_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Get next signal sequence number and increment.
    pub fn next_signal_seq(&self) -> u32 {
        self.next_signal_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Peek at the current signal sequence without incrementing.
    pub fn peek_signal_seq(&self) -> u32 {
        self.next_signal_seq.load(Ordering::SeqCst)
    }

    /// Get next signal-consumption sequence number and increment.
    pub fn next_signal_consumed_seq(&self) -> u32 {
        self.next_signal_consumed_seq.fetch_add(1, Ordering::SeqCst)
    }

    // =========================================================================
    // Event Lookup (for replay validation)
    // =========================================================================

    /// Get the activity event at the given sequence index (if replaying).
    pub fn get_activity_event(&self, seq: u32) -> Option<&ReplayEvent> {
        self.activity_events.get(seq as usize)
    }

    /// Get the timer event at the given sequence index (if replaying).
    pub fn get_timer_event(&self, seq: u32) -> Option<&ReplayEvent> {
        self.timer_events.get(seq as usize)
    }

    /// Get the child workflow event at the given sequence index (if replaying).
    pub fn get_child_workflow_event(&self, seq: u32) -> Option<&ReplayEvent> {
        self.child_workflow_events.get(seq as usize)
    }

    /// Get the operation event at the given sequence index (if replaying).
    pub fn get_operation_event(&self, seq: u32) -> Option<&ReplayEvent> {
        self.operation_events.get(seq as usize)
    }

    /// Get the state event at the given sequence index (if replaying).
    pub fn get_state_event(&self, seq: u32) -> Option<&ReplayEvent> {
        self.state_events.get(seq as usize)
    }

    /// Get the signal event at the given sequence index (if replaying).
    pub fn get_signal_event(&self, seq: u32) -> Option<&ReplayEvent> {
        self.signal_events.get(seq as usize)
    }

    /// Get the signal-consumption event at the given sequence index
    /// (if replaying).
    pub fn get_signal_consumed_event(&self, seq: u32) -> Option<&ReplayEvent> {
        self.signal_consumed_events.get(seq as usize)
    }

    /// Check if there are signals not yet consumed by the workflow.
    pub fn has_pending_signal(&self) -> bool {
        (self.peek_signal_seq() as usize) < self.signal_events.len()
    }

    /// Number of signals not yet consumed by the workflow.
    pub fn pending_signal_count(&self) -> usize {
        self.signal_events
            .len()
            .saturating_sub(self.peek_signal_seq() as usize)
    }

    // =========================================================================
    // Terminal Event Lookup
    // =========================================================================

    /// Find the terminal event for an activity by execution id.
    pub fn find_terminal_activity_event(
        &self,
        activity_execution_id: &str,
    ) -> Option<&ReplayEvent> {
        EventLookup::find_terminal_activity_event(&self.all_events, activity_execution_id)
    }

    /// Find the terminal event for a timer by id.
    pub fn find_terminal_timer_event(&self, timer_id: &str) -> Option<&ReplayEvent> {
        EventLookup::find_terminal_timer_event(&self.all_events, timer_id)
    }

    /// Find the terminal event for a child workflow by execution name.
    pub fn find_terminal_child_workflow_event(&self, name: &str) -> Option<&ReplayEvent> {
        EventLookup::find_terminal_child_workflow_event(&self.all_events, name)
    }

    // =========================================================================
    // State Management
    // =========================================================================

    /// Get a value from workflow state.
    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.state.read().get(key).cloned()
    }

    /// Set a value in workflow state.
    pub fn set_state(&self, key: &str, value: Value) {
        self.state.write().insert(key.to_string(), value);
    }

    /// Clear a specific key from workflow state.
    pub fn clear_state(&self, key: &str) {
        self.state.write().remove(key);
    }

    /// Get all keys in workflow state.
    pub fn state_keys(&self) -> Vec<String> {
        self.state.read().keys().cloned().collect()
    }

    // =========================================================================
    // Operation Cache
    // =========================================================================

    /// Get a cached operation result by name.
    pub fn get_cached_operation(&self, name: &str) -> Option<&Value> {
        self.operation_cache.get(name)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the number of activity events.
    pub fn activity_event_count(&self) -> usize {
        self.activity_events.len()
    }

    /// Get the number of timer events.
    pub fn timer_event_count(&self) -> usize {
        self.timer_events.len()
    }

    /// Get the number of child workflow events.
    pub fn child_workflow_event_count(&self) -> usize {
        self.child_workflow_events.len()
    }

    /// Get the number of operation events.
    pub fn operation_event_count(&self) -> usize {
        self.operation_events.len()
    }

    /// Get the number of signal events.
    pub fn signal_event_count(&self) -> usize {
        self.signal_events.len()
    }

    /// Get the total number of events.
    pub fn total_event_count(&self) -> usize {
        self.all_events.len()
    }
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
    fn test_new_filters_events_by_type() {
        let events = vec![
            ReplayEvent::new(1, EventType::ActivityScheduled, json!({"kind": "a"}), now()),
            ReplayEvent::new(2, EventType::TimerStarted, json!({"timerId": "t1"}), now()),
            ReplayEvent::new(3, EventType::ActivityScheduled, json!({"kind": "b"}), now()),
            ReplayEvent::new(
                4,
                EventType::SignalReceived,
                json!({"signalName": "human-intervention"}),
                now(),
            ),
            ReplayEvent::new(
                5,
                EventType::ChildWorkflowInitiated,
                json!({"childExecutionName": "child-1"}),
                now(),
            ),
        ];

        let engine = ReplayEngine::new(events);

        assert_eq!(engine.activity_event_count(), 2);
        assert_eq!(engine.timer_event_count(), 1);
        assert_eq!(engine.signal_event_count(), 1);
        assert_eq!(engine.child_workflow_event_count(), 1);
        assert_eq!(engine.total_event_count(), 5);
        assert_eq!(
            engine.get_activity_event(0).unwrap().get_string("kind"),
            Some("a")
        );
        assert_eq!(
            engine.get_activity_event(1).unwrap().get_string("kind"),
            Some("b")
        );
    }

    #[test]
    fn test_sequence_counters_independent() {
        let engine = ReplayEngine::new(vec![]);

        assert_eq!(engine.next_activity_seq(), 0);
        assert_eq!(engine.next_timer_seq(), 0);
        assert_eq!(engine.next_signal_seq(), 0);
        assert_eq!(engine.next_activity_seq(), 1);
        assert_eq!(engine.next_timer_seq(), 1);
    }

    #[test]
    fn test_sequence_counters_thread_safe() {
        use std::sync::Arc;
        use std::thread;

        let engine = Arc::new(ReplayEngine::new(vec![]));
        let mut handles = vec![];

        for _ in 0..10 {
            let e = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    e.next_activity_seq();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(engine.next_activity_seq(), 1000);
    }

    #[test]
    fn test_get_activity_event_beyond_count() {
        let events = vec![ReplayEvent::new(
            1,
            EventType::ActivityScheduled,
            json!({}),
            now(),
        )];

        let engine = ReplayEngine::new(events);

        assert!(engine.get_activity_event(0).is_some());
        assert!(engine.get_activity_event(1).is_none());
        assert!(engine.get_activity_event(100).is_none());
    }

    #[test]
    fn test_find_terminal_activity_event_latest_wins() {
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
                json!({"activityExecutionId": "act-1", "error": "first"}),
                now(),
            ),
            ReplayEvent::new(
                3,
                EventType::ActivityCompleted,
                json!({"activityExecutionId": "act-1", "result": 1}),
                now(),
            ),
        ];

        let engine = ReplayEngine::new(events);
        let terminal = engine.find_terminal_activity_event("act-1").unwrap();
        assert_eq!(terminal.event_type(), EventType::ActivityCompleted);
    }

    #[test]
    fn test_pending_signals() {
        let events = vec![
            ReplayEvent::new(
                1,
                EventType::SignalReceived,
                json!({"signalName": "human-intervention", "signalValue": {"type": "pause"}}),
                now(),
            ),
            ReplayEvent::new(
                2,
                EventType::SignalReceived,
                json!({"signalName": "human-intervention", "signalValue": {"type": "resume"}}),
                now(),
            ),
        ];

        let engine = ReplayEngine::new(events);

        assert!(engine.has_pending_signal());
        assert_eq!(engine.pending_signal_count(), 2);

        let seq = engine.next_signal_seq();
        assert_eq!(seq, 0);
        assert_eq!(engine.pending_signal_count(), 1);

        engine.next_signal_seq();
        assert!(!engine.has_pending_signal());
        assert_eq!(engine.pending_signal_count(), 0);

        // Consuming past the queue just keeps returning none
        let seq = engine.next_signal_seq();
        assert!(engine.get_signal_event(seq).is_none());
    }

    #[test]
    fn test_state_from_events() {
        let events = vec![
            ReplayEvent::new(
                1,
                EventType::StateSet,
                json!({"key": "progress", "value": {"totalSteps": 10}}),
                now(),
            ),
            ReplayEvent::new(2, EventType::StateCleared, json!({"key": "scratch"}), now()),
        ];

        let engine = ReplayEngine::new(events);
        assert_eq!(engine.get_state("progress"), Some(json!({"totalSteps": 10})));
        assert_eq!(engine.get_state("scratch"), None);

        engine.set_state("progress", json!({"totalSteps": 12}));
        assert_eq!(engine.get_state("progress"), Some(json!({"totalSteps": 12})));

        engine.clear_state("progress");
        assert_eq!(engine.get_state("progress"), None);
    }

    #[test]
    fn test_operation_cache_from_events() {
        let events = vec![ReplayEvent::new(
            1,
            EventType::OperationCompleted,
            json!({"operationName": "stamp-run", "result": "r-1"}),
            now(),
        )];

        let engine = ReplayEngine::new(events);
        assert_eq!(engine.get_cached_operation("stamp-run"), Some(&json!("r-1")));
        assert_eq!(engine.get_cached_operation("missing"), None);
    }

    #[test]
    fn test_replay_scenario_determinism() {
        let events = vec![
            ReplayEvent::new(1, EventType::ActivityScheduled, json!({"kind": "a"}), now()),
            ReplayEvent::new(2, EventType::ActivityScheduled, json!({"kind": "b"}), now()),
        ];

        let engine1 = ReplayEngine::new(events.clone());
        let engine2 = ReplayEngine::new(events);

        assert_eq!(engine1.next_activity_seq(), engine2.next_activity_seq());
        assert_eq!(
            engine1.get_activity_event(0).unwrap().get_string("kind"),
            engine2.get_activity_event(0).unwrap().get_string("kind")
        );
    }
}
