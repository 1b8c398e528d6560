//! WorkflowContextImpl - concrete implementation of WorkflowContext
//!
//! Each context call either replays the event recorded at the same per-type
//! position or records a fresh command. Scheduling methods return futures
//! immediately so that the workflow can hold several outstanding operations
//! at once; the resolution of each future is decided here, at creation
//! time, from the replay engine's view of the history.

use crate::error::{DeterminismViolationError, EngineError, Result};
use crate::workflow::context::{ScheduleActivityOptions, WorkflowContext};
use crate::workflow::future::{
    ActivityFuture, ActivityFutureRaw, ChildWorkflowFuture, ChildWorkflowFutureRaw,
    OperationFuture, OperationFutureRaw, Signal, SignalFuture, TimerFuture,
};
use async_trait::async_trait;
use biovalue_core::workflow::command::WorkflowCommand;
use biovalue_core::{
    CommandRecorder, DeterministicRandom, EventType, ReplayEngine, ReplayEvent, SeededRandom,
};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU32, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Shared suspension cell that can be passed to futures.
///
/// Futures signal suspension through the cell instead of thread-local
/// storage, which would not be safe when multiple workflows execute
/// concurrently on the same thread.
#[derive(Clone)]
pub struct SuspensionCell(std::sync::Arc<parking_lot::Mutex<Option<String>>>);

impl SuspensionCell {
    /// Create a new suspension cell.
    pub fn new() -> Self {
        Self(std::sync::Arc::new(parking_lot::Mutex::new(None)))
    }

    /// Signal suspension with the given reason.
    pub fn signal(&self, reason: String) {
        tracing::trace!(reason = %reason, "Signalling suspension via cell");
        *self.0.lock() = Some(reason);
    }

    /// Take the suspension reason if set.
    pub fn take(&self) -> Option<String> {
        self.0.lock().take()
    }

    /// Clear any pending suspension reason.
    pub fn clear(&self) {
        *self.0.lock() = None;
    }
}

impl Default for SuspensionCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Concrete implementation of WorkflowContext
pub struct WorkflowContextImpl<R: CommandRecorder> {
    /// Unique workflow execution id
    workflow_execution_id: Uuid,

    /// Workflow input
    input: Value,

    /// Command recorder (validating during replay)
    recorder: RwLock<R>,

    /// Replay engine over the existing events
    replay_engine: ReplayEngine,

    /// Current absolute sequence number (1-indexed, continues past history)
    sequence_number: AtomicI32,

    /// Deterministic time (milliseconds since epoch)
    current_time: AtomicI64,

    /// UUID counter for deterministic UUID generation
    uuid_counter: AtomicI64,

    /// Seeded random number generator
    random: SeededRandom,

    /// Whether cancellation has been requested
    cancellation_requested: AtomicBool,

    /// Counter for deterministic sleep/timer id generation.
    /// Separate from sequence_number because sequence depends on the
    /// history length, which changes between executions.
    sleep_call_counter: AtomicI32,

    /// Position of the next unconsumed signal in the inbox
    /// (count of matched consumptions so far)
    inbox_cursor: AtomicU32,

    /// Shared suspension cell for this workflow execution
    suspension_cell: SuspensionCell,
}

impl<R: CommandRecorder> WorkflowContextImpl<R> {
    /// Create a new WorkflowContextImpl
    pub fn new(
        workflow_execution_id: Uuid,
        input: Value,
        recorder: R,
        existing_events: Vec<ReplayEvent>,
        start_time_millis: i64,
    ) -> Self {
        // Seed deterministic randomness from the execution id
        let seed = workflow_execution_id.as_u128() as u64;

        // Continue the absolute sequence past the recorded history
        let initial_sequence = (existing_events.len() as i32) + 1;

        let replay_engine = ReplayEngine::new(existing_events);

        Self {
            workflow_execution_id,
            input,
            recorder: RwLock::new(recorder),
            replay_engine,
            sequence_number: AtomicI32::new(initial_sequence),
            current_time: AtomicI64::new(start_time_millis),
            uuid_counter: AtomicI64::new(0),
            random: SeededRandom::new(seed),
            cancellation_requested: AtomicBool::new(false),
            sleep_call_counter: AtomicI32::new(0),
            inbox_cursor: AtomicU32::new(0),
            suspension_cell: SuspensionCell::new(),
        }
    }

    fn next_sequence(&self) -> i32 {
        self.sequence_number.fetch_add(1, Ordering::SeqCst)
    }

    fn record_command(&self, command: WorkflowCommand) -> Result<()> {
        let mut recorder = self.recorder.write();
        recorder
            .record_command(command)
            .map_err(EngineError::DeterminismViolation)
    }

    /// Request cancellation
    pub fn request_cancellation(&self) {
        self.cancellation_requested.store(true, Ordering::SeqCst);
    }

    /// Get all recorded commands
    pub fn get_commands(&self) -> Vec<WorkflowCommand> {
        self.recorder.read().get_commands()
    }

    /// Take all recorded commands (clears the recorder)
    pub fn take_commands(&self) -> Vec<WorkflowCommand> {
        self.recorder.write().take_commands()
    }

    /// Take the suspension reason if set.
    ///
    /// Called by the executor after polling a workflow future that returned
    /// `Pending`. Returns `Some(reason)` if the workflow is suspended.
    pub fn take_suspension(&self) -> Option<String> {
        self.suspension_cell.take()
    }

    /// Clear any pending suspension reason before polling.
    pub fn clear_suspension(&self) {
        self.suspension_cell.clear()
    }

    fn suspension_cell(&self) -> SuspensionCell {
        self.suspension_cell.clone()
    }

    /// Consume the next inbox signal if it matches `signal_name`.
    /// Returns the recorded payload value on a match.
    fn take_inbox_signal(&self, signal_name: &str) -> Option<Value> {
        let idx = self.inbox_cursor.load(Ordering::SeqCst);
        let event = self.replay_engine.get_signal_event(idx)?;
        if event.get_string("signalName") != Some(signal_name) {
            return None;
        }
        self.inbox_cursor.fetch_add(1, Ordering::SeqCst);
        Some(json!({
            "signalName": signal_name,
            "signalValue": event.get("signalValue").cloned().unwrap_or(Value::Null),
        }))
    }
}

#[async_trait]
impl<R: CommandRecorder + Send + Sync> WorkflowContext for WorkflowContextImpl<R> {
    fn workflow_execution_id(&self) -> Uuid {
        self.workflow_execution_id
    }

    fn run_id(&self) -> String {
        self.workflow_execution_id.to_string()
    }

    fn input_raw(&self) -> &Value {
        &self.input
    }

    fn current_time_millis(&self) -> i64 {
        self.current_time.load(Ordering::SeqCst)
    }

    fn random_uuid(&self) -> Uuid {
        // Deterministic UUID v5 derived from the execution id and a counter
        let counter = self.uuid_counter.fetch_add(1, Ordering::SeqCst);
        let name = format!("{}:{}", self.workflow_execution_id, counter);
        Uuid::new_v5(&self.workflow_execution_id, name.as_bytes())
    }

    fn random(&self) -> &dyn DeterministicRandom {
        &self.random
    }

    fn run_raw(&self, name: &str, result: Value) -> OperationFutureRaw {
        let op_seq = self.replay_engine.next_operation_seq();

        // Replay case: return the recorded result without re-recording
        if let Some(operation_event) = self.replay_engine.get_operation_event(op_seq) {
            let event_op_name = operation_event
                .get_string("operationName")
                .unwrap_or_default()
                .to_string();

            if event_op_name != name {
                return OperationFuture::new(
                    op_seq,
                    name.to_string(),
                    Err(EngineError::DeterminismViolation(
                        DeterminismViolationError::OperationNameMismatch {
                            sequence: op_seq as i32,
                            expected: event_op_name,
                            actual: name.to_string(),
                        },
                    )),
                );
            }

            let cached = operation_event
                .get("result")
                .cloned()
                .unwrap_or(Value::Null);
            return OperationFuture::new(op_seq, name.to_string(), Ok(cached));
        }

        // New operation: record the freshly computed result
        let sequence = self.next_sequence();
        if let Err(e) = self.record_command(WorkflowCommand::RecordOperation {
            sequence_number: sequence,
            operation_name: name.to_string(),
            result: result.clone(),
        }) {
            return OperationFuture::new(op_seq, name.to_string(), Err(e));
        }

        OperationFuture::new(op_seq, name.to_string(), Ok(result))
    }

    fn schedule_activity_raw(&self, kind: &str, input: Value) -> ActivityFutureRaw {
        self.schedule_activity_with_options_raw(kind, input, ScheduleActivityOptions::default())
    }

    fn schedule_activity_with_options_raw(
        &self,
        kind: &str,
        input: Value,
        options: ScheduleActivityOptions,
    ) -> ActivityFutureRaw {
        let activity_seq = self.replay_engine.next_activity_seq();

        // Always generate an id to keep the uuid counter synchronized
        // across replay, even when the recorded id wins below.
        let generated_id = self.random_uuid();

        // Replay case
        if let Some(scheduled_event) = self.replay_engine.get_activity_event(activity_seq) {
            let event_kind = scheduled_event
                .get_string("kind")
                .unwrap_or_default()
                .to_string();

            if event_kind != kind {
                return ActivityFuture::with_error(EngineError::DeterminismViolation(
                    DeterminismViolationError::ActivityKindMismatch {
                        sequence: activity_seq as i32,
                        expected: event_kind,
                        actual: kind.to_string(),
                    },
                ));
            }

            let activity_execution_id = scheduled_event
                .get_string("activityExecutionId")
                .and_then(|s| Uuid::parse_str(s).ok())
                .unwrap_or(Uuid::nil());

            if let Some(terminal) = self
                .replay_engine
                .find_terminal_activity_event(&activity_execution_id.to_string())
            {
                let result = match terminal.event_type() {
                    EventType::ActivityCompleted => Ok(terminal
                        .get("result")
                        .cloned()
                        .unwrap_or(Value::Null)),
                    EventType::ActivityCancelled => Err(EngineError::ActivityCancelled),
                    _ => Err(EngineError::ActivityFailed(
                        terminal
                            .get_string("error")
                            .unwrap_or("Activity failed")
                            .to_string(),
                    )),
                };
                return ActivityFuture::from_replay(
                    activity_seq,
                    activity_execution_id,
                    self.suspension_cell(),
                    result,
                );
            }

            // Scheduled but not finished - awaiting it will suspend
            return ActivityFuture::pending(
                activity_seq,
                activity_execution_id,
                self.suspension_cell(),
            );
        }

        // New command
        let activity_execution_id = generated_id;
        let sequence = self.next_sequence();
        if let Err(e) = self.record_command(WorkflowCommand::ScheduleActivity {
            sequence_number: sequence,
            kind: kind.to_string(),
            activity_execution_id,
            input,
            timeout_ms: options
                .start_to_close_timeout
                .map(|d| d.as_millis() as i64),
            heartbeat_timeout_ms: options.heartbeat_timeout.map(|d| d.as_millis() as i64),
            max_attempts: options.max_attempts,
        }) {
            return ActivityFuture::with_error(e);
        }

        ActivityFuture::pending(activity_seq, activity_execution_id, self.suspension_cell())
    }

    fn schedule_child_workflow_raw(
        &self,
        name: &str,
        kind: &str,
        input: Value,
    ) -> ChildWorkflowFutureRaw {
        let cw_seq = self.replay_engine.next_child_workflow_seq();
        let generated_id = self.random_uuid();

        // Replay case
        if let Some(initiated_event) = self.replay_engine.get_child_workflow_event(cw_seq) {
            let event_name = initiated_event
                .get_string("childExecutionName")
                .unwrap_or_default()
                .to_string();

            if event_name != name {
                return ChildWorkflowFuture::with_error(EngineError::DeterminismViolation(
                    DeterminismViolationError::ChildWorkflowMismatch {
                        sequence: cw_seq as i32,
                        field: "name".to_string(),
                        expected: event_name,
                        actual: name.to_string(),
                    },
                ));
            }

            let event_kind = initiated_event
                .get_string("childWorkflowKind")
                .unwrap_or_default()
                .to_string();

            if !event_kind.is_empty() && event_kind != kind {
                return ChildWorkflowFuture::with_error(EngineError::DeterminismViolation(
                    DeterminismViolationError::ChildWorkflowMismatch {
                        sequence: cw_seq as i32,
                        field: "kind".to_string(),
                        expected: event_kind,
                        actual: kind.to_string(),
                    },
                ));
            }

            let child_execution_id = initiated_event
                .get_string("childExecutionId")
                .and_then(|s| Uuid::parse_str(s).ok())
                .unwrap_or(Uuid::nil());

            if let Some(terminal) = self
                .replay_engine
                .find_terminal_child_workflow_event(&event_name)
            {
                let result = match terminal.event_type() {
                    EventType::ChildWorkflowCompleted => Ok(terminal
                        .get("output")
                        .cloned()
                        .unwrap_or(Value::Null)),
                    _ => Err(EngineError::ChildWorkflowFailed {
                        execution_id: child_execution_id.to_string(),
                        name: name.to_string(),
                        error: terminal
                            .get_string("error")
                            .unwrap_or("Child workflow failed")
                            .to_string(),
                    }),
                };
                return ChildWorkflowFuture::from_replay(
                    cw_seq,
                    child_execution_id,
                    event_name,
                    self.suspension_cell(),
                    result,
                );
            }

            return ChildWorkflowFuture::pending(
                cw_seq,
                child_execution_id,
                event_name,
                self.suspension_cell(),
            );
        }

        // New command
        let child_execution_id = generated_id;
        let sequence = self.next_sequence();
        if let Err(e) = self.record_command(WorkflowCommand::ScheduleChildWorkflow {
            sequence_number: sequence,
            name: name.to_string(),
            kind: kind.to_string(),
            child_execution_id,
            input,
        }) {
            return ChildWorkflowFuture::with_error(e);
        }

        ChildWorkflowFuture::pending(
            cw_seq,
            child_execution_id,
            name.to_string(),
            self.suspension_cell(),
        )
    }

    fn sleep(&self, duration: Duration) -> TimerFuture {
        let timer_seq = self.replay_engine.next_timer_seq();

        // Deterministic timer id from a dedicated counter
        let sleep_count = self.sleep_call_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let timer_id = format!("sleep-{}", sleep_count);
        let duration_ms = duration.as_millis() as i64;

        // Replay case
        if let Some(started_event) = self.replay_engine.get_timer_event(timer_seq) {
            let event_timer_id = started_event
                .get_string("timerId")
                .unwrap_or_default()
                .to_string();

            if event_timer_id != timer_id {
                return TimerFuture::with_error(EngineError::DeterminismViolation(
                    DeterminismViolationError::TimerIdMismatch {
                        sequence: timer_seq as i32,
                        expected: event_timer_id,
                        actual: timer_id,
                    },
                ));
            }

            if let Some(terminal) = self.replay_engine.find_terminal_timer_event(&event_timer_id)
            {
                let fired = terminal.event_type() == EventType::TimerFired;
                return TimerFuture::from_replay(
                    timer_seq,
                    event_timer_id,
                    self.suspension_cell(),
                    fired,
                );
            }

            return TimerFuture::pending(timer_seq, event_timer_id, self.suspension_cell());
        }

        // New command
        let sequence = self.next_sequence();
        if let Err(e) = self.record_command(WorkflowCommand::StartTimer {
            sequence_number: sequence,
            timer_id: timer_id.clone(),
            duration_ms,
        }) {
            return TimerFuture::with_error(e);
        }

        TimerFuture::pending(timer_seq, timer_id, self.suspension_cell())
    }

    fn wait_for_signal_raw(&self, signal_name: &str) -> SignalFuture {
        let consume_seq = self.replay_engine.next_signal_consumed_seq();

        // Replay case: the consumption at this position was recorded
        if let Some(event) = self.replay_engine.get_signal_consumed_event(consume_seq) {
            let recorded_name = event.get_string("signalName").unwrap_or_default();
            let matched = event.get("matched").and_then(|v| v.as_bool()).unwrap_or(false);

            if recorded_name != signal_name || !matched {
                // A wait replaying over a poll's consumption slot means the
                // consumption order diverged
                return SignalFuture::with_error(EngineError::DeterminismViolation(
                    DeterminismViolationError::OperationNameMismatch {
                        sequence: consume_seq as i32,
                        expected: format!("{}(matched={})", recorded_name, matched),
                        actual: format!("{}(wait)", signal_name),
                    },
                ));
            }

            self.inbox_cursor.fetch_add(1, Ordering::SeqCst);
            let payload = json!({
                "signalName": signal_name,
                "signalValue": event.get("signalValue").cloned().unwrap_or(Value::Null),
            });
            return SignalFuture::ready(self.suspension_cell(), signal_name.to_string(), Ok(payload));
        }

        // Live edge: consume from the inbox if a matching signal is queued
        if let Some(payload) = self.take_inbox_signal(signal_name) {
            let sequence = self.next_sequence();
            if let Err(e) = self.record_command(WorkflowCommand::ConsumeSignal {
                sequence_number: sequence,
                signal_name: signal_name.to_string(),
                matched: true,
                value: payload
                    .get("signalValue")
                    .cloned()
                    .unwrap_or(Value::Null),
            }) {
                return SignalFuture::with_error(e);
            }
            return SignalFuture::ready(self.suspension_cell(), signal_name.to_string(), Ok(payload));
        }

        // No signal yet: suspend. Nothing is recorded, so the same call
        // replays into the same consumption slot after resume.
        SignalFuture::pending(self.suspension_cell(), signal_name.to_string())
    }

    fn poll_signal(&self, signal_name: &str) -> Result<Option<Signal>> {
        let consume_seq = self.replay_engine.next_signal_consumed_seq();

        // Replay case
        if let Some(event) = self.replay_engine.get_signal_consumed_event(consume_seq) {
            let recorded_name = event.get_string("signalName").unwrap_or_default();
            if recorded_name != signal_name {
                return Err(EngineError::DeterminismViolation(
                    DeterminismViolationError::OperationNameMismatch {
                        sequence: consume_seq as i32,
                        expected: recorded_name.to_string(),
                        actual: signal_name.to_string(),
                    },
                ));
            }

            let matched = event.get("matched").and_then(|v| v.as_bool()).unwrap_or(false);
            if !matched {
                return Ok(None);
            }

            self.inbox_cursor.fetch_add(1, Ordering::SeqCst);
            return Ok(Some(Signal::new(
                signal_name.to_string(),
                event.get("signalValue").cloned().unwrap_or(Value::Null),
            )));
        }

        // Live edge: record the outcome of this poll, including misses
        let payload = self.take_inbox_signal(signal_name);
        let sequence = self.next_sequence();
        self.record_command(WorkflowCommand::ConsumeSignal {
            sequence_number: sequence,
            signal_name: signal_name.to_string(),
            matched: payload.is_some(),
            value: payload
                .as_ref()
                .and_then(|p| p.get("signalValue").cloned())
                .unwrap_or(Value::Null),
        })?;

        Ok(payload.map(|p| {
            Signal::new(
                signal_name.to_string(),
                p.get("signalValue").cloned().unwrap_or(Value::Null),
            )
        }))
    }

    async fn get_raw(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.replay_engine.get_state(key))
    }

    async fn set_raw(&self, key: &str, value: Value) -> Result<()> {
        let state_seq = self.replay_engine.next_state_seq();

        // Replay case
        if let Some(state_event) = self.replay_engine.get_state_event(state_seq) {
            if state_event.event_type() != EventType::StateSet {
                return Err(EngineError::DeterminismViolation(
                    DeterminismViolationError::TypeMismatch {
                        sequence: state_seq as i32,
                        expected: EventType::StateSet,
                        actual: state_event.event_type(),
                    },
                ));
            }

            let event_key = state_event.get_string("key").unwrap_or_default();
            if event_key != key {
                return Err(EngineError::DeterminismViolation(
                    DeterminismViolationError::StateKeyMismatch {
                        sequence: state_seq as i32,
                        expected: event_key.to_string(),
                        actual: key.to_string(),
                    },
                ));
            }

            self.replay_engine.set_state(key, value);
            return Ok(());
        }

        // New command
        let sequence = self.next_sequence();
        self.record_command(WorkflowCommand::SetState {
            sequence_number: sequence,
            key: key.to_string(),
            value: value.clone(),
        })?;

        self.replay_engine.set_state(key, value);
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let state_seq = self.replay_engine.next_state_seq();

        // Replay case
        if let Some(state_event) = self.replay_engine.get_state_event(state_seq) {
            if state_event.event_type() != EventType::StateCleared {
                return Err(EngineError::DeterminismViolation(
                    DeterminismViolationError::TypeMismatch {
                        sequence: state_seq as i32,
                        expected: EventType::StateCleared,
                        actual: state_event.event_type(),
                    },
                ));
            }

            let event_key = state_event.get_string("key").unwrap_or_default();
            if event_key != key {
                return Err(EngineError::DeterminismViolation(
                    DeterminismViolationError::StateKeyMismatch {
                        sequence: state_seq as i32,
                        expected: event_key.to_string(),
                        actual: key.to_string(),
                    },
                ));
            }

            self.replay_engine.clear_state(key);
            return Ok(());
        }

        // New command
        let sequence = self.next_sequence();
        self.record_command(WorkflowCommand::ClearState {
            sequence_number: sequence,
            key: key.to_string(),
        })?;

        self.replay_engine.clear_state(key);
        Ok(())
    }

    async fn state_keys(&self) -> Result<Vec<String>> {
        Ok(self.replay_engine.state_keys())
    }

    fn is_cancellation_requested(&self) -> bool {
        self.cancellation_requested.load(Ordering::SeqCst)
    }

    async fn check_cancellation(&self) -> Result<()> {
        if self.is_cancellation_requested() {
            Err(EngineError::WorkflowCancelled(
                "Cancellation requested".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biovalue_core::CommandCollector;
    use chrono::Utc;
    use std::future::Future;

    fn fresh_ctx() -> WorkflowContextImpl<CommandCollector> {
        WorkflowContextImpl::new(
            Uuid::new_v4(),
            json!({"ticker": "BGNE"}),
            CommandCollector::new(),
            vec![],
            1_700_000_000_000,
        )
    }

    fn event(seq: i32, event_type: EventType, data: Value) -> ReplayEvent {
        ReplayEvent::new(seq, event_type, data, Utc::now())
    }

    #[tokio::test]
    async fn test_fresh_schedule_records_command_and_suspends() {
        let ctx = fresh_ctx();
        let mut future = ctx.schedule_activity_raw("financial-auditor", json!({"ticker": "BGNE"}));

        let waker = futures::task::noop_waker();
        let mut cx = std::task::Context::from_waker(&waker);
        assert!(matches!(
            std::pin::Pin::new(&mut future).poll(&mut cx),
            std::task::Poll::Pending
        ));
        assert!(ctx.take_suspension().is_some());

        let commands = ctx.get_commands();
        assert_eq!(commands.len(), 1);
        assert!(matches!(
            commands[0],
            WorkflowCommand::ScheduleActivity { .. }
        ));
    }

    #[tokio::test]
    async fn test_replay_completed_activity() {
        let id = Uuid::new_v4();
        let events = vec![
            event(
                1,
                EventType::ActivityScheduled,
                json!({"kind": "financial-auditor", "activityExecutionId": id.to_string()}),
            ),
            event(
                2,
                EventType::ActivityCompleted,
                json!({"activityExecutionId": id.to_string(), "result": {"healthScore": 72}}),
            ),
        ];
        let ctx = WorkflowContextImpl::new(
            Uuid::new_v4(),
            json!({}),
            CommandCollector::new(),
            events,
            0,
        );

        let result = ctx
            .schedule_activity_raw("financial-auditor", json!({}))
            .await
            .unwrap();
        assert_eq!(result, json!({"healthScore": 72}));
        // Replayed calls do not record new commands
        assert!(ctx.get_commands().is_empty());
    }

    #[tokio::test]
    async fn test_replay_kind_mismatch_is_violation() {
        let events = vec![event(
            1,
            EventType::ActivityScheduled,
            json!({"kind": "financial-auditor", "activityExecutionId": Uuid::nil().to_string()}),
        )];
        let ctx = WorkflowContextImpl::new(
            Uuid::new_v4(),
            json!({}),
            CommandCollector::new(),
            events,
            0,
        );

        let err = ctx
            .schedule_activity_raw("pipeline-scout", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DeterminismViolation(_)));
    }

    #[tokio::test]
    async fn test_run_raw_records_then_replays() {
        let wf_id = Uuid::new_v4();
        let ctx = WorkflowContextImpl::new(
            wf_id,
            json!({}),
            CommandCollector::new(),
            vec![],
            0,
        );
        let value = ctx.run_raw("stamp-run", json!("r-1")).await.unwrap();
        assert_eq!(value, json!("r-1"));

        // Second execution replays the recorded value even if the caller
        // computes something different
        let events = vec![event(
            1,
            EventType::OperationCompleted,
            json!({"operationName": "stamp-run", "result": "r-1"}),
        )];
        let ctx = WorkflowContextImpl::new(wf_id, json!({}), CommandCollector::new(), events, 0);
        let value = ctx.run_raw("stamp-run", json!("r-2")).await.unwrap();
        assert_eq!(value, json!("r-1"));
    }

    #[tokio::test]
    async fn test_state_set_and_get() {
        let ctx = fresh_ctx();
        ctx.set_raw("progress", json!({"totalSteps": 4})).await.unwrap();
        assert_eq!(
            ctx.get_raw("progress").await.unwrap(),
            Some(json!({"totalSteps": 4}))
        );
        ctx.clear("progress").await.unwrap();
        assert_eq!(ctx.get_raw("progress").await.unwrap(), None);
        assert_eq!(ctx.get_commands().len(), 2);
    }

    #[tokio::test]
    async fn test_poll_signal_records_miss_and_match() {
        // Miss on an empty inbox
        let ctx = fresh_ctx();
        assert!(ctx.poll_signal("human-intervention").unwrap().is_none());
        let commands = ctx.get_commands();
        assert_eq!(commands.len(), 1);
        assert!(matches!(
            commands[0],
            WorkflowCommand::ConsumeSignal { matched: false, .. }
        ));

        // Match when a signal is queued in the inbox
        let events = vec![event(
            1,
            EventType::SignalReceived,
            json!({"signalName": "human-intervention", "signalValue": {"type": "pause"}}),
        )];
        let ctx = WorkflowContextImpl::new(
            Uuid::new_v4(),
            json!({}),
            CommandCollector::new(),
            events,
            0,
        );
        let signal = ctx.poll_signal("human-intervention").unwrap().unwrap();
        assert_eq!(signal.value, json!({"type": "pause"}));
        // A second poll finds the inbox drained
        assert!(ctx.poll_signal("human-intervention").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_poll_signal_replays_recorded_outcomes() {
        // History: one recorded miss, then a recorded match. The inbox
        // signal arrived before the replay but the first poll must still
        // see the miss it saw originally.
        let events = vec![
            event(
                1,
                EventType::SignalConsumed,
                json!({"signalName": "human-intervention", "matched": false, "signalValue": null}),
            ),
            event(
                2,
                EventType::SignalReceived,
                json!({"signalName": "human-intervention", "signalValue": {"type": "pause"}}),
            ),
            event(
                3,
                EventType::SignalConsumed,
                json!({"signalName": "human-intervention", "matched": true, "signalValue": {"type": "pause"}}),
            ),
        ];
        let ctx = WorkflowContextImpl::new(
            Uuid::new_v4(),
            json!({}),
            CommandCollector::new(),
            events,
            0,
        );

        assert!(ctx.poll_signal("human-intervention").unwrap().is_none());
        let signal = ctx.poll_signal("human-intervention").unwrap().unwrap();
        assert_eq!(signal.value, json!({"type": "pause"}));
        assert!(ctx.get_commands().is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_signal_consumes_queued_signal() {
        let events = vec![event(
            1,
            EventType::SignalReceived,
            json!({"signalName": "human-intervention", "signalValue": {"type": "resume"}}),
        )];
        let ctx = WorkflowContextImpl::new(
            Uuid::new_v4(),
            json!({}),
            CommandCollector::new(),
            events,
            0,
        );

        let signal = ctx.wait_for_signal_raw("human-intervention").await.unwrap();
        assert_eq!(signal.name, "human-intervention");
        assert_eq!(signal.value, json!({"type": "resume"}));

        let commands = ctx.get_commands();
        assert_eq!(commands.len(), 1);
        assert!(matches!(
            commands[0],
            WorkflowCommand::ConsumeSignal { matched: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_wait_for_signal_suspends_on_empty_inbox() {
        let ctx = fresh_ctx();
        let mut future = ctx.wait_for_signal_raw("human-intervention");

        let waker = futures::task::noop_waker();
        let mut cx = std::task::Context::from_waker(&waker);
        assert!(matches!(
            std::pin::Pin::new(&mut future).poll(&mut cx),
            std::task::Poll::Pending
        ));
        assert!(ctx.take_suspension().unwrap().contains("human-intervention"));
        // Suspended waits record nothing
        assert!(ctx.get_commands().is_empty());
    }

    #[test]
    fn test_random_uuid_deterministic_per_execution() {
        let wf_id = Uuid::new_v4();
        let ctx1 = WorkflowContextImpl::new(
            wf_id,
            json!({}),
            CommandCollector::new(),
            vec![],
            0,
        );
        let ctx2 = WorkflowContextImpl::new(
            wf_id,
            json!({}),
            CommandCollector::new(),
            vec![],
            0,
        );

        assert_eq!(ctx1.random_uuid(), ctx2.random_uuid());
        assert_eq!(ctx1.random_uuid(), ctx2.random_uuid());
        assert_ne!(ctx1.random_uuid(), ctx1.random_uuid());
    }

    #[tokio::test]
    async fn test_child_workflow_replay() {
        let child_id = Uuid::new_v4();
        let events = vec![
            event(
                1,
                EventType::ChildWorkflowInitiated,
                json!({
                    "childExecutionName": "valuation-BGNE",
                    "childWorkflowKind": "valuation",
                    "childExecutionId": child_id.to_string()
                }),
            ),
            event(
                2,
                EventType::ChildWorkflowCompleted,
                json!({"childExecutionName": "valuation-BGNE", "output": {"wacc": 0.11}}),
            ),
        ];
        let ctx = WorkflowContextImpl::new(
            Uuid::new_v4(),
            json!({}),
            CommandCollector::new(),
            events,
            0,
        );

        let output = ctx
            .schedule_child_workflow_raw("valuation-BGNE", "valuation", json!({}))
            .await
            .unwrap();
        assert_eq!(output, json!({"wacc": 0.11}));
    }
}
