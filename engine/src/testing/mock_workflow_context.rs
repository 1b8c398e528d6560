//! Mock workflow context for unit testing workflows in isolation.

use crate::error::{EngineError, Result};
use crate::workflow::context::{
    DeterministicRandom, ScheduleActivityOptions, WorkflowContext,
};
use crate::workflow::context_impl::SuspensionCell;
use crate::workflow::future::{
    ActivityFuture, ActivityFutureRaw, ChildWorkflowFuture, ChildWorkflowFutureRaw,
    OperationFuture, OperationFutureRaw, Signal, SignalFuture, TimerFuture,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::TimeController;

/// Mock implementation of WorkflowContext for testing workflows in
/// isolation.
///
/// ```ignore
/// let ctx = MockWorkflowContext::builder()
///     .input(json!({"ticker": "BGNE"}))
///     .activity_result("financial-auditor", json!({...}))
///     .build();
///
/// let result = MyWorkflow.execute(&ctx, input).await;
/// assert!(ctx.was_activity_scheduled("financial-auditor"));
/// ```
pub struct MockWorkflowContext {
    inner: Arc<MockWorkflowContextInner>,
}

struct MockWorkflowContextInner {
    workflow_execution_id: Uuid,
    input: Value,
    time_controller: TimeController,
    state: RwLock<HashMap<String, Value>>,
    activity_results: RwLock<HashMap<String, Result<Value>>>,
    child_workflow_results: RwLock<HashMap<String, Result<Value>>>,
    named_child_workflow_results: RwLock<HashMap<String, Result<Value>>>,
    signal_queues: RwLock<HashMap<String, VecDeque<Value>>>,
    recorded_operations: RwLock<Vec<RecordedOperation>>,
    scheduled_activities: RwLock<Vec<ScheduledActivity>>,
    scheduled_workflows: RwLock<Vec<ScheduledChildWorkflow>>,
    cancellation_requested: AtomicBool,
    uuid_counter: AtomicU64,
    rng: RwLock<ChaCha8Rng>,
    activity_seq: AtomicU32,
    child_workflow_seq: AtomicU32,
    timer_seq: AtomicU32,
    operation_seq: AtomicU32,
    suspension_cell: SuspensionCell,
}

impl Clone for MockWorkflowContext {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// A recorded side-effect operation
#[derive(Debug, Clone)]
pub struct RecordedOperation {
    pub name: String,
    pub result: Value,
}

/// A scheduled activity
#[derive(Debug, Clone)]
pub struct ScheduledActivity {
    pub kind: String,
    pub input: Value,
    pub options: ScheduleActivityOptions,
}

/// A scheduled child workflow
#[derive(Debug, Clone)]
pub struct ScheduledChildWorkflow {
    pub name: String,
    pub kind: String,
    pub input: Value,
}

impl MockWorkflowContext {
    /// Create a new builder for MockWorkflowContext.
    pub fn builder() -> MockWorkflowContextBuilder {
        MockWorkflowContextBuilder::default()
    }

    /// Create a simple mock context with default values.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Get the time controller for this context.
    pub fn time_controller(&self) -> &TimeController {
        &self.inner.time_controller
    }

    /// Get all recorded operations.
    pub fn recorded_operations(&self) -> Vec<RecordedOperation> {
        self.inner.recorded_operations.read().clone()
    }

    /// Check if a specific operation was recorded.
    pub fn was_operation_recorded(&self, name: &str) -> bool {
        self.inner
            .recorded_operations
            .read()
            .iter()
            .any(|op| op.name == name)
    }

    /// Get all scheduled activities.
    pub fn scheduled_activities(&self) -> Vec<ScheduledActivity> {
        self.inner.scheduled_activities.read().clone()
    }

    /// Check if a specific activity kind was scheduled.
    pub fn was_activity_scheduled(&self, kind: &str) -> bool {
        self.inner
            .scheduled_activities
            .read()
            .iter()
            .any(|a| a.kind == kind)
    }

    /// Number of times a specific activity kind was scheduled.
    pub fn activity_schedule_count(&self, kind: &str) -> usize {
        self.inner
            .scheduled_activities
            .read()
            .iter()
            .filter(|a| a.kind == kind)
            .count()
    }

    /// Get all scheduled child workflows.
    pub fn scheduled_workflows(&self) -> Vec<ScheduledChildWorkflow> {
        self.inner.scheduled_workflows.read().clone()
    }

    /// Check if a specific child workflow kind was scheduled.
    pub fn was_workflow_scheduled(&self, kind: &str) -> bool {
        self.inner
            .scheduled_workflows
            .read()
            .iter()
            .any(|w| w.kind == kind)
    }

    /// Request cancellation.
    pub fn request_cancellation(&self) {
        self.inner
            .cancellation_requested
            .store(true, Ordering::SeqCst);
    }

    /// Set an activity result after construction.
    pub fn set_activity_result(&self, kind: &str, result: Value) {
        self.inner
            .activity_results
            .write()
            .insert(kind.to_string(), Ok(result));
    }

    /// Queue a signal for consumption.
    pub fn push_signal(&self, name: &str, value: Value) {
        self.inner
            .signal_queues
            .write()
            .entry(name.to_string())
            .or_default()
            .push_back(value);
    }

    /// Get the current state snapshot.
    pub fn state_snapshot(&self) -> HashMap<String, Value> {
        self.inner.state.read().clone()
    }

    fn clone_result(result: &Result<Value>) -> Result<Value> {
        match result {
            Ok(v) => Ok(v.clone()),
            Err(e) => Err(EngineError::ActivityFailed(e.to_string())),
        }
    }
}

impl Default for MockWorkflowContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for MockWorkflowContext.
#[derive(Default)]
pub struct MockWorkflowContextBuilder {
    workflow_execution_id: Option<Uuid>,
    input: Option<Value>,
    initial_time_millis: Option<i64>,
    initial_state: HashMap<String, Value>,
    activity_results: HashMap<String, Result<Value>>,
    child_workflow_results: HashMap<String, Result<Value>>,
    named_child_workflow_results: HashMap<String, Result<Value>>,
    signals: Vec<(String, Value)>,
    rng_seed: Option<u64>,
}

impl MockWorkflowContextBuilder {
    /// Set the workflow execution id.
    pub fn workflow_execution_id(mut self, id: Uuid) -> Self {
        self.workflow_execution_id = Some(id);
        self
    }

    /// Set the workflow input.
    pub fn input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    /// Set the initial time in milliseconds.
    pub fn initial_time_millis(mut self, time: i64) -> Self {
        self.initial_time_millis = Some(time);
        self
    }

    /// Set an initial state value.
    pub fn state(mut self, key: &str, value: Value) -> Self {
        self.initial_state.insert(key.to_string(), value);
        self
    }

    /// Set an expected activity result.
    pub fn activity_result(mut self, kind: &str, result: Value) -> Self {
        self.activity_results.insert(kind.to_string(), Ok(result));
        self
    }

    /// Make an activity fail with the given error message.
    pub fn activity_failure(mut self, kind: &str, error: &str) -> Self {
        self.activity_results.insert(
            kind.to_string(),
            Err(EngineError::ActivityFailed(error.to_string())),
        );
        self
    }

    /// Set an expected child workflow result (keyed by kind).
    pub fn child_workflow_result(mut self, kind: &str, result: Value) -> Self {
        self.child_workflow_results
            .insert(kind.to_string(), Ok(result));
        self
    }

    /// Make a child workflow fail with the given error message.
    pub fn child_workflow_failure(mut self, kind: &str, error: &str) -> Self {
        self.child_workflow_results.insert(
            kind.to_string(),
            Err(EngineError::ChildWorkflowFailed {
                execution_id: Uuid::nil().to_string(),
                name: kind.to_string(),
                error: error.to_string(),
            }),
        );
        self
    }

    /// Set an expected child workflow result for one execution name.
    /// Named results take precedence over kind-level ones.
    pub fn child_workflow_result_named(mut self, name: &str, result: Value) -> Self {
        self.named_child_workflow_results
            .insert(name.to_string(), Ok(result));
        self
    }

    /// Make one named child workflow execution fail.
    pub fn child_workflow_failure_named(mut self, name: &str, error: &str) -> Self {
        self.named_child_workflow_results.insert(
            name.to_string(),
            Err(EngineError::ChildWorkflowFailed {
                execution_id: Uuid::nil().to_string(),
                name: name.to_string(),
                error: error.to_string(),
            }),
        );
        self
    }

    /// Queue a signal for consumption.
    pub fn signal(mut self, name: &str, value: Value) -> Self {
        self.signals.push((name.to_string(), value));
        self
    }

    /// Set the RNG seed for deterministic random generation.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Build the MockWorkflowContext.
    pub fn build(self) -> MockWorkflowContext {
        let time_controller = match self.initial_time_millis {
            Some(time) => TimeController::with_initial_time(time),
            None => TimeController::new(),
        };

        let mut signal_queues: HashMap<String, VecDeque<Value>> = HashMap::new();
        for (name, value) in self.signals {
            signal_queues.entry(name).or_default().push_back(value);
        }

        MockWorkflowContext {
            inner: Arc::new(MockWorkflowContextInner {
                workflow_execution_id: self.workflow_execution_id.unwrap_or_else(Uuid::new_v4),
                input: self.input.unwrap_or(Value::Null),
                time_controller,
                state: RwLock::new(self.initial_state),
                activity_results: RwLock::new(self.activity_results),
                child_workflow_results: RwLock::new(self.child_workflow_results),
                named_child_workflow_results: RwLock::new(self.named_child_workflow_results),
                signal_queues: RwLock::new(signal_queues),
                recorded_operations: RwLock::new(Vec::new()),
                scheduled_activities: RwLock::new(Vec::new()),
                scheduled_workflows: RwLock::new(Vec::new()),
                cancellation_requested: AtomicBool::new(false),
                uuid_counter: AtomicU64::new(0),
                rng: RwLock::new(ChaCha8Rng::seed_from_u64(self.rng_seed.unwrap_or(12345))),
                activity_seq: AtomicU32::new(0),
                child_workflow_seq: AtomicU32::new(0),
                timer_seq: AtomicU32::new(0),
                operation_seq: AtomicU32::new(0),
                suspension_cell: SuspensionCell::new(),
            }),
        }
    }
}

impl DeterministicRandom for MockWorkflowContext {
    fn next_int(&self, min: i32, max: i32) -> i32 {
        if min >= max {
            return min;
        }
        self.inner.rng.write().gen_range(min..max)
    }

    fn next_long(&self, min: i64, max: i64) -> i64 {
        if min >= max {
            return min;
        }
        self.inner.rng.write().gen_range(min..max)
    }

    fn next_double(&self) -> f64 {
        self.inner.rng.write().gen()
    }

    fn next_bool(&self) -> bool {
        self.inner.rng.write().gen()
    }
}

#[async_trait]
impl WorkflowContext for MockWorkflowContext {
    fn workflow_execution_id(&self) -> Uuid {
        self.inner.workflow_execution_id
    }

    fn run_id(&self) -> String {
        self.inner.workflow_execution_id.to_string()
    }

    fn input_raw(&self) -> &Value {
        &self.inner.input
    }

    fn current_time_millis(&self) -> i64 {
        self.inner.time_controller.current_time_millis()
    }

    fn random_uuid(&self) -> Uuid {
        let counter = self.inner.uuid_counter.fetch_add(1, Ordering::SeqCst);
        let name = format!("{}:{}", self.inner.workflow_execution_id, counter);
        Uuid::new_v5(&self.inner.workflow_execution_id, name.as_bytes())
    }

    fn random(&self) -> &dyn DeterministicRandom {
        self
    }

    fn run_raw(&self, name: &str, result: Value) -> OperationFutureRaw {
        let op_seq = self.inner.operation_seq.fetch_add(1, Ordering::SeqCst);
        self.inner
            .recorded_operations
            .write()
            .push(RecordedOperation {
                name: name.to_string(),
                result: result.clone(),
            });
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
        let activity_seq = self.inner.activity_seq.fetch_add(1, Ordering::SeqCst);
        let activity_execution_id = self.random_uuid();

        self.inner
            .scheduled_activities
            .write()
            .push(ScheduledActivity {
                kind: kind.to_string(),
                input,
                options,
            });

        match self.inner.activity_results.read().get(kind) {
            Some(result) => ActivityFuture::from_replay(
                activity_seq,
                activity_execution_id,
                self.inner.suspension_cell.clone(),
                MockWorkflowContext::clone_result(result),
            ),
            None => ActivityFuture::with_error(EngineError::ActivityFailed(format!(
                "No mock result configured for activity kind: {}",
                kind
            ))),
        }
    }

    fn schedule_child_workflow_raw(
        &self,
        name: &str,
        kind: &str,
        input: Value,
    ) -> ChildWorkflowFutureRaw {
        let cw_seq = self.inner.child_workflow_seq.fetch_add(1, Ordering::SeqCst);
        let child_execution_id = self.random_uuid();

        self.inner
            .scheduled_workflows
            .write()
            .push(ScheduledChildWorkflow {
                name: name.to_string(),
                kind: kind.to_string(),
                input,
            });

        let named = self.inner.named_child_workflow_results.read();
        let by_kind = self.inner.child_workflow_results.read();
        match named.get(name).or_else(|| by_kind.get(kind)) {
            Some(result) => ChildWorkflowFuture::from_replay(
                cw_seq,
                child_execution_id,
                name.to_string(),
                self.inner.suspension_cell.clone(),
                MockWorkflowContext::clone_result(result),
            ),
            None => ChildWorkflowFuture::with_error(EngineError::ChildWorkflowFailed {
                execution_id: child_execution_id.to_string(),
                name: name.to_string(),
                error: format!("No mock result configured for child workflow kind: {}", kind),
            }),
        }
    }

    fn sleep(&self, duration: Duration) -> TimerFuture {
        let timer_seq = self.inner.timer_seq.fetch_add(1, Ordering::SeqCst);
        let timer_id = format!("sleep-{}", timer_seq + 1);
        self.inner
            .time_controller
            .register_timer_after(&timer_id, duration);

        // Mock timers fire immediately
        TimerFuture::from_replay(timer_seq, timer_id, self.inner.suspension_cell.clone(), true)
    }

    fn wait_for_signal_raw(&self, signal_name: &str) -> SignalFuture {
        match self
            .inner
            .signal_queues
            .write()
            .get_mut(signal_name)
            .and_then(|q| q.pop_front())
        {
            Some(value) => SignalFuture::ready(
                self.inner.suspension_cell.clone(),
                signal_name.to_string(),
                Ok(json!({"signalName": signal_name, "signalValue": value})),
            ),
            None => {
                SignalFuture::pending(self.inner.suspension_cell.clone(), signal_name.to_string())
            }
        }
    }

    fn poll_signal(&self, signal_name: &str) -> Result<Option<Signal>> {
        Ok(self
            .inner
            .signal_queues
            .write()
            .get_mut(signal_name)
            .and_then(|q| q.pop_front())
            .map(|value| Signal::new(signal_name.to_string(), value)))
    }

    async fn get_raw(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.inner.state.read().get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: Value) -> Result<()> {
        self.inner.state.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.inner.state.write().remove(key);
        Ok(())
    }

    async fn state_keys(&self) -> Result<Vec<String>> {
        Ok(self.inner.state.read().keys().cloned().collect())
    }

    fn is_cancellation_requested(&self) -> bool {
        self.inner.cancellation_requested.load(Ordering::SeqCst)
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

    #[tokio::test]
    async fn test_activity_result_lookup() {
        let ctx = MockWorkflowContext::builder()
            .activity_result("financial-auditor", json!({"healthScore": 72}))
            .build();

        let result = ctx
            .schedule_activity_raw("financial-auditor", json!({"ticker": "BGNE"}))
            .await
            .unwrap();
        assert_eq!(result, json!({"healthScore": 72}));
        assert!(ctx.was_activity_scheduled("financial-auditor"));
        assert_eq!(ctx.activity_schedule_count("financial-auditor"), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_activity_fails() {
        let ctx = MockWorkflowContext::new();
        let result = ctx.schedule_activity_raw("unknown", json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_activity_failure_configured() {
        let ctx = MockWorkflowContext::builder()
            .activity_failure("clinical-assessor", "LLM_UNAVAILABLE: provider down")
            .build();

        let err = ctx
            .schedule_activity_raw("clinical-assessor", json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("LLM_UNAVAILABLE"));
    }

    #[tokio::test]
    async fn test_child_workflow_result() {
        let ctx = MockWorkflowContext::builder()
            .child_workflow_result("valuation", json!({"wacc": 0.11}))
            .build();

        let result = ctx
            .schedule_child_workflow_raw("valuation-BGNE", "valuation", json!({}))
            .await
            .unwrap();
        assert_eq!(result, json!({"wacc": 0.11}));
        assert!(ctx.was_workflow_scheduled("valuation"));
    }

    #[tokio::test]
    async fn test_signal_queue_fifo() {
        let ctx = MockWorkflowContext::builder()
            .signal("human-intervention", json!({"type": "pause"}))
            .signal("human-intervention", json!({"type": "resume"}))
            .build();

        let first = ctx.poll_signal("human-intervention").unwrap().unwrap();
        assert_eq!(first.value, json!({"type": "pause"}));

        let second = ctx.wait_for_signal_raw("human-intervention").await.unwrap();
        assert_eq!(second.value, json!({"type": "resume"}));

        assert!(ctx.poll_signal("human-intervention").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_raw_records_operation() {
        let ctx = MockWorkflowContext::new();
        let value = ctx.run_raw("stamp-run", json!("r-1")).await.unwrap();
        assert_eq!(value, json!("r-1"));
        assert!(ctx.was_operation_recorded("stamp-run"));
    }

    #[tokio::test]
    async fn test_state_roundtrip() {
        let ctx = MockWorkflowContext::builder()
            .state("seed", json!(1))
            .build();

        assert_eq!(ctx.get_raw("seed").await.unwrap(), Some(json!(1)));
        ctx.set_raw("progress", json!({"steps": 2})).await.unwrap();
        let snapshot = ctx.state_snapshot();
        assert!(snapshot.contains_key("progress"));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let ctx = MockWorkflowContext::new();
        assert!(ctx.check_cancellation().await.is_ok());
        ctx.request_cancellation();
        assert!(ctx.check_cancellation().await.is_err());
    }

    #[test]
    fn test_deterministic_uuid_sequence() {
        let id = Uuid::new_v4();
        let ctx1 = MockWorkflowContext::builder().workflow_execution_id(id).build();
        let ctx2 = MockWorkflowContext::builder().workflow_execution_id(id).build();
        assert_eq!(ctx1.random_uuid(), ctx2.random_uuid());
    }

    #[test]
    fn test_seeded_random() {
        let ctx1 = MockWorkflowContext::builder().rng_seed(7).build();
        let ctx2 = MockWorkflowContext::builder().rng_seed(7).build();
        assert_eq!(ctx1.random().next_int(0, 100), ctx2.random().next_int(0, 100));
    }
}
