//! Workflow future types for parallel execution
//!
//! Each operation type (activity, timer, child workflow, signal, operation)
//! has a corresponding future. Scheduling records the command immediately
//! and returns the future; awaiting a future whose result is not yet in the
//! history signals suspension through the context's suspension cell and
//! returns `Pending`. This lets a workflow schedule several operations and
//! multiplex them with the combinators while preserving determinism during
//! replay.

use crate::error::{EngineError, Result};
use crate::workflow::context_impl::SuspensionCell;
use crate::workflow::outcome::WorkflowOutcome;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use uuid::Uuid;

/// Trait for workflow futures that can be cancelled.
///
/// Workflow futures represent operations that may execute externally; this
/// trait provides a consistent interface for cancellation. Cancelling marks
/// the future; the operation may still complete before the cancellation is
/// observed.
pub trait CancellableFuture: Future {
    /// Cancel this operation.
    fn cancel(&self);

    /// Check if this future has been cancelled.
    fn is_cancelled(&self) -> bool;
}

/// Internal trait for workflow futures that return `WorkflowOutcome`.
pub(crate) trait WorkflowFuturePoll {
    type Output;

    fn poll_outcome(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<WorkflowOutcome<Self::Output>>;
}

/// State shared between the future and the context for completion tracking
#[derive(Debug)]
pub(crate) struct FutureState {
    /// Whether the future has been cancelled
    pub cancelled: AtomicBool,
    /// Pre-computed error (e.g. determinism violation detected at creation)
    pub error: parking_lot::Mutex<Option<EngineError>>,
    /// Pre-computed result (replay cases where the result is already known)
    pub result: parking_lot::Mutex<Option<Result<Value>>>,
}

impl FutureState {
    pub fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            error: parking_lot::Mutex::new(None),
            result: parking_lot::Mutex::new(None),
        }
    }

    pub fn with_error(error: EngineError) -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            error: parking_lot::Mutex::new(Some(error)),
            result: parking_lot::Mutex::new(None),
        }
    }

    pub fn with_result(result: Result<Value>) -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            error: parking_lot::Mutex::new(None),
            result: parking_lot::Mutex::new(Some(result)),
        }
    }
}

impl Default for FutureState {
    fn default() -> Self {
        Self::new()
    }
}

fn poll_shared_state<T: DeserializeOwned>(
    state: &FutureState,
    pending_reason: impl FnOnce() -> String,
) -> Poll<WorkflowOutcome<T>> {
    // Pre-computed error (e.g. determinism violation)
    if let Some(error) = state.error.lock().take() {
        if let EngineError::DeterminismViolation(violation) = error {
            return Poll::Ready(WorkflowOutcome::DeterminismViolation(violation));
        }
        return Poll::Ready(WorkflowOutcome::err(error));
    }

    // Pre-computed result (replay case)
    if let Some(result) = state.result.lock().take() {
        return Poll::Ready(match result {
            Ok(value) => match serde_json::from_value(value) {
                Ok(v) => WorkflowOutcome::ok(v),
                Err(e) => WorkflowOutcome::err(EngineError::Serialization(e)),
            },
            Err(e) => WorkflowOutcome::err(e),
        });
    }

    if state.cancelled.load(Ordering::SeqCst) {
        return Poll::Ready(WorkflowOutcome::err(EngineError::ActivityCancelled));
    }

    // Not ready yet - the workflow must suspend
    Poll::Ready(WorkflowOutcome::suspended(pending_reason()))
}

fn resolve_outcome<T>(
    outcome: Poll<WorkflowOutcome<T>>,
    suspension_cell: &SuspensionCell,
) -> Poll<Result<T>> {
    match outcome {
        Poll::Ready(WorkflowOutcome::Ready(result)) => Poll::Ready(result),
        Poll::Ready(WorkflowOutcome::Suspended { reason }) => {
            suspension_cell.signal(reason);
            Poll::Pending
        }
        Poll::Ready(WorkflowOutcome::DeterminismViolation(e)) => {
            Poll::Ready(Err(EngineError::DeterminismViolation(e)))
        }
        Poll::Pending => Poll::Pending,
    }
}

// ============================================================================
// ActivityFuture
// ============================================================================

/// Future for a scheduled activity.
///
/// Created by `WorkflowContext::schedule_activity_raw()` and related
/// methods. Resolves when the activity completes or exhausts its retries.
#[allow(dead_code)]
pub struct ActivityFuture<T> {
    /// Per-type sequence number for this activity
    pub(crate) activity_seq: u32,
    /// Unique activity execution id
    pub(crate) activity_execution_id: Uuid,
    /// Suspension cell for signalling suspension to the workflow context
    pub(crate) suspension_cell: SuspensionCell,
    /// Shared state
    pub(crate) state: Arc<FutureState>,
    pub(crate) _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> ActivityFuture<T> {
    /// Create a pending future (activity scheduled, result not yet known)
    pub(crate) fn pending(
        activity_seq: u32,
        activity_execution_id: Uuid,
        suspension_cell: SuspensionCell,
    ) -> Self {
        Self {
            activity_seq,
            activity_execution_id,
            suspension_cell,
            state: Arc::new(FutureState::new()),
            _marker: PhantomData,
        }
    }

    /// Create a future for replay with the result already known
    pub(crate) fn from_replay(
        activity_seq: u32,
        activity_execution_id: Uuid,
        suspension_cell: SuspensionCell,
        result: Result<Value>,
    ) -> Self {
        Self {
            activity_seq,
            activity_execution_id,
            suspension_cell,
            state: Arc::new(FutureState::with_result(result)),
            _marker: PhantomData,
        }
    }

    /// Create a future carrying an error (e.g. determinism violation)
    pub(crate) fn with_error(error: EngineError) -> Self {
        Self {
            activity_seq: 0,
            activity_execution_id: Uuid::nil(),
            suspension_cell: SuspensionCell::new(),
            state: Arc::new(FutureState::with_error(error)),
            _marker: PhantomData,
        }
    }

    /// The execution id assigned to this activity
    pub fn activity_execution_id(&self) -> Uuid {
        self.activity_execution_id
    }
}

impl<T: DeserializeOwned> Unpin for ActivityFuture<T> {}

impl<T: DeserializeOwned> WorkflowFuturePoll for ActivityFuture<T> {
    type Output = T;

    fn poll_outcome(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<WorkflowOutcome<T>> {
        let id = self.activity_execution_id;
        poll_shared_state(&self.state, || {
            format!("Waiting for activity {} to complete", id)
        })
    }
}

impl<T: DeserializeOwned> Future for ActivityFuture<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let suspension_cell = self.suspension_cell.clone();
        let outcome = self.as_mut().poll_outcome(cx);
        resolve_outcome(outcome, &suspension_cell)
    }
}

impl<T: DeserializeOwned> CancellableFuture for ActivityFuture<T> {
    fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }
}

/// Raw-Value activity future returned by the object-safe context methods
pub type ActivityFutureRaw = ActivityFuture<Value>;

// ============================================================================
// TimerFuture
// ============================================================================

/// Future for a timer/sleep operation.
///
/// Created by `WorkflowContext::sleep()`. Resolves when the timer fires or
/// is cancelled.
#[allow(dead_code)]
pub struct TimerFuture {
    pub(crate) timer_seq: u32,
    pub(crate) timer_id: String,
    pub(crate) suspension_cell: SuspensionCell,
    pub(crate) state: Arc<FutureState>,
}

impl TimerFuture {
    pub(crate) fn pending(timer_seq: u32, timer_id: String, suspension_cell: SuspensionCell) -> Self {
        Self {
            timer_seq,
            timer_id,
            suspension_cell,
            state: Arc::new(FutureState::new()),
        }
    }

    pub(crate) fn from_replay(
        timer_seq: u32,
        timer_id: String,
        suspension_cell: SuspensionCell,
        fired: bool,
    ) -> Self {
        let result = if fired {
            Ok(Value::Null)
        } else {
            Err(EngineError::TimerError(format!(
                "Timer '{}' was cancelled",
                timer_id
            )))
        };
        Self {
            timer_seq,
            timer_id,
            suspension_cell,
            state: Arc::new(FutureState::with_result(result)),
        }
    }

    pub(crate) fn with_error(error: EngineError) -> Self {
        Self {
            timer_seq: 0,
            timer_id: String::new(),
            suspension_cell: SuspensionCell::new(),
            state: Arc::new(FutureState::with_error(error)),
        }
    }

    /// The deterministic id of this timer
    pub fn timer_id(&self) -> &str {
        &self.timer_id
    }
}

impl Unpin for TimerFuture {}

impl WorkflowFuturePoll for TimerFuture {
    type Output = ();

    fn poll_outcome(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<WorkflowOutcome<()>> {
        let timer_id = self.timer_id.clone();

        if let Some(error) = self.state.error.lock().take() {
            if let EngineError::DeterminismViolation(violation) = error {
                return Poll::Ready(WorkflowOutcome::DeterminismViolation(violation));
            }
            return Poll::Ready(WorkflowOutcome::err(error));
        }

        if let Some(result) = self.state.result.lock().take() {
            return Poll::Ready(match result {
                Ok(_) => WorkflowOutcome::ok(()),
                Err(e) => WorkflowOutcome::err(e),
            });
        }

        if self.state.cancelled.load(Ordering::SeqCst) {
            return Poll::Ready(WorkflowOutcome::err(EngineError::TimerError(format!(
                "Timer '{}' was cancelled",
                timer_id
            ))));
        }

        Poll::Ready(WorkflowOutcome::suspended(format!(
            "Waiting for timer: {}",
            timer_id
        )))
    }
}

impl Future for TimerFuture {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let suspension_cell = self.suspension_cell.clone();
        let outcome = self.as_mut().poll_outcome(cx);
        resolve_outcome(outcome, &suspension_cell)
    }
}

impl CancellableFuture for TimerFuture {
    fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }
}

// ============================================================================
// ChildWorkflowFuture
// ============================================================================

/// Future for a child workflow execution.
///
/// Created by `WorkflowContext::schedule_child_workflow_raw()`.
/// Resolves when the child completes or fails. The child owns its own
/// history and can be replayed independently of the parent.
#[allow(dead_code)]
pub struct ChildWorkflowFuture<T> {
    pub(crate) child_workflow_seq: u32,
    pub(crate) child_execution_id: Uuid,
    pub(crate) name: String,
    pub(crate) suspension_cell: SuspensionCell,
    pub(crate) state: Arc<FutureState>,
    pub(crate) _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> ChildWorkflowFuture<T> {
    pub(crate) fn pending(
        child_workflow_seq: u32,
        child_execution_id: Uuid,
        name: String,
        suspension_cell: SuspensionCell,
    ) -> Self {
        Self {
            child_workflow_seq,
            child_execution_id,
            name,
            suspension_cell,
            state: Arc::new(FutureState::new()),
            _marker: PhantomData,
        }
    }

    pub(crate) fn from_replay(
        child_workflow_seq: u32,
        child_execution_id: Uuid,
        name: String,
        suspension_cell: SuspensionCell,
        result: Result<Value>,
    ) -> Self {
        Self {
            child_workflow_seq,
            child_execution_id,
            name,
            suspension_cell,
            state: Arc::new(FutureState::with_result(result)),
            _marker: PhantomData,
        }
    }

    pub(crate) fn with_error(error: EngineError) -> Self {
        Self {
            child_workflow_seq: 0,
            child_execution_id: Uuid::nil(),
            name: String::new(),
            suspension_cell: SuspensionCell::new(),
            state: Arc::new(FutureState::with_error(error)),
            _marker: PhantomData,
        }
    }

    /// The deterministic execution name of this child
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: DeserializeOwned> Unpin for ChildWorkflowFuture<T> {}

impl<T: DeserializeOwned> WorkflowFuturePoll for ChildWorkflowFuture<T> {
    type Output = T;

    fn poll_outcome(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<WorkflowOutcome<T>> {
        let name = self.name.clone();
        poll_shared_state(&self.state, || {
            format!("Waiting for child workflow: {}", name)
        })
    }
}

impl<T: DeserializeOwned> Future for ChildWorkflowFuture<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let suspension_cell = self.suspension_cell.clone();
        let outcome = self.as_mut().poll_outcome(cx);
        resolve_outcome(outcome, &suspension_cell)
    }
}

impl<T: DeserializeOwned> CancellableFuture for ChildWorkflowFuture<T> {
    fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }
}

/// Raw-Value child workflow future returned by the object-safe context methods
pub type ChildWorkflowFutureRaw = ChildWorkflowFuture<Value>;

// ============================================================================
// OperationFuture
// ============================================================================

/// Future for a recorded side-effect operation.
///
/// Created by `WorkflowContext::run_raw()`. Always ready: either the value
/// recorded in history (replay) or the value just computed (live).
#[allow(dead_code)]
pub struct OperationFuture<T> {
    pub(crate) operation_seq: u32,
    pub(crate) name: String,
    pub(crate) result: parking_lot::Mutex<Option<Result<Value>>>,
    pub(crate) _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> OperationFuture<T> {
    pub(crate) fn new(operation_seq: u32, name: String, result: Result<Value>) -> Self {
        Self {
            operation_seq,
            name,
            result: parking_lot::Mutex::new(Some(result)),
            _marker: PhantomData,
        }
    }

    /// The recorded operation name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: DeserializeOwned> Unpin for OperationFuture<T> {}

impl<T: DeserializeOwned> Future for OperationFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = self
            .result
            .lock()
            .take()
            .unwrap_or_else(|| Err(EngineError::Other("operation polled twice".to_string())));
        Poll::Ready(result.and_then(|value| {
            serde_json::from_value(value).map_err(EngineError::Serialization)
        }))
    }
}

/// Raw-Value operation future returned by the object-safe context methods
pub type OperationFutureRaw = OperationFuture<Value>;

// ============================================================================
// SignalFuture
// ============================================================================

/// A signal received by the workflow.
#[derive(Debug, Clone)]
pub struct Signal {
    /// The name of the signal channel
    pub name: String,
    /// The signal value
    pub value: Value,
}

impl Signal {
    /// Create a new Signal
    pub fn new(name: String, value: Value) -> Self {
        Self { name, value }
    }

    /// Deserialize the signal value to a specific type
    pub fn value_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.value.clone()).map_err(EngineError::Serialization)
    }
}

/// Future for receiving the next signal.
///
/// Created by `WorkflowContext::wait_for_signal_raw()`. Signals are consumed
/// in arrival order; consumption is recorded so replay sees the same signal
/// at the same point. If no signal is available the workflow suspends until
/// one arrives.
pub struct SignalFuture {
    pub(crate) suspension_cell: SuspensionCell,
    pub(crate) signal_name: String,
    pub(crate) state: Arc<FutureState>,
}

impl SignalFuture {
    pub(crate) fn pending(suspension_cell: SuspensionCell, signal_name: String) -> Self {
        Self {
            suspension_cell,
            signal_name,
            state: Arc::new(FutureState::new()),
        }
    }

    pub(crate) fn ready(
        suspension_cell: SuspensionCell,
        signal_name: String,
        result: Result<Value>,
    ) -> Self {
        Self {
            suspension_cell,
            signal_name,
            state: Arc::new(FutureState::with_result(result)),
        }
    }

    pub(crate) fn with_error(error: EngineError) -> Self {
        Self {
            suspension_cell: SuspensionCell::new(),
            signal_name: String::new(),
            state: Arc::new(FutureState::with_error(error)),
        }
    }
}

impl Unpin for SignalFuture {}

impl WorkflowFuturePoll for SignalFuture {
    type Output = Signal;

    fn poll_outcome(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<WorkflowOutcome<Signal>> {
        if let Some(error) = self.state.error.lock().take() {
            if let EngineError::DeterminismViolation(violation) = error {
                return Poll::Ready(WorkflowOutcome::DeterminismViolation(violation));
            }
            return Poll::Ready(WorkflowOutcome::err(error));
        }

        if let Some(result) = self.state.result.lock().take() {
            return Poll::Ready(match result {
                Ok(value) => {
                    let name = value
                        .get("signalName")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string();
                    let signal_value = value.get("signalValue").cloned().unwrap_or(Value::Null);
                    WorkflowOutcome::ok(Signal::new(name, signal_value))
                }
                Err(e) => WorkflowOutcome::err(e),
            });
        }

        Poll::Ready(WorkflowOutcome::suspended(format!(
            "Waiting for signal: {}",
            self.signal_name
        )))
    }
}

impl Future for SignalFuture {
    type Output = Result<Signal>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let suspension_cell = self.suspension_cell.clone();
        let outcome = self.as_mut().poll_outcome(cx);
        resolve_outcome(outcome, &suspension_cell)
    }
}

impl CancellableFuture for SignalFuture {
    fn cancel(&self) {
        // Signal waits cannot be cancelled - no-op
    }

    fn is_cancelled(&self) -> bool {
        false
    }
}
