//! WorkflowRuntime - drives workflow executions over an event store
//!
//! The runtime is the control plane at the workflow boundary: start an
//! execution, send it signals, query its replayed state, cancel it, and
//! drive it to completion. Driving alternates between workflow tasks
//! (deterministic replay + new commands) and side-effect work (activities,
//! child workflows, timers) whose terminal events are appended to the
//! history as they finish. A crash at any point resumes from the stored
//! history without re-executing completed work.

pub mod event_store;

use crate::activity::executor::{
    ActivityDispatchOptions, ActivityExecutionResult, ActivityExecutor, ActivityExecutorConfig,
};
use crate::activity::registry::ActivityRegistry;
use crate::error::{EngineError, Result};
use crate::worker::executor::{WorkflowExecutor, WorkflowStatus, WorkflowTaskResult};
use crate::worker::registry::WorkflowRegistry;
use biovalue_core::workflow::command::WorkflowCommand;
use biovalue_core::{build_initial_state, EventLookup, EventType, ReplayEvent};
use self::event_store::{EventStore, ExecutionDescriptor};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum number of activities running concurrently across workflows
    pub max_concurrent_activities: usize,
    /// Maximum number of workflow executions driven concurrently
    pub max_concurrent_workflows: usize,
    /// Activity supervision defaults
    pub activity_executor: ActivityExecutorConfig,
    /// How often a suspended execution re-checks for external progress
    pub idle_poll_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_activities: 20,
            max_concurrent_workflows: 10,
            activity_executor: ActivityExecutorConfig::default(),
            idle_poll_interval: Duration::from_millis(25),
        }
    }
}

/// Handle to a started workflow execution
#[derive(Debug, Clone)]
pub struct WorkflowHandle {
    /// Unique execution id (the run identifier returned to callers)
    pub execution_id: Uuid,
    /// Caller-supplied workflow id
    pub workflow_id: String,
}

/// Current status of an execution derived from its history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

enum WorkItemDone {
    Activity {
        activity_execution_id: Uuid,
        result: ActivityExecutionResult,
    },
    Child {
        name: String,
        output: Result<Value>,
    },
}

/// In-process workflow runtime
#[derive(Clone)]
pub struct WorkflowRuntime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    workflows: Arc<WorkflowRegistry>,
    activities: Arc<ActivityRegistry>,
    store: Arc<dyn EventStore>,
    activity_executor: ActivityExecutor,
    activity_permits: Arc<Semaphore>,
    workflow_permits: Arc<Semaphore>,
    wakeups: Notify,
    config: RuntimeConfig,
}

impl WorkflowRuntime {
    /// Create a new runtime over the given registries and store
    pub fn new(
        workflows: Arc<WorkflowRegistry>,
        activities: Arc<ActivityRegistry>,
        store: Arc<dyn EventStore>,
        config: RuntimeConfig,
    ) -> Self {
        let activity_executor = ActivityExecutor::new(
            Arc::clone(&activities),
            config.activity_executor.clone(),
        );
        Self {
            inner: Arc::new(RuntimeInner {
                workflows,
                activities,
                store,
                activity_executor,
                activity_permits: Arc::new(Semaphore::new(config.max_concurrent_activities)),
                workflow_permits: Arc::new(Semaphore::new(config.max_concurrent_workflows)),
                wakeups: Notify::new(),
                config,
            }),
        }
    }

    /// The activity registry backing this runtime
    pub fn activities(&self) -> &ActivityRegistry {
        &self.inner.activities
    }

    /// Start a workflow execution (or re-attach to an existing one with the
    /// same workflow id). Returns the handle carrying the run identifier.
    pub fn start_workflow(&self, kind: &str, workflow_id: &str, input: Value) -> Result<WorkflowHandle> {
        if !self.inner.workflows.has(kind) {
            return Err(EngineError::WorkflowNotFound(kind.to_string()));
        }

        // Deterministic execution id per workflow id: restarting a crashed
        // worker re-attaches instead of forking a second run
        let execution_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, workflow_id.as_bytes());

        if self.inner.store.execution(execution_id).is_none() {
            self.inner.store.create_execution(ExecutionDescriptor {
                execution_id,
                workflow_id: workflow_id.to_string(),
                kind: kind.to_string(),
                input: input.clone(),
                parent_execution_id: None,
            })?;
            self.inner.store.append(
                execution_id,
                EventType::WorkflowStarted,
                json!({"kind": kind, "workflowId": workflow_id, "input": input}),
            )?;
            info!(kind, workflow_id, %execution_id, "Workflow started");
        } else {
            info!(kind, workflow_id, %execution_id, "Re-attached to existing execution");
        }

        Ok(WorkflowHandle {
            execution_id,
            workflow_id: workflow_id.to_string(),
        })
    }

    /// Send a signal to an execution
    pub fn signal(&self, execution_id: Uuid, signal_name: &str, value: Value) -> Result<()> {
        self.inner.store.execution(execution_id).ok_or_else(|| {
            EngineError::Other(format!("Unknown execution: {}", execution_id))
        })?;
        self.inner.store.append(
            execution_id,
            EventType::SignalReceived,
            json!({"signalName": signal_name, "signalValue": value}),
        )?;
        debug!(%execution_id, signal_name, "Signal delivered");
        self.inner.wakeups.notify_waiters();
        Ok(())
    }

    /// Request cancellation of an execution
    pub fn cancel(&self, execution_id: Uuid, reason: &str) -> Result<()> {
        self.inner.store.append(
            execution_id,
            EventType::CancellationRequested,
            json!({"reason": reason}),
        )?;
        self.inner.wakeups.notify_waiters();
        Ok(())
    }

    /// Query a key of the execution's workflow state, reconstructed purely
    /// from the event log.
    pub fn query_state(&self, execution_id: Uuid, key: &str) -> Option<Value> {
        let history = self.inner.store.history(execution_id);
        build_initial_state(&history).remove(key)
    }

    /// Current status of an execution derived from its history
    pub fn status(&self, execution_id: Uuid) -> ExecutionStatus {
        let history = self.inner.store.history(execution_id);
        for event in history.iter().rev() {
            match event.event_type() {
                EventType::WorkflowCompleted => return ExecutionStatus::Completed,
                EventType::WorkflowExecutionFailed => return ExecutionStatus::Failed,
                EventType::WorkflowCancelled => return ExecutionStatus::Cancelled,
                _ => {}
            }
        }
        ExecutionStatus::Running
    }

    /// Drive an execution until it reaches a terminal state.
    pub async fn run(&self, execution_id: Uuid) -> Result<Value> {
        let _permit = self
            .inner
            .workflow_permits
            .acquire()
            .await
            .map_err(|_| EngineError::Other("runtime shut down".to_string()))?;
        self.drive(execution_id).await
    }

    fn drive_boxed(
        &self,
        execution_id: Uuid,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value>> + Send>> {
        let runtime = self.clone();
        Box::pin(async move { runtime.drive(execution_id).await })
    }

    async fn drive(&self, execution_id: Uuid) -> Result<Value> {
        let descriptor = self.inner.store.execution(execution_id).ok_or_else(|| {
            EngineError::Other(format!("Unknown execution: {}", execution_id))
        })?;
        let workflow = self
            .inner
            .workflows
            .get(&descriptor.kind)
            .ok_or_else(|| EngineError::WorkflowNotFound(descriptor.kind.clone()))?;

        // Already terminal: return the recorded outcome without replaying
        if let Some(outcome) = self.terminal_outcome(execution_id) {
            return outcome;
        }

        let mut in_flight: JoinSet<WorkItemDone> = JoinSet::new();
        let mut dispatched: HashSet<String> = HashSet::new();

        loop {
            let history = self.inner.store.history(execution_id);
            let executor = WorkflowExecutor::new(
                execution_id,
                descriptor.input.clone(),
                history,
                chrono::Utc::now().timestamp_millis(),
            );
            let result = executor.execute_with_validation(&workflow).await;

            self.apply_commands(execution_id, &result.commands)?;

            match result.status {
                WorkflowStatus::Completed => {
                    in_flight.abort_all();
                    let output = result.output.unwrap_or(Value::Null);
                    info!(%execution_id, "Workflow completed");
                    return Ok(output);
                }
                WorkflowStatus::Failed => {
                    in_flight.abort_all();
                    let error = result.error.unwrap_or_else(|| "workflow failed".to_string());
                    warn!(%execution_id, error = %error, "Workflow failed");
                    return Err(EngineError::WorkflowFailed(error));
                }
                WorkflowStatus::Cancelled => {
                    in_flight.abort_all();
                    let reason = result.error.unwrap_or_else(|| "cancelled".to_string());
                    info!(%execution_id, reason = %reason, "Workflow cancelled");
                    return Err(EngineError::WorkflowCancelled(reason));
                }
                WorkflowStatus::Suspended => {
                    self.make_progress(execution_id, &mut in_flight, &mut dispatched, &result)
                        .await?;
                }
            }
        }
    }

    fn terminal_outcome(&self, execution_id: Uuid) -> Option<Result<Value>> {
        let history = self.inner.store.history(execution_id);
        for event in history.iter().rev() {
            match event.event_type() {
                EventType::WorkflowCompleted => {
                    return Some(Ok(event.get("output").cloned().unwrap_or(Value::Null)));
                }
                EventType::WorkflowExecutionFailed => {
                    return Some(Err(EngineError::WorkflowFailed(
                        event.get_string("error").unwrap_or("failed").to_string(),
                    )));
                }
                EventType::WorkflowCancelled => {
                    return Some(Err(EngineError::WorkflowCancelled(
                        event.get_string("reason").unwrap_or("cancelled").to_string(),
                    )));
                }
                _ => {}
            }
        }
        None
    }

    /// Dispatch runnable work and wait for one unit of external progress.
    async fn make_progress(
        &self,
        execution_id: Uuid,
        in_flight: &mut JoinSet<WorkItemDone>,
        dispatched: &mut HashSet<String>,
        task_result: &WorkflowTaskResult,
    ) -> Result<()> {
        let history = self.inner.store.history(execution_id);
        let mut fired_timer = false;

        // Timers fire eagerly in this runtime: the evaluation workflows
        // never sleep, and tests control virtual time through the mocks
        for event in EventLookup::filter_events_by_type(&history, EventType::TimerStarted) {
            let timer_id = event.get_string("timerId").unwrap_or_default().to_string();
            if EventLookup::find_terminal_timer_event(&history, &timer_id).is_none() {
                self.inner.store.append(
                    execution_id,
                    EventType::TimerFired,
                    json!({"timerId": timer_id}),
                )?;
                fired_timer = true;
            }
        }
        if fired_timer {
            return Ok(());
        }

        // Pending activities
        for event in EventLookup::filter_events_by_type(&history, EventType::ActivityScheduled) {
            let activity_execution_id = event
                .get_string("activityExecutionId")
                .and_then(|s| Uuid::parse_str(s).ok())
                .unwrap_or(Uuid::nil());
            let key = format!("activity:{}", activity_execution_id);
            if EventLookup::find_terminal_activity_event(
                &history,
                &activity_execution_id.to_string(),
            )
            .is_some()
                || !dispatched.insert(key)
            {
                continue;
            }

            let kind = event.get_string("kind").unwrap_or_default().to_string();
            let input = event.get("input").cloned().unwrap_or(Value::Null);
            let options = ActivityDispatchOptions {
                timeout: event
                    .get_i64("timeoutMs")
                    .map(|ms| Duration::from_millis(ms as u64)),
                heartbeat_timeout: event
                    .get_i64("heartbeatTimeoutMs")
                    .map(|ms| Duration::from_millis(ms as u64)),
                max_attempts: event.get_i64("maxAttempts").map(|n| n as u32),
            };

            let runtime = self.clone();
            let permits = Arc::clone(&self.inner.activity_permits);
            in_flight.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let result = runtime
                    .inner
                    .activity_executor
                    .execute(
                        activity_execution_id,
                        execution_id,
                        &kind,
                        input,
                        options,
                        Arc::new(AtomicBool::new(false)),
                    )
                    .await;
                WorkItemDone::Activity {
                    activity_execution_id,
                    result,
                }
            });
        }

        // Pending child workflows
        for event in
            EventLookup::filter_events_by_type(&history, EventType::ChildWorkflowInitiated)
        {
            let name = event
                .get_string("childExecutionName")
                .unwrap_or_default()
                .to_string();
            let key = format!("child:{}", name);
            if EventLookup::find_terminal_child_workflow_event(&history, &name).is_some()
                || !dispatched.insert(key)
            {
                continue;
            }

            let child_execution_id = event
                .get_string("childExecutionId")
                .and_then(|s| Uuid::parse_str(s).ok())
                .unwrap_or(Uuid::nil());
            let kind = event
                .get_string("childWorkflowKind")
                .unwrap_or_default()
                .to_string();
            let input = event.get("input").cloned().unwrap_or(Value::Null);

            // Child executions own their history; create on first dispatch
            if self.inner.store.execution(child_execution_id).is_none() {
                self.inner.store.create_execution(ExecutionDescriptor {
                    execution_id: child_execution_id,
                    workflow_id: name.clone(),
                    kind: kind.clone(),
                    input: input.clone(),
                    parent_execution_id: Some(execution_id),
                })?;
                self.inner.store.append(
                    child_execution_id,
                    EventType::WorkflowStarted,
                    json!({"kind": kind, "workflowId": name, "input": input}),
                )?;
            }

            let runtime = self.clone();
            let child_name = name.clone();
            in_flight.spawn(async move {
                let output = runtime.drive_boxed(child_execution_id).await;
                WorkItemDone::Child {
                    name: child_name,
                    output,
                }
            });
        }

        if in_flight.is_empty() {
            // Nothing runnable: the workflow is waiting on an external
            // signal. Wake up on delivery (or poll, to close the race
            // between reading the history and parking).
            debug!(
                %execution_id,
                reason = task_result.suspension_reason.as_deref().unwrap_or(""),
                "Execution idle, waiting for external event"
            );
            tokio::select! {
                _ = self.inner.wakeups.notified() => {}
                _ = tokio::time::sleep(self.inner.config.idle_poll_interval) => {}
            }
            return Ok(());
        }

        tokio::select! {
            joined = in_flight.join_next() => {
                match joined {
                    Some(Ok(done)) => self.record_work_item(execution_id, done)?,
                    Some(Err(e)) if e.is_cancelled() => {}
                    Some(Err(e)) => {
                        return Err(EngineError::Other(format!("worker task panicked: {}", e)));
                    }
                    None => {}
                }
            }
            _ = self.inner.wakeups.notified() => {}
        }
        Ok(())
    }

    fn record_work_item(&self, execution_id: Uuid, done: WorkItemDone) -> Result<()> {
        match done {
            WorkItemDone::Activity {
                activity_execution_id,
                result,
            } => match result {
                ActivityExecutionResult::Completed { output } => {
                    self.inner.store.append(
                        execution_id,
                        EventType::ActivityCompleted,
                        json!({
                            "activityExecutionId": activity_execution_id.to_string(),
                            "result": output,
                        }),
                    )?;
                }
                ActivityExecutionResult::Failed {
                    error_message,
                    attempts,
                    ..
                } => {
                    self.inner.store.append(
                        execution_id,
                        EventType::ActivityFailed,
                        json!({
                            "activityExecutionId": activity_execution_id.to_string(),
                            "error": error_message,
                            "attempts": attempts,
                        }),
                    )?;
                }
                ActivityExecutionResult::Cancelled => {
                    self.inner.store.append(
                        execution_id,
                        EventType::ActivityCancelled,
                        json!({
                            "activityExecutionId": activity_execution_id.to_string(),
                        }),
                    )?;
                }
            },
            WorkItemDone::Child { name, output } => match output {
                Ok(value) => {
                    self.inner.store.append(
                        execution_id,
                        EventType::ChildWorkflowCompleted,
                        json!({"childExecutionName": name, "output": value}),
                    )?;
                }
                Err(e) => {
                    self.inner.store.append(
                        execution_id,
                        EventType::ChildWorkflowFailed,
                        json!({"childExecutionName": name, "error": e.to_string()}),
                    )?;
                }
            },
        }
        Ok(())
    }

    fn apply_commands(&self, execution_id: Uuid, commands: &[WorkflowCommand]) -> Result<()> {
        let history = self.inner.store.history(execution_id);
        for command in commands {
            match command {
                WorkflowCommand::ScheduleActivity {
                    kind,
                    activity_execution_id,
                    input,
                    timeout_ms,
                    heartbeat_timeout_ms,
                    max_attempts,
                    ..
                } => {
                    self.inner.store.append(
                        execution_id,
                        EventType::ActivityScheduled,
                        json!({
                            "kind": kind,
                            "activityExecutionId": activity_execution_id.to_string(),
                            "input": input,
                            "timeoutMs": timeout_ms,
                            "heartbeatTimeoutMs": heartbeat_timeout_ms,
                            "maxAttempts": max_attempts,
                        }),
                    )?;
                }
                WorkflowCommand::ScheduleChildWorkflow {
                    name,
                    kind,
                    child_execution_id,
                    input,
                    ..
                } => {
                    self.inner.store.append(
                        execution_id,
                        EventType::ChildWorkflowInitiated,
                        json!({
                            "childExecutionName": name,
                            "childWorkflowKind": kind,
                            "childExecutionId": child_execution_id.to_string(),
                            "input": input,
                        }),
                    )?;
                }
                WorkflowCommand::StartTimer {
                    timer_id,
                    duration_ms,
                    ..
                } => {
                    self.inner.store.append(
                        execution_id,
                        EventType::TimerStarted,
                        json!({"timerId": timer_id, "durationMs": duration_ms}),
                    )?;
                }
                WorkflowCommand::RecordOperation {
                    operation_name,
                    result,
                    ..
                } => {
                    self.inner.store.append(
                        execution_id,
                        EventType::OperationCompleted,
                        json!({"operationName": operation_name, "result": result}),
                    )?;
                }
                WorkflowCommand::ConsumeSignal {
                    signal_name,
                    matched,
                    value,
                    ..
                } => {
                    self.inner.store.append(
                        execution_id,
                        EventType::SignalConsumed,
                        json!({
                            "signalName": signal_name,
                            "matched": matched,
                            "signalValue": value,
                        }),
                    )?;
                }
                WorkflowCommand::SetState { key, value, .. } => {
                    self.inner.store.append(
                        execution_id,
                        EventType::StateSet,
                        json!({"key": key, "value": value}),
                    )?;
                }
                WorkflowCommand::ClearState { key, .. } => {
                    self.inner.store.append(
                        execution_id,
                        EventType::StateCleared,
                        json!({"key": key}),
                    )?;
                }
                WorkflowCommand::CompleteWorkflow { output, .. } => {
                    if !history
                        .iter()
                        .any(|e| e.event_type() == EventType::WorkflowCompleted)
                    {
                        self.inner.store.append(
                            execution_id,
                            EventType::WorkflowCompleted,
                            json!({"output": output}),
                        )?;
                    }
                }
                WorkflowCommand::FailWorkflow {
                    error,
                    failure_type,
                    ..
                } => {
                    if !history
                        .iter()
                        .any(|e| e.event_type() == EventType::WorkflowExecutionFailed)
                    {
                        self.inner.store.append(
                            execution_id,
                            EventType::WorkflowExecutionFailed,
                            json!({"error": error, "failureType": failure_type}),
                        )?;
                    }
                }
                WorkflowCommand::CancelWorkflow { reason, .. } => {
                    if !history
                        .iter()
                        .any(|e| e.event_type() == EventType::WorkflowCancelled)
                    {
                        self.inner.store.append(
                            execution_id,
                            EventType::WorkflowCancelled,
                            json!({"reason": reason}),
                        )?;
                    }
                }
                // Suspensions are transient; they are not persisted
                WorkflowCommand::SuspendWorkflow { .. } => {}
            }
        }
        Ok(())
    }
}

/// Replay an execution's recorded history through the workflow definition
/// with full determinism validation. Returns the reproduced output.
///
/// This is the audit path: the event log alone must reconstruct the final
/// output without touching any collaborator.
pub async fn replay_history(
    workflows: &WorkflowRegistry,
    descriptor: &ExecutionDescriptor,
    history: Vec<ReplayEvent>,
) -> Result<Value> {
    let workflow = workflows
        .get(&descriptor.kind)
        .ok_or_else(|| EngineError::WorkflowNotFound(descriptor.kind.clone()))?;

    // Replay over the pre-terminal prefix so the workflow function runs to
    // its own completion again
    let pre_terminal: Vec<ReplayEvent> = history
        .into_iter()
        .filter(|e| !e.event_type().is_workflow_terminal())
        .collect();

    let executor = WorkflowExecutor::new(
        descriptor.execution_id,
        descriptor.input.clone(),
        pre_terminal,
        0,
    );
    let result = executor.execute_with_validation(&workflow).await;

    match result.status {
        WorkflowStatus::Completed => Ok(result.output.unwrap_or(Value::Null)),
        WorkflowStatus::Suspended => Err(EngineError::Suspended {
            reason: result
                .suspension_reason
                .unwrap_or_else(|| "incomplete history".to_string()),
        }),
        WorkflowStatus::Failed => Err(EngineError::WorkflowFailed(
            result.error.unwrap_or_else(|| "failed".to_string()),
        )),
        WorkflowStatus::Cancelled => Err(EngineError::WorkflowCancelled(
            result.error.unwrap_or_else(|| "cancelled".to_string()),
        )),
    }
}
