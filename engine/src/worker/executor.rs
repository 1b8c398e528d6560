//! WorkflowExecutor - executes one workflow task with deterministic replay
//!
//! A workflow task runs the workflow function over the persisted history:
//! replayed context calls resolve from recorded events, new calls record
//! commands, and the first await on an unresolved future suspends the
//! workflow. The result is the command batch plus a status the runtime
//! applies to the event log.

use crate::error::{EngineError, Result};
use crate::worker::registry::RegisteredWorkflow;
use crate::workflow::context::WorkflowContext;
use crate::workflow::context_impl::WorkflowContextImpl;
use biovalue_core::workflow::command::WorkflowCommand;
use biovalue_core::{
    CommandCollector, CommandRecorder, DeterminismValidator, EventType, ReplayEvent,
    ValidatingCommandRecorder,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::task::{Context, Poll};
use uuid::Uuid;

/// Status of a workflow execution after one workflow task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    /// Workflow completed successfully
    Completed,
    /// Workflow is suspended waiting for an external event
    Suspended,
    /// Workflow failed with an error
    Failed,
    /// Workflow was cancelled
    Cancelled,
}

/// Result of a workflow task execution
#[derive(Debug, Clone)]
pub struct WorkflowTaskResult {
    /// Commands generated during execution
    pub commands: Vec<WorkflowCommand>,
    /// Final status of the workflow task
    pub status: WorkflowStatus,
    /// Output value if completed
    pub output: Option<Value>,
    /// Error message if failed
    pub error: Option<String>,
    /// Failure type if failed
    pub failure_type: Option<String>,
    /// Suspension reason if suspended
    pub suspension_reason: Option<String>,
}

impl WorkflowTaskResult {
    /// Create a completed result
    pub fn completed(commands: Vec<WorkflowCommand>, output: Value) -> Self {
        Self {
            commands,
            status: WorkflowStatus::Completed,
            output: Some(output),
            error: None,
            failure_type: None,
            suspension_reason: None,
        }
    }

    /// Create a suspended result
    pub fn suspended(commands: Vec<WorkflowCommand>, reason: String) -> Self {
        Self {
            commands,
            status: WorkflowStatus::Suspended,
            output: None,
            error: None,
            failure_type: None,
            suspension_reason: Some(reason),
        }
    }

    /// Create a failed result
    pub fn failed(commands: Vec<WorkflowCommand>, error: String, failure_type: &str) -> Self {
        Self {
            commands,
            status: WorkflowStatus::Failed,
            output: None,
            error: Some(error),
            failure_type: Some(failure_type.to_string()),
            suspension_reason: None,
        }
    }

    /// Create a cancelled result
    pub fn cancelled(commands: Vec<WorkflowCommand>, reason: String) -> Self {
        Self {
            commands,
            status: WorkflowStatus::Cancelled,
            output: None,
            error: Some(reason),
            failure_type: None,
            suspension_reason: None,
        }
    }
}

/// WorkflowExecutor executes workflow definitions with deterministic replay
pub struct WorkflowExecutor {
    workflow_execution_id: Uuid,
    input: Value,
    existing_events: Vec<ReplayEvent>,
    workflow_task_time: i64,
}

impl WorkflowExecutor {
    /// Create a new workflow executor.
    ///
    /// `fallback_time_millis` is used as the deterministic task time when
    /// the history is empty; otherwise the last event's timestamp wins, so
    /// replaying the same history observes the same clock.
    pub fn new(
        workflow_execution_id: Uuid,
        input: Value,
        existing_events: Vec<ReplayEvent>,
        fallback_time_millis: i64,
    ) -> Self {
        let workflow_task_time = existing_events
            .last()
            .map(|e| e.timestamp().timestamp_millis())
            .unwrap_or(fallback_time_millis);
        Self {
            workflow_execution_id,
            input,
            existing_events,
            workflow_task_time,
        }
    }

    fn has_terminal_event(&self, event_type: EventType) -> bool {
        self.existing_events
            .iter()
            .any(|e| e.event_type() == event_type)
    }

    /// Execute one workflow task with a plain command collector.
    pub async fn execute(&self, workflow: &RegisteredWorkflow) -> WorkflowTaskResult {
        self.run_task(workflow, CommandCollector::new()).await
    }

    /// Execute one workflow task with determinism validation against the
    /// existing history.
    pub async fn execute_with_validation(
        &self,
        workflow: &RegisteredWorkflow,
    ) -> WorkflowTaskResult {
        let recorder =
            ValidatingCommandRecorder::new(DeterminismValidator::new(), self.existing_events.clone());
        self.run_task(workflow, recorder).await
    }

    async fn run_task<R>(&self, workflow: &RegisteredWorkflow, recorder: R) -> WorkflowTaskResult
    where
        R: CommandRecorder + Send + Sync + 'static,
    {
        // An engine-level terminate is pre-emptive: once the history carries
        // a cancellation request, no further workflow code runs. Cooperative
        // cancellation goes through the signal surface instead.
        if self
            .existing_events
            .iter()
            .any(|e| e.event_type() == EventType::CancellationRequested)
        {
            let reason = "cancellation requested".to_string();
            let next_sequence = (self.existing_events.len() as i32) + 1;
            return WorkflowTaskResult::cancelled(
                vec![WorkflowCommand::CancelWorkflow {
                    sequence_number: next_sequence,
                    reason: reason.clone(),
                }],
                reason,
            );
        }

        let ctx = Arc::new(WorkflowContextImpl::new(
            self.workflow_execution_id,
            self.input.clone(),
            recorder,
            self.existing_events.clone(),
            self.workflow_task_time,
        ));
        let dyn_ctx: Arc<dyn WorkflowContext + Send + Sync> = Arc::clone(&ctx) as _;

        ctx.clear_suspension();
        let mut future = workflow.execute(dyn_ctx, self.input.clone());

        // Workflow futures never register wakers: they are either resolved
        // from history or signal suspension through the context's cell, so a
        // single poll pass drives the task as far as it can go.
        let waker = futures::task::noop_waker();
        let mut poll_cx = Context::from_waker(&waker);
        let poll = future.as_mut().poll(&mut poll_cx);

        match poll {
            Poll::Pending => match ctx.take_suspension() {
                Some(reason) => WorkflowTaskResult::suspended(ctx.take_commands(), reason),
                None => WorkflowTaskResult::failed(
                    ctx.take_commands(),
                    "Workflow blocked on a non-workflow future; workflow code may only await \
                     context-provided futures"
                        .to_string(),
                    "DETERMINISM_VIOLATION",
                ),
            },
            Poll::Ready(result) => self.handle_result(&ctx, result),
        }
    }

    fn handle_result<R: CommandRecorder + Send + Sync>(
        &self,
        ctx: &Arc<WorkflowContextImpl<R>>,
        result: Result<Value>,
    ) -> WorkflowTaskResult {
        let mut commands = ctx.take_commands();
        let next_sequence =
            (self.existing_events.len() + commands.len()) as i32 + 1;

        match result {
            Ok(output) => {
                // Idempotency: only add the completion command once
                if !self.has_terminal_event(EventType::WorkflowCompleted) {
                    commands.push(WorkflowCommand::CompleteWorkflow {
                        sequence_number: next_sequence,
                        output: output.clone(),
                    });
                }
                WorkflowTaskResult::completed(commands, output)
            }

            Err(EngineError::Suspended { reason }) => {
                WorkflowTaskResult::suspended(commands, reason)
            }

            Err(EngineError::WorkflowCancelled(reason)) => {
                commands.push(WorkflowCommand::CancelWorkflow {
                    sequence_number: next_sequence,
                    reason: reason.clone(),
                });
                WorkflowTaskResult::cancelled(commands, reason)
            }

            Err(EngineError::DeterminismViolation(violation)) => {
                let error_msg = violation.to_string();
                commands.push(WorkflowCommand::FailWorkflow {
                    sequence_number: next_sequence,
                    error: error_msg.clone(),
                    failure_type: Some("DETERMINISM_VIOLATION".to_string()),
                });
                WorkflowTaskResult::failed(commands, error_msg, "DETERMINISM_VIOLATION")
            }

            Err(e) => {
                let error_msg = e.to_string();
                let failure_type = classify_failure(&e);
                if !self.has_terminal_event(EventType::WorkflowExecutionFailed) {
                    commands.push(WorkflowCommand::FailWorkflow {
                        sequence_number: next_sequence,
                        error: error_msg.clone(),
                        failure_type: Some(failure_type.to_string()),
                    });
                }
                WorkflowTaskResult::failed(commands, error_msg, failure_type)
            }
        }
    }
}

/// Classify a workflow failure for the terminal event
fn classify_failure(error: &EngineError) -> &'static str {
    match error {
        EngineError::NonRetryable(_) => "NON_RETRYABLE",
        EngineError::InvalidConfiguration(_) => "NON_RETRYABLE",
        EngineError::WorkflowNotFound(_) => "NON_RETRYABLE",
        EngineError::ActivityNotFound(_) => "NON_RETRYABLE",
        EngineError::DeterminismViolation(_) => "DETERMINISM_VIOLATION",
        EngineError::Io(_) => "TRANSIENT",
        EngineError::Serialization(_) => "TRANSIENT",
        EngineError::TimerError(_) => "TRANSIENT",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::registry::{WorkflowMetadata, WorkflowRegistry};
    use crate::workflow::definition::WorkflowDefinition;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;

    struct DoublingWorkflow;

    #[async_trait]
    impl WorkflowDefinition for DoublingWorkflow {
        type Input = Value;
        type Output = Value;

        fn kind(&self) -> &str {
            "doubling"
        }

        async fn execute(
            &self,
            _ctx: &dyn WorkflowContext,
            input: Self::Input,
        ) -> Result<Self::Output> {
            let x = input.get("x").and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(json!({"result": x * 2}))
        }
    }

    struct OneActivityWorkflow;

    #[async_trait]
    impl WorkflowDefinition for OneActivityWorkflow {
        type Input = Value;
        type Output = Value;

        fn kind(&self) -> &str {
            "one-activity"
        }

        async fn execute(
            &self,
            ctx: &dyn WorkflowContext,
            _input: Self::Input,
        ) -> Result<Self::Output> {
            let out = ctx.schedule_activity_raw("probe", json!({})).await?;
            Ok(out)
        }
    }

    struct FailingWorkflow;

    #[async_trait]
    impl WorkflowDefinition for FailingWorkflow {
        type Input = Value;
        type Output = Value;

        fn kind(&self) -> &str {
            "failing"
        }

        async fn execute(
            &self,
            _ctx: &dyn WorkflowContext,
            _input: Self::Input,
        ) -> Result<Self::Output> {
            Err(EngineError::Other("something went wrong".to_string()))
        }
    }

    fn registered(kind: &str) -> Arc<RegisteredWorkflow> {
        let registry = WorkflowRegistry::new();
        match kind {
            "doubling" => registry.register(DoublingWorkflow).unwrap(),
            "one-activity" => registry.register(OneActivityWorkflow).unwrap(),
            "failing" => registry.register(FailingWorkflow).unwrap(),
            _ => panic!("unknown fixture"),
        }
        registry.get(kind).unwrap()
    }

    #[tokio::test]
    async fn test_execute_success() {
        let executor = WorkflowExecutor::new(Uuid::new_v4(), json!({"x": 5}), vec![], 0);
        let result = executor.execute(&registered("doubling")).await;

        assert_eq!(result.status, WorkflowStatus::Completed);
        assert_eq!(result.output, Some(json!({"result": 10})));
        assert!(result
            .commands
            .iter()
            .any(|c| matches!(c, WorkflowCommand::CompleteWorkflow { .. })));
    }

    #[tokio::test]
    async fn test_execute_suspends_on_unresolved_activity() {
        let executor = WorkflowExecutor::new(Uuid::new_v4(), json!({}), vec![], 0);
        let result = executor.execute(&registered("one-activity")).await;

        assert_eq!(result.status, WorkflowStatus::Suspended);
        assert!(result.suspension_reason.is_some());
        assert!(result
            .commands
            .iter()
            .any(|c| matches!(c, WorkflowCommand::ScheduleActivity { .. })));
    }

    #[tokio::test]
    async fn test_execute_resumes_from_history() {
        let wf_id = Uuid::new_v4();
        let executor = WorkflowExecutor::new(wf_id, json!({}), vec![], 0);
        let first = executor.execute(&registered("one-activity")).await;
        assert_eq!(first.status, WorkflowStatus::Suspended);

        let activity_id = match &first.commands[0] {
            WorkflowCommand::ScheduleActivity {
                activity_execution_id,
                ..
            } => *activity_execution_id,
            other => panic!("unexpected command: {:?}", other),
        };

        let events = vec![
            ReplayEvent::new(
                1,
                EventType::ActivityScheduled,
                json!({"kind": "probe", "activityExecutionId": activity_id.to_string()}),
                Utc::now(),
            ),
            ReplayEvent::new(
                2,
                EventType::ActivityCompleted,
                json!({"activityExecutionId": activity_id.to_string(), "result": {"ok": true}}),
                Utc::now(),
            ),
        ];

        let executor = WorkflowExecutor::new(wf_id, json!({}), events, 0);
        let second = executor
            .execute_with_validation(&registered("one-activity"))
            .await;

        assert_eq!(second.status, WorkflowStatus::Completed);
        assert_eq!(second.output, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_execute_failure() {
        let executor = WorkflowExecutor::new(Uuid::new_v4(), json!({}), vec![], 0);
        let result = executor.execute(&registered("failing")).await;

        assert_eq!(result.status, WorkflowStatus::Failed);
        assert!(result.error.unwrap().contains("something went wrong"));
        assert!(result
            .commands
            .iter()
            .any(|c| matches!(c, WorkflowCommand::FailWorkflow { .. })));
    }

    #[tokio::test]
    async fn test_idempotent_completion() {
        let events = vec![ReplayEvent::new(
            1,
            EventType::WorkflowCompleted,
            json!({}),
            Utc::now(),
        )];
        let executor = WorkflowExecutor::new(Uuid::new_v4(), json!({"x": 1}), events, 0);
        let result = executor.execute(&registered("doubling")).await;

        let complete_count = result
            .commands
            .iter()
            .filter(|c| matches!(c, WorkflowCommand::CompleteWorkflow { .. }))
            .count();
        assert_eq!(complete_count, 0);
    }

    #[tokio::test]
    async fn test_blocking_on_external_future_is_flagged() {
        let registry = WorkflowRegistry::new();
        registry
            .register_raw(RegisteredWorkflow::new(
                WorkflowMetadata {
                    kind: "blocker".to_string(),
                    name: "blocker".to_string(),
                    description: None,
                    tags: vec![],
                    cancellable: false,
                    timeout_seconds: None,
                    input_schema: None,
                    output_schema: None,
                },
                Box::new(|_ctx, _input| {
                    Box::pin(async {
                        // Workflow code must never block on OS facilities
                        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                        Ok(json!(null))
                    })
                }),
            ))
            .unwrap();

        let executor = WorkflowExecutor::new(Uuid::new_v4(), json!({}), vec![], 0);
        let result = executor.execute(&registry.get("blocker").unwrap()).await;

        assert_eq!(result.status, WorkflowStatus::Failed);
        assert_eq!(
            result.failure_type.as_deref(),
            Some("DETERMINISM_VIOLATION")
        );
    }
}
