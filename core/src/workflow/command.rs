//! Workflow commands generated during execution
//!
//! Commands are the write-side of the event log: workflow code produces
//! commands through its context, the runtime applies them and appends the
//! corresponding events to the history. On replay the validating recorder
//! checks each command against the event recorded at the same position.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A command produced by workflow execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowCommand {
    /// Schedule an activity for execution
    ScheduleActivity {
        sequence_number: i32,
        kind: String,
        activity_execution_id: Uuid,
        input: Value,
        /// Start-to-close timeout in milliseconds
        timeout_ms: Option<i64>,
        /// Heartbeat timeout in milliseconds
        heartbeat_timeout_ms: Option<i64>,
        max_attempts: Option<u32>,
    },

    /// Start a child workflow execution
    ScheduleChildWorkflow {
        sequence_number: i32,
        name: String,
        kind: String,
        child_execution_id: Uuid,
        input: Value,
    },

    /// Start a durable timer
    StartTimer {
        sequence_number: i32,
        timer_id: String,
        duration_ms: i64,
    },

    /// Record a cached side-effect result
    RecordOperation {
        sequence_number: i32,
        operation_name: String,
        result: Value,
    },

    /// Record the outcome of one signal-inbox consumption. `matched` is
    /// false for a poll that found the inbox empty; recording the misses is
    /// what keeps polls replay-stable.
    ConsumeSignal {
        sequence_number: i32,
        signal_name: String,
        matched: bool,
        value: Value,
    },

    /// Set a workflow state key
    SetState {
        sequence_number: i32,
        key: String,
        value: Value,
    },

    /// Clear a workflow state key
    ClearState { sequence_number: i32, key: String },

    /// Complete the workflow with an output
    CompleteWorkflow { sequence_number: i32, output: Value },

    /// Fail the workflow
    FailWorkflow {
        sequence_number: i32,
        error: String,
        failure_type: Option<String>,
    },

    /// Suspend the workflow waiting for an external event
    SuspendWorkflow { sequence_number: i32, reason: String },

    /// Cancel the workflow
    CancelWorkflow { sequence_number: i32, reason: String },
}

impl WorkflowCommand {
    /// Get the sequence number of this command
    pub fn sequence_number(&self) -> i32 {
        match self {
            Self::ScheduleActivity {
                sequence_number, ..
            }
            | Self::ScheduleChildWorkflow {
                sequence_number, ..
            }
            | Self::StartTimer {
                sequence_number, ..
            }
            | Self::RecordOperation {
                sequence_number, ..
            }
            | Self::ConsumeSignal {
                sequence_number, ..
            }
            | Self::SetState {
                sequence_number, ..
            }
            | Self::ClearState {
                sequence_number, ..
            }
            | Self::CompleteWorkflow {
                sequence_number, ..
            }
            | Self::FailWorkflow {
                sequence_number, ..
            }
            | Self::SuspendWorkflow {
                sequence_number, ..
            }
            | Self::CancelWorkflow {
                sequence_number, ..
            } => *sequence_number,
        }
    }

    /// The event type this command produces when applied
    pub fn event_type(&self) -> crate::workflow::event::EventType {
        use crate::workflow::event::EventType;
        match self {
            Self::ScheduleActivity { .. } => EventType::ActivityScheduled,
            Self::ScheduleChildWorkflow { .. } => EventType::ChildWorkflowInitiated,
            Self::StartTimer { .. } => EventType::TimerStarted,
            Self::RecordOperation { .. } => EventType::OperationCompleted,
            Self::ConsumeSignal { .. } => EventType::SignalConsumed,
            Self::SetState { .. } => EventType::StateSet,
            Self::ClearState { .. } => EventType::StateCleared,
            Self::CompleteWorkflow { .. } => EventType::WorkflowCompleted,
            Self::FailWorkflow { .. } => EventType::WorkflowExecutionFailed,
            Self::SuspendWorkflow { .. } => EventType::WorkflowSuspended,
            Self::CancelWorkflow { .. } => EventType::WorkflowCancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::event::EventType;
    use serde_json::json;

    #[test]
    fn test_sequence_number() {
        let cmd = WorkflowCommand::ScheduleActivity {
            sequence_number: 7,
            kind: "pipeline-scout".to_string(),
            activity_execution_id: Uuid::nil(),
            input: json!({"ticker": "BGNE"}),
            timeout_ms: Some(600_000),
            heartbeat_timeout_ms: Some(30_000),
            max_attempts: Some(5),
        };
        assert_eq!(cmd.sequence_number(), 7);

        let cmd = WorkflowCommand::SetState {
            sequence_number: 3,
            key: "progress".to_string(),
            value: json!({}),
        };
        assert_eq!(cmd.sequence_number(), 3);
    }

    #[test]
    fn test_event_type_mapping() {
        let cmd = WorkflowCommand::StartTimer {
            sequence_number: 1,
            timer_id: "sleep-1".to_string(),
            duration_ms: 1000,
        };
        assert_eq!(cmd.event_type(), EventType::TimerStarted);

        let cmd = WorkflowCommand::CompleteWorkflow {
            sequence_number: 2,
            output: json!(null),
        };
        assert_eq!(cmd.event_type(), EventType::WorkflowCompleted);
    }

    #[test]
    fn test_serde_roundtrip() {
        let cmd = WorkflowCommand::ScheduleChildWorkflow {
            sequence_number: 4,
            name: "valuation-BGNE".to_string(),
            kind: "valuation".to_string(),
            child_execution_id: Uuid::new_v4(),
            input: json!({"ticker": "BGNE"}),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("SCHEDULE_CHILD_WORKFLOW"));
        let parsed: WorkflowCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cmd);
    }
}
