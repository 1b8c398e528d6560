//! Determinism validation for workflow replay
//!
//! During replay every command the workflow generates is matched against
//! the event recorded at the same sequence position. A mismatch means the
//! workflow code is non-deterministic and the execution is failed rather
//! than retried.

use crate::error::DeterminismViolationError;
use crate::workflow::command::WorkflowCommand;
use crate::workflow::event::ReplayEvent;

/// Result of validating a full command sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeterminismValidationResult {
    /// All commands matched the recorded history
    Valid,
    /// A command diverged from the recorded history
    Invalid(DeterminismViolationError),
}

/// Validates commands against historical events (state machine rules).
#[derive(Debug, Default, Clone)]
pub struct DeterminismValidator;

impl DeterminismValidator {
    /// Create a new validator
    pub fn new() -> Self {
        Self
    }

    /// Validate a single command against the event recorded at its position.
    ///
    /// `event` is `None` when the command extends past the recorded history,
    /// which is always valid (new progress).
    pub fn validate_command(
        &self,
        command: &WorkflowCommand,
        event: Option<&ReplayEvent>,
    ) -> Result<(), DeterminismViolationError> {
        let event = match event {
            Some(e) => e,
            None => return Ok(()),
        };

        let sequence = command.sequence_number();

        if event.event_type() != command.event_type() {
            return Err(DeterminismViolationError::TypeMismatch {
                sequence,
                expected: event.event_type(),
                actual: command.event_type(),
            });
        }

        match command {
            WorkflowCommand::ScheduleActivity { kind, .. } => {
                let recorded = event.get_string("kind").unwrap_or_default();
                if recorded != kind {
                    return Err(DeterminismViolationError::ActivityKindMismatch {
                        sequence,
                        expected: recorded.to_string(),
                        actual: kind.clone(),
                    });
                }
            }
            WorkflowCommand::ScheduleChildWorkflow { name, kind, .. } => {
                let recorded_name = event.get_string("childExecutionName").unwrap_or_default();
                if recorded_name != name {
                    return Err(DeterminismViolationError::ChildWorkflowMismatch {
                        sequence,
                        field: "name".to_string(),
                        expected: recorded_name.to_string(),
                        actual: name.clone(),
                    });
                }
                let recorded_kind = event.get_string("childWorkflowKind").unwrap_or_default();
                if !recorded_kind.is_empty() && recorded_kind != kind {
                    return Err(DeterminismViolationError::ChildWorkflowMismatch {
                        sequence,
                        field: "kind".to_string(),
                        expected: recorded_kind.to_string(),
                        actual: kind.clone(),
                    });
                }
            }
            WorkflowCommand::StartTimer { timer_id, .. } => {
                let recorded = event.get_string("timerId").unwrap_or_default();
                if recorded != timer_id {
                    return Err(DeterminismViolationError::TimerIdMismatch {
                        sequence,
                        expected: recorded.to_string(),
                        actual: timer_id.clone(),
                    });
                }
            }
            WorkflowCommand::ConsumeSignal { signal_name, .. } => {
                let recorded = event.get_string("signalName").unwrap_or_default();
                if recorded != signal_name {
                    return Err(DeterminismViolationError::OperationNameMismatch {
                        sequence,
                        expected: recorded.to_string(),
                        actual: signal_name.clone(),
                    });
                }
            }
            WorkflowCommand::RecordOperation { operation_name, .. } => {
                let recorded = event.get_string("operationName").unwrap_or_default();
                if recorded != operation_name {
                    return Err(DeterminismViolationError::OperationNameMismatch {
                        sequence,
                        expected: recorded.to_string(),
                        actual: operation_name.clone(),
                    });
                }
            }
            WorkflowCommand::SetState { key, .. } | WorkflowCommand::ClearState { key, .. } => {
                let recorded = event.get_string("key").unwrap_or_default();
                if recorded != key {
                    return Err(DeterminismViolationError::StateKeyMismatch {
                        sequence,
                        expected: recorded.to_string(),
                        actual: key.clone(),
                    });
                }
            }
            // Terminal commands carry no identity beyond their type
            WorkflowCommand::CompleteWorkflow { .. }
            | WorkflowCommand::FailWorkflow { .. }
            | WorkflowCommand::SuspendWorkflow { .. }
            | WorkflowCommand::CancelWorkflow { .. } => {}
        }

        Ok(())
    }

    /// Validate a command sequence against a recorded history.
    pub fn validate_all(
        &self,
        commands: &[WorkflowCommand],
        events: &[ReplayEvent],
    ) -> DeterminismValidationResult {
        for command in commands {
            let index = (command.sequence_number() - 1).max(0) as usize;
            if let Err(violation) = self.validate_command(command, events.get(index)) {
                return DeterminismValidationResult::Invalid(violation);
            }
        }
        DeterminismValidationResult::Valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::event::EventType;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn now() -> chrono::DateTime<Utc> {
        Utc::now()
    }

    fn schedule_cmd(seq: i32, kind: &str) -> WorkflowCommand {
        WorkflowCommand::ScheduleActivity {
            sequence_number: seq,
            kind: kind.to_string(),
            activity_execution_id: Uuid::nil(),
            input: json!({}),
            timeout_ms: None,
            heartbeat_timeout_ms: None,
            max_attempts: None,
        }
    }

    #[test]
    fn test_command_beyond_history_is_valid() {
        let validator = DeterminismValidator::new();
        assert!(validator
            .validate_command(&schedule_cmd(1, "financial-auditor"), None)
            .is_ok());
    }

    #[test]
    fn test_matching_activity_command() {
        let validator = DeterminismValidator::new();
        let event = ReplayEvent::new(
            1,
            EventType::ActivityScheduled,
            json!({"kind": "financial-auditor"}),
            now(),
        );
        assert!(validator
            .validate_command(&schedule_cmd(1, "financial-auditor"), Some(&event))
            .is_ok());
    }

    #[test]
    fn test_kind_mismatch() {
        let validator = DeterminismValidator::new();
        let event = ReplayEvent::new(
            1,
            EventType::ActivityScheduled,
            json!({"kind": "financial-auditor"}),
            now(),
        );
        let err = validator
            .validate_command(&schedule_cmd(1, "pipeline-scout"), Some(&event))
            .unwrap_err();
        assert!(matches!(
            err,
            DeterminismViolationError::ActivityKindMismatch { .. }
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let validator = DeterminismValidator::new();
        let event = ReplayEvent::new(
            1,
            EventType::TimerStarted,
            json!({"timerId": "sleep-1"}),
            now(),
        );
        let err = validator
            .validate_command(&schedule_cmd(1, "financial-auditor"), Some(&event))
            .unwrap_err();
        assert!(matches!(err, DeterminismViolationError::TypeMismatch { .. }));
    }

    #[test]
    fn test_child_workflow_name_mismatch() {
        let validator = DeterminismValidator::new();
        let event = ReplayEvent::new(
            1,
            EventType::ChildWorkflowInitiated,
            json!({"childExecutionName": "pipeline-analysis-BGNE-0", "childWorkflowKind": "pipeline-analysis"}),
            now(),
        );
        let cmd = WorkflowCommand::ScheduleChildWorkflow {
            sequence_number: 1,
            name: "pipeline-analysis-BGNE-1".to_string(),
            kind: "pipeline-analysis".to_string(),
            child_execution_id: Uuid::nil(),
            input: json!({}),
        };
        let err = validator.validate_command(&cmd, Some(&event)).unwrap_err();
        assert!(matches!(
            err,
            DeterminismViolationError::ChildWorkflowMismatch { .. }
        ));
    }

    #[test]
    fn test_state_key_mismatch() {
        let validator = DeterminismValidator::new();
        let event = ReplayEvent::new(
            1,
            EventType::StateSet,
            json!({"key": "progress", "value": {}}),
            now(),
        );
        let cmd = WorkflowCommand::SetState {
            sequence_number: 1,
            key: "status".to_string(),
            value: json!({}),
        };
        let err = validator.validate_command(&cmd, Some(&event)).unwrap_err();
        assert!(matches!(
            err,
            DeterminismViolationError::StateKeyMismatch { .. }
        ));
    }

    #[test]
    fn test_validate_all() {
        let validator = DeterminismValidator::new();
        let events = vec![
            ReplayEvent::new(
                1,
                EventType::ActivityScheduled,
                json!({"kind": "financial-auditor"}),
                now(),
            ),
            ReplayEvent::new(
                2,
                EventType::ActivityScheduled,
                json!({"kind": "pipeline-scout"}),
                now(),
            ),
        ];
        let commands = vec![
            schedule_cmd(1, "financial-auditor"),
            schedule_cmd(2, "pipeline-scout"),
            schedule_cmd(3, "report-generator"),
        ];

        assert_eq!(
            validator.validate_all(&commands, &events),
            DeterminismValidationResult::Valid
        );

        let bad = vec![schedule_cmd(1, "pipeline-scout")];
        assert!(matches!(
            validator.validate_all(&bad, &events),
            DeterminismValidationResult::Invalid(_)
        ));
    }
}
