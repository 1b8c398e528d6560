//! Command recording for workflow execution

use crate::error::DeterminismViolationError;
use crate::worker::determinism::DeterminismValidator;
use crate::workflow::command::WorkflowCommand;
use crate::workflow::event::ReplayEvent;

/// Trait for recording workflow commands during execution.
/// Implementations can validate commands against state machine rules.
pub trait CommandRecorder: Send + Sync {
    /// Record a command generated during workflow execution.
    /// Returns an error if the command violates determinism rules.
    fn record_command(&mut self, command: WorkflowCommand)
        -> Result<(), DeterminismViolationError>;

    /// Get all recorded commands
    fn get_commands(&self) -> Vec<WorkflowCommand>;

    /// Take all recorded commands (clears the internal list)
    fn take_commands(&mut self) -> Vec<WorkflowCommand>;

    /// Get the number of recorded commands
    fn command_count(&self) -> usize {
        self.get_commands().len()
    }
}

/// Simple command collector that records commands without validation.
/// Used for fresh workflow execution (no replay).
#[derive(Debug, Default)]
pub struct CommandCollector {
    commands: Vec<WorkflowCommand>,
}

impl CommandCollector {
    /// Create a new command collector
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }
}

impl CommandRecorder for CommandCollector {
    fn record_command(
        &mut self,
        command: WorkflowCommand,
    ) -> Result<(), DeterminismViolationError> {
        self.commands.push(command);
        Ok(())
    }

    fn get_commands(&self) -> Vec<WorkflowCommand> {
        self.commands.clone()
    }

    fn take_commands(&mut self) -> Vec<WorkflowCommand> {
        std::mem::take(&mut self.commands)
    }

    fn command_count(&self) -> usize {
        self.commands.len()
    }
}

/// Validating recorder that checks each command against the historical
/// event at the same sequence position. Used for workflow replay to detect
/// determinism violations.
#[derive(Debug)]
pub struct ValidatingCommandRecorder {
    validator: DeterminismValidator,
    existing_events: Vec<ReplayEvent>,
    commands: Vec<WorkflowCommand>,
}

impl ValidatingCommandRecorder {
    /// Create a new validating command recorder
    pub fn new(validator: DeterminismValidator, existing_events: Vec<ReplayEvent>) -> Self {
        Self {
            validator,
            existing_events,
            commands: Vec::new(),
        }
    }

    /// Get the existing events being validated against
    pub fn existing_events(&self) -> &[ReplayEvent] {
        &self.existing_events
    }
}

impl CommandRecorder for ValidatingCommandRecorder {
    fn record_command(
        &mut self,
        command: WorkflowCommand,
    ) -> Result<(), DeterminismViolationError> {
        let event_index = (command.sequence_number() - 1).max(0) as usize;
        let event = self.existing_events.get(event_index);

        self.validator.validate_command(&command, event)?;

        self.commands.push(command);
        Ok(())
    }

    fn get_commands(&self) -> Vec<WorkflowCommand> {
        self.commands.clone()
    }

    fn take_commands(&mut self) -> Vec<WorkflowCommand> {
        std::mem::take(&mut self.commands)
    }

    fn command_count(&self) -> usize {
        self.commands.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::event::EventType;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

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
    fn test_collector_records_and_takes() {
        let mut collector = CommandCollector::new();
        collector.record_command(schedule_cmd(1, "a")).unwrap();
        collector.record_command(schedule_cmd(2, "b")).unwrap();

        assert_eq!(collector.command_count(), 2);
        let taken = collector.take_commands();
        assert_eq!(taken.len(), 2);
        assert_eq!(collector.command_count(), 0);
    }

    #[test]
    fn test_validating_recorder_accepts_matching_replay() {
        let events = vec![ReplayEvent::new(
            1,
            EventType::ActivityScheduled,
            json!({"kind": "a"}),
            Utc::now(),
        )];
        let mut recorder = ValidatingCommandRecorder::new(DeterminismValidator::new(), events);

        assert!(recorder.record_command(schedule_cmd(1, "a")).is_ok());
        // Past the recorded history: new progress, always valid
        assert!(recorder.record_command(schedule_cmd(2, "b")).is_ok());
        assert_eq!(recorder.command_count(), 2);
    }

    #[test]
    fn test_validating_recorder_rejects_divergence() {
        let events = vec![ReplayEvent::new(
            1,
            EventType::ActivityScheduled,
            json!({"kind": "a"}),
            Utc::now(),
        )];
        let mut recorder = ValidatingCommandRecorder::new(DeterminismValidator::new(), events);

        let err = recorder.record_command(schedule_cmd(1, "z")).unwrap_err();
        assert!(matches!(
            err,
            DeterminismViolationError::ActivityKindMismatch { .. }
        ));
        // Rejected commands are not recorded
        assert_eq!(recorder.command_count(), 0);
    }
}
