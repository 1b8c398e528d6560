//! Error types shared across the engine crates

use crate::workflow::event::EventType;

/// Errors raised by the core replay machinery
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Determinism violation detected while replaying a workflow history.
///
/// A violation means the workflow code took a different path on replay than
/// it did originally. This is a bug in the workflow, not a transient fault,
/// so it is never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeterminismViolationError {
    /// The command type does not match the recorded event type at a sequence
    #[error("Type mismatch at sequence {sequence}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        sequence: i32,
        expected: EventType,
        actual: EventType,
    },

    /// An operation was re-run under a different name
    #[error("Operation name mismatch at sequence {sequence}: expected '{expected}', got '{actual}'")]
    OperationNameMismatch {
        sequence: i32,
        expected: String,
        actual: String,
    },

    /// An activity was re-scheduled with a different kind
    #[error("Activity kind mismatch at sequence {sequence}: expected '{expected}', got '{actual}'")]
    ActivityKindMismatch {
        sequence: i32,
        expected: String,
        actual: String,
    },

    /// A timer was re-started with a different id
    #[error("Timer id mismatch at sequence {sequence}: expected '{expected}', got '{actual}'")]
    TimerIdMismatch {
        sequence: i32,
        expected: String,
        actual: String,
    },

    /// A child workflow was re-initiated with a different name or kind
    #[error(
        "Child workflow {field} mismatch at sequence {sequence}: expected '{expected}', got '{actual}'"
    )]
    ChildWorkflowMismatch {
        sequence: i32,
        field: String,
        expected: String,
        actual: String,
    },

    /// A state mutation targeted a different key than the recorded one
    #[error("State key mismatch at sequence {sequence}: expected '{expected}', got '{actual}'")]
    StateKeyMismatch {
        sequence: i32,
        expected: String,
        actual: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determinism_violation_display() {
        let err = DeterminismViolationError::TypeMismatch {
            sequence: 5,
            expected: EventType::OperationCompleted,
            actual: EventType::ActivityScheduled,
        };
        assert!(err.to_string().contains("Type mismatch at sequence 5"));

        let err = DeterminismViolationError::ActivityKindMismatch {
            sequence: 2,
            expected: "financial-auditor".to_string(),
            actual: "pipeline-scout".to_string(),
        };
        assert!(err.to_string().contains("financial-auditor"));
        assert!(err.to_string().contains("pipeline-scout"));
    }

    #[test]
    fn test_core_error_from_serde() {
        let bad: Result<serde_json::Value, _> = serde_json::from_str("not json");
        let err: CoreError = bad.unwrap_err().into();
        assert!(matches!(err, CoreError::Serialization(_)));
    }
}
