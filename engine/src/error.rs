//! Error types for the BioValue engine

// Re-export core error types
pub use biovalue_core::{CoreError, DeterminismViolationError};

/// Main error type for the engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Workflow is suspended waiting for an external event
    /// (activity completion, child workflow, timer, signal)
    #[error("Workflow suspended: {reason}")]
    Suspended { reason: String },

    /// Activity execution failed
    #[error("Activity failed: {0}")]
    ActivityFailed(String),

    /// Activity was cancelled
    #[error("Activity cancelled")]
    ActivityCancelled,

    /// Activity heartbeat was missed
    #[error("Activity heartbeat missed: {0}")]
    HeartbeatMissed(String),

    /// Workflow was cancelled
    #[error("Workflow cancelled: {0}")]
    WorkflowCancelled(String),

    /// Workflow execution failed
    #[error("Workflow failed: {0}")]
    WorkflowFailed(String),

    /// Child workflow failed
    #[error("Child workflow failed: {name} ({execution_id}): {error}")]
    ChildWorkflowFailed {
        execution_id: String,
        name: String,
        error: String,
    },

    /// Determinism violation detected during replay
    #[error("Determinism violation: {0}")]
    DeterminismViolation(DeterminismViolationError),

    /// Non-retryable error (permanent failure)
    #[error("Non-retryable error: {0}")]
    NonRetryable(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Workflow definition not found
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Activity definition not found
    #[error("Activity not found: {0}")]
    ActivityNotFound(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Timer error
    #[error("Timer error: {0}")]
    TimerError(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Serialization(e) => EngineError::Serialization(e),
            CoreError::Io(e) => EngineError::Io(e),
            CoreError::InvalidConfiguration(msg) => EngineError::InvalidConfiguration(msg),
            CoreError::Other(msg) => EngineError::Other(msg),
        }
    }
}

impl EngineError {
    /// Whether the activity runtime may retry after this error
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            EngineError::NonRetryable(_)
                | EngineError::InvalidConfiguration(_)
                | EngineError::WorkflowNotFound(_)
                | EngineError::ActivityNotFound(_)
                | EngineError::DeterminismViolation(_)
                | EngineError::ActivityCancelled
                | EngineError::WorkflowCancelled(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biovalue_core::EventType;

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::Suspended {
            reason: "Waiting for activity".to_string(),
        };
        assert_eq!(err.to_string(), "Workflow suspended: Waiting for activity");

        let err = EngineError::ChildWorkflowFailed {
            execution_id: "abc".to_string(),
            name: "valuation-BGNE".to_string(),
            error: "config invalid".to_string(),
        };
        assert!(err.to_string().contains("valuation-BGNE"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(EngineError::ActivityFailed("boom".to_string()).is_retryable());
        assert!(EngineError::Timeout("slow".to_string()).is_retryable());
        assert!(EngineError::HeartbeatMissed("stuck".to_string()).is_retryable());
        assert!(!EngineError::NonRetryable("fatal".to_string()).is_retryable());
        assert!(!EngineError::ActivityCancelled.is_retryable());
        assert!(!EngineError::DeterminismViolation(DeterminismViolationError::TypeMismatch {
            sequence: 1,
            expected: EventType::OperationCompleted,
            actual: EventType::ActivityScheduled,
        })
        .is_retryable());
    }

    #[test]
    fn test_error_from_serde_json() {
        let result: std::result::Result<serde_json::Value, serde_json::Error> =
            serde_json::from_str("invalid json");
        let err: EngineError = result.unwrap_err().into();
        assert!(matches!(err, EngineError::Serialization(_)));
    }
}
