//! Workflow event types for replay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event types that can be recorded during workflow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    // Workflow lifecycle events
    WorkflowStarted,
    WorkflowCompleted,
    WorkflowExecutionFailed,
    WorkflowSuspended,
    WorkflowCancelled,
    CancellationRequested,

    // Operation events (cached side effects)
    OperationCompleted,

    // State events
    StateSet,
    StateCleared,

    // Activity events
    ActivityScheduled,
    ActivityCompleted,
    ActivityFailed,
    ActivityCancelled,

    // Signal events
    SignalReceived,
    SignalConsumed,

    // Child workflow events
    ChildWorkflowInitiated,
    ChildWorkflowCompleted,
    ChildWorkflowFailed,
    ChildWorkflowCancelled,

    // Timer events
    TimerStarted,
    TimerFired,
    TimerCancelled,
}

impl EventType {
    /// Check if this event type is a terminal workflow event
    pub fn is_workflow_terminal(&self) -> bool {
        matches!(
            self,
            Self::WorkflowCompleted | Self::WorkflowExecutionFailed | Self::WorkflowCancelled
        )
    }

    /// Check if this event type is a terminal activity event
    pub fn is_activity_terminal(&self) -> bool {
        matches!(
            self,
            Self::ActivityCompleted | Self::ActivityFailed | Self::ActivityCancelled
        )
    }

    /// Check if this event type is a terminal child workflow event
    pub fn is_child_workflow_terminal(&self) -> bool {
        matches!(
            self,
            Self::ChildWorkflowCompleted | Self::ChildWorkflowFailed | Self::ChildWorkflowCancelled
        )
    }

    /// Get the string representation used in the persisted event log
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkflowStarted => "WORKFLOW_STARTED",
            Self::WorkflowCompleted => "WORKFLOW_COMPLETED",
            Self::WorkflowExecutionFailed => "WORKFLOW_EXECUTION_FAILED",
            Self::WorkflowSuspended => "WORKFLOW_SUSPENDED",
            Self::WorkflowCancelled => "WORKFLOW_CANCELLED",
            Self::CancellationRequested => "CANCELLATION_REQUESTED",
            Self::OperationCompleted => "OPERATION_COMPLETED",
            Self::StateSet => "STATE_SET",
            Self::StateCleared => "STATE_CLEARED",
            Self::ActivityScheduled => "ACTIVITY_SCHEDULED",
            Self::ActivityCompleted => "ACTIVITY_COMPLETED",
            Self::ActivityFailed => "ACTIVITY_FAILED",
            Self::ActivityCancelled => "ACTIVITY_CANCELLED",
            Self::SignalReceived => "SIGNAL_RECEIVED",
            Self::SignalConsumed => "SIGNAL_CONSUMED",
            Self::ChildWorkflowInitiated => "CHILD_WORKFLOW_INITIATED",
            Self::ChildWorkflowCompleted => "CHILD_WORKFLOW_COMPLETED",
            Self::ChildWorkflowFailed => "CHILD_WORKFLOW_FAILED",
            Self::ChildWorkflowCancelled => "CHILD_WORKFLOW_CANCELLED",
            Self::TimerStarted => "TIMER_STARTED",
            Self::TimerFired => "TIMER_FIRED",
            Self::TimerCancelled => "TIMER_CANCELLED",
        }
    }
}

/// A replay event from the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayEvent {
    /// Sequence number of this event (1-indexed)
    #[serde(rename = "sequenceNumber")]
    sequence_number: i32,

    /// Type of the event
    #[serde(rename = "type")]
    event_type: EventType,

    /// Event data (varies by event type)
    data: Value,

    /// Timestamp of the event
    #[serde(rename = "timestamp")]
    timestamp: DateTime<Utc>,
}

impl ReplayEvent {
    /// Create a new replay event
    pub fn new(
        sequence_number: i32,
        event_type: EventType,
        data: Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            sequence_number,
            event_type,
            data,
            timestamp,
        }
    }

    /// Get the sequence number
    pub fn sequence_number(&self) -> i32 {
        self.sequence_number
    }

    /// Get the event type
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Get the timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Get a field from the event data as a string
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Get a field from the event data as an i64
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(|v| v.as_i64())
    }

    /// Get a field from the event data
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get the data value
    pub fn data(&self) -> &Value {
        &self.data
    }

    // === Builder methods for setting event data fields ===

    /// Set the operation name in the event data
    pub fn with_operation_name(mut self, name: String) -> Self {
        if let Value::Object(ref mut map) = self.data {
            map.insert("operationName".to_string(), Value::String(name));
        }
        self
    }

    /// Set the result in the event data
    pub fn with_result(mut self, result: Value) -> Self {
        if let Value::Object(ref mut map) = self.data {
            map.insert("result".to_string(), result);
        }
        self
    }

    /// Set the state key in the event data
    pub fn with_state_key(mut self, key: String) -> Self {
        if let Value::Object(ref mut map) = self.data {
            map.insert("key".to_string(), Value::String(key));
        }
        self
    }

    /// Set the activity kind in the event data
    pub fn with_activity_kind(mut self, kind: String) -> Self {
        if let Value::Object(ref mut map) = self.data {
            map.insert("kind".to_string(), Value::String(kind));
        }
        self
    }

    /// Set the timer id in the event data
    pub fn with_timer_id(mut self, timer_id: String) -> Self {
        if let Value::Object(ref mut map) = self.data {
            map.insert("timerId".to_string(), Value::String(timer_id));
        }
        self
    }

    /// Set the signal name in the event data
    pub fn with_signal_name(mut self, name: String) -> Self {
        if let Value::Object(ref mut map) = self.data {
            map.insert("signalName".to_string(), Value::String(name));
        }
        self
    }

    /// Set the child workflow name in the event data
    pub fn with_child_workflow_name(mut self, name: String) -> Self {
        if let Value::Object(ref mut map) = self.data {
            map.insert("childExecutionName".to_string(), Value::String(name));
        }
        self
    }

    /// Set the child workflow kind in the event data
    pub fn with_child_workflow_kind(mut self, kind: String) -> Self {
        if let Value::Object(ref mut map) = self.data {
            map.insert("childWorkflowKind".to_string(), Value::String(kind));
        }
        self
    }

    /// Set the error in the event data
    pub fn with_error(mut self, error: String) -> Self {
        if let Value::Object(ref mut map) = self.data {
            map.insert("error".to_string(), Value::String(error));
        }
        self
    }
}
