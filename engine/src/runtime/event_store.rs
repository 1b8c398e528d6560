//! Event store abstraction for workflow histories
//!
//! Each workflow execution owns an append-only history. The store is the
//! durability boundary: a crashed worker resumes by reloading the history
//! and replaying it. The in-memory backend is used by the worker binary and
//! tests; alternative backends implement the same trait.

use crate::error::{EngineError, Result};
use biovalue_core::{EventType, ReplayEvent};
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Descriptor of one workflow execution
#[derive(Debug, Clone)]
pub struct ExecutionDescriptor {
    /// Unique execution id
    pub execution_id: Uuid,
    /// Caller-supplied workflow id (deterministic, human-readable)
    pub workflow_id: String,
    /// Workflow kind to execute
    pub kind: String,
    /// Workflow input
    pub input: Value,
    /// Parent execution for child workflows
    pub parent_execution_id: Option<Uuid>,
}

/// Append-only storage of workflow histories
pub trait EventStore: Send + Sync {
    /// Register a new execution. Fails if the id is already taken.
    fn create_execution(&self, descriptor: ExecutionDescriptor) -> Result<()>;

    /// Look up an execution descriptor
    fn execution(&self, execution_id: Uuid) -> Option<ExecutionDescriptor>;

    /// Append an event to an execution's history, assigning the next
    /// sequence number and a timestamp. Returns the stored event.
    fn append(&self, execution_id: Uuid, event_type: EventType, data: Value)
        -> Result<ReplayEvent>;

    /// Load the full history of an execution
    fn history(&self, execution_id: Uuid) -> Vec<ReplayEvent>;

    /// List all known executions
    fn executions(&self) -> Vec<ExecutionDescriptor>;
}

/// In-memory event store backend.
///
/// All histories live in thread-safe maps; data is lost when the store is
/// dropped. Sharing one store instance across runtime restarts is what the
/// crash-resume tests rely on.
#[derive(Default)]
pub struct InMemoryEventStore {
    executions: RwLock<HashMap<Uuid, ExecutionDescriptor>>,
    histories: RwLock<HashMap<Uuid, Vec<ReplayEvent>>>,
}

impl InMemoryEventStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn create_execution(&self, descriptor: ExecutionDescriptor) -> Result<()> {
        let mut executions = self.executions.write();
        if executions.contains_key(&descriptor.execution_id) {
            return Err(EngineError::InvalidConfiguration(format!(
                "Execution already exists: {}",
                descriptor.execution_id
            )));
        }
        self.histories
            .write()
            .insert(descriptor.execution_id, Vec::new());
        executions.insert(descriptor.execution_id, descriptor);
        Ok(())
    }

    fn execution(&self, execution_id: Uuid) -> Option<ExecutionDescriptor> {
        self.executions.read().get(&execution_id).cloned()
    }

    fn append(
        &self,
        execution_id: Uuid,
        event_type: EventType,
        data: Value,
    ) -> Result<ReplayEvent> {
        let mut histories = self.histories.write();
        let history = histories.get_mut(&execution_id).ok_or_else(|| {
            EngineError::Other(format!("Unknown execution: {}", execution_id))
        })?;
        let event = ReplayEvent::new(
            (history.len() as i32) + 1,
            event_type,
            data,
            Utc::now(),
        );
        history.push(event.clone());
        Ok(event)
    }

    fn history(&self, execution_id: Uuid) -> Vec<ReplayEvent> {
        self.histories
            .read()
            .get(&execution_id)
            .cloned()
            .unwrap_or_default()
    }

    fn executions(&self) -> Vec<ExecutionDescriptor> {
        self.executions.read().values().cloned().collect()
    }
}
