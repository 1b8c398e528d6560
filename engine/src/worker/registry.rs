//! WorkflowRegistry - registry for workflow definitions

use crate::error::{EngineError, Result};
use crate::workflow::context::WorkflowContext;
use crate::workflow::definition::WorkflowDefinition;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Workflow metadata extracted from a workflow definition
#[derive(Debug, Clone)]
pub struct WorkflowMetadata {
    /// Unique workflow kind identifier
    pub kind: String,
    /// Human-readable name
    pub name: String,
    /// Description of the workflow
    pub description: Option<String>,
    /// Tags for categorization
    pub tags: Vec<String>,
    /// Whether the workflow can be cancelled
    pub cancellable: bool,
    /// Timeout in seconds
    pub timeout_seconds: Option<u64>,
    /// JSON Schema for input validation (auto-generated)
    pub input_schema: Option<Value>,
    /// JSON Schema for output validation (auto-generated)
    pub output_schema: Option<Value>,
}

/// Type alias for boxed workflow execution functions
pub type BoxedWorkflowFn = Box<
    dyn Fn(
            Arc<dyn WorkflowContext + Send + Sync>,
            Value,
        ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>>
        + Send
        + Sync,
>;

/// A registered workflow with its metadata and execution function
pub struct RegisteredWorkflow {
    /// Workflow metadata
    pub metadata: WorkflowMetadata,
    execute_fn: BoxedWorkflowFn,
}

impl RegisteredWorkflow {
    /// Create a new registered workflow
    pub fn new(metadata: WorkflowMetadata, execute_fn: BoxedWorkflowFn) -> Self {
        Self {
            metadata,
            execute_fn,
        }
    }

    /// Execute the workflow
    pub fn execute(
        &self,
        ctx: Arc<dyn WorkflowContext + Send + Sync>,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> {
        (self.execute_fn)(ctx, input)
    }
}

impl std::fmt::Debug for RegisteredWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredWorkflow")
            .field("metadata", &self.metadata)
            .field("execute_fn", &"<function>")
            .finish()
    }
}

/// Registry for code-first workflow definitions.
/// Workers register their workflow implementations here.
#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: RwLock<HashMap<String, Arc<RegisteredWorkflow>>>,
}

impl WorkflowRegistry {
    /// Create a new empty workflow registry
    pub fn new() -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
        }
    }

    /// Register a workflow with metadata and execution function
    pub fn register_raw(&self, workflow: RegisteredWorkflow) -> Result<()> {
        let kind = workflow.metadata.kind.clone();
        let mut workflows = self.workflows.write();

        if workflows.contains_key(&kind) {
            return Err(EngineError::InvalidConfiguration(format!(
                "Workflow '{}' is already registered. Each workflow kind must be unique within a worker.",
                kind
            )));
        }

        workflows.insert(kind, Arc::new(workflow));
        Ok(())
    }

    /// Register a workflow definition.
    ///
    /// Schemas are auto-generated from the Input/Output types.
    pub fn register<W, I, O>(&self, workflow: W) -> Result<()>
    where
        W: WorkflowDefinition<Input = I, Output = O> + 'static,
        I: Serialize + DeserializeOwned + schemars::JsonSchema + Send + 'static,
        O: Serialize + DeserializeOwned + schemars::JsonSchema + Send + 'static,
    {
        let metadata = WorkflowMetadata {
            kind: workflow.kind().to_string(),
            name: workflow.name().to_string(),
            description: workflow.description().map(|s| s.to_string()),
            tags: workflow.tags(),
            cancellable: workflow.cancellable(),
            timeout_seconds: workflow.timeout_seconds().map(|s| s as u64),
            input_schema: serde_json::to_value(schemars::schema_for!(I)).ok(),
            output_schema: serde_json::to_value(schemars::schema_for!(O)).ok(),
        };

        let workflow = Arc::new(workflow);

        let execute_fn: BoxedWorkflowFn = Box::new(move |ctx, input| {
            let workflow = Arc::clone(&workflow);
            Box::pin(async move {
                let typed_input: I =
                    serde_json::from_value(input).map_err(EngineError::Serialization)?;
                let output = workflow.execute(ctx.as_ref(), typed_input).await?;
                serde_json::to_value(output).map_err(EngineError::Serialization)
            })
        });

        self.register_raw(RegisteredWorkflow::new(metadata, execute_fn))
    }

    /// Get a registered workflow by kind
    pub fn get(&self, kind: &str) -> Option<Arc<RegisteredWorkflow>> {
        self.workflows.read().get(kind).cloned()
    }

    /// Check if a workflow kind is registered
    pub fn has(&self, kind: &str) -> bool {
        self.workflows.read().contains_key(kind)
    }

    /// Get all registered workflow kinds
    pub fn registered_kinds(&self) -> Vec<String> {
        self.workflows.read().keys().cloned().collect()
    }

    /// Get the number of registered workflows
    pub fn len(&self) -> usize {
        self.workflows.read().len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.workflows.read().is_empty()
    }
}

impl std::fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("workflows", &self.registered_kinds())
            .finish()
    }
}
