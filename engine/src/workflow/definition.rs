//! WorkflowDefinition trait

use crate::error::Result;
use crate::workflow::context::WorkflowContext;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// Definition of a workflow with typed input and output
#[async_trait]
pub trait WorkflowDefinition: Send + Sync {
    /// Input type for the workflow
    type Input: Serialize + DeserializeOwned + Send;
    /// Output type for the workflow
    type Output: Serialize + DeserializeOwned + Send;

    /// Unique identifier for this workflow type
    fn kind(&self) -> &str;

    /// Execute the workflow with the given context and input
    async fn execute(&self, ctx: &dyn WorkflowContext, input: Self::Input) -> Result<Self::Output>;

    /// Human-readable name for the workflow (defaults to kind)
    fn name(&self) -> &str {
        self.kind()
    }

    /// Optional description of the workflow
    fn description(&self) -> Option<&str> {
        None
    }

    /// Timeout in seconds for the entire workflow (None = no timeout)
    fn timeout_seconds(&self) -> Option<u32> {
        None
    }

    /// Whether this workflow can be cancelled
    fn cancellable(&self) -> bool {
        false
    }

    /// Tags for categorizing the workflow
    fn tags(&self) -> Vec<String> {
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    struct EchoWorkflow;

    #[async_trait]
    impl WorkflowDefinition for EchoWorkflow {
        type Input = Value;
        type Output = Value;

        fn kind(&self) -> &str {
            "echo"
        }

        async fn execute(
            &self,
            _ctx: &dyn WorkflowContext,
            input: Self::Input,
        ) -> Result<Self::Output> {
            Ok(input)
        }

        fn cancellable(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_defaults() {
        let workflow = EchoWorkflow;
        assert_eq!(workflow.kind(), "echo");
        assert_eq!(workflow.name(), "echo");
        assert!(workflow.description().is_none());
        assert!(workflow.timeout_seconds().is_none());
        assert!(workflow.cancellable());
        assert!(workflow.tags().is_empty());
    }
}
