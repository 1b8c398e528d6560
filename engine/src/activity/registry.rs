//! ActivityRegistry - registry for activity definitions

use crate::activity::context::ActivityContext;
use crate::activity::definition::{ActivityDefinition, RetryPolicy};
use crate::error::{EngineError, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Activity metadata extracted from a definition
#[derive(Debug, Clone)]
pub struct ActivityMetadata {
    /// Unique activity kind identifier
    pub kind: String,
    /// Human-readable name
    pub name: String,
    /// Description of the activity
    pub description: Option<String>,
    /// Start-to-close timeout
    pub start_to_close_timeout: Option<Duration>,
    /// Heartbeat timeout
    pub heartbeat_timeout: Option<Duration>,
    /// Retry policy
    pub retry_policy: RetryPolicy,
    /// Tags for categorization
    pub tags: Vec<String>,
    /// JSON Schema for input validation (auto-generated)
    pub input_schema: Option<Value>,
    /// JSON Schema for output validation (auto-generated)
    pub output_schema: Option<Value>,
}

/// Type alias for boxed activity execution functions
pub type BoxedActivityFn = Box<
    dyn Fn(
            Value,
            Arc<dyn ActivityContext + Send + Sync>,
        ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>>
        + Send
        + Sync,
>;

/// A registered activity with its metadata and execution function
pub struct RegisteredActivity {
    /// Activity metadata
    pub metadata: ActivityMetadata,
    execute_fn: BoxedActivityFn,
}

impl RegisteredActivity {
    /// Create a new registered activity
    pub fn new(metadata: ActivityMetadata, execute_fn: BoxedActivityFn) -> Self {
        Self {
            metadata,
            execute_fn,
        }
    }

    /// Execute the activity
    pub async fn execute(
        &self,
        input: Value,
        ctx: Arc<dyn ActivityContext + Send + Sync>,
    ) -> Result<Value> {
        (self.execute_fn)(input, ctx).await
    }
}

impl std::fmt::Debug for RegisteredActivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredActivity")
            .field("metadata", &self.metadata)
            .field("execute_fn", &"<function>")
            .finish()
    }
}

/// Registry for code-first activity definitions.
/// Workers register their activity implementations here.
#[derive(Default)]
pub struct ActivityRegistry {
    activities: RwLock<HashMap<String, Arc<RegisteredActivity>>>,
}

impl ActivityRegistry {
    /// Create a new empty activity registry
    pub fn new() -> Self {
        Self {
            activities: RwLock::new(HashMap::new()),
        }
    }

    /// Register an activity with metadata and execution function
    pub fn register_raw(&self, activity: RegisteredActivity) -> Result<()> {
        let kind = activity.metadata.kind.clone();
        let mut activities = self.activities.write();

        if activities.contains_key(&kind) {
            return Err(EngineError::InvalidConfiguration(format!(
                "Activity '{}' is already registered. Each activity kind must be unique within a worker.",
                kind
            )));
        }

        activities.insert(kind, Arc::new(activity));
        Ok(())
    }

    /// Register an activity definition.
    ///
    /// Schemas are auto-generated from the Input/Output types.
    pub fn register<A, I, O>(&self, activity: A) -> Result<()>
    where
        A: ActivityDefinition<Input = I, Output = O> + 'static,
        I: Serialize + DeserializeOwned + schemars::JsonSchema + Send + 'static,
        O: Serialize + DeserializeOwned + schemars::JsonSchema + Send + 'static,
    {
        let metadata = ActivityMetadata {
            kind: activity.kind().to_string(),
            name: activity.name().to_string(),
            description: activity.description().map(|s| s.to_string()),
            start_to_close_timeout: activity.start_to_close_timeout(),
            heartbeat_timeout: activity.heartbeat_timeout(),
            retry_policy: activity.retry_policy(),
            tags: activity.tags(),
            input_schema: serde_json::to_value(schemars::schema_for!(I)).ok(),
            output_schema: serde_json::to_value(schemars::schema_for!(O)).ok(),
        };

        let activity = Arc::new(activity);

        let execute_fn: BoxedActivityFn = Box::new(move |input, ctx| {
            let activity = Arc::clone(&activity);
            Box::pin(async move {
                let typed_input: I =
                    serde_json::from_value(input).map_err(EngineError::Serialization)?;
                let output = activity.execute(typed_input, ctx.as_ref()).await?;
                serde_json::to_value(output).map_err(EngineError::Serialization)
            })
        });

        self.register_raw(RegisteredActivity::new(metadata, execute_fn))
    }

    /// Get a registered activity by kind
    pub fn get(&self, kind: &str) -> Option<Arc<RegisteredActivity>> {
        self.activities.read().get(kind).cloned()
    }

    /// Check if an activity kind is registered
    pub fn has(&self, kind: &str) -> bool {
        self.activities.read().contains_key(kind)
    }

    /// Get all registered activity kinds
    pub fn registered_kinds(&self) -> Vec<String> {
        self.activities.read().keys().cloned().collect()
    }

    /// Get the number of registered activities
    pub fn len(&self) -> usize {
        self.activities.read().len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.activities.read().is_empty()
    }
}

impl std::fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityRegistry")
            .field("activities", &self.registered_kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockActivityContext;
    use async_trait::async_trait;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    struct DoubleInput {
        n: i64,
    }

    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    struct DoubleOutput {
        n: i64,
    }

    struct DoubleActivity;

    #[async_trait]
    impl ActivityDefinition for DoubleActivity {
        type Input = DoubleInput;
        type Output = DoubleOutput;

        fn kind(&self) -> &str {
            "double"
        }

        async fn execute(
            &self,
            input: Self::Input,
            _ctx: &dyn ActivityContext,
        ) -> Result<Self::Output> {
            Ok(DoubleOutput { n: input.n * 2 })
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ActivityRegistry::new();
        registry.register(DoubleActivity).unwrap();

        assert!(registry.has("double"));
        assert!(!registry.has("triple"));
        assert_eq!(registry.len(), 1);

        let registered = registry.get("double").unwrap();
        assert_eq!(registered.metadata.kind, "double");
        assert!(registered.metadata.input_schema.is_some());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = ActivityRegistry::new();
        registry.register(DoubleActivity).unwrap();
        assert!(registry.register(DoubleActivity).is_err());
    }

    #[tokio::test]
    async fn test_execute_through_registry() {
        let registry = ActivityRegistry::new();
        registry.register(DoubleActivity).unwrap();

        let registered = registry.get("double").unwrap();
        let ctx = Arc::new(MockActivityContext::new());
        let output = registered
            .execute(serde_json::json!({"n": 21}), ctx)
            .await
            .unwrap();
        assert_eq!(output, serde_json::json!({"n": 42}));
    }

    #[tokio::test]
    async fn test_execute_with_bad_input_fails() {
        let registry = ActivityRegistry::new();
        registry.register(DoubleActivity).unwrap();

        let registered = registry.get("double").unwrap();
        let ctx = Arc::new(MockActivityContext::new());
        let result = registered
            .execute(serde_json::json!({"wrong": true}), ctx)
            .await;
        assert!(matches!(result, Err(EngineError::Serialization(_))));
    }
}
