//! Maintenance activities: cache compensation and failure notification

use crate::activities::AgentDeps;
use crate::cache::CacheKeys;
use crate::errors::{classify, AgentError};
use async_trait::async_trait;
use biovalue_engine::activity::context::ActivityContext;
use biovalue_engine::activity::definition::ActivityDefinition;
use biovalue_engine::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub const CLEANUP_KIND: &str = "cleanup-cache";
pub const NOTIFY_KIND: &str = "notify-compensation-failure";

/// Input for the cache cleanup compensation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CleanupCacheInput {
    pub ticker: String,
    /// Namespace to invalidate: "financials", "pipeline" or "report"
    pub namespace: String,
    /// Drug names needed to enumerate the per-drug keys of the pipeline
    /// namespace
    #[serde(default)]
    pub drug_names: Vec<String>,
}

/// Outcome of a cache cleanup
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CleanupCacheOutput {
    pub deleted: u32,
}

/// Invalidates one cache namespace for a ticker. Idempotent: deleting
/// already-absent keys is a no-op, so the compensation tolerates being
/// called after partial work.
pub struct CleanupCacheActivity {
    deps: Arc<AgentDeps>,
}

impl CleanupCacheActivity {
    pub fn new(deps: Arc<AgentDeps>) -> Self {
        Self { deps }
    }

    fn keys_for(input: &CleanupCacheInput) -> Vec<String> {
        match input.namespace.as_str() {
            "financials" => vec![CacheKeys::financials(&input.ticker)],
            "report" => vec![CacheKeys::report(&input.ticker)],
            "pipeline" => {
                let mut keys = vec![CacheKeys::pipeline_raw(&input.ticker)];
                for drug in &input.drug_names {
                    keys.push(CacheKeys::clinical(&input.ticker, drug));
                    keys.push(CacheKeys::market(&input.ticker, drug));
                }
                keys
            }
            other => vec![CacheKeys::namespace_prefix(&input.ticker, other)],
        }
    }
}

#[async_trait]
impl ActivityDefinition for CleanupCacheActivity {
    type Input = CleanupCacheInput;
    type Output = CleanupCacheOutput;

    fn kind(&self) -> &str {
        CLEANUP_KIND
    }

    fn description(&self) -> Option<&str> {
        Some("Invalidates one cache namespace for a ticker")
    }

    fn start_to_close_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(60))
    }

    async fn execute(
        &self,
        input: Self::Input,
        _ctx: &dyn ActivityContext,
    ) -> Result<Self::Output> {
        let mut deleted = 0u32;
        for key in Self::keys_for(&input) {
            match self.deps.cache.delete(&key).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    return Err(classify(&AgentError::CacheUnavailable(e.to_string()))
                        .into_engine_error())
                }
            }
        }

        info!(
            ticker = %input.ticker,
            namespace = %input.namespace,
            deleted,
            "Cache namespace invalidated"
        );
        Ok(CleanupCacheOutput { deleted })
    }
}

/// Input for the compensation-failure notification
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NotifyCompensationFailureInput {
    pub step: String,
    pub error: String,
}

/// Acknowledgement of the notification
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NotifyCompensationFailureOutput {
    pub acknowledged: bool,
}

/// Flags a failed compensation step for human follow-up.
pub struct NotifyCompensationFailureActivity {
    deps: Arc<AgentDeps>,
}

impl NotifyCompensationFailureActivity {
    pub fn new(deps: Arc<AgentDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl ActivityDefinition for NotifyCompensationFailureActivity {
    type Input = NotifyCompensationFailureInput;
    type Output = NotifyCompensationFailureOutput;

    fn kind(&self) -> &str {
        NOTIFY_KIND
    }

    fn description(&self) -> Option<&str> {
        Some("Flags a failed compensation step for human follow-up")
    }

    fn start_to_close_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(30))
    }

    async fn execute(
        &self,
        input: Self::Input,
        ctx: &dyn ActivityContext,
    ) -> Result<Self::Output> {
        error!(
            step = %input.step,
            error = %input.error,
            "Compensation failed, manual intervention required"
        );

        let now = chrono::Utc::now();
        let entry = crate::dlq::DeadLetterEntry {
            workflow_id: ctx.workflow_execution_id().to_string(),
            activity_name: format!("compensation:{}", input.step),
            error: input.error.clone(),
            input_json: String::new(),
            attempts: 1,
            first_failed_at: now,
            last_failed_at: now,
            trace_context: ctx.workflow_execution_id().to_string(),
        };
        if let Err(e) = self.deps.dlq.enqueue(entry).await {
            tracing::warn!(error = %e, "Failed to dead-letter compensation failure");
        } else {
            self.deps.metrics.record_dlq_entry();
        }

        Ok(NotifyCompensationFailureOutput { acknowledged: true })
    }
}
