//! Agent activities
//!
//! Each agent is a separately-registered named activity; workflows select
//! agents by name, never by polymorphism. Every cacheable agent follows
//! the same algorithm: compute the deterministic key, return a cache hit,
//! otherwise heartbeat, call the LLM collaborator, validate the artifact,
//! write it back with the namespace TTL, and return it.

pub mod clinical;
pub mod financial;
pub mod maintenance;
pub mod market;
pub mod pipeline;
pub mod report;
pub mod valuation;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::dlq::{DeadLetterEntry, DeadLetterQueue};
use crate::errors::{classify, AgentError};
use crate::llm::{InferRequest, LlmClient};
use crate::metrics::WorkerMetrics;
use biovalue_engine::activity::registry::ActivityRegistry;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Shared dependencies injected into every agent activity
pub struct AgentDeps {
    pub config: Config,
    pub llm: Arc<dyn LlmClient>,
    pub cache: Arc<dyn CacheStore>,
    pub metrics: Arc<WorkerMetrics>,
    pub dlq: Arc<DeadLetterQueue>,
}

impl AgentDeps {
    pub fn new(
        config: Config,
        llm: Arc<dyn LlmClient>,
        cache: Arc<dyn CacheStore>,
        metrics: Arc<WorkerMetrics>,
    ) -> Arc<Self> {
        let dlq = Arc::new(DeadLetterQueue::new(
            Arc::clone(&cache),
            &config.dlq.stream,
            config.dlq.alert_threshold,
        ));
        Arc::new(Self {
            config,
            llm,
            cache,
            metrics,
            dlq,
        })
    }
}

/// Register all agent and maintenance activities
pub fn register_all(
    registry: &ActivityRegistry,
    deps: Arc<AgentDeps>,
) -> biovalue_engine::Result<()> {
    registry.register(financial::FinancialAuditorActivity::new(Arc::clone(&deps)))?;
    registry.register(pipeline::PipelineScoutActivity::new(Arc::clone(&deps)))?;
    registry.register(clinical::ClinicalAssessorActivity::new(Arc::clone(&deps)))?;
    registry.register(market::MarketStrategistActivity::new(Arc::clone(&deps)))?;
    registry.register(valuation::ValuationActuaryActivity::new(Arc::clone(&deps)))?;
    registry.register(report::ReportGeneratorActivity::new(Arc::clone(&deps)))?;
    registry.register(maintenance::CleanupCacheActivity::new(Arc::clone(&deps)))?;
    registry.register(maintenance::NotifyCompensationFailureActivity::new(deps))?;
    Ok(())
}

/// Look up a typed artifact in the cache. Corrupted bytes count as a miss.
pub(crate) async fn cached_artifact<T: DeserializeOwned>(
    deps: &AgentDeps,
    key: &str,
) -> Option<T> {
    let cached = match deps.cache.get(key).await {
        Ok(cached) => cached?,
        Err(e) => {
            // Cache unavailability bypasses the cache, not the activity
            warn!(key, error = %e, "Cache read failed, treating as miss");
            return None;
        }
    };

    match serde_json::from_str(&cached) {
        Ok(artifact) => {
            debug!(key, "Cache hit");
            deps.metrics.record_cache_hit();
            Some(artifact)
        }
        Err(e) => {
            warn!(key, error = %e, "Corrupted cache entry, treating as miss");
            None
        }
    }
}

/// Write a typed artifact to the cache. Failures only warn: the artifact
/// is already durable in the event log.
pub(crate) async fn store_artifact<T: Serialize>(
    deps: &AgentDeps,
    key: &str,
    artifact: &T,
    ttl: Duration,
) {
    let bytes = match serde_json::to_string(artifact) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(key, error = %e, "Failed to serialize artifact for cache");
            return;
        }
    };
    if let Err(e) = deps.cache.set(key, &bytes, ttl).await {
        warn!(key, error = %e, "Failed to cache artifact");
    }
}

/// Strip a markdown code fence if the model wrapped its JSON in one
fn extract_json(answer: &str) -> &str {
    let trimmed = answer.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Run one inference and parse the structured answer.
///
/// A schema mismatch gets one bounded retry with the identical prompt;
/// a second mismatch is an L2 hallucination, dead-lettered for human
/// review.
pub(crate) async fn infer_artifact<T: DeserializeOwned>(
    deps: &AgentDeps,
    workflow_execution_id: Uuid,
    activity_name: &str,
    request: InferRequest,
) -> Result<T, AgentError> {
    let mut last_parse_error = String::new();

    for attempt in 1..=2u32 {
        deps.metrics.record_llm_call();
        let response = deps.llm.infer(&request).await?;

        match serde_json::from_str(extract_json(&response.final_answer)) {
            Ok(artifact) => return Ok(artifact),
            Err(e) => {
                last_parse_error = e.to_string();
                warn!(
                    activity_name,
                    attempt,
                    error = %last_parse_error,
                    "LLM answer failed schema parse"
                );
            }
        }
    }

    let error = AgentError::Hallucination(format!(
        "{} answer failed schema parse: {}",
        activity_name, last_parse_error
    ));

    let now = Utc::now();
    let entry = DeadLetterEntry {
        workflow_id: workflow_execution_id.to_string(),
        activity_name: activity_name.to_string(),
        error: classify(&error).to_string(),
        input_json: serde_json::to_string(&request).unwrap_or_default(),
        attempts: 2,
        first_failed_at: now,
        last_failed_at: now,
        trace_context: request.trace_id.clone(),
    };
    if let Err(e) = deps.dlq.enqueue(entry).await {
        warn!(error = %e, "Failed to dead-letter hallucination");
    } else {
        deps.metrics.record_dlq_entry();
    }

    Err(error)
}
