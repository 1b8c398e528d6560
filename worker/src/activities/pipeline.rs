//! Pipeline scout agent
//!
//! Scans public sources for the company's drug pipelines. The cached scan
//! carries a data_as_of stamp; entries older than the freshness window are
//! treated as expired even when the cache TTL has not elapsed.

use crate::activities::{cached_artifact, infer_artifact, store_artifact, AgentDeps};
use crate::artifacts::{PipelineResult, PipelineScoutInput};
use crate::cache::CacheKeys;
use crate::errors::classify;
use crate::llm::{InferRequest, Tool};
use async_trait::async_trait;
use biovalue_engine::activity::context::ActivityContext;
use biovalue_engine::activity::definition::{ActivityDefinition, RetryPolicy};
use biovalue_engine::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

pub const KIND: &str = "pipeline-scout";

const SYSTEM_PROMPT: &str = "You are a drug pipeline researcher. Your duty is to scan and \
structure a company's development pipeline. Only rely on trustworthy sources: the company \
website, ClinicalTrials.gov and official registries. Extracted data must be accurate and \
complete.";

/// Pipeline scout activity
pub struct PipelineScoutActivity {
    deps: Arc<AgentDeps>,
}

impl PipelineScoutActivity {
    pub fn new(deps: Arc<AgentDeps>) -> Self {
        Self { deps }
    }

    fn build_prompt(input: &PipelineScoutInput) -> String {
        format!(
            "Search for and extract the development pipeline of the company with ticker {}.\n\
             For each drug program extract:\n\
             1. drug_name\n\
             2. target\n\
             3. indication\n\
             4. phase (Preclinical/Phase1/Phase1_2/Phase2/Phase2_3/Phase3/Approved)\n\
             5. modality (small molecule / antibody / ADC / CAR-T / mRNA / ...)\n\
             6. nct_id when available\n\n\
             Answer as a JSON object with fields ticker and pipelines \
             (array of the objects above).",
            input.ticker
        )
    }

    /// Freshness override: a cached scan counts only while its data is
    /// younger than the configured window.
    fn is_fresh(&self, cached: &PipelineResult) -> bool {
        match cached.data_as_of {
            Some(data_as_of) => {
                Utc::now() - data_as_of < self.deps.config.cache.pipeline_freshness()
            }
            None => false,
        }
    }
}

#[async_trait]
impl ActivityDefinition for PipelineScoutActivity {
    type Input = PipelineScoutInput;
    type Output = PipelineResult;

    fn kind(&self) -> &str {
        KIND
    }

    fn description(&self) -> Option<&str> {
        Some("Scans public sources for the company's drug pipelines")
    }

    fn start_to_close_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(600))
    }

    fn heartbeat_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(30))
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.deps.config.engine.retry.policy(5)
    }

    async fn execute(
        &self,
        input: Self::Input,
        ctx: &dyn ActivityContext,
    ) -> Result<Self::Output> {
        let started = Instant::now();
        let cache_key = CacheKeys::pipeline_raw(&input.ticker);

        if let Some(cached) = cached_artifact::<PipelineResult>(&self.deps, &cache_key).await {
            if self.is_fresh(&cached) {
                return Ok(cached);
            }
            info!(ticker = %input.ticker, "Cached pipeline scan is stale, rescanning");
        }
        self.deps.metrics.record_cache_miss();

        ctx.record_heartbeat("Scanning drug pipelines...");

        let request = InferRequest {
            trace_id: ctx.workflow_execution_id().to_string(),
            agent_id: "A2_PipelineScout".to_string(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: Self::build_prompt(&input),
            enable_tools: true,
            tools: vec![Tool {
                name: "web_search".to_string(),
                mcp_server: "mcp-web-search".to_string(),
            }],
            ..InferRequest::default()
        };

        let mut result: PipelineResult =
            infer_artifact(&self.deps, ctx.workflow_execution_id(), KIND, request)
                .await
                .map_err(|e| {
                    self.deps.metrics.record_activity_failed();
                    classify(&e).into_engine_error()
                })?;

        result.ticker = input.ticker.clone();
        result.data_as_of = Some(Utc::now());

        result.validate().map_err(|e| {
            self.deps.metrics.record_activity_failed();
            classify(&e).into_engine_error()
        })?;

        store_artifact(
            &self.deps,
            &cache_key,
            &result,
            self.deps.config.cache.pipeline(),
        )
        .await;

        self.deps.metrics.record_activity_completed(started.elapsed());
        info!(
            ticker = %input.ticker,
            pipeline_count = result.pipelines.len(),
            "Pipeline scan completed"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{DrugPipeline, Phase};
    use crate::cache::InMemoryCacheStore;
    use crate::config::Config;
    use crate::llm::{InferResponse, LlmClient, ResponseStatus, Usage};
    use crate::metrics::WorkerMetrics;

    struct NoopLlm;

    #[async_trait]
    impl LlmClient for NoopLlm {
        async fn infer(
            &self,
            _request: &InferRequest,
        ) -> std::result::Result<InferResponse, crate::errors::AgentError> {
            Ok(InferResponse {
                status: ResponseStatus::Success,
                thought: None,
                tool_call: None,
                final_answer: "{}".to_string(),
                usage: Usage::default(),
            })
        }
    }

    fn scout() -> PipelineScoutActivity {
        let deps = AgentDeps::new(
            Config::default(),
            Arc::new(NoopLlm),
            Arc::new(InMemoryCacheStore::new()),
            Arc::new(WorkerMetrics::new()),
        );
        PipelineScoutActivity::new(deps)
    }

    fn scan(data_as_of: Option<chrono::DateTime<Utc>>) -> PipelineResult {
        PipelineResult {
            ticker: "BGNE".to_string(),
            pipelines: vec![DrugPipeline {
                drug_name: "DrugA".to_string(),
                target: "PD-1".to_string(),
                indication: "NSCLC".to_string(),
                phase: Phase::Phase3,
                modality: "mAb".to_string(),
                nct_id: None,
            }],
            data_as_of,
        }
    }

    #[test]
    fn test_freshness_override() {
        let scout = scout();

        let fresh = scan(Some(Utc::now() - chrono::Duration::hours(1)));
        assert!(scout.is_fresh(&fresh));

        let stale = scan(Some(Utc::now() - chrono::Duration::hours(30)));
        assert!(!scout.is_fresh(&stale));

        let unstamped = scan(None);
        assert!(!scout.is_fresh(&unstamped));
    }

    #[test]
    fn test_prompt_mentions_phases() {
        let prompt = PipelineScoutActivity::build_prompt(&PipelineScoutInput {
            ticker: "BGNE".to_string(),
            company_url: None,
        });
        assert!(prompt.contains("Phase1_2"));
        assert!(prompt.contains("nct_id"));
    }
}
