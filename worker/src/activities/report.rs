//! Report generator agent
//!
//! Produces the final markdown research report from all prior artifacts.
//! The report must carry a non-empty risk list and an explicit BUY / HOLD
//! / SELL recommendation; an answer without them fails validation.

use crate::activities::{infer_artifact, store_artifact, AgentDeps};
use crate::artifacts::{ReportGeneratorInput, ReportResult};
use crate::cache::CacheKeys;
use crate::errors::classify;
use crate::llm::InferRequest;
use async_trait::async_trait;
use biovalue_engine::activity::context::ActivityContext;
use biovalue_engine::activity::definition::{ActivityDefinition, RetryPolicy};
use biovalue_engine::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

pub const KIND: &str = "report-generator";

const SYSTEM_PROMPT: &str = "You are a senior pharmaceutical investment researcher. The \
report must walk through each program's clinical assessment and market forecast, argue \
clearly from the data, cover the risks comprehensively, and commit to a recommendation.";

/// Report generator activity
pub struct ReportGeneratorActivity {
    deps: Arc<AgentDeps>,
}

impl ReportGeneratorActivity {
    pub fn new(deps: Arc<AgentDeps>) -> Self {
        Self { deps }
    }

    fn build_prompt(input: &ReportGeneratorInput) -> String {
        let all_data = serde_json::to_string(input).unwrap_or_default();
        format!(
            "Write a complete investment research report from the following data:\n{}\n\n\
             Requirements:\n\
             1. Markdown body with sections: company overview, financial health, \
             per-program clinical competitiveness, per-program market and BD outlook, \
             valuation and investment thesis, key risks.\n\
             2. For each program show the clinical rating and POS, the market size and \
             BD potential, and the risk-adjusted revenue contribution.\n\
             3. Attribute every figure to its source.\n\
             4. Commit to a recommendation: BUY, HOLD or SELL.\n\n\
             Answer as a JSON object with fields ticker, markdown_content, key_risks \
             (non-empty array), recommendation (BUY|HOLD|SELL).",
            all_data
        )
    }
}

#[async_trait]
impl ActivityDefinition for ReportGeneratorActivity {
    type Input = ReportGeneratorInput;
    type Output = ReportResult;

    fn kind(&self) -> &str {
        KIND
    }

    fn description(&self) -> Option<&str> {
        Some("Generates the final investment research report")
    }

    fn start_to_close_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(600))
    }

    fn heartbeat_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(30))
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.deps.config.engine.retry.policy(3)
    }

    async fn execute(
        &self,
        input: Self::Input,
        ctx: &dyn ActivityContext,
    ) -> Result<Self::Output> {
        let started = Instant::now();

        ctx.record_heartbeat("Generating investment report...");

        let request = InferRequest {
            trace_id: ctx.workflow_execution_id().to_string(),
            agent_id: "A6_ReportGenerator".to_string(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: Self::build_prompt(&input),
            ..InferRequest::default()
        };

        let mut result: ReportResult =
            infer_artifact(&self.deps, ctx.workflow_execution_id(), KIND, request)
                .await
                .map_err(|e| {
                    self.deps.metrics.record_activity_failed();
                    classify(&e).into_engine_error()
                })?;

        result.ticker = input.ticker.clone();
        result.generated_at = Some(Utc::now());

        result.validate().map_err(|e| {
            self.deps.metrics.record_activity_failed();
            classify(&e).into_engine_error()
        })?;

        store_artifact(
            &self.deps,
            &CacheKeys::report(&input.ticker),
            &result,
            self.deps.config.cache.report(),
        )
        .await;

        self.deps.metrics.record_activity_completed(started.elapsed());
        info!(
            ticker = %input.ticker,
            recommendation = ?result.recommendation,
            "Report generated"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{
        ClinicalResult, FinancialResult, MarketResult, PipelineResult, ValuationResult,
    };

    #[test]
    fn test_prompt_demands_recommendation() {
        let prompt = ReportGeneratorActivity::build_prompt(&ReportGeneratorInput {
            ticker: "BGNE".to_string(),
            financial: FinancialResult::default(),
            pipeline: PipelineResult::default(),
            pipeline_analyses: vec![],
            clinical: ClinicalResult::default(),
            market: MarketResult::default(),
            valuation: ValuationResult::default(),
        });
        assert!(prompt.contains("BUY, HOLD or SELL"));
        assert!(prompt.contains("key_risks"));
    }
}
