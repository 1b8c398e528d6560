//! Financial auditor agent
//!
//! Assesses financial safety from the company's report. Biotech companies
//! usually run at a loss, so the cash runway is the number that matters;
//! the collaborator's runway computation is surfaced verbatim.

use crate::activities::{cached_artifact, infer_artifact, store_artifact, AgentDeps};
use crate::artifacts::{FinancialAuditorInput, FinancialResult};
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

pub const KIND: &str = "financial-auditor";

const SYSTEM_PROMPT: &str = "You are a biotech financial analyst. Your core duty is to assess \
the financial safety of biopharma companies. Because drug developers usually operate at a loss, \
focus on the cash runway. Every figure must come from official filings; never fabricate data.";

/// Financial auditor activity
pub struct FinancialAuditorActivity {
    deps: Arc<AgentDeps>,
}

impl FinancialAuditorActivity {
    pub fn new(deps: Arc<AgentDeps>) -> Self {
        Self { deps }
    }

    fn build_prompt(input: &FinancialAuditorInput) -> String {
        format!(
            "Analyze the financial health of the following company:\n\
             Ticker: {}\n\
             Report path: {}\n\n\
             Extract and compute:\n\
             1. Cash and cash equivalents\n\
             2. Annual burn rate\n\
             3. Cash runway in months\n\
             4. R&D expenses\n\
             5. Operating cash flow\n\n\
             Provide a health score (1-100) and a risk warning.\n\
             Answer as a JSON object with fields ticker, metrics \
             {{cash_on_hand, annual_burn_rate, cash_runway_months, \
             r_and_d_expenses, operating_cash_flow}}, health_score, \
             risk_warning.",
            input.ticker, input.report_path
        )
    }
}

#[async_trait]
impl ActivityDefinition for FinancialAuditorActivity {
    type Input = FinancialAuditorInput;
    type Output = FinancialResult;

    fn kind(&self) -> &str {
        KIND
    }

    fn description(&self) -> Option<&str> {
        Some("Audits financial health from the company report")
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
        let cache_key = CacheKeys::financials(&input.ticker);

        if let Some(cached) = cached_artifact::<FinancialResult>(&self.deps, &cache_key).await {
            return Ok(cached);
        }
        self.deps.metrics.record_cache_miss();

        ctx.record_heartbeat("Analyzing financial report...");

        let request = InferRequest {
            trace_id: ctx.workflow_execution_id().to_string(),
            agent_id: "A1_FinancialAuditor".to_string(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: Self::build_prompt(&input),
            image_paths: vec![input.report_path.clone()],
            ..InferRequest::default()
        };

        let mut result: FinancialResult =
            infer_artifact(&self.deps, ctx.workflow_execution_id(), KIND, request)
                .await
                .map_err(|e| {
                    self.deps.metrics.record_activity_failed();
                    classify(&e).into_engine_error()
                })?;

        result.ticker = input.ticker.clone();
        result.updated_at = Some(Utc::now());

        result.validate().map_err(|e| {
            self.deps.metrics.record_activity_failed();
            classify(&e).into_engine_error()
        })?;

        store_artifact(
            &self.deps,
            &cache_key,
            &result,
            self.deps.config.cache.financials(),
        )
        .await;

        self.deps.metrics.record_activity_completed(started.elapsed());
        info!(
            ticker = %input.ticker,
            cash_runway = result.metrics.cash_runway_months,
            health_score = result.health_score,
            "Financial analysis completed"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_carries_inputs() {
        let prompt = FinancialAuditorActivity::build_prompt(&FinancialAuditorInput {
            ticker: "BGNE".to_string(),
            report_path: "/r/bgne.pdf".to_string(),
        });
        assert!(prompt.contains("BGNE"));
        assert!(prompt.contains("/r/bgne.pdf"));
        assert!(prompt.contains("cash_runway_months"));
    }
}
