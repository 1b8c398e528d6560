//! Valuation actuary agent
//!
//! Builds the rNPV / DCF valuation from the financial audit and the
//! aggregated clinical and market results. The returned assumptions are
//! checked against the configured bounds; a violation is an L2 error.

use crate::activities::{infer_artifact, AgentDeps};
use crate::artifacts::{ValuationActuaryInput, ValuationResult};
use crate::errors::classify;
use crate::llm::{InferRequest, Tool};
use async_trait::async_trait;
use biovalue_engine::activity::context::ActivityContext;
use biovalue_engine::activity::definition::{ActivityDefinition, RetryPolicy};
use biovalue_engine::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

pub const KIND: &str = "valuation-actuary";

const SYSTEM_PROMPT: &str = "You are a pharmaceutical valuation actuary fluent in rNPV and \
DCF models. Combine the independent per-program assessments into a company valuation. Every \
assumption must be explicit, and the Bull/Base/Bear differentiation must be justified.";

/// Valuation actuary activity
pub struct ValuationActuaryActivity {
    deps: Arc<AgentDeps>,
}

impl ValuationActuaryActivity {
    pub fn new(deps: Arc<AgentDeps>) -> Self {
        Self { deps }
    }

    fn build_prompt(input: &ValuationActuaryInput) -> String {
        let financial_json = serde_json::to_string(&input.financial).unwrap_or_default();
        let clinical_json = serde_json::to_string(&input.clinical).unwrap_or_default();
        let market_json = serde_json::to_string(&input.market).unwrap_or_default();
        format!(
            "Value the company with ticker {} using rNPV (risk-adjusted net present value) \
             and DCF.\n\n\
             Financials: {}\n\
             Clinical assessments (all programs): {}\n\
             Market forecasts (all programs): {}\n\n\
             rNPV formula: rNPV = sum[CF_t * P(S)] / (1 + WACC)^t, with WACC typically \
             between 10% and 12%.\n\n\
             Combine the per-program risk-adjusted revenues, weigh the company's cash \
             position, and produce three scenarios:\n\
             - Bull: high POS, high penetration, successful BD\n\
             - Base: industry averages, no BD\n\
             - Bear: clinical setbacks, constrained financing\n\n\
             For each scenario forecast the 1, 3, 5 and 10 year market value.\n\
             Answer as a JSON object with fields bull_case, base_case, bear_case (each \
             {{value_1y, value_3y, value_5y, value_10y, rationale}}) and assumptions \
             {{wacc, terminal_growth, avg_pos, methodology}}.",
            input.ticker, financial_json, clinical_json, market_json
        )
    }
}

#[async_trait]
impl ActivityDefinition for ValuationActuaryActivity {
    type Input = ValuationActuaryInput;
    type Output = ValuationResult;

    fn kind(&self) -> &str {
        KIND
    }

    fn description(&self) -> Option<&str> {
        Some("Builds the rNPV/DCF valuation scenarios")
    }

    fn start_to_close_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(300))
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

        ctx.record_heartbeat("Building valuation models...");

        let request = InferRequest {
            trace_id: ctx.workflow_execution_id().to_string(),
            agent_id: "A7_ValuationActuary".to_string(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: Self::build_prompt(&input),
            enable_tools: true,
            tools: vec![Tool {
                name: "code_execute".to_string(),
                mcp_server: "sandbox-fusion".to_string(),
            }],
            ..InferRequest::default()
        };

        let mut result: ValuationResult =
            infer_artifact(&self.deps, ctx.workflow_execution_id(), KIND, request)
                .await
                .map_err(|e| {
                    self.deps.metrics.record_activity_failed();
                    classify(&e).into_engine_error()
                })?;

        // The average POS is derived from the assessments, not from the
        // model's answer
        result.assumptions.avg_pos = input.clinical.avg_pos();

        result
            .validate(&self.deps.config.valuation)
            .map_err(|e| {
                self.deps.metrics.record_activity_failed();
                classify(&e).into_engine_error()
            })?;

        self.deps.metrics.record_activity_completed(started.elapsed());
        info!(
            ticker = %input.ticker,
            base_case_1y = result.base_case.value_1y,
            wacc = result.assumptions.wacc,
            "Valuation completed"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ClinicalResult, FinancialResult, MarketResult};

    #[test]
    fn test_prompt_carries_all_aggregates() {
        let prompt = ValuationActuaryActivity::build_prompt(&ValuationActuaryInput {
            ticker: "BGNE".to_string(),
            financial: FinancialResult {
                ticker: "BGNE".to_string(),
                ..FinancialResult::default()
            },
            clinical: ClinicalResult {
                ticker: "BGNE".to_string(),
                ..ClinicalResult::default()
            },
            market: MarketResult {
                ticker: "BGNE".to_string(),
                total_risk_adjusted_revenue: 1_500_000_000.0,
                ..MarketResult::default()
            },
        });
        assert!(prompt.contains("rNPV"));
        assert!(prompt.contains("bull_case"));
        assert!(prompt.contains("terminal_growth"));
    }
}
