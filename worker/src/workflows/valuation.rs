//! Valuation subflow
//!
//! Isolated child workflow wrapping the valuation actuary call, so that
//! its activity retries do not count against the parent's and its history
//! replays independently.

use crate::activities::valuation as valuation_activity;
use crate::artifacts::{ClinicalResult, FinancialResult, MarketResult, ValuationResult};
use async_trait::async_trait;
use biovalue_engine::prelude::*;
use biovalue_engine::workflow::context::WorkflowContext;
use schemars::JsonSchema;
use std::time::Duration;
use tracing::{error, info};

/// Input of the valuation subflow
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ValuationInput {
    pub ticker: String,
    pub financial: FinancialResult,
    pub clinical: ClinicalResult,
    pub market: MarketResult,
}

/// Valuation subflow
pub struct ValuationWorkflow;

pub const KIND: &str = "valuation";

#[async_trait]
impl WorkflowDefinition for ValuationWorkflow {
    type Input = ValuationInput;
    type Output = ValuationResult;

    fn kind(&self) -> &str {
        KIND
    }

    fn name(&self) -> &str {
        "Valuation"
    }

    fn description(&self) -> Option<&str> {
        Some("rNPV/DCF valuation over the aggregated pipeline assessments")
    }

    fn cancellable(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &dyn WorkflowContext, input: Self::Input) -> Result<Self::Output> {
        info!(ticker = %input.ticker, "Starting valuation workflow");

        let result: ValuationResult = match ctx
            .schedule_activity_with_options_raw(
                valuation_activity::KIND,
                serde_json::to_value(&input)?,
                ScheduleActivityOptions {
                    start_to_close_timeout: Some(Duration::from_secs(300)),
                    heartbeat_timeout: Some(Duration::from_secs(30)),
                    max_attempts: Some(3),
                },
            )
            .await
        {
            Ok(value) => serde_json::from_value(value)?,
            Err(e) => {
                error!(ticker = %input.ticker, error = %e, "Valuation activity failed");
                return Err(e);
            }
        };

        info!(
            ticker = %input.ticker,
            base_case_1y = result.base_case.value_1y,
            "Valuation workflow completed"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biovalue_engine::testing::MockWorkflowContext;
    use serde_json::json;

    fn valuation_answer() -> serde_json::Value {
        json!({
            "bull_case": {"value_1y": 1.2e10, "value_3y": 1.8e10, "value_5y": 2.5e10, "value_10y": 4.0e10, "rationale": "BD success"},
            "base_case": {"value_1y": 0.9e10, "value_3y": 1.2e10, "value_5y": 1.6e10, "value_10y": 2.2e10, "rationale": "Industry averages"},
            "bear_case": {"value_1y": 0.5e10, "value_3y": 0.6e10, "value_5y": 0.7e10, "value_10y": 0.8e10, "rationale": "Clinical setbacks"},
            "assumptions": {"wacc": 0.11, "terminal_growth": 0.025, "avg_pos": 0.44, "methodology": "rNPV + DCF"}
        })
    }

    fn input() -> ValuationInput {
        ValuationInput {
            ticker: "BGNE".to_string(),
            financial: FinancialResult::default(),
            clinical: ClinicalResult::default(),
            market: MarketResult::default(),
        }
    }

    #[tokio::test]
    async fn test_wraps_single_activity() {
        let ctx = MockWorkflowContext::builder()
            .activity_result(valuation_activity::KIND, valuation_answer())
            .build();

        let result = ValuationWorkflow.execute(&ctx, input()).await.unwrap();
        assert_eq!(result.assumptions.wacc, 0.11);
        assert_eq!(ctx.scheduled_activities().len(), 1);
    }

    #[tokio::test]
    async fn test_activity_failure_propagates() {
        let ctx = MockWorkflowContext::builder()
            .activity_failure(valuation_activity::KIND, "FATAL_CONFIG: bad bounds")
            .build();

        let err = ValuationWorkflow.execute(&ctx, input()).await.unwrap_err();
        assert!(err.to_string().contains("FATAL_CONFIG"));
    }
}
