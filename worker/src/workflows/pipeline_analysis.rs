//! Per-pipeline analysis subflow
//!
//! One instance per discovered drug: clinical assessment first, then
//! market analysis, because the market analysis consumes the clinical
//! rating and POS. Either activity failing substitutes a conservative
//! default so a partially-failed drug still contributes a row upstream.

use crate::activities::{clinical, market};
use crate::artifacts::{
    ClinicalAssessment, DrugPipeline, MarketAssessment, PipelineAnalysisResult,
};
use async_trait::async_trait;
use biovalue_engine::prelude::*;
use biovalue_engine::workflow::context::WorkflowContext;
use schemars::JsonSchema;
use std::time::Duration;
use tracing::{error, info};

/// Input of the per-pipeline analysis subflow
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineAnalysisInput {
    pub ticker: String,
    pub pipeline: DrugPipeline,
}

/// Per-pipeline analysis subflow
pub struct PipelineAnalysisWorkflow;

pub const KIND: &str = "pipeline-analysis";

fn activity_options() -> ScheduleActivityOptions {
    ScheduleActivityOptions {
        start_to_close_timeout: Some(Duration::from_secs(480)),
        heartbeat_timeout: Some(Duration::from_secs(30)),
        max_attempts: Some(3),
    }
}

#[async_trait]
impl WorkflowDefinition for PipelineAnalysisWorkflow {
    type Input = PipelineAnalysisInput;
    type Output = PipelineAnalysisResult;

    fn kind(&self) -> &str {
        KIND
    }

    fn name(&self) -> &str {
        "Per-Pipeline Analysis"
    }

    fn description(&self) -> Option<&str> {
        Some("Clinical assessment followed by market analysis for one drug program")
    }

    fn cancellable(&self) -> bool {
        true
    }

    fn tags(&self) -> Vec<String> {
        vec!["pipeline".to_string(), "per-drug".to_string()]
    }

    async fn execute(&self, ctx: &dyn WorkflowContext, input: Self::Input) -> Result<Self::Output> {
        info!(
            ticker = %input.ticker,
            drug = %input.pipeline.drug_name,
            target = %input.pipeline.target,
            phase = ?input.pipeline.phase,
            "Starting pipeline analysis"
        );

        // Step 1: clinical assessment
        let clinical_result: ClinicalAssessment = match ctx
            .schedule_activity_with_options_raw(
                clinical::KIND,
                serde_json::json!({
                    "ticker": input.ticker.clone(),
                    "pipeline": input.pipeline.clone(),
                }),
                activity_options(),
            )
            .await
        {
            Ok(value) => serde_json::from_value(value)?,
            Err(e) => {
                error!(
                    drug = %input.pipeline.drug_name,
                    error = %e,
                    "Clinical assessment failed, continuing with defaults"
                );
                ClinicalAssessment::default_for(&input.pipeline)
            }
        };

        info!(
            drug = %input.pipeline.drug_name,
            pos = clinical_result.pos_score,
            rating = ?clinical_result.rating,
            "Clinical assessment completed"
        );

        // Step 2: market analysis, consuming the clinical outcome
        let market_result: MarketAssessment = match ctx
            .schedule_activity_with_options_raw(
                market::KIND,
                serde_json::json!({
                    "ticker": input.ticker.clone(),
                    "pipeline": input.pipeline.clone(),
                    "clinical": clinical_result.clone(),
                }),
                activity_options(),
            )
            .await
        {
            Ok(value) => serde_json::from_value(value)?,
            Err(e) => {
                error!(
                    drug = %input.pipeline.drug_name,
                    error = %e,
                    "Market analysis failed, continuing with defaults"
                );
                MarketAssessment::default_for(&input.pipeline)
            }
        };

        info!(
            ticker = %input.ticker,
            drug = %input.pipeline.drug_name,
            revenue = market_result.risk_adjusted_revenue,
            "Pipeline analysis completed"
        );

        Ok(PipelineAnalysisResult {
            pipeline: input.pipeline,
            clinical: clinical_result,
            market: market_result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{Phase, Rating};
    use biovalue_engine::testing::MockWorkflowContext;
    use serde_json::json;

    fn pipeline(phase: Phase) -> DrugPipeline {
        DrugPipeline {
            drug_name: "DrugB".to_string(),
            target: "HER2".to_string(),
            indication: "BC".to_string(),
            phase,
            modality: "ADC".to_string(),
            nct_id: None,
        }
    }

    fn clinical_answer() -> serde_json::Value {
        json!({
            "drug_name": "DrugB",
            "target": "HER2",
            "indication": "BC",
            "phase": "Phase2",
            "pos_score": 0.42,
            "competitive_landscape": "Crowded",
            "clinical_advantage": "Better ORR",
            "rating": "BiC",
            "key_competitors": ["T-DXd"],
            "data_sources": ["NCT01234567"]
        })
    }

    fn market_answer() -> serde_json::Value {
        json!({
            "drug_name": "DrugB",
            "target": "HER2",
            "indication": "BC",
            "domestic": {"tam": 2.0e9, "penetration_rate": 0.2, "peak_sales": 4.0e8, "currency": "USD"},
            "bd_outlook": {"upfront_potential": 1.0e8, "milestone_potential": 5.0e8, "royalty_rate": 0.12, "target_region": "US/EU"},
            "risk_adjusted_revenue": 1.68e8,
            "assumptions": ["Approval by 2030"]
        })
    }

    #[tokio::test]
    async fn test_happy_path_runs_clinical_then_market() {
        let ctx = MockWorkflowContext::builder()
            .activity_result(clinical::KIND, clinical_answer())
            .activity_result(market::KIND, market_answer())
            .build();

        let result = PipelineAnalysisWorkflow
            .execute(
                &ctx,
                PipelineAnalysisInput {
                    ticker: "BGNE".to_string(),
                    pipeline: pipeline(Phase::Phase2),
                },
            )
            .await
            .unwrap();

        assert_eq!(result.clinical.pos_score, 0.42);
        assert_eq!(result.clinical.rating, Rating::BiC);
        assert_eq!(result.market.risk_adjusted_revenue, 1.68e8);

        // Clinical was scheduled before market
        let scheduled = ctx.scheduled_activities();
        assert_eq!(scheduled[0].kind, clinical::KIND);
        assert_eq!(scheduled[1].kind, market::KIND);
        // The market input carries the clinical outcome
        assert_eq!(scheduled[1].input["clinical"]["pos_score"], json!(0.42));
    }

    #[tokio::test]
    async fn test_clinical_failure_substitutes_phase_default() {
        let ctx = MockWorkflowContext::builder()
            .activity_failure(clinical::KIND, "LLM_UNAVAILABLE: provider down")
            .activity_result(market::KIND, market_answer())
            .build();

        let result = PipelineAnalysisWorkflow
            .execute(
                &ctx,
                PipelineAnalysisInput {
                    ticker: "BGNE".to_string(),
                    pipeline: pipeline(Phase::Phase2),
                },
            )
            .await
            .unwrap();

        // Phase2 default POS and an Unknown rating
        assert_eq!(result.clinical.pos_score, 0.30);
        assert_eq!(result.clinical.rating, Rating::Unknown);
        // Market analysis still ran, consuming the defaults
        assert!(ctx.was_activity_scheduled(market::KIND));
        let scheduled = ctx.scheduled_activities();
        assert_eq!(scheduled[1].input["clinical"]["pos_score"], json!(0.30));
    }

    #[tokio::test]
    async fn test_market_failure_substitutes_zeroed_row() {
        let ctx = MockWorkflowContext::builder()
            .activity_result(clinical::KIND, clinical_answer())
            .activity_failure(market::KIND, "TOOL_FAILED: web search down")
            .build();

        let result = PipelineAnalysisWorkflow
            .execute(
                &ctx,
                PipelineAnalysisInput {
                    ticker: "BGNE".to_string(),
                    pipeline: pipeline(Phase::Phase2),
                },
            )
            .await
            .unwrap();

        assert_eq!(result.market.risk_adjusted_revenue, 0.0);
        assert_eq!(result.market.bd_outlook.target_region, "Unknown");
        // The clinical result is kept
        assert_eq!(result.clinical.pos_score, 0.42);
    }

    #[tokio::test]
    async fn test_both_failures_still_produce_a_row() {
        let ctx = MockWorkflowContext::builder()
            .activity_failure(clinical::KIND, "TIMEOUT: deadline")
            .activity_failure(market::KIND, "TIMEOUT: deadline")
            .build();

        let result = PipelineAnalysisWorkflow
            .execute(
                &ctx,
                PipelineAnalysisInput {
                    ticker: "BGNE".to_string(),
                    pipeline: pipeline(Phase::Phase3),
                },
            )
            .await
            .unwrap();

        assert_eq!(result.clinical.pos_score, 0.60);
        assert_eq!(result.market.risk_adjusted_revenue, 0.0);
    }
}
