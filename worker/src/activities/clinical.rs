//! Clinical assessor agent - one drug program per invocation
//!
//! Assesses clinical competitiveness of a single pipeline: competitor
//! comparison, best-in-class potential, probability of success and a
//! competitive rating.

use crate::activities::{cached_artifact, infer_artifact, store_artifact, AgentDeps};
use crate::artifacts::{ClinicalAssessment, ClinicalAssessorInput};
use crate::cache::CacheKeys;
use crate::errors::classify;
use crate::llm::{InferRequest, Tool};
use async_trait::async_trait;
use biovalue_engine::activity::context::ActivityContext;
use biovalue_engine::activity::definition::{ActivityDefinition, RetryPolicy};
use biovalue_engine::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

pub const KIND: &str = "clinical-assessor";

const SYSTEM_PROMPT: &str = "You are a chief medical officer's assistant focused on the \
clinical data and competitive position of a single drug program. Research each program \
independently and objectively, grounding every judgement in public clinical data. One \
program per analysis, in depth.";

/// Clinical assessor activity
pub struct ClinicalAssessorActivity {
    deps: Arc<AgentDeps>,
}

impl ClinicalAssessorActivity {
    pub fn new(deps: Arc<AgentDeps>) -> Self {
        Self { deps }
    }

    fn build_prompt(input: &ClinicalAssessorInput) -> String {
        let pipeline_json = serde_json::to_string(&input.pipeline).unwrap_or_default();
        format!(
            "Company ticker: {}\nProgram under analysis:\n{}\n\n\
             Analyze this one program in depth:\n\n\
             1. Competitor identification: list approved and in-development drugs against \
             the same target ({}), compare head-to-head data where available, and contrast \
             safety (AEs) and efficacy (ORR, PFS, OS).\n\
             2. Best-in-class potential: advantages over the standard of care and the \
             differentiation in the clinical data.\n\
             3. Probability of success: baseline POS for the current phase ({}), adjusted \
             for the data seen so far.\n\
             4. Competitive rating: BiC, FiC, MeToo or BelowAverage.\n\n\
             Answer as a JSON object with fields drug_name, target, indication, phase, \
             pos_score (0.0-1.0), competitive_landscape, clinical_advantage, rating, \
             key_competitors, data_sources.",
            input.ticker,
            pipeline_json,
            input.pipeline.target,
            input.pipeline.phase.as_str(),
        )
    }
}

#[async_trait]
impl ActivityDefinition for ClinicalAssessorActivity {
    type Input = ClinicalAssessorInput;
    type Output = ClinicalAssessment;

    fn kind(&self) -> &str {
        KIND
    }

    fn description(&self) -> Option<&str> {
        Some("Assesses clinical competitiveness of one drug program")
    }

    fn start_to_close_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(480))
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
        let cache_key = CacheKeys::clinical(&input.ticker, &input.pipeline.drug_name);

        if let Some(cached) = cached_artifact::<ClinicalAssessment>(&self.deps, &cache_key).await
        {
            return Ok(cached);
        }
        self.deps.metrics.record_cache_miss();

        ctx.record_heartbeat(&format!(
            "Assessing clinical competitiveness for {}...",
            input.pipeline.drug_name
        ));

        let request = InferRequest {
            trace_id: ctx.workflow_execution_id().to_string(),
            agent_id: format!("A3_ClinicalAssessor_{}", input.pipeline.drug_name),
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: Self::build_prompt(&input),
            enable_tools: true,
            tools: vec![Tool {
                name: "web_search".to_string(),
                mcp_server: "mcp-web-search".to_string(),
            }],
            ..InferRequest::default()
        };

        let mut result: ClinicalAssessment =
            infer_artifact(&self.deps, ctx.workflow_execution_id(), KIND, request)
                .await
                .map_err(|e| {
                    self.deps.metrics.record_activity_failed();
                    classify(&e).into_engine_error()
                })?;

        // Identity fields come from the scheduled pipeline, not the model
        result.drug_name = input.pipeline.drug_name.clone();
        result.target = input.pipeline.target.clone();
        result.indication = input.pipeline.indication.clone();
        result.phase = input.pipeline.phase;

        result.validate().map_err(|e| {
            self.deps.metrics.record_activity_failed();
            classify(&e).into_engine_error()
        })?;

        store_artifact(
            &self.deps,
            &cache_key,
            &result,
            self.deps.config.cache.clinical(),
        )
        .await;

        self.deps.metrics.record_activity_completed(started.elapsed());
        info!(
            drug = %result.drug_name,
            pos = result.pos_score,
            rating = ?result.rating,
            "Clinical assessment completed"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{DrugPipeline, Phase};

    #[test]
    fn test_prompt_carries_target_and_phase() {
        let prompt = ClinicalAssessorActivity::build_prompt(&ClinicalAssessorInput {
            ticker: "BGNE".to_string(),
            pipeline: DrugPipeline {
                drug_name: "DrugB".to_string(),
                target: "HER2".to_string(),
                indication: "BC".to_string(),
                phase: Phase::Phase2,
                modality: "ADC".to_string(),
                nct_id: Some("NCT01234567".to_string()),
            },
        });
        assert!(prompt.contains("HER2"));
        assert!(prompt.contains("Phase2"));
        assert!(prompt.contains("pos_score"));
    }
}
