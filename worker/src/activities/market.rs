//! Market strategist agent - one drug program per invocation
//!
//! Runs right after the clinical assessment of the same program and
//! consumes its rating and POS: domestic market forecast, BD/licensing
//! outlook and the risk-adjusted revenue.

use crate::activities::{cached_artifact, infer_artifact, store_artifact, AgentDeps};
use crate::artifacts::{MarketAssessment, MarketStrategistInput};
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

pub const KIND: &str = "market-strategist";

const SYSTEM_PROMPT: &str = "You are a pharmaceutical market and BD strategy analyst focused \
on the commercial outlook of a single drug program. Ground market sizing in epidemiology and \
market research; ground BD estimates in recent comparable deals. One program per analysis, \
in depth.";

/// Market strategist activity
pub struct MarketStrategistActivity {
    deps: Arc<AgentDeps>,
}

impl MarketStrategistActivity {
    pub fn new(deps: Arc<AgentDeps>) -> Self {
        Self { deps }
    }

    fn build_prompt(input: &MarketStrategistInput) -> String {
        let pipeline_json = serde_json::to_string(&input.pipeline).unwrap_or_default();
        let clinical_json = serde_json::to_string(&input.clinical).unwrap_or_default();
        format!(
            "Company ticker: {}\nProgram under analysis:\n{}\n\n\
             Clinical assessment of this program:\n{}\n\n\
             Analyze the market and BD outlook of this one program:\n\n\
             1. Domestic market: epidemiology of the indication ({}), TAM, realistic \
             penetration given the competitive landscape, and peak sales.\n\
             2. Out-licensing: global interest in the target ({}), license-out potential \
             given the clinical rating ({:?}), with upfront, milestone and royalty \
             estimates against recent comparable deals.\n\
             3. Risk-adjusted revenue using the POS of {:.2}.\n\n\
             Answer as a JSON object with fields drug_name, target, indication, domestic \
             {{tam, penetration_rate, peak_sales, currency}}, bd_outlook \
             {{upfront_potential, milestone_potential, royalty_rate, target_region, \
             comparable_deals}}, risk_adjusted_revenue, assumptions.",
            input.ticker,
            pipeline_json,
            clinical_json,
            input.pipeline.indication,
            input.pipeline.target,
            input.clinical.rating,
            input.clinical.pos_score,
        )
    }
}

#[async_trait]
impl ActivityDefinition for MarketStrategistActivity {
    type Input = MarketStrategistInput;
    type Output = MarketAssessment;

    fn kind(&self) -> &str {
        KIND
    }

    fn description(&self) -> Option<&str> {
        Some("Analyzes market and BD outlook of one drug program")
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
        let cache_key = CacheKeys::market(&input.ticker, &input.pipeline.drug_name);

        if let Some(cached) = cached_artifact::<MarketAssessment>(&self.deps, &cache_key).await {
            return Ok(cached);
        }
        self.deps.metrics.record_cache_miss();

        ctx.record_heartbeat(&format!(
            "Analyzing market for {}...",
            input.pipeline.drug_name
        ));

        let request = InferRequest {
            trace_id: ctx.workflow_execution_id().to_string(),
            agent_id: format!("A4_A5_MarketStrategist_{}", input.pipeline.drug_name),
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: Self::build_prompt(&input),
            enable_tools: true,
            tools: vec![Tool {
                name: "web_search".to_string(),
                mcp_server: "mcp-web-search".to_string(),
            }],
            ..InferRequest::default()
        };

        let mut result: MarketAssessment =
            infer_artifact(&self.deps, ctx.workflow_execution_id(), KIND, request)
                .await
                .map_err(|e| {
                    self.deps.metrics.record_activity_failed();
                    classify(&e).into_engine_error()
                })?;

        result.drug_name = input.pipeline.drug_name.clone();
        result.target = input.pipeline.target.clone();
        result.indication = input.pipeline.indication.clone();

        result.validate().map_err(|e| {
            self.deps.metrics.record_activity_failed();
            classify(&e).into_engine_error()
        })?;

        store_artifact(
            &self.deps,
            &cache_key,
            &result,
            self.deps.config.cache.market(),
        )
        .await;

        self.deps.metrics.record_activity_completed(started.elapsed());
        info!(
            drug = %result.drug_name,
            risk_adjusted_revenue = result.risk_adjusted_revenue,
            "Market assessment completed"
        );

        Ok(result)
    }
}
