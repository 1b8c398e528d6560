//! Main evaluation workflow
//!
//! Coordinates the agents into the full pipeline:
//!
//! 1. Financial audit and pipeline scan in parallel
//! 2. One per-drug analysis child workflow per discovered pipeline
//! 3. Clinical and market aggregation
//! 4. Valuation child workflow
//! 5. Best-effort report generation
//!
//! Progress lives in workflow state under the `progress` key and is served
//! by the runtime's state query. `human-intervention` signals are drained
//! at phase boundaries: pause gates the next phase, cancel runs the Saga
//! and terminates. A failure classified at L2 or above in the valuation
//! phase also runs the Saga and aborts.

use crate::activities::{financial, pipeline, report};
use crate::artifacts::{
    ClinicalResult, FinancialResult, InterventionSignal, InterventionType, MarketResult,
    PipelineAnalysisResult, PipelineResult, PipelineStatus, ProgressInfo, ReportGeneratorInput,
    ReportResult, ValuationResult, WorkflowInput, WorkflowOutput,
};
use crate::errors::{classify_message, ErrorLevel};
use crate::workflows::pipeline_analysis::{self, PipelineAnalysisInput};
use crate::workflows::saga::Saga;
use crate::workflows::valuation::{self, ValuationInput};
use async_trait::async_trait;
use biovalue_engine::prelude::*;
use biovalue_engine::workflow::context::WorkflowContext;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info, warn};

pub const KIND: &str = "biovalue";

/// Name of the human-intervention signal channel
pub const INTERVENTION_SIGNAL: &str = "human-intervention";

/// Workflow state key served by the progress query
pub const PROGRESS_KEY: &str = "progress";

/// Main evaluation workflow
pub struct BioValueWorkflow;

fn main_activity_options() -> ScheduleActivityOptions {
    ScheduleActivityOptions {
        start_to_close_timeout: Some(Duration::from_secs(600)),
        heartbeat_timeout: Some(Duration::from_secs(30)),
        max_attempts: Some(5),
    }
}

/// Workflow-local progress tracking, mirrored into workflow state at every
/// mutation so queries read it from the replayed log.
struct ProgressTracker {
    current_agent: String,
    completed_steps: Vec<String>,
    pipeline_progress: BTreeMap<String, PipelineStatus>,
}

impl ProgressTracker {
    fn new() -> Self {
        Self {
            current_agent: String::new(),
            completed_steps: Vec::new(),
            pipeline_progress: BTreeMap::new(),
        }
    }

    fn info(&self) -> ProgressInfo {
        let total_steps = 4 + self.pipeline_progress.len() * 2;
        let progress_percent =
            self.completed_steps.len() as f64 / total_steps as f64 * 100.0;
        ProgressInfo {
            current_agent: self.current_agent.clone(),
            completed_steps: self.completed_steps.clone(),
            total_steps,
            progress_percent,
            pipeline_progress: self.pipeline_progress.clone(),
        }
    }

    async fn publish(&self, ctx: &dyn WorkflowContext) -> Result<()> {
        ctx.set_typed(PROGRESS_KEY, self.info()).await
    }
}

/// Pause/cancel state driven by drained intervention signals
#[derive(Default)]
struct InterventionState {
    paused: bool,
    cancelled: bool,
}

impl InterventionState {
    fn apply(&mut self, signal: &Signal) {
        let parsed: InterventionSignal = match serde_json::from_value(signal.value.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed intervention signal");
                return;
            }
        };

        match parsed.intervention_type {
            InterventionType::Pause => {
                self.paused = true;
                info!("Workflow paused by signal");
            }
            InterventionType::Resume => {
                self.paused = false;
                info!("Workflow resumed by signal");
            }
            InterventionType::Cancel => {
                self.cancelled = true;
                info!("Workflow cancelled by signal");
            }
            InterventionType::Modify => {
                info!(agent_id = %parsed.agent_id, "Modify intervention acknowledged");
            }
        }
    }

    /// Drain queued signals, then block while paused. Returns with either
    /// an empty inbox and no pause, or the cancelled flag set.
    async fn gate(&mut self, ctx: &dyn WorkflowContext) -> Result<()> {
        loop {
            match ctx.poll_signal(INTERVENTION_SIGNAL)? {
                Some(signal) => self.apply(&signal),
                None => {
                    if self.cancelled || !self.paused {
                        return Ok(());
                    }
                    let signal = ctx.wait_for_signal_raw(INTERVENTION_SIGNAL).await?;
                    self.apply(&signal);
                }
            }
        }
    }
}

/// Aggregate the per-drug clinical assessments
fn aggregate_clinical_results(
    ticker: &str,
    analyses: &[PipelineAnalysisResult],
) -> ClinicalResult {
    ClinicalResult {
        ticker: ticker.to_string(),
        assessments: analyses.iter().map(|a| a.clinical.clone()).collect(),
        updated_at: None,
    }
}

/// Aggregate the per-drug market assessments, summing the risk-adjusted
/// revenue over successes
fn aggregate_market_results(ticker: &str, analyses: &[PipelineAnalysisResult]) -> MarketResult {
    let total_risk_adjusted_revenue = analyses
        .iter()
        .map(|a| a.market.risk_adjusted_revenue)
        .sum();
    MarketResult {
        ticker: ticker.to_string(),
        assessments: analyses.iter().map(|a| a.market.clone()).collect(),
        total_risk_adjusted_revenue,
        updated_at: None,
    }
}

#[async_trait]
impl WorkflowDefinition for BioValueWorkflow {
    type Input = WorkflowInput;
    type Output = WorkflowOutput;

    fn kind(&self) -> &str {
        KIND
    }

    fn name(&self) -> &str {
        "BioValue Evaluation"
    }

    fn description(&self) -> Option<&str> {
        Some("Multi-agent biopharma valuation pipeline")
    }

    fn cancellable(&self) -> bool {
        true
    }

    fn tags(&self) -> Vec<String> {
        vec![
            "biovalue".to_string(),
            "valuation".to_string(),
            "multi-agent".to_string(),
        ]
    }

    async fn execute(&self, ctx: &dyn WorkflowContext, input: Self::Input) -> Result<Self::Output> {
        info!(ticker = %input.ticker, "Starting BioValue workflow");

        let mut saga = Saga::new();
        let mut progress = ProgressTracker::new();
        let mut interventions = InterventionState::default();
        let run_id = ctx.run_id();

        // ===== Phase A: financial audit and pipeline scan in parallel =====
        progress.current_agent = "FinancialAuditor,PipelineScout".to_string();
        progress.publish(ctx).await?;

        let financial_future = ctx.schedule_activity_with_options_raw(
            financial::KIND,
            json!({"ticker": input.ticker.clone(), "report_path": input.report_path.clone()}),
            main_activity_options(),
        );
        let pipeline_future = ctx.schedule_activity_with_options_raw(
            pipeline::KIND,
            json!({"ticker": input.ticker.clone()}),
            main_activity_options(),
        );

        let mut financial_result: Option<FinancialResult> = None;
        match financial_future.await {
            Ok(value) => {
                financial_result = Some(serde_json::from_value(value)?);
                progress.completed_steps.push("FinancialAuditor".to_string());
                saga.add_cache_cleanup("financial", &input.ticker, "financials", vec![]);
            }
            Err(e) => error!(error = %e, "FinancialAuditor failed"),
        }

        let mut pipeline_result: Option<PipelineResult> = None;
        match pipeline_future.await {
            Ok(value) => {
                let parsed: PipelineResult = serde_json::from_value(value)?;
                let drug_names: Vec<String> = parsed
                    .pipelines
                    .iter()
                    .map(|p| p.drug_name.clone())
                    .collect();
                progress.completed_steps.push("PipelineScout".to_string());
                saga.add_cache_cleanup("pipeline", &input.ticker, "pipeline", drug_names);
                pipeline_result = Some(parsed);
            }
            Err(e) => error!(error = %e, "PipelineScout failed"),
        }
        progress.publish(ctx).await?;

        interventions.gate(ctx).await?;
        if interventions.cancelled {
            saga.execute(ctx).await?;
            return Err(EngineError::WorkflowCancelled(
                "cancelled by human intervention".to_string(),
            ));
        }

        // ===== Fan-out: one analysis child workflow per discovered drug =====
        progress.current_agent = "PipelineAnalysis".to_string();

        let pipelines = pipeline_result
            .as_ref()
            .map(|p| p.pipelines.clone())
            .unwrap_or_default();
        for drug in &pipelines {
            progress
                .pipeline_progress
                .insert(drug.drug_name.clone(), PipelineStatus::InProgress);
        }
        progress.publish(ctx).await?;

        let analysis_futures: Vec<_> = pipelines
            .iter()
            .enumerate()
            .map(|(index, drug)| {
                let child_name =
                    format!("pipeline-analysis-{}-{}-{}", input.ticker, run_id, index);
                ctx.schedule_child_workflow_raw(
                    &child_name,
                    pipeline_analysis::KIND,
                    serde_json::to_value(PipelineAnalysisInput {
                        ticker: input.ticker.clone(),
                        pipeline: drug.clone(),
                    })
                    .unwrap_or(Value::Null),
                )
            })
            .collect();

        let mut pipeline_analyses: Vec<PipelineAnalysisResult> = Vec::new();
        for (index, future) in analysis_futures.into_iter().enumerate() {
            let drug_name = pipelines[index].drug_name.clone();
            match future.await {
                Ok(value) => {
                    let analysis: PipelineAnalysisResult = serde_json::from_value(value)?;
                    progress
                        .pipeline_progress
                        .insert(drug_name.clone(), PipelineStatus::Completed);
                    progress
                        .completed_steps
                        .push(format!("PipelineAnalysis:{}", drug_name));
                    pipeline_analyses.push(analysis);
                }
                Err(e) => {
                    error!(drug = %drug_name, error = %e, "Pipeline analysis failed");
                    progress
                        .pipeline_progress
                        .insert(drug_name, PipelineStatus::Failed);
                }
            }
            progress.publish(ctx).await?;
        }

        // Partial fan-out failure degrades; only a total one aborts
        if !pipelines.is_empty() && pipeline_analyses.is_empty() {
            saga.execute(ctx).await?;
            return Err(EngineError::WorkflowFailed(
                "pipeline analysis failed for every drug".to_string(),
            ));
        }

        // ===== Aggregation =====
        let clinical_result = aggregate_clinical_results(&input.ticker, &pipeline_analyses);
        progress
            .completed_steps
            .push("ClinicalAggregation".to_string());

        let market_result = aggregate_market_results(&input.ticker, &pipeline_analyses);
        progress
            .completed_steps
            .push("MarketAggregation".to_string());
        progress.publish(ctx).await?;

        interventions.gate(ctx).await?;
        if interventions.cancelled {
            saga.execute(ctx).await?;
            return Err(EngineError::WorkflowCancelled(
                "cancelled by human intervention".to_string(),
            ));
        }

        // ===== Valuation (isolated child workflow) =====
        progress.current_agent = "ValuationActuary".to_string();
        progress.publish(ctx).await?;

        let mut valuation_result: Option<ValuationResult> = None;
        let valuation_name = format!("valuation-{}-{}", input.ticker, run_id);
        match ctx
            .schedule_child_workflow_raw(
                &valuation_name,
                valuation::KIND,
                serde_json::to_value(ValuationInput {
                    ticker: input.ticker.clone(),
                    financial: financial_result.clone().unwrap_or_default(),
                    clinical: clinical_result.clone(),
                    market: market_result.clone(),
                })?,
            )
            .await
        {
            Ok(value) => {
                valuation_result = Some(serde_json::from_value(value)?);
                progress
                    .completed_steps
                    .push("ValuationActuary".to_string());
                progress.publish(ctx).await?;
            }
            Err(e) => {
                let classified = classify_message(&e.to_string());
                error!(
                    error = %e,
                    level = %classified.level,
                    "Valuation workflow failed"
                );
                if classified.level >= ErrorLevel::L2Intervention {
                    saga.execute(ctx).await?;
                    return Err(EngineError::WorkflowFailed(format!(
                        "valuation workflow failed: {}",
                        e
                    )));
                }
            }
        }

        interventions.gate(ctx).await?;
        if interventions.cancelled {
            saga.execute(ctx).await?;
            return Err(EngineError::WorkflowCancelled(
                "cancelled by human intervention".to_string(),
            ));
        }

        // ===== Report (best-effort) =====
        progress.current_agent = "ReportGenerator".to_string();
        progress.publish(ctx).await?;

        let mut report_result: Option<ReportResult> = None;
        match ctx
            .schedule_activity_with_options_raw(
                report::KIND,
                serde_json::to_value(ReportGeneratorInput {
                    ticker: input.ticker.clone(),
                    financial: financial_result.clone().unwrap_or_default(),
                    pipeline: pipeline_result.clone().unwrap_or_default(),
                    pipeline_analyses: pipeline_analyses.clone(),
                    clinical: clinical_result.clone(),
                    market: market_result.clone(),
                    valuation: valuation_result.clone().unwrap_or_default(),
                })?,
                main_activity_options(),
            )
            .await
        {
            Ok(value) => {
                report_result = Some(serde_json::from_value(value)?);
                progress
                    .completed_steps
                    .push("ReportGenerator".to_string());
                progress.publish(ctx).await?;
            }
            Err(e) => warn!(error = %e, "ReportGenerator failed"),
        }

        // Stamp completion through a recorded operation so replay
        // reproduces the identical output
        let completed_at_millis: i64 = ctx
            .run_raw("stamp-completed-at", json!(ctx.current_time_millis()))
            .await?
            .as_i64()
            .unwrap_or_default();
        let completed_at: DateTime<Utc> =
            DateTime::from_timestamp_millis(completed_at_millis).unwrap_or(DateTime::<Utc>::MIN_UTC);

        info!(
            ticker = %input.ticker,
            completed_steps = ?progress.completed_steps,
            pipeline_count = pipeline_analyses.len(),
            "BioValue workflow completed"
        );

        Ok(WorkflowOutput {
            ticker: input.ticker,
            financial: financial_result,
            pipeline: pipeline_result,
            pipeline_analyses,
            clinical: Some(clinical_result),
            market: Some(market_result),
            valuation: valuation_result,
            report: report_result,
            run_id,
            completed_at,
        })
    }
}
