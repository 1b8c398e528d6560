//! Agent artifact schemas
//!
//! Typed records flowing between pipeline nodes. Artifacts are immutable
//! once produced: each is created by exactly one agent activity, stored in
//! the event log as the activity result, and optionally mirrored to the
//! cache. Every artifact crossing from the LLM collaborator into the
//! workflow is validated here; a violation classifies as L2.

use crate::errors::AgentError;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Workflow boundary
// ============================================================================

/// Input of the main evaluation workflow
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowInput {
    /// Stock ticker of the company under evaluation
    pub ticker: String,
    /// Path to the financial report document
    pub report_path: String,
    /// Extra options passed through to the agents
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Output of the main evaluation workflow
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowOutput {
    pub ticker: String,
    pub financial: Option<FinancialResult>,
    pub pipeline: Option<PipelineResult>,
    /// Per-drug analyses, one per successfully analysed pipeline
    pub pipeline_analyses: Vec<PipelineAnalysisResult>,
    pub clinical: Option<ClinicalResult>,
    pub market: Option<MarketResult>,
    pub valuation: Option<ValuationResult>,
    pub report: Option<ReportResult>,
    /// Run identifier for audit
    pub run_id: String,
    pub completed_at: DateTime<Utc>,
}

/// Progress structure served by the `progress` query
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProgressInfo {
    pub current_agent: String,
    pub completed_steps: Vec<String>,
    pub total_steps: usize,
    pub progress_percent: f64,
    pub pipeline_progress: BTreeMap<String, PipelineStatus>,
}

/// Per-drug analysis status in the progress map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Payload of the `human-intervention` signal
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InterventionSignal {
    #[serde(rename = "type")]
    pub intervention_type: InterventionType,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
}

/// Kinds of human intervention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InterventionType {
    Pause,
    Resume,
    Cancel,
    Modify,
}

// ============================================================================
// Financial auditor
// ============================================================================

/// Input for the financial auditor agent
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FinancialAuditorInput {
    pub ticker: String,
    pub report_path: String,
}

/// Financial health analysis of the company
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FinancialResult {
    pub ticker: String,
    pub metrics: FinancialMetrics,
    /// Health score in [1, 100]
    pub health_score: i32,
    pub risk_warning: String,
    #[serde(default)]
    pub source_url: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Core financial metrics. The runway computation is the collaborator's
/// own; the number is surfaced verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FinancialMetrics {
    pub cash_on_hand: f64,
    pub annual_burn_rate: f64,
    pub cash_runway_months: f64,
    pub r_and_d_expenses: f64,
    pub operating_cash_flow: f64,
}

impl FinancialResult {
    /// Validate the artifact after parsing
    pub fn validate(&self) -> Result<(), AgentError> {
        if !(1..=100).contains(&self.health_score) {
            return Err(AgentError::ValidationFailed(format!(
                "health_score {} outside [1, 100]",
                self.health_score
            )));
        }
        let metrics = [
            self.metrics.cash_on_hand,
            self.metrics.annual_burn_rate,
            self.metrics.cash_runway_months,
            self.metrics.r_and_d_expenses,
            self.metrics.operating_cash_flow,
        ];
        if metrics.iter().any(|m| !m.is_finite()) {
            return Err(AgentError::ValidationFailed(
                "non-finite financial metric".to_string(),
            ));
        }
        if self.metrics.cash_on_hand < 0.0 || self.metrics.cash_runway_months < 0.0 {
            return Err(AgentError::ValidationFailed(
                "negative cash figure".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Pipeline scout
// ============================================================================

/// Input for the pipeline scout agent
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineScoutInput {
    pub ticker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_url: Option<String>,
}

/// Scan of the company's drug pipelines. The ordering of `pipelines` is
/// stable and is the fan-out order for per-drug subflows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineResult {
    pub ticker: String,
    pub pipelines: Vec<DrugPipeline>,
    pub data_as_of: Option<DateTime<Utc>>,
}

/// One drug program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DrugPipeline {
    pub drug_name: String,
    pub target: String,
    pub indication: String,
    pub phase: Phase,
    #[serde(default)]
    pub modality: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nct_id: Option<String>,
}

/// Clinical development phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Phase {
    Preclinical,
    Phase1,
    #[serde(rename = "Phase1_2")]
    Phase1_2,
    Phase2,
    #[serde(rename = "Phase2_3")]
    Phase2_3,
    Phase3,
    Approved,
}

impl Phase {
    /// Baseline probability of success for this phase, used when the
    /// clinical assessment could not be obtained
    pub fn default_pos(&self) -> f64 {
        match self {
            Phase::Preclinical => 0.05,
            Phase::Phase1 => 0.10,
            Phase::Phase1_2 => 0.15,
            Phase::Phase2 => 0.30,
            Phase::Phase2_3 => 0.50,
            Phase::Phase3 => 0.60,
            Phase::Approved => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Preclinical => "Preclinical",
            Phase::Phase1 => "Phase1",
            Phase::Phase1_2 => "Phase1_2",
            Phase::Phase2 => "Phase2",
            Phase::Phase2_3 => "Phase2_3",
            Phase::Phase3 => "Phase3",
            Phase::Approved => "Approved",
        }
    }
}

impl PipelineResult {
    pub fn validate(&self) -> Result<(), AgentError> {
        for pipeline in &self.pipelines {
            if pipeline.drug_name.trim().is_empty() {
                return Err(AgentError::ValidationFailed(
                    "pipeline entry with empty drug_name".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Clinical assessor (per drug)
// ============================================================================

/// Input for the clinical assessor agent - one pipeline at a time
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClinicalAssessorInput {
    pub ticker: String,
    pub pipeline: DrugPipeline,
}

/// Competitive rating of a drug program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Rating {
    /// Best-in-class: data significantly better than standard of care
    BiC,
    /// First-in-class: novel mechanism
    FiC,
    /// Undifferentiated competition
    MeToo,
    /// Data weaker than competitors
    BelowAverage,
    /// Could not be assessed
    Unknown,
}

/// Clinical assessment of one drug program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClinicalAssessment {
    pub drug_name: String,
    pub target: String,
    pub indication: String,
    pub phase: Phase,
    /// Probability of success in [0.0, 1.0]
    pub pos_score: f64,
    pub competitive_landscape: String,
    pub clinical_advantage: String,
    pub rating: Rating,
    #[serde(default)]
    pub key_competitors: Vec<String>,
    #[serde(default)]
    pub data_sources: Vec<String>,
}

impl ClinicalAssessment {
    /// Conservative default used when the assessment activity failed:
    /// phase-baseline POS and an Unknown rating.
    pub fn default_for(pipeline: &DrugPipeline) -> Self {
        Self {
            drug_name: pipeline.drug_name.clone(),
            target: pipeline.target.clone(),
            indication: pipeline.indication.clone(),
            phase: pipeline.phase,
            pos_score: pipeline.phase.default_pos(),
            competitive_landscape: "Unable to assess".to_string(),
            clinical_advantage: "Unable to assess".to_string(),
            rating: Rating::Unknown,
            key_competitors: Vec::new(),
            data_sources: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if !(0.0..=1.0).contains(&self.pos_score) || !self.pos_score.is_finite() {
            return Err(AgentError::ValidationFailed(format!(
                "pos_score {} outside [0.0, 1.0] for {}",
                self.pos_score, self.drug_name
            )));
        }
        Ok(())
    }
}

/// Aggregated clinical assessments across all drugs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClinicalResult {
    pub ticker: String,
    pub assessments: Vec<ClinicalAssessment>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ClinicalResult {
    /// Mean POS over the aggregated assessments
    pub fn avg_pos(&self) -> f64 {
        if self.assessments.is_empty() {
            return 0.0;
        }
        self.assessments.iter().map(|a| a.pos_score).sum::<f64>()
            / self.assessments.len() as f64
    }
}

// ============================================================================
// Market strategist (per drug)
// ============================================================================

/// Input for the market strategist agent - consumes the clinical rating
/// and POS for the same drug
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MarketStrategistInput {
    pub ticker: String,
    pub pipeline: DrugPipeline,
    pub clinical: ClinicalAssessment,
}

/// Domestic market forecast
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MarketForecast {
    pub tam: f64,
    pub penetration_rate: f64,
    pub peak_sales: f64,
    #[serde(default)]
    pub currency: String,
}

/// Business development forecast
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BdForecast {
    pub upfront_potential: f64,
    pub milestone_potential: f64,
    pub royalty_rate: f64,
    #[serde(default)]
    pub target_region: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comparable_deals: Vec<String>,
}

/// Market analysis of one drug program
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MarketAssessment {
    pub drug_name: String,
    pub target: String,
    pub indication: String,
    pub domestic: MarketForecast,
    pub bd_outlook: BdForecast,
    pub risk_adjusted_revenue: f64,
    #[serde(default)]
    pub assumptions: Vec<String>,
}

impl MarketAssessment {
    /// Zeroed default used when the market activity failed: the drug still
    /// contributes a conservative row to the aggregation.
    pub fn default_for(pipeline: &DrugPipeline) -> Self {
        Self {
            drug_name: pipeline.drug_name.clone(),
            target: pipeline.target.clone(),
            indication: pipeline.indication.clone(),
            domestic: MarketForecast {
                currency: "USD".to_string(),
                ..MarketForecast::default()
            },
            bd_outlook: BdForecast {
                target_region: "Unknown".to_string(),
                ..BdForecast::default()
            },
            risk_adjusted_revenue: 0.0,
            assumptions: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if !(0.0..=1.0).contains(&self.domestic.penetration_rate) {
            return Err(AgentError::ValidationFailed(format!(
                "penetration_rate {} outside [0.0, 1.0] for {}",
                self.domestic.penetration_rate, self.drug_name
            )));
        }
        if !(0.0..=1.0).contains(&self.bd_outlook.royalty_rate) {
            return Err(AgentError::ValidationFailed(format!(
                "royalty_rate {} outside [0.0, 1.0] for {}",
                self.bd_outlook.royalty_rate, self.drug_name
            )));
        }
        if !self.risk_adjusted_revenue.is_finite() || self.risk_adjusted_revenue < 0.0 {
            return Err(AgentError::ValidationFailed(format!(
                "invalid risk_adjusted_revenue for {}",
                self.drug_name
            )));
        }
        Ok(())
    }
}

/// Aggregated market assessments across all drugs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MarketResult {
    pub ticker: String,
    pub assessments: Vec<MarketAssessment>,
    pub total_risk_adjusted_revenue: f64,
    pub updated_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Per-pipeline analysis (clinical + market)
// ============================================================================

/// Output of one per-drug analysis subflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineAnalysisResult {
    pub pipeline: DrugPipeline,
    pub clinical: ClinicalAssessment,
    pub market: MarketAssessment,
}

// ============================================================================
// Valuation actuary
// ============================================================================

/// Input for the valuation actuary agent
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ValuationActuaryInput {
    pub ticker: String,
    pub financial: FinancialResult,
    pub clinical: ClinicalResult,
    pub market: MarketResult,
}

/// One valuation scenario with a 1/3/5/10-year horizon
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValuationScenario {
    pub value_1y: f64,
    pub value_3y: f64,
    pub value_5y: f64,
    pub value_10y: f64,
    #[serde(default)]
    pub rationale: String,
}

/// Assumptions behind the valuation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValuationAssumptions {
    pub wacc: f64,
    pub terminal_growth: f64,
    pub avg_pos: f64,
    #[serde(default)]
    pub methodology: String,
}

/// Three-scenario valuation of the company
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValuationResult {
    pub bull_case: ValuationScenario,
    pub base_case: ValuationScenario,
    pub bear_case: ValuationScenario,
    pub assumptions: ValuationAssumptions,
}

/// Configured bounds for valuation assumptions
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ValuationBounds {
    pub wacc_min: f64,
    pub wacc_max: f64,
    /// GDP-proxy ceiling on terminal growth
    pub terminal_growth_ceiling: f64,
}

impl Default for ValuationBounds {
    fn default() -> Self {
        Self {
            wacc_min: 0.08,
            wacc_max: 0.20,
            terminal_growth_ceiling: 0.03,
        }
    }
}

impl ValuationResult {
    pub fn validate(&self, bounds: &ValuationBounds) -> Result<(), AgentError> {
        let wacc = self.assumptions.wacc;
        if !(bounds.wacc_min..=bounds.wacc_max).contains(&wacc) || !wacc.is_finite() {
            return Err(AgentError::ValidationFailed(format!(
                "WACC {} outside [{}, {}]",
                wacc, bounds.wacc_min, bounds.wacc_max
            )));
        }
        if self.assumptions.terminal_growth > bounds.terminal_growth_ceiling {
            return Err(AgentError::ValidationFailed(format!(
                "terminal_growth {} above ceiling {}",
                self.assumptions.terminal_growth, bounds.terminal_growth_ceiling
            )));
        }
        if !(0.0..=1.0).contains(&self.assumptions.avg_pos) {
            return Err(AgentError::ValidationFailed(format!(
                "avg_pos {} outside [0.0, 1.0]",
                self.assumptions.avg_pos
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Report generator
// ============================================================================

/// Input for the report generator agent - all prior artifacts
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReportGeneratorInput {
    pub ticker: String,
    pub financial: FinancialResult,
    pub pipeline: PipelineResult,
    pub pipeline_analyses: Vec<PipelineAnalysisResult>,
    pub clinical: ClinicalResult,
    pub market: MarketResult,
    pub valuation: ValuationResult,
}

/// Investment recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Buy,
    Hold,
    Sell,
}

/// The generated investment research report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReportResult {
    pub ticker: String,
    pub markdown_content: String,
    pub key_risks: Vec<String>,
    pub recommendation: Recommendation,
    pub generated_at: Option<DateTime<Utc>>,
}

impl ReportResult {
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.markdown_content.trim().is_empty() {
            return Err(AgentError::ValidationFailed(
                "empty report content".to_string(),
            ));
        }
        if self.key_risks.is_empty() {
            return Err(AgentError::ValidationFailed(
                "report carries no key risks".to_string(),
            ));
        }
        Ok(())
    }
}
