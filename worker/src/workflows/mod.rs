//! Durable workflows: the main evaluation pipeline and its subflows

pub mod biovalue;
pub mod pipeline_analysis;
pub mod saga;
pub mod valuation;

use biovalue_engine::worker::registry::WorkflowRegistry;

/// Register all workflows
pub fn register_all(registry: &WorkflowRegistry) -> biovalue_engine::Result<()> {
    registry.register(biovalue::BioValueWorkflow)?;
    registry.register(pipeline_analysis::PipelineAnalysisWorkflow)?;
    registry.register(valuation::ValuationWorkflow)?;
    Ok(())
}
