//! Saga compensation
//!
//! Compensations accumulate during the forward pass and run LIFO on an
//! unrecoverable failure. Each step is expressed as an activity (durable,
//! retryable) and must be idempotent: steps tolerate being invoked after
//! partial work. A failed step is flagged for human follow-up and the
//! remaining steps still run.

use crate::activities::maintenance::{CLEANUP_KIND, NOTIFY_KIND};
use biovalue_engine::workflow::context::WorkflowContext;
use serde_json::{json, Value};
use tracing::{info, warn};

/// One registered compensation step
#[derive(Debug, Clone)]
pub struct CompensationStep {
    pub name: String,
    pub activity_kind: String,
    pub input: Value,
}

/// LIFO stack of compensation steps
#[derive(Debug, Default)]
pub struct Saga {
    steps: Vec<CompensationStep>,
}

impl Saga {
    /// Create an empty saga
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Add a compensation step. Later additions run first.
    pub fn add(&mut self, name: &str, activity_kind: &str, input: Value) {
        self.steps.insert(
            0,
            CompensationStep {
                name: name.to_string(),
                activity_kind: activity_kind.to_string(),
                input,
            },
        );
    }

    /// Add a cache-namespace cleanup compensation
    pub fn add_cache_cleanup(&mut self, name: &str, ticker: &str, namespace: &str, drug_names: Vec<String>) {
        self.add(
            name,
            CLEANUP_KIND,
            json!({
                "ticker": ticker,
                "namespace": namespace,
                "drug_names": drug_names,
            }),
        );
    }

    /// Number of registered steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the saga is empty
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Registered steps in execution order
    pub fn steps(&self) -> &[CompensationStep] {
        &self.steps
    }

    /// Clear all registered steps
    pub fn clear(&mut self) {
        self.steps.clear();
    }

    /// Run every compensation step in LIFO order, best-effort: a failed
    /// step triggers the notification activity and execution continues.
    pub async fn execute(&self, ctx: &dyn WorkflowContext) -> biovalue_engine::Result<()> {
        for step in &self.steps {
            info!(step = %step.name, "Executing compensation");

            match ctx
                .schedule_activity_raw(&step.activity_kind, step.input.clone())
                .await
            {
                Ok(_) => {
                    info!(step = %step.name, "Compensation completed");
                }
                Err(e) => {
                    warn!(step = %step.name, error = %e, "Compensation failed");
                    let _ = ctx
                        .schedule_activity_raw(
                            NOTIFY_KIND,
                            json!({"step": step.name, "error": e.to_string()}),
                        )
                        .await;
                }
            }
        }
        Ok(())
    }
}
