//! BioValue worker binary
//!
//! Wires the runtime from configuration, registers every workflow and
//! activity, and drives one evaluation for a ticker. The LLM gateway and
//! cache store endpoints are deployment concerns; this binary runs with
//! the in-memory backends so the pipeline can be exercised end to end.

use anyhow::Context;
use biovalue_engine::runtime::event_store::InMemoryEventStore;
use biovalue_engine::{
    ActivityExecutorConfig, ActivityRegistry, RuntimeConfig, WorkflowRegistry, WorkflowRuntime,
};
use biovalue_worker::activities::{self, AgentDeps};
use biovalue_worker::artifacts::WorkflowInput;
use biovalue_worker::cache::InMemoryCacheStore;
use biovalue_worker::config::Config;
use biovalue_worker::errors::AgentError;
use biovalue_worker::llm::{GatedLlmClient, InferRequest, InferResponse, LlmClient};
use biovalue_worker::metrics::WorkerMetrics;
use biovalue_worker::workflows;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "biovalue-worker", about = "BioValue evaluation worker")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one company
    Run {
        /// Stock ticker to evaluate
        #[arg(long)]
        ticker: String,

        /// Path to the financial report document
        #[arg(long)]
        report_path: String,
    },
}

/// Placeholder provider used until a gateway endpoint is wired in. Every
/// inference fails as unavailable, which exercises retries, fallback and
/// the circuit breaker rather than fabricating analysis results.
struct UnconfiguredLlmClient;

#[async_trait::async_trait]
impl LlmClient for UnconfiguredLlmClient {
    async fn infer(&self, _request: &InferRequest) -> Result<InferResponse, AgentError> {
        Err(AgentError::LlmUnavailable(
            "no LLM gateway endpoint configured".to_string(),
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            ticker,
            report_path,
        } => run_evaluation(config, &ticker, &report_path).await,
    }
}

async fn run_evaluation(config: Config, ticker: &str, report_path: &str) -> anyhow::Result<()> {
    let cache = Arc::new(InMemoryCacheStore::new());
    let metrics = Arc::new(WorkerMetrics::new());

    let llm: Arc<dyn LlmClient> = Arc::new(GatedLlmClient::new(
        Arc::new(UnconfiguredLlmClient),
        None,
        config.llm.rate_limit,
        config.llm.circuit,
    ));

    let deps = AgentDeps::new(config.clone(), llm, cache, Arc::clone(&metrics));

    let workflow_registry = Arc::new(WorkflowRegistry::new());
    workflows::register_all(&workflow_registry)
        .map_err(|e| anyhow::anyhow!("workflow registration failed: {e}"))?;

    let activity_registry = Arc::new(ActivityRegistry::new());
    activities::register_all(&activity_registry, deps)
        .map_err(|e| anyhow::anyhow!("activity registration failed: {e}"))?;

    let runtime = WorkflowRuntime::new(
        workflow_registry,
        activity_registry,
        Arc::new(InMemoryEventStore::new()),
        RuntimeConfig {
            max_concurrent_activities: config.engine.max_concurrent_activities,
            max_concurrent_workflows: config.engine.max_concurrent_workflows,
            activity_executor: ActivityExecutorConfig::default(),
            ..RuntimeConfig::default()
        },
    );

    let workflow_id = format!("biovalue-{}", ticker);
    let handle = runtime
        .start_workflow(
            workflows::biovalue::KIND,
            &workflow_id,
            serde_json::to_value(WorkflowInput {
                ticker: ticker.to_string(),
                report_path: report_path.to_string(),
                options: BTreeMap::new(),
            })?,
        )
        .map_err(|e| anyhow::anyhow!("failed to start workflow: {e}"))?;

    tracing::info!(
        workflow_id = %handle.workflow_id,
        run_id = %handle.execution_id,
        "Evaluation started"
    );

    let output = runtime
        .run(handle.execution_id)
        .await
        .map_err(|e| anyhow::anyhow!("evaluation failed: {e}"))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("failed to render output")?
    );
    tracing::info!(
        cache_hits = metrics.cache_hits(),
        llm_calls = metrics.llm_calls(),
        "Evaluation finished"
    );

    Ok(())
}
