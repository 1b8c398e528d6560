//! # BioValue Worker
//!
//! Multi-agent biopharma valuation pipeline on the durable workflow engine.
//!
//! Six LLM-backed agents - financial auditor, pipeline scout, clinical
//! assessor, market strategist, valuation actuary, report generator - are
//! stitched together by the main workflow: finance and pipeline scanning in
//! parallel, one child workflow per discovered drug (clinical then market),
//! an isolated valuation child workflow, and a best-effort report.
//!
//! The collaborators the agents depend on (LLM gateway, tool broker, cache
//! store) are reached through the narrow contracts in [`llm`], [`tools`]
//! and [`cache`]; everything the workflow decides is recorded in the engine's
//! event log and survives crashes.

pub mod activities;
pub mod artifacts;
pub mod cache;
pub mod config;
pub mod dlq;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod tools;
pub mod workflows;

pub use config::Config;
pub use errors::{classify, classify_message, AgentError, ClassifiedError, ErrorLevel};
