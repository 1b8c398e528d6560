//! # BioValue Core
//!
//! Event-sourced replay machinery shared by the BioValue workflow engine
//! and its workers:
//!
//! - Replay events and the append-only history format
//! - Workflow commands generated during execution
//! - The [`ReplayEngine`] that pre-filters history for sequence-based replay
//! - Command recording and determinism validation
//!
//! Workflow code never touches this crate directly; it goes through the
//! context types in `biovalue-engine`.

pub mod error;
pub mod worker;
pub mod workflow;

pub use error::{CoreError, DeterminismViolationError};
pub use worker::determinism::DeterminismValidator;
pub use workflow::command::WorkflowCommand;
pub use workflow::event::{EventType, ReplayEvent};
pub use workflow::execution::{
    build_initial_state, build_operation_cache, DeterministicRandom, EventLookup, SeededRandom,
};
pub use workflow::recorder::{CommandCollector, CommandRecorder, ValidatingCommandRecorder};
pub use workflow::replay_engine::ReplayEngine;
