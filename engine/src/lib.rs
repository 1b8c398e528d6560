//! # BioValue Engine
//!
//! Durable workflow execution for the BioValue evaluation pipeline.
//!
//! The engine drives **deterministic workflow functions** over an
//! append-only event history. Workflow code expresses side effects through
//! its context (activities, child workflows, timers, signals, cached
//! operations); every decision is recorded and a crash at any point is
//! recovered by replaying the history.
//!
//! - [`WorkflowDefinition`] / [`ActivityDefinition`] traits for type-safe
//!   definitions
//! - [`WorkflowContext`] / [`ActivityContext`] execution APIs
//! - [`WorkflowExecutor`] turning one workflow task into commands
//! - [`ActivityExecutor`] running side effects with timeouts, heartbeats
//!   and retries
//! - [`WorkflowRuntime`] driving executions to completion over an
//!   [`EventStore`], including signals, queries and child workflows
//! - Testing utilities behind the `testing` feature

pub mod activity;
pub mod error;
pub mod runtime;
pub mod worker;
pub mod workflow;

/// Testing utilities for workflows and activities.
/// Available with the `testing` feature (and inside this crate's tests).
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{DeterminismViolationError, EngineError, Result};

pub use activity::context::ActivityContext;
pub use activity::context_impl::ActivityContextImpl;
pub use activity::definition::{ActivityDefinition, RetryPolicy};
pub use activity::executor::{ActivityExecutionResult, ActivityExecutor, ActivityExecutorConfig};
pub use activity::registry::{ActivityMetadata, ActivityRegistry, RegisteredActivity};

pub use workflow::combinators::{join_all, select};
pub use workflow::context::{ScheduleActivityOptions, WorkflowContext, WorkflowContextExt};
pub use workflow::context_impl::WorkflowContextImpl;
pub use workflow::definition::WorkflowDefinition;
pub use workflow::future::{
    ActivityFuture, ChildWorkflowFuture, OperationFuture, Signal, SignalFuture, TimerFuture,
};

pub use worker::executor::{WorkflowExecutor, WorkflowStatus, WorkflowTaskResult};
pub use worker::registry::{RegisteredWorkflow, WorkflowMetadata, WorkflowRegistry};

pub use runtime::event_store::{EventStore, ExecutionDescriptor, InMemoryEventStore};
pub use runtime::{RuntimeConfig, WorkflowHandle, WorkflowRuntime};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::activity::context::ActivityContext;
    pub use crate::activity::definition::{ActivityDefinition, RetryPolicy};
    pub use crate::error::{EngineError, Result};
    pub use crate::runtime::{RuntimeConfig, WorkflowHandle, WorkflowRuntime};
    pub use crate::workflow::combinators::{join_all, select};
    pub use crate::workflow::context::{
        ScheduleActivityOptions, WorkflowContext, WorkflowContextExt,
    };
    pub use crate::workflow::definition::WorkflowDefinition;
    pub use crate::workflow::future::Signal;
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{json, Value};
    pub use uuid::Uuid;
}
