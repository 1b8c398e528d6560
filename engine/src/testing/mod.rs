//! Testing utilities for workflows and activities
//!
//! - [`MockWorkflowContext`]: unit-test workflows in isolation with
//!   pre-configured activity/child-workflow/signal results
//! - [`MockActivityContext`]: unit-test activities and capture heartbeats
//! - [`TimeController`]: virtual time for timer-dependent tests

mod mock_activity_context;
mod mock_workflow_context;
mod time_controller;

pub use mock_activity_context::MockActivityContext;
pub use mock_workflow_context::{
    MockWorkflowContext, MockWorkflowContextBuilder, RecordedOperation, ScheduledActivity,
    ScheduledChildWorkflow,
};
pub use time_controller::TimeController;
