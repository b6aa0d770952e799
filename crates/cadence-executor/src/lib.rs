//! Plan execution for cadence.
//!
//! The [`PlanExecutor`] walks a plan tree, runs each step's task lifecycle,
//! fans parallel groups out onto the tokio runtime and inlines sub-plans.
//! Once the tree is done it groups successful results by sink into a
//! [`SinkBatch`] and writes each batch in the plan's declared sink order.

mod batch;
mod events;
mod executor;
mod input;
mod report;
mod write;

pub use batch::SinkBatch;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use executor::PlanExecutor;
pub use input::{InputError, render_input};
pub use report::{ExecutionReport, RunStatus, WriteOutcome, WriteStatus};
