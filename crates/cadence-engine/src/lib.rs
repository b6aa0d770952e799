//! Plan orchestration for cadence.
//!
//! [`Orchestrator::execute_plan`] validates a plan against the registry and
//! then runs it, returning an [`ExecutionReport`] even when tasks or sink
//! writes fail. Only structural problems are errors. [`PlanRunner`] exposes
//! the same operation over a channel for hosts that submit work.

mod error;
mod orchestrator;
mod runner;
mod validate;

pub use error::OrchestratorError;
pub use orchestrator::Orchestrator;
pub use runner::{PlanRunner, RunnerHandle};
pub use validate::{PlanValidationError, PlanValidator, ValidationProblem};

pub use cadence_executor::{
  ChannelNotifier, ExecutionEvent, ExecutionNotifier, ExecutionReport, NoopNotifier, RunStatus,
  WriteOutcome, WriteStatus,
};
