use cadence_config::SinkKind;
use thiserror::Error;

/// Errors from registering or looking up tasks, sinks and plans.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
  #[error("task '{name}' is already registered")]
  DuplicateTask { name: String },

  #[error("unknown task '{name}'")]
  UnknownTask { name: String },

  #[error("a {kind} sink is already registered")]
  DuplicateSink { kind: SinkKind },

  #[error("no {kind} sink is registered")]
  UnknownSink { kind: SinkKind },

  #[error("plan '{plan_id}' is already registered")]
  DuplicatePlan { plan_id: String },

  #[error("unknown plan '{plan_id}'")]
  UnknownPlan { plan_id: String },
}
