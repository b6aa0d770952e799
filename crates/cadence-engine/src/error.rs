use cadence_registry::RegistryError;
use thiserror::Error;

use crate::validate::PlanValidationError;

/// Structural failures. Task and sink failures are reported, not raised.
#[derive(Debug, Error)]
pub enum OrchestratorError {
  #[error(transparent)]
  Validation(#[from] PlanValidationError),

  #[error(transparent)]
  Registry(#[from] RegistryError),

  /// The run was cancelled before it started.
  #[error("plan run cancelled")]
  Cancelled,

  /// The plan runner stopped before answering.
  #[error("plan runner is not running")]
  RunnerClosed,
}
