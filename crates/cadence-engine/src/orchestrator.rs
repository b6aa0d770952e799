use std::sync::Arc;

use cadence_config::{EngineConfig, PlanDef, PlanNode};
use cadence_executor::{ExecutionNotifier, ExecutionReport, PlanExecutor};
use cadence_registry::Registry;
use cadence_retry::Sleeper;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::error::OrchestratorError;
use crate::validate::{PlanValidationError, PlanValidator};

/// Validates plans against the registry and runs them.
///
/// Business failures (a task failing, a sink rejecting a batch) come back in
/// the [`ExecutionReport`]; only structural problems are returned as errors.
#[derive(Clone)]
pub struct Orchestrator {
  executor: PlanExecutor,
}

impl Orchestrator {
  pub fn new(registry: Arc<Registry>, config: EngineConfig) -> Self {
    Self {
      executor: PlanExecutor::new(registry, config),
    }
  }

  pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
    self.executor = self.executor.with_sleeper(sleeper);
    self
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.executor = self.executor.with_notifier(notifier);
    self
  }

  pub fn registry(&self) -> &Registry {
    self.executor.registry()
  }

  pub fn config(&self) -> &EngineConfig {
    self.executor.config()
  }

  /// Check `plan` and every sub-plan it reaches without running anything.
  pub fn validate(&self, plan: &PlanDef) -> Result<(), PlanValidationError> {
    PlanValidator::new(self.registry(), self.config().max_depth).validate(plan)
  }

  /// Validate and run `plan` with `input`.
  pub async fn execute_plan(
    &self,
    plan: &PlanDef,
    input: serde_json::Value,
  ) -> Result<ExecutionReport, OrchestratorError> {
    self
      .execute_plan_with_cancel(plan, input, CancellationToken::new())
      .await
  }

  /// Validate and run `plan`, stopping early once `cancel` fires.
  ///
  /// A token that is already cancelled is rejected before any task starts.
  #[instrument(
    name = "orchestrator_execute",
    skip(self, plan, input, cancel),
    fields(plan_id = %plan.plan_id)
  )]
  pub async fn execute_plan_with_cancel(
    &self,
    plan: &PlanDef,
    input: serde_json::Value,
    cancel: CancellationToken,
  ) -> Result<ExecutionReport, OrchestratorError> {
    if let Err(e) = self.validate(plan) {
      error!(
        plan_id = %plan.plan_id,
        problems = e.problems.len(),
        error = %e,
        "plan_invalid"
      );
      return Err(e.into());
    }

    if cancel.is_cancelled() {
      info!(plan_id = %plan.plan_id, "plan_cancelled");
      return Err(OrchestratorError::Cancelled);
    }

    Ok(self.executor.execute(plan, input, cancel).await)
  }

  /// Run a plan from the registry's plan catalog.
  pub async fn execute_registered(
    &self,
    plan_id: &str,
    input: serde_json::Value,
  ) -> Result<ExecutionReport, OrchestratorError> {
    let plan = self.registry().plan(plan_id)?.clone();
    self.execute_plan(&plan, input).await
  }

  /// A plan that runs every registered task once, in registration order.
  pub fn discovery_plan(&self, plan_id: impl Into<String>) -> PlanDef {
    let steps = self
      .registry()
      .list_all()
      .into_iter()
      .map(|descriptor| PlanNode::step(descriptor.name.clone()))
      .collect();
    PlanDef::new(plan_id, steps)
  }
}
