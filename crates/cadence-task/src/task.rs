use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Context provided to every stage of a task run.
#[derive(Debug, Clone)]
pub struct TaskContext {
  /// Execution ID of the plan run this task belongs to.
  pub execution_id: String,
  /// Plan that scheduled the task (the innermost sub-plan, if nested).
  pub plan_id: String,
  /// Unique ID of this task run.
  pub task_id: String,
  /// Registered task name.
  pub task_name: String,
  /// Input payload of the plan run.
  pub input: serde_json::Value,
  /// Cancelled when the run is asked to stop. Long stages may poll it.
  pub cancel: CancellationToken,
}

/// A unit of work with a fixed four-stage lifecycle.
///
/// Only `process` is required. Stages run strictly in order and a stage
/// never starts if an earlier one failed. Stage side effects are assumed to be
/// unsafe to repeat, so the runner never retries a stage.
#[async_trait]
pub trait Task: Send {
  async fn precheck(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
    Ok(())
  }

  async fn preprocess(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
    Ok(())
  }

  /// Produce the task's payload.
  async fn process(&mut self, ctx: &TaskContext) -> Result<serde_json::Value, TaskError>;

  /// Refine the payload produced by `process`.
  async fn postprocess(
    &mut self,
    _ctx: &TaskContext,
    output: serde_json::Value,
  ) -> Result<serde_json::Value, TaskError> {
    Ok(output)
  }
}

/// Builds a fresh task instance for each run.
pub type TaskFactory = Arc<dyn Fn() -> Box<dyn Task> + Send + Sync>;

/// Factory for any `Default` task type.
pub fn factory<T>() -> TaskFactory
where
  T: Task + Default + 'static,
{
  Arc::new(|| Box::new(T::default()) as Box<dyn Task>)
}
