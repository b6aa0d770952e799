//! Per-run task state and the stage runner.

use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};

use crate::descriptor::TaskDescriptor;
use crate::result::{FailureReason, TaskResult, TaskStatus};
use crate::stage::Stage;
use crate::task::{Task, TaskContext};

/// One execution of a task.
///
/// Owned by the executor for the duration of the run and consumed by
/// [`TaskInstance::run`], which turns it into a [`TaskResult`].
pub struct TaskInstance {
  descriptor: TaskDescriptor,
  task: Box<dyn Task>,
  ctx: TaskContext,
  output: serde_json::Value,
}

impl TaskInstance {
  pub fn new(descriptor: TaskDescriptor, task: Box<dyn Task>, ctx: TaskContext) -> Self {
    Self {
      descriptor,
      task,
      ctx,
      output: serde_json::Value::Null,
    }
  }

  /// Run every stage in order.
  ///
  /// Stops at the first failing stage; later stages never start. A stage that
  /// exceeds `stage_timeout` is dropped and reported as a timeout. Cancellation
  /// is observed between stages.
  #[instrument(
    name = "task_run",
    skip(self, stage_timeout),
    fields(
      execution_id = %self.ctx.execution_id,
      task_id = %self.ctx.task_id,
      task_name = %self.ctx.task_name,
    )
  )]
  pub async fn run(mut self, stage_timeout: Option<Duration>) -> TaskResult {
    let started = Instant::now();
    info!(input = %self.ctx.input, "task_started");

    let mut failure = None;
    for &stage in self.descriptor.stages() {
      if self.ctx.cancel.is_cancelled() {
        warn!(stage = %stage, "task cancelled");
        failure = Some(FailureReason::Cancelled { stage });
        break;
      }

      let outcome = match stage_timeout {
        Some(limit) => match tokio::time::timeout(limit, self.run_stage(stage)).await {
          Ok(outcome) => outcome,
          Err(_) => Err(FailureReason::Timeout {
            stage,
            timeout_ms: limit.as_millis() as u64,
          }),
        },
        None => self.run_stage(stage).await,
      };

      if let Err(reason) = outcome {
        error!(stage = %stage, error = %reason, "stage_failed");
        failure = Some(reason);
        break;
      }
    }

    let duration_ms = started.elapsed().as_millis() as u64;
    let (payload, status) = match failure {
      None => {
        info!(output = %self.output, duration_ms, "task_completed");
        (self.output, TaskStatus::Success)
      }
      Some(reason) => {
        error!(error = %reason, duration_ms, "task_failed");
        (serde_json::Value::Null, TaskStatus::Failed { reason })
      }
    };

    TaskResult {
      task_id: self.ctx.task_id,
      task_name: self.descriptor.name,
      origin: Vec::new(),
      sink: self.descriptor.sink,
      payload,
      status,
      duration_ms,
    }
  }

  async fn run_stage(&mut self, stage: Stage) -> Result<(), FailureReason> {
    let ctx = &self.ctx;
    let result = match stage {
      Stage::Precheck => self.task.precheck(ctx).await,
      Stage::Preprocess => self.task.preprocess(ctx).await,
      Stage::Process => self.task.process(ctx).await.map(|output| {
        self.output = output;
      }),
      Stage::Postprocess => {
        let output = std::mem::take(&mut self.output);
        self.task.postprocess(ctx, output).await.map(|output| {
          self.output = output;
        })
      }
    };

    result.map_err(|e| FailureReason::Stage {
      stage,
      message: e.to_string(),
    })
  }
}
