//! Plan runner with channel-based submission.
//!
//! The `PlanRunner` owns an mpsc channel of plan requests and executes each
//! one through an [`Orchestrator`], answering on the request's oneshot.

use std::sync::Arc;

use cadence_config::PlanDef;
use cadence_executor::ExecutionReport;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::OrchestratorError;
use crate::orchestrator::Orchestrator;

type Reply = oneshot::Sender<Result<ExecutionReport, OrchestratorError>>;

struct PlanRequest {
  plan: PlanDef,
  input: serde_json::Value,
  reply: Reply,
}

/// Executes submitted plans until cancelled or every handle is dropped.
///
/// # Usage
///
/// ```ignore
/// let runner = PlanRunner::new(orchestrator);
/// let handle = runner.handle();
///
/// let cancel = CancellationToken::new();
/// tokio::spawn(runner.start(cancel.clone()));
///
/// let report = handle.submit(plan, input).await?;
/// ```
pub struct PlanRunner {
  sender: mpsc::Sender<PlanRequest>,
  receiver: mpsc::Receiver<PlanRequest>,
  orchestrator: Arc<Orchestrator>,
}

/// Cloneable submission side of a [`PlanRunner`].
#[derive(Clone)]
pub struct RunnerHandle {
  sender: mpsc::Sender<PlanRequest>,
}

impl PlanRunner {
  pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
    Self::with_buffer_size(orchestrator, 100)
  }

  pub fn with_buffer_size(orchestrator: Arc<Orchestrator>, buffer_size: usize) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size);
    Self {
      sender,
      receiver,
      orchestrator,
    }
  }

  pub fn handle(&self) -> RunnerHandle {
    RunnerHandle {
      sender: self.sender.clone(),
    }
  }

  pub fn orchestrator(&self) -> &Orchestrator {
    &self.orchestrator
  }

  /// Run the submission loop.
  ///
  /// Each request runs concurrently on its own child token. On exit the loop
  /// waits for runs already in flight so every accepted request is answered.
  pub async fn start(self, cancel: CancellationToken) {
    let PlanRunner {
      sender,
      mut receiver,
      orchestrator,
    } = self;
    // Only external handles keep the channel open.
    drop(sender);

    info!("plan runner started");
    let mut in_flight = JoinSet::new();

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!("plan runner cancelled");
          break;
        }
        request = receiver.recv() => {
          let Some(request) = request else {
            info!("plan runner channel closed");
            break;
          };

          let orchestrator = orchestrator.clone();
          let run_cancel = cancel.child_token();
          info!(plan_id = %request.plan.plan_id, "plan submitted");
          in_flight.spawn(async move {
            let result = orchestrator
              .execute_plan_with_cancel(&request.plan, request.input, run_cancel)
              .await;
            if request.reply.send(result).is_err() {
              warn!(plan_id = %request.plan.plan_id, "submitter dropped before the report was ready");
            }
          });
        }
        Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
      }
    }

    while in_flight.join_next().await.is_some() {}
    info!("plan runner stopped");
  }
}

impl RunnerHandle {
  /// Submit a plan and wait for its report.
  pub async fn submit(
    &self,
    plan: PlanDef,
    input: serde_json::Value,
  ) -> Result<ExecutionReport, OrchestratorError> {
    let (reply, response) = oneshot::channel();
    self
      .sender
      .send(PlanRequest { plan, input, reply })
      .await
      .map_err(|_| OrchestratorError::RunnerClosed)?;
    response.await.map_err(|_| OrchestratorError::RunnerClosed)?
  }

  pub fn is_closed(&self) -> bool {
    self.sender.is_closed()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use cadence_config::{EngineConfig, PlanNode};
  use cadence_registry::Registry;
  use std::time::Duration;

  fn create_test_orchestrator() -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(
      Arc::new(Registry::new()),
      EngineConfig::default(),
    ))
  }

  #[tokio::test]
  async fn test_handle_cloning() {
    let runner = PlanRunner::new(create_test_orchestrator());

    let handle1 = runner.handle();
    let handle2 = handle1.clone();

    assert!(!handle1.is_closed());
    assert!(!handle2.is_closed());
  }

  #[tokio::test]
  async fn test_submit_returns_report() {
    let runner = PlanRunner::new(create_test_orchestrator());
    let handle = runner.handle();
    let cancel = CancellationToken::new();
    let loop_handle = tokio::spawn(runner.start(cancel.clone()));

    let report = handle
      .submit(PlanDef::new("empty", vec![]), serde_json::json!({}))
      .await
      .unwrap();

    assert!(report.is_success());
    assert_eq!(report.plan_id, "empty");

    cancel.cancel();
    loop_handle.await.unwrap();
  }

  #[tokio::test]
  async fn test_invalid_plan_is_returned_to_submitter() {
    let runner = PlanRunner::new(create_test_orchestrator());
    let handle = runner.handle();
    let cancel = CancellationToken::new();
    tokio::spawn(runner.start(cancel.clone()));

    let err = handle
      .submit(
        PlanDef::new("bad", vec![PlanNode::step("Missing")]),
        serde_json::Value::Null,
      )
      .await
      .unwrap_err();

    assert!(matches!(err, OrchestratorError::Validation(_)));
    cancel.cancel();
  }

  #[tokio::test]
  async fn test_cancellation() {
    let runner = PlanRunner::new(create_test_orchestrator());
    let handle = runner.handle();

    let cancel = CancellationToken::new();
    let loop_handle = tokio::spawn(runner.start(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();
    loop_handle.await.unwrap();

    let err = handle
      .submit(PlanDef::new("late", vec![]), serde_json::Value::Null)
      .await
      .unwrap_err();
    assert!(matches!(err, OrchestratorError::RunnerClosed));
  }

  #[tokio::test]
  async fn test_loop_exits_when_handles_dropped() {
    let runner = PlanRunner::new(create_test_orchestrator());
    let handle = runner.handle();
    let loop_handle = tokio::spawn(runner.start(CancellationToken::new()));

    drop(handle);

    tokio::time::timeout(Duration::from_secs(1), loop_handle)
      .await
      .unwrap()
      .unwrap();
  }
}
