//! The write phase: one all-or-nothing write per sink, in declared order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cadence_config::{PlanDef, SinkKind};
use cadence_retry::{Retrier, RetryPolicy, Sleeper};
use cadence_sink::{Deadline, SinkError};
use cadence_task::TaskResult;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::batch::SinkBatch;
use crate::events::ExecutionEvent;
use crate::executor::{PlanExecutor, Run};
use crate::report::{WriteOutcome, WriteStatus};

/// Backoff wait that ends as soon as the run is cancelled.
struct CancellableSleeper {
  inner: Arc<dyn Sleeper>,
  cancel: CancellationToken,
}

#[async_trait]
impl Sleeper for CancellableSleeper {
  async fn sleep(&self, duration: Duration) {
    tokio::select! {
      _ = self.cancel.cancelled() => {}
      _ = self.inner.sleep(duration) => {}
    }
  }
}

impl PlanExecutor {
  /// Write every group in `batch`, following `plan.sink_order`.
  ///
  /// Groups routed to a kind the plan does not list are reported as failed
  /// rather than written in an inferred order. The write timeout is handed to
  /// each sink as a fresh [`Deadline`] per attempt.
  pub(crate) async fn write_batches(
    &self,
    plan: &PlanDef,
    mut batch: SinkBatch,
    run: &Run,
  ) -> Vec<WriteOutcome> {
    let timeout = plan
      .write_timeout_ms
      .or(self.config.write_timeout_ms)
      .map(Duration::from_millis);

    let mut outcomes = Vec::new();
    for &kind in &plan.sink_order {
      let Some(results) = batch.take(kind) else {
        continue;
      };
      if results.is_empty() {
        continue;
      }
      outcomes.push(self.write_one(kind, results, timeout, run).await);
    }

    for kind in batch.kinds() {
      if let Some(results) = batch.take(kind) {
        let error = SinkError::Undeclared { sink: kind };
        outcomes.push(self.write_failed(run, kind, results.len(), error, 0, Instant::now()));
      }
    }

    outcomes
  }

  async fn write_one(
    &self,
    kind: SinkKind,
    results: Vec<TaskResult>,
    timeout: Option<Duration>,
    run: &Run,
  ) -> WriteOutcome {
    let started = Instant::now();
    let payloads: Vec<serde_json::Value> = results.into_iter().map(|r| r.payload).collect();

    if run.cancel.is_cancelled() {
      return self.write_failed(run, kind, payloads.len(), SinkError::Cancelled, 0, started);
    }

    let sink = match self.registry.sink(kind) {
      Ok(sink) => sink,
      Err(_) => {
        let error = SinkError::NotRegistered { sink: kind };
        return self.write_failed(run, kind, payloads.len(), error, 0, started);
      }
    };

    let policy = sink.retry_policy().unwrap_or_else(RetryPolicy::no_retry);
    let sleeper = CancellableSleeper {
      inner: self.sleeper.clone(),
      cancel: run.cancel.clone(),
    };
    let retrier = Retrier::with_sleeper(policy, Arc::new(sleeper));
    let batch = payloads.as_slice();
    let sink = sink.as_ref();

    let outcome = retrier
      .execute_when(
        |attempt| async move {
          if attempt > 1 {
            if run.cancel.is_cancelled() {
              return Err(SinkError::Cancelled);
            }
            warn!(
              execution_id = %run.execution_id,
              sink = %kind,
              attempt,
              "sink_write_retry"
            );
          }

          info!(
            execution_id = %run.execution_id,
            sink = %kind,
            payloads = batch.len(),
            attempt,
            "sink_write_started"
          );
          self.notifier.notify(ExecutionEvent::SinkWriteStarted {
            execution_id: run.execution_id.clone(),
            sink: kind,
            payloads: batch.len(),
            attempt,
          });

          sink.write(batch, Deadline::from_timeout(timeout)).await
        },
        SinkError::is_retryable,
      )
      .await;

    match outcome.result {
      Ok(receipt) => {
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
          execution_id = %run.execution_id,
          sink = %kind,
          written = receipt.written,
          attempts = outcome.attempts,
          duration_ms,
          "sink_write_completed"
        );
        self.notifier.notify(ExecutionEvent::SinkWriteCompleted {
          execution_id: run.execution_id.clone(),
          sink: kind,
          attempts: outcome.attempts,
        });
        WriteOutcome {
          sink: kind,
          payloads: batch.len(),
          status: WriteStatus::Written {
            attempts: outcome.attempts,
          },
          duration_ms,
        }
      }
      Err(error) => self.write_failed(run, kind, batch.len(), error, outcome.attempts, started),
    }
  }

  fn write_failed(
    &self,
    run: &Run,
    kind: SinkKind,
    payloads: usize,
    error: SinkError,
    attempts: u32,
    started: Instant,
  ) -> WriteOutcome {
    let duration_ms = started.elapsed().as_millis() as u64;
    error!(
      execution_id = %run.execution_id,
      sink = %kind,
      payloads,
      attempts,
      error = %error,
      "sink_write_failed"
    );
    self.notifier.notify(ExecutionEvent::SinkWriteFailed {
      execution_id: run.execution_id.clone(),
      sink: kind,
      error: error.clone(),
    });
    WriteOutcome {
      sink: kind,
      payloads,
      status: WriteStatus::Failed { error, attempts },
      duration_ms,
    }
  }
}
