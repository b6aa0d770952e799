use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use cadence_config::SinkKind;
use cadence_retry::RetryPolicy;
use tokio::time::Instant;

use crate::error::SinkError;

/// Acknowledgement of a fully persisted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
  /// Number of payloads persisted.
  pub written: usize,
}

/// Time budget for one write attempt.
///
/// Sinks bound each backend call with [`Deadline::run`]. An expired deadline
/// is an ordinary write failure: whatever the batch already applied is undone
/// or rolled back before [`SinkError::Timeout`] is returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline {
  expires: Option<(Instant, Duration)>,
}

impl Deadline {
  /// No time limit.
  pub fn none() -> Self {
    Self::default()
  }

  /// Expires `limit` from now.
  pub fn after(limit: Duration) -> Self {
    Self {
      expires: Some((Instant::now() + limit, limit)),
    }
  }

  pub fn from_timeout(limit: Option<Duration>) -> Self {
    limit.map(Self::after).unwrap_or_default()
  }

  pub fn is_expired(&self) -> bool {
    self
      .expires
      .is_some_and(|(at, _)| Instant::now() >= at)
  }

  /// Await `future`, failing with [`SinkError::Timeout`] once the deadline
  /// passes. The future is dropped on expiry.
  pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, SinkError> {
    match self.expires {
      Some((at, limit)) => tokio::time::timeout_at(at, future)
        .await
        .map_err(|_| SinkError::Timeout {
          timeout_ms: limit.as_millis() as u64,
        }),
      None => Ok(future.await),
    }
  }
}

/// A pluggable destination for task payloads.
///
/// Implementations must be all-or-nothing per batch, including when the
/// write's [`Deadline`] expires. A sink shared between concurrent plan runs
/// must document how it isolates concurrent batches.
#[async_trait]
pub trait Sink: Send + Sync {
  /// Identity used to route results to this sink.
  fn kind(&self) -> SinkKind;

  /// Policy the executor wraps around [`Sink::write`] for flaky resources.
  ///
  /// `None` means the batch is written once; sinks with native transactions
  /// roll back instead of retrying.
  fn retry_policy(&self) -> Option<RetryPolicy> {
    None
  }

  /// Persist `batch`, in order, before `deadline`.
  async fn write(
    &self,
    batch: &[serde_json::Value],
    deadline: Deadline,
  ) -> Result<WriteReceipt, SinkError>;
}
