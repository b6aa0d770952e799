use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

/// Non-blocking wait between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
  async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
  async fn sleep(&self, duration: Duration) {
    tokio::time::sleep(duration).await;
  }
}

/// Records requested waits and returns immediately.
///
/// Useful for tests or dry runs where wall-clock time should not pass.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
  delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every wait requested so far, in order.
  pub fn delays(&self) -> Vec<Duration> {
    self
      .delays
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .clone()
  }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
  async fn sleep(&self, duration: Duration) {
    self
      .delays
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(duration);
  }
}
