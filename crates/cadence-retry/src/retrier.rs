use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use tracing::warn;

use crate::policy::RetryPolicy;
use crate::sleeper::{Sleeper, TokioSleeper};

/// Result of a retried operation plus how many times it was invoked.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
  pub result: Result<T, E>,
  pub attempts: u32,
}

/// Runs operations under a [`RetryPolicy`].
#[derive(Clone)]
pub struct Retrier {
  policy: RetryPolicy,
  sleeper: Arc<dyn Sleeper>,
}

impl Retrier {
  /// Retrier that waits on the tokio timer.
  pub fn new(policy: RetryPolicy) -> Self {
    Self::with_sleeper(policy, Arc::new(TokioSleeper))
  }

  pub fn with_sleeper(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
    Self { policy, sleeper }
  }

  pub fn policy(&self) -> &RetryPolicy {
    &self.policy
  }

  /// Run `operation` until it succeeds or `max_attempts` is reached,
  /// surfacing the last error.
  pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
  where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
  {
    self.execute_when(operation, |_| true).await.result
  }

  /// Like [`Retrier::execute`], but stops early on errors for which
  /// `should_retry` returns false. The operation receives the 1-based
  /// attempt number.
  pub async fn execute_when<T, E, F, Fut, P>(
    &self,
    mut operation: F,
    should_retry: P,
  ) -> RetryOutcome<T, E>
  where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
  {
    let max_attempts = self.policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
      match operation(attempt).await {
        Ok(value) => {
          return RetryOutcome {
            result: Ok(value),
            attempts: attempt,
          };
        }
        Err(e) => {
          if attempt >= max_attempts || !should_retry(&e) {
            return RetryOutcome {
              result: Err(e),
              attempts: attempt,
            };
          }

          let delay = self.policy.delay_for(attempt);
          warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %e,
            "retrying after failure"
          );
          self.sleeper.sleep(delay).await;
          attempt += 1;
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::time::Duration;

  use super::*;
  use crate::sleeper::RecordingSleeper;

  fn recording(policy: RetryPolicy) -> (Retrier, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::new());
    (Retrier::with_sleeper(policy, sleeper.clone()), sleeper)
  }

  fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
      initial_interval_ms: 100,
      backoff_coefficient: 2.0,
      max_interval_ms: 300,
      max_attempts,
    }
  }

  #[tokio::test]
  async fn test_exhausts_attempts_and_surfaces_last_error() {
    let (retrier, sleeper) = recording(policy(4));
    let calls = AtomicU32::new(0);

    let outcome = retrier
      .execute_when(
        |attempt| {
          calls.fetch_add(1, Ordering::SeqCst);
          async move { Err::<(), String>(format!("failure {}", attempt)) }
        },
        |_| true,
      )
      .await;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(outcome.attempts, 4);
    assert_eq!(outcome.result.unwrap_err(), "failure 4");
    assert_eq!(
      sleeper.delays(),
      vec![
        Duration::from_millis(100),
        Duration::from_millis(200),
        Duration::from_millis(300),
      ]
    );
  }

  #[tokio::test]
  async fn test_succeeds_after_transient_failures() {
    let (retrier, sleeper) = recording(policy(5));

    let result = retrier
      .execute(|attempt| async move {
        if attempt < 3 {
          Err("flaky".to_string())
        } else {
          Ok(attempt)
        }
      })
      .await;

    assert_eq!(result, Ok(3));
    assert_eq!(sleeper.delays().len(), 2);
  }

  #[tokio::test]
  async fn test_non_retryable_error_stops_immediately() {
    let (retrier, sleeper) = recording(policy(5));

    let outcome = retrier
      .execute_when(
        |_| async { Err::<(), &str>("bad request") },
        |e| *e != "bad request",
      )
      .await;

    assert_eq!(outcome.attempts, 1);
    assert!(sleeper.delays().is_empty());
  }

  #[tokio::test]
  async fn test_single_attempt_policy_never_sleeps() {
    let (retrier, sleeper) = recording(RetryPolicy::no_retry());
    let result = retrier.execute(|_| async { Err::<(), &str>("nope") }).await;
    assert_eq!(result, Err("nope"));
    assert!(sleeper.delays().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_tokio_sleeper_waits_on_timer() {
    let retrier = Retrier::new(policy(2));
    let start = tokio::time::Instant::now();
    let _ = retrier.execute(|_| async { Err::<(), &str>("x") }).await;
    assert!(start.elapsed() >= Duration::from_millis(100));
  }
}
