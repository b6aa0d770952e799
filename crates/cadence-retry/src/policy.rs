use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RetryError;

/// Exponential backoff policy.
///
/// Invariants: `max_attempts >= 1`, `backoff_coefficient >= 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
  pub initial_interval_ms: u64,
  pub backoff_coefficient: f64,
  pub max_interval_ms: u64,
  pub max_attempts: u32,
}

impl Default for RetryPolicy {
  /// 5s initial wait, doubling, capped at 60s, 5 attempts.
  fn default() -> Self {
    Self {
      initial_interval_ms: 5_000,
      backoff_coefficient: 2.0,
      max_interval_ms: 60_000,
      max_attempts: 5,
    }
  }
}

impl RetryPolicy {
  pub fn new(
    initial_interval: Duration,
    backoff_coefficient: f64,
    max_interval: Duration,
    max_attempts: u32,
  ) -> Result<Self, RetryError> {
    let policy = Self {
      initial_interval_ms: initial_interval.as_millis() as u64,
      backoff_coefficient,
      max_interval_ms: max_interval.as_millis() as u64,
      max_attempts,
    };
    policy.validate()?;
    Ok(policy)
  }

  /// A policy that runs the operation exactly once.
  pub fn no_retry() -> Self {
    Self {
      initial_interval_ms: 0,
      backoff_coefficient: 1.0,
      max_interval_ms: 0,
      max_attempts: 1,
    }
  }

  pub fn validate(&self) -> Result<(), RetryError> {
    if self.max_attempts < 1 {
      return Err(RetryError::InvalidPolicy {
        message: "max_attempts must be at least 1".to_string(),
      });
    }
    if !(self.backoff_coefficient >= 1.0) {
      return Err(RetryError::InvalidPolicy {
        message: format!(
          "backoff_coefficient must be >= 1, got {}",
          self.backoff_coefficient
        ),
      });
    }
    Ok(())
  }

  /// Wait after failed attempt `attempt` (1-based):
  /// `min(initial * coefficient^(attempt - 1), max_interval)`.
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let raw = self.initial_interval_ms as f64 * self.backoff_coefficient.powi(exponent);
    let capped = raw.min(self.max_interval_ms as f64);
    Duration::from_millis(capped as u64)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn policy(initial: u64, coefficient: f64, max: u64, attempts: u32) -> RetryPolicy {
    RetryPolicy::new(
      Duration::from_millis(initial),
      coefficient,
      Duration::from_millis(max),
      attempts,
    )
    .unwrap()
  }

  #[test]
  fn test_delay_grows_then_caps() {
    let p = policy(100, 2.0, 1_000, 10);
    let delays: Vec<u64> = (1..=6).map(|k| p.delay_for(k).as_millis() as u64).collect();
    assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
  }

  #[test]
  fn test_delay_matches_formula_for_every_attempt() {
    for (initial, coefficient, max, attempts) in
      [(5_000, 2.0, 60_000, 5), (10, 3.0, 500, 8), (250, 1.0, 100, 4), (1, 1.5, 10_000, 12)]
    {
      let p = policy(initial, coefficient, max, attempts);
      for k in 1..=attempts {
        let expected = (initial as f64 * coefficient.powi(k as i32 - 1)).min(max as f64) as u64;
        assert_eq!(p.delay_for(k), Duration::from_millis(expected), "attempt {}", k);
      }
    }
  }

  #[test]
  fn test_huge_attempt_does_not_overflow() {
    let p = policy(1_000, 10.0, 30_000, 3);
    assert_eq!(p.delay_for(u32::MAX), Duration::from_millis(30_000));
  }

  #[test]
  fn test_invariants() {
    assert!(matches!(
      RetryPolicy::new(Duration::ZERO, 2.0, Duration::ZERO, 0),
      Err(RetryError::InvalidPolicy { .. })
    ));
    assert!(matches!(
      RetryPolicy::new(Duration::ZERO, 0.5, Duration::ZERO, 3),
      Err(RetryError::InvalidPolicy { .. })
    ));
    assert!(
      RetryPolicy {
        backoff_coefficient: f64::NAN,
        ..RetryPolicy::default()
      }
      .validate()
      .is_err()
    );
    assert!(RetryPolicy::default().validate().is_ok());
    assert!(RetryPolicy::no_retry().validate().is_ok());
  }

  #[test]
  fn test_serde_shape() {
    let p: RetryPolicy = serde_json::from_str(
      r#"{ "initial_interval_ms": 5, "backoff_coefficient": 2.0, "max_interval_ms": 60, "max_attempts": 5 }"#,
    )
    .unwrap();
    assert_eq!(p.delay_for(3), Duration::from_millis(20));
  }
}
