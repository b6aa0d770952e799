//! Sink write errors.

use cadence_config::SinkKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by [`crate::Sink::write`].
///
/// Apart from [`SinkError::RollbackFailed`], every variant means nothing from
/// the batch was persisted.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkError {
  /// A payload does not have the shape this sink expects.
  #[error("payload {index} is invalid: {message}")]
  InvalidPayload { index: usize, message: String },

  /// The backend rejected or failed an operation.
  #[error("backend error: {message}")]
  Backend { message: String },

  /// The remote endpoint answered with a non-success status.
  #[error("endpoint returned status {status}")]
  HttpStatus { status: u16 },

  /// The request never produced a response.
  #[error("transport error: {message}")]
  Transport { message: String },

  /// The write did not finish in time.
  #[error("write timed out after {timeout_ms}ms")]
  Timeout { timeout_ms: u64 },

  /// The run was cancelled before the write started.
  #[error("write cancelled")]
  Cancelled,

  /// Results were routed to a kind with no registered sink.
  #[error("no {sink} sink is registered")]
  NotRegistered { sink: SinkKind },

  /// Results were routed to a kind missing from the plan's sink order.
  #[error("{sink} is not in the plan's sink order")]
  Undeclared { sink: SinkKind },

  /// A failed write could not be undone. The batch may be partially applied.
  #[error("rollback failed after '{cause}': {message}")]
  RollbackFailed { cause: String, message: String },
}

impl SinkError {
  /// Whether trying the whole batch again may succeed.
  pub fn is_retryable(&self) -> bool {
    match self {
      SinkError::Backend { .. } | SinkError::Transport { .. } | SinkError::Timeout { .. } => true,
      SinkError::HttpStatus { status } => *status >= 500 || *status == 429,
      SinkError::InvalidPayload { .. }
      | SinkError::Cancelled
      | SinkError::NotRegistered { .. }
      | SinkError::Undeclared { .. }
      | SinkError::RollbackFailed { .. } => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_retryable_statuses() {
    assert!(SinkError::HttpStatus { status: 503 }.is_retryable());
    assert!(SinkError::HttpStatus { status: 429 }.is_retryable());
    assert!(!SinkError::HttpStatus { status: 400 }.is_retryable());
    assert!(!SinkError::HttpStatus { status: 404 }.is_retryable());
  }

  #[test]
  fn test_partial_state_is_never_retried() {
    let err = SinkError::RollbackFailed {
      cause: "put failed".to_string(),
      message: "delete failed".to_string(),
    };
    assert!(!err.is_retryable());
    assert!(!SinkError::Cancelled.is_retryable());
  }

  #[test]
  fn test_wire_shape() {
    let value = serde_json::to_value(SinkError::Timeout { timeout_ms: 30 }).unwrap();
    assert_eq!(
      value,
      serde_json::json!({ "kind": "timeout", "timeout_ms": 30 })
    );
  }
}
