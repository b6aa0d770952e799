//! Errors raised by task implementations.

use thiserror::Error;

/// Error returned from a single lifecycle stage.
#[derive(Debug, Error)]
pub enum TaskError {
  /// The stage could not do its work.
  #[error("{message}")]
  Failed { message: String },

  /// The task input is unusable.
  #[error("invalid input: {message}")]
  InvalidInput { message: String },
}

impl TaskError {
  pub fn failed(message: impl Into<String>) -> Self {
    TaskError::Failed {
      message: message.into(),
    }
  }

  pub fn invalid_input(message: impl Into<String>) -> Self {
    TaskError::InvalidInput {
      message: message.into(),
    }
  }
}
