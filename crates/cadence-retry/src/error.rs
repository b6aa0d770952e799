use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RetryError {
  /// The policy violates one of its invariants.
  #[error("invalid retry policy: {message}")]
  InvalidPolicy { message: String },
}
