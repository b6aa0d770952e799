//! Abstract storage backends the concrete sinks write through.

use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
  pub message: String,
}

impl BackendError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }
}

/// Key/value object storage (S3-like).
#[async_trait]
pub trait ObjectStore: Send + Sync {
  async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

  async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), BackendError>;

  async fn delete(&self, bucket: &str, key: &str) -> Result<(), BackendError>;
}

/// A relational store with transactions.
#[async_trait]
pub trait Database: Send + Sync {
  /// Open a transaction. Statements are invisible to readers until commit.
  async fn begin(&self) -> Result<Box<dyn Transaction>, BackendError>;
}

/// A database transaction. Dropping an uncommitted transaction discards it.
#[async_trait]
pub trait Transaction: Send {
  /// Execute one statement, returning the number of affected rows.
  async fn execute(
    &mut self,
    query: &str,
    params: &serde_json::Map<String, serde_json::Value>,
  ) -> Result<u64, BackendError>;

  async fn commit(self: Box<Self>) -> Result<(), BackendError>;

  async fn rollback(self: Box<Self>) -> Result<(), BackendError>;
}

/// Minimal HTTP client surface: POST a JSON body, get a status back.
#[async_trait]
pub trait HttpTransport: Send + Sync {
  async fn post(&self, endpoint: &str, body: &serde_json::Value) -> Result<u16, BackendError>;
}
