use std::sync::Arc;

use async_trait::async_trait;
use cadence_config::SinkKind;
use cadence_retry::RetryPolicy;
use serde_json::Value;
use tracing::debug;

use crate::backend::HttpTransport;
use crate::error::SinkError;
use crate::sink::{Deadline, Sink, WriteReceipt};

/// Posts the whole batch as one JSON array to a configured endpoint.
///
/// One request per batch keeps the write all-or-nothing from the caller's
/// side: the endpoint either accepts the array (2xx) or it does not.
pub struct HttpApiSink {
  endpoint: String,
  transport: Arc<dyn HttpTransport>,
  retry: RetryPolicy,
}

impl HttpApiSink {
  pub fn new(endpoint: impl Into<String>, transport: Arc<dyn HttpTransport>) -> Self {
    Self {
      endpoint: endpoint.into(),
      transport,
      retry: RetryPolicy::default(),
    }
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }
}

#[async_trait]
impl Sink for HttpApiSink {
  fn kind(&self) -> SinkKind {
    SinkKind::HttpApi
  }

  fn retry_policy(&self) -> Option<RetryPolicy> {
    Some(self.retry.clone())
  }

  async fn write(&self, batch: &[Value], deadline: Deadline) -> Result<WriteReceipt, SinkError> {
    let body = Value::Array(batch.to_vec());
    let status = deadline
      .run(self.transport.post(&self.endpoint, &body))
      .await?
      .map_err(|e| SinkError::Transport { message: e.message })?;

    if !(200..300).contains(&status) {
      return Err(SinkError::HttpStatus { status });
    }

    debug!(endpoint = %self.endpoint, status, written = batch.len(), "batch accepted");
    Ok(WriteReceipt {
      written: batch.len(),
    })
  }
}
