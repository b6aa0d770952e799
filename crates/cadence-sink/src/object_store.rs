use std::sync::Arc;

use async_trait::async_trait;
use cadence_config::SinkKind;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::backend::ObjectStore;
use crate::error::SinkError;
use crate::sink::{Deadline, Sink, WriteReceipt};

/// Writes `{ "key": string, "data": any }` payloads as objects in one bucket.
///
/// String `data` is stored as-is, anything else as JSON. Object stores have no
/// transactions, so a failed batch is undone by restoring every object it
/// touched to its previous content.
///
/// Batches from concurrent runs are serialized: a batch holds the sink's write
/// lock from its first read until it is stored or undone, so one batch's undo
/// never restores over another batch's objects.
pub struct ObjectStoreSink {
  bucket: String,
  store: Arc<dyn ObjectStore>,
  write_lock: Mutex<()>,
}

struct Applied {
  key: String,
  previous: Option<Vec<u8>>,
}

impl ObjectStoreSink {
  pub fn new(bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
    Self {
      bucket: bucket.into(),
      store,
      write_lock: Mutex::new(()),
    }
  }

  pub fn bucket(&self) -> &str {
    &self.bucket
  }

  fn parse(batch: &[Value]) -> Result<Vec<(String, Vec<u8>)>, SinkError> {
    batch
      .iter()
      .enumerate()
      .map(|(index, payload)| {
        let key = payload
          .get("key")
          .and_then(Value::as_str)
          .ok_or_else(|| SinkError::InvalidPayload {
            index,
            message: "expected a string 'key'".to_string(),
          })?;
        let data = payload.get("data").ok_or_else(|| SinkError::InvalidPayload {
          index,
          message: "missing 'data'".to_string(),
        })?;
        let body = match data {
          Value::String(s) => s.clone().into_bytes(),
          other => serde_json::to_vec(other).map_err(|e| SinkError::InvalidPayload {
            index,
            message: e.to_string(),
          })?,
        };
        Ok((key.to_string(), body))
      })
      .collect()
  }

  async fn put_all(
    &self,
    objects: Vec<(String, Vec<u8>)>,
    applied: &mut Vec<Applied>,
    deadline: Deadline,
  ) -> Result<(), SinkError> {
    for (key, body) in objects {
      let previous = deadline
        .run(self.store.get(&self.bucket, &key))
        .await?
        .map_err(|e| SinkError::Backend { message: e.message })?;
      let stored = deadline.run(self.store.put(&self.bucket, &key, body)).await;
      match stored {
        Ok(Ok(())) => applied.push(Applied { key, previous }),
        Ok(Err(e)) => return Err(SinkError::Backend { message: e.message }),
        // An abandoned put may still land, so it is undone with the rest.
        Err(timeout) => {
          applied.push(Applied { key, previous });
          return Err(timeout);
        }
      }
    }
    Ok(())
  }

  async fn undo(&self, applied: Vec<Applied>) -> Result<(), String> {
    for Applied { key, previous } in applied.into_iter().rev() {
      let restored = match previous {
        Some(body) => self.store.put(&self.bucket, &key, body).await,
        None => self.store.delete(&self.bucket, &key).await,
      };
      restored.map_err(|e| format!("restoring '{}': {}", key, e))?;
    }
    Ok(())
  }
}

#[async_trait]
impl Sink for ObjectStoreSink {
  fn kind(&self) -> SinkKind {
    SinkKind::ObjectStore
  }

  async fn write(&self, batch: &[Value], deadline: Deadline) -> Result<WriteReceipt, SinkError> {
    let objects = Self::parse(batch)?;
    let written = objects.len();
    let _guard = deadline.run(self.write_lock.lock()).await?;

    let mut applied = Vec::with_capacity(written);
    match self.put_all(objects, &mut applied, deadline).await {
      Ok(()) => {
        debug!(bucket = %self.bucket, written, "objects stored");
        Ok(WriteReceipt { written })
      }
      Err(cause) => {
        warn!(bucket = %self.bucket, undo = applied.len(), error = %cause, "undoing partial batch");
        match self.undo(applied).await {
          Ok(()) => Err(cause),
          Err(message) => Err(SinkError::RollbackFailed {
            cause: cause.to_string(),
            message,
          }),
        }
      }
    }
  }
}
