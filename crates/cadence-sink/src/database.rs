use std::sync::Arc;

use async_trait::async_trait;
use cadence_config::SinkKind;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::backend::{Database, Transaction};
use crate::error::SinkError;
use crate::sink::{Deadline, Sink, WriteReceipt};

/// Executes `{ "query": string, "params": object }` payloads in one transaction.
///
/// Batches from concurrent runs are serialized: a batch holds the sink's write
/// lock from `begin` until commit or rollback. A batch whose deadline expires
/// before every statement has run is rolled back; the commit itself is not
/// cut short.
pub struct DatabaseSink {
  db: Arc<dyn Database>,
  write_lock: Mutex<()>,
}

impl DatabaseSink {
  pub fn new(db: Arc<dyn Database>) -> Self {
    Self {
      db,
      write_lock: Mutex::new(()),
    }
  }

  fn parse(batch: &[Value]) -> Result<Vec<(&str, Map<String, Value>)>, SinkError> {
    batch
      .iter()
      .enumerate()
      .map(|(index, payload)| {
        let query = payload
          .get("query")
          .and_then(Value::as_str)
          .ok_or_else(|| SinkError::InvalidPayload {
            index,
            message: "expected a string 'query'".to_string(),
          })?;
        let params = match payload.get("params") {
          None | Some(Value::Null) => Map::new(),
          Some(Value::Object(map)) => map.clone(),
          Some(_) => {
            return Err(SinkError::InvalidPayload {
              index,
              message: "'params' must be an object".to_string(),
            });
          }
        };
        Ok((query, params))
      })
      .collect()
  }
}

async fn execute_all(
  tx: &mut Box<dyn Transaction>,
  statements: &[(&str, Map<String, Value>)],
  deadline: Deadline,
) -> Result<(), SinkError> {
  for (query, params) in statements {
    deadline
      .run(tx.execute(query, params))
      .await?
      .map_err(|e| SinkError::Backend { message: e.message })?;
  }
  Ok(())
}

#[async_trait]
impl Sink for DatabaseSink {
  fn kind(&self) -> SinkKind {
    SinkKind::Database
  }

  async fn write(&self, batch: &[Value], deadline: Deadline) -> Result<WriteReceipt, SinkError> {
    let statements = Self::parse(batch)?;
    let _guard = deadline.run(self.write_lock.lock()).await?;

    let mut tx = deadline
      .run(self.db.begin())
      .await?
      .map_err(|e| SinkError::Backend { message: e.message })?;

    if let Err(cause) = execute_all(&mut tx, &statements, deadline).await {
      warn!(error = %cause, "rolling back batch");
      return match tx.rollback().await {
        Ok(()) => Err(cause),
        Err(e) => Err(SinkError::RollbackFailed {
          cause: cause.to_string(),
          message: e.message,
        }),
      };
    }

    tx.commit()
      .await
      .map_err(|e| SinkError::Backend { message: e.message })?;

    debug!(written = statements.len(), "transaction committed");
    Ok(WriteReceipt {
      written: statements.len(),
    })
  }
}
