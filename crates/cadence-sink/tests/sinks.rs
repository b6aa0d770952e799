use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cadence_sink::memory::{MemoryDatabase, MemoryHttpTransport, MemoryObjectStore};
use cadence_sink::{
  BackendError, DatabaseSink, Deadline, HttpApiSink, ObjectStore, ObjectStoreSink, Sink,
  SinkError, SinkKind,
};
use serde_json::{Value, json};

/// Memory store whose chosen puts never finish or fail after a delay.
#[derive(Default)]
struct StallingStore {
  inner: Arc<MemoryObjectStore>,
  puts: AtomicUsize,
  stall_put_at: Option<usize>,
  slow_failure: Option<(&'static str, Duration)>,
}

#[async_trait]
impl ObjectStore for StallingStore {
  async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
    self.inner.get(bucket, key).await
  }

  async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), BackendError> {
    let nth = self.puts.fetch_add(1, Ordering::SeqCst) + 1;
    if self.stall_put_at == Some(nth) {
      std::future::pending::<()>().await;
    }
    if let Some((failing, delay)) = self.slow_failure {
      if key == failing {
        tokio::time::sleep(delay).await;
        return Err(BackendError::new(format!("put '{}' failed", key)));
      }
    }
    self.inner.put(bucket, key, body).await
  }

  async fn delete(&self, bucket: &str, key: &str) -> Result<(), BackendError> {
    self.inner.delete(bucket, key).await
  }
}

fn objects(n: usize) -> Vec<Value> {
  (0..n)
    .map(|i| json!({ "key": format!("obj-{i}"), "data": { "i": i } }))
    .collect()
}

fn statements(n: usize) -> Vec<Value> {
  (0..n)
    .map(|i| json!({ "query": "INSERT INTO t (i) VALUES (:i)", "params": { "i": i } }))
    .collect()
}

#[tokio::test]
async fn test_object_store_writes_every_payload() {
  let store = Arc::new(MemoryObjectStore::new());
  let sink = ObjectStoreSink::new("results", store.clone());

  let receipt = sink.write(&objects(3), Deadline::none()).await.unwrap();

  assert_eq!(receipt.written, 3);
  let stored = store.objects("results");
  assert_eq!(stored.len(), 3);
  assert_eq!(stored[0], ("obj-0".to_string(), br#"{"i":0}"#.to_vec()));
  assert_eq!(sink.kind(), SinkKind::ObjectStore);
}

#[tokio::test]
async fn test_object_store_string_data_is_stored_raw() {
  let store = Arc::new(MemoryObjectStore::new());
  let sink = ObjectStoreSink::new("results", store.clone());

  sink
    .write(&[json!({ "key": "report.txt", "data": "plain text" })], Deadline::none())
    .await
    .unwrap();

  assert_eq!(
    store.objects("results"),
    vec![("report.txt".to_string(), b"plain text".to_vec())]
  );
}

#[tokio::test]
async fn test_object_store_failure_midway_persists_nothing() {
  let store = Arc::new(MemoryObjectStore::new());
  let sink = ObjectStoreSink::new("results", store.clone());
  let batch = objects(6);

  store.fail_put_at(batch.len() / 2);
  let err = sink.write(&batch, Deadline::none()).await.unwrap_err();

  assert!(matches!(err, SinkError::Backend { .. }));
  assert!(store.is_empty());
}

#[tokio::test]
async fn test_object_store_rollback_restores_overwritten_objects() {
  let store = Arc::new(MemoryObjectStore::new());
  let sink = ObjectStoreSink::new("results", store.clone());
  sink
    .write(&[json!({ "key": "obj-0", "data": "original" })], Deadline::none())
    .await
    .unwrap();

  store.fail_put_at(2);
  sink.write(&objects(2), Deadline::none()).await.unwrap_err();

  assert_eq!(
    store.objects("results"),
    vec![("obj-0".to_string(), b"original".to_vec())]
  );
}

#[tokio::test]
async fn test_object_store_failed_undo_is_reported() {
  let store = Arc::new(MemoryObjectStore::new());
  let sink = ObjectStoreSink::new("results", store.clone());

  store.fail_put_at(3);
  store.fail_delete_at(1);
  let err = sink.write(&objects(4), Deadline::none()).await.unwrap_err();

  assert!(matches!(err, SinkError::RollbackFailed { .. }));
  assert!(!err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_object_store_timeout_midway_persists_nothing() {
  let store = StallingStore {
    stall_put_at: Some(2),
    ..StallingStore::default()
  };
  let stored = store.inner.clone();
  let sink = ObjectStoreSink::new("results", Arc::new(store));
  let batch = vec![
    json!({ "key": "a", "data": "a" }),
    json!({ "key": "b", "data": "b" }),
  ];

  let err = sink
    .write(&batch, Deadline::after(Duration::from_millis(100)))
    .await
    .unwrap_err();

  assert_eq!(err, SinkError::Timeout { timeout_ms: 100 });
  assert!(stored.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_object_store_concurrent_batches_do_not_undo_each_other() {
  let store = StallingStore {
    slow_failure: Some(("broken", Duration::from_millis(50))),
    ..StallingStore::default()
  };
  let stored = store.inner.clone();
  let sink = ObjectStoreSink::new("results", Arc::new(store));
  let failing = vec![
    json!({ "key": "shared", "data": "first" }),
    json!({ "key": "broken", "data": "never" }),
  ];
  let succeeding = vec![json!({ "key": "shared", "data": "second" })];

  let (first, second) = tokio::join!(sink.write(&failing, Deadline::none()), async {
    tokio::time::sleep(Duration::from_millis(10)).await;
    sink.write(&succeeding, Deadline::none()).await
  });

  assert!(matches!(first, Err(SinkError::Backend { .. })));
  assert_eq!(second.unwrap().written, 1);
  assert_eq!(
    stored.objects("results"),
    vec![("shared".to_string(), b"second".to_vec())]
  );
}

#[tokio::test]
async fn test_object_store_rejects_malformed_batch_before_writing() {
  let store = Arc::new(MemoryObjectStore::new());
  let sink = ObjectStoreSink::new("results", store.clone());
  let mut batch = objects(3);
  batch[2] = json!({ "data": 1 });

  let err = sink.write(&batch, Deadline::none()).await.unwrap_err();

  assert_eq!(
    err,
    SinkError::InvalidPayload {
      index: 2,
      message: "expected a string 'key'".to_string(),
    }
  );
  assert!(store.is_empty());
}

#[tokio::test]
async fn test_database_commits_batch_in_one_transaction() {
  let db = MemoryDatabase::new();
  let sink = DatabaseSink::new(Arc::new(db.clone()));

  let receipt = sink.write(&statements(4), Deadline::none()).await.unwrap();

  assert_eq!(receipt.written, 4);
  assert_eq!(db.commits(), 1);
  let committed = db.committed();
  assert_eq!(committed.len(), 4);
  assert_eq!(committed[3].params["i"], json!(3));
}

#[tokio::test]
async fn test_database_failure_midway_rolls_back() {
  let db = MemoryDatabase::new();
  let sink = DatabaseSink::new(Arc::new(db.clone()));
  let batch = statements(8);

  db.fail_statement_at(batch.len() / 2);
  let err = sink.write(&batch, Deadline::none()).await.unwrap_err();

  assert!(matches!(err, SinkError::Backend { .. }));
  assert!(db.committed().is_empty());
  assert_eq!(db.commits(), 0);
  assert_eq!(db.rollbacks(), 1);
}

#[tokio::test]
async fn test_database_commit_failure_persists_nothing() {
  let db = MemoryDatabase::new();
  let sink = DatabaseSink::new(Arc::new(db.clone()));

  db.fail_commit_at(1);
  sink.write(&statements(2), Deadline::none()).await.unwrap_err();

  assert!(db.committed().is_empty());
}

#[tokio::test]
async fn test_database_params_must_be_an_object() {
  let db = MemoryDatabase::new();
  let sink = DatabaseSink::new(Arc::new(db.clone()));

  let err = sink
    .write(&[json!({ "query": "DELETE FROM t", "params": [1, 2] })], Deadline::none())
    .await
    .unwrap_err();

  assert!(matches!(err, SinkError::InvalidPayload { index: 0, .. }));
  assert_eq!(db.rollbacks(), 0);
}

#[tokio::test]
async fn test_database_concurrent_batches_do_not_interleave() {
  let db = MemoryDatabase::new();
  let sink = Arc::new(DatabaseSink::new(Arc::new(db.clone())));

  let handles: Vec<_> = (0..4)
    .map(|batch| {
      let sink = sink.clone();
      tokio::spawn(async move {
        let payloads: Vec<Value> = (0..5)
          .map(|i| json!({ "query": "INSERT", "params": { "batch": batch, "i": i } }))
          .collect();
        sink.write(&payloads, Deadline::none()).await
      })
    })
    .collect();
  for handle in handles {
    handle.await.unwrap().unwrap();
  }

  let committed = db.committed();
  assert_eq!(committed.len(), 20);
  for chunk in committed.chunks(5) {
    let batch = &chunk[0].params["batch"];
    assert!(chunk.iter().all(|s| &s.params["batch"] == batch));
  }
}

#[tokio::test]
async fn test_http_posts_whole_batch_as_one_request() {
  let transport = Arc::new(MemoryHttpTransport::new());
  let sink = HttpApiSink::new("https://hooks.local/results", transport.clone());
  let batch = vec![json!({ "id": 1 }), json!({ "id": 2 })];

  let receipt = sink.write(&batch, Deadline::none()).await.unwrap();

  assert_eq!(receipt.written, 2);
  let requests = transport.requests();
  assert_eq!(requests.len(), 1);
  assert_eq!(requests[0].0, "https://hooks.local/results");
  assert_eq!(requests[0].1, json!([{ "id": 1 }, { "id": 2 }]));
}

#[tokio::test]
async fn test_http_status_mapping() {
  let transport = Arc::new(MemoryHttpTransport::new());
  let sink = HttpApiSink::new("https://hooks.local/results", transport.clone());

  transport.respond_with(503);
  transport.respond_with(422);
  transport.fail_with("connection reset");

  let first = sink.write(&[json!(1)], Deadline::none()).await.unwrap_err();
  let second = sink.write(&[json!(1)], Deadline::none()).await.unwrap_err();
  let third = sink.write(&[json!(1)], Deadline::none()).await.unwrap_err();

  assert_eq!(first, SinkError::HttpStatus { status: 503 });
  assert!(first.is_retryable());
  assert_eq!(second, SinkError::HttpStatus { status: 422 });
  assert!(!second.is_retryable());
  assert!(matches!(third, SinkError::Transport { .. }));
  assert!(third.is_retryable());
  assert!(transport.accepted().is_empty());
}

#[test]
fn test_only_http_sink_retries_by_default() {
  let transport = Arc::new(MemoryHttpTransport::new());
  let http = HttpApiSink::new("https://hooks.local", transport);
  let db = DatabaseSink::new(Arc::new(MemoryDatabase::new()));
  let store = ObjectStoreSink::new("b", Arc::new(MemoryObjectStore::new()));

  let policy = http.retry_policy().unwrap();
  assert_eq!(policy.initial_interval_ms, 5_000);
  assert_eq!(policy.max_attempts, 5);
  assert!(db.retry_policy().is_none());
  assert!(store.retry_policy().is_none());
}
