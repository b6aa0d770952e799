//! In-process backends with fault injection.
//!
//! Each backend counts its calls so a test can make the n-th one fail and
//! then inspect what was actually persisted.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::backend::{BackendError, Database, HttpTransport, ObjectStore, Transaction};

/// Arms a failure on the n-th call (1-based) counted from when it was armed.
#[derive(Default)]
struct Fault {
  calls: AtomicUsize,
  fail_at: Mutex<Option<usize>>,
}

impl Fault {
  fn arm(&self, nth: usize) {
    self.calls.store(0, Ordering::SeqCst);
    *self.fail_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(nth);
  }

  fn disarm(&self) {
    *self.fail_at.lock().unwrap_or_else(|e| e.into_inner()) = None;
  }

  fn hit(&self) -> bool {
    let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
    *self.fail_at.lock().unwrap_or_else(|e| e.into_inner()) == Some(call)
  }
}

/// An object store backed by a map of `(bucket, key)` to bytes.
#[derive(Default)]
pub struct MemoryObjectStore {
  objects: RwLock<BTreeMap<(String, String), Vec<u8>>>,
  put_fault: Fault,
  delete_fault: Fault,
}

impl MemoryObjectStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Fail the n-th `put` from now on.
  pub fn fail_put_at(&self, nth: usize) {
    self.put_fault.arm(nth);
  }

  /// Fail the n-th `delete` from now on.
  pub fn fail_delete_at(&self, nth: usize) {
    self.delete_fault.arm(nth);
  }

  pub fn clear_faults(&self) {
    self.put_fault.disarm();
    self.delete_fault.disarm();
  }

  /// Keys and bodies currently stored in `bucket`, sorted by key.
  pub fn objects(&self, bucket: &str) -> Vec<(String, Vec<u8>)> {
    let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
    objects
      .iter()
      .filter(|((b, _), _)| b == bucket)
      .map(|((_, k), v)| (k.clone(), v.clone()))
      .collect()
  }

  pub fn len(&self) -> usize {
    self.objects.read().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
  async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
    let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
    Ok(objects.get(&(bucket.to_string(), key.to_string())).cloned())
  }

  async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), BackendError> {
    if self.put_fault.hit() {
      return Err(BackendError::new(format!("injected put failure for '{}'", key)));
    }
    let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
    objects.insert((bucket.to_string(), key.to_string()), body);
    Ok(())
  }

  async fn delete(&self, bucket: &str, key: &str) -> Result<(), BackendError> {
    if self.delete_fault.hit() {
      return Err(BackendError::new(format!(
        "injected delete failure for '{}'",
        key
      )));
    }
    let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
    objects.remove(&(bucket.to_string(), key.to_string()));
    Ok(())
  }
}

/// A statement that reached a committed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
  pub query: String,
  pub params: Map<String, Value>,
}

#[derive(Default)]
struct DatabaseState {
  committed: Mutex<Vec<Statement>>,
  execute_fault: Fault,
  commit_fault: Fault,
  commits: AtomicUsize,
  rollbacks: AtomicUsize,
}

/// A database whose transactions buffer statements until commit.
#[derive(Default, Clone)]
pub struct MemoryDatabase {
  state: Arc<DatabaseState>,
}

impl MemoryDatabase {
  pub fn new() -> Self {
    Self::default()
  }

  /// Fail the n-th `execute` from now on, across transactions.
  pub fn fail_statement_at(&self, nth: usize) {
    self.state.execute_fault.arm(nth);
  }

  /// Fail the n-th `commit` from now on.
  pub fn fail_commit_at(&self, nth: usize) {
    self.state.commit_fault.arm(nth);
  }

  pub fn clear_faults(&self) {
    self.state.execute_fault.disarm();
    self.state.commit_fault.disarm();
  }

  /// Every committed statement, in commit order.
  pub fn committed(&self) -> Vec<Statement> {
    self
      .state
      .committed
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .clone()
  }

  pub fn commits(&self) -> usize {
    self.state.commits.load(Ordering::SeqCst)
  }

  pub fn rollbacks(&self) -> usize {
    self.state.rollbacks.load(Ordering::SeqCst)
  }
}

struct MemoryTransaction {
  state: Arc<DatabaseState>,
  pending: Vec<Statement>,
}

#[async_trait]
impl Database for MemoryDatabase {
  async fn begin(&self) -> Result<Box<dyn Transaction>, BackendError> {
    Ok(Box::new(MemoryTransaction {
      state: self.state.clone(),
      pending: Vec::new(),
    }))
  }
}

#[async_trait]
impl Transaction for MemoryTransaction {
  async fn execute(&mut self, query: &str, params: &Map<String, Value>) -> Result<u64, BackendError> {
    if self.state.execute_fault.hit() {
      return Err(BackendError::new(format!("injected failure executing '{}'", query)));
    }
    self.pending.push(Statement {
      query: query.to_string(),
      params: params.clone(),
    });
    Ok(1)
  }

  async fn commit(self: Box<Self>) -> Result<(), BackendError> {
    if self.state.commit_fault.hit() {
      return Err(BackendError::new("injected commit failure"));
    }
    let mut committed = self.state.committed.lock().unwrap_or_else(|e| e.into_inner());
    committed.extend(self.pending);
    self.state.commits.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  async fn rollback(self: Box<Self>) -> Result<(), BackendError> {
    self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

/// A transport that records requests and answers from a script.
///
/// Scripted responses are consumed in order; once the script runs out every
/// request gets `200`.
#[derive(Default)]
pub struct MemoryHttpTransport {
  requests: Mutex<Vec<(String, Value)>>,
  accepted: Mutex<Vec<Value>>,
  script: Mutex<VecDeque<Result<u16, String>>>,
}

impl MemoryHttpTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// Queue a status for the next unanswered request.
  pub fn respond_with(&self, status: u16) {
    self
      .script
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push_back(Ok(status));
  }

  /// Queue a transport error for the next unanswered request.
  pub fn fail_with(&self, message: impl Into<String>) {
    self
      .script
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push_back(Err(message.into()));
  }

  /// Every request received, including rejected ones.
  pub fn requests(&self) -> Vec<(String, Value)> {
    self
      .requests
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .clone()
  }

  /// Bodies of requests that were answered with a 2xx status.
  pub fn accepted(&self) -> Vec<Value> {
    self
      .accepted
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .clone()
  }
}

#[async_trait]
impl HttpTransport for MemoryHttpTransport {
  async fn post(&self, endpoint: &str, body: &Value) -> Result<u16, BackendError> {
    self
      .requests
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push((endpoint.to_string(), body.clone()));

    let next = self
      .script
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .pop_front()
      .unwrap_or(Ok(200));
    let status = next.map_err(BackendError::new)?;

    if (200..300).contains(&status) {
      self
        .accepted
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(body.clone());
    }
    Ok(status)
  }
}
