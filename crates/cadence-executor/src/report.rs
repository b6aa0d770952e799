//! Plan execution results.

use cadence_config::SinkKind;
use cadence_sink::SinkError;
use cadence_task::TaskResult;
use serde::{Deserialize, Serialize};

/// Overall outcome of a plan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  /// Every task succeeded and every batch was written.
  Success,
  /// Some work succeeded but tasks or non-critical writes failed.
  PartialFailure,
  /// The run failed as a whole.
  Failure,
}

/// Terminal state of one sink's batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WriteStatus {
  Written { attempts: u32 },
  Failed { error: SinkError, attempts: u32 },
}

/// What happened to the batch routed to one sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOutcome {
  pub sink: SinkKind,
  /// Number of payloads in the batch.
  pub payloads: usize,
  pub status: WriteStatus,
  pub duration_ms: u64,
}

impl WriteOutcome {
  pub fn is_success(&self) -> bool {
    matches!(self.status, WriteStatus::Written { .. })
  }

  pub fn error(&self) -> Option<&SinkError> {
    match &self.status {
      WriteStatus::Written { .. } => None,
      WriteStatus::Failed { error, .. } => Some(error),
    }
  }

  pub fn attempts(&self) -> u32 {
    match self.status {
      WriteStatus::Written { attempts } | WriteStatus::Failed { attempts, .. } => attempts,
    }
  }
}

/// Everything that happened during one plan run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
  pub plan_id: String,
  pub execution_id: String,
  pub status: RunStatus,
  /// Every task outcome, including failures, in the order they were merged.
  pub tasks: Vec<TaskResult>,
  /// One outcome per sink that had a non-empty batch, in write order.
  pub sinks: Vec<WriteOutcome>,
  /// Units abandoned by fail-fast before they started.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub skipped: Vec<String>,
  pub duration_ms: u64,
}

impl ExecutionReport {
  pub fn is_success(&self) -> bool {
    self.status == RunStatus::Success
  }

  /// Outcome of the first result with this qualified name.
  pub fn task(&self, qualified_name: &str) -> Option<&TaskResult> {
    self
      .tasks
      .iter()
      .find(|t| t.qualified_name() == qualified_name)
  }

  pub fn failed_tasks(&self) -> impl Iterator<Item = &TaskResult> {
    self.tasks.iter().filter(|t| !t.is_success())
  }

  pub fn failed_sinks(&self) -> impl Iterator<Item = &WriteOutcome> {
    self.sinks.iter().filter(|s| !s.is_success())
  }

  pub fn sink(&self, kind: SinkKind) -> Option<&WriteOutcome> {
    self.sinks.iter().find(|s| s.sink == kind)
  }

  /// One line per failed unit, naming it and why it failed.
  pub fn failures(&self) -> Vec<String> {
    let tasks = self.failed_tasks().filter_map(|t| {
      t.failure()
        .map(|reason| format!("task '{}': {}", t.qualified_name(), reason))
    });
    let sinks = self.failed_sinks().filter_map(|s| {
      s.error()
        .map(|error| format!("sink '{}': {}", s.sink, error))
    });
    tasks.chain(sinks).collect()
  }
}
