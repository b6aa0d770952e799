//! Task execution results.

use std::fmt;

use cadence_config::SinkKind;
use serde::{Deserialize, Serialize};

use crate::stage::Stage;

/// Why a task (or a node standing in for one) failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
  /// A lifecycle stage returned an error.
  Stage { stage: Stage, message: String },
  /// A lifecycle stage exceeded its time limit.
  Timeout { stage: Stage, timeout_ms: u64 },
  /// The run was cancelled before the stage started.
  Cancelled { stage: Stage },
  /// The task panicked or its worker was lost.
  Panicked { message: String },
  /// The task name did not resolve at run time.
  UnknownTask { name: String },
  /// The sub-plan name did not resolve at run time.
  UnknownPlan { plan_id: String },
  /// Sub-plan nesting went past the configured maximum.
  DepthExceeded { max_depth: usize },
  /// The sub-plan input template could not be rendered.
  InvalidInput { message: String },
  /// A nested plan finished with failures. `failed` names the failed units.
  SubPlan { plan_id: String, failed: Vec<String> },
}

impl FailureReason {
  pub fn is_timeout(&self) -> bool {
    matches!(self, FailureReason::Timeout { .. })
  }
}

impl fmt::Display for FailureReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FailureReason::Stage { stage, message } => write!(f, "{} failed: {}", stage, message),
      FailureReason::Timeout { stage, timeout_ms } => {
        write!(f, "{} timed out after {}ms", stage, timeout_ms)
      }
      FailureReason::Cancelled { stage } => write!(f, "cancelled before {}", stage),
      FailureReason::Panicked { message } => write!(f, "task panicked: {}", message),
      FailureReason::UnknownTask { name } => write!(f, "unknown task '{}'", name),
      FailureReason::UnknownPlan { plan_id } => write!(f, "unknown plan '{}'", plan_id),
      FailureReason::DepthExceeded { max_depth } => {
        write!(f, "plan nesting exceeds max depth {}", max_depth)
      }
      FailureReason::InvalidInput { message } => write!(f, "invalid input: {}", message),
      FailureReason::SubPlan { plan_id, failed } => {
        write!(f, "sub-plan '{}' failed: {}", plan_id, failed.join(", "))
      }
    }
  }
}

/// Terminal state of a task run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskStatus {
  Success,
  Failed { reason: FailureReason },
}

/// Result of a task execution. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
  /// Unique task run ID.
  pub task_id: String,
  /// Registered task name (or sub-plan name for sub-plan failures).
  pub task_name: String,
  /// Chain of sub-plans this result was folded up through, outermost first.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub origin: Vec<String>,
  /// Declared destination of the payload.
  pub sink: Option<SinkKind>,
  /// Task output. `null` for failed tasks.
  pub payload: serde_json::Value,
  pub status: TaskStatus,
  pub duration_ms: u64,
}

impl TaskResult {
  pub fn is_success(&self) -> bool {
    matches!(self.status, TaskStatus::Success)
  }

  pub fn failure(&self) -> Option<&FailureReason> {
    match &self.status {
      TaskStatus::Success => None,
      TaskStatus::Failed { reason } => Some(reason),
    }
  }

  /// Name including the sub-plan chain, e.g. `checkout/PaymentTask`.
  pub fn qualified_name(&self) -> String {
    if self.origin.is_empty() {
      self.task_name.clone()
    } else {
      format!("{}/{}", self.origin.join("/"), self.task_name)
    }
  }

  /// Fold this result under a sub-plan name.
  pub fn nested_under(mut self, plan_id: &str) -> Self {
    self.origin.insert(0, plan_id.to_string());
    self
  }

  /// A failed result for a unit that never produced a task instance.
  pub fn failed(task_id: String, task_name: impl Into<String>, reason: FailureReason) -> Self {
    Self {
      task_id,
      task_name: task_name.into(),
      origin: Vec::new(),
      sink: None,
      payload: serde_json::Value::Null,
      status: TaskStatus::Failed { reason },
      duration_ms: 0,
    }
  }
}
