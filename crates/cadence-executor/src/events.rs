//! Execution events and notifiers for observability.
//!
//! Events are emitted during a plan run so a host can observe progress,
//! persist state or stream it elsewhere. They mirror the tracing events.

use cadence_config::SinkKind;
use cadence_sink::SinkError;
use cadence_task::FailureReason;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::report::RunStatus;

/// Events emitted during plan execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
  PlanStarted {
    execution_id: String,
    plan_id: String,
  },

  TaskStarted {
    execution_id: String,
    task_id: String,
    task_name: String,
  },

  TaskCompleted {
    execution_id: String,
    task_id: String,
    task_name: String,
    payload: serde_json::Value,
  },

  TaskFailed {
    execution_id: String,
    task_id: String,
    task_name: String,
    reason: FailureReason,
  },

  /// A sink write attempt is about to start.
  SinkWriteStarted {
    execution_id: String,
    sink: SinkKind,
    payloads: usize,
    attempt: u32,
  },

  SinkWriteCompleted {
    execution_id: String,
    sink: SinkKind,
    attempts: u32,
  },

  SinkWriteFailed {
    execution_id: String,
    sink: SinkKind,
    error: SinkError,
  },

  PlanCompleted {
    execution_id: String,
    status: RunStatus,
  },
}

/// Receives execution events.
///
/// The executor calls `notify` inline, so implementations should hand events
/// off rather than block.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls a run. Volume is a handful of
  // events per task and per sink.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
