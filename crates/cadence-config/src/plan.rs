use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sink::SinkKind;

/// What happens to the rest of a sequence after one of its steps fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
  /// Abandon the remaining steps and propagate the first failure upward.
  #[default]
  FailFast,
  /// Keep going past failures and collect every outcome.
  BestEffort,
}

/// One node of a plan tree.
///
/// ```json
/// { "type": "step", "task": "DataProcessingTask" }
/// { "type": "parallel", "nodes": [ ... ] }
/// { "type": "sequence", "nodes": [ ... ] }
/// { "type": "sub_plan", "plan": "checkout", "input": { "user": "{{ data.user_id }}" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanNode {
  /// Run a single registered task.
  Step { task: String },
  /// Run every child concurrently.
  Parallel { nodes: Vec<PlanNode> },
  /// Run children in order, honoring the plan's failure policy.
  Sequence { nodes: Vec<PlanNode> },
  /// Run another registered plan as a unit.
  SubPlan {
    plan: String,
    /// String leaves are templates rendered against the parent input.
    /// `null` forwards the parent input unchanged.
    #[serde(default)]
    input: serde_json::Value,
  },
}

impl PlanNode {
  pub fn step(task: impl Into<String>) -> Self {
    PlanNode::Step { task: task.into() }
  }

  pub fn parallel(nodes: Vec<PlanNode>) -> Self {
    PlanNode::Parallel { nodes }
  }

  pub fn sequence(nodes: Vec<PlanNode>) -> Self {
    PlanNode::Sequence { nodes }
  }

  pub fn sub_plan(plan: impl Into<String>, input: serde_json::Value) -> Self {
    PlanNode::SubPlan {
      plan: plan.into(),
      input,
    }
  }
}

/// Object storage first, then the remote API, then the database.
pub fn default_sink_order() -> Vec<SinkKind> {
  vec![SinkKind::ObjectStore, SinkKind::HttpApi, SinkKind::Database]
}

/// A declarative plan: ordered top-level steps plus the settings that govern
/// how failures propagate and where results are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDef {
  pub plan_id: String,
  pub steps: Vec<PlanNode>,
  #[serde(default)]
  pub policy: FailurePolicy,
  /// Order in which sinks are written once every task has finished.
  #[serde(default = "default_sink_order")]
  pub sink_order: Vec<SinkKind>,
  /// Sinks whose failure fails the whole run instead of degrading it.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub critical_sinks: Vec<SinkKind>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub stage_timeout_ms: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub write_timeout_ms: Option<u64>,
}

impl PlanDef {
  pub fn new(plan_id: impl Into<String>, steps: Vec<PlanNode>) -> Self {
    Self {
      plan_id: plan_id.into(),
      steps,
      policy: FailurePolicy::default(),
      sink_order: default_sink_order(),
      critical_sinks: Vec::new(),
      stage_timeout_ms: None,
      write_timeout_ms: None,
    }
  }

  pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn with_sink_order(mut self, sink_order: Vec<SinkKind>) -> Self {
    self.sink_order = sink_order;
    self
  }

  pub fn with_critical_sink(mut self, kind: SinkKind) -> Self {
    if !self.critical_sinks.contains(&kind) {
      self.critical_sinks.push(kind);
    }
    self
  }

  pub fn with_stage_timeout_ms(mut self, timeout_ms: u64) -> Self {
    self.stage_timeout_ms = Some(timeout_ms);
    self
  }

  pub fn with_write_timeout_ms(mut self, timeout_ms: u64) -> Self {
    self.write_timeout_ms = Some(timeout_ms);
    self
  }

  pub fn is_critical(&self, kind: SinkKind) -> bool {
    self.critical_sinks.contains(&kind)
  }

  /// Parse a plan from its JSON representation.
  pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(json)
  }

  /// Read and parse a plan file.
  pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }
}
