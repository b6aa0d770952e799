use cadence_config::SinkKind;
use serde::{Deserialize, Serialize};

use crate::stage::Stage;

/// Static description of a registered task. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
  /// Unique name within a registry.
  pub name: String,
  /// Where successful results of this task are written, if anywhere.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sink: Option<SinkKind>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl TaskDescriptor {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      sink: None,
      description: None,
    }
  }

  pub fn with_sink(mut self, sink: SinkKind) -> Self {
    self.sink = Some(sink);
    self
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  /// Stages every instance of this task runs, in order.
  pub fn stages(&self) -> &'static [Stage] {
    &Stage::ALL
  }
}
