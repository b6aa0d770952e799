use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle stage of a task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
  Precheck,
  Preprocess,
  Process,
  Postprocess,
}

impl Stage {
  /// Stages in execution order.
  pub const ALL: [Stage; 4] = [
    Stage::Precheck,
    Stage::Preprocess,
    Stage::Process,
    Stage::Postprocess,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Stage::Precheck => "precheck",
      Stage::Preprocess => "preprocess",
      Stage::Process => "process",
      Stage::Postprocess => "postprocess",
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
