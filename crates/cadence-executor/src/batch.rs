use std::collections::BTreeMap;

use cadence_config::SinkKind;
use cadence_task::TaskResult;

/// Successful results grouped by destination sink.
///
/// Each group keeps the order results were pushed in. Groups are consumed
/// once by [`SinkBatch::take`].
#[derive(Debug, Clone, Default)]
pub struct SinkBatch {
  groups: BTreeMap<SinkKind, Vec<TaskResult>>,
}

impl SinkBatch {
  pub fn new() -> Self {
    Self::default()
  }

  /// Group every successful result that declares a sink.
  pub fn from_results<'a>(results: impl IntoIterator<Item = &'a TaskResult>) -> Self {
    let mut batch = Self::new();
    for result in results {
      batch.push(result);
    }
    batch
  }

  /// Add `result` to its sink's group. Returns false if it is not routable:
  /// failed, or without a sink.
  pub fn push(&mut self, result: &TaskResult) -> bool {
    match result.sink {
      Some(kind) if result.is_success() => {
        self.groups.entry(kind).or_default().push(result.clone());
        true
      }
      _ => false,
    }
  }

  pub fn get(&self, kind: SinkKind) -> &[TaskResult] {
    self.groups.get(&kind).map(Vec::as_slice).unwrap_or(&[])
  }

  /// Remove and return a sink's group.
  pub fn take(&mut self, kind: SinkKind) -> Option<Vec<TaskResult>> {
    self.groups.remove(&kind)
  }

  /// Sinks that still have a pending group.
  pub fn kinds(&self) -> Vec<SinkKind> {
    self.groups.keys().copied().collect()
  }

  pub fn is_empty(&self) -> bool {
    self.groups.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use cadence_task::{FailureReason, TaskStatus};
  use serde_json::json;

  use super::*;

  fn result(name: &str, sink: Option<SinkKind>, ok: bool) -> TaskResult {
    TaskResult {
      task_id: format!("{name}-id"),
      task_name: name.to_string(),
      origin: Vec::new(),
      sink,
      payload: json!({ "from": name }),
      status: if ok {
        TaskStatus::Success
      } else {
        TaskStatus::Failed {
          reason: FailureReason::Panicked {
            message: "boom".to_string(),
          },
        }
      },
      duration_ms: 0,
    }
  }

  #[test]
  fn test_groups_successes_by_sink_in_push_order() {
    let results = vec![
      result("B", Some(SinkKind::ObjectStore), true),
      result("C", Some(SinkKind::Database), true),
      result("A", Some(SinkKind::ObjectStore), true),
      result("D", Some(SinkKind::ObjectStore), false),
      result("E", None, true),
    ];
    let mut batch = SinkBatch::from_results(&results);

    let names: Vec<_> = batch
      .get(SinkKind::ObjectStore)
      .iter()
      .map(|r| r.task_name.as_str())
      .collect();
    assert_eq!(names, vec!["B", "A"]);
    assert_eq!(batch.kinds(), vec![SinkKind::ObjectStore, SinkKind::Database]);

    assert_eq!(batch.take(SinkKind::Database).unwrap().len(), 1);
    assert!(batch.take(SinkKind::Database).is_none());
    assert!(batch.get(SinkKind::HttpApi).is_empty());
  }
}
