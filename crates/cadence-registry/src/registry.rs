use std::collections::HashMap;
use std::sync::Arc;

use cadence_config::{PlanDef, SinkKind};
use cadence_sink::Sink;
use cadence_task::{Task, TaskDescriptor, TaskFactory};
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::provider::TaskProvider;

/// A task known to the registry.
#[derive(Clone)]
pub struct RegisteredTask {
  pub descriptor: TaskDescriptor,
  pub factory: TaskFactory,
}

impl RegisteredTask {
  /// Build a fresh instance of the task.
  pub fn instantiate(&self) -> Box<dyn Task> {
    (self.factory)()
  }
}

/// Tasks, sinks and plans, keyed by their stable names.
///
/// Task enumeration follows registration order.
#[derive(Default)]
pub struct Registry {
  tasks: Vec<RegisteredTask>,
  task_index: HashMap<String, usize>,
  sinks: HashMap<SinkKind, Arc<dyn Sink>>,
  plans: Vec<PlanDef>,
  plan_index: HashMap<String, usize>,
}

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a named task constructor.
  pub fn register(
    &mut self,
    descriptor: TaskDescriptor,
    factory: TaskFactory,
  ) -> Result<(), RegistryError> {
    if self.task_index.contains_key(&descriptor.name) {
      return Err(RegistryError::DuplicateTask {
        name: descriptor.name,
      });
    }

    debug!(task = %descriptor.name, sink = ?descriptor.sink, "task registered");
    self
      .task_index
      .insert(descriptor.name.clone(), self.tasks.len());
    self.tasks.push(RegisteredTask {
      descriptor,
      factory,
    });
    Ok(())
  }

  /// Look up a task by name.
  pub fn resolve(&self, name: &str) -> Result<&RegisteredTask, RegistryError> {
    self
      .task_index
      .get(name)
      .map(|&i| &self.tasks[i])
      .ok_or_else(|| RegistryError::UnknownTask {
        name: name.to_string(),
      })
  }

  pub fn contains_task(&self, name: &str) -> bool {
    self.task_index.contains_key(name)
  }

  /// Every registered task descriptor, in registration order.
  pub fn list_all(&self) -> Vec<&TaskDescriptor> {
    self.tasks.iter().map(|t| &t.descriptor).collect()
  }

  /// Register the sink for its kind. One sink per kind.
  pub fn register_sink(&mut self, sink: Arc<dyn Sink>) -> Result<(), RegistryError> {
    let kind = sink.kind();
    if self.sinks.contains_key(&kind) {
      return Err(RegistryError::DuplicateSink { kind });
    }
    debug!(sink = %kind, "sink registered");
    self.sinks.insert(kind, sink);
    Ok(())
  }

  pub fn sink(&self, kind: SinkKind) -> Result<Arc<dyn Sink>, RegistryError> {
    self
      .sinks
      .get(&kind)
      .cloned()
      .ok_or(RegistryError::UnknownSink { kind })
  }

  pub fn has_sink(&self, kind: SinkKind) -> bool {
    self.sinks.contains_key(&kind)
  }

  /// Registered sink kinds, in canonical order.
  pub fn sink_kinds(&self) -> Vec<SinkKind> {
    SinkKind::ALL
      .iter()
      .copied()
      .filter(|k| self.sinks.contains_key(k))
      .collect()
  }

  /// Add a plan to the catalog that sub-plan nodes resolve against.
  pub fn register_plan(&mut self, plan: PlanDef) -> Result<(), RegistryError> {
    if self.plan_index.contains_key(&plan.plan_id) {
      return Err(RegistryError::DuplicatePlan {
        plan_id: plan.plan_id,
      });
    }
    debug!(plan_id = %plan.plan_id, "plan registered");
    self
      .plan_index
      .insert(plan.plan_id.clone(), self.plans.len());
    self.plans.push(plan);
    Ok(())
  }

  pub fn plan(&self, plan_id: &str) -> Result<&PlanDef, RegistryError> {
    self
      .plan_index
      .get(plan_id)
      .map(|&i| &self.plans[i])
      .ok_or_else(|| RegistryError::UnknownPlan {
        plan_id: plan_id.to_string(),
      })
  }

  /// Let a provider register its tasks, sinks and plans.
  pub fn install(&mut self, provider: &dyn TaskProvider) -> Result<(), RegistryError> {
    let before = self.tasks.len();
    provider.install(self)?;
    info!(
      provider = provider.name(),
      tasks = self.tasks.len() - before,
      "provider installed"
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use async_trait::async_trait;
  use cadence_config::PlanNode;
  use cadence_sink::memory::MemoryDatabase;
  use cadence_sink::DatabaseSink;
  use cadence_task::{TaskContext, TaskError, factory};

  use super::*;

  #[derive(Default)]
  struct Noop;

  #[async_trait]
  impl Task for Noop {
    async fn process(&mut self, _ctx: &TaskContext) -> Result<serde_json::Value, TaskError> {
      Ok(serde_json::Value::Null)
    }
  }

  struct Bundle;

  impl TaskProvider for Bundle {
    fn name(&self) -> &str {
      "bundle"
    }

    fn install(&self, registry: &mut Registry) -> Result<(), RegistryError> {
      registry.register(TaskDescriptor::new("X"), factory::<Noop>())?;
      registry.register(TaskDescriptor::new("Y"), factory::<Noop>())
    }
  }

  #[test]
  fn test_resolve_returns_registered_factory() {
    let mut registry = Registry::new();
    let f = factory::<Noop>();
    registry
      .register(TaskDescriptor::new("A"), f.clone())
      .unwrap();

    let resolved = registry.resolve("A").unwrap();
    assert!(Arc::ptr_eq(&resolved.factory, &f));
    assert_eq!(resolved.descriptor.name, "A");
  }

  #[test]
  fn test_duplicate_task_rejected() {
    let mut registry = Registry::new();
    registry
      .register(TaskDescriptor::new("A"), factory::<Noop>())
      .unwrap();
    let err = registry
      .register(TaskDescriptor::new("A"), factory::<Noop>())
      .unwrap_err();

    assert_eq!(
      err,
      RegistryError::DuplicateTask {
        name: "A".to_string()
      }
    );
    assert_eq!(registry.list_all().len(), 1);
  }

  #[test]
  fn test_unknown_task() {
    let registry = Registry::new();
    assert!(matches!(
      registry.resolve("missing"),
      Err(RegistryError::UnknownTask { .. })
    ));
  }

  #[test]
  fn test_list_all_keeps_registration_order() {
    let mut registry = Registry::new();
    for name in ["Zeta", "Alpha", "Mid"] {
      registry
        .register(TaskDescriptor::new(name), factory::<Noop>())
        .unwrap();
    }

    let names: Vec<_> = registry.list_all().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Zeta", "Alpha", "Mid"]);
  }

  #[test]
  fn test_one_sink_per_kind() {
    let mut registry = Registry::new();
    let db = Arc::new(MemoryDatabase::new());
    registry
      .register_sink(Arc::new(DatabaseSink::new(db.clone())))
      .unwrap();

    let err = registry
      .register_sink(Arc::new(DatabaseSink::new(db)))
      .unwrap_err();
    assert_eq!(
      err,
      RegistryError::DuplicateSink {
        kind: SinkKind::Database
      }
    );
    assert_eq!(registry.sink_kinds(), vec![SinkKind::Database]);
    assert!(registry.sink(SinkKind::HttpApi).is_err());
  }

  #[test]
  fn test_plan_catalog() {
    let mut registry = Registry::new();
    registry
      .register_plan(PlanDef::new("child", vec![PlanNode::step("A")]))
      .unwrap();

    assert_eq!(registry.plan("child").unwrap().steps.len(), 1);
    assert!(matches!(
      registry.register_plan(PlanDef::new("child", vec![])),
      Err(RegistryError::DuplicatePlan { .. })
    ));
    assert!(matches!(
      registry.plan("other"),
      Err(RegistryError::UnknownPlan { .. })
    ));
  }

  #[test]
  fn test_install_provider() {
    let mut registry = Registry::new();
    registry.install(&Bundle).unwrap();

    assert!(registry.contains_task("X"));
    assert!(registry.contains_task("Y"));
    assert!(registry.install(&Bundle).is_err());
  }
}
