//! Demo task set and in-memory sinks registered by the CLI.

use std::sync::Arc;

use async_trait::async_trait;
use cadence_config::{FailurePolicy, PlanDef, PlanNode, SinkKind};
use cadence_registry::{Registry, RegistryError, TaskProvider};
use cadence_sink::memory::{MemoryDatabase, MemoryHttpTransport, MemoryObjectStore};
use cadence_sink::{DatabaseSink, HttpApiSink, ObjectStoreSink};
use cadence_task::{Task, TaskContext, TaskDescriptor, TaskError, TaskFactory, factory};
use serde_json::{Value, json};

pub const BUCKET: &str = "cadence-results";
pub const ENDPOINT: &str = "https://api.example.com/results";

/// Cleans the run input and stores it as an object.
#[derive(Default)]
struct DataProcessingTask {
  records: usize,
}

#[async_trait]
impl Task for DataProcessingTask {
  async fn precheck(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
    if !ctx.input.is_object() {
      return Err(TaskError::invalid_input("expected a JSON object"));
    }
    Ok(())
  }

  async fn preprocess(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
    self.records = ctx.input.as_object().map(|o| o.len()).unwrap_or(0);
    Ok(())
  }

  async fn process(&mut self, ctx: &TaskContext) -> Result<Value, TaskError> {
    Ok(json!({
      "key": format!("data-processing/{}.json", ctx.task_id),
      "data": { "records": self.records, "input": ctx.input },
    }))
  }

  async fn postprocess(&mut self, _ctx: &TaskContext, mut output: Value) -> Result<Value, TaskError> {
    output["data"]["status"] = json!("processed");
    Ok(output)
  }
}

/// Reports the run input to the remote API.
#[derive(Default)]
struct ApiTask;

#[async_trait]
impl Task for ApiTask {
  async fn process(&mut self, ctx: &TaskContext) -> Result<Value, TaskError> {
    Ok(json!({
      "execution_id": ctx.execution_id,
      "task": ctx.task_name,
      "input": ctx.input,
    }))
  }
}

/// Records the run in the task results table.
#[derive(Default)]
struct DbTask;

#[async_trait]
impl Task for DbTask {
  async fn process(&mut self, ctx: &TaskContext) -> Result<Value, TaskError> {
    Ok(json!({
      "query": "INSERT INTO task_results (execution_id, task, input) VALUES ($1, $2, $3)",
      "params": {
        "execution_id": ctx.execution_id,
        "task": ctx.task_name,
        "input": ctx.input,
      },
    }))
  }
}

/// A step of the order flow; only reports what it did.
#[derive(Clone)]
struct OrderStep {
  done: &'static str,
}

#[async_trait]
impl Task for OrderStep {
  async fn process(&mut self, ctx: &TaskContext) -> Result<Value, TaskError> {
    Ok(json!(format!("{} for {}", self.done, ctx.input)))
  }
}

fn order_step(done: &'static str) -> TaskFactory {
  let step = OrderStep { done };
  Arc::new(move || Box::new(step.clone()) as Box<dyn Task>)
}

/// Installs the demo tasks, one in-memory sink per kind and the
/// `order-flow` sub-plan.
#[derive(Default)]
pub struct DemoProvider {
  pub store: Arc<MemoryObjectStore>,
  pub database: MemoryDatabase,
  pub http: Arc<MemoryHttpTransport>,
}

impl DemoProvider {
  pub fn new() -> Self {
    Self::default()
  }
}

impl TaskProvider for DemoProvider {
  fn name(&self) -> &str {
    "demo"
  }

  fn install(&self, registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(
      TaskDescriptor::new("DataProcessingTask")
        .with_sink(SinkKind::ObjectStore)
        .with_description("Summarise the input and store it as an object"),
      factory::<DataProcessingTask>(),
    )?;
    registry.register(
      TaskDescriptor::new("ApiTask")
        .with_sink(SinkKind::HttpApi)
        .with_description("Report the input to the results API"),
      factory::<ApiTask>(),
    )?;
    registry.register(
      TaskDescriptor::new("DbTask")
        .with_sink(SinkKind::Database)
        .with_description("Record the run in the task_results table"),
      factory::<DbTask>(),
    )?;
    registry.register(
      TaskDescriptor::new("CheckoutTask"),
      order_step("Checkout completed"),
    )?;
    registry.register(
      TaskDescriptor::new("PaymentTask"),
      order_step("Payment processed"),
    )?;
    registry.register(
      TaskDescriptor::new("OrderCreationTask"),
      order_step("Order created"),
    )?;

    registry.register_sink(Arc::new(ObjectStoreSink::new(BUCKET, self.store.clone())))?;
    registry.register_sink(Arc::new(DatabaseSink::new(Arc::new(self.database.clone()))))?;
    registry.register_sink(Arc::new(HttpApiSink::new(ENDPOINT, self.http.clone())))?;

    registry.register_plan(
      PlanDef::new(
        "order-flow",
        vec![
          PlanNode::step("CheckoutTask"),
          PlanNode::step("PaymentTask"),
          PlanNode::step("OrderCreationTask"),
        ],
      )
      .with_policy(FailurePolicy::FailFast),
    )?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use cadence_config::EngineConfig;
  use cadence_engine::{Orchestrator, RunStatus};

  fn orchestrator(provider: &DemoProvider) -> Orchestrator {
    let mut registry = Registry::new();
    registry.install(provider).unwrap();
    Orchestrator::new(Arc::new(registry), EngineConfig::default())
  }

  #[tokio::test]
  async fn test_discovery_writes_every_sink() {
    let provider = DemoProvider::new();
    let orchestrator = orchestrator(&provider);

    let plan = orchestrator.discovery_plan("discover");
    let report = orchestrator
      .execute_plan(&plan, json!({ "user_id": 7 }))
      .await
      .unwrap();

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.tasks.len(), 6);
    assert_eq!(provider.store.len(), 1);
    assert_eq!(provider.database.committed().len(), 1);
    assert_eq!(provider.http.accepted().len(), 1);
  }

  #[tokio::test]
  async fn test_order_flow_as_sub_plan() {
    let provider = DemoProvider::new();
    let orchestrator = orchestrator(&provider);

    let plan = PlanDef::new(
      "parent",
      vec![PlanNode::sub_plan("order-flow", json!("{{ data.user_id }}"))],
    );
    let report = orchestrator
      .execute_plan(&plan, json!({ "user_id": 7 }))
      .await
      .unwrap();

    assert!(report.is_success());
    assert_eq!(
      report.task("order-flow/PaymentTask").unwrap().payload,
      json!("Payment processed for 7")
    );
  }

  #[tokio::test]
  async fn test_data_processing_rejects_non_object_input() {
    let provider = DemoProvider::new();
    let orchestrator = orchestrator(&provider);

    let plan = PlanDef::new("p", vec![PlanNode::step("DataProcessingTask")]);
    let report = orchestrator.execute_plan(&plan, json!([1, 2])).await.unwrap();

    assert_eq!(report.status, RunStatus::Failure);
    assert!(provider.store.is_empty());
  }
}
