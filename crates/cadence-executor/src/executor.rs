//! Plan executor implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cadence_config::{EngineConfig, FailurePolicy, PlanDef, PlanNode};
use cadence_registry::Registry;
use cadence_retry::{Sleeper, TokioSleeper};
use cadence_task::{FailureReason, TaskContext, TaskInstance, TaskResult};
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::batch::SinkBatch;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::input::render_input;
use crate::report::{ExecutionReport, RunStatus, WriteOutcome};

/// Executes plans against a shared, read-only [`Registry`].
///
/// Cheap to clone. Every call to [`PlanExecutor::execute`] is an independent
/// run with its own execution id; concurrent runs share only the registry and
/// the sinks registered in it.
#[derive(Clone)]
pub struct PlanExecutor {
  pub(crate) registry: Arc<Registry>,
  pub(crate) config: EngineConfig,
  pub(crate) sleeper: Arc<dyn Sleeper>,
  pub(crate) notifier: Arc<dyn ExecutionNotifier>,
}

/// State shared by every node of one run.
pub(crate) struct Run {
  pub(crate) execution_id: String,
  pub(crate) cancel: CancellationToken,
}

/// The plan a node belongs to. Sub-plans get their own scope.
struct Scope {
  plan_id: String,
  policy: FailurePolicy,
  stage_timeout: Option<Duration>,
  input: serde_json::Value,
  depth: usize,
}

/// Results of a subtree, merged single-writer into its parent.
#[derive(Default)]
struct NodeOutcome {
  results: Vec<TaskResult>,
  skipped: Vec<String>,
  failed: bool,
}

impl NodeOutcome {
  fn single(result: TaskResult) -> Self {
    Self {
      failed: !result.is_success(),
      results: vec![result],
      skipped: Vec::new(),
    }
  }

  fn absorb(&mut self, other: NodeOutcome) {
    self.failed |= other.failed;
    self.results.extend(other.results);
    self.skipped.extend(other.skipped);
  }
}

impl PlanExecutor {
  pub fn new(registry: Arc<Registry>, config: EngineConfig) -> Self {
    Self {
      registry,
      config,
      sleeper: Arc::new(TokioSleeper),
      notifier: Arc::new(NoopNotifier),
    }
  }

  /// Replace the timer used for retry backoff.
  pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
    self.sleeper = sleeper;
    self
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn registry(&self) -> &Arc<Registry> {
    &self.registry
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Run `plan` to completion and write its results.
  ///
  /// Never fails: task and sink failures are recorded in the report.
  #[instrument(
    name = "plan_execute",
    skip(self, plan, input, cancel),
    fields(plan_id = %plan.plan_id)
  )]
  pub async fn execute(
    &self,
    plan: &PlanDef,
    input: serde_json::Value,
    cancel: CancellationToken,
  ) -> ExecutionReport {
    let started = Instant::now();
    let execution_id = uuid::Uuid::new_v4().to_string();

    info!(
      execution_id = %execution_id,
      plan_id = %plan.plan_id,
      input = %input,
      "plan_started"
    );
    self.notifier.notify(ExecutionEvent::PlanStarted {
      execution_id: execution_id.clone(),
      plan_id: plan.plan_id.clone(),
    });

    let run = Arc::new(Run {
      execution_id: execution_id.clone(),
      cancel,
    });
    let scope = Arc::new(Scope {
      plan_id: plan.plan_id.clone(),
      policy: plan.policy,
      stage_timeout: plan
        .stage_timeout_ms
        .or(self.config.stage_timeout_ms)
        .map(Duration::from_millis),
      input,
      depth: 0,
    });

    let outcome = self
      .run_sequence(plan.steps.clone(), scope, run.clone())
      .await;

    let batch = SinkBatch::from_results(&outcome.results);
    let sinks = self.write_batches(plan, batch, &run).await;

    let status = run_status(plan, &outcome, &sinks);
    let report = ExecutionReport {
      plan_id: plan.plan_id.clone(),
      execution_id,
      status,
      tasks: outcome.results,
      sinks,
      skipped: outcome.skipped,
      duration_ms: started.elapsed().as_millis() as u64,
    };

    if report.is_success() {
      info!(
        execution_id = %report.execution_id,
        tasks = report.tasks.len(),
        duration_ms = report.duration_ms,
        "plan_completed"
      );
    } else {
      warn!(
        execution_id = %report.execution_id,
        status = ?report.status,
        failures = ?report.failures(),
        skipped = ?report.skipped,
        duration_ms = report.duration_ms,
        "plan_completed"
      );
    }
    self.notifier.notify(ExecutionEvent::PlanCompleted {
      execution_id: report.execution_id.clone(),
      status: report.status,
    });

    report
  }

  fn run_node(
    &self,
    node: PlanNode,
    scope: Arc<Scope>,
    run: Arc<Run>,
  ) -> BoxFuture<'static, NodeOutcome> {
    match node {
      PlanNode::Step { task } => self.run_step(task, scope, run),
      PlanNode::Sequence { nodes } => self.run_sequence(nodes, scope, run),
      PlanNode::Parallel { nodes } => self.run_parallel(nodes, scope, run),
      PlanNode::SubPlan { plan, input } => self.run_sub_plan(plan, input, scope, run),
    }
  }

  /// Resolve and run one task. The lifecycle runs on its own tokio task so a
  /// panic is contained to this step.
  fn run_step(
    &self,
    task: String,
    scope: Arc<Scope>,
    run: Arc<Run>,
  ) -> BoxFuture<'static, NodeOutcome> {
    let this = self.clone();
    async move {
      let task_id = uuid::Uuid::new_v4().to_string();

      let registered = match this.registry.resolve(&task) {
        Ok(registered) => registered.clone(),
        Err(e) => {
          error!(
            execution_id = %run.execution_id,
            task_id = %task_id,
            task_name = %task,
            error = %e,
            "task_failed"
          );
          let reason = FailureReason::UnknownTask { name: task.clone() };
          let result = TaskResult::failed(task_id, task, reason);
          this.notify_task_end(&run, &result);
          return NodeOutcome::single(result);
        }
      };

      this.notifier.notify(ExecutionEvent::TaskStarted {
        execution_id: run.execution_id.clone(),
        task_id: task_id.clone(),
        task_name: task.clone(),
      });

      let ctx = TaskContext {
        execution_id: run.execution_id.clone(),
        plan_id: scope.plan_id.clone(),
        task_id: task_id.clone(),
        task_name: task.clone(),
        input: scope.input.clone(),
        cancel: run.cancel.clone(),
      };
      let instance = TaskInstance::new(registered.descriptor.clone(), registered.instantiate(), ctx);

      let result = match tokio::spawn(instance.run(scope.stage_timeout)).await {
        Ok(result) => result,
        Err(e) => {
          error!(
            execution_id = %run.execution_id,
            task_id = %task_id,
            task_name = %task,
            error = %e,
            "task_failed"
          );
          let reason = FailureReason::Panicked {
            message: e.to_string(),
          };
          TaskResult::failed(task_id, task, reason)
        }
      };

      this.notify_task_end(&run, &result);
      NodeOutcome::single(result)
    }
    .boxed()
  }

  /// Run nodes in order. Under fail-fast the first failure abandons the rest.
  fn run_sequence(
    &self,
    nodes: Vec<PlanNode>,
    scope: Arc<Scope>,
    run: Arc<Run>,
  ) -> BoxFuture<'static, NodeOutcome> {
    let this = self.clone();
    async move {
      let mut outcome = NodeOutcome::default();
      let mut remaining = nodes.into_iter();

      while let Some(node) = remaining.next() {
        let child = this.run_node(node, scope.clone(), run.clone()).await;
        outcome.absorb(child);

        if outcome.failed && scope.policy == FailurePolicy::FailFast {
          let skipped: Vec<String> = remaining.by_ref().flat_map(|n| unit_names(&n)).collect();
          if !skipped.is_empty() {
            warn!(
              execution_id = %run.execution_id,
              plan_id = %scope.plan_id,
              skipped = ?skipped,
              "abandoning remaining steps"
            );
          }
          outcome.skipped.extend(skipped);
          break;
        }
      }

      outcome
    }
    .boxed()
  }

  /// Start every child at once and merge outcomes as they complete.
  ///
  /// A failing child never cancels its siblings.
  fn run_parallel(
    &self,
    nodes: Vec<PlanNode>,
    scope: Arc<Scope>,
    run: Arc<Run>,
  ) -> BoxFuture<'static, NodeOutcome> {
    let this = self.clone();
    async move {
      let mut pending: FuturesUnordered<_> = nodes
        .into_iter()
        .map(|node| {
          let label = node_label(&node);
          let handle = tokio::spawn(this.run_node(node, scope.clone(), run.clone()));
          async move { (label, handle.await) }
        })
        .collect();

      let mut outcome = NodeOutcome::default();
      while let Some((label, joined)) = pending.next().await {
        match joined {
          Ok(child) => outcome.absorb(child),
          Err(e) => {
            error!(
              execution_id = %run.execution_id,
              unit = %label,
              error = %e,
              "task_failed"
            );
            let reason = FailureReason::Panicked {
              message: e.to_string(),
            };
            let result = TaskResult::failed(uuid::Uuid::new_v4().to_string(), label, reason);
            this.notify_task_end(&run, &result);
            outcome.absorb(NodeOutcome::single(result));
          }
        }
      }

      outcome
    }
    .boxed()
  }

  /// Run a registered plan as a unit and fold its results in under its name.
  fn run_sub_plan(
    &self,
    plan_id: String,
    input: serde_json::Value,
    scope: Arc<Scope>,
    run: Arc<Run>,
  ) -> BoxFuture<'static, NodeOutcome> {
    let this = self.clone();
    async move {
      let depth = scope.depth + 1;
      if depth > this.config.max_depth {
        let reason = FailureReason::DepthExceeded {
          max_depth: this.config.max_depth,
        };
        return this.sub_plan_failed(&run, &plan_id, reason);
      }

      let plan = match this.registry.plan(&plan_id) {
        Ok(plan) => plan.clone(),
        Err(_) => {
          let reason = FailureReason::UnknownPlan {
            plan_id: plan_id.clone(),
          };
          return this.sub_plan_failed(&run, &plan_id, reason);
        }
      };

      let input = match render_input(&input, &scope.input) {
        Ok(input) => input,
        Err(e) => {
          let reason = FailureReason::InvalidInput {
            message: e.to_string(),
          };
          return this.sub_plan_failed(&run, &plan_id, reason);
        }
      };

      info!(
        execution_id = %run.execution_id,
        parent = %scope.plan_id,
        plan_id = %plan_id,
        depth,
        "sub_plan_started"
      );

      let child_scope = Arc::new(Scope {
        plan_id: plan.plan_id.clone(),
        policy: plan.policy,
        stage_timeout: plan
          .stage_timeout_ms
          .map(Duration::from_millis)
          .or(scope.stage_timeout),
        input,
        depth,
      });
      let child = this.run_sequence(plan.steps, child_scope, run.clone()).await;

      let failed: Vec<String> = child
        .results
        .iter()
        .filter(|r| !r.is_success())
        .map(TaskResult::qualified_name)
        .collect();

      let mut outcome = NodeOutcome {
        failed: child.failed,
        results: child
          .results
          .into_iter()
          .map(|r| r.nested_under(&plan_id))
          .collect(),
        skipped: child
          .skipped
          .into_iter()
          .map(|name| format!("{}/{}", plan_id, name))
          .collect(),
      };

      if child.failed {
        let reason = FailureReason::SubPlan {
          plan_id: plan_id.clone(),
          failed,
        };
        outcome.absorb(this.sub_plan_failed(&run, &plan_id, reason));
      }

      outcome
    }
    .boxed()
  }

  fn sub_plan_failed(&self, run: &Run, plan_id: &str, reason: FailureReason) -> NodeOutcome {
    let task_id = uuid::Uuid::new_v4().to_string();
    error!(
      execution_id = %run.execution_id,
      task_id = %task_id,
      plan_id = %plan_id,
      error = %reason,
      "task_failed"
    );
    let result = TaskResult::failed(task_id, plan_id, reason);
    self.notify_task_end(run, &result);
    NodeOutcome::single(result)
  }

  fn notify_task_end(&self, run: &Run, result: &TaskResult) {
    let event = match result.failure() {
      None => ExecutionEvent::TaskCompleted {
        execution_id: run.execution_id.clone(),
        task_id: result.task_id.clone(),
        task_name: result.task_name.clone(),
        payload: result.payload.clone(),
      },
      Some(reason) => ExecutionEvent::TaskFailed {
        execution_id: run.execution_id.clone(),
        task_id: result.task_id.clone(),
        task_name: result.task_name.clone(),
        reason: reason.clone(),
      },
    };
    self.notifier.notify(event);
  }
}

/// Names of every unit under `node`, for skip reporting.
fn unit_names(node: &PlanNode) -> Vec<String> {
  match node {
    PlanNode::Step { task } => vec![task.clone()],
    PlanNode::SubPlan { plan, .. } => vec![plan.clone()],
    PlanNode::Parallel { nodes } | PlanNode::Sequence { nodes } => {
      nodes.iter().flat_map(unit_names).collect()
    }
  }
}

fn node_label(node: &PlanNode) -> String {
  match node {
    PlanNode::Step { task } => task.clone(),
    PlanNode::SubPlan { plan, .. } => plan.clone(),
    PlanNode::Parallel { .. } => "parallel".to_string(),
    PlanNode::Sequence { .. } => "sequence".to_string(),
  }
}

/// Critical sink failures fail the run. Task failures fail it under
/// fail-fast and degrade it under best-effort if anything succeeded.
/// Non-critical sink failures degrade it.
fn run_status(plan: &PlanDef, outcome: &NodeOutcome, sinks: &[WriteOutcome]) -> RunStatus {
  if sinks
    .iter()
    .any(|s| !s.is_success() && plan.is_critical(s.sink))
  {
    return RunStatus::Failure;
  }

  if outcome.failed {
    let any_success = outcome.results.iter().any(TaskResult::is_success);
    return match plan.policy {
      FailurePolicy::BestEffort if any_success => RunStatus::PartialFailure,
      _ => RunStatus::Failure,
    };
  }

  if sinks.iter().any(|s| !s.is_success()) {
    RunStatus::PartialFailure
  } else {
    RunStatus::Success
  }
}
