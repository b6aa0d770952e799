//! Structural validation of plans against a registry.

use std::fmt;

use cadence_config::{PlanDef, PlanNode, SinkKind};
use cadence_registry::Registry;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One structural problem found in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationProblem {
  /// A step names a task that is not registered.
  UnknownTask { plan_id: String, name: String },
  /// A sub-plan node names a plan that is not registered.
  UnknownPlan { plan_id: String, name: String },
  /// A sub-plan transitively references itself. `chain` ends with the
  /// repeated plan.
  Cycle { chain: Vec<String> },
  /// Sub-plan nesting goes deeper than allowed.
  DepthExceeded { chain: Vec<String>, max_depth: usize },
  /// A task routes to a sink kind with no registered sink.
  SinkNotRegistered { task: String, sink: SinkKind },
  /// A task routes to a sink kind missing from the plan's sink order.
  SinkNotOrdered { task: String, sink: SinkKind },
  /// A sink kind appears more than once in the sink order.
  DuplicateSinkOrder { sink: SinkKind },
  /// A parallel or sequence node has no children.
  EmptyGroup { plan_id: String },
}

impl fmt::Display for ValidationProblem {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ValidationProblem::UnknownTask { plan_id, name } => {
        write!(f, "unknown task '{}' in plan '{}'", name, plan_id)
      }
      ValidationProblem::UnknownPlan { plan_id, name } => {
        write!(f, "unknown sub-plan '{}' in plan '{}'", name, plan_id)
      }
      ValidationProblem::Cycle { chain } => write!(f, "cycle detected: {}", chain.join(" -> ")),
      ValidationProblem::DepthExceeded { chain, max_depth } => write!(
        f,
        "nesting exceeds max depth {}: {}",
        max_depth,
        chain.join(" -> ")
      ),
      ValidationProblem::SinkNotRegistered { task, sink } => {
        write!(f, "task '{}' writes to {} but no such sink is registered", task, sink)
      }
      ValidationProblem::SinkNotOrdered { task, sink } => {
        write!(f, "task '{}' writes to {} which is not in the sink order", task, sink)
      }
      ValidationProblem::DuplicateSinkOrder { sink } => {
        write!(f, "{} appears more than once in the sink order", sink)
      }
      ValidationProblem::EmptyGroup { plan_id } => {
        write!(f, "empty parallel or sequence group in plan '{}'", plan_id)
      }
    }
  }
}

/// Every structural problem found in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("plan '{plan_id}' is invalid: {}", join_problems(.problems))]
pub struct PlanValidationError {
  pub plan_id: String,
  pub problems: Vec<ValidationProblem>,
}

impl PlanValidationError {
  pub fn has_cycle(&self) -> bool {
    self
      .problems
      .iter()
      .any(|p| matches!(p, ValidationProblem::Cycle { .. }))
  }
}

fn join_problems(problems: &[ValidationProblem]) -> String {
  problems
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join("; ")
}

/// Checks a plan and every sub-plan it reaches before anything runs.
///
/// Sub-plans are walked depth-first; the chain of plans on the current path
/// plays the role of the "in progress" colour, so reaching a plan already on
/// the chain is a back edge.
pub struct PlanValidator<'a> {
  registry: &'a Registry,
  max_depth: usize,
}

struct Walk<'a> {
  root: &'a PlanDef,
  chain: Vec<String>,
  problems: Vec<ValidationProblem>,
}

impl Walk<'_> {
  fn report(&mut self, problem: ValidationProblem) {
    if !self.problems.contains(&problem) {
      self.problems.push(problem);
    }
  }
}

impl<'a> PlanValidator<'a> {
  pub fn new(registry: &'a Registry, max_depth: usize) -> Self {
    Self {
      registry,
      max_depth,
    }
  }

  pub fn validate(&self, plan: &PlanDef) -> Result<(), PlanValidationError> {
    let mut walk = Walk {
      root: plan,
      chain: vec![plan.plan_id.clone()],
      problems: Vec::new(),
    };

    let mut seen = Vec::new();
    for &sink in &plan.sink_order {
      if seen.contains(&sink) {
        walk.report(ValidationProblem::DuplicateSinkOrder { sink });
      }
      seen.push(sink);
    }

    self.walk_nodes(&plan.plan_id, &plan.steps, &mut walk);

    if walk.problems.is_empty() {
      Ok(())
    } else {
      Err(PlanValidationError {
        plan_id: plan.plan_id.clone(),
        problems: walk.problems,
      })
    }
  }

  fn walk_nodes(&self, plan_id: &str, nodes: &[PlanNode], walk: &mut Walk<'_>) {
    for node in nodes {
      self.walk_node(plan_id, node, walk);
    }
  }

  fn walk_node(&self, plan_id: &str, node: &PlanNode, walk: &mut Walk<'_>) {
    match node {
      PlanNode::Step { task } => self.check_task(plan_id, task, walk),
      PlanNode::Parallel { nodes } | PlanNode::Sequence { nodes } => {
        if nodes.is_empty() {
          walk.report(ValidationProblem::EmptyGroup {
            plan_id: plan_id.to_string(),
          });
        }
        self.walk_nodes(plan_id, nodes, walk);
      }
      PlanNode::SubPlan { plan, .. } => self.enter_sub_plan(plan_id, plan, walk),
    }
  }

  fn check_task(&self, plan_id: &str, name: &str, walk: &mut Walk<'_>) {
    let registered = match self.registry.resolve(name) {
      Ok(registered) => registered,
      Err(_) => {
        walk.report(ValidationProblem::UnknownTask {
          plan_id: plan_id.to_string(),
          name: name.to_string(),
        });
        return;
      }
    };

    // Nested results are written by the root plan, so its sink order rules.
    let Some(sink) = registered.descriptor.sink else {
      return;
    };
    if !self.registry.has_sink(sink) {
      walk.report(ValidationProblem::SinkNotRegistered {
        task: name.to_string(),
        sink,
      });
    }
    if !walk.root.sink_order.contains(&sink) {
      walk.report(ValidationProblem::SinkNotOrdered {
        task: name.to_string(),
        sink,
      });
    }
  }

  fn enter_sub_plan(&self, parent: &str, name: &str, walk: &mut Walk<'_>) {
    if walk.chain.iter().any(|p| p == name) {
      let mut chain = walk.chain.clone();
      chain.push(name.to_string());
      walk.report(ValidationProblem::Cycle { chain });
      return;
    }

    let Ok(plan) = self.registry.plan(name) else {
      walk.report(ValidationProblem::UnknownPlan {
        plan_id: parent.to_string(),
        name: name.to_string(),
      });
      return;
    };

    walk.chain.push(name.to_string());
    if walk.chain.len() - 1 > self.max_depth {
      walk.report(ValidationProblem::DepthExceeded {
        chain: walk.chain.clone(),
        max_depth: self.max_depth,
      });
    } else {
      self.walk_nodes(&plan.plan_id, &plan.steps, walk);
    }
    walk.chain.pop();
  }
}
