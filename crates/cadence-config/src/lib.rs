//! Cadence Config
//!
//! This crate contains the serializable configuration types for cadence.
//! These types describe plans before they are validated against a registry
//! and handed to the executor.
//!
//! Configuration can be loaded from:
//! - JSON files (via CLI with `cadence run plan.json`)
//! - A plan directory, registered as the sub-plan catalog
//! - Any host that can produce the JSON shape (durable-execution workers, queues)

mod engine;
mod error;
mod load;
mod plan;
mod sink;

pub use engine::EngineConfig;
pub use error::ConfigError;
pub use load::load_plan_dir;
pub use plan::{FailurePolicy, PlanDef, PlanNode, default_sink_order};
pub use sink::SinkKind;
