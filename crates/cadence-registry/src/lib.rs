//! Process-wide registry of tasks, sinks and plans.
//!
//! Everything is registered explicitly at startup, either directly or through
//! a [`TaskProvider`]. Once built, the registry is shared read-only behind an
//! `Arc` and never mutated during a run.

mod error;
mod provider;
mod registry;

pub use error::RegistryError;
pub use provider::TaskProvider;
pub use registry::{RegisteredTask, Registry};
