//! Task lifecycle for cadence.
//!
//! A task is any type implementing [`Task`]. It is registered under a
//! [`TaskDescriptor`] together with a [`TaskFactory`] that builds a fresh
//! instance per run. A [`TaskInstance`] drives one instance through
//! precheck → preprocess → process → postprocess and produces an immutable
//! [`TaskResult`].

mod descriptor;
mod error;
mod instance;
mod result;
mod stage;
mod task;

pub use descriptor::TaskDescriptor;
pub use error::TaskError;
pub use instance::TaskInstance;
pub use result::{FailureReason, TaskResult, TaskStatus};
pub use stage::Stage;
pub use task::{Task, TaskContext, TaskFactory, factory};
