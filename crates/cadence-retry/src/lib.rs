//! Retry policy for operations against unreliable resources.
//!
//! A [`RetryPolicy`] is a pure description: the wait before attempt `k + 1`
//! is a function of `k` and the policy alone. A [`Retrier`] runs an
//! operation under a policy and sleeps through a [`Sleeper`], so tests can
//! swap the tokio timer for a [`RecordingSleeper`] and never touch the clock.

mod error;
mod policy;
mod retrier;
mod sleeper;

pub use error::RetryError;
pub use policy::RetryPolicy;
pub use retrier::{Retrier, RetryOutcome};
pub use sleeper::{RecordingSleeper, Sleeper, TokioSleeper};
