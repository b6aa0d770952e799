//! Result sinks for cadence.
//!
//! A [`Sink`] persists one batch of task payloads with an all-or-nothing
//! guarantee: either every payload is durably written, or none is and any
//! partial write has been undone before the error is returned.
//!
//! The concrete sinks talk to abstract backends ([`ObjectStore`],
//! [`Database`], [`HttpTransport`]). Network clients live outside this crate;
//! [`memory`] provides in-process backends for tests, demos and dry runs.

mod backend;
mod database;
mod error;
mod http;
pub mod memory;
mod object_store;
mod sink;

pub use backend::{BackendError, Database, HttpTransport, ObjectStore, Transaction};
pub use database::DatabaseSink;
pub use error::SinkError;
pub use http::HttpApiSink;
pub use object_store::ObjectStoreSink;
pub use sink::{Deadline, Sink, WriteReceipt};

pub use cadence_config::SinkKind;
