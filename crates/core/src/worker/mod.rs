//! Isolated codec workers.
//!
//! Each worker is a named OS thread that exclusively owns one engine
//! instance. Requests go in over an mpsc channel; responses come back on a
//! broadcast stream tagged with a [`CorrelationId`], and
//! [`WorkerClient::request`] picks out the matching one under a timeout.

mod client;
mod error;
mod thread;
mod types;

pub use client::{WorkerClient, ROUND_TRIP_ATTEMPTS};
pub use error::WorkerError;
pub use thread::{spawn_worker, EngineFactory, WorkerEngine};
pub use types::{CorrelationId, WorkerMessage, WorkerRequest};
