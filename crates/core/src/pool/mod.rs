//! Bounded worker pools with FIFO dispatch.
//!
//! A [`WorkerPool`] owns up to `capacity` worker threads, created lazily.
//! A [`Dispatcher`] wraps a pool in a tokio task that queues incoming jobs
//! and hands each to the first free slot, in submission order.

mod dispatch;
mod slots;
mod types;

pub use dispatch::Dispatcher;
pub use slots::{Lease, WorkerPool};
pub use types::{PoolSettings, PoolStatus};
