//! Admission queue, worker pool and submission dispatcher.
//!
//! Requests flow `Dispatcher::submit` -> [`AdmissionQueue`] -> [`WorkerPool`].
//! The dispatcher is the only producer and the pool the only consumer, so
//! every accepted job is executed by exactly one worker.

pub mod dispatcher;
pub mod pool;
pub mod queue;

pub use dispatcher::{Accepted, Dispatcher, SubmitError};
pub use pool::{WorkerPool, WorkerPoolConfig};
pub use queue::{AdmissionQueue, QueueError, QueuedJob};
