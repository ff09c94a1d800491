//! Pipeline Executor: syncs a project's source and runs its pipeline as a
//! child process.
//!
//! - [`PipelineExecutor`]: the trait the worker pool depends on.
//! - [`KedroExecutor`]: git checkout + `kedro run` implementation.
//! - [`CheckoutLocks`]: one lock per project checkout.
//! - [`process::run_command`]: spawn, capture and time-limit a child.

pub mod error;
pub mod executor;
pub mod kedro;
pub mod locks;
pub mod params;
pub mod process;
pub mod source;

pub use error::{PipelineError, Stage};
pub use executor::{PipelineExecutor, PipelineOutput, PipelineRequest};
pub use kedro::{KedroConfig, KedroExecutor};
pub use locks::CheckoutLocks;
