//! Domain types for the pipeline runner: identifiers, errors, the job
//! lifecycle state machine, project configuration and parameter
//! validation. Nothing in this crate touches the database or spawns
//! processes.

pub mod error;
pub mod lifecycle;
pub mod project_config;
pub mod types;
pub mod validation;
