//! The boundary between the worker pool and whatever actually runs a
//! pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use runner_core::project_config::Project;
use runner_core::types::{DbId, Params};
use serde::Serialize;

use crate::error::PipelineError;

/// Everything needed to execute one job.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub job_id: DbId,
    pub project: Arc<Project>,
    /// Parameters already validated against the project's schema.
    pub params: Params,
}

/// Captured result of a successful run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Synchronizes a project's source and runs its pipeline.
///
/// Implementations must serialize work on any shared per-project state
/// (such as a local checkout) themselves; the worker pool may call
/// `execute` concurrently for the same project.
#[async_trait]
pub trait PipelineExecutor: Send + Sync {
    async fn execute(&self, request: &PipelineRequest) -> Result<PipelineOutput, PipelineError>;
}
