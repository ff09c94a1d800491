//! Read-only handlers for the `/jobs` resource.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use runner_core::error::CoreError;
use runner_core::lifecycle::JobStatus;
use runner_core::types::DbId;
use runner_db::models::job::{Job, JobListQuery};
use runner_db::repositories::JobRepo;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// A job row plus its decoded status name.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    #[serde(flatten)]
    pub job: Job,
    pub status: Option<JobStatus>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        let status = job.status();
        Self { job, status }
    }
}

/// GET /api/v1/jobs
///
/// List jobs newest first. Supports optional `status`, `project`, `limit`
/// and `offset` query parameters.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs: Vec<JobResponse> = JobRepo::list(&state.pool, &params)
        .await?
        .into_iter()
        .map(JobResponse::from)
        .collect();

    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = JobRepo::find_by_id(&state.pool, job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        }))?;

    Ok(Json(DataResponse {
        data: JobResponse::from(job),
    }))
}
