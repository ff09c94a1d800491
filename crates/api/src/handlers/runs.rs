//! Handlers for submitting pipeline runs.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use runner_core::lifecycle::JobStatus;
use runner_core::types::{DbId, Params};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::extract::Requester;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /api/v1/runs` and `POST /run_kedro`.
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub project: String,
    pub params: Params,
}

#[derive(Debug, Serialize)]
pub struct RunAccepted {
    pub job_id: DbId,
    pub status: JobStatus,
}

/// POST /api/v1/runs
///
/// Validate and queue a pipeline run. Returns 202 with the new job id;
/// the run itself happens later on a worker.
pub async fn submit_run(
    State(state): State<AppState>,
    Requester(requester): Requester,
    body: Result<Json<RunRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = body?;

    let accepted = state
        .dispatcher
        .submit(&input.project, input.params, &requester)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: RunAccepted {
                job_id: accepted.job_id,
                status: JobStatus::Queued,
            },
        }),
    ))
}
