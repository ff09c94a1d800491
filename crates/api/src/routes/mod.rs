pub mod health;
pub mod jobs;
pub mod runs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /runs                       submit a pipeline run
/// /jobs                       list jobs
/// /jobs/{id}                  job detail
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/runs", runs::router())
        .nest("/jobs", jobs::router())
}
