use axum::routing::post;
use axum::Router;

use crate::handlers::runs;
use crate::state::AppState;

/// Routes mounted at `/runs`.
///
/// ```text
/// POST   /                -> submit_run
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(runs::submit_run))
}

/// Unversioned `POST /run_kedro`, kept for existing clients.
pub fn legacy_router() -> Router<AppState> {
    Router::new().route("/run_kedro", post(runs::submit_run))
}
