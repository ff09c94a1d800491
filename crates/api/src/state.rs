use std::sync::Arc;

use runner_worker::{AdmissionQueue, Dispatcher};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind an `Arc` or is already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Job Record Store connection pool.
    pub pool: runner_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// The only path from a request to the admission queue.
    pub dispatcher: Arc<Dispatcher>,
    /// Read-only view of the admission queue, for health reporting.
    pub queue: Arc<AdmissionQueue>,
}
