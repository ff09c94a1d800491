//! Submission path for new pipeline runs.
//!
//! [`Dispatcher::submit`] is the single entry point that turns a request
//! into a job: resolve the project, validate the parameters, record the job
//! as `queued`, then hand it to the [`AdmissionQueue`]. Execution happens
//! only in the worker pool, so every accepted job runs exactly once.

use std::sync::Arc;

use runner_core::error::CoreError;
use runner_core::lifecycle::next_timestamp;
use runner_core::project_config::ProjectRegistry;
use runner_core::types::{DbId, Params, Timestamp};
use runner_db::models::job::NewJob;
use runner_db::repositories::JobRepo;
use runner_db::DbPool;

use crate::queue::{AdmissionQueue, QueueError, QueuedJob};

/// Reason stored on jobs turned away by a full queue.
pub const QUEUE_FULL_REASON: &str = "queue full";

/// Reason stored on jobs submitted while the service is stopping.
pub const SHUTTING_DOWN_REASON: &str = "service shutting down";

/// A job the queue accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub job_id: DbId,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub struct Dispatcher {
    pool: DbPool,
    registry: Arc<ProjectRegistry>,
    queue: Arc<AdmissionQueue>,
}

impl Dispatcher {
    pub fn new(pool: DbPool, registry: Arc<ProjectRegistry>, queue: Arc<AdmissionQueue>) -> Self {
        Self {
            pool,
            registry,
            queue,
        }
    }

    pub fn registry(&self) -> &ProjectRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &AdmissionQueue {
        &self.queue
    }

    /// Accept a run request for `project`.
    ///
    /// Unknown projects and invalid parameters are refused before anything
    /// is stored. A job refused by a full queue is kept as `rejected`.
    pub async fn submit(
        &self,
        project: &str,
        params: Params,
        requester: &str,
    ) -> Result<Accepted, SubmitError> {
        let resolved = self.registry.get(project)?;
        resolved.validator.check(&params)?;

        let input = NewJob {
            project: resolved.name.clone(),
            params: serde_json::Value::Object(params.clone()),
            requester: requester.to_string(),
        };
        let job = JobRepo::insert_queued(&self.pool, &input).await?;

        let queued = QueuedJob {
            job_id: job.id,
            project: job.project.clone(),
            params,
            received_at: job.received_at,
        };

        match self.queue.enqueue(queued).await {
            Ok(()) => {
                tracing::info!(job_id = job.id, project, requester, "Job queued");
                Ok(Accepted { job_id: job.id })
            }
            Err(QueueError::Full { capacity }) => {
                self.reject(job.id, job.received_at, QUEUE_FULL_REASON).await;
                Err(CoreError::QueueFull { capacity }.into())
            }
            Err(QueueError::Closed) => {
                self.reject(job.id, job.received_at, SHUTTING_DOWN_REASON).await;
                Err(CoreError::Unavailable("Service is shutting down".to_string()).into())
            }
        }
    }

    async fn reject(&self, job_id: DbId, received_at: Timestamp, reason: &str) {
        let at = next_timestamp(received_at);
        match JobRepo::reject(&self.pool, job_id, reason, at).await {
            Ok(_) => tracing::warn!(job_id, reason, "Job rejected"),
            Err(e) => tracing::error!(job_id, error = %e, "Failed to record rejected job"),
        }
    }
}
