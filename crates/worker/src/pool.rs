//! Fixed-size pool of workers draining the [`AdmissionQueue`].
//!
//! Each worker is a long-lived Tokio task that takes one job at a time and
//! runs it in its own spawned task. A job that returns an error, or whose
//! task panics, is recorded as `failed` and the worker moves on to the
//! next job. Failures to write the job record are logged, never propagated.

use std::sync::Arc;
use std::time::Duration;

use runner_core::lifecycle::{next_timestamp, JobStatus};
use runner_core::project_config::ProjectRegistry;
use runner_core::types::{DbId, Timestamp};
use runner_db::repositories::JobRepo;
use runner_db::DbPool;
use runner_pipeline::{PipelineExecutor, PipelineRequest};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::queue::{AdmissionQueue, QueuedJob};

/// Error message stored when a job's task panics.
pub const PANIC_MESSAGE: &str = "worker panicked";

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of jobs that may run at the same time.
    pub worker_count: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self { worker_count: 1 }
    }
}

/// Shared state every worker needs to run a job.
struct WorkerContext {
    pool: DbPool,
    queue: Arc<AdmissionQueue>,
    registry: Arc<ProjectRegistry>,
    executor: Arc<dyn PipelineExecutor>,
}

/// Handle to the running workers.
pub struct WorkerPool {
    cancel: CancellationToken,
    /// Tells workers to abort the job they are running.
    abort: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

/// How a job ended, before it is written to the store.
enum Outcome {
    Finished {
        output: String,
    },
    Failed {
        message: String,
        details: Option<serde_json::Value>,
        output: Option<String>,
    },
}

impl WorkerPool {
    /// Spawn `config.worker_count` workers (minimum 1) on the current runtime.
    pub fn start(
        config: WorkerPoolConfig,
        queue: Arc<AdmissionQueue>,
        pool: DbPool,
        registry: Arc<ProjectRegistry>,
        executor: Arc<dyn PipelineExecutor>,
    ) -> Self {
        let worker_count = config.worker_count.max(1);
        let cancel = CancellationToken::new();
        let abort = CancellationToken::new();
        let ctx = Arc::new(WorkerContext {
            pool,
            queue,
            registry,
            executor,
        });

        let workers = (0..worker_count)
            .map(|worker_id| {
                let ctx = Arc::clone(&ctx);
                let cancel = cancel.clone();
                let abort = abort.clone();
                tokio::spawn(async move { worker_loop(ctx, worker_id as i64, cancel, abort).await })
            })
            .collect();

        tracing::info!(worker_count, "Worker pool started");
        Self {
            cancel,
            abort,
            workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop taking jobs and wait up to `grace` for running jobs to finish.
    ///
    /// Jobs still in the queue are left `queued`. Jobs still running after
    /// `grace` are aborted, which kills their child processes, and their
    /// records stay `running`.
    pub async fn shutdown(self, grace: Duration) {
        self.cancel.cancel();

        let mut workers = self.workers;
        let joined = tokio::time::timeout(grace, async {
            for worker in workers.iter_mut() {
                let _ = worker.await;
            }
        })
        .await;

        if joined.is_err() {
            tracing::warn!(
                grace_ms = grace.as_millis() as u64,
                "Workers still busy after shutdown grace period, aborting running jobs",
            );
            self.abort.cancel();
            for worker in workers.iter_mut() {
                let _ = worker.await;
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

async fn worker_loop(
    ctx: Arc<WorkerContext>,
    worker_id: i64,
    cancel: CancellationToken,
    abort: CancellationToken,
) {
    tracing::debug!(worker_id, "Worker started");

    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = ctx.queue.dequeue() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let job_id = job.job_id;
        let mut task = tokio::spawn(run_job(Arc::clone(&ctx), worker_id, job));

        let joined = tokio::select! {
            joined = &mut task => joined,
            _ = abort.cancelled() => {
                task.abort();
                let _ = task.await;
                tracing::warn!(job_id, worker_id, "Job aborted at shutdown, left running");
                break;
            }
        };

        if let Err(e) = joined {
            tracing::error!(job_id, worker_id, error = %e, "Job task panicked");
            record_failure(&ctx, job_id, worker_id, PANIC_MESSAGE.to_string()).await;
        }
    }

    tracing::debug!(worker_id, "Worker stopped");
}

/// Run one job from `queued` to a terminal status.
async fn run_job(ctx: Arc<WorkerContext>, worker_id: i64, job: QueuedJob) {
    let job_id = job.job_id;

    let started_at = match JobRepo::mark_running(
        &ctx.pool,
        job_id,
        worker_id,
        next_timestamp(job.received_at),
    )
    .await
    {
        Ok(Some(row)) => row.started_at.unwrap_or(job.received_at),
        Ok(None) => {
            tracing::warn!(job_id, worker_id, "Job is no longer queued, skipping");
            return;
        }
        Err(e) => {
            tracing::error!(job_id, worker_id, error = %e, "Failed to mark job running");
            record_failure(&ctx, job_id, worker_id, format!("failed to start job: {e}")).await;
            return;
        }
    };

    tracing::info!(job_id, worker_id, project = %job.project, "Job started");

    let outcome = execute(&ctx, job).await;
    store_outcome(&ctx, job_id, worker_id, started_at, outcome).await;
}

async fn execute(ctx: &WorkerContext, job: QueuedJob) -> Outcome {
    let project = match ctx.registry.get(&job.project) {
        Ok(project) => project,
        Err(e) => {
            return Outcome::Failed {
                message: e.to_string(),
                details: None,
                output: None,
            }
        }
    };

    let request = PipelineRequest {
        job_id: job.job_id,
        project,
        params: job.params,
    };

    match ctx.executor.execute(&request).await {
        Ok(output) => Outcome::Finished {
            output: output.stdout,
        },
        Err(e) => Outcome::Failed {
            message: e.to_string(),
            details: Some(e.details()),
            output: e.stdout().map(str::to_string),
        },
    }
}

async fn store_outcome(
    ctx: &WorkerContext,
    job_id: DbId,
    worker_id: i64,
    started_at: Timestamp,
    outcome: Outcome,
) {
    let finished_at = next_timestamp(started_at);

    let (status, result) = match outcome {
        Outcome::Finished { output } => (
            JobStatus::Finished,
            JobRepo::finish(&ctx.pool, job_id, &output, finished_at).await,
        ),
        Outcome::Failed {
            message,
            details,
            output,
        } => {
            tracing::warn!(job_id, worker_id, error = %message, "Job failed");
            (
                JobStatus::Failed,
                JobRepo::fail(&ctx.pool, job_id, &message, details, output, finished_at).await,
            )
        }
    };

    match result {
        Ok(Some(_)) => tracing::info!(job_id, worker_id, status = %status, "Job completed"),
        Ok(None) => tracing::warn!(job_id, worker_id, status = %status, "Job was not running, result dropped"),
        Err(e) => tracing::error!(job_id, worker_id, error = %e, "Failed to store job result"),
    }
}

/// Mark a job that could not run to completion as failed with `message`.
///
/// Used when a job's task panics or the job could not be marked running.
/// A job still `queued` is started first so the record still ends in a
/// terminal status.
async fn record_failure(ctx: &WorkerContext, job_id: DbId, worker_id: i64, message: String) {
    let row = match JobRepo::find_by_id(&ctx.pool, job_id).await {
        Ok(Some(row)) => row,
        Ok(None) => return,
        Err(e) => {
            tracing::error!(job_id, error = %e, "Failed to load job, record left as is");
            return;
        }
    };

    let started_at = match row.status() {
        Some(JobStatus::Running) => row.started_at.unwrap_or(row.received_at),
        Some(JobStatus::Queued) => {
            let at = next_timestamp(row.received_at);
            match JobRepo::mark_running(&ctx.pool, job_id, worker_id, at).await {
                Ok(Some(started)) => started.started_at.unwrap_or(at),
                Ok(None) => return,
                Err(e) => {
                    tracing::error!(job_id, error = %e, "Job stranded in queued status");
                    return;
                }
            }
        }
        _ => return,
    };

    let outcome = Outcome::Failed {
        message,
        details: None,
        output: None,
    };
    store_outcome(ctx, job_id, worker_id, started_at, outcome).await;
}
