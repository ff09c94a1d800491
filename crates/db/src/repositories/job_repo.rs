//! Repository for the `jobs` table.
//!
//! Rows are inserted once, in `queued` status, and afterwards only changed
//! through [`JobRepo::transition`]. Each update is guarded by the status
//! the row must currently hold, so a row can never move twice along the
//! same edge, move backwards, or leave a terminal status.

use chrono::Utc;
use runner_core::lifecycle::JobStatus;
use runner_core::types::{DbId, StatusId, Timestamp};
use sqlx::SqlitePool;

use crate::models::job::{Job, JobListQuery, JobTransition, NewJob};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, project, params, requester, status_id, worker_id, \
    output, error_message, error_details, \
    received_at, started_at, finished_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides persistence operations for run jobs.
pub struct JobRepo;

impl JobRepo {
    /// Record a new job in `queued` status, stamping `received_at`.
    pub async fn insert_queued(pool: &SqlitePool, input: &NewJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (project, params, requester, status_id, received_at) \
             VALUES (?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(&input.project)
            .bind(&input.params)
            .bind(&input.requester)
            .bind(JobStatus::Queued.id())
            .bind(Utc::now())
            .fetch_one(pool)
            .await
    }

    /// Apply a status change to one job.
    ///
    /// Returns the updated row, or `None` when the job does not exist or is
    /// not in the status the transition starts from.
    pub async fn transition(
        pool: &SqlitePool,
        job_id: DbId,
        transition: &JobTransition,
    ) -> Result<Option<Job>, sqlx::Error> {
        let (from, to) = transition.edge();

        match transition {
            JobTransition::Start { worker_id, at } => {
                let query = format!(
                    "UPDATE jobs SET status_id = ?, worker_id = ?, started_at = ? \
                     WHERE id = ? AND status_id = ? \
                     RETURNING {COLUMNS}"
                );
                sqlx::query_as::<_, Job>(&query)
                    .bind(to.id())
                    .bind(worker_id)
                    .bind(at)
                    .bind(job_id)
                    .bind(from.id())
                    .fetch_optional(pool)
                    .await
            }
            JobTransition::Finish { output, at } => {
                let query = format!(
                    "UPDATE jobs SET status_id = ?, output = ?, finished_at = ? \
                     WHERE id = ? AND status_id = ? \
                     RETURNING {COLUMNS}"
                );
                sqlx::query_as::<_, Job>(&query)
                    .bind(to.id())
                    .bind(output)
                    .bind(at)
                    .bind(job_id)
                    .bind(from.id())
                    .fetch_optional(pool)
                    .await
            }
            JobTransition::Fail {
                error,
                details,
                output,
                at,
            } => {
                let query = format!(
                    "UPDATE jobs SET status_id = ?, error_message = ?, error_details = ?, \
                         output = ?, finished_at = ? \
                     WHERE id = ? AND status_id = ? \
                     RETURNING {COLUMNS}"
                );
                sqlx::query_as::<_, Job>(&query)
                    .bind(to.id())
                    .bind(error)
                    .bind(details)
                    .bind(output)
                    .bind(at)
                    .bind(job_id)
                    .bind(from.id())
                    .fetch_optional(pool)
                    .await
            }
            JobTransition::Reject { reason, at } => {
                let query = format!(
                    "UPDATE jobs SET status_id = ?, error_message = ?, finished_at = ? \
                     WHERE id = ? AND status_id = ? \
                     RETURNING {COLUMNS}"
                );
                sqlx::query_as::<_, Job>(&query)
                    .bind(to.id())
                    .bind(reason)
                    .bind(at)
                    .bind(job_id)
                    .bind(from.id())
                    .fetch_optional(pool)
                    .await
            }
        }
    }

    /// `queued -> running`.
    pub async fn mark_running(
        pool: &SqlitePool,
        job_id: DbId,
        worker_id: i64,
        at: Timestamp,
    ) -> Result<Option<Job>, sqlx::Error> {
        Self::transition(pool, job_id, &JobTransition::Start { worker_id, at }).await
    }

    /// `running -> finished` with the captured output.
    pub async fn finish(
        pool: &SqlitePool,
        job_id: DbId,
        output: &str,
        at: Timestamp,
    ) -> Result<Option<Job>, sqlx::Error> {
        let transition = JobTransition::Finish {
            output: output.to_string(),
            at,
        };
        Self::transition(pool, job_id, &transition).await
    }

    /// `running -> failed` with an error message and optional details.
    ///
    /// No automatic retry is performed; a retry is a new job.
    pub async fn fail(
        pool: &SqlitePool,
        job_id: DbId,
        error: &str,
        details: Option<serde_json::Value>,
        output: Option<String>,
        at: Timestamp,
    ) -> Result<Option<Job>, sqlx::Error> {
        let transition = JobTransition::Fail {
            error: error.to_string(),
            details,
            output,
            at,
        };
        Self::transition(pool, job_id, &transition).await
    }

    /// `queued -> rejected`, used when the admission queue is full.
    pub async fn reject(
        pool: &SqlitePool,
        job_id: DbId,
        reason: &str,
        at: Timestamp,
    ) -> Result<Option<Job>, sqlx::Error> {
        let transition = JobTransition::Reject {
            reason: reason.to_string(),
            at,
        };
        Self::transition(pool, job_id, &transition).await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &SqlitePool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = ?");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List jobs newest first, with optional status/project filters.
    ///
    /// An unrecognised status name matches nothing.
    pub async fn list(pool: &SqlitePool, params: &JobListQuery) -> Result<Vec<Job>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(0, MAX_LIMIT);
        let offset = params.offset.unwrap_or(0).max(0);

        let status_id: Option<StatusId> = match params.status.as_deref() {
            Some(name) => match JobStatus::from_name(name) {
                Some(status) => Some(status.id()),
                None => return Ok(Vec::new()),
            },
            None => None,
        };

        let mut conditions: Vec<&str> = Vec::new();
        if status_id.is_some() {
            conditions.push("status_id = ?");
        }
        if params.project.is_some() {
            conditions.push("project = ?");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             {where_clause} \
             ORDER BY id DESC \
             LIMIT ? OFFSET ?"
        );

        let mut q = sqlx::query_as::<_, Job>(&query);
        if let Some(sid) = status_id {
            q = q.bind(sid);
        }
        if let Some(project) = &params.project {
            q = q.bind(project);
        }
        q = q.bind(limit).bind(offset);

        q.fetch_all(pool).await
    }

    /// Number of jobs per status, for every status with at least one job.
    pub async fn count_by_status(
        pool: &SqlitePool,
    ) -> Result<Vec<(JobStatus, i64)>, sqlx::Error> {
        let rows: Vec<(StatusId, i64)> = sqlx::query_as(
            "SELECT status_id, COUNT(*) FROM jobs GROUP BY status_id ORDER BY status_id",
        )
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, count)| JobStatus::from_id(id).map(|s| (s, count)))
            .collect())
    }

    /// Total number of job rows.
    pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(pool)
            .await
    }
}
