//! Job entity models and DTOs.

use runner_core::lifecycle::JobStatus;
use runner_core::types::{DbId, StatusId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub project: String,
    pub params: serde_json::Value,
    pub requester: String,
    pub status_id: StatusId,
    /// Index of the worker slot that ran the job.
    pub worker_id: Option<i64>,
    /// Captured stdout of a finished run.
    pub output: Option<String>,
    pub error_message: Option<String>,
    pub error_details: Option<serde_json::Value>,
    pub received_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

impl Job {
    /// Decode `status_id`. `None` only if the row holds an unknown id.
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_id(self.status_id)
    }
}

/// Input for the one insert the store performs.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub project: String,
    pub params: serde_json::Value,
    pub requester: String,
}

/// A single legal status change.
///
/// Every variant carries the timestamp it stamps; callers compute it with
/// [`runner_core::lifecycle::next_timestamp`] so stamps stay monotonic.
#[derive(Debug, Clone)]
pub enum JobTransition {
    /// `queued -> running`, stamps `started_at`.
    Start { worker_id: i64, at: Timestamp },
    /// `running -> finished`, stamps `finished_at`.
    Finish { output: String, at: Timestamp },
    /// `running -> failed`, stamps `finished_at`.
    Fail {
        error: String,
        details: Option<serde_json::Value>,
        output: Option<String>,
        at: Timestamp,
    },
    /// `queued -> rejected` (admission queue full), stamps `finished_at`.
    Reject { reason: String, at: Timestamp },
}

impl JobTransition {
    /// The `(from, to)` edge this transition performs.
    pub fn edge(&self) -> (JobStatus, JobStatus) {
        match self {
            JobTransition::Start { .. } => (JobStatus::Queued, JobStatus::Running),
            JobTransition::Finish { .. } => (JobStatus::Running, JobStatus::Finished),
            JobTransition::Fail { .. } => (JobStatus::Running, JobStatus::Failed),
            JobTransition::Reject { .. } => (JobStatus::Queued, JobStatus::Rejected),
        }
    }
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    /// Filter by status name (e.g. `queued`, `failed`).
    pub status: Option<String>,
    /// Filter by project name.
    pub project: Option<String>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn every_transition_is_a_legal_edge() {
        let at = Utc::now();
        let transitions = [
            JobTransition::Start { worker_id: 0, at },
            JobTransition::Finish {
                output: String::new(),
                at,
            },
            JobTransition::Fail {
                error: String::new(),
                details: None,
                output: None,
                at,
            },
            JobTransition::Reject {
                reason: String::new(),
                at,
            },
        ];
        for t in transitions {
            let (from, to) = t.edge();
            assert!(from.can_transition_to(to), "{from} -> {to}");
        }
    }
}
