//! Job lifecycle state machine.
//!
//! ```text
//! queued ──> running ──> finished
//!    │           └─────> failed
//!    └─────> rejected            (admission queue was full)
//! ```
//!
//! Each variant's discriminant matches the seed data in the
//! `job_statuses` lookup table. `finished`, `failed` and `rejected` are
//! terminal: nothing moves out of them, and a retry is always a new job.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{StatusId, Timestamp};

#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued = 1,
    Running = 2,
    Finished = 3,
    Failed = 4,
    /// Recorded but never enqueued because the admission queue was full.
    Rejected = 5,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Finished,
        JobStatus::Failed,
        JobStatus::Rejected,
    ];

    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    pub fn from_id(id: StatusId) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
            JobStatus::Rejected => "rejected",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Finished | JobStatus::Failed | JobStatus::Rejected
        )
    }

    /// Whether `self -> next` is one of the four legal edges.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Rejected)
                | (JobStatus::Running, JobStatus::Finished)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    /// Validate a transition, returning the new status.
    pub fn transition(self, next: JobStatus) -> Result<JobStatus, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl From<JobStatus> for StatusId {
    fn from(value: JobStatus) -> Self {
        value as StatusId
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Timestamp for the next lifecycle stamp, never earlier than `previous`.
///
/// Wall clocks can step backwards; stamps on one job must not.
pub fn next_timestamp(previous: Timestamp) -> Timestamp {
    chrono::Utc::now().max(previous)
}
