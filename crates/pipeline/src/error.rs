use std::fmt;

use serde::Serialize;
use serde_json::json;

/// Which part of an execution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Serializing the parameters for the command line.
    Params,
    /// Fetching or updating the project checkout.
    SourceSync,
    /// Running the pipeline itself.
    Run,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Params => "params",
            Stage::SourceSync => "source_sync",
            Stage::Run => "run",
        })
    }
}

/// Errors produced while executing a pipeline job.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Parameters cannot be expressed on the pipeline command line.
    #[error("Invalid parameter '{key}': {reason}")]
    InvalidParameters { key: String, reason: String },

    /// Clone or pull of the project source failed.
    #[error("Source sync failed for '{project}': {message}")]
    SourceSync { project: String, message: String },

    /// The pipeline ran and exited unsuccessfully.
    #[error("Pipeline exited with code {exit_code}: {}", .stderr.trim())]
    Execution {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// A child process exceeded its timeout and was killed.
    #[error("{stage} timed out after {elapsed_ms}ms")]
    Timeout { stage: Stage, elapsed_ms: u64 },

    /// A child process could not be spawned or waited on.
    #[error("Failed to spawn {program} during {stage}: {source}")]
    Spawn {
        stage: Stage,
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::InvalidParameters { .. } => Stage::Params,
            PipelineError::SourceSync { .. } => Stage::SourceSync,
            PipelineError::Execution { .. } => Stage::Run,
            PipelineError::Timeout { stage, .. } | PipelineError::Spawn { stage, .. } => *stage,
        }
    }

    /// Structured detail persisted as the job's `error_details`.
    pub fn details(&self) -> serde_json::Value {
        match self {
            PipelineError::Execution {
                exit_code, stderr, ..
            } => json!({
                "stage": self.stage(),
                "exit_code": exit_code,
                "stderr": stderr,
            }),
            PipelineError::Timeout { elapsed_ms, .. } => json!({
                "stage": self.stage(),
                "timeout": true,
                "elapsed_ms": elapsed_ms,
            }),
            other => json!({
                "stage": other.stage(),
                "message": other.to_string(),
            }),
        }
    }

    /// Stdout captured before the failure, if any.
    pub fn stdout(&self) -> Option<&str> {
        match self {
            PipelineError::Execution { stdout, .. } => Some(stdout),
            _ => None,
        }
    }
}
