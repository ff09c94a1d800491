use crate::lifecycle::JobStatus;
use crate::types::DbId;
use crate::validation::rules::FieldViolation;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Project not found in the configuration: {0}")]
    ProjectNotFound(String),

    #[error("Invalid parameters: {}", summarize(.0))]
    InvalidParameters(Vec<FieldViolation>),

    #[error("Request queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Illegal job transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_parameters_lists_every_field() {
        let err = CoreError::InvalidParameters(vec![
            FieldViolation::new("x", "required", "required field"),
            FieldViolation::new("y", "type", "must be of integer type"),
        ]);
        assert_eq!(
            err.to_string(),
            "Invalid parameters: x: required field; y: must be of integer type"
        );
    }

    #[test]
    fn queue_full_mentions_capacity() {
        let err = CoreError::QueueFull { capacity: 1000 };
        assert_eq!(err.to_string(), "Request queue is full (capacity 1000)");
    }
}
