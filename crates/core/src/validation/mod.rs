//! Parameter validation for run requests.
//!
//! Each project carries its own [`ParamValidator`]. The default
//! implementation is [`SchemaValidator`], driven by the per-field rule sets
//! declared in the project configuration file. Validation never stops at
//! the first problem: callers get one [`FieldViolation`] per failing field.

pub mod evaluator;
pub mod rules;

pub use evaluator::SchemaValidator;
pub use rules::{FieldRule, FieldViolation, Schema, ValueType};

use crate::error::CoreError;
use crate::types::Params;

/// Validates the parameter mapping of a run request for one project.
pub trait ParamValidator: Send + Sync {
    /// Return every violation found in `params` (empty when valid).
    fn validate(&self, params: &Params) -> Vec<FieldViolation>;

    /// Convenience wrapper turning violations into [`CoreError::InvalidParameters`].
    fn check(&self, params: &Params) -> Result<(), CoreError> {
        let violations = self.validate(params);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(CoreError::InvalidParameters(violations))
        }
    }
}

/// Validator that accepts any parameter mapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl ParamValidator for AcceptAll {
    fn validate(&self, _params: &Params) -> Vec<FieldViolation> {
        Vec::new()
    }
}
