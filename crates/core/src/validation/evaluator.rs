//! Schema evaluator. Pure logic, no I/O.

use regex::Regex;
use serde_json::Value;

use super::rules::{FieldRule, FieldViolation, Schema};
use super::ParamValidator;
use crate::error::CoreError;
use crate::types::Params;

/// One schema entry with its regex compiled up front.
#[derive(Debug, Clone)]
struct CompiledRule {
    field: String,
    rule: FieldRule,
    regex: Option<Regex>,
}

/// [`ParamValidator`] backed by a declarative [`Schema`].
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    rules: Vec<CompiledRule>,
    allow_unknown: bool,
}

impl SchemaValidator {
    /// Compile `schema`. Fails if any `regex` rule is not a valid pattern.
    pub fn new(schema: &Schema, allow_unknown: bool) -> Result<Self, CoreError> {
        let mut rules = Vec::with_capacity(schema.len());
        for (field, rule) in schema {
            let regex = match &rule.regex {
                Some(pattern) => Some(Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
                    CoreError::Config(format!("invalid regex for parameter '{field}': {e}"))
                })?),
                None => None,
            };
            rules.push(CompiledRule {
                field: field.clone(),
                rule: rule.clone(),
                regex,
            });
        }
        Ok(Self {
            rules,
            allow_unknown,
        })
    }

    fn knows(&self, field: &str) -> bool {
        self.rules.iter().any(|r| r.field == field)
    }
}

impl ParamValidator for SchemaValidator {
    fn validate(&self, params: &Params) -> Vec<FieldViolation> {
        let mut violations: Vec<FieldViolation> = self
            .rules
            .iter()
            .filter_map(|compiled| evaluate_field(compiled, params.get(&compiled.field)))
            .collect();

        if !self.allow_unknown {
            violations.extend(
                params
                    .iter()
                    .filter(|(key, _)| !self.knows(key))
                    .map(|(key, value)| {
                        FieldViolation::new(key.as_str(), "unknown", "unknown field")
                            .with_value(value)
                    }),
            );
        }

        violations.sort_by(|a, b| a.field.cmp(&b.field));
        violations
    }
}

/// Evaluate one field. Stops at the first failing rule for that field.
fn evaluate_field(compiled: &CompiledRule, value: Option<&Value>) -> Option<FieldViolation> {
    let field = compiled.field.as_str();
    let rule = &compiled.rule;

    let value = match value {
        None if rule.required => {
            return Some(FieldViolation::new(field, "required", "required field"))
        }
        None => return None,
        Some(Value::Null) if rule.nullable => return None,
        Some(Value::Null) => {
            return Some(FieldViolation::new(field, "nullable", "null value not allowed"))
        }
        Some(v) => v,
    };

    if let Some(expected) = rule.value_type {
        if !expected.matches(value) {
            return Some(
                FieldViolation::new(field, "type", format!("must be of {} type", expected.name()))
                    .with_value(value),
            );
        }
    }

    if let Some(num) = value.as_f64() {
        if let Some(min) = rule.min.filter(|min| num < *min) {
            return Some(
                FieldViolation::new(field, "min", format!("min value is {min}")).with_value(value),
            );
        }
        if let Some(max) = rule.max.filter(|max| num > *max) {
            return Some(
                FieldViolation::new(field, "max", format!("max value is {max}")).with_value(value),
            );
        }
    }

    if let Some(s) = value.as_str() {
        let len = s.chars().count();
        if let Some(min) = rule.minlength.filter(|min| len < *min) {
            return Some(
                FieldViolation::new(field, "minlength", format!("min length is {min}"))
                    .with_value(value),
            );
        }
        if let Some(max) = rule.maxlength.filter(|max| len > *max) {
            return Some(
                FieldViolation::new(field, "maxlength", format!("max length is {max}"))
                    .with_value(value),
            );
        }
    }

    if let Some(allowed) = &rule.allowed {
        if !allowed.contains(value) {
            return Some(
                FieldViolation::new(field, "allowed", format!("unallowed value {value}"))
                    .with_value(value),
            );
        }
    }

    if let (Some(re), Some(s)) = (&compiled.regex, value.as_str()) {
        if !re.is_match(s) {
            let pattern = rule.regex.as_deref().unwrap_or_default();
            return Some(
                FieldViolation::new(
                    field,
                    "regex",
                    format!("value does not match regex '{pattern}'"),
                )
                .with_value(value),
            );
        }
    }

    None
}
