//! Pipeline project configuration.
//!
//! Projects are declared in a YAML file keyed by project name:
//!
//! ```yaml
//! sales_forecast:
//!   url: https://git.example.com/data/sales-forecast.git
//!   branch: main            # optional
//!   pipeline: forecast      # optional, default pipeline when absent
//!   env: prod               # optional kedro environment
//!   timeout_secs: 1800      # optional, overrides RUN_TIMEOUT_SECS
//!   allow_unknown: false    # optional, reject undeclared params
//!   schema:
//!     horizon: { type: integer, required: true, min: 1 }
//! ```
//!
//! The file is read once at startup into a [`ProjectRegistry`].

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::validation::{AcceptAll, ParamValidator, Schema, SchemaValidator};

/// One project entry as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Git URL (or local path) of the project source.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub allow_unknown: bool,
    #[serde(default)]
    pub schema: Schema,
}

/// Where a project's source lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub url: String,
    pub branch: Option<String>,
}

/// A resolved project: source location, run options and its validator.
pub struct Project {
    pub name: String,
    pub source: SourceLocation,
    pub pipeline: Option<String>,
    pub env: Option<String>,
    /// Per-project run timeout; `None` means the executor default.
    pub timeout: Option<Duration>,
    pub validator: Box<dyn ParamValidator>,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("pipeline", &self.pipeline)
            .field("env", &self.env)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Project {
    /// Build a project from its configuration entry, compiling its schema.
    pub fn from_config(name: &str, config: &ProjectConfig) -> Result<Self, CoreError> {
        validate_project_name(name)?;
        if config.url.trim().is_empty() {
            return Err(CoreError::Config(format!(
                "project '{name}' has an empty url"
            )));
        }
        // Nothing declared and nothing refused: skip schema evaluation.
        let validator: Box<dyn ParamValidator> = if config.schema.is_empty() && config.allow_unknown {
            Box::new(AcceptAll)
        } else {
            Box::new(SchemaValidator::new(&config.schema, config.allow_unknown)?)
        };
        Ok(Self {
            name: name.to_string(),
            source: SourceLocation {
                url: config.url.clone(),
                branch: config.branch.clone(),
            },
            pipeline: config.pipeline.clone(),
            env: config.env.clone(),
            timeout: config.timeout_secs.map(Duration::from_secs),
            validator,
        })
    }
}

/// Project names become checkout directory names, so keep them path-safe.
pub fn validate_project_name(name: &str) -> Result<(), CoreError> {
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if ok {
        Ok(())
    } else {
        Err(CoreError::Config(format!(
            "invalid project name '{name}': use letters, digits, '-', '_' or '.'"
        )))
    }
}

/// Lookup table from project name to [`Project`].
#[derive(Debug, Default)]
pub struct ProjectRegistry {
    projects: HashMap<String, Arc<Project>>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML document of `name -> ProjectConfig`.
    pub fn from_yaml(yaml: &str) -> Result<Self, CoreError> {
        let configs: BTreeMap<String, ProjectConfig> = serde_yaml::from_str(yaml)
            .map_err(|e| CoreError::Config(format!("invalid project configuration: {e}")))?;
        Self::from_configs(&configs)
    }

    /// Read and parse the project configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_configs(configs: &BTreeMap<String, ProjectConfig>) -> Result<Self, CoreError> {
        let mut registry = Self::new();
        for (name, config) in configs {
            registry.insert(Project::from_config(name, config)?);
        }
        Ok(registry)
    }

    /// Register (or replace) a project.
    pub fn insert(&mut self, project: Project) {
        self.projects.insert(project.name.clone(), Arc::new(project));
    }

    /// Resolve a project by name.
    pub fn get(&self, name: &str) -> Result<Arc<Project>, CoreError> {
        self.projects
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::ProjectNotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.projects.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
