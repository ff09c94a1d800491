use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use runner_pipeline::KedroConfig;

/// A configuration variable that was set but could not be used.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a valid {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{var} must be at least 1")]
    Zero { var: &'static str },
}

/// Service configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Job Record Store location (default: `sqlite:requests.db`).
    pub database_url: String,
    /// Pipeline project configuration file (default: `kedro_projects.yaml`).
    pub projects_config: PathBuf,
    /// Admission queue capacity (default: `1000`).
    pub queue_capacity: usize,
    /// Longest an enqueue waits for space, in milliseconds (default: `1000`).
    pub enqueue_timeout_ms: u64,
    /// Fixed worker pool size (default: `1`).
    pub worker_count: usize,
    /// Directory holding project checkouts (default: `<tmp>/pipeline-runner`).
    pub checkout_root: PathBuf,
    pub git_bin: String,
    pub kedro_bin: String,
    /// Source sync timeout in seconds (default: `300`).
    pub sync_timeout_secs: u64,
    /// Pipeline run timeout in seconds (default: `3600`).
    pub run_timeout_secs: u64,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Grace period for running jobs on shutdown, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            database_url: "sqlite:requests.db".into(),
            projects_config: PathBuf::from("kedro_projects.yaml"),
            queue_capacity: 1000,
            enqueue_timeout_ms: 1000,
            worker_count: 1,
            checkout_root: std::env::temp_dir().join("pipeline-runner"),
            git_bin: "git".into(),
            kedro_bin: "kedro".into(),
            sync_timeout_secs: 300,
            run_timeout_secs: 3600,
            request_timeout_secs: 30,
            shutdown_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                  |
    /// |-------------------------|--------------------------|
    /// | `HOST`                  | `0.0.0.0`                |
    /// | `PORT`                  | `8000`                   |
    /// | `DATABASE_URL`          | `sqlite:requests.db`     |
    /// | `PROJECTS_CONFIG`       | `kedro_projects.yaml`    |
    /// | `QUEUE_CAPACITY`        | `1000`                   |
    /// | `ENQUEUE_TIMEOUT_MS`    | `1000`                   |
    /// | `WORKER_COUNT`          | `1`                      |
    /// | `CHECKOUT_ROOT`         | `<tmp>/pipeline-runner`  |
    /// | `GIT_BIN`               | `git`                    |
    /// | `KEDRO_BIN`             | `kedro`                  |
    /// | `SYNC_TIMEOUT_SECS`     | `300`                    |
    /// | `RUN_TIMEOUT_SECS`      | `3600`                   |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                     |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let string = |var: &str, default: String| lookup(var).unwrap_or(default);

        let config = Self {
            host: string("HOST", defaults.host),
            port: parse(&lookup, "PORT", "u16", defaults.port)?,
            database_url: string("DATABASE_URL", defaults.database_url),
            projects_config: lookup("PROJECTS_CONFIG")
                .map(PathBuf::from)
                .unwrap_or(defaults.projects_config),
            queue_capacity: parse(&lookup, "QUEUE_CAPACITY", "usize", defaults.queue_capacity)?,
            enqueue_timeout_ms: parse(
                &lookup,
                "ENQUEUE_TIMEOUT_MS",
                "u64",
                defaults.enqueue_timeout_ms,
            )?,
            worker_count: parse(&lookup, "WORKER_COUNT", "usize", defaults.worker_count)?,
            checkout_root: lookup("CHECKOUT_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.checkout_root),
            git_bin: string("GIT_BIN", defaults.git_bin),
            kedro_bin: string("KEDRO_BIN", defaults.kedro_bin),
            sync_timeout_secs: parse(&lookup, "SYNC_TIMEOUT_SECS", "u64", defaults.sync_timeout_secs)?,
            run_timeout_secs: parse(&lookup, "RUN_TIMEOUT_SECS", "u64", defaults.run_timeout_secs)?,
            request_timeout_secs: parse(
                &lookup,
                "REQUEST_TIMEOUT_SECS",
                "u64",
                defaults.request_timeout_secs,
            )?,
            shutdown_timeout_secs: parse(
                &lookup,
                "SHUTDOWN_TIMEOUT_SECS",
                "u64",
                defaults.shutdown_timeout_secs,
            )?,
        };

        if config.queue_capacity == 0 {
            return Err(ConfigError::Zero {
                var: "QUEUE_CAPACITY",
            });
        }
        if config.worker_count == 0 {
            return Err(ConfigError::Zero {
                var: "WORKER_COUNT",
            });
        }

        Ok(config)
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Settings for the Kedro pipeline executor.
    pub fn kedro_config(&self) -> KedroConfig {
        KedroConfig {
            checkout_root: self.checkout_root.clone(),
            git_bin: self.git_bin.clone(),
            kedro_bin: self.kedro_bin.clone(),
            sync_timeout: Duration::from_secs(self.sync_timeout_secs),
            run_timeout: Duration::from_secs(self.run_timeout_secs),
        }
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            expected,
            value: raw,
        }),
    }
}
