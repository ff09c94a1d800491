//! [`PipelineExecutor`] that runs Kedro projects from git checkouts.
//!
//! For each job:
//! 1. Take the project's checkout lock.
//! 2. Clone or pull `<checkout_root>/<project>`.
//! 3. Run `kedro run [--pipeline P] [--env E] --params=...` inside it.
//! 4. Release the lock.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{PipelineError, Stage};
use crate::executor::{PipelineExecutor, PipelineOutput, PipelineRequest};
use crate::locks::CheckoutLocks;
use crate::params::to_kedro_params;
use crate::process::{run_command, CommandSpec};
use crate::source::GitSource;

/// Settings for [`KedroExecutor`].
#[derive(Debug, Clone)]
pub struct KedroConfig {
    /// Directory holding one checkout per project.
    pub checkout_root: PathBuf,
    pub git_bin: String,
    pub kedro_bin: String,
    pub sync_timeout: Duration,
    /// Run timeout for projects without their own `timeout_secs`.
    pub run_timeout: Duration,
}

pub struct KedroExecutor {
    config: KedroConfig,
    source: GitSource,
    locks: CheckoutLocks,
}

impl KedroExecutor {
    pub fn new(config: KedroConfig) -> Self {
        let source = GitSource::new(config.git_bin.clone(), config.sync_timeout);
        Self {
            config,
            source,
            locks: CheckoutLocks::new(),
        }
    }

    /// Local checkout directory for `project`.
    pub fn checkout_dir(&self, project: &str) -> PathBuf {
        self.config.checkout_root.join(project)
    }

    fn run_command_for(&self, request: &PipelineRequest, checkout: &Path) -> Result<CommandSpec, PipelineError> {
        let project = &request.project;
        let mut spec = CommandSpec::new(
            &self.config.kedro_bin,
            project.timeout.unwrap_or(self.config.run_timeout),
        )
        .arg("run")
        .current_dir(checkout)
        .env("RUNNER_JOB_ID", request.job_id.to_string());

        if let Some(pipeline) = &project.pipeline {
            spec = spec.arg(format!("--pipeline={pipeline}"));
        }
        if let Some(env) = &project.env {
            spec = spec.arg(format!("--env={env}"));
        }
        let params = to_kedro_params(&request.params)?;
        if !params.is_empty() {
            spec = spec.arg(format!("--params={params}"));
        }
        Ok(spec)
    }
}

#[async_trait]
impl PipelineExecutor for KedroExecutor {
    async fn execute(&self, request: &PipelineRequest) -> Result<PipelineOutput, PipelineError> {
        let name = request.project.name.as_str();
        let checkout = self.checkout_dir(name);

        // Fail fast on params before waiting for the checkout.
        let spec = self.run_command_for(request, &checkout)?;

        let _guard = self.locks.acquire(name).await;

        let action = self
            .source
            .sync(name, &request.project.source, &checkout)
            .await?;
        tracing::debug!(job_id = request.job_id, project = name, ?action, "Project source synced");

        tracing::info!(
            job_id = request.job_id,
            project = name,
            command = %spec.display(),
            "Running pipeline",
        );
        let output = run_command(&spec, Stage::Run).await?;

        if !output.success() {
            return Err(PipelineError::Execution {
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        Ok(PipelineOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            duration_ms: output.duration_ms,
        })
    }
}
