//! Project source synchronization via the `git` CLI.
//!
//! A checkout counts as present only when `<checkout>/.git` exists. A
//! directory without it (e.g. left behind by an interrupted clone) is
//! removed and cloned again rather than pulled into.

use std::path::Path;
use std::time::Duration;

use runner_core::project_config::SourceLocation;

use crate::error::{PipelineError, Stage};
use crate::process::{run_command, CommandSpec};

/// Clones or fast-forwards project checkouts.
#[derive(Debug, Clone)]
pub struct GitSource {
    git_bin: String,
    timeout: Duration,
}

/// What [`GitSource::sync`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Cloned,
    Pulled,
}

impl GitSource {
    pub fn new(git_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            git_bin: git_bin.into(),
            timeout,
        }
    }

    /// Bring `checkout` up to date with `source`.
    ///
    /// Callers must hold the project's checkout lock.
    pub async fn sync(
        &self,
        project: &str,
        source: &SourceLocation,
        checkout: &Path,
    ) -> Result<SyncAction, PipelineError> {
        if checkout.join(".git").exists() {
            self.pull(project, source, checkout).await?;
            return Ok(SyncAction::Pulled);
        }

        if checkout.exists() {
            tracing::warn!(
                project,
                checkout = %checkout.display(),
                "Removing incomplete checkout before clone",
            );
            tokio::fs::remove_dir_all(checkout)
                .await
                .map_err(|e| sync_error(project, format!("cannot remove {}: {e}", checkout.display())))?;
        }
        if let Some(parent) = checkout.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| sync_error(project, format!("cannot create {}: {e}", parent.display())))?;
        }

        self.clone_into(project, source, checkout).await?;
        Ok(SyncAction::Cloned)
    }

    async fn clone_into(
        &self,
        project: &str,
        source: &SourceLocation,
        checkout: &Path,
    ) -> Result<(), PipelineError> {
        let mut spec = CommandSpec::new(&self.git_bin, self.timeout).arg("clone");
        if let Some(branch) = &source.branch {
            spec = spec.args(["--branch", branch.as_str()]);
        }
        let spec = spec
            .arg(source.url.as_str())
            .arg(checkout.to_string_lossy());

        tracing::info!(project, url = %source.url, "Cloning project source");
        self.run(project, &spec).await
    }

    async fn pull(
        &self,
        project: &str,
        source: &SourceLocation,
        checkout: &Path,
    ) -> Result<(), PipelineError> {
        let mut spec = CommandSpec::new(&self.git_bin, self.timeout)
            .arg("-C")
            .arg(checkout.to_string_lossy())
            .args(["pull", "--ff-only"]);
        if let Some(branch) = &source.branch {
            spec = spec.args(["origin", branch.as_str()]);
        }

        tracing::debug!(project, "Pulling project source");
        self.run(project, &spec).await
    }

    async fn run(&self, project: &str, spec: &CommandSpec) -> Result<(), PipelineError> {
        let output = run_command(spec, Stage::SourceSync).await?;
        if output.success() {
            Ok(())
        } else {
            Err(sync_error(
                project,
                format!(
                    "`{}` exited with code {}: {}",
                    spec.display(),
                    output.exit_code,
                    output.stderr.trim()
                ),
            ))
        }
    }
}

fn sync_error(project: &str, message: String) -> PipelineError {
    PipelineError::SourceSync {
        project: project.to_string(),
        message,
    }
}
