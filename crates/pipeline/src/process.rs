//! Child process execution shared by source sync and pipeline runs.
//!
//! [`run_command`] spawns a program directly (never through a shell),
//! captures stdout/stderr concurrently and enforces a wall-clock timeout.
//! A non-zero exit is *not* an error here; callers decide what it means.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::error::{PipelineError, Stage};

/// Maximum stdout or stderr size captured per stream (10 MiB).
///
/// Output exceeding this limit is truncated.
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// A fully described command invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory for the child (current dir if `None`).
    pub working_directory: Option<PathBuf>,
    pub env_vars: Vec<(String, String)>,
    /// Maximum wall-clock time before the process is killed.
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_directory: None,
            env_vars: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// `program arg1 arg2 ...`, for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a completed process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Spawn `spec`, capture its output and wait for it within `spec.timeout`.
///
/// The deadline covers both the child's exit and the end of its output, so
/// a background process still holding a pipe cannot stall the caller. On
/// unix the child leads its own process group, and the whole group is
/// killed once the command returns.
///
/// `stage` only labels errors.
pub async fn run_command(spec: &CommandSpec, stage: Stage) -> Result<ProcessOutput, PipelineError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    for (key, value) in &spec.env_vars {
        cmd.env(key, value);
    }
    if let Some(dir) = &spec.working_directory {
        cmd.current_dir(dir);
    }

    let spawn_error = |source: std::io::Error| PipelineError::Spawn {
        stage,
        program: spec.program.clone(),
        source,
    };

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(spawn_error)?;
    let group = ProcessGroup(child.id());

    // Read both streams in their own tasks so a chatty child never blocks
    // on a full pipe while we wait on it.
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();
    let mut stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
    let mut stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

    let finished = tokio::time::timeout(spec.timeout, async {
        let status = child.wait().await?;
        let stdout_bytes = (&mut stdout_task).await.unwrap_or_default();
        let stderr_bytes = (&mut stderr_task).await.unwrap_or_default();
        Ok::<_, std::io::Error>((status, stdout_bytes, stderr_bytes))
    })
    .await;

    match finished {
        Ok(Ok((status, stdout_bytes, stderr_bytes))) => Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            exit_code: status.code().unwrap_or(-1),
            duration_ms: start.elapsed().as_millis() as u64,
        }),
        Ok(Err(e)) => Err(spawn_error(e)),
        Err(_elapsed) => {
            // `group` is killed and `child` reaped by kill_on_drop on return.
            stdout_task.abort();
            stderr_task.abort();
            Err(PipelineError::Timeout {
                stage,
                elapsed_ms: start.elapsed().as_millis() as u64,
            })
        }
    }
}

/// Kills every process left in a child's process group when dropped.
struct ProcessGroup(Option<u32>);

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if let Some(pgid) = self.0 {
            kill_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    // Safety: killpg only sends a signal. A group that has already exited
    // yields ESRCH, which is ignored.
    unsafe {
        libc::killpg(pgid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

/// Read an entire output stream, keeping at most [`MAX_OUTPUT_BYTES`].
///
/// Anything past the cap is drained and discarded so the child never
/// blocks on a full pipe.
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h).take(MAX_OUTPUT_BYTES as u64).read_to_end(&mut buf).await;
        let _ = tokio::io::copy(&mut h, &mut tokio::io::sink()).await;
    }
    buf
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", Duration::from_secs(5)).args(["-c", script])
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let output = run_command(&sh("echo out; echo err >&2"), Stage::Run)
            .await
            .expect("run");
        assert!(output.success());
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_raised() {
        let output = run_command(&sh("exit 42"), Stage::Run).await.expect("run");
        assert_eq!(output.exit_code, 42);
        assert!(!output.success());
    }

    #[tokio::test]
    async fn env_and_working_directory_are_applied() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join("marker.txt"), "here").expect("write marker");
        let spec = sh("cat marker.txt; echo \" $GREETING\"")
            .current_dir(dir.path())
            .env("GREETING", "hello");
        let output = run_command(&spec, Stage::Run).await.expect("run");
        assert_eq!(output.stdout.trim(), "here hello");
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let spec = CommandSpec::new("sleep", Duration::from_millis(200)).arg("30");
        let result = run_command(&spec, Stage::SourceSync).await;
        assert!(matches!(
            result,
            Err(PipelineError::Timeout {
                stage: Stage::SourceSync,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn background_process_holding_stdout_does_not_extend_the_deadline() {
        let spec = CommandSpec::new("sh", Duration::from_millis(300)).args(["-c", "sleep 5 & echo started"]);
        let started = Instant::now();
        let result = run_command(&spec, Stage::Run).await;
        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
        assert!(matches!(result, Err(PipelineError::Timeout { stage: Stage::Run, .. })));
    }

    #[tokio::test]
    async fn timeout_kills_the_whole_process_group() {
        let dir = tempfile::tempdir().expect("temp dir");
        let spec = CommandSpec::new("sh", Duration::from_millis(200))
            .args(["-c", "(sleep 1; touch alive) & sleep 30"])
            .current_dir(dir.path());
        let result = run_command(&spec, Stage::Run).await;
        assert!(matches!(result, Err(PipelineError::Timeout { .. })));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("alive").exists(), "grandchild outlived the timeout");
    }

    #[tokio::test]
    async fn leftover_background_process_is_killed_after_exit() {
        let dir = tempfile::tempdir().expect("temp dir");
        let spec = sh("(sleep 1; touch alive) >/dev/null 2>&1 & echo done").current_dir(dir.path());
        let output = run_command(&spec, Stage::Run).await.expect("run");
        assert_eq!(output.stdout, "done\n");

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("alive").exists(), "background process outlived the run");
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let spec = CommandSpec::new("definitely-not-a-real-binary-4821", Duration::from_secs(1));
        let result = run_command(&spec, Stage::Run).await;
        assert!(matches!(result, Err(PipelineError::Spawn { stage: Stage::Run, .. })));
    }

    #[test]
    fn display_joins_program_and_args() {
        let spec = CommandSpec::new("kedro", Duration::from_secs(1)).args(["run", "--params=x=1"]);
        assert_eq!(spec.display(), "kedro run --params=x=1");
    }
}
