//! Integration tests for `KedroExecutor` using stand-in `git` and `kedro`
//! scripts written into a temporary directory.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use runner_core::project_config::{Project, ProjectConfig};
use runner_core::types::Params;
use runner_pipeline::{KedroConfig, KedroExecutor, PipelineError, PipelineExecutor, PipelineRequest, Stage};
use serde_json::json;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Git stand-in: `clone` creates `<dest>/.git`, `-C <dir> pull` requires it.
const FAKE_GIT: &str = r#"
echo "git $*" >> "__LOG__"
case "$1" in
  clone)
    for last; do :; done
    mkdir -p "$last/.git"
    ;;
  -C)
    [ -d "$2/.git" ] || { echo "not a git repository" >&2; exit 128; }
    ;;
esac
exit 0
"#;

const FAILING_GIT: &str = r#"
echo "fatal: repository not found" >&2
exit 128
"#;

/// Kedro stand-in: echoes its arguments and flags overlapping runs.
const FAKE_KEDRO: &str = r#"
echo "kedro $*" >> "__LOG__"
if [ -e .busy ]; then echo "overlap" >> "__LOG__"; fi
touch .busy
sleep 0.1
rm -f .busy
echo "args=$*"
echo "job=$RUNNER_JOB_ID"
echo "warming up" >&2
"#;

const FAILING_KEDRO: &str = r#"
echo "partial output"
echo "ValueError: horizon must be positive" >&2
exit 3
"#;

struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("temp dir"),
        }
    }

    fn log_path(&self) -> PathBuf {
        self.dir.path().join("calls.log")
    }

    fn log(&self) -> String {
        std::fs::read_to_string(self.log_path()).unwrap_or_default()
    }

    fn script(&self, name: &str, body: &str) -> String {
        let path = self.dir.path().join(name);
        let body = body.replace("__LOG__", &self.log_path().to_string_lossy());
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod script");
        path.to_string_lossy().into_owned()
    }

    fn checkout_root(&self) -> PathBuf {
        self.dir.path().join("checkouts")
    }

    fn executor(&self, git: &str, kedro: &str) -> KedroExecutor {
        KedroExecutor::new(KedroConfig {
            checkout_root: self.checkout_root(),
            git_bin: self.script("git", git),
            kedro_bin: self.script("kedro", kedro),
            sync_timeout: Duration::from_secs(10),
            run_timeout: Duration::from_secs(10),
        })
    }
}

fn project(name: &str, pipeline: Option<&str>) -> Arc<Project> {
    let config = ProjectConfig {
        url: format!("https://git.example.com/{name}.git"),
        branch: None,
        pipeline: pipeline.map(str::to_string),
        env: None,
        timeout_secs: None,
        allow_unknown: true,
        schema: Default::default(),
    };
    Arc::new(Project::from_config(name, &config).expect("project"))
}

fn request(job_id: i64, project: Arc<Project>, params: serde_json::Value) -> PipelineRequest {
    let params: Params = params.as_object().cloned().expect("object");
    PipelineRequest {
        job_id,
        project,
        params,
    }
}

fn count(haystack: &str, needle: &str) -> usize {
    haystack.lines().filter(|l| l.starts_with(needle)).count()
}

fn has_git_dir(path: &Path) -> bool {
    path.join(".git").is_dir()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_run_clones_then_later_runs_pull() {
    let sandbox = Sandbox::new();
    let executor = sandbox.executor(FAKE_GIT, FAKE_KEDRO);
    let beta = project("beta", Some("forecast"));

    let output = executor
        .execute(&request(7, Arc::clone(&beta), json!({"x": 1, "mode": "full"})))
        .await
        .expect("first run");
    assert!(output.stdout.contains("args=run --pipeline=forecast --params=mode=full,x=1"));
    assert!(output.stdout.contains("job=7"));
    assert_eq!(output.stderr.trim(), "warming up");
    assert!(has_git_dir(&executor.checkout_dir("beta")));

    executor
        .execute(&request(8, beta, json!({})))
        .await
        .expect("second run");

    let log = sandbox.log();
    assert_eq!(count(&log, "git clone"), 1);
    assert_eq!(count(&log, "git -C"), 1);
    assert!(log.contains("pull --ff-only"));
    assert!(log.lines().any(|l| l == "kedro run --pipeline=forecast"));
}

#[tokio::test]
async fn incomplete_checkout_is_recloned() {
    let sandbox = Sandbox::new();
    let executor = sandbox.executor(FAKE_GIT, FAKE_KEDRO);
    let leftover = executor.checkout_dir("beta");
    std::fs::create_dir_all(&leftover).expect("mkdir");
    std::fs::write(leftover.join("half-written.py"), "x").expect("write");

    executor
        .execute(&request(1, project("beta", None), json!({})))
        .await
        .expect("run");

    assert_eq!(count(&sandbox.log(), "git clone"), 1);
    assert!(!leftover.join("half-written.py").exists());
    assert!(has_git_dir(&leftover));
}

#[tokio::test]
async fn nonzero_exit_is_execution_failure_with_stderr() {
    let sandbox = Sandbox::new();
    let executor = sandbox.executor(FAKE_GIT, FAILING_KEDRO);

    let err = executor
        .execute(&request(1, project("beta", None), json!({})))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Run);
    match err {
        PipelineError::Execution {
            exit_code,
            stdout,
            stderr,
        } => {
            assert_eq!(exit_code, 3);
            assert_eq!(stdout.trim(), "partial output");
            assert!(stderr.contains("horizon must be positive"));
        }
        other => panic!("expected execution failure, got {other:?}"),
    }
}

#[tokio::test]
async fn sync_failure_is_reported_and_pipeline_not_run() {
    let sandbox = Sandbox::new();
    let executor = sandbox.executor(FAILING_GIT, FAKE_KEDRO);

    let err = executor
        .execute(&request(1, project("beta", None), json!({})))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::SourceSync);
    assert!(err.to_string().contains("repository not found"));
    assert_eq!(count(&sandbox.log(), "kedro"), 0);
}

#[tokio::test]
async fn unrepresentable_params_fail_before_sync() {
    let sandbox = Sandbox::new();
    let executor = sandbox.executor(FAKE_GIT, FAKE_KEDRO);

    let err = executor
        .execute(&request(1, project("beta", None), json!({"tags": ["a", "b"]})))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Params);
    assert!(sandbox.log().is_empty());
}

#[tokio::test]
async fn run_timeout_kills_pipeline() {
    let sandbox = Sandbox::new();
    let executor = KedroExecutor::new(KedroConfig {
        checkout_root: sandbox.checkout_root(),
        git_bin: sandbox.script("git", FAKE_GIT),
        kedro_bin: sandbox.script("kedro", "sleep 30\n"),
        sync_timeout: Duration::from_secs(10),
        run_timeout: Duration::from_millis(300),
    });

    let err = executor
        .execute(&request(1, project("beta", None), json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Timeout { stage: Stage::Run, .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_project_runs_never_overlap_on_the_checkout() {
    let sandbox = Sandbox::new();
    let executor = Arc::new(sandbox.executor(FAKE_GIT, FAKE_KEDRO));
    let beta = project("beta", None);

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let executor = Arc::clone(&executor);
            let beta = Arc::clone(&beta);
            tokio::spawn(async move { executor.execute(&request(i, beta, json!({}))).await })
        })
        .collect();

    for task in tasks {
        task.await.expect("join").expect("run");
    }

    let log = sandbox.log();
    assert_eq!(count(&log, "kedro run"), 4);
    assert_eq!(count(&log, "git clone"), 1);
    assert_eq!(count(&log, "git -C"), 3);
    assert!(!log.contains("overlap"), "runs overlapped:\n{log}");
}
