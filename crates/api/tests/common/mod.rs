#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use runner_core::project_config::ProjectRegistry;
use runner_pipeline::{PipelineError, PipelineExecutor, PipelineOutput, PipelineRequest};
use runner_worker::{AdmissionQueue, Dispatcher, WorkerPool, WorkerPoolConfig};
use sqlx::SqlitePool;
use tower::ServiceExt;

use runner_api::config::ServerConfig;
use runner_api::router::build_app_router;
use runner_api::state::AppState;

/// Projects known to every test app.
pub const TEST_PROJECTS: &str = r#"
beta:
  url: https://git.example.com/beta.git
  schema:
    x: { type: integer, required: true, min: 0 }
    label: { type: string, maxlength: 8 }
"#;

/// Executor that succeeds immediately, echoing the job id, unless the
/// request carries `label: fail`.
pub struct EchoExecutor;

#[async_trait]
impl PipelineExecutor for EchoExecutor {
    async fn execute(&self, request: &PipelineRequest) -> Result<PipelineOutput, PipelineError> {
        if request.params.get("label").and_then(|v| v.as_str()) == Some("fail") {
            return Err(PipelineError::Execution {
                exit_code: 1,
                stdout: String::new(),
                stderr: "pipeline exploded".into(),
            });
        }
        Ok(PipelineOutput {
            stdout: format!("job {} done", request.job_id),
            ..Default::default()
        })
    }
}

/// Build a test `ServerConfig` with small limits.
pub fn test_config(queue_capacity: usize) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        queue_capacity,
        enqueue_timeout_ms: 20,
        ..ServerConfig::default()
    }
}

pub struct TestApp {
    pub router: Router,
    pub queue: Arc<AdmissionQueue>,
    pub workers: Option<WorkerPool>,
}

/// Build the full application router. When `with_workers` is false, jobs
/// stay queued so admission behaviour can be observed in isolation.
pub fn build_test_app(pool: SqlitePool, queue_capacity: usize, with_workers: bool) -> TestApp {
    let config = test_config(queue_capacity);
    let registry = Arc::new(ProjectRegistry::from_yaml(TEST_PROJECTS).unwrap());
    let queue = Arc::new(AdmissionQueue::new(
        config.queue_capacity,
        config.enqueue_timeout(),
    ));

    let workers = with_workers.then(|| {
        WorkerPool::start(
            WorkerPoolConfig { worker_count: 2 },
            Arc::clone(&queue),
            pool.clone(),
            Arc::clone(&registry),
            Arc::new(EchoExecutor),
        )
    });

    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config),
        dispatcher: Arc::new(Dispatcher::new(pool, registry, Arc::clone(&queue))),
        queue: Arc::clone(&queue),
    };

    TestApp {
        router: build_app_router(state),
        queue,
        workers,
    }
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    app.clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll `GET /api/v1/jobs/{id}` until the job leaves `queued`/`running`.
pub async fn wait_for_terminal(app: &Router, job_id: i64) -> serde_json::Value {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let response = get(app, &format!("/api/v1/jobs/{job_id}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let job = body_json(response).await["data"].clone();
        if !matches!(job["status"].as_str(), Some("queued") | Some("running")) {
            return job;
        }
        assert!(tokio::time::Instant::now() < deadline, "job {job_id} never finished");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}
