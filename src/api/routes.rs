//! HTTP routes: liveness endpoints and the task runner.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::Config;
use crate::runner::TaskRunner;

use super::types::{ErrorResponse, HealthResponse, RootResponse, RunRequest, RunResponse};

/// Shared handler state.
pub struct AppState {
    pub config: Arc<Config>,
    pub runner: Arc<dyn TaskRunner>,
    /// Bounds how many sessions (and bridge subprocesses) run at once.
    pub sessions: Arc<Semaphore>,
}

impl AppState {
    pub fn new(config: Arc<Config>, runner: Arc<dyn TaskRunner>) -> Self {
        let sessions = Arc::new(Semaphore::new(config.max_concurrent_sessions.max(1)));
        Self {
            config,
            runner,
            sessions,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/run", post(run))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET / - Static liveness message.
async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "MCP Notion app is live, use /health or /run to work".to_string(),
    })
}

/// GET /health - Liveness check; never touches the session machinery.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Notion MCP service is live".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// POST /run - Run a task to completion and return the transcript.
async fn run(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = match RunRequest::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return bad_request(format!("Invalid request body: {}", e)),
    };
    let Some(task) = request.task() else {
        return bad_request("Missing task");
    };

    let run_id = Uuid::new_v4();
    tracing::info!(%run_id, model = %state.config.default_model, "Got the task: {}", task);

    let _permit = match state.sessions.acquire().await {
        Ok(permit) => permit,
        Err(_) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(RunResponse::error("Server is shutting down")),
            )
                .into_response();
        }
    };

    let started = Instant::now();
    match state.runner.run_task(task).await {
        Ok(result) => {
            tracing::info!(
                %run_id,
                messages = result.messages.len(),
                stop_reason = %result.stop_reason,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Task finished"
            );
            (StatusCode::OK, Json(RunResponse::success(result))).into_response()
        }
        Err(e) => {
            tracing::error!(%run_id, kind = e.kind(), "Task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(RunResponse::error(e.to_string())),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentMessage;
    use crate::bridge::BridgeError;
    use crate::config::BridgeConfig;
    use crate::runner::RunError;
    use crate::team::{StopReason, TaskResult};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    enum Behavior {
        Emit(Vec<&'static str>),
        Fail,
        Slow,
    }

    struct FakeRunner {
        behavior: Behavior,
        calls: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeRunner {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TaskRunner for FakeRunner {
        async fn run_task(&self, _task: &str) -> Result<TaskResult, RunError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Emit(texts) => Ok(TaskResult {
                    messages: texts
                        .iter()
                        .map(|t| AgentMessage::text("notion_agent", *t))
                        .collect(),
                    stop_reason: StopReason::TextMention {
                        text: "TERMINATE".to_string(),
                    },
                }),
                Behavior::Fail => Err(RunError::Bridge(BridgeError::Spawn(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "npx: command not found",
                )))),
                Behavior::Slow => {
                    let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                    self.peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    self.active.fetch_sub(1, Ordering::SeqCst);
                    Ok(TaskResult {
                        messages: vec![AgentMessage::text("notion_agent", "TERMINATE")],
                        stop_reason: StopReason::TextMention {
                            text: "TERMINATE".to_string(),
                        },
                    })
                }
            }
        }
    }

    fn app_with(runner: Arc<FakeRunner>, max_sessions: usize) -> Router {
        let mut config = Config::new(
            "sk-test".to_string(),
            "gpt-4o".to_string(),
            BridgeConfig::notion("secret"),
        );
        config.max_concurrent_sessions = max_sessions;
        router(Arc::new(AppState::new(Arc::new(config), runner)))
    }

    fn post_run(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/run")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn run_without_task_is_bad_request() {
        let runner = FakeRunner::new(Behavior::Fail);
        let (status, body) = send(app_with(Arc::clone(&runner), 4), post_run("{}")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing task");
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_or_non_string_task_is_missing() {
        for payload in [r#"{"task": ""}"#, r#"{"task": 42}"#, r#"{"task": null}"#] {
            let (status, body) = send(app_with(FakeRunner::new(Behavior::Fail), 4), post_run(payload)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "payload {}", payload);
            assert_eq!(body["error"], "Missing task");
        }
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        for payload in ["not json", r#"["list my pages"]"#, "null", r#""task""#] {
            let runner = FakeRunner::new(Behavior::Emit(vec!["TERMINATE"]));
            let (status, body) = send(app_with(Arc::clone(&runner), 4), post_run(payload)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "payload {}", payload);
            assert!(body["error"]
                .as_str()
                .unwrap()
                .starts_with("Invalid request body"));
            assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn run_returns_joined_transcript() {
        let runner = FakeRunner::new(Behavior::Emit(vec!["a", "b", "TERMINATE"]));
        let (status, body) = send(
            app_with(runner, 4),
            post_run(r#"{"task": "List my Notion pages"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["result"], "a\n\n\nb\n\n\nTERMINATE");
        assert_eq!(body["stop_reason"], "Text 'TERMINATE' mentioned");
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn run_failure_is_internal_error() {
        let (status, body) = send(
            app_with(FakeRunner::new(Behavior::Fail), 4),
            post_run(r#"{"task": "Create a page"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        let result = body["result"].as_str().unwrap();
        assert!(!result.is_empty());
        assert!(result.contains("npx: command not found"));
        assert!(body.get("stop_reason").is_none());
    }

    #[tokio::test]
    async fn liveness_endpoints_ignore_the_runner() {
        let runner = FakeRunner::new(Behavior::Fail);

        let (status, body) = send(app_with(Arc::clone(&runner), 4), get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"message": "MCP Notion app is live, use /health or /run to work"})
        );

        let (status, body) = send(app_with(Arc::clone(&runner), 4), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_runs_respect_session_limit() {
        let runner = FakeRunner::new(Behavior::Slow);
        let app = app_with(Arc::clone(&runner), 1);

        let (first, second) = tokio::join!(
            send(app.clone(), post_run(r#"{"task": "one"}"#)),
            send(app.clone(), post_run(r#"{"task": "two"}"#)),
        );

        assert_eq!(first.0, StatusCode::OK);
        assert_eq!(second.0, StatusCode::OK);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(runner.peak.load(Ordering::SeqCst), 1);
    }
}
