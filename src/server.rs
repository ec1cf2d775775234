//! HTTP surface: workflow listing, execution, and resumption.
//!
//! `/execute` and `/resume` negotiate a mode: with `stream` (the default)
//! the response body is a long-lived server-sent-event stream of progress
//! frames; without it the drive runs to a terminal or a suspension and the
//! result returns as JSON.
//!
//! Pre-flight failures (unknown graph, invalid state, precondition
//! violations) map to 4xx/5xx before any frame is written; failures after
//! the drive has started surface as `workflow_error` frames or a
//! `status: "error"` body. Dropping a streaming connection does not cancel
//! the run — the drive task is detached and cancellation is only observed
//! through an explicit token.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::config::ServiceConfig;
use crate::event::{sse_frame, ChannelSink, EventBus, TracingSink, SSE_CONTENT_TYPE};
use crate::executor::{
    ExecutionConfig, ExecutionResult, Executor, ExecutorError, PreparedRun, RunStatus,
};
use crate::state::Trigger;

/// Shared state behind every handler.
pub struct ServiceState {
    pub executor: Arc<Executor>,
    pub config: ServiceConfig,
}

/// Build the service router.
pub fn router(state: Arc<ServiceState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/workflows", get(list_workflows))
        .route("/workflows/{name}", get(get_workflow))
        .route("/execute", post(execute_workflow))
        .route("/resume", post(resume_workflow))
        .with_state(state)
}

/// JSON error body with the status code it travels under.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.message }))).into_response()
    }
}

impl From<ExecutorError> for ApiError {
    fn from(err: ExecutorError) -> Self {
        use crate::registry::RegistryError;
        let status = match &err {
            ExecutorError::Registry(RegistryError::UnknownGraph { .. }) => StatusCode::NOT_FOUND,
            ExecutorError::Registry(RegistryError::LoadError { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ExecutorError::Validation(_) | ExecutorError::InvalidState { .. } => {
                StatusCode::BAD_REQUEST
            }
            ExecutorError::Conflict { .. } | ExecutorError::NotSuspended { .. } => {
                StatusCode::CONFLICT
            }
            ExecutorError::UnknownThread { .. } => StatusCode::NOT_FOUND,
            ExecutorError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

async fn health(State(state): State<Arc<ServiceState>>) -> Json<Value> {
    Json(json!({
        "service": "graphmill workflow service",
        "status": "healthy",
        "workflows": state.executor.registry().stats(),
    }))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    industry: Option<String>,
}

async fn list_workflows(
    State(state): State<Arc<ServiceState>>,
    Query(query): Query<ListQuery>,
) -> Json<Value> {
    let registry = state.executor.registry();
    let descriptors = registry.list(query.industry.as_deref(), None, None);
    let workflows: Map<String, Value> = descriptors
        .iter()
        .map(|d| (d.name.clone(), d.to_value()))
        .collect();
    Json(json!({
        "workflows": workflows,
        "total": descriptors.len(),
        "by_industry": registry.stats().by_industry,
    }))
}

async fn get_workflow(
    State(state): State<Arc<ServiceState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .executor
        .registry()
        .get(&name)
        .map(|descriptor| Json(descriptor.to_value()))
        .ok_or_else(|| ApiError::not_found(format!("Workflow '{name}' not found")))
}

fn default_stream() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExecuteRequest {
    graph_name: String,
    initial_state: Map<String, Value>,
    thread_id: Option<String>,
    #[serde(default = "default_stream")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResumeRequest {
    thread_id: String,
    decision: Value,
    #[serde(default = "default_stream")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct RunResponse {
    thread_id: String,
    status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_state: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interrupt_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<ExecutionResult> for RunResponse {
    fn from(result: ExecutionResult) -> Self {
        Self {
            thread_id: result.thread_id.clone(),
            status: result.status,
            final_state: Some(result.final_state.to_value()),
            interrupt_data: result
                .interrupt
                .as_ref()
                .and_then(|token| serde_json::to_value(token).ok()),
            error: result.error,
        }
    }
}

async fn execute_workflow(
    State(state): State<Arc<ServiceState>>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Response, ApiError> {
    let config = ExecutionConfig {
        thread_id: request.thread_id,
        recursion_limit: state.config.recursion_limit,
        trigger: Some(Trigger::Api),
        ..Default::default()
    };
    let prepared = state
        .executor
        .prepare(&request.graph_name, request.initial_state, config)?;
    Ok(drive(state, prepared, request.stream).await)
}

async fn resume_workflow(
    State(state): State<Arc<ServiceState>>,
    Json(request): Json<ResumeRequest>,
) -> Result<Response, ApiError> {
    let config = ExecutionConfig {
        recursion_limit: state.config.recursion_limit,
        trigger: Some(Trigger::Api),
        ..Default::default()
    };
    let prepared = state
        .executor
        .prepare_resume(&request.thread_id, request.decision, config)
        .await?;
    Ok(drive(state, prepared, request.stream).await)
}

/// Run a prepared drive in the requested mode.
async fn drive(state: Arc<ServiceState>, prepared: PreparedRun, stream: bool) -> Response {
    if stream {
        return stream_response(state, prepared);
    }
    let thread_id = prepared.thread_id().to_string();
    let deadline = std::time::Duration::from_secs(state.config.request_timeout_secs.max(1));
    let bus = EventBus::with_sink(TracingSink);
    match tokio::time::timeout(deadline, state.executor.run(prepared, &bus)).await {
        Ok(result) => Json(RunResponse::from(result)).into_response(),
        // The drive future is dropped on timeout; the thread can be
        // diagnosed through its checkpoint history and re-executed.
        Err(_) => Json(RunResponse {
            thread_id,
            status: RunStatus::Error,
            final_state: None,
            interrupt_data: None,
            error: Some("execution deadline exceeded".to_string()),
        })
        .into_response(),
    }
}

/// Detach the drive onto its own task and stream frames until it ends.
fn stream_response(state: Arc<ServiceState>, prepared: PreparedRun) -> Response {
    let (tx, rx) = flume::unbounded();
    let bus = EventBus::with_sink(ChannelSink::new(tx));
    let executor = Arc::clone(&state.executor);
    tokio::spawn(async move {
        // The bus (and with it the channel sender) drops when the drive
        // ends, which closes the response stream.
        let result = executor.run(prepared, &bus).await;
        tracing::debug!(
            thread = %result.thread_id,
            status = ?result.status,
            "streamed drive finished"
        );
    });

    let body = rx
        .into_stream()
        .map(|event| Ok::<_, Infallible>(Bytes::from(sse_frame(&event))));

    match Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, SSE_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(body))
    {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = %err, "failed to build streaming response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
