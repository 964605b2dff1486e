//! REST API handlers.
//!
//! Worker status handlers read from the monitor's status table and never
//! wait on a backend. Run handlers read and write the `RunStore`.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::info;

use runwatch_state::{RunStatus, StateError};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
pub(crate) struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn store_error(e: &StateError) -> axum::response::Response {
    let status = match e {
        StateError::InvalidKey(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status).into_response()
}

// ── Run workers ────────────────────────────────────────────────

/// GET /api/v1/run-workers
pub async fn list_run_workers(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.monitor.report_all().await)
}

/// GET /api/v1/deployments/{name}/run-workers
///
/// Deployments the monitor has never polled read as unsupported with no
/// statuses rather than 404.
pub async fn get_run_workers(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    ApiResponse::ok(state.monitor.report(&name).await)
}

// ── Watch set ──────────────────────────────────────────────────

/// GET /api/v1/watch
pub async fn list_watched(State(state): State<ApiState>) -> impl IntoResponse {
    let watched: Vec<String> = state.monitor.table().watched().await.into_iter().collect();
    ApiResponse::ok(watched)
}

/// PUT /api/v1/watch/{name}
///
/// Only deployments with a configured launcher can be watched; any other
/// name would fail to open a session on every poll.
pub async fn watch_deployment(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    if name.trim().is_empty() {
        return error_response("deployment name is empty", StatusCode::BAD_REQUEST).into_response();
    }
    if !state.configured.contains(&name) {
        return error_response("deployment not configured", StatusCode::NOT_FOUND).into_response();
    }
    state
        .monitor
        .mutate_watch_set([name.clone()], std::iter::empty())
        .await;
    info!(deployment = %name, "deployment watched");
    ApiResponse::ok(serde_json::json!({ "deployment": name, "watched": true })).into_response()
}

/// DELETE /api/v1/watch/{name}
pub async fn unwatch_deployment(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    if !state.monitor.table().watched().await.contains(&name) {
        return error_response("deployment not watched", StatusCode::NOT_FOUND).into_response();
    }
    state
        .monitor
        .mutate_watch_set(std::iter::empty(), [name.clone()])
        .await;
    info!(deployment = %name, "deployment unwatched");
    ApiResponse::ok(serde_json::json!({ "deployment": name, "watched": false })).into_response()
}

// ── Runs ───────────────────────────────────────────────────────

/// Body of a run upsert.
#[derive(serde::Serialize, serde::Deserialize)]
pub struct RunUpdate {
    pub status: RunStatus,
    #[serde(default)]
    pub worker_address: Option<String>,
}

/// GET /api/v1/deployments/{name}/runs
pub async fn list_runs(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.store.list_runs_for_deployment(&name) {
        Ok(runs) => ApiResponse::ok(runs).into_response(),
        Err(e) => store_error(&e),
    }
}

/// DELETE /api/v1/deployments/{name}/runs
pub async fn delete_runs(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_runs_for_deployment(&name) {
        Ok(deleted) => ApiResponse::ok(serde_json::json!({ "deleted": deleted })).into_response(),
        Err(e) => store_error(&e),
    }
}

/// GET /api/v1/deployments/{name}/runs/{run_id}
pub async fn get_run(
    State(state): State<ApiState>,
    Path((name, run_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.get_run(&name, &run_id) {
        Ok(Some(run)) => ApiResponse::ok(run).into_response(),
        Ok(None) => error_response("run not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => store_error(&e),
    }
}

/// PUT /api/v1/deployments/{name}/runs/{run_id}
pub async fn put_run(
    State(state): State<ApiState>,
    Path((name, run_id)): Path<(String, String)>,
    Json(update): Json<RunUpdate>,
) -> impl IntoResponse {
    match state
        .store
        .upsert_run(&name, &run_id, update.status, update.worker_address)
    {
        Ok(run) => ApiResponse::ok(run).into_response(),
        Err(e) => store_error(&e),
    }
}

/// DELETE /api/v1/deployments/{name}/runs/{run_id}
pub async fn delete_run(
    State(state): State<ApiState>,
    Path((name, run_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.delete_run(&name, &run_id) {
        Ok(true) => ApiResponse::ok("deleted").into_response(),
        Ok(false) => error_response("run not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => store_error(&e),
    }
}
