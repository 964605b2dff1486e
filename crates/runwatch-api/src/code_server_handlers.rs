//! Code server heartbeats.
//!
//! Each code location's server posts its status periodically. Only the
//! latest heartbeat per location is kept, in memory.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use runwatch_state::{CodeServerHeartbeat, CodeServerStatus};

use crate::ApiState;
use crate::handlers::{ApiResponse, error_response};

/// Latest heartbeat per code location.
pub type HeartbeatStore = Arc<RwLock<BTreeMap<String, CodeServerHeartbeat>>>;

/// POST /api/v1/code-servers/heartbeat
pub async fn record_heartbeat(
    State(state): State<ApiState>,
    Json(heartbeat): Json<CodeServerHeartbeat>,
) -> impl IntoResponse {
    if heartbeat.location_name.trim().is_empty() {
        return error_response("location_name is empty", StatusCode::BAD_REQUEST).into_response();
    }

    if heartbeat.server_status == CodeServerStatus::Failed {
        match &heartbeat.error {
            Some(error) => warn!(location = %heartbeat.location_name, %error, "code server failed"),
            None => warn!(location = %heartbeat.location_name, "code server failed"),
        }
    } else {
        debug!(
            location = %heartbeat.location_name,
            status = ?heartbeat.server_status,
            "code server heartbeat"
        );
    }

    let mut heartbeats = state.heartbeats.write().await;
    heartbeats.insert(heartbeat.location_name.clone(), heartbeat.clone());
    (StatusCode::ACCEPTED, ApiResponse::ok(heartbeat)).into_response()
}

/// GET /api/v1/code-servers
pub async fn list_heartbeats(State(state): State<ApiState>) -> impl IntoResponse {
    let heartbeats = state.heartbeats.read().await;
    let latest: Vec<CodeServerHeartbeat> = heartbeats.values().cloned().collect();
    ApiResponse::ok(latest)
}
