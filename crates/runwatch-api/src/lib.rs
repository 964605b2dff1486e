//! runwatch-api: REST API for runwatch.
//!
//! Read access to the run worker monitor's status table, control of its
//! watch set, and write access to the run records it polls. Code servers
//! report liveness through the heartbeat endpoint.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/run-workers` | Worker statuses for every polled deployment |
//! | GET | `/api/v1/deployments/{name}/run-workers` | Worker statuses for one deployment |
//! | GET | `/api/v1/watch` | List watched deployments |
//! | PUT | `/api/v1/watch/{name}` | Start watching a configured deployment |
//! | DELETE | `/api/v1/watch/{name}` | Stop watching a deployment |
//! | GET | `/api/v1/deployments/{name}/runs` | List run records |
//! | DELETE | `/api/v1/deployments/{name}/runs` | Delete all run records |
//! | GET | `/api/v1/deployments/{name}/runs/{run_id}` | Get a run record |
//! | PUT | `/api/v1/deployments/{name}/runs/{run_id}` | Record a run or its new status |
//! | DELETE | `/api/v1/deployments/{name}/runs/{run_id}` | Delete a run record |
//! | POST | `/api/v1/code-servers/heartbeat` | Report code server liveness |
//! | GET | `/api/v1/code-servers` | Latest heartbeat per code location |

pub mod code_server_handlers;
pub mod handlers;

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use runwatch_health::MonitorHandle;
use runwatch_state::RunStore;

use crate::code_server_handlers::HeartbeatStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub monitor: Arc<MonitorHandle>,
    pub store: RunStore,
    pub heartbeats: HeartbeatStore,
    /// Deployments with a launcher; only these may join the watch set.
    pub configured: Arc<BTreeSet<String>>,
}

impl ApiState {
    pub fn new(
        monitor: Arc<MonitorHandle>,
        store: RunStore,
        configured: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            monitor,
            store,
            heartbeats: HeartbeatStore::default(),
            configured: Arc::new(configured.into_iter().collect()),
        }
    }
}

/// Build the complete API router.
pub fn build_router(
    monitor: Arc<MonitorHandle>,
    store: RunStore,
    configured: impl IntoIterator<Item = String>,
) -> Router {
    let state = ApiState::new(monitor, store, configured);

    let api_routes = Router::new()
        .route("/run-workers", get(handlers::list_run_workers))
        .route("/deployments/{name}/run-workers", get(handlers::get_run_workers))
        .route("/watch", get(handlers::list_watched))
        .route(
            "/watch/{name}",
            put(handlers::watch_deployment).delete(handlers::unwatch_deployment),
        )
        .route(
            "/deployments/{name}/runs",
            get(handlers::list_runs).delete(handlers::delete_runs),
        )
        .route(
            "/deployments/{name}/runs/{run_id}",
            get(handlers::get_run)
                .put(handlers::put_run)
                .delete(handlers::delete_run),
        )
        .route(
            "/code-servers/heartbeat",
            post(code_server_handlers::record_heartbeat),
        )
        .route("/code-servers", get(code_server_handlers::list_heartbeats))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
