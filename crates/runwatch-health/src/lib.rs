//! runwatch-health: run worker health monitoring.
//!
//! A single background task polls every watched deployment on a fixed
//! interval. Each poll opens a session for the deployment, lists its
//! in-progress runs, and asks the deployment's launcher whether each
//! run's worker is still alive. Results land in a shared [`StatusTable`]
//! that readers copy from without ever waiting on the network.
//!
//! # Architecture
//!
//! ```text
//! MonitorHandle
//!   ├── StatusTable (watch set + latest TenantSnapshot per deployment)
//!   └── Background task
//!       ├── get_run_worker_statuses()
//!       │   └── SessionFactory::open_session() → Session
//!       │       ├── list_in_progress_runs()  (RunStore)
//!       │       └── check_worker_health()    (RunLauncher: k8s | http)
//!       └── StatusTable::commit()
//! ```
//!
//! # Failure handling
//!
//! A deployment that cannot be polled keeps its previous snapshot. A
//! failed health check marks only that run `UNKNOWN`. A panic inside an
//! iteration is logged and the loop carries on at the next interval.

pub mod checker;
pub mod error;
pub mod monitor;
pub mod poll;
pub mod probe;
pub mod session;
pub mod table;

#[cfg(test)]
mod testing;

pub use checker::{HealthCheckable, HttpLauncher, JobStatus, K8sLauncher, RunLauncher};
pub use error::{BackendError, BackendResult};
pub use monitor::{MonitorHandle, start_monitor, stop_monitor};
pub use poll::get_run_worker_statuses;
pub use session::{Session, SessionFactory, StoreSession, StoreSessionFactory};
pub use table::StatusTable;
