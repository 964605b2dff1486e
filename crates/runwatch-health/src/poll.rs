//! One poll over a set of deployments.
//!
//! Deployments are polled one after another. A deployment whose session
//! cannot be opened or whose runs cannot be listed is left out of the
//! result, which tells the caller to keep its previous snapshot. A failed
//! health check only affects its own run, which is reported `Unknown`.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use runwatch_state::{ErrorInfo, RunWorkerStatus, TenantSnapshot, WorkerStatus};

use crate::error::BackendResult;
use crate::session::{Session, SessionFactory};

/// Poll every deployment in `deployments` and collect fresh snapshots.
pub async fn get_run_worker_statuses<F: SessionFactory>(
    factory: &F,
    deployments: &BTreeSet<String>,
) -> BTreeMap<String, TenantSnapshot> {
    let mut statuses = BTreeMap::new();

    for deployment in deployments {
        match poll_deployment(factory, deployment).await {
            Ok(snapshot) => {
                debug!(
                    %deployment,
                    supported = snapshot.monitoring_supported,
                    runs = snapshot.statuses.len(),
                    "deployment polled"
                );
                statuses.insert(deployment.clone(), snapshot);
            }
            Err(e) => {
                warn!(
                    %deployment,
                    error = %ErrorInfo::from_error(&e),
                    "could not poll deployment, keeping previous statuses"
                );
            }
        }
    }

    statuses
}

async fn poll_deployment<F: SessionFactory>(
    factory: &F,
    deployment: &str,
) -> BackendResult<TenantSnapshot> {
    let session = factory.open_session(deployment).await?;

    if !session.supports_health_checks() {
        return Ok(TenantSnapshot::unsupported());
    }

    let runs = session.list_in_progress_runs().await?;
    let mut statuses = Vec::with_capacity(runs.len());
    for run in &runs {
        let status = match session.check_worker_health(run).await {
            Ok(result) => RunWorkerStatus::from_check_result(run.run_id.clone(), result),
            Err(e) => {
                debug!(%deployment, run_id = %run.run_id, error = %e, "worker health check failed");
                RunWorkerStatus::new(
                    run.run_id.clone(),
                    WorkerStatus::Unknown,
                    Some(ErrorInfo::from_error(&e).to_string()),
                )
            }
        };
        statuses.push(status);
    }

    Ok(TenantSnapshot::supported(statuses))
}
