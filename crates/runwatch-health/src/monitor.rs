//! Run worker monitor: the background task that polls worker health.
//!
//! `start_monitor` spawns a single task that repeatedly polls every
//! watched deployment, commits the results to a [`StatusTable`], and
//! sleeps. Iterations never overlap. The sleep wakes early when the
//! monitor is stopped, so `stop_monitor` returns as soon as any in-flight
//! iteration has finished.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use runwatch_state::TenantSnapshot;

use crate::poll::get_run_worker_statuses;
use crate::session::SessionFactory;
use crate::table::StatusTable;

/// Handle to a running monitor. Dropping it without calling
/// [`MonitorHandle::stop`] also ends the loop at its next sleep.
pub struct MonitorHandle {
    table: StatusTable,
    /// Taken by the first `stop`.
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

/// Start polling `watched` deployments every `interval`.
///
/// The factory is moved into the background task; nothing is shared with
/// the caller except the returned handle's status table.
pub fn start_monitor<F, I>(factory: F, watched: I, interval: Duration) -> MonitorHandle
where
    F: SessionFactory,
    I: IntoIterator<Item = String>,
{
    let table = StatusTable::new(watched);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let loop_table = table.clone();
    let handle = tokio::spawn(async move {
        run_monitor_loop(Arc::new(factory), loop_table, interval, shutdown_rx).await;
    });

    info!(interval_ms = interval.as_millis() as u64, "run worker monitor started");

    MonitorHandle {
        table,
        task: Mutex::new(Some(handle)),
        shutdown_tx,
    }
}

/// Signal the monitor to stop and wait for its task to exit.
pub async fn stop_monitor(handle: &MonitorHandle) {
    handle.stop().await;
}

impl MonitorHandle {
    /// Signal the loop, then wait for it to finish. Later calls return
    /// immediately.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(task) = task else {
            return;
        };
        if let Err(e) = task.await {
            error!(error = %e, "run worker monitor task ended abnormally");
        }
        info!("run worker monitor stopped");
    }

    /// Whether the background task is still running.
    pub fn is_alive(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn table(&self) -> &StatusTable {
        &self.table
    }

    /// The committed snapshot for a deployment, exactly as polled.
    pub async fn read_snapshot(&self, deployment: &str) -> TenantSnapshot {
        self.table.read_snapshot(deployment).await
    }

    /// Copy of the whole table.
    pub async fn read_all(&self) -> BTreeMap<String, TenantSnapshot> {
        self.table.read_all().await
    }

    /// The committed snapshot with `monitoring_thread_alive` filled in
    /// for deployments whose launcher supports health checks.
    pub async fn report(&self, deployment: &str) -> TenantSnapshot {
        let snapshot = self.table.read_snapshot(deployment).await;
        self.with_liveness(snapshot)
    }

    /// `report` for every deployment in the table.
    pub async fn report_all(&self) -> BTreeMap<String, TenantSnapshot> {
        self.table
            .read_all()
            .await
            .into_iter()
            .map(|(name, snapshot)| (name, self.with_liveness(snapshot)))
            .collect()
    }

    pub async fn mutate_watch_set<A, R>(&self, add: A, remove: R)
    where
        A: IntoIterator<Item = String>,
        R: IntoIterator<Item = String>,
    {
        self.table.mutate_watch_set(add, remove).await;
    }

    fn with_liveness(&self, snapshot: TenantSnapshot) -> TenantSnapshot {
        if snapshot.monitoring_supported {
            let alive = self.is_alive();
            snapshot.with_thread_alive(Some(alive))
        } else {
            snapshot
        }
    }
}

/// The monitor loop: poll, commit, sleep, until shutdown.
async fn run_monitor_loop<F: SessionFactory>(
    factory: Arc<F>,
    table: StatusTable,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("run worker monitor loop starting");

    loop {
        if *shutdown.borrow() {
            break;
        }

        run_iteration(&factory, &table).await;

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown.changed() => {
                // The sender is gone: nobody can stop us any more.
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    debug!("run worker monitor loop shutting down");
}

/// One iteration. Never fails: a panic inside the poll is logged and the
/// table is left untouched for this cycle.
async fn run_iteration<F: SessionFactory>(factory: &Arc<F>, table: &StatusTable) {
    let deployments = table.watched().await;

    let poll = {
        let factory = Arc::clone(factory);
        let deployments = deployments.clone();
        tokio::spawn(async move { get_run_worker_statuses(factory.as_ref(), &deployments).await })
    };

    match poll.await {
        Ok(statuses) => {
            debug!(
                watched = deployments.len(),
                polled = statuses.len(),
                "run worker statuses collected"
            );
            table.commit(&deployments, statuses).await;
        }
        Err(e) => {
            error!(error = %e, "caught error in run worker monitoring iteration");
        }
    }
}
