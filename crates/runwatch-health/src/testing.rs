//! In-memory sessions for exercising the poll and the monitor loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use runwatch_state::{CheckRunHealthResult, RunRecord, RunStatus};

use crate::error::{BackendError, BackendResult};
use crate::session::{Session, SessionFactory};

#[derive(Debug, Clone, Default)]
pub(crate) struct StubTenant {
    supported: bool,
    fail_list: bool,
    panic_on_list: bool,
    /// `None` makes the health check itself fail.
    runs: Vec<(String, Option<CheckRunHealthResult>)>,
}

impl StubTenant {
    pub(crate) fn supported() -> Self {
        Self {
            supported: true,
            ..Default::default()
        }
    }

    pub(crate) fn unsupported() -> Self {
        Self::default()
    }

    pub(crate) fn run(mut self, run_id: &str, result: CheckRunHealthResult) -> Self {
        self.runs.push((run_id.to_string(), Some(result)));
        self
    }

    pub(crate) fn failing_run(mut self, run_id: &str) -> Self {
        self.runs.push((run_id.to_string(), None));
        self
    }

    pub(crate) fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub(crate) fn panicking_list(mut self) -> Self {
        self.panic_on_list = true;
        self
    }
}

#[derive(Clone, Default)]
pub(crate) struct StubFactory {
    tenants: Arc<Mutex<HashMap<String, StubTenant>>>,
    open_delay: Option<Duration>,
    opened: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl StubFactory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn tenant(self, name: &str, tenant: StubTenant) -> Self {
        self.set_tenant(name, tenant);
        self
    }

    /// Make every `open_session` take this long.
    pub(crate) fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    pub(crate) fn set_tenant(&self, name: &str, tenant: StubTenant) {
        self.tenants
            .lock()
            .unwrap()
            .insert(name.to_string(), tenant);
    }

    /// Total sessions opened so far.
    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Sessions opened and not yet dropped.
    pub(crate) fn open_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent `open_session` calls observed.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl SessionFactory for StubFactory {
    type Session = StubSession;

    async fn open_session(&self, deployment: &str) -> BackendResult<StubSession> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let tenant = self
            .tenants
            .lock()
            .unwrap()
            .get(deployment)
            .cloned()
            .ok_or_else(|| BackendError::UnknownDeployment(deployment.to_string()))?;

        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(StubSession {
            deployment: deployment.to_string(),
            tenant,
            live: self.live.clone(),
        })
    }
}

pub(crate) struct StubSession {
    deployment: String,
    tenant: StubTenant,
    live: Arc<AtomicUsize>,
}

impl Session for StubSession {
    fn supports_health_checks(&self) -> bool {
        self.tenant.supported
    }

    async fn list_in_progress_runs(&self) -> BackendResult<Vec<RunRecord>> {
        if self.tenant.panic_on_list {
            panic!("stub listing blew up");
        }
        if self.tenant.fail_list {
            return Err(BackendError::Http("run storage unreachable".to_string()));
        }
        Ok(self
            .tenant
            .runs
            .iter()
            .map(|(run_id, _)| RunRecord {
                deployment: self.deployment.clone(),
                run_id: run_id.clone(),
                status: RunStatus::Started,
                worker_address: None,
                created_at: 0,
                updated_at: 0,
            })
            .collect())
    }

    async fn check_worker_health(&self, run: &RunRecord) -> BackendResult<CheckRunHealthResult> {
        match self.tenant.runs.iter().find(|(id, _)| *id == run.run_id) {
            Some((_, Some(result))) => Ok(result.clone()),
            _ => Err(BackendError::Timeout(format!("worker {}", run.run_id))),
        }
    }
}

impl Drop for StubSession {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
