//! Per-deployment sessions.
//!
//! The monitor never talks to a launcher or the run store directly. For
//! every deployment in an iteration it opens a session, asks it for the
//! in-progress runs and their worker health, and drops it. Dropping the
//! session releases whatever it holds, whether the poll succeeded or not.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, trace};

use runwatch_core::RunwatchConfig;
use runwatch_state::{CheckRunHealthResult, RunRecord, RunStore};

use crate::checker::{HealthCheckable, RunLauncher};
use crate::error::{BackendError, BackendResult};

/// One deployment's view of its runs and their launcher.
pub trait Session: Send + Sync {
    fn supports_health_checks(&self) -> bool;

    /// Runs that have not reached a terminal state, fetched fresh.
    fn list_in_progress_runs(&self) -> impl Future<Output = BackendResult<Vec<RunRecord>>> + Send;

    fn check_worker_health(
        &self,
        run: &RunRecord,
    ) -> impl Future<Output = BackendResult<CheckRunHealthResult>> + Send;
}

/// Owned context the monitor loop uses to open sessions.
pub trait SessionFactory: Send + Sync + 'static {
    type Session: Session;

    fn open_session(
        &self,
        deployment: &str,
    ) -> impl Future<Output = BackendResult<Self::Session>> + Send;
}

/// Sessions backed by the run store and the configured launchers.
#[derive(Clone)]
pub struct StoreSessionFactory {
    store: RunStore,
    launchers: Arc<HashMap<String, RunLauncher>>,
}

impl StoreSessionFactory {
    pub fn new(store: RunStore, launchers: HashMap<String, RunLauncher>) -> Self {
        Self {
            store,
            launchers: Arc::new(launchers),
        }
    }

    /// Resolve every configured deployment's launcher up front.
    pub fn from_config(store: RunStore, config: &RunwatchConfig) -> BackendResult<Self> {
        let mut launchers = HashMap::new();
        for deployment in &config.deployments {
            let launcher = RunLauncher::from_config(&deployment.launcher).map_err(|e| {
                BackendError::InvalidConfig(format!("deployment {}: {e}", deployment.name))
            })?;
            debug!(deployment = %deployment.name, launcher = launcher.kind(), "launcher resolved");
            launchers.insert(deployment.name.clone(), launcher);
        }
        Ok(Self::new(store, launchers))
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    pub fn is_configured(&self, deployment: &str) -> bool {
        self.launchers.contains_key(deployment)
    }
}

impl SessionFactory for StoreSessionFactory {
    type Session = StoreSession;

    async fn open_session(&self, deployment: &str) -> BackendResult<StoreSession> {
        let launcher = self
            .launchers
            .get(deployment)
            .cloned()
            .ok_or_else(|| BackendError::UnknownDeployment(deployment.to_string()))?;
        trace!(%deployment, "session opened");
        Ok(StoreSession {
            deployment: deployment.to_string(),
            store: self.store.clone(),
            launcher,
        })
    }
}

pub struct StoreSession {
    deployment: String,
    store: RunStore,
    launcher: RunLauncher,
}

impl Session for StoreSession {
    fn supports_health_checks(&self) -> bool {
        self.launcher.supports_health_checks()
    }

    async fn list_in_progress_runs(&self) -> BackendResult<Vec<RunRecord>> {
        Ok(self.store.list_in_progress_runs(&self.deployment)?)
    }

    async fn check_worker_health(&self, run: &RunRecord) -> BackendResult<CheckRunHealthResult> {
        self.launcher.check_worker_health(run).await
    }
}

impl Drop for StoreSession {
    fn drop(&mut self) {
        trace!(deployment = %self.deployment, "session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runwatch_state::{RunStatus, WorkerStatus};

    const CONFIG: &str = r#"
[[deployments]]
name = "prod"
[deployments.launcher]
type = "http"

[[deployments]]
name = "legacy"
[deployments.launcher]
type = "unsupported"
"#;

    fn test_factory() -> StoreSessionFactory {
        let config: RunwatchConfig = CONFIG.parse().unwrap();
        StoreSessionFactory::from_config(RunStore::open_in_memory().unwrap(), &config).unwrap()
    }

    #[tokio::test]
    async fn opens_configured_deployments_only() {
        let factory = test_factory();
        assert!(factory.is_configured("prod"));
        assert!(factory.open_session("prod").await.is_ok());

        let err = factory.open_session("staging").await.err().unwrap();
        assert!(matches!(err, BackendError::UnknownDeployment(name) if name == "staging"));
    }

    #[tokio::test]
    async fn session_reports_launcher_support() {
        let factory = test_factory();
        assert!(factory.open_session("prod").await.unwrap().supports_health_checks());
        assert!(!factory.open_session("legacy").await.unwrap().supports_health_checks());
    }

    #[tokio::test]
    async fn session_lists_in_progress_runs_for_its_deployment() {
        let factory = test_factory();
        let store = factory.store();
        store.upsert_run("prod", "r1", RunStatus::Started, None).unwrap();
        store.upsert_run("prod", "r2", RunStatus::Success, None).unwrap();
        store.upsert_run("legacy", "r3", RunStatus::Started, None).unwrap();

        let session = factory.open_session("prod").await.unwrap();
        let runs = session.list_in_progress_runs().await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, "r1");

        // No worker address recorded: unknown, not an error.
        let health = session.check_worker_health(&runs[0]).await.unwrap();
        assert_eq!(health.status, WorkerStatus::Unknown);
    }
}
