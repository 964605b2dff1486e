//! Launcher health checks.
//!
//! Each deployment's runs were started by one launcher. The launcher knows
//! how to find a run's worker and ask whether it is still alive. The set
//! of launchers is fixed and resolved once from config.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use runwatch_core::LauncherConfig;
use runwatch_state::{CheckRunHealthResult, ErrorInfo, RunRecord};

use crate::error::{BackendError, BackendResult};
use crate::probe::{http_get, split_base_url};

const DEFAULT_JOB_NAME_PREFIX: &str = "run-worker-";
const DEFAULT_HEALTH_PATH: &str = "/healthz";

/// Capability to report on the worker behind a run.
pub trait HealthCheckable {
    /// Whether `check_worker_health` means anything for this launcher.
    fn supports_health_checks(&self) -> bool;

    /// Check one run's worker.
    ///
    /// A worker that cannot be found is reported as `Unknown` with a
    /// diagnostic rather than as an error.
    fn check_worker_health(
        &self,
        run: &RunRecord,
    ) -> impl Future<Output = BackendResult<CheckRunHealthResult>> + Send;
}

/// The launchers runwatch knows how to query.
#[derive(Debug, Clone)]
pub enum RunLauncher {
    K8s(K8sLauncher),
    Http(HttpLauncher),
    Unsupported,
}

impl RunLauncher {
    pub fn from_config(config: &LauncherConfig) -> BackendResult<Self> {
        let timeout = config.timeout();
        match config {
            LauncherConfig::K8s {
                api_server,
                namespace,
                job_name_prefix,
                ..
            } => {
                let (authority, base_path) = split_base_url(api_server)?;
                Ok(RunLauncher::K8s(K8sLauncher {
                    authority,
                    base_path,
                    namespace: namespace.clone(),
                    job_name_prefix: job_name_prefix
                        .clone()
                        .unwrap_or_else(|| DEFAULT_JOB_NAME_PREFIX.to_string()),
                    timeout,
                }))
            }
            LauncherConfig::Http { path, .. } => Ok(RunLauncher::Http(HttpLauncher {
                path: path.clone().unwrap_or_else(|| DEFAULT_HEALTH_PATH.to_string()),
                timeout,
            })),
            LauncherConfig::Unsupported => Ok(RunLauncher::Unsupported),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RunLauncher::K8s(_) => "k8s",
            RunLauncher::Http(_) => "http",
            RunLauncher::Unsupported => "unsupported",
        }
    }
}

impl HealthCheckable for RunLauncher {
    fn supports_health_checks(&self) -> bool {
        !matches!(self, RunLauncher::Unsupported)
    }

    async fn check_worker_health(&self, run: &RunRecord) -> BackendResult<CheckRunHealthResult> {
        match self {
            RunLauncher::K8s(launcher) => launcher.check_worker_health(run).await,
            RunLauncher::Http(launcher) => launcher.check_worker_health(run).await,
            RunLauncher::Unsupported => Ok(CheckRunHealthResult::unknown(
                "launcher does not support worker health checks",
            )),
        }
    }
}

// ── Kubernetes jobs ───────────────────────────────────────────────

/// Runs launched as Kubernetes batch jobs, read through the API server.
#[derive(Debug, Clone)]
pub struct K8sLauncher {
    authority: String,
    base_path: String,
    namespace: String,
    job_name_prefix: String,
    timeout: Duration,
}

#[derive(Debug, Default, Deserialize)]
struct Job {
    #[serde(default)]
    status: JobStatus,
}

/// The counters of a job's `.status` that decide worker health.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct JobStatus {
    #[serde(default)]
    pub active: Option<u32>,
    #[serde(default)]
    pub succeeded: Option<u32>,
    #[serde(default)]
    pub failed: Option<u32>,
}

impl JobStatus {
    /// Failure wins over success; anything else is still running.
    pub fn health(&self) -> CheckRunHealthResult {
        if self.failed.unwrap_or(0) > 0 {
            CheckRunHealthResult::failed("K8s job failed")
        } else if self.succeeded.unwrap_or(0) > 0 {
            CheckRunHealthResult::success()
        } else {
            CheckRunHealthResult::running()
        }
    }
}

impl K8sLauncher {
    pub fn job_name(&self, run_id: &str) -> String {
        format!("{}{}", self.job_name_prefix, run_id.to_ascii_lowercase())
    }

    fn job_path(&self, job_name: &str) -> String {
        format!(
            "{}/apis/batch/v1/namespaces/{}/jobs/{}",
            self.base_path, self.namespace, job_name
        )
    }

    async fn read_job(&self, job_name: &str) -> BackendResult<JobStatus> {
        let path = self.job_path(job_name);
        let (status, body) = http_get(&self.authority, &path, self.timeout).await?;
        let uri = format!("http://{}{}", self.authority, path);
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                uri,
            });
        }
        let job: Job = serde_json::from_slice(&body).map_err(|e| BackendError::Decode {
            uri,
            reason: e.to_string(),
        })?;
        Ok(job.status)
    }

    pub async fn check_worker_health(
        &self,
        run: &RunRecord,
    ) -> BackendResult<CheckRunHealthResult> {
        let job_name = self.job_name(&run.run_id);
        match self.read_job(&job_name).await {
            Ok(status) => Ok(status.health()),
            Err(e) => {
                debug!(run_id = %run.run_id, %job_name, error = %e, "job lookup failed");
                Ok(CheckRunHealthResult::unknown(
                    ErrorInfo::from_error(&e).to_string(),
                ))
            }
        }
    }
}

// ── Direct HTTP probes ────────────────────────────────────────────

/// Runs whose workers expose a health endpoint at a recorded address.
#[derive(Debug, Clone)]
pub struct HttpLauncher {
    path: String,
    timeout: Duration,
}

impl HttpLauncher {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    pub async fn check_worker_health(
        &self,
        run: &RunRecord,
    ) -> BackendResult<CheckRunHealthResult> {
        let Some(address) = run.worker_address.as_deref() else {
            return Ok(CheckRunHealthResult::unknown(format!(
                "run {} has no worker address",
                run.run_id
            )));
        };

        match http_get(address, &self.path, self.timeout).await {
            Ok((status, _)) if status.is_success() => Ok(CheckRunHealthResult::running()),
            Ok((status, _)) => Ok(CheckRunHealthResult::failed(format!(
                "health endpoint returned {status}"
            ))),
            Err(e) => {
                debug!(run_id = %run.run_id, %address, error = %e, "worker probe failed");
                Ok(CheckRunHealthResult::unknown(
                    ErrorInfo::from_error(&e).to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::tests::serve_canned;
    use runwatch_state::{RunStatus, WorkerStatus};

    fn test_run(run_id: &str, address: Option<String>) -> RunRecord {
        RunRecord {
            deployment: "prod".to_string(),
            run_id: run_id.to_string(),
            status: RunStatus::Started,
            worker_address: address,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn k8s_config(api_server: String) -> LauncherConfig {
        LauncherConfig::K8s {
            api_server,
            namespace: "runs".to_string(),
            job_name_prefix: None,
            timeout: Some("2s".to_string()),
        }
    }

    #[test]
    fn job_status_mapping() {
        let failed = JobStatus {
            failed: Some(1),
            succeeded: Some(1),
            ..Default::default()
        };
        assert_eq!(failed.health().status, WorkerStatus::Failed);
        assert_eq!(failed.health().msg.as_deref(), Some("K8s job failed"));

        let done = JobStatus {
            succeeded: Some(1),
            ..Default::default()
        };
        assert_eq!(done.health(), CheckRunHealthResult::success());

        let active = JobStatus {
            active: Some(1),
            failed: Some(0),
            ..Default::default()
        };
        assert_eq!(active.health(), CheckRunHealthResult::running());
        assert_eq!(JobStatus::default().health(), CheckRunHealthResult::running());
    }

    #[test]
    fn launcher_from_config() {
        let launcher = RunLauncher::from_config(&k8s_config("http://10.0.0.1:8001".into())).unwrap();
        assert_eq!(launcher.kind(), "k8s");
        assert!(launcher.supports_health_checks());

        let RunLauncher::K8s(k8s) = &launcher else {
            panic!("expected k8s launcher");
        };
        assert_eq!(k8s.job_name("ABC123"), "run-worker-abc123");
        assert_eq!(
            k8s.job_path("run-worker-abc123"),
            "/apis/batch/v1/namespaces/runs/jobs/run-worker-abc123"
        );

        let unsupported = RunLauncher::from_config(&LauncherConfig::Unsupported).unwrap();
        assert!(!unsupported.supports_health_checks());
    }

    #[tokio::test]
    async fn k8s_reads_job_status() {
        let addr = serve_canned(|path| {
            if path.ends_with("/jobs/run-worker-done") {
                ("200 OK", r#"{"status":{"succeeded":1}}"#.to_string())
            } else if path.ends_with("/jobs/run-worker-bad") {
                ("200 OK", r#"{"status":{"failed":2}}"#.to_string())
            } else if path.ends_with("/jobs/run-worker-live") {
                ("200 OK", r#"{"metadata":{},"status":{"active":1}}"#.to_string())
            } else {
                ("404 Not Found", r#"{"kind":"Status","code":404}"#.to_string())
            }
        })
        .await;
        let launcher = RunLauncher::from_config(&k8s_config(format!("http://{addr}"))).unwrap();

        let result = launcher.check_worker_health(&test_run("done", None)).await.unwrap();
        assert_eq!(result.status, WorkerStatus::Success);

        let result = launcher.check_worker_health(&test_run("bad", None)).await.unwrap();
        assert_eq!(result.status, WorkerStatus::Failed);

        let result = launcher.check_worker_health(&test_run("live", None)).await.unwrap();
        assert_eq!(result.status, WorkerStatus::Running);

        // A missing job is unknown, not an error.
        let result = launcher.check_worker_health(&test_run("gone", None)).await.unwrap();
        assert_eq!(result.status, WorkerStatus::Unknown);
        assert!(result.msg.unwrap().contains("404"));
    }

    #[tokio::test]
    async fn k8s_unreachable_api_is_unknown() {
        let launcher = RunLauncher::from_config(&k8s_config("http://127.0.0.1:1".into())).unwrap();
        let result = launcher.check_worker_health(&test_run("r1", None)).await.unwrap();
        assert_eq!(result.status, WorkerStatus::Unknown);
        assert!(!result.msg.unwrap().is_empty());
    }

    #[tokio::test]
    async fn http_probe_statuses() {
        let healthy = serve_canned(|_| ("200 OK", "{}".to_string())).await;
        let sick = serve_canned(|_| ("503 Service Unavailable", "{}".to_string())).await;
        let launcher = HttpLauncher::new("/healthz", Duration::from_secs(2));

        let result = launcher
            .check_worker_health(&test_run("r1", Some(healthy.to_string())))
            .await
            .unwrap();
        assert_eq!(result, CheckRunHealthResult::running());

        let result = launcher
            .check_worker_health(&test_run("r2", Some(sick.to_string())))
            .await
            .unwrap();
        assert_eq!(result.status, WorkerStatus::Failed);
        assert!(result.msg.unwrap().contains("503"));

        let result = launcher
            .check_worker_health(&test_run("r3", None))
            .await
            .unwrap();
        assert_eq!(result.status, WorkerStatus::Unknown);
    }
}
