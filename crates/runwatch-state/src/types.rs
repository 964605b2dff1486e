//! Domain types shared by the monitor, the run store, and the API.
//!
//! Everything here serializes to JSON. Optional fields serialize as
//! explicit `null` so an observer can tell "absent" from "empty".

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Name of a deployment (tenant) whose runs are monitored.
pub type DeploymentName = String;

/// Identifier of a single run, unique among in-flight runs.
pub type RunId = String;

// ── Worker health ─────────────────────────────────────────────────

/// Liveness of a run worker as reported by its launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Running,
    Success,
    Failed,
    /// The health check itself failed, or the worker could not be found.
    Unknown,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Running => "RUNNING",
            WorkerStatus::Success => "SUCCESS",
            WorkerStatus::Failed => "FAILED",
            WorkerStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RUNNING" => Ok(WorkerStatus::Running),
            "SUCCESS" => Ok(WorkerStatus::Success),
            "FAILED" => Ok(WorkerStatus::Failed),
            "UNKNOWN" => Ok(WorkerStatus::Unknown),
            _ => Err(format!("unrecognized worker status {:?}", s.trim())),
        }
    }
}

/// Raw outcome of one launcher health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRunHealthResult {
    pub status: WorkerStatus,
    pub msg: Option<String>,
}

impl CheckRunHealthResult {
    pub fn new(status: WorkerStatus, msg: Option<String>) -> Self {
        Self { status, msg }
    }

    pub fn running() -> Self {
        Self::new(WorkerStatus::Running, None)
    }

    pub fn success() -> Self {
        Self::new(WorkerStatus::Success, None)
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::new(WorkerStatus::Failed, Some(msg.into()))
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::new(WorkerStatus::Unknown, Some(msg.into()))
    }
}

/// Health of one in-flight run, as published to readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunWorkerStatus {
    #[serde(deserialize_with = "non_empty_run_id")]
    pub run_id: RunId,
    pub status: WorkerStatus,
    /// Diagnostic text; only set for `Failed` and `Unknown`.
    #[serde(default)]
    pub message: Option<String>,
}

impl RunWorkerStatus {
    pub fn new(run_id: impl Into<RunId>, status: WorkerStatus, message: Option<String>) -> Self {
        let run_id = run_id.into();
        debug_assert!(!run_id.is_empty(), "run worker status with empty run_id");
        Self {
            run_id,
            status,
            message,
        }
    }

    /// Map a typed launcher result onto a published status.
    ///
    /// An `Unknown` result always carries a non-empty message.
    pub fn from_check_result(run_id: impl Into<RunId>, result: CheckRunHealthResult) -> Self {
        let message = match result.status {
            WorkerStatus::Unknown => Some(non_empty(result.msg, || {
                "health check returned no diagnostic".to_string()
            })),
            _ => result.msg.filter(|m| !m.is_empty()),
        };
        Self::new(run_id, result.status, message)
    }

    /// Map an untyped backend result (status code plus optional text).
    ///
    /// Unrecognized or missing codes become `Unknown`; the raw code and
    /// any backend text are preserved in the message.
    pub fn from_raw(run_id: impl Into<RunId>, code: Option<&str>, msg: Option<String>) -> Self {
        let parsed = code.map(str::parse::<WorkerStatus>);
        match parsed {
            Some(Ok(status)) => Self::from_check_result(run_id, CheckRunHealthResult::new(status, msg)),
            Some(Err(reason)) => {
                let text = match msg.filter(|m| !m.is_empty()) {
                    Some(m) => format!("{reason}: {m}"),
                    None => reason,
                };
                Self::new(run_id, WorkerStatus::Unknown, Some(text))
            }
            None => {
                let text = non_empty(msg, || "worker status missing".to_string());
                Self::new(run_id, WorkerStatus::Unknown, Some(text))
            }
        }
    }
}

fn non_empty(msg: Option<String>, fallback: impl FnOnce() -> String) -> String {
    msg.filter(|m| !m.is_empty()).unwrap_or_else(fallback)
}

fn non_empty_run_id<'de, D>(deserializer: D) -> Result<RunId, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let run_id = RunId::deserialize(deserializer)?;
    if run_id.is_empty() {
        return Err(serde::de::Error::invalid_value(
            serde::de::Unexpected::Str(&run_id),
            &"a non-empty run_id",
        ));
    }
    Ok(run_id)
}

// ── Deployment snapshot ───────────────────────────────────────────

/// The complete set of worker statuses for one deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSnapshot {
    #[serde(default)]
    pub statuses: Vec<RunWorkerStatus>,
    /// `false` when the deployment's launcher has no health check; the
    /// empty `statuses` then says nothing about active runs.
    pub monitoring_supported: bool,
    /// `None` when the question does not apply.
    #[serde(default)]
    pub monitoring_thread_alive: Option<bool>,
}

impl TenantSnapshot {
    pub fn supported(statuses: Vec<RunWorkerStatus>) -> Self {
        Self {
            statuses,
            monitoring_supported: true,
            monitoring_thread_alive: None,
        }
    }

    pub fn unsupported() -> Self {
        Self::default()
    }

    pub fn with_thread_alive(mut self, alive: Option<bool>) -> Self {
        self.monitoring_thread_alive = alive;
        self
    }
}

// ── Diagnostics ───────────────────────────────────────────────────

/// Serializable rendering of an error and its cause chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default)]
    pub cls_name: Option<String>,
    #[serde(default)]
    pub cause: Option<Box<ErrorInfo>>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cls_name: None,
            cause: None,
        }
    }

    pub fn with_cls_name(mut self, cls_name: impl Into<String>) -> Self {
        self.cls_name = Some(cls_name.into());
        self
    }

    /// Capture `err` and every `source()` below it.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Self {
            message: err.to_string(),
            cls_name: None,
            cause: err.source().map(|src| Box::new(Self::from_error(src))),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cls_name {
            Some(cls) => write!(f, "{cls}: {}", self.message)?,
            None => f.write_str(&self.message)?,
        }
        let mut cause = self.cause.as_deref();
        while let Some(c) = cause {
            write!(f, "\ncaused by: {}", c.message)?;
            cause = c.cause.as_deref();
        }
        Ok(())
    }
}

// ── Code servers ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CodeServerStatus {
    Starting,
    Running,
    Failed,
}

/// Liveness report for one code location's server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeServerHeartbeat {
    pub location_name: String,
    pub server_status: CodeServerStatus,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
}

impl CodeServerHeartbeat {
    pub fn new(location_name: impl Into<String>, server_status: CodeServerStatus) -> Self {
        Self {
            location_name: location_name.into(),
            server_status,
            error: None,
        }
    }

    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }
}

// ── Runs ──────────────────────────────────────────────────────────

/// Lifecycle state of a run as recorded by its launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    NotStarted,
    Starting,
    Started,
    Canceling,
    Success,
    Failure,
    Canceled,
}

impl RunStatus {
    /// States that have not reached a terminal disposition.
    pub const IN_PROGRESS: [RunStatus; 5] = [
        RunStatus::Queued,
        RunStatus::NotStarted,
        RunStatus::Starting,
        RunStatus::Started,
        RunStatus::Canceling,
    ];

    pub fn is_in_progress(&self) -> bool {
        Self::IN_PROGRESS.contains(self)
    }
}

/// A launched run the monitor may check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub deployment: DeploymentName,
    pub run_id: RunId,
    pub status: RunStatus,
    /// `host:port` of the worker, for launchers that probe it directly.
    #[serde(default)]
    pub worker_address: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl RunRecord {
    /// Build the composite key for the runs table.
    pub fn table_key(&self) -> String {
        run_key(&self.deployment, &self.run_id)
    }
}

pub(crate) fn run_key(deployment: &str, run_id: &str) -> String {
    format!("{deployment}:{run_id}")
}
