//! runwatch.toml configuration parser.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::duration::parse_duration;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunwatchConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub deployments: Vec<DeploymentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    /// Seconds between the end of one poll and the start of the next.
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Path of the run database. `None` keeps runs in memory only.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentConfig {
    pub name: String,
    /// Whether the monitor polls this deployment from startup.
    #[serde(default = "default_true")]
    pub watch: bool,
    pub launcher: LauncherConfig,
}

/// Backend that launched the deployment's runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LauncherConfig {
    K8s {
        /// Base URL of the Kubernetes API (usually a `kubectl proxy`).
        api_server: String,
        namespace: String,
        job_name_prefix: Option<String>,
        timeout: Option<String>,
    },
    Http {
        path: Option<String>,
        timeout: Option<String>,
    },
    Unsupported,
}

fn default_interval_seconds() -> f64 {
    5.0
}

fn default_port() -> u16 {
    8450
}

fn default_true() -> bool {
    true
}

impl RunwatchConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        let interval = self.monitor.interval_seconds;
        if !interval.is_finite() || interval < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "monitor.interval_seconds must be a non-negative number, got {interval}"
            )));
        }
        if Duration::try_from_secs_f64(interval).is_err() {
            return Err(ConfigError::Invalid(format!(
                "monitor.interval_seconds is too large, got {interval}"
            )));
        }

        let mut seen = HashSet::new();
        for deployment in &self.deployments {
            if deployment.name.trim().is_empty() {
                return Err(ConfigError::Invalid("deployment name is empty".to_string()));
            }
            if !seen.insert(deployment.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "deployment {} is declared twice",
                    deployment.name
                )));
            }
            deployment.launcher.validate(&deployment.name)?;
        }
        Ok(())
    }

    /// Poll interval. Values `validate` would reject fall back to the default.
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.monitor.interval_seconds)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_interval_seconds()))
    }

    /// Names of deployments polled from startup.
    pub fn watched_deployments(&self) -> Vec<String> {
        self.deployments
            .iter()
            .filter(|d| d.watch)
            .map(|d| d.name.clone())
            .collect()
    }
}

impl std::str::FromStr for RunwatchConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        let config: RunwatchConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

impl LauncherConfig {
    fn validate(&self, deployment: &str) -> ConfigResult<()> {
        let timeout = match self {
            LauncherConfig::K8s {
                api_server,
                namespace,
                timeout,
                ..
            } => {
                if !api_server.starts_with("http://") {
                    return Err(ConfigError::Invalid(format!(
                        "deployment {deployment}: api_server must be an http:// URL"
                    )));
                }
                if namespace.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "deployment {deployment}: namespace is empty"
                    )));
                }
                timeout.as_deref()
            }
            LauncherConfig::Http { path, timeout } => {
                if path.as_deref().is_some_and(|p| !p.starts_with('/')) {
                    return Err(ConfigError::Invalid(format!(
                        "deployment {deployment}: health path must start with '/'"
                    )));
                }
                timeout.as_deref()
            }
            LauncherConfig::Unsupported => None,
        };

        if let Some(t) = timeout {
            if parse_duration(t).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "deployment {deployment}: bad timeout {t:?}"
                )));
            }
        }
        Ok(())
    }

    /// Per-call timeout, falling back to two seconds.
    pub fn timeout(&self) -> Duration {
        let raw = match self {
            LauncherConfig::K8s { timeout, .. } | LauncherConfig::Http { timeout, .. } => {
                timeout.as_deref()
            }
            LauncherConfig::Unsupported => None,
        };
        raw.and_then(parse_duration)
            .unwrap_or(Duration::from_secs(2))
    }
}
