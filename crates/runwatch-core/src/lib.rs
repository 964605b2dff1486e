pub mod config;
pub mod duration;

pub use config::{
    ApiConfig, ConfigError, ConfigResult, DeploymentConfig, LauncherConfig, MonitorConfig,
    RunwatchConfig, StoreConfig,
};
pub use duration::parse_duration;
