//! runwatchd: the runwatch daemon.
//!
//! Single binary that assembles the runwatch subsystems:
//! - Run store (redb, or in memory)
//! - Launcher backends resolved from config
//! - Run worker health monitor
//! - REST API
//!
//! # Usage
//!
//! ```text
//! runwatchd serve --config /etc/runwatch/runwatch.toml --port 8450
//! runwatchd check-config --config /etc/runwatch/runwatch.toml
//! ```

mod daemon;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,runwatchd=debug,runwatch_health=debug,runwatch_api=debug";

#[derive(Parser)]
#[command(name = "runwatchd", about = "runwatch run worker health daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the health monitor and serve the API until Ctrl-C.
    Serve {
        /// Path to runwatch.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on, overriding `[api] port`.
        #[arg(long)]
        port: Option<u16>,

        /// Seconds between polls, overriding `[monitor] interval_seconds`.
        #[arg(long)]
        interval: Option<f64>,
    },

    /// Load and validate a config file, then print a summary.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Serve {
            config,
            port,
            interval,
        } => {
            let config = daemon::load_config(config.as_deref(), port, interval)?;
            daemon::run_serve(config).await
        }
        Command::CheckConfig { config } => {
            let config = daemon::load_config(Some(config.as_path()), None, None)?;
            let summary = serde_json::json!({
                "interval_seconds": config.monitor.interval_seconds,
                "port": config.api.port,
                "store": config.store.path,
                "deployments": config.deployments.len(),
                "watched": config.watched_deployments(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
