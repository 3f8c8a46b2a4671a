//! drover agent
//!
//! Keeps a set of application instances deployed and classified without a
//! central scheduler. The agent runs the reconciliation scanners from
//! `drover-reconcile` against instances on the local machine.
//!
//! ## Architecture
//!
//! - **Fleet**: the network of descriptors plus the status, auto-deploy,
//!   auto-kill and auto-remove scanners
//! - **LocalHost**: runs commands through `sh -c`
//! - **CommandManager**: starts, kills and probes instances by pid
//! - **Reports**: one structured log record per state transition

use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod command_manager;
pub mod config;
pub mod fleet;
pub mod local_host;
pub mod report;

pub use command_manager::CommandManager;
pub use config::{Config, ScannerKind};
pub use fleet::Fleet;
pub use local_host::{LocalHost, LocalProcess};
pub use report::StatusReport;

/// Install the JSON tracing subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Run the agent until Ctrl-C, or until `config.run_for` elapses.
pub async fn run(config: Config) -> Result<()> {
    let fleet = Fleet::from_config(&config);
    info!(
        network_id = %fleet.network().id(),
        application = %config.application,
        instances = config.instances,
        "Fleet created"
    );

    fleet.start();

    let stop_after = config.run_for.unwrap_or(Duration::MAX);
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received shutdown signal");
        }
        _ = sleep_for(stop_after) => {
            info!(run_secs = stop_after.as_secs(), "Run time elapsed");
        }
    }

    fleet.shutdown().await;
    info!("Agent shutdown complete");
    Ok(())
}

async fn sleep_for(duration: Duration) {
    match tokio::time::Instant::now().checked_add(duration) {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
