//! drover agent binary.

use anyhow::{Context, Result};
use tracing::info;

use drover_agent::Config;

fn main() -> Result<()> {
    let config = Config::from_env()?;
    drover_agent::init_tracing(&config.log_level);

    info!(
        application = %config.application,
        launch_command = %config.launch_command,
        instances = config.instances,
        scheduler_threads = config.scheduler_threads,
        scanners = ?config.scanners,
        "Configuration loaded"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.scheduler_threads)
        .thread_name("drover-scheduler")
        .enable_all()
        .build()
        .context("failed to build scheduler runtime")?;

    runtime.block_on(drover_agent::run(config))
}
