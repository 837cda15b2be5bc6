use anyhow::{Context, Result};
use forkrun_rs::fork_and_run;
use tokio::time::{interval, sleep, Duration};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Runs two fork-and-run jobs one after the other while a ticker task keeps
/// printing, showing that waiting for the children does not stall the
/// runtime.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let pid = std::process::id();
    info!(pid, "Starting parent process");

    let ticker = tokio::spawn(async move {
        let mut tick = interval(Duration::from_millis(250));
        loop {
            tick.tick().await;
            info!(pid, "Runtime still responsive");
        }
    });

    if let Err(e) = run_jobs().await {
        error!(pid, "Error calling fork-and-run: {:#}", e);
    }

    info!(pid, "Parent process continues...");
    sleep(Duration::from_secs(1)).await;
    ticker.abort();
    info!(pid, "Parent process finishing");

    Ok(())
}

async fn run_jobs() -> Result<()> {
    let result = fork_and_run(123).await.context("first job failed")?;
    info!("Received result from fork: {}", result);

    let result = fork_and_run(45).await.context("second job failed")?;
    info!("Received second result from fork: {}", result);

    Ok(())
}
