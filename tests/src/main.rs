//! Runs every end-to-end scenario against a receiver in this process.
//!
//! Usage: `sealpost_tests [random sessions]`.

mod harness;
mod random;
mod scenarios;

use {
    anyhow::{Context as _, Result},
    harness::Harness,
    std::env,
    tracing::info,
    tracing_subscriber::{EnvFilter, util::SubscriberInitExt},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(
            "info,sealpost_server=debug,sealpost=debug",
        )?)
        .finish()
        .init();

    let sessions = match env::args().nth(1) {
        Some(arg) => arg.parse().context("invalid number of random sessions")?,
        None => 20,
    };

    let harness = Harness::start().await?;
    info!(dir = %harness.work_dir().display(), "running scenarios");
    scenarios::same_content_once(&harness).await?;
    scenarios::dedup_across_sessions(&harness).await?;
    scenarios::unauthorized(&harness).await?;
    scenarios::burn(&harness).await?;
    scenarios::broken_session(&harness).await?;
    scenarios::random_sessions(&harness, sessions).await?;
    harness.stop().await?;
    info!("all scenarios passed");
    Ok(())
}
