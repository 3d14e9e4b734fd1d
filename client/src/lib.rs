pub mod cli;
pub mod counters;
pub mod sender;

use {
    crate::{
        cli::{Cli, unspecified_for},
        counters::Summary,
    },
    anyhow::{Context as _, Result, bail},
    sealpost_protocol::{DEFAULT_PORT, credentials::TransferKey},
    sealpost_sdk::{SessionOptions, net},
    std::{env, io, net::Ipv4Addr},
    tokio::task::block_in_place,
    tokio_util::sync::CancellationToken,
    tracing::info,
    tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt},
};

#[inline]
pub async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let options = SessionOptions::new(cli.timeout.into(), cancel);
    let remote = cli.remote.resolve(Ipv4Addr::LOCALHOST.into(), DEFAULT_PORT);
    let local = cli
        .local
        .map(|local| local.resolve(unspecified_for(remote), 0));

    if cli.burn {
        let mut stream = net::connect(remote, local, options.io_timeout)
            .await
            .with_context(|| format!("failed to connect to {remote}"))?;
        sender::burn(&mut stream, &options).await?;
        info!(%remote, "key burned");
        return Ok(());
    }

    let key = TransferKey::read_from(&cli.key)
        .with_context(|| format!("failed to read key from {}", cli.key.display()))?;
    let mut outgoing = block_in_place(|| sender::prepare(&cli.files, &options.cancel))?;
    let mut stream = net::connect(remote, local, options.io_timeout)
        .await
        .with_context(|| format!("failed to connect to {remote}"))?;
    info!(%remote, local = %stream.local_addr()?, files = outgoing.manifest().len(), "connected");

    let result = sender::send(&mut stream, &key, &mut outgoing, &options).await;
    let summary = Summary::from_manifest(outgoing.manifest());
    summary.report();
    result?;
    if !summary.is_success() {
        bail!("{} file(s) failed to transfer", summary.failed.len());
    }
    Ok(())
}

/// Installs a stderr logger. Without an explicit filter, `RUST_LOG` is used,
/// then `info`.
#[inline]
pub fn setup_logger(log_filter: Option<String>) -> Result<()> {
    let log_filter = log_filter
        .or_else(|| env::var(EnvFilter::DEFAULT_ENV).ok())
        .unwrap_or_else(|| "info".into());
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_new(log_filter)?)
        .init();
    Ok(())
}
