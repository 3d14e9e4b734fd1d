use {
    anyhow::Result,
    clap::Parser,
    sealpost_sdk::signal::cancel_on_shutdown,
    sealpost_server::{Config, run, setup_logger, util::default_config_path},
    std::path::PathBuf,
    tokio_util::sync::CancellationToken,
};

/// Receives files from sealpost senders.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the config file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Port to listen on; overrides the port of `bind_addr`.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut config = Config::parse(&config_path)?;
    if let Some(port) = cli.port {
        config.bind_addr.set_port(port);
    }
    setup_logger(&config.log_filter)?;

    let cancel = CancellationToken::new();
    cancel_on_shutdown(cancel.clone())?;
    run(config, cancel).await
}
