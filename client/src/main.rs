use {
    anyhow::Result,
    clap::Parser,
    sealpost::{cli::Cli, run, setup_logger},
    sealpost_sdk::signal::cancel_on_shutdown,
    tokio_util::sync::CancellationToken,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logger(cli.log_filter.clone())?;
    let cancel = CancellationToken::new();
    cancel_on_shutdown(cancel.clone())?;
    run(cli, cancel).await
}
