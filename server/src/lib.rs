pub mod keys;
pub mod receiver;
pub mod storage;
pub mod util;

use {
    crate::{keys::KeyStore, receiver::SessionOutcome, storage::Storage},
    anyhow::{Context as _, Result},
    sealpost_protocol::{ClientIdentity, DEFAULT_PORT},
    sealpost_sdk::SessionOptions,
    serde::{Deserialize, Serialize},
    std::{
        io,
        net::{Ipv4Addr, SocketAddr},
        path::{Path, PathBuf},
        sync::Arc,
        time::Duration,
    },
    tokio::{
        io::AsyncWriteExt,
        net::{TcpListener, TcpStream},
        task::{JoinError, JoinSet},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
    tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Root directory holding the key store and received files.
    pub storage_path: PathBuf,
    /// Limit for every socket read and write.
    #[serde(with = "humantime_serde", default = "default_io_timeout")]
    pub io_timeout: Duration,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_bind_addr() -> SocketAddr {
    (Ipv4Addr::UNSPECIFIED, DEFAULT_PORT).into()
}

fn default_io_timeout() -> Duration {
    sealpost_sdk::net::DEFAULT_IO_TIMEOUT
}

fn default_log_filter() -> String {
    "info".into()
}

impl Config {
    #[inline]
    pub fn parse(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        json5::from_str(&fs_err::read_to_string(path)?)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    #[must_use]
    #[inline]
    pub fn keys_dir(&self) -> PathBuf {
        self.storage_path.join("keys")
    }

    #[must_use]
    #[inline]
    pub fn received_dir(&self) -> PathBuf {
        self.storage_path.join("received")
    }
}

#[derive(Debug, Clone)]
struct Context {
    keys: Arc<KeyStore>,
    storage: Arc<Storage>,
    io_timeout: Duration,
}

pub struct Server {
    listener: TcpListener,
    ctx: Context,
}

impl Server {
    #[inline]
    pub async fn bind(config: &Config) -> Result<Self> {
        let ctx = Context {
            keys: Arc::new(KeyStore::new(config.keys_dir())?),
            storage: Arc::new(Storage::new(config.received_dir())?),
            io_timeout: config.io_timeout,
        };
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .with_context(|| format!("failed to bind to {}", config.bind_addr))?;
        Ok(Self { listener, ctx })
    }

    #[inline]
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `cancel` fires, then waits for sessions in
    /// progress. Those see the same token and stop at the next chunk.
    #[inline]
    pub async fn serve(self, cancel: CancellationToken) -> Result<()> {
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    log_joined(joined);
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(handle_connection(
                            self.ctx.clone(),
                            stream,
                            peer,
                            cancel.clone(),
                        ));
                    }
                    Err(err) => warn!(?err, "failed to accept"),
                }
            }
        }
        if !connections.is_empty() {
            info!(in_flight = connections.len(), "waiting for connections to close");
        }
        while let Some(joined) = connections.join_next().await {
            log_joined(joined);
        }
        Ok(())
    }
}

fn log_joined(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        if err.is_panic() {
            error!(?err, "connection task panicked");
        } else {
            debug!(?err, "connection task cancelled");
        }
    }
}

async fn handle_connection(
    ctx: Context,
    mut stream: TcpStream,
    peer: SocketAddr,
    cancel: CancellationToken,
) {
    let identity = ClientIdentity::from_peer(peer);
    debug!(%identity, "accepted connection");
    let options = SessionOptions::new(ctx.io_timeout, cancel);
    match receiver::serve(&mut stream, &identity, &ctx.keys, &ctx.storage, &options).await {
        Ok(SessionOutcome::Unauthorized) => {}
        Ok(outcome) => debug!(%identity, ?outcome, "session complete"),
        Err(err) => warn!(%identity, ?err, "session failed"),
    }
    if let Err(err) = stream.shutdown().await {
        debug!(%identity, ?err, "failed to shut down connection");
    }
}

/// Binds to the configured address and serves until `cancel` fires.
#[inline]
pub async fn run(config: Config, cancel: CancellationToken) -> Result<()> {
    let server = Server::bind(&config).await?;
    info!(
        addr = %server.local_addr()?,
        storage = %config.storage_path.display(),
        "listening"
    );
    server.serve(cancel).await
}

#[inline]
pub fn setup_logger(log_filter: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_new(log_filter)?)
        .init();
    Ok(())
}
