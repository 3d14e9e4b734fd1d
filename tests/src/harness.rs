use {
    anyhow::{Context as _, Result, ensure},
    fs_err as fs,
    portpicker::pick_unused_port,
    sealpost::{counters::Summary, sender},
    sealpost_protocol::{
        CHUNK_SIZE, ClientIdentity,
        codec::{RESPONSE_LEN, decode_response, encode_header},
        credentials::TransferKey,
    },
    sealpost_sdk::{SessionOptions, TransferError, net},
    sealpost_server::{
        Config, Server,
        keys::KeyStore,
        storage::{Namespace, Storage},
    },
    std::{
        io,
        net::{Ipv4Addr, SocketAddr},
        path::{Path, PathBuf},
        time::Duration,
    },
    tempfile::TempDir,
    tokio::{
        io::AsyncWriteExt,
        net::TcpStream,
        task::{JoinHandle, block_in_place},
        time::sleep,
    },
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

const IO_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_ATTEMPTS: u32 = 20;

/// A sender as seen by the receiver: a fixed local address and its key file.
#[derive(Debug, Clone)]
pub struct Client {
    pub local: SocketAddr,
    pub identity: ClientIdentity,
    pub key: TransferKey,
    pub key_path: PathBuf,
}

/// A receiver running in the current runtime on a temporary storage root.
pub struct Harness {
    dir: TempDir,
    config: Config,
    addr: SocketAddr,
    cancel: CancellationToken,
    server: JoinHandle<Result<()>>,
}

impl Harness {
    pub async fn start() -> Result<Self> {
        let dir = TempDir::new()?;
        let config = Config {
            bind_addr: (Ipv4Addr::LOCALHOST, 0).into(),
            storage_path: dir.path().join("storage"),
            io_timeout: IO_TIMEOUT,
            log_filter: "debug".into(),
        };
        let server = Server::bind(&config).await?;
        let addr = server.local_addr()?;
        let cancel = CancellationToken::new();
        let server = tokio::spawn(server.serve(cancel.clone()));
        debug!(%addr, dir = %dir.path().display(), "receiver started");
        Ok(Self {
            dir,
            config,
            addr,
            cancel,
            server,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn keys(&self) -> Result<KeyStore> {
        Ok(KeyStore::new(self.config.keys_dir())?)
    }

    pub fn namespace(&self, identity: &ClientIdentity) -> Result<Namespace> {
        Ok(Storage::new(self.config.received_dir())?.namespace(identity)?)
    }

    /// Whether anything was ever stored for `identity`.
    pub fn has_namespace(&self, identity: &ClientIdentity) -> Result<bool> {
        Ok(self
            .config
            .received_dir()
            .join(identity.as_str())
            .try_exists()?)
    }

    /// A sender on a free local port, without a key on the receiver.
    pub fn unknown_client(&self, key: TransferKey) -> Result<Client> {
        let port = pick_unused_port().context("failed to pick port")?;
        let local: SocketAddr = (Ipv4Addr::LOCALHOST, port).into();
        let key_path = self.dir.path().join(format!("{port}.key"));
        key.write_to(&key_path)?;
        Ok(Client {
            local,
            identity: ClientIdentity::from_peer(local),
            key,
            key_path,
        })
    }

    /// A sender whose key is known to the receiver.
    pub fn add_client(&self, key: TransferKey) -> Result<Client> {
        let client = self.unknown_client(key)?;
        self.keys()?.store_key(&client.identity, &client.key)?;
        Ok(client)
    }

    /// Writes files into a fresh directory and returns their paths.
    pub fn write_files(&self, name: &str, files: &[(String, Vec<u8>)]) -> Result<Vec<PathBuf>> {
        let dir = self.dir.path().join("send").join(name);
        fs::create_dir_all(&dir)?;
        files
            .iter()
            .map(|(file_name, content)| {
                let path = dir.join(file_name);
                fs::write(&path, content)?;
                Ok(path)
            })
            .collect()
    }

    /// Connects from the client's port. The previous connection from the
    /// same port may take a moment to be released.
    async fn connect(&self, client: &Client) -> Result<TcpStream> {
        let mut attempt = 1;
        loop {
            match net::connect(self.addr, Some(client.local), IO_TIMEOUT).await {
                Ok(stream) => return Ok(stream),
                Err(err)
                    if attempt < CONNECT_ATTEMPTS
                        && matches!(
                            err.kind(),
                            io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable
                        ) =>
                {
                    debug!(?err, attempt, "local port busy, retrying");
                    attempt = attempt.saturating_add(1);
                    sleep(Duration::from_millis(50)).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub async fn send(
        &self,
        client: &Client,
        paths: &[PathBuf],
    ) -> Result<(Result<(), TransferError>, Summary)> {
        let options = SessionOptions::new(IO_TIMEOUT, CancellationToken::new());
        let mut outgoing = block_in_place(|| sender::prepare(paths, &options.cancel))?;
        let mut stream = self.connect(client).await?;
        let result = sender::send(&mut stream, &client.key, &mut outgoing, &options).await;
        Ok((result, Summary::from_manifest(outgoing.manifest())))
    }

    pub async fn burn(&self, client: &Client) -> Result<()> {
        let options = SessionOptions::new(IO_TIMEOUT, CancellationToken::new());
        let mut stream = self.connect(client).await?;
        sender::burn(&mut stream, &options).await?;
        Ok(())
    }

    /// Sends the header and half of the first requested chunk, then stops
    /// writing and waits for the receiver to hang up.
    pub async fn abandon(&self, client: &Client, paths: &[PathBuf]) -> Result<()> {
        let options = SessionOptions::new(IO_TIMEOUT, CancellationToken::new());
        let outgoing = block_in_place(|| sender::prepare(paths, &options.cancel))?;
        let mut stream = self.connect(client).await?;
        net::write_all(&mut stream, &encode_header(outgoing.manifest())?, &options).await?;
        let mut response = [0; RESPONSE_LEN];
        net::read_exact(&mut stream, &mut response, &options).await?;
        let response = decode_response(&response)?;
        ensure!(
            response.next_index == 1,
            "unexpected first response: {response:?}"
        );
        net::write_all(&mut stream, &vec![0; CHUNK_SIZE / 2], &options).await?;
        stream.shutdown().await?;
        net::await_close(&mut stream, &options).await?;
        Ok(())
    }

    /// Whether the accept loop is still running.
    pub fn is_serving(&self) -> bool {
        !self.server.is_finished()
    }

    /// Stops the receiver and waits for it to finish.
    pub async fn stop(self) -> Result<()> {
        self.cancel.cancel();
        self.server.await??;
        Ok(())
    }

    pub fn work_dir(&self) -> &Path {
        self.dir.path()
    }
}
