//! Socket operations bounded by a timeout and a cancellation token.

use {
    crate::error::{Interruption, TransferError},
    std::{future::Future, io, net::SocketAddr, time::Duration},
    tokio::{
        io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
        net::{TcpSocket, TcpStream},
        time::timeout,
    },
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Limits applied to every socket operation of a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub io_timeout: Duration,
    pub cancel: CancellationToken,
}

impl SessionOptions {
    #[must_use]
    #[inline]
    pub fn new(io_timeout: Duration, cancel: CancellationToken) -> Self {
        Self { io_timeout, cancel }
    }

    #[inline]
    pub fn check_cancelled(&self) -> Result<(), TransferError> {
        if self.cancel.is_cancelled() {
            Err(TransferError::Interrupted(Interruption::Cancelled))
        } else {
            Ok(())
        }
    }
}

impl Default for SessionOptions {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_IO_TIMEOUT, CancellationToken::new())
    }
}

/// Opens a connection to `remote`, optionally from a fixed local address.
///
/// The receiver identifies a sender by its address, so the local port is
/// bound with `SO_REUSEADDR` to allow reusing it right after a session.
#[inline]
pub async fn connect(
    remote: SocketAddr,
    local: Option<SocketAddr>,
    connect_timeout: Duration,
) -> io::Result<TcpStream> {
    let socket = if remote.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    if let Some(local) = local {
        socket.set_reuseaddr(true)?;
        socket.bind(local)?;
    }
    timeout(connect_timeout, socket.connect(remote))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))?
}

fn classify(err: io::Error) -> TransferError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => TransferError::Interrupted(Interruption::PeerClosed),
        io::ErrorKind::TimedOut => TransferError::Interrupted(Interruption::TimedOut),
        _ => TransferError::Io(err),
    }
}

async fn bounded<T>(
    options: &SessionOptions,
    operation: impl Future<Output = io::Result<T>>,
) -> Result<T, TransferError> {
    tokio::select! {
        () = options.cancel.cancelled() => {
            Err(TransferError::Interrupted(Interruption::Cancelled))
        }
        result = timeout(options.io_timeout, operation) => match result {
            Ok(result) => result.map_err(classify),
            Err(_) => Err(TransferError::Interrupted(Interruption::TimedOut)),
        }
    }
}

#[inline]
pub async fn read_exact<R: AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut [u8],
    options: &SessionOptions,
) -> Result<(), TransferError> {
    bounded(options, stream.read_exact(buf)).await?;
    Ok(())
}

#[inline]
pub async fn write_all<W: AsyncWrite + Unpin>(
    stream: &mut W,
    buf: &[u8],
    options: &SessionOptions,
) -> Result<(), TransferError> {
    bounded(options, async {
        stream.write_all(buf).await?;
        stream.flush().await
    })
    .await
}

/// Waits until the peer closes the connection. Any data it still sends is discarded.
#[inline]
pub async fn await_close<R: AsyncRead + Unpin>(
    stream: &mut R,
    options: &SessionOptions,
) -> Result<(), TransferError> {
    let mut buf = [0; 64];
    loop {
        match bounded(options, stream.read(&mut buf)).await {
            Ok(0) | Err(TransferError::Interrupted(Interruption::PeerClosed)) => return Ok(()),
            Ok(len) => debug!(len, "discarding data received after the last response"),
            Err(err) => return Err(err),
        }
    }
}
