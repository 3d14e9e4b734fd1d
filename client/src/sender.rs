//! Sending side of a transfer session.

use {
    fs_err::File,
    sealpost_protocol::{
        FileStatus, Manifest, ProtocolError,
        codec::{RESPONSE_LEN, Response, TransferStatus, burn_header, decode_response, encode_header},
        credentials::{InitVector, TransferKey},
        manifest::MAX_FILES,
    },
    sealpost_sdk::{
        SessionOptions, TransferError,
        content::describe_file,
        crypto::{CipherSession, send_encrypted},
        net,
    },
    std::path::{Path, PathBuf},
    tokio::{
        io::{AsyncRead, AsyncWrite},
        task::block_in_place,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

/// Files of one session together with where to read them from.
#[derive(Debug)]
pub struct Outgoing {
    manifest: Manifest,
    sources: Vec<PathBuf>,
}

impl Outgoing {
    #[must_use]
    #[inline]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn source(&self, index: u16) -> Option<&Path> {
        let position = usize::from(index.checked_sub(1)?);
        self.sources.get(position).map(PathBuf::as_path)
    }

    fn set_status(&mut self, index: u16, status: FileStatus) {
        if let Some(entry) = self.manifest.entry_mut(index) {
            entry.status = status;
        }
    }
}

/// Describes the files to send and picks a fresh IV. Reads every file once to hash it.
///
/// Must be called from a blocking context.
#[inline]
pub fn prepare(paths: &[PathBuf], cancel: &CancellationToken) -> Result<Outgoing, TransferError> {
    if paths.len() > MAX_FILES {
        return Err(ProtocolError::TooManyFiles(paths.len()).into());
    }
    let mut manifest = Manifest::new(InitVector::generate());
    for path in paths {
        let entry = describe_file(path, cancel)?;
        debug!(name = %entry.name, size = entry.size, hash = %entry.hash, "prepared file");
        manifest.push(entry);
    }
    Ok(Outgoing {
        manifest,
        sources: paths.to_vec(),
    })
}

async fn read_response<S: AsyncRead + Unpin>(
    stream: &mut S,
    options: &SessionOptions,
) -> Result<Response, TransferError> {
    let mut buf = [0; RESPONSE_LEN];
    net::read_exact(stream, &mut buf, options).await?;
    Ok(decode_response(&buf)?)
}

async fn send_file<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    cipher: &mut CipherSession,
    path: &Path,
    size: u32,
    options: &SessionOptions,
) -> Result<Response, TransferError> {
    let file = block_in_place(|| File::open(path))?;
    send_encrypted(stream, cipher, file, size, options).await?;
    read_response(stream, options).await
}

/// Runs a transfer session, updating the status of every entry of `outgoing`.
///
/// Entries the receiver never asks for are marked as duplicates once the
/// session ends normally.
#[inline]
pub async fn send<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    key: &TransferKey,
    outgoing: &mut Outgoing,
    options: &SessionOptions,
) -> Result<(), TransferError> {
    let header = encode_header(&outgoing.manifest)?;
    // A receiver without our key replies before reading the header and
    // closes, so a failed write may still be followed by its reply.
    let written = net::write_all(stream, &header, options).await;
    let response = match (written, read_response(stream, options).await) {
        (_, Ok(response)) if response.is_sentinel() => return Err(TransferError::Unauthorized),
        (Err(err), _) | (Ok(()), Err(err)) => return Err(err),
        (Ok(()), Ok(response)) => response,
    };
    let mut cipher = CipherSession::open(key.as_bytes(), outgoing.manifest.init_vector())?;

    let mut previous = 0;
    let mut index = response.next_index;
    while let Some(entry) = outgoing.manifest.entry(index) {
        if index <= previous {
            return Err(ProtocolError::UnexpectedIndex {
                previous,
                next: index,
            }
            .into());
        }
        let (name, size) = (entry.name.clone(), entry.size);
        let Some(path) = outgoing.source(index).map(Path::to_path_buf) else {
            break;
        };

        let response = match send_file(stream, &mut cipher, &path, size, options).await {
            Ok(response) => response,
            Err(err) => {
                outgoing.set_status(index, FileStatus::Failed);
                return Err(err);
            }
        };
        if response.is_sentinel() {
            // Later files stay pending.
            warn!(%name, "receiver no longer accepts this sender");
            outgoing.set_status(index, FileStatus::Failed);
            return Err(TransferError::Unauthorized);
        }
        match response.status {
            TransferStatus::Ok => {
                info!(%name, size, "sent file");
                outgoing.set_status(index, FileStatus::Transferred);
            }
            TransferStatus::Failed => {
                warn!(%name, "receiver rejected file");
                outgoing.set_status(index, FileStatus::Failed);
            }
        }
        previous = index;
        index = response.next_index;
    }

    for entry in outgoing.manifest.entries_mut() {
        if entry.status == FileStatus::Pending {
            debug!(name = %entry.name, "receiver already has file");
            entry.status = FileStatus::Duplicate;
        }
    }
    net::await_close(stream, options).await
}

/// Asks the receiver to delete the key of this sender.
#[inline]
pub async fn burn<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    options: &SessionOptions,
) -> Result<(), TransferError> {
    net::write_all(stream, &burn_header(), options).await?;
    let response = read_response(stream, options).await?;
    if !response.is_sentinel() {
        return Err(ProtocolError::BurnNotAcknowledged.into());
    }
    net::await_close(stream, options).await
}

#[cfg(test)]
#[expect(
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    reason = "test"
)]
mod tests {
    use {
        super::*,
        sealpost_protocol::codec::{HEADER_PREFIX_LEN, decode_header, encode_response},
        tempfile::TempDir,
        tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex},
    };

    fn outgoing(dir: &TempDir, files: &[(&str, &str)]) -> Outgoing {
        let paths: Vec<PathBuf> = files
            .iter()
            .map(|(name, content)| {
                let path = dir.path().join(name);
                fs_err::write(&path, content).unwrap();
                path
            })
            .collect();
        prepare(&paths, &CancellationToken::new()).unwrap()
    }

    async fn read_header(stream: &mut DuplexStream) -> Manifest {
        let mut header = vec![0; HEADER_PREFIX_LEN];
        stream.read_exact(&mut header).await.unwrap();
        let count = u16::from_be_bytes([header[0], header[1]]);
        let mut entries = vec![0; sealpost_protocol::codec::header_len(count) - HEADER_PREFIX_LEN];
        stream.read_exact(&mut entries).await.unwrap();
        header.extend_from_slice(&entries);
        decode_header(&header).unwrap()
    }

    #[test]
    fn prepare_describes_files() {
        let dir = TempDir::new().unwrap();
        let outgoing = outgoing(&dir, &[("a.txt", "hi"), ("b.txt", "hello")]);
        let entries = outgoing.manifest().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.txt");
        assert_eq!(entries[1].size, 5);
        assert_eq!(outgoing.source(2), Some(dir.path().join("b.txt").as_path()));
        assert_eq!(outgoing.source(0), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sentinel_is_unauthorized() {
        let dir = TempDir::new().unwrap();
        let mut outgoing = outgoing(&dir, &[("a.txt", "hi")]);
        let (mut client, mut server) = duplex(1 << 16);
        server
            .write_all(&Response::SENTINEL.to_bytes())
            .await
            .unwrap();
        let err = send(
            &mut client,
            &TransferKey::generate(),
            &mut outgoing,
            &SessionOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransferError::Unauthorized));
        assert_eq!(outgoing.manifest().count(FileStatus::Pending), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn nothing_requested() {
        let dir = TempDir::new().unwrap();
        let key = TransferKey::generate();
        let options = SessionOptions::default();
        let mut outgoing = outgoing(&dir, &[("a.txt", "hi"), ("b.txt", "ho")]);
        let (mut client, mut server) = duplex(1 << 16);
        let (result, ()) = tokio::join!(
            send(&mut client, &key, &mut outgoing, &options),
            async {
                let manifest = read_header(&mut server).await;
                assert_eq!(manifest.len(), 2);
                server
                    .write_all(&encode_response(3, TransferStatus::Ok))
                    .await
                    .unwrap();
                server.shutdown().await.unwrap();
            }
        );
        result.unwrap();
        assert_eq!(outgoing.manifest().count(FileStatus::Duplicate), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn index_must_move_forward() {
        let dir = TempDir::new().unwrap();
        let key = TransferKey::generate();
        let options = SessionOptions::default();
        let mut outgoing = outgoing(&dir, &[("a.txt", "hi"), ("b.txt", "ho")]);
        let (mut client, mut server) = duplex(1 << 17);
        let (result, ()) = tokio::join!(
            send(&mut client, &key, &mut outgoing, &options),
            async {
                read_header(&mut server).await;
                server
                    .write_all(&encode_response(1, TransferStatus::Ok))
                    .await
                    .unwrap();
                let mut chunk = vec![0; sealpost_protocol::CHUNK_SIZE];
                server.read_exact(&mut chunk).await.unwrap();
                // Asks for the same file again.
                server
                    .write_all(&encode_response(1, TransferStatus::Ok))
                    .await
                    .unwrap();
            }
        );
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            TransferError::Protocol(ProtocolError::UnexpectedIndex {
                previous: 1,
                next: 1
            })
        ));
        assert_eq!(
            outgoing.manifest().entry(1).unwrap().status,
            FileStatus::Transferred
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn receiver_closing_mid_file_fails_entry() {
        let dir = TempDir::new().unwrap();
        let key = TransferKey::generate();
        let options = SessionOptions::default();
        let mut outgoing = outgoing(&dir, &[("a.txt", "hi")]);
        let (mut client, mut server) = duplex(1 << 16);
        let (result, ()) = tokio::join!(
            send(&mut client, &key, &mut outgoing, &options),
            async {
                read_header(&mut server).await;
                server
                    .write_all(&encode_response(1, TransferStatus::Ok))
                    .await
                    .unwrap();
                server.shutdown().await.unwrap();
            }
        );
        assert!(matches!(
            result.unwrap_err(),
            TransferError::Interrupted(sealpost_sdk::error::Interruption::PeerClosed)
        ));
        assert_eq!(
            outgoing.manifest().entry(1).unwrap().status,
            FileStatus::Failed
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sentinel_after_file_is_unauthorized() {
        let dir = TempDir::new().unwrap();
        let key = TransferKey::generate();
        let options = SessionOptions::default();
        let mut outgoing = outgoing(&dir, &[("a.txt", "hi"), ("b.txt", "ho")]);
        let (mut client, mut server) = duplex(1 << 17);
        let (result, ()) = tokio::join!(
            send(&mut client, &key, &mut outgoing, &options),
            async {
                read_header(&mut server).await;
                server
                    .write_all(&encode_response(1, TransferStatus::Ok))
                    .await
                    .unwrap();
                let mut chunk = vec![0; sealpost_protocol::CHUNK_SIZE];
                server.read_exact(&mut chunk).await.unwrap();
                server
                    .write_all(&Response::SENTINEL.to_bytes())
                    .await
                    .unwrap();
            }
        );
        assert!(matches!(result.unwrap_err(), TransferError::Unauthorized));
        let manifest = outgoing.manifest();
        assert_eq!(manifest.entry(1).unwrap().status, FileStatus::Failed);
        assert_eq!(manifest.entry(2).unwrap().status, FileStatus::Pending);
        assert_eq!(manifest.count(FileStatus::Duplicate), 0);
    }

    #[tokio::test]
    async fn burn_needs_sentinel() {
        let (mut client, mut server) = duplex(1 << 10);
        server
            .write_all(&encode_response(1, TransferStatus::Ok))
            .await
            .unwrap();
        let err = burn(&mut client, &SessionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::Protocol(ProtocolError::BurnNotAcknowledged)
        ));

        let (mut client, mut server) = duplex(1 << 10);
        server
            .write_all(&Response::SENTINEL.to_bytes())
            .await
            .unwrap();
        server.shutdown().await.unwrap();
        burn(&mut client, &SessionOptions::default()).await.unwrap();
        drop(client);
        let mut sent = Vec::new();
        server.read_to_end(&mut sent).await.unwrap();
        assert_eq!(sent, burn_header());
    }
}
