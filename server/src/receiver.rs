//! Receiving side of a transfer session.
//!
//! The receiver answers the sender's header with the index of the first file
//! it wants, then receives files one at a time. After each file it replies
//! with the outcome and the next wanted index. Files whose content is already
//! stored in the sender's namespace are skipped without being requested.

use {
    crate::{
        keys::KeyStore,
        storage::{Namespace, Storage},
    },
    sealpost_protocol::{
        ClientIdentity, FileStatus, Manifest,
        codec::{
            HEADER_PREFIX_LEN, Response, TransferStatus, decode_header, decode_header_prefix,
            encode_response,
        },
    },
    sealpost_sdk::{
        SessionOptions, TransferError,
        crypto::{CipherSession, receive_decrypted},
        net,
    },
    tokio::{
        io::{AsyncRead, AsyncWrite},
        task::block_in_place,
    },
    tracing::{debug, info, warn},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The sender has no key; it got the sentinel response.
    Unauthorized,
    /// The sender's key was revoked on its own request.
    Burned,
    Completed {
        transferred: usize,
        duplicate: usize,
        failed: usize,
    },
}

/// State of one session after the header has been accepted.
#[derive(Debug)]
pub struct TransferContext {
    manifest: Manifest,
    /// 1-based index of the requested file; 0 before the first request.
    cursor: u16,
    cipher: CipherSession,
    identity: ClientIdentity,
    namespace: Namespace,
}

impl TransferContext {
    #[inline]
    pub fn new(
        manifest: Manifest,
        cipher: CipherSession,
        identity: ClientIdentity,
        namespace: Namespace,
    ) -> Self {
        Self {
            manifest,
            cursor: 0,
            cipher,
            identity,
            namespace,
        }
    }

    #[must_use]
    #[inline]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Moves the cursor to the next file whose content is not stored yet,
    /// marking the skipped ones as duplicates.
    ///
    /// Returns the new cursor, which is `len + 1` when no file is left.
    #[inline]
    pub fn advance(&mut self) -> Result<u16, TransferError> {
        loop {
            self.cursor = self.cursor.saturating_add(1);
            let Some(entry) = self.manifest.entry_mut(self.cursor) else {
                self.cursor = self.manifest.end_index();
                return Ok(self.cursor);
            };
            if !block_in_place(|| self.namespace.is_duplicate(&entry.hash))? {
                return Ok(self.cursor);
            }
            debug!(identity = %self.identity, name = %entry.name, "skipping duplicate");
            entry.status = FileStatus::Duplicate;
        }
    }

    fn set_status(&mut self, status: FileStatus) {
        if let Some(entry) = self.manifest.entry_mut(self.cursor) {
            entry.status = status;
        }
    }

    /// Receives the file at the cursor and commits it if its content matches
    /// the announced hash.
    #[inline]
    pub async fn receive_file<S: AsyncRead + Unpin>(
        &mut self,
        stream: &mut S,
        options: &SessionOptions,
    ) -> Result<TransferStatus, TransferError> {
        let Some(entry) = self.manifest.entry(self.cursor) else {
            return Ok(TransferStatus::Failed);
        };
        let (name, size, expected) = (entry.name.clone(), entry.size, entry.hash);

        let file = block_in_place(|| self.namespace.create_file())?;
        let (file, actual) =
            match receive_decrypted(stream, &mut self.cipher, file, size, options).await {
                Ok(received) => received,
                Err(err) => {
                    self.set_status(FileStatus::Failed);
                    return Err(err);
                }
            };
        let committed =
            block_in_place(|| self.namespace.verify_and_commit(file, &actual, &expected, &name));
        match committed {
            Ok(()) => {
                info!(identity = %self.identity, %name, size, hash = %expected, "received file");
                self.set_status(FileStatus::Transferred);
                Ok(TransferStatus::Ok)
            }
            Err(err) if err.is_per_file() => {
                warn!(identity = %self.identity, %name, ?err, "discarding file");
                self.set_status(FileStatus::Failed);
                Ok(TransferStatus::Failed)
            }
            Err(err) => {
                self.set_status(FileStatus::Failed);
                Err(err)
            }
        }
    }

    #[must_use]
    #[inline]
    pub fn is_done(&self) -> bool {
        self.manifest.entry(self.cursor).is_none()
    }

    fn outcome(&self) -> SessionOutcome {
        SessionOutcome::Completed {
            transferred: self.manifest.count(FileStatus::Transferred),
            duplicate: self.manifest.count(FileStatus::Duplicate),
            failed: self.manifest.count(FileStatus::Failed),
        }
    }
}

/// Runs one session on an accepted connection.
///
/// The key is looked up before anything is read, so a sender without a key
/// gets the sentinel response right away.
#[inline]
pub async fn serve<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    identity: &ClientIdentity,
    keys: &KeyStore,
    storage: &Storage,
    options: &SessionOptions,
) -> Result<SessionOutcome, TransferError> {
    let Some(key) = block_in_place(|| keys.load_key(identity))? else {
        info!(%identity, "rejecting sender without a key");
        net::write_all(stream, &Response::SENTINEL.to_bytes(), options).await?;
        return Ok(SessionOutcome::Unauthorized);
    };

    let mut header = vec![0; HEADER_PREFIX_LEN];
    net::read_exact(stream, &mut header, options).await?;
    let prefix = decode_header_prefix(&header)?;
    if prefix.is_burn() {
        block_in_place(|| keys.revoke_key(identity))?;
        info!(%identity, "key burned on sender's request");
        net::write_all(stream, &Response::SENTINEL.to_bytes(), options).await?;
        return Ok(SessionOutcome::Burned);
    }

    header.resize(HEADER_PREFIX_LEN.saturating_add(prefix.entries_len()), 0);
    let (_, entries) = header.split_at_mut(HEADER_PREFIX_LEN);
    net::read_exact(stream, entries, options).await?;
    let manifest = decode_header(&header)?;
    info!(%identity, files = manifest.len(), "transfer started");

    let cipher = CipherSession::open(key.as_bytes(), manifest.init_vector())?;
    let namespace = block_in_place(|| storage.namespace(identity))?;
    let mut transfer = TransferContext::new(manifest, cipher, identity.clone(), namespace);

    let first = transfer.advance()?;
    net::write_all(
        stream,
        &encode_response(first, TransferStatus::Ok),
        options,
    )
    .await?;
    while !transfer.is_done() {
        let status = transfer.receive_file(stream, options).await?;
        let next = transfer.advance()?;
        net::write_all(stream, &encode_response(next, status), options).await?;
    }

    let outcome = transfer.outcome();
    info!(%identity, ?outcome, "transfer finished");
    Ok(outcome)
}
