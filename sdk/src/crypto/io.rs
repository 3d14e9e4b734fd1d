use {
    super::CipherSession,
    crate::{TransferError, net, net::SessionOptions},
    rand::RngCore,
    sealpost_protocol::{CHUNK_SIZE, ContentHash, HASH_LEN},
    sha2::{Digest, Sha512},
    std::io::{self, Read, Write},
    tokio::{
        io::{AsyncRead, AsyncWrite},
        task::block_in_place,
    },
};

/// Passes through any writes and calculates the SHA-512 of the written data.
pub struct HashingWriter<W> {
    hasher: Sha512,
    inner: W,
}

impl<W> HashingWriter<W> {
    #[inline]
    pub fn new(inner: W) -> Self {
        Self {
            hasher: Sha512::new(),
            inner,
        }
    }

    #[inline]
    pub fn finish(mut self) -> io::Result<(W, ContentHash)>
    where
        W: Write,
    {
        self.inner.flush()?;
        let mut hash = [0; HASH_LEN];
        hash.copy_from_slice(&self.hasher.finalize());
        Ok((self.inner, ContentHash::new(hash)))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = self.inner.write(buf)?;
        if let Some(written) = buf.get(..len) {
            self.hasher.update(written);
        }
        Ok(len)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn content_len(size: u32) -> usize {
    usize::try_from(size).unwrap_or(usize::MAX)
}

/// Number of chunks a file of `size` bytes occupies on the wire.
#[must_use]
#[inline]
pub fn chunk_count(size: u32) -> usize {
    content_len(size).div_ceil(CHUNK_SIZE)
}

/// Encrypts `size` bytes of `input` and writes them to `output`.
///
/// The tail of the last chunk is filled with random bytes.
#[inline]
pub async fn send_encrypted<W: AsyncWrite + Unpin>(
    output: &mut W,
    session: &mut CipherSession,
    mut input: impl Read,
    size: u32,
    options: &SessionOptions,
) -> Result<(), TransferError> {
    let mut chunk = vec![0; CHUNK_SIZE];
    let mut remaining = content_len(size);
    while remaining > 0 {
        options.check_cancelled()?;
        let len = remaining.min(CHUNK_SIZE);
        let (content, filler) = chunk.split_at_mut(len);
        block_in_place(|| input.read_exact(content))?;
        rand::rng().fill_bytes(filler);
        session.encrypt_chunk(&mut chunk)?;
        net::write_all(output, &chunk, options).await?;
        remaining = remaining.saturating_sub(len);
    }
    Ok(())
}

/// Reads the chunks of one file from `input`, decrypts them and writes the
/// first `size` bytes to `output`.
///
/// Returns `output` and the SHA-512 of the content written to it.
#[inline]
pub async fn receive_decrypted<R: AsyncRead + Unpin, W: Write>(
    input: &mut R,
    session: &mut CipherSession,
    output: W,
    size: u32,
    options: &SessionOptions,
) -> Result<(W, ContentHash), TransferError> {
    let mut writer = HashingWriter::new(output);
    let mut chunk = vec![0; CHUNK_SIZE];
    let mut remaining = content_len(size);
    while remaining > 0 {
        options.check_cancelled()?;
        net::read_exact(input, &mut chunk, options).await?;
        session.decrypt_chunk(&mut chunk)?;
        let len = remaining.min(CHUNK_SIZE);
        let (content, _filler) = chunk.split_at(len);
        block_in_place(|| writer.write_all(content))?;
        remaining = remaining.saturating_sub(len);
    }
    Ok(block_in_place(|| writer.finish())?)
}
