use {
    crate::{TransferError, crypto::HashingWriter, error::Interruption},
    fs_err::File,
    sealpost_protocol::{CHUNK_SIZE, ContentHash, FileEntry, ProtocolError},
    std::{
        io::{self, Read, Write},
        path::Path,
    },
    tokio_util::sync::CancellationToken,
};

/// Calculates the SHA-512 of a file, reading it in chunks.
///
/// Checks `cancel` between reads. Must be called from a blocking context.
#[inline]
pub fn digest_file(
    path: impl AsRef<Path>,
    cancel: &CancellationToken,
) -> Result<ContentHash, TransferError> {
    let mut file = File::open(path.as_ref())?;
    let mut hasher = HashingWriter::new(io::sink());
    let mut buf = vec![0; CHUNK_SIZE];
    loop {
        if cancel.is_cancelled() {
            return Err(TransferError::Interrupted(Interruption::Cancelled));
        }
        let len = file.read(&mut buf)?;
        if len == 0 {
            break;
        }
        let (read, _) = buf.split_at(len);
        hasher.write_all(read)?;
    }
    Ok(hasher.finish()?.1)
}

/// Builds the header entry of a local file: base name, size and digest.
#[inline]
pub fn describe_file(
    path: impl AsRef<Path>,
    cancel: &CancellationToken,
) -> Result<FileEntry, TransferError> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} does not name a file", path.display()),
            )
        })?;
    let metadata = fs_err::metadata(path)?;
    if !metadata.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", path.display()),
        )
        .into());
    }
    let size = u32::try_from(metadata.len()).map_err(|_| ProtocolError::FileTooLarge {
        name: name.clone(),
        size: metadata.len(),
    })?;
    let hash = digest_file(path, cancel)?;
    Ok(FileEntry::new(name, size, hash))
}

#[cfg(test)]
#[expect(
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::indexing_slicing,
    reason = "test"
)]
mod tests {
    use {
        super::*,
        sealpost_protocol::FileStatus,
        sha2::{Digest, Sha512},
        tempfile::TempDir,
    };

    #[test]
    fn digest_matches_one_shot_hash() {
        let dir = TempDir::new().unwrap();
        for len in [0, 5, CHUNK_SIZE, CHUNK_SIZE * 2 + 1] {
            let content: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let path = dir.path().join(format!("file{len}"));
            fs_err::write(&path, &content).unwrap();

            let hash = digest_file(&path, &CancellationToken::new()).unwrap();
            assert_eq!(&hash.as_bytes()[..], &Sha512::digest(&content)[..]);
        }
    }

    #[test]
    fn describe() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs_err::write(&path, "hi").unwrap();
        let entry = describe_file(&path, &CancellationToken::new()).unwrap();
        assert_eq!(entry.name, "a.txt");
        assert_eq!(entry.size, 2);
        assert_eq!(entry.status, FileStatus::Pending);
        assert!(entry.hash.to_hex().starts_with("150a14ed"));

        describe_file(dir.path(), &CancellationToken::new()).unwrap_err();
        describe_file(dir.path().join("missing"), &CancellationToken::new()).unwrap_err();
    }

    #[test]
    fn cancelled_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a");
        fs_err::write(&path, "abc").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = digest_file(&path, &cancel).unwrap_err();
        assert!(matches!(
            err,
            TransferError::Interrupted(Interruption::Cancelled)
        ));
    }
}
