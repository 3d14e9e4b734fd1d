use {
    fs_err as fs,
    sealpost_protocol::{
        ClientIdentity,
        credentials::{KEY_LEN, TransferKey},
    },
    std::{
        io,
        path::{Path, PathBuf},
    },
    tracing::warn,
};

/// Transfer keys of known senders, one file per identity.
///
/// A key file holds exactly [`KEY_LEN`] raw bytes and is named after the
/// sender's identity.
#[derive(Debug)]
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    #[inline]
    pub fn new(dir: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    #[must_use]
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, identity: &ClientIdentity) -> PathBuf {
        self.dir.join(identity.as_str())
    }

    /// Returns the identity's key, or `None` if it has no usable key.
    #[inline]
    pub fn load_key(&self, identity: &ClientIdentity) -> io::Result<Option<TransferKey>> {
        let bytes = match fs::read(self.key_path(identity)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        match TransferKey::from_slice(&bytes) {
            Ok(key) => Ok(Some(key)),
            Err(err) => {
                warn!(%identity, ?err, "ignoring malformed key file");
                Ok(None)
            }
        }
    }

    /// Deletes the identity's key. Returns `false` if there was none.
    #[inline]
    pub fn revoke_key(&self, identity: &ClientIdentity) -> io::Result<bool> {
        match fs::remove_file(self.key_path(identity)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    #[inline]
    pub fn store_key(&self, identity: &ClientIdentity, key: &TransferKey) -> io::Result<()> {
        key.write_to(self.key_path(identity))
    }

    /// Identities that currently hold a key of the right length, sorted.
    #[inline]
    pub fn identities(&self) -> io::Result<Vec<ClientIdentity>> {
        let mut identities = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() || usize::try_from(metadata.len()).ok() != Some(KEY_LEN) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                identities.push(ClientIdentity::from_stored(name));
            }
        }
        identities.sort();
        Ok(identities)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, tempfile::TempDir};

    #[test]
    fn store_load_revoke() {
        let dir = TempDir::new().unwrap();
        let keys = KeyStore::new(dir.path().join("keys")).unwrap();
        let identity = ClientIdentity::from_stored("127.0.0.1:6061");

        assert!(keys.load_key(&identity).unwrap().is_none());
        let key = TransferKey::generate();
        keys.store_key(&identity, &key).unwrap();
        assert_eq!(keys.load_key(&identity).unwrap(), Some(key));
        assert_eq!(keys.identities().unwrap(), vec![identity.clone()]);

        assert!(keys.revoke_key(&identity).unwrap());
        assert!(keys.load_key(&identity).unwrap().is_none());
        assert!(!keys.revoke_key(&identity).unwrap());
        assert!(keys.identities().unwrap().is_empty());
    }

    #[test]
    fn malformed_key_is_ignored() {
        let dir = TempDir::new().unwrap();
        let keys = KeyStore::new(dir.path().to_owned()).unwrap();
        let identity = ClientIdentity::from_stored("10.0.0.1:7000");
        fs::write(dir.path().join(identity.as_str()), [0; 16]).unwrap();
        assert!(keys.load_key(&identity).unwrap().is_none());
        assert!(keys.identities().unwrap().is_empty());
    }
}
