use {
    fs_err as fs,
    rand::RngCore,
    std::{fmt, io, path::Path},
    thiserror::Error,
};

/// Length of a transfer key (AES-256).
pub const KEY_LEN: usize = 32;

/// Length of the per-session initialization vector.
pub const IV_LEN: usize = 16;

#[derive(Debug, Error)]
#[error("invalid key length; got {actual}, expected {KEY_LEN}")]
pub struct InvalidKeyLength {
    pub actual: usize,
}

/// Secret shared by a sender and the receiver, used to encrypt file content.
///
/// Provisioned out of band. Each sender identity has its own key.
#[derive(Clone, PartialEq, Eq)]
pub struct TransferKey([u8; KEY_LEN]);

impl TransferKey {
    #[must_use]
    #[inline]
    pub fn generate() -> Self {
        let mut key = [0; KEY_LEN];
        rand::rng().fill_bytes(&mut key);
        Self(key)
    }

    #[inline]
    pub fn from_slice(bytes: &[u8]) -> Result<Self, InvalidKeyLength> {
        <[u8; KEY_LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| InvalidKeyLength {
                actual: bytes.len(),
            })
    }

    /// Reads a key file containing exactly [`KEY_LEN`] raw bytes.
    #[inline]
    pub fn read_from(path: impl AsRef<Path>) -> io::Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        Self::from_slice(&bytes).map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}: {err}", path.as_ref().display()),
            )
        })
    }

    #[inline]
    pub fn write_to(&self, path: impl AsRef<Path>) -> io::Result<()> {
        fs::write(path, self.0)
    }

    #[must_use]
    #[inline]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for TransferKey {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferKey").finish()
    }
}

/// Initialization vector of one transfer session. Never reused across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitVector([u8; IV_LEN]);

impl InitVector {
    #[must_use]
    #[inline]
    pub fn generate() -> Self {
        let mut iv = [0; IV_LEN];
        // An all-zero vector together with a zero file count reads as a burn
        // request on the receiver.
        while iv == [0; IV_LEN] {
            rand::rng().fill_bytes(&mut iv);
        }
        Self(iv)
    }

    #[must_use]
    #[inline]
    pub const fn from_bytes(bytes: [u8; IV_LEN]) -> Self {
        Self(bytes)
    }

    #[must_use]
    #[inline]
    pub fn as_bytes(&self) -> &[u8; IV_LEN] {
        &self.0
    }
}
