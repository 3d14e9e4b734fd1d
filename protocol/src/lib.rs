//! Wire format and data model shared by the sealpost sender and receiver.
//!
//! A transfer session starts with a header describing every offered file,
//! followed by a request/response exchange in which the receiver asks for
//! files one at a time by their 1-based index. See [`codec`] for the byte
//! layout.

pub mod codec;
pub mod credentials;
mod error;
pub mod manifest;

pub use crate::{
    error::ProtocolError,
    manifest::{FileEntry, FileStatus, Manifest},
};
use {
    derive_more::Display,
    serde::{Deserialize, Serialize},
    std::{fmt, net::SocketAddr},
};

/// Length of a SHA-512 digest.
pub const HASH_LEN: usize = 64;

/// Fixed width of the file name field in the header.
pub const NAME_LEN: usize = 255;

/// Number of bytes of file content encrypted as one unit.
///
/// Must be a multiple of the AES block size. File content on the wire is
/// always a whole number of chunks.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Port the receiver listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 6060;

/// SHA-512 digest of raw (unencrypted) file content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; HASH_LEN]);

impl ContentHash {
    #[must_use]
    #[inline]
    pub const fn new(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    #[must_use]
    #[inline]
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Name under which content with this hash is stored by the receiver.
    #[must_use]
    #[inline]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

/// Identifies a sender by the address it connects from.
///
/// Used both to look up the sender's key and as the name of its storage
/// namespace on the receiver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// IPv4 peers seen through a dual-stack listener keep their IPv4 form.
    #[must_use]
    #[inline]
    pub fn from_peer(addr: SocketAddr) -> Self {
        Self(format!("{}:{}", addr.ip().to_canonical(), addr.port()))
    }

    /// Restores an identity from its stored form, e.g. a key file name.
    #[must_use]
    #[inline]
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
