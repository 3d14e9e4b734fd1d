//! File content is encrypted with AES-256 in CBC mode.
//!
//! Each session has one chain per direction, keyed with the sender's transfer
//! key and started from the IV announced in the header. The chain runs
//! through all files of the session and is never reset.
//!
//! Content is processed in chunks of [`CHUNK_SIZE`] bytes. A file of `size`
//! bytes occupies exactly `ceil(size / CHUNK_SIZE)` chunks on the wire. The
//! tail of the last chunk is filled with random bytes before encryption, and
//! the receiver drops everything past the declared size. There is no PKCS
//! padding, so plaintext and ciphertext chunks have the same length.
//!
//! Integrity is not provided by the cipher. The receiver hashes the decrypted
//! content and compares it to the digest from the header.
//!
//! [`CHUNK_SIZE`]: sealpost_protocol::CHUNK_SIZE

mod cipher;
mod io;

pub use {
    cipher::CipherSession,
    io::{HashingWriter, chunk_count, receive_decrypted, send_encrypted},
};
use {sealpost_protocol::credentials::KEY_LEN, thiserror::Error};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("invalid key length; got {actual}, expected {KEY_LEN}")]
    InvalidKeyLength { actual: usize },

    #[error("invalid chunk length: {actual}")]
    ChunkSize { actual: usize },
}
