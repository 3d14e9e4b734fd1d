use {
    crate::crypto::CipherError,
    derive_more::Display,
    sealpost_protocol::ProtocolError,
    std::io,
    thiserror::Error,
};

/// Reason a session stopped before the protocol finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Interruption {
    #[display("cancelled")]
    Cancelled,
    #[display("peer closed the connection")]
    PeerClosed,
    #[display("timed out")]
    TimedOut,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// Received content does not match the digest announced in the header.
    #[error("content of {name:?} does not match its announced hash")]
    IntegrityMismatch { name: String },

    #[error("receiver has no key for this sender")]
    Unauthorized,

    #[error("transfer interrupted: {0}")]
    Interrupted(Interruption),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TransferError {
    /// Whether the error ends only the current file rather than the session.
    #[must_use]
    #[inline]
    pub fn is_per_file(&self) -> bool {
        matches!(self, Self::IntegrityMismatch { .. })
    }
}
