use thiserror::Error;

/// Malformed or unexpected protocol data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Buffer ends before the structure it should contain.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("too many files in one transfer: {0}")]
    TooManyFiles(usize),

    #[error("file {name:?} is too large to transfer: {size} bytes")]
    FileTooLarge { name: String, size: u64 },

    #[error("invalid transfer status byte: {0}")]
    InvalidStatus(u8),

    /// The receiver asked for a file that does not follow the previous one.
    #[error("receiver requested file {next} after file {previous}")]
    UnexpectedIndex { previous: u16, next: u16 },

    #[error("receiver did not acknowledge the burn request")]
    BurnNotAcknowledged,
}
