//! Pieces of a sealpost transfer session that the sender and the receiver
//! share: the chunk cipher, content digests and socket helpers.

pub mod content;
pub mod crypto;
pub mod error;
pub mod net;
pub mod signal;

pub use crate::{error::TransferError, net::SessionOptions};
