use {
    super::CipherError,
    aes::{Aes256, Block},
    cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit},
    sealpost_protocol::{CHUNK_SIZE, credentials::InitVector},
    std::fmt,
};

const BLOCK_LEN: usize = 16;

/// Cipher state of one transfer session.
///
/// Holds an encrypting and a decrypting chain, both started from the session
/// IV. A side uses only one of them: the sender encrypts, the receiver
/// decrypts.
pub struct CipherSession {
    encryptor: cbc::Encryptor<Aes256>,
    decryptor: cbc::Decryptor<Aes256>,
}

impl CipherSession {
    #[inline]
    pub fn open(key: &[u8], init_vector: &InitVector) -> Result<Self, CipherError> {
        let invalid_key = |_| CipherError::InvalidKeyLength { actual: key.len() };
        let iv = init_vector.as_bytes();
        Ok(Self {
            encryptor: cbc::Encryptor::new_from_slices(key, iv).map_err(invalid_key)?,
            decryptor: cbc::Decryptor::new_from_slices(key, iv).map_err(invalid_key)?,
        })
    }

    /// Encrypts one full chunk in place, continuing the chain.
    #[inline]
    pub fn encrypt_chunk(&mut self, chunk: &mut [u8]) -> Result<(), CipherError> {
        check_chunk(chunk)?;
        for block in chunk.chunks_exact_mut(BLOCK_LEN) {
            self.encryptor
                .encrypt_block_mut(Block::from_mut_slice(block));
        }
        Ok(())
    }

    /// Decrypts one full chunk in place, continuing the chain.
    #[inline]
    pub fn decrypt_chunk(&mut self, chunk: &mut [u8]) -> Result<(), CipherError> {
        check_chunk(chunk)?;
        for block in chunk.chunks_exact_mut(BLOCK_LEN) {
            self.decryptor
                .decrypt_block_mut(Block::from_mut_slice(block));
        }
        Ok(())
    }
}

impl fmt::Debug for CipherSession {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherSession").finish_non_exhaustive()
    }
}

fn check_chunk(chunk: &[u8]) -> Result<(), CipherError> {
    if chunk.len() == CHUNK_SIZE {
        Ok(())
    } else {
        Err(CipherError::ChunkSize {
            actual: chunk.len(),
        })
    }
}
