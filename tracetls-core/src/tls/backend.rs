//! Cipher backend capability.
//!
//! Sessions never touch a cryptography library directly. They ask a
//! [`CipherBackend`] for one [`RecordCipher`] per direction and for HMAC
//! contexts, so the record pipeline can be exercised against any
//! implementation. [`RustCryptoBackend`] is the default, built on the
//! RustCrypto block and stream cipher crates.

use cipher::consts::{U16, U5};
use cipher::generic_array::GenericArray;
use cipher::{BlockCipher, BlockDecryptMut, KeyInit, KeyIvInit, StreamCipher};
use rc4::Rc4;
use thiserror::Error;

use super::catalog::BackendAlgorithm;
use super::kdf::{HashAlgorithm, HmacContext};

/// Errors from cipher initialization and decryption.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("{algorithm:?} does not accept a {actual}-byte key")]
    InvalidKeyLength {
        algorithm: BackendAlgorithm,
        actual: usize,
    },

    #[error("{algorithm:?} needs a {expected}-byte IV, got {actual}")]
    InvalidIvLength {
        algorithm: BackendAlgorithm,
        expected: usize,
        actual: usize,
    },

    #[error("Ciphertext length {len} is not a multiple of the {block_size}-byte block")]
    NotBlockAligned { len: usize, block_size: usize },

    #[error("No backend implementation for {0}")]
    UnsupportedAlgorithm(String),
}

/// A keyed, stateful decryptor for one direction of a session.
///
/// Chaining state carries over between calls: the last ciphertext block for
/// CBC modes and the keystream position for RC4. Dropping the cipher
/// releases it.
pub trait RecordCipher: Send {
    /// Decrypt `data` in place.
    fn decrypt_in_place(&mut self, data: &mut [u8]) -> Result<(), CipherError>;

    /// Block size in bytes, 0 for stream ciphers.
    fn block_size(&self) -> usize;
}

/// Source of record ciphers and MAC contexts.
pub trait CipherBackend: Send + Sync {
    /// Create a decryptor keyed with `key` and (for block ciphers) `iv`.
    fn init_cipher(
        &self,
        algorithm: BackendAlgorithm,
        key: &[u8],
        iv: &[u8],
    ) -> Result<Box<dyn RecordCipher>, CipherError>;

    /// Create an HMAC context keyed with `key`.
    fn init_mac(&self, hash: HashAlgorithm, key: &[u8]) -> HmacContext {
        HmacContext::new(hash, key)
    }
}

/// Backend built on the RustCrypto cipher crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustCryptoBackend;

impl CipherBackend for RustCryptoBackend {
    fn init_cipher(
        &self,
        algorithm: BackendAlgorithm,
        key: &[u8],
        iv: &[u8],
    ) -> Result<Box<dyn RecordCipher>, CipherError> {
        match algorithm {
            BackendAlgorithm::Null => Ok(Box::new(NullCipher)),
            BackendAlgorithm::Rc4 => Rc4Cipher::new(key).map(|c| Box::new(c) as Box<dyn RecordCipher>),
            BackendAlgorithm::Des => cbc_cipher::<des::Des>(algorithm, key, iv),
            BackendAlgorithm::TripleDes => cbc_cipher::<des::TdesEde3>(algorithm, key, iv),
            BackendAlgorithm::Aes => match key.len() {
                16 => cbc_cipher::<aes::Aes128>(algorithm, key, iv),
                32 => cbc_cipher::<aes::Aes256>(algorithm, key, iv),
                actual => Err(CipherError::InvalidKeyLength { algorithm, actual }),
            },
            BackendAlgorithm::Rc2 => Err(CipherError::UnsupportedAlgorithm("RC2".to_string())),
        }
    }
}

/// Passthrough used by the NULL cipher.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCipher;

impl RecordCipher for NullCipher {
    fn decrypt_in_place(&mut self, _data: &mut [u8]) -> Result<(), CipherError> {
        Ok(())
    }

    fn block_size(&self) -> usize {
        0
    }
}

// ============================================================================
// CBC
// ============================================================================

struct CbcCipher<C>
where
    C: BlockDecryptMut + BlockCipher,
{
    inner: cbc::Decryptor<C>,
}

fn cbc_cipher<C>(
    algorithm: BackendAlgorithm,
    key: &[u8],
    iv: &[u8],
) -> Result<Box<dyn RecordCipher>, CipherError>
where
    C: BlockDecryptMut + BlockCipher + KeyInit + Send + 'static,
{
    if key.len() != C::key_size() {
        return Err(CipherError::InvalidKeyLength {
            algorithm,
            actual: key.len(),
        });
    }
    if iv.len() != C::block_size() {
        return Err(CipherError::InvalidIvLength {
            algorithm,
            expected: C::block_size(),
            actual: iv.len(),
        });
    }
    let inner = cbc::Decryptor::<C>::new_from_slices(key, iv).map_err(|_| {
        CipherError::InvalidKeyLength {
            algorithm,
            actual: key.len(),
        }
    })?;
    Ok(Box::new(CbcCipher { inner }))
}

impl<C> RecordCipher for CbcCipher<C>
where
    C: BlockDecryptMut + BlockCipher + Send,
{
    fn decrypt_in_place(&mut self, data: &mut [u8]) -> Result<(), CipherError> {
        let block_size = C::block_size();
        if data.len() % block_size != 0 {
            return Err(CipherError::NotBlockAligned {
                len: data.len(),
                block_size,
            });
        }
        for block in data.chunks_exact_mut(block_size) {
            self.inner
                .decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        Ok(())
    }

    fn block_size(&self) -> usize {
        C::block_size()
    }
}

// ============================================================================
// RC4
// ============================================================================

enum Rc4Cipher {
    Export(Rc4<U5>),
    Full(Rc4<U16>),
}

impl Rc4Cipher {
    fn new(key: &[u8]) -> Result<Self, CipherError> {
        let invalid = || CipherError::InvalidKeyLength {
            algorithm: BackendAlgorithm::Rc4,
            actual: key.len(),
        };
        match key.len() {
            5 => Rc4::new_from_slice(key).map(Rc4Cipher::Export).map_err(|_| invalid()),
            16 => Rc4::new_from_slice(key).map(Rc4Cipher::Full).map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

impl RecordCipher for Rc4Cipher {
    fn decrypt_in_place(&mut self, data: &mut [u8]) -> Result<(), CipherError> {
        match self {
            Rc4Cipher::Export(rc4) => rc4.apply_keystream(data),
            Rc4Cipher::Full(rc4) => rc4.apply_keystream(data),
        }
        Ok(())
    }

    fn block_size(&self) -> usize {
        0
    }
}
