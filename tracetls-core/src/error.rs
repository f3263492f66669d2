//! Error types for tracetls-core.
//!
//! Each component has its own error enum next to the code that raises it:
//!
//! - [`HandshakeError`] - malformed, unsupported or unrecognized handshake messages
//! - [`KeyLogError`] - unreadable key log files
//! - [`CipherError`] - cipher initialization and block alignment
//! - [`DecryptionError`] - record opening (too short, oversized fragment, bad DEFLATE stream)
//! - [`SessionError`] - key correlation and negotiation failures
//!
//! [`enum@Error`] wraps all of them for callers that only care that
//! something failed.

use thiserror::Error;

use crate::tls::{CipherError, DecryptionError, HandshakeError, KeyLogError, SessionError};

/// Main error type for tracetls-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Handshake message could not be parsed
    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Key log could not be loaded
    #[error("Key log error: {0}")]
    KeyLog(#[from] KeyLogError),

    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("Decryption error: {0}")]
    Decryption(#[from] DecryptionError),

    /// Per-session failure; the session is undecryptable or the record was dropped
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True if the error only affects the session it was raised for.
    pub fn is_session_local(&self) -> bool {
        match self {
            Error::Handshake(e) => e.is_malformed(),
            Error::Cipher(_) | Error::Decryption(_) | Error::Session(_) => true,
            Error::KeyLog(_) | Error::Io(_) => false,
        }
    }
}

/// Result type alias for tracetls-core operations.
pub type Result<T> = std::result::Result<T, Error>;
