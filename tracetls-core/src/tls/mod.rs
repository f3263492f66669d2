//! Passive TLS 1.0 decryption.
//!
//! Sessions are decrypted offline from a packet trace plus a key log of
//! pre-master/master secrets captured on one endpoint. Nothing here talks to
//! a network: handshake messages and records arrive already reassembled.
//!
//! ## Architecture
//!
//! ```text
//! Handshake messages -> HandshakeParser (handshake)
//!     |                      |
//!     |                      v
//!     |          client_random, server_random, cipher_suite, session id/ticket
//!     |                      |
//!     v                      v
//! Resumption cache <-> Key log match (keylog, PRF "master secret")
//!     |
//!     v
//! Key block derivation (kdf, PRF "key expansion")
//!     |
//!     v
//! Record pipeline (decrypt -> padding -> MAC -> inflate)
//!     |
//!     v
//! Plaintext application data
//! ```
//!
//! ## Supported Cipher Suites
//!
//! RSA and anonymous DH key exchange with NULL, RC4, DES, 3DES and AES-CBC
//! bulk ciphers and MD5/SHA-1 MACs. See [`catalog`] for the full table.
//!
//! ## Key Log Format
//!
//! A binary sequence of records, little-endian:
//!
//! ```text
//! f64 timestamp | u32 pre_master_len | pre_master bytes | 48-byte master secret
//! ```

pub mod backend;
pub mod catalog;
pub mod decrypt;
pub mod handshake;
pub mod kdf;
pub mod keylog;
pub mod resumption;
pub mod session;

pub use backend::{CipherBackend, CipherError, NullCipher, RecordCipher, RustCryptoBackend};
pub use catalog::{
    cipher_suite_name, cipher_suites, ciphers, lookup_cipher, lookup_suite, BackendAlgorithm,
    CipherAlgorithmDescriptor, CipherId, CipherKind, CipherSuiteDescriptor, KeyExchange,
};
pub use decrypt::{
    content_type, CompressionMethod, DecryptConfig, DecryptedRecord, DecryptionContext,
    DecryptionError, Direction, RecordIntegrity,
};
pub use handshake::{
    message_len, parse_handshake, ClientHello, ClientKeyExchange, HandshakeError,
    HandshakeMessage, HandshakeType, NewSessionTicket, NextProtocol, ParseFailure, ServerHello,
    SessionId,
};
pub use kdf::{
    derive_master_secret, hmac, tls_prf, HashAlgorithm, HelloRandoms, HmacContext, KeyBlock,
    MasterSecret, MASTER_SECRET_LEN,
};
pub use keylog::{KeyLog, KeyLogError, SessionKeyRecord};
pub use resumption::{CacheInsert, SessionCache};
pub use session::{NegotiatedParameters, SessionError, SessionState, TlsSession};
