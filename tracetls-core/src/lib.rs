//! # tracetls-core
//!
//! Offline decryption of TLS 1.0 sessions from packet traces.
//!
//! Given the handshake messages and records of captured connections, plus a
//! key log written by an agent on one endpoint, this crate recovers each
//! session's master secret, derives its record keys and returns the
//! plaintext application data.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tracetls_core::prelude::*;
//!
//! let keylog = KeyLog::from_file("session_keys.bin").unwrap();
//! let mut coordinator = SessionCoordinator::new(keylog, DecryptConfig::default());
//!
//! let ctx = StreamContext::to_client(1, 1_700_000_000.25);
//! # let payload = [0u8; 32];
//! if let Ok(Some(record)) = coordinator.on_record(&ctx, 23, &payload) {
//!     println!("{} bytes ({:?})", record.plaintext.len(), record.integrity);
//! }
//! coordinator.on_session_close(1);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                        tracetls-core                                |
//! +---------------------------------------------------------------------+
//! |  stream/     - StreamContext, SessionCoordinator                    |
//! |  tls/        - handshake parser, cipher catalog, PRF, key log,      |
//! |                cipher backend, record pipeline, session state,      |
//! |                resumption cache                                     |
//! |  error/      - Error types                                          |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Logging
//!
//! All diagnostics go through `tracing`. No subscriber is installed; the
//! embedding application picks one.

pub mod error;
pub mod prelude;
pub mod stream;
pub mod tls;

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result};
pub use stream::{SessionCoordinator, StreamContext};
pub use tls::{
    derive_master_secret, tls_prf, CipherBackend, CipherError, DecryptConfig, DecryptedRecord,
    DecryptionError, Direction, HandshakeError, HandshakeMessage, HelloRandoms, KeyBlock, KeyLog,
    KeyLogError, MasterSecret, RecordIntegrity, RustCryptoBackend, SessionCache, SessionError,
    SessionState, TlsSession,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
