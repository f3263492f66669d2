//! Convenient re-exports for common usage.
//!
//! # Example
//!
//! ```rust,no_run
//! use tracetls_core::prelude::*;
//!
//! let keylog = KeyLog::from_file("session_keys.bin").unwrap();
//! let coordinator = SessionCoordinator::new(keylog, DecryptConfig::default());
//! ```

// Coordination
pub use crate::stream::{SessionCoordinator, StreamContext};

// Sessions and records
pub use crate::tls::{
    DecryptConfig, DecryptedRecord, Direction, RecordIntegrity, SessionCache, SessionState,
    TlsSession,
};

// Keys
pub use crate::tls::{HelloRandoms, KeyLog, MasterSecret};

// Handshake
pub use crate::tls::{parse_handshake, HandshakeMessage, NextProtocol};

// Error types
pub use crate::error::{Error, Result};
