//! Per-connection session coordination.
//!
//! The capture layer tracks TCP connections and reassembles their byte
//! streams; this module takes over from there.
//!
//! ## Components
//!
//! - [`StreamContext`] - Connection id, direction and timestamp of an event
//! - [`SessionCoordinator`] - Owns the key log, the resumption cache and one
//!   TLS session per connection
//!
//! ## Example
//!
//! ```rust,no_run
//! use tracetls_core::stream::{SessionCoordinator, StreamContext};
//! use tracetls_core::tls::{DecryptConfig, KeyLog};
//!
//! let keylog = KeyLog::from_file("session_keys.bin").unwrap();
//! let mut coordinator = SessionCoordinator::new(keylog, DecryptConfig::default());
//!
//! // Feed reassembled records as the capture is read...
//! // coordinator.on_record(&StreamContext::to_server(1, ts), content_type, &payload);
//! ```

mod context;
mod coordinator;

pub use context::StreamContext;
pub use coordinator::SessionCoordinator;
