//! Session resumption cache.
//!
//! Abbreviated handshakes carry no key exchange, so the master secret of a
//! resumed session is whatever the original full handshake produced. The
//! cache maps session ids and session tickets to those master secrets. It is
//! shared by every session in a trace and outlives them until cleared.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::kdf::MasterSecret;

/// Result of saving a resumption identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheInsert {
    /// New entry stored
    Inserted,
    /// Identical entry already present
    AlreadyPresent,
    /// Entry present with a different master secret; the existing one is kept
    Conflict,
}

#[derive(Debug, Default)]
struct CacheTables {
    by_id: HashMap<Vec<u8>, MasterSecret>,
    by_ticket: HashMap<Vec<u8>, MasterSecret>,
}

/// Shared session-id and session-ticket cache.
///
/// Cloning yields another handle to the same tables.
#[derive(Debug, Clone, Default)]
pub struct SessionCache {
    inner: Arc<Mutex<CacheTables>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the master secret negotiated under `session_id`.
    pub fn save_by_id(&self, session_id: &[u8], master: &MasterSecret) -> CacheInsert {
        let mut tables = self.inner.lock();
        save(&mut tables.by_id, "session id", session_id, master)
    }

    /// Remember the master secret sealed in `ticket`.
    pub fn save_by_ticket(&self, ticket: &[u8], master: &MasterSecret) -> CacheInsert {
        let mut tables = self.inner.lock();
        save(&mut tables.by_ticket, "session ticket", ticket, master)
    }

    pub fn lookup_by_id(&self, session_id: &[u8]) -> Option<MasterSecret> {
        self.inner.lock().by_id.get(session_id).copied()
    }

    pub fn lookup_by_ticket(&self, ticket: &[u8]) -> Option<MasterSecret> {
        self.inner.lock().by_ticket.get(ticket).copied()
    }

    /// Number of cached session ids.
    pub fn id_count(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    /// Number of cached session tickets.
    pub fn ticket_count(&self) -> usize {
        self.inner.lock().by_ticket.len()
    }

    pub fn is_empty(&self) -> bool {
        let tables = self.inner.lock();
        tables.by_id.is_empty() && tables.by_ticket.is_empty()
    }

    /// Drop every cached entry, e.g. before loading a new trace.
    pub fn clear(&self) {
        let mut tables = self.inner.lock();
        tables.by_id.clear();
        tables.by_ticket.clear();
    }
}

fn save(
    table: &mut HashMap<Vec<u8>, MasterSecret>,
    kind: &'static str,
    key: &[u8],
    master: &MasterSecret,
) -> CacheInsert {
    match table.get(key) {
        Some(existing) if existing == master => CacheInsert::AlreadyPresent,
        Some(_) => {
            warn!(kind, len = key.len(), "resumption entry conflicts with cached master secret");
            CacheInsert::Conflict
        }
        None => {
            table.insert(key.to_vec(), *master);
            debug!(kind, len = key.len(), "cached resumption entry");
            CacheInsert::Inserted
        }
    }
}
