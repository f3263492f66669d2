//! Timestamp-correlated key log.
//!
//! The capture agent on the device records every pre-master/master secret
//! pair it sees together with a capture timestamp. Nothing in a record names
//! the session it belongs to, so a session is attributed by searching
//! outward from the record nearest its ServerHello timestamp and re-deriving
//! each candidate's master secret from the hello randoms.
//!
//! ## Binary format
//!
//! ```text
//! repeated {
//!     timestamp       f64 LE
//!     pre_master_len  u32 LE
//!     pre_master      [u8; pre_master_len]
//!     master          [u8; 48]
//! }
//! ```

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, trace};

use super::kdf::{derive_master_secret, HelloRandoms, MasterSecret, MASTER_SECRET_LEN};

/// Largest pre-master accepted from a key log file (a 8192-bit DH secret).
pub const MAX_PRE_MASTER_LEN: usize = 1024;

/// Windows this small are scanned linearly.
const LINEAR_SCAN_WINDOW: usize = 5;

/// Errors that can occur when reading a key log.
#[derive(Debug, Error)]
pub enum KeyLogError {
    /// I/O error reading the file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input ended inside a record
    #[error("Key log truncated inside record {record}")]
    Truncated { record: usize },

    /// A pre-master length outside 1..=MAX_PRE_MASTER_LEN
    #[error("Invalid pre-master length {len} in record {record}")]
    InvalidPreMasterLength { record: usize, len: usize },
}

/// One captured key pair.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionKeyRecord {
    /// Capture timestamp, seconds
    pub timestamp: f64,
    pub pre_master: Vec<u8>,
    pub master: MasterSecret,
    used: bool,
}

impl SessionKeyRecord {
    pub fn new(timestamp: f64, pre_master: Vec<u8>, master: MasterSecret) -> Self {
        Self {
            timestamp,
            pre_master,
            master,
            used: false,
        }
    }

    /// Whether this record has already been attributed to a session.
    pub fn is_used(&self) -> bool {
        self.used
    }
}

/// Append-ordered collection of captured key records.
#[derive(Debug, Clone, Default)]
pub struct KeyLog {
    records: Vec<SessionKeyRecord>,
}

impl KeyLog {
    /// Create an empty key log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a binary key log from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, KeyLogError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Read a binary key log from memory.
    pub fn parse(data: &[u8]) -> Result<Self, KeyLogError> {
        Self::from_reader(data)
    }

    /// Read a binary key log from any reader.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, KeyLogError> {
        let mut log = KeyLog::new();

        loop {
            let record = log.len();

            let mut timestamp = [0u8; 8];
            match fill(&mut reader, &mut timestamp)? {
                0 => break,
                8 => {}
                _ => return Err(KeyLogError::Truncated { record }),
            }

            let mut len = [0u8; 4];
            read_field(&mut reader, &mut len, record)?;
            let len = u32::from_le_bytes(len) as usize;
            if len == 0 || len > MAX_PRE_MASTER_LEN {
                return Err(KeyLogError::InvalidPreMasterLength { record, len });
            }

            let mut pre_master = vec![0u8; len];
            read_field(&mut reader, &mut pre_master, record)?;

            let mut master = [0u8; MASTER_SECRET_LEN];
            read_field(&mut reader, &mut master, record)?;

            log.push(f64::from_le_bytes(timestamp), pre_master, master);
        }

        debug!(records = log.len(), "loaded key log");
        Ok(log)
    }

    /// Append a record.
    pub fn push(&mut self, timestamp: f64, pre_master: Vec<u8>, master: MasterSecret) {
        self.records
            .push(SessionKeyRecord::new(timestamp, pre_master, master));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SessionKeyRecord> {
        self.records.get(index)
    }

    pub fn records(&self) -> impl Iterator<Item = &SessionKeyRecord> {
        self.records.iter()
    }

    /// Number of records not yet attributed to a session.
    pub fn unused_count(&self) -> usize {
        self.records.iter().filter(|r| !r.used).count()
    }

    /// Index of the record whose timestamp is closest to `target`.
    ///
    /// Assumes timestamps are locally monotonic in index order, as written
    /// by a live capture. Returns `None` for an empty log.
    pub fn nearest_timestamp(&self, target: f64) -> Option<usize> {
        if self.records.is_empty() {
            return None;
        }
        Some(self.search(target, 0, self.records.len() - 1))
    }

    fn search(&self, target: f64, begin: usize, end: usize) -> usize {
        if end - begin <= LINEAR_SCAN_WINDOW {
            return (begin..=end)
                .min_by(|&a, &b| self.delta(a, target).total_cmp(&self.delta(b, target)))
                .unwrap_or(begin);
        }

        let begin_side = side(self.records[begin].timestamp - target);
        let end_side = side(self.records[end].timestamp - target);
        if begin_side == end_side {
            return if self.delta(begin, target) < self.delta(end, target) {
                begin
            } else {
                end
            };
        }

        let mid = begin + (end - begin) / 2;
        if side(self.records[mid].timestamp - target) == begin_side {
            self.search(target, mid, end)
        } else {
            self.search(target, begin, mid)
        }
    }

    fn delta(&self, index: usize, target: f64) -> f64 {
        (self.records[index].timestamp - target).abs()
    }

    /// Attribute a key record to the session whose ServerHello was captured
    /// at `timestamp`.
    ///
    /// Candidates are visited in order of increasing timestamp distance,
    /// skipping records already used. The first whose pre-master re-derives
    /// its own master secret under `randoms` is marked used and returned.
    pub fn match_key(&mut self, timestamp: f64, randoms: &HelloRandoms) -> Option<MasterSecret> {
        let nearest = self.nearest_timestamp(timestamp)?;
        let count = self.records.len();

        let mut lower = Some(nearest);
        let mut upper = nearest + 1;

        loop {
            while let Some(i) = lower {
                if upper < count && self.delta(upper, timestamp) < self.delta(i, timestamp) {
                    break;
                }
                if self.try_attribute(i, randoms) {
                    return Some(self.records[i].master);
                }
                lower = i.checked_sub(1);
            }

            while upper < count {
                if let Some(i) = lower {
                    if self.delta(i, timestamp) < self.delta(upper, timestamp) {
                        break;
                    }
                }
                if self.try_attribute(upper, randoms) {
                    return Some(self.records[upper].master);
                }
                upper += 1;
            }

            if lower.is_none() && upper >= count {
                break;
            }
        }

        None
    }

    fn try_attribute(&mut self, index: usize, randoms: &HelloRandoms) -> bool {
        let record = &mut self.records[index];
        if record.used {
            return false;
        }
        if derive_master_secret(&record.pre_master, randoms) != record.master {
            trace!(index, "key record does not match");
            return false;
        }
        record.used = true;
        debug!(index, timestamp = record.timestamp, "attributed key record");
        true
    }
}

fn side(delta: f64) -> i8 {
    if delta >= 0.0 {
        1
    } else {
        -1
    }
}

/// Read until `buf` is full or EOF, returning the number of bytes read.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn read_field<R: Read>(reader: &mut R, buf: &mut [u8], record: usize) -> Result<(), KeyLogError> {
    if fill(reader, buf)? != buf.len() {
        return Err(KeyLogError::Truncated { record });
    }
    Ok(())
}
