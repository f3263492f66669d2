//! TLS 1.0 record decryption pipeline.
//!
//! One [`DecryptionContext`] per direction turns a record fragment back
//! into plaintext:
//!
//! ```text
//! ciphertext -> cipher -> strip block padding -> split/verify MAC -> inflate
//! ```
//!
//! Integrity problems (bad padding, MAC mismatch) are reported on the
//! returned record rather than aborting it; an offline analyzer still wants
//! the bytes.

use flate2::{Decompress, FlushDecompress, Status};
use thiserror::Error;
use tracing::{trace, warn};

use super::backend::{CipherBackend, CipherError, RecordCipher};
use super::kdf::{HashAlgorithm, HmacContext};

/// Record protocol version bytes covered by the MAC.
pub const TLS10_VERSION: (u8, u8) = (3, 1);

/// TLS record content types.
pub mod content_type {
    pub const CHANGE_CIPHER_SPEC: u8 = 20;
    pub const ALERT: u8 = 21;
    pub const HANDSHAKE: u8 = 22;
    pub const APPLICATION_DATA: u8 = 23;
}

/// Errors during TLS record decryption.
#[derive(Debug, Error)]
pub enum DecryptionError {
    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error("Record too short: {len} bytes left for a {mac_len}-byte MAC")]
    RecordTooShort { len: usize, mac_len: usize },

    #[error("Decompression failed: {0}")]
    Decompression(String),

    #[error("Decompressed record exceeds {limit} bytes")]
    InflatedTooLarge { limit: usize },

    #[error("Fragment of {len} bytes does not fit the 16-bit MAC length field")]
    FragmentTooLong { len: usize },
}

/// Direction of TLS traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Uplink, protected with the client write keys
    ClientToServer,
    /// Downlink, protected with the server write keys
    ServerToClient,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ClientToServer => "uplink",
            Direction::ServerToClient => "downlink",
        }
    }

    /// Stable index for per-direction arrays.
    pub fn index(&self) -> usize {
        match self {
            Direction::ClientToServer => 0,
            Direction::ServerToClient => 1,
        }
    }
}

/// Record compression method negotiated in the ServerHello.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Null,
    Deflate,
}

impl CompressionMethod {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionMethod::Null),
            1 => Some(CompressionMethod::Deflate),
            _ => None,
        }
    }
}

/// Configuration for record decryption.
#[derive(Debug, Clone)]
pub struct DecryptConfig {
    /// Recompute and compare record MACs
    pub verify_mac: bool,
    /// Upper bound on the inflated size of one record
    pub max_inflated_record: usize,
}

impl Default for DecryptConfig {
    fn default() -> Self {
        Self {
            verify_mac: true,
            max_inflated_record: 1024 * 1024, // 1MB
        }
    }
}

/// Outcome of the integrity checks on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordIntegrity {
    /// MAC recomputed and equal
    Verified,
    /// MAC recomputed and different
    MacMismatch,
    /// Padding length inconsistent with the record; MAC not checked
    BadPadding,
    /// MAC stripped without verification
    Unchecked,
    /// No MAC in use (NULL MAC or passthrough)
    NotApplicable,
}

/// A decrypted record fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedRecord {
    pub plaintext: Vec<u8>,
    /// Sequence number used for the MAC; `None` for passthrough records
    pub sequence: Option<u64>,
    pub integrity: RecordIntegrity,
}

impl DecryptedRecord {
    /// A record handed through untouched.
    pub fn passthrough(data: &[u8]) -> Self {
        Self {
            plaintext: data.to_vec(),
            sequence: None,
            integrity: RecordIntegrity::NotApplicable,
        }
    }
}

/// MAC key of one direction.
#[derive(Debug, Clone)]
pub struct MacKey {
    pub hash: HashAlgorithm,
    pub secret: Vec<u8>,
}

/// Decryption state for one direction of a session.
pub struct DecryptionContext {
    cipher: Box<dyn RecordCipher>,
    mac: Option<MacKey>,
    inflater: Option<Inflater>,
}

impl DecryptionContext {
    pub fn new(
        cipher: Box<dyn RecordCipher>,
        mac: Option<MacKey>,
        compression: CompressionMethod,
    ) -> Self {
        let inflater = match compression {
            CompressionMethod::Null => None,
            CompressionMethod::Deflate => Some(Inflater::new()),
        };
        Self {
            cipher,
            mac,
            inflater,
        }
    }

    /// Decrypt one record fragment protected under `sequence`.
    pub fn open_record(
        &mut self,
        backend: &dyn CipherBackend,
        sequence: u64,
        record_type: u8,
        ciphertext: &[u8],
        config: &DecryptConfig,
    ) -> Result<DecryptedRecord, DecryptionError> {
        let mut data = ciphertext.to_vec();
        self.cipher.decrypt_in_place(&mut data)?;

        let mut integrity = RecordIntegrity::NotApplicable;
        if self.cipher.block_size() > 0 && !strip_block_padding(&mut data) {
            warn!(sequence, len = data.len(), "invalid block padding");
            integrity = RecordIntegrity::BadPadding;
        }

        if let Some(mac) = &self.mac {
            let mac_len = mac.hash.output_len();
            if data.len() < mac_len {
                return Err(DecryptionError::RecordTooShort {
                    len: data.len(),
                    mac_len,
                });
            }
            let payload_len = data.len() - mac_len;

            if integrity != RecordIntegrity::BadPadding {
                integrity = if config.verify_mac {
                    let ctx = backend.init_mac(mac.hash, &mac.secret);
                    let expected = record_mac(ctx, sequence, record_type, &data[..payload_len])?;
                    if expected[..] == data[payload_len..] {
                        RecordIntegrity::Verified
                    } else {
                        warn!(sequence, record_type, "record MAC mismatch");
                        RecordIntegrity::MacMismatch
                    }
                } else {
                    RecordIntegrity::Unchecked
                };
            }
            data.truncate(payload_len);
        }

        if let Some(inflater) = &mut self.inflater {
            if !data.is_empty() {
                data = inflater.inflate(&data, config.max_inflated_record)?;
            }
        }

        trace!(sequence, record_type, len = data.len(), ?integrity, "opened record");
        Ok(DecryptedRecord {
            plaintext: data,
            sequence: Some(sequence),
            integrity,
        })
    }
}

/// Remove TLS 1.0 block padding: the last byte gives the pad length, and the
/// pad plus that byte are dropped. Returns `false` (leaving `data` untouched)
/// if the pad is longer than the record.
pub fn strip_block_padding(data: &mut Vec<u8>) -> bool {
    let Some(&pad_len) = data.last() else {
        return false;
    };
    let strip = pad_len as usize + 1;
    if strip > data.len() {
        return false;
    }
    data.truncate(data.len() - strip);
    true
}

/// HMAC(mac_secret, seq_num + type + version + length + fragment)
///
/// Fails for fragments whose length does not fit the 16-bit length field.
pub fn record_mac(
    mut ctx: HmacContext,
    sequence: u64,
    record_type: u8,
    payload: &[u8],
) -> Result<Vec<u8>, DecryptionError> {
    let len = u16::try_from(payload.len())
        .map_err(|_| DecryptionError::FragmentTooLong { len: payload.len() })?;
    ctx.update(&sequence.to_be_bytes());
    ctx.update(&[record_type, TLS10_VERSION.0, TLS10_VERSION.1]);
    ctx.update(&len.to_be_bytes());
    ctx.update(payload);
    Ok(ctx.finish())
}

// ============================================================================
// DEFLATE
// ============================================================================

/// Persistent zlib inflater shared by every record of one direction.
#[derive(Debug)]
pub struct Inflater {
    inner: Decompress,
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new()
    }
}

impl Inflater {
    pub fn new() -> Self {
        Self {
            inner: Decompress::new(true),
        }
    }

    /// Inflate one record's worth of compressed data.
    pub fn inflate(&mut self, input: &[u8], limit: usize) -> Result<Vec<u8>, DecryptionError> {
        let mut output = Vec::with_capacity((input.len() * 4).clamp(256, limit.max(256)));
        let mut consumed = 0;

        loop {
            let in_before = self.inner.total_in();
            let out_before = output.len();
            let status = self
                .inner
                .decompress_vec(&input[consumed..], &mut output, FlushDecompress::Sync)
                .map_err(|e| DecryptionError::Decompression(e.to_string()))?;
            consumed += (self.inner.total_in() - in_before) as usize;

            if output.len() > limit {
                return Err(DecryptionError::InflatedTooLarge { limit });
            }
            if status == Status::StreamEnd {
                break;
            }

            let output_full = output.len() == output.capacity();
            if consumed >= input.len() && !output_full {
                break;
            }
            let stalled = self.inner.total_in() == in_before && output.len() == out_before;
            if stalled && !output_full {
                return Err(DecryptionError::Decompression(
                    "inflater made no progress".to_string(),
                ));
            }
            if output_full {
                output.reserve(output.capacity().max(256));
            }
        }

        Ok(output)
    }
}
