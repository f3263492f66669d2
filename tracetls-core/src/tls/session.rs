//! TLS session state management.
//!
//! A [`TlsSession`] owns everything needed to decrypt one TCP connection's
//! TLS traffic once its master secret is known: the negotiated parameters,
//! the key block, one decryption context per direction and the record
//! sequence counter.
//!
//! The counter is shared by both directions and advances once per record
//! opened, whichever direction it came from. MAC verification is computed
//! under that counter, and a mismatch is reported without withholding the
//! plaintext.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::backend::{CipherBackend, CipherError, RecordCipher};
use super::catalog::{
    lookup_cipher, lookup_suite, CipherAlgorithmDescriptor, CipherId, CipherSuiteDescriptor,
};
use super::decrypt::{
    CompressionMethod, DecryptConfig, DecryptedRecord, DecryptionContext, DecryptionError,
    Direction, MacKey,
};
use super::kdf::{HelloRandoms, KeyBlock, MasterSecret};
use super::resumption::{CacheInsert, SessionCache};

/// Errors that can occur during TLS session management.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No key log record matches the session")]
    NoCorrelatedKey,

    #[error("Cipher initialization failed: {0}")]
    CipherInit(#[from] CipherError),

    #[error("Decryption error: {0}")]
    Decryption(#[from] DecryptionError),

    #[error("Unsupported cipher suite: 0x{0:04x}")]
    UnsupportedCipherSuite(u16),

    #[error("No parameters for cipher {0:?}")]
    UnknownCipher(CipherId),

    #[error("Unsupported compression method: {0}")]
    UnsupportedCompression(u8),

    #[error("Missing client_random from ClientHello")]
    MissingClientRandom,
}

/// State of a TLS session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Fresh or cleaned, no handshake seen
    Uninitialized,
    /// ClientHello seen, waiting for key material
    AwaitingKeyMatch,
    /// Ciphers set up, records are decrypted
    Keyed,
    /// Keys cannot be recovered; records pass through
    Undecryptable,
    /// Connection closed
    Closed,
}

/// Cipher suite, bulk cipher and compression negotiated in a ServerHello.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedParameters {
    pub suite: &'static CipherSuiteDescriptor,
    pub cipher: &'static CipherAlgorithmDescriptor,
    pub compression: CompressionMethod,
}

impl NegotiatedParameters {
    /// Resolve a ServerHello's suite and compression method.
    pub fn new(suite_id: u16, compression_method: u8) -> Result<Self, SessionError> {
        let suite = lookup_suite(suite_id).ok_or(SessionError::UnsupportedCipherSuite(suite_id))?;
        let cipher = lookup_cipher(suite.cipher).ok_or(SessionError::UnknownCipher(suite.cipher))?;
        let compression = CompressionMethod::from_wire(compression_method)
            .ok_or(SessionError::UnsupportedCompression(compression_method))?;
        Ok(Self {
            suite,
            cipher,
            compression,
        })
    }
}

/// Decryption state of one TLS connection.
pub struct TlsSession {
    state: SessionState,

    /// Parameters the ciphers were set up with
    params: Option<NegotiatedParameters>,

    key_block: Option<KeyBlock>,

    /// Client-to-server context, keyed with the client write key
    uplink: Option<DecryptionContext>,

    /// Server-to-client context, keyed with the server write key
    downlink: Option<DecryptionContext>,

    /// Record sequence number, shared by both directions
    sequence: u64,

    backend: Arc<dyn CipherBackend>,
    cache: SessionCache,
    config: DecryptConfig,
}

impl TlsSession {
    pub fn new(backend: Arc<dyn CipherBackend>, cache: SessionCache, config: DecryptConfig) -> Self {
        Self {
            state: SessionState::Uninitialized,
            params: None,
            key_block: None,
            uplink: None,
            downlink: None,
            sequence: 0,
            backend,
            cache,
            config,
        }
    }

    /// Reset every per-session field. Both directions pass records through
    /// until ciphers are set up again.
    pub fn init(&mut self) {
        self.state = SessionState::Uninitialized;
        self.params = None;
        self.key_block = None;
        self.uplink = None;
        self.downlink = None;
        self.sequence = 0;
    }

    /// Same as [`init`](Self::init); releases the cipher contexts.
    pub fn clean(&mut self) {
        self.init();
    }

    /// Release everything and mark the session closed.
    pub fn close(&mut self) {
        self.clean();
        self.state = SessionState::Closed;
    }

    /// A ClientHello started (or restarted) negotiation.
    pub fn begin_negotiation(&mut self) {
        self.init();
        self.state = SessionState::AwaitingKeyMatch;
    }

    /// Give up on decrypting this session.
    pub fn mark_undecryptable(&mut self) {
        self.uplink = None;
        self.downlink = None;
        self.state = SessionState::Undecryptable;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_keyed(&self) -> bool {
        self.state == SessionState::Keyed
    }

    /// Sequence number the next record will be opened under.
    pub fn sequence_number(&self) -> u64 {
        self.sequence
    }

    pub fn parameters(&self) -> Option<&NegotiatedParameters> {
        self.params.as_ref()
    }

    pub fn key_block(&self) -> Option<&KeyBlock> {
        self.key_block.as_ref()
    }

    /// Get the cipher suite name.
    pub fn cipher_suite_name(&self) -> Option<&'static str> {
        self.params.map(|p| p.suite.name)
    }

    /// Derive the key block from `master` and key both directions.
    ///
    /// The uplink context gets the client write key/IV/MAC secret, the
    /// downlink context the server's. If the backend rejects either, the
    /// session becomes undecryptable.
    pub fn setup_ciphers(
        &mut self,
        master: &MasterSecret,
        randoms: &HelloRandoms,
        params: NegotiatedParameters,
    ) -> Result<(), SessionError> {
        let key_block = KeyBlock::for_suite(master, randoms, params.suite, params.cipher);

        let (uplink_cipher, downlink_cipher) = match self.init_cipher_pair(&params, &key_block) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(
                    cipher_suite = params.suite.name,
                    error = %e,
                    "cipher initialization failed"
                );
                self.mark_undecryptable();
                return Err(SessionError::CipherInit(e));
            }
        };

        let mac_key = |secret: &[u8]| {
            params.suite.mac.map(|hash| MacKey {
                hash,
                secret: secret.to_vec(),
            })
        };
        self.uplink = Some(DecryptionContext::new(
            uplink_cipher,
            mac_key(key_block.client_write_mac_secret()),
            params.compression,
        ));
        self.downlink = Some(DecryptionContext::new(
            downlink_cipher,
            mac_key(key_block.server_write_mac_secret()),
            params.compression,
        ));

        debug!(
            cipher_suite = params.suite.name,
            compression = ?params.compression,
            key_block_len = key_block.len(),
            "session keyed"
        );

        self.sequence = 0;
        self.key_block = Some(key_block);
        self.params = Some(params);
        self.state = SessionState::Keyed;
        Ok(())
    }

    fn init_cipher_pair(
        &self,
        params: &NegotiatedParameters,
        key_block: &KeyBlock,
    ) -> Result<(Box<dyn RecordCipher>, Box<dyn RecordCipher>), CipherError> {
        let algorithm = params.cipher.backend.ok_or_else(|| {
            CipherError::UnsupportedAlgorithm(format!("{:?}", params.cipher.cipher))
        })?;
        let uplink = self.backend.init_cipher(
            algorithm,
            key_block.client_write_key(),
            key_block.client_write_iv(),
        )?;
        let downlink = self.backend.init_cipher(
            algorithm,
            key_block.server_write_key(),
            key_block.server_write_iv(),
        )?;
        Ok((uplink, downlink))
    }

    /// Decrypt one record fragment.
    ///
    /// Without a context for `direction` the bytes are returned unchanged.
    /// Otherwise the record is opened under the current sequence number,
    /// which advances only if the record could be opened. MAC and padding
    /// problems still count as opened.
    pub fn decrypt_record(
        &mut self,
        direction: Direction,
        record_type: u8,
        ciphertext: &[u8],
    ) -> Result<DecryptedRecord, SessionError> {
        let context = match direction {
            Direction::ClientToServer => self.uplink.as_mut(),
            Direction::ServerToClient => self.downlink.as_mut(),
        };
        let Some(context) = context else {
            return Ok(DecryptedRecord::passthrough(ciphertext));
        };

        let sequence = self.sequence;
        let record = context
            .open_record(
                self.backend.as_ref(),
                sequence,
                record_type,
                ciphertext,
                &self.config,
            )
            .map_err(|e| {
                warn!(
                    direction = direction.as_str(),
                    sequence,
                    error = %e,
                    "record dropped"
                );
                SessionError::Decryption(e)
            })?;
        self.sequence = sequence.wrapping_add(1);
        Ok(record)
    }

    // ========================================================================
    // Resumption cache
    // ========================================================================

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn save_by_id(&self, session_id: &[u8], master: &MasterSecret) -> CacheInsert {
        self.cache.save_by_id(session_id, master)
    }

    pub fn save_by_ticket(&self, ticket: &[u8], master: &MasterSecret) -> CacheInsert {
        self.cache.save_by_ticket(ticket, master)
    }

    pub fn lookup_by_id(&self, session_id: &[u8]) -> Option<MasterSecret> {
        self.cache.lookup_by_id(session_id)
    }

    pub fn lookup_by_ticket(&self, ticket: &[u8]) -> Option<MasterSecret> {
        self.cache.lookup_by_ticket(ticket)
    }
}

impl std::fmt::Debug for TlsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSession")
            .field("state", &self.state)
            .field("cipher_suite", &self.cipher_suite_name())
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}
