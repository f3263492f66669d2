//! TLS decryption integration tests.
//!
//! These tests drive the session coordinator the way a capture pipeline
//! would: handshake and application records go in, plaintext comes out.
//! Peers are simulated with the RustCrypto crates directly.

use cipher::consts::U16;
use cipher::generic_array::GenericArray;
use cipher::{BlockEncryptMut, KeyInit, KeyIvInit, StreamCipher};
use flate2::{Compress, Compression, FlushCompress};

use tracetls_core::tls::decrypt::record_mac;
use tracetls_core::tls::{
    content_type, lookup_cipher, lookup_suite, CacheInsert, HashAlgorithm, HmacContext, KeyBlock,
    NextProtocol,
};
use tracetls_core::{
    derive_master_secret, DecryptConfig, Error, HelloRandoms, KeyLog, RecordIntegrity,
    SessionCoordinator, SessionError, SessionState, StreamContext,
};

// ============================================================================
// Test Constants
// ============================================================================

/// Test client random (32 bytes)
const TEST_CLIENT_RANDOM: [u8; 32] = [
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f, 0x10,
    0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f, 0x20,
];

/// Test server random (32 bytes)
const TEST_SERVER_RANDOM: [u8; 32] = [
    0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2a, 0x2b, 0x2c, 0x2d, 0x2e, 0x2f, 0x30,
    0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x3b, 0x3c, 0x3d, 0x3e, 0x3f, 0x40,
];

/// Randoms of a second, resumed connection
const TEST_RESUMED_CLIENT_RANDOM: [u8; 32] = [0x5a; 32];
const TEST_RESUMED_SERVER_RANDOM: [u8; 32] = [0xa5; 32];

/// Test RSA pre-master secret (48 bytes, version prefix 03 01)
const TEST_PRE_MASTER: [u8; 48] = [
    0x03, 0x01, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4a, 0x4b, 0x4c, 0x4d, 0x4e, 0x4f,
    0x50, 0x51, 0x52, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x5b, 0x5c, 0x5d, 0x5e, 0x5f,
    0x60, 0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6a, 0x6b, 0x6c, 0x6d, 0x6e, 0x6f,
];

const TEST_TIMESTAMP: f64 = 1_300_000_000.5;

// Cipher suite IDs
const TLS_RSA_WITH_RC4_128_MD5: u16 = 0x0004;
const TLS_RSA_WITH_AES_128_CBC_SHA: u16 = 0x002F;
const TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256: u16 = 0xC02F;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

// ============================================================================
// Handshake builders
// ============================================================================

fn framed(msg_type: u8, body: &[u8]) -> Vec<u8> {
    let len = body.len() as u32;
    let mut msg = vec![msg_type, (len >> 16) as u8, (len >> 8) as u8, len as u8];
    msg.extend_from_slice(body);
    msg
}

fn client_hello(random: &[u8; 32], session_id: &[u8], ticket: Option<&[u8]>) -> Vec<u8> {
    let mut body = vec![0x03, 0x01];
    body.extend_from_slice(random);
    body.push(session_id.len() as u8);
    body.extend_from_slice(session_id);
    body.extend_from_slice(&[0x00, 0x04, 0x00, 0x2F, 0x00, 0x04]);
    body.extend_from_slice(&[0x02, 0x01, 0x00]);
    if let Some(ticket) = ticket {
        let mut ext = 35u16.to_be_bytes().to_vec();
        ext.extend_from_slice(&(ticket.len() as u16).to_be_bytes());
        ext.extend_from_slice(ticket);
        body.extend_from_slice(&(ext.len() as u16).to_be_bytes());
        body.extend_from_slice(&ext);
    }
    framed(1, &body)
}

fn server_hello(random: &[u8; 32], session_id: &[u8], suite: u16, compression: u8) -> Vec<u8> {
    let mut body = vec![0x03, 0x01];
    body.extend_from_slice(random);
    body.push(session_id.len() as u8);
    body.extend_from_slice(session_id);
    body.extend_from_slice(&suite.to_be_bytes());
    body.push(compression);
    framed(2, &body)
}

fn certificate() -> Vec<u8> {
    // One 5-byte dummy certificate
    let mut body = vec![0x00, 0x00, 0x08, 0x00, 0x00, 0x05];
    body.extend_from_slice(b"cert!");
    framed(11, &body)
}

fn server_hello_done() -> Vec<u8> {
    framed(14, &[])
}

fn client_key_exchange() -> Vec<u8> {
    let mut body = vec![0x00, 0x40];
    body.extend_from_slice(&[0xEE; 64]);
    framed(16, &body)
}

fn new_session_ticket(ticket: &[u8]) -> Vec<u8> {
    let mut body = 7200u32.to_be_bytes().to_vec();
    body.extend_from_slice(&(ticket.len() as u16).to_be_bytes());
    body.extend_from_slice(ticket);
    framed(4, &body)
}

fn next_protocol(name: &str) -> Vec<u8> {
    let mut body = vec![name.len() as u8];
    body.extend_from_slice(name.as_bytes());
    body.extend_from_slice(&[0x02, 0x00, 0x00]);
    framed(67, &body)
}

fn finished(fill: u8) -> Vec<u8> {
    framed(20, &[fill; 12])
}

/// Log output for a failing test: `RUST_LOG=tracetls_core=trace cargo test`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn keylog_for(randoms: &HelloRandoms) -> KeyLog {
    let mut log = KeyLog::new();
    log.push(
        TEST_TIMESTAMP - 0.2,
        TEST_PRE_MASTER.to_vec(),
        derive_master_secret(&TEST_PRE_MASTER, randoms),
    );
    log
}

fn test_randoms() -> HelloRandoms {
    HelloRandoms::new(TEST_CLIENT_RANDOM, TEST_SERVER_RANDOM)
}

fn up(id: u64) -> StreamContext {
    StreamContext::to_server(id, TEST_TIMESTAMP)
}

fn down(id: u64) -> StreamContext {
    StreamContext::to_client(id, TEST_TIMESTAMP + 0.05)
}

// ============================================================================
// Simulated peers
// ============================================================================

/// The sending half of an AES-128-CBC / HMAC-SHA1 connection.
struct CbcSealer {
    enc: Aes128CbcEnc,
    mac_secret: Vec<u8>,
}

impl CbcSealer {
    fn client(kb: &KeyBlock) -> Self {
        Self {
            enc: Aes128CbcEnc::new_from_slices(kb.client_write_key(), kb.client_write_iv()).unwrap(),
            mac_secret: kb.client_write_mac_secret().to_vec(),
        }
    }

    fn server(kb: &KeyBlock) -> Self {
        Self {
            enc: Aes128CbcEnc::new_from_slices(kb.server_write_key(), kb.server_write_iv()).unwrap(),
            mac_secret: kb.server_write_mac_secret().to_vec(),
        }
    }

    fn seal(&mut self, sequence: u64, record_type: u8, plaintext: &[u8]) -> Vec<u8> {
        let mut record = plaintext.to_vec();
        record.extend(record_mac(
            HmacContext::new(HashAlgorithm::Sha1, &self.mac_secret),
            sequence,
            record_type,
            plaintext,
        )
        .unwrap());
        let pad = 15 - record.len() % 16;
        record.extend(std::iter::repeat(pad as u8).take(pad + 1));
        for block in record.chunks_exact_mut(16) {
            self.enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        record
    }
}

/// The sending half of an RC4-128 / HMAC-MD5 connection with DEFLATE.
struct Rc4DeflateSealer {
    rc4: rc4::Rc4<U16>,
    mac_secret: Vec<u8>,
    compress: Compress,
}

impl Rc4DeflateSealer {
    fn new(key: &[u8], mac_secret: &[u8]) -> Self {
        Self {
            rc4: rc4::Rc4::new_from_slice(key).unwrap(),
            mac_secret: mac_secret.to_vec(),
            compress: Compress::new(Compression::default(), true),
        }
    }

    fn seal(&mut self, sequence: u64, plaintext: &[u8]) -> Vec<u8> {
        let mut compressed = Vec::with_capacity(plaintext.len() + 64);
        self.compress
            .compress_vec(plaintext, &mut compressed, FlushCompress::Sync)
            .unwrap();

        let mut record = compressed.clone();
        record.extend(record_mac(
            HmacContext::new(HashAlgorithm::Md5, &self.mac_secret),
            sequence,
            content_type::APPLICATION_DATA,
            &compressed,
        )
        .unwrap());
        self.rc4.apply_keystream(&mut record);
        record
    }
}

/// Run ClientHello / ServerHello(+Certificate, ServerHelloDone) as records.
fn full_handshake(coordinator: &mut SessionCoordinator, id: u64, server_session_id: &[u8]) {
    coordinator
        .on_record(&up(id), content_type::HANDSHAKE, &client_hello(&TEST_CLIENT_RANDOM, b"", None))
        .unwrap();

    let mut flight = server_hello(&TEST_SERVER_RANDOM, server_session_id, TLS_RSA_WITH_AES_128_CBC_SHA, 0);
    flight.extend(certificate());
    flight.extend(server_hello_done());
    coordinator
        .on_record(&down(id), content_type::HANDSHAKE, &flight)
        .unwrap();
}

// ============================================================================
// Full handshake
// ============================================================================

#[test]
fn test_full_handshake_and_application_data() {
    init_tracing();
    let mut coordinator = SessionCoordinator::new(keylog_for(&test_randoms()), DecryptConfig::default());
    full_handshake(&mut coordinator, 1, b"");
    assert_eq!(coordinator.status(1), Some(SessionState::Keyed));
    assert_eq!(coordinator.keylog().unused_count(), 0);

    let session = coordinator.session(1).unwrap();
    assert_eq!(session.cipher_suite_name(), Some("TLS_RSA_WITH_AES_128_CBC_SHA"));

    // Independent derivation matches the session's key block
    let suite = lookup_suite(TLS_RSA_WITH_AES_128_CBC_SHA).unwrap();
    let cipher = lookup_cipher(suite.cipher).unwrap();
    let master = derive_master_secret(&TEST_PRE_MASTER, &test_randoms());
    let kb = KeyBlock::for_suite(&master, &test_randoms(), suite, cipher);
    assert_eq!(session.key_block(), Some(&kb));

    let mut client = CbcSealer::client(&kb);
    let mut server = CbcSealer::server(&kb);

    // Client flight: ClientKeyExchange in clear, then CCS and encrypted Finished
    coordinator
        .on_record(&up(1), content_type::HANDSHAKE, &client_key_exchange())
        .unwrap();
    coordinator
        .on_record(&up(1), content_type::CHANGE_CIPHER_SPEC, &[0x01])
        .unwrap();
    let sealed = client.seal(0, content_type::HANDSHAKE, &finished(0xC1));
    coordinator
        .on_record(&up(1), content_type::HANDSHAKE, &sealed)
        .unwrap();

    // Server flight
    coordinator
        .on_record(&down(1), content_type::CHANGE_CIPHER_SPEC, &[0x01])
        .unwrap();
    let sealed = server.seal(1, content_type::HANDSHAKE, &finished(0x5E));
    coordinator
        .on_record(&down(1), content_type::HANDSHAKE, &sealed)
        .unwrap();

    // Application data continues the shared sequence
    let request = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let sealed = client.seal(2, content_type::APPLICATION_DATA, request);
    let record = coordinator
        .on_record(&up(1), content_type::APPLICATION_DATA, &sealed)
        .unwrap()
        .unwrap();
    assert_eq!(record.plaintext, request);
    assert_eq!(record.sequence, Some(2));
    assert_eq!(record.integrity, RecordIntegrity::Verified);

    let response = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n";
    let sealed = server.seal(3, content_type::APPLICATION_DATA, response);
    let record = coordinator
        .on_application_data(&down(1), &sealed)
        .unwrap();
    assert_eq!(record.plaintext, response);
    assert_eq!(record.integrity, RecordIntegrity::Verified);

    coordinator.on_session_close(1);
    assert_eq!(coordinator.status(1), None);
}

#[test]
fn test_rc4_with_deflate() {
    init_tracing();
    let mut coordinator = SessionCoordinator::new(keylog_for(&test_randoms()), DecryptConfig::default());
    coordinator
        .on_handshake_message(&up(9), &client_hello(&TEST_CLIENT_RANDOM, b"", None))
        .unwrap();
    coordinator
        .on_handshake_message(&down(9), &server_hello(&TEST_SERVER_RANDOM, b"", TLS_RSA_WITH_RC4_128_MD5, 1))
        .unwrap();

    let kb = coordinator.session(9).unwrap().key_block().unwrap().clone();
    assert_eq!(kb.len(), 2 * (16 + 16));
    assert!(kb.client_write_iv().is_empty());

    let mut server = Rc4DeflateSealer::new(kb.server_write_key(), kb.server_write_mac_secret());
    let body = b"<html>".repeat(200);
    for (sequence, chunk) in body.chunks(300).enumerate() {
        let sealed = server.seal(sequence as u64, chunk);
        let record = coordinator.on_application_data(&down(9), &sealed).unwrap();
        assert_eq!(record.plaintext, chunk);
        assert_eq!(record.integrity, RecordIntegrity::Verified);
    }
}

#[test]
fn test_mac_verification_disabled() {
    let config = DecryptConfig {
        verify_mac: false,
        ..DecryptConfig::default()
    };
    let mut coordinator = SessionCoordinator::new(keylog_for(&test_randoms()), config);
    full_handshake(&mut coordinator, 1, b"");

    let kb = coordinator.session(1).unwrap().key_block().unwrap().clone();
    let mut client = CbcSealer::client(&kb);
    let sealed = client.seal(0, content_type::APPLICATION_DATA, b"ping");
    let record = coordinator.on_application_data(&up(1), &sealed).unwrap();
    assert_eq!(record.plaintext, b"ping");
    assert_eq!(record.integrity, RecordIntegrity::Unchecked);
}

// ============================================================================
// Resumption
// ============================================================================

#[test]
fn test_resumption_by_session_id() {
    init_tracing();
    let mut coordinator = SessionCoordinator::new(keylog_for(&test_randoms()), DecryptConfig::default());
    full_handshake(&mut coordinator, 1, b"session-0001");
    assert_eq!(coordinator.cache().id_count(), 1);
    coordinator.on_session_close(1);

    // Abbreviated handshake: new randoms, same session id, no key log entry left
    coordinator
        .on_handshake_message(&up(2), &client_hello(&TEST_RESUMED_CLIENT_RANDOM, b"session-0001", None))
        .unwrap();
    coordinator
        .on_handshake_message(
            &down(2),
            &server_hello(&TEST_RESUMED_SERVER_RANDOM, b"session-0001", TLS_RSA_WITH_AES_128_CBC_SHA, 0),
        )
        .unwrap();
    assert_eq!(coordinator.status(2), Some(SessionState::Keyed));

    let suite = lookup_suite(TLS_RSA_WITH_AES_128_CBC_SHA).unwrap();
    let cipher = lookup_cipher(suite.cipher).unwrap();
    let master = derive_master_secret(&TEST_PRE_MASTER, &test_randoms());
    let resumed = HelloRandoms::new(TEST_RESUMED_CLIENT_RANDOM, TEST_RESUMED_SERVER_RANDOM);
    let kb = KeyBlock::for_suite(&master, &resumed, suite, cipher);
    assert_eq!(coordinator.session(2).unwrap().key_block(), Some(&kb));

    let mut server = CbcSealer::server(&kb);
    let sealed = server.seal(0, content_type::APPLICATION_DATA, b"welcome back");
    let record = coordinator.on_application_data(&down(2), &sealed).unwrap();
    assert_eq!(record.plaintext, b"welcome back");
    assert_eq!(record.integrity, RecordIntegrity::Verified);
}

#[test]
fn test_resumption_by_ticket() {
    let ticket = b"opaque-ticket-from-server";
    let mut coordinator = SessionCoordinator::new(keylog_for(&test_randoms()), DecryptConfig::default());
    full_handshake(&mut coordinator, 1, b"");
    coordinator
        .on_handshake_message(&down(1), &new_session_ticket(ticket))
        .unwrap();
    assert_eq!(coordinator.cache().ticket_count(), 1);
    assert_eq!(coordinator.cache().id_count(), 0);

    coordinator
        .on_handshake_message(&up(2), &client_hello(&TEST_RESUMED_CLIENT_RANDOM, b"", Some(ticket)))
        .unwrap();
    coordinator
        .on_handshake_message(
            &down(2),
            &server_hello(&TEST_RESUMED_SERVER_RANDOM, b"", TLS_RSA_WITH_AES_128_CBC_SHA, 0),
        )
        .unwrap();
    assert_eq!(coordinator.status(2), Some(SessionState::Keyed));

    // Re-saving the same ticket is idempotent
    let master = derive_master_secret(&TEST_PRE_MASTER, &test_randoms());
    assert_eq!(
        coordinator.cache().save_by_ticket(ticket, &master),
        CacheInsert::AlreadyPresent
    );
}

#[test]
fn test_rejected_resumption_falls_back_to_key_log() {
    init_tracing();
    let resumed = HelloRandoms::new(TEST_RESUMED_CLIENT_RANDOM, TEST_RESUMED_SERVER_RANDOM);
    let mut keylog = keylog_for(&test_randoms());
    let fresh_pre_master = [0x77u8; 48];
    keylog.push(
        TEST_TIMESTAMP,
        fresh_pre_master.to_vec(),
        derive_master_secret(&fresh_pre_master, &resumed),
    );

    let ticket = b"stale-ticket";
    let mut coordinator = SessionCoordinator::new(keylog, DecryptConfig::default());
    full_handshake(&mut coordinator, 1, b"");
    coordinator
        .on_handshake_message(&down(1), &new_session_ticket(ticket))
        .unwrap();

    // The client offers the ticket, but the server runs a full handshake
    coordinator
        .on_handshake_message(&up(2), &client_hello(&TEST_RESUMED_CLIENT_RANDOM, b"", Some(ticket)))
        .unwrap();
    coordinator
        .on_handshake_message(
            &down(2),
            &server_hello(&TEST_RESUMED_SERVER_RANDOM, b"", TLS_RSA_WITH_AES_128_CBC_SHA, 0),
        )
        .unwrap();
    coordinator.on_handshake_message(&down(2), &certificate()).unwrap();
    assert_eq!(coordinator.status(2), Some(SessionState::Keyed));
    assert_eq!(coordinator.keylog().unused_count(), 0);

    let suite = lookup_suite(TLS_RSA_WITH_AES_128_CBC_SHA).unwrap();
    let cipher = lookup_cipher(suite.cipher).unwrap();
    let master = derive_master_secret(&fresh_pre_master, &resumed);
    let kb = KeyBlock::for_suite(&master, &resumed, suite, cipher);
    assert_eq!(coordinator.session(2).unwrap().key_block(), Some(&kb));
}

#[test]
fn test_rejected_ticket_caches_fresh_master_under_new_session_id() {
    init_tracing();
    let resumed = HelloRandoms::new(TEST_RESUMED_CLIENT_RANDOM, TEST_RESUMED_SERVER_RANDOM);
    let mut keylog = keylog_for(&test_randoms());
    let fresh_pre_master = [0x77u8; 48];
    let fresh_master = derive_master_secret(&fresh_pre_master, &resumed);
    keylog.push(TEST_TIMESTAMP, fresh_pre_master.to_vec(), fresh_master);

    let ticket = b"stale-ticket";
    let mut coordinator = SessionCoordinator::new(keylog, DecryptConfig::default());
    full_handshake(&mut coordinator, 1, b"");
    coordinator
        .on_handshake_message(&down(1), &new_session_ticket(ticket))
        .unwrap();

    // The server ignores the ticket and hands out a fresh session id
    coordinator
        .on_handshake_message(&up(2), &client_hello(&TEST_RESUMED_CLIENT_RANDOM, b"", Some(ticket)))
        .unwrap();
    coordinator
        .on_handshake_message(
            &down(2),
            &server_hello(&TEST_RESUMED_SERVER_RANDOM, b"fresh-sid", TLS_RSA_WITH_AES_128_CBC_SHA, 0),
        )
        .unwrap();
    coordinator.on_handshake_message(&down(2), &certificate()).unwrap();
    assert_eq!(coordinator.status(2), Some(SessionState::Keyed));

    assert_eq!(coordinator.cache().lookup_by_id(b"fresh-sid"), Some(fresh_master));
    let stale = derive_master_secret(&TEST_PRE_MASTER, &test_randoms());
    assert_eq!(
        coordinator.cache().save_by_id(b"fresh-sid", &stale),
        CacheInsert::Conflict
    );
}

#[test]
fn test_clear_saved_sessions() {
    let mut coordinator = SessionCoordinator::new(keylog_for(&test_randoms()), DecryptConfig::default());
    full_handshake(&mut coordinator, 1, b"session-0001");
    coordinator.clear_saved_sessions();
    assert!(coordinator.cache().is_empty());

    coordinator
        .on_handshake_message(&up(2), &client_hello(&TEST_RESUMED_CLIENT_RANDOM, b"session-0001", None))
        .unwrap();
    let err = coordinator
        .on_handshake_message(
            &down(2),
            &server_hello(&TEST_RESUMED_SERVER_RANDOM, b"session-0001", TLS_RSA_WITH_AES_128_CBC_SHA, 0),
        )
        .unwrap_err();
    assert!(matches!(err, Error::Session(SessionError::NoCorrelatedKey)));
    assert_eq!(coordinator.status(2), Some(SessionState::Undecryptable));
}

// ============================================================================
// Degraded sessions
// ============================================================================

#[test]
fn test_unknown_cipher_suite_passes_through() {
    let mut coordinator = SessionCoordinator::new(keylog_for(&test_randoms()), DecryptConfig::default());
    coordinator
        .on_handshake_message(&up(3), &client_hello(&TEST_CLIENT_RANDOM, b"", None))
        .unwrap();
    let err = coordinator
        .on_handshake_message(
            &down(3),
            &server_hello(&TEST_SERVER_RANDOM, b"", TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256, 0),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Session(SessionError::UnsupportedCipherSuite(TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256))
    ));
    assert_eq!(coordinator.status(3), Some(SessionState::Undecryptable));
    // The key log record stays available for other sessions
    assert_eq!(coordinator.keylog().unused_count(), 1);

    let record = coordinator
        .on_application_data(&down(3), b"\x17opaque bytes")
        .unwrap();
    assert_eq!(record.plaintext, b"\x17opaque bytes");
    assert_eq!(record.sequence, None);
}

#[test]
fn test_missing_key_is_undecryptable() {
    let mut coordinator = SessionCoordinator::new(KeyLog::new(), DecryptConfig::default());
    coordinator
        .on_handshake_message(&up(4), &client_hello(&TEST_CLIENT_RANDOM, b"", None))
        .unwrap();
    let err = coordinator
        .on_handshake_message(
            &down(4),
            &server_hello(&TEST_SERVER_RANDOM, b"", TLS_RSA_WITH_AES_128_CBC_SHA, 0),
        )
        .unwrap_err();
    assert!(err.is_session_local());
    assert_eq!(coordinator.status(4), Some(SessionState::Undecryptable));
}

#[test]
fn test_malformed_handshake_isolated_to_connection() {
    let mut coordinator = SessionCoordinator::new(keylog_for(&test_randoms()), DecryptConfig::default());

    // ClientHello whose session id length runs past the message
    let mut broken = client_hello(&TEST_CLIENT_RANDOM, b"", None);
    broken[38] = 0xFF;
    assert!(coordinator
        .on_record(&up(5), content_type::HANDSHAKE, &broken)
        .is_err());
    assert_eq!(coordinator.status(5), Some(SessionState::Undecryptable));

    // Another connection in the same trace is unaffected
    full_handshake(&mut coordinator, 6, b"");
    assert_eq!(coordinator.status(6), Some(SessionState::Keyed));
}

#[test]
fn test_application_data_without_handshake() {
    let mut coordinator = SessionCoordinator::new(KeyLog::new(), DecryptConfig::default());
    let record = coordinator
        .on_application_data(&up(42), b"mid-stream capture")
        .unwrap();
    assert_eq!(record.plaintext, b"mid-stream capture");
    assert_eq!(coordinator.status(42), Some(SessionState::Uninitialized));
}

#[test]
fn test_next_protocol_recorded() {
    let mut coordinator = SessionCoordinator::new(keylog_for(&test_randoms()), DecryptConfig::default());
    full_handshake(&mut coordinator, 1, b"");
    coordinator
        .on_handshake_message(&up(1), &next_protocol("spdy/3"))
        .unwrap();
    assert_eq!(coordinator.next_protocol(1), Some(NextProtocol::Spdy3));

    let err = coordinator
        .on_handshake_message(&up(1), &next_protocol("gopher"))
        .unwrap_err();
    assert!(matches!(err, Error::Handshake(_)));
    assert_eq!(coordinator.status(1), Some(SessionState::Keyed));
}
