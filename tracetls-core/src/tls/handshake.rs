//! TLS 1.0 handshake message parser.
//!
//! Parses one framed handshake message (4-byte header plus body) into the
//! fields needed to key a session: hello randoms, session ids, the negotiated
//! suite and compression method, session tickets and the NPN selection.
//!
//! Failures come in three kinds (see [`ParseFailure`]):
//! - malformed: a length field disagrees with the buffer. The session can no
//!   longer be parsed safely.
//! - unsupported: a known message whose fields are irrelevant to decryption.
//! - unrecognized: an unknown handshake type or NPN protocol. Only that message
//!   is lost.

use smallvec::SmallVec;
use thiserror::Error;

use super::kdf::RANDOM_LEN;

/// Handshake message type bytes.
pub mod handshake_type {
    pub const CLIENT_HELLO: u8 = 1;
    pub const SERVER_HELLO: u8 = 2;
    pub const NEW_SESSION_TICKET: u8 = 4;
    pub const CERTIFICATE: u8 = 11;
    pub const SERVER_KEY_EXCHANGE: u8 = 12;
    pub const CERTIFICATE_REQUEST: u8 = 13;
    pub const SERVER_HELLO_DONE: u8 = 14;
    pub const CERTIFICATE_VERIFY: u8 = 15;
    pub const CLIENT_KEY_EXCHANGE: u8 = 16;
    pub const FINISHED: u8 = 20;
    pub const NEXT_PROTOCOL: u8 = 67;
}

/// Hello extension types.
pub mod extension_type {
    pub const SESSION_TICKET: u16 = 35;
}

/// Handshake header: type (1) + length (3).
pub const HANDSHAKE_HEADER_LEN: usize = 4;

/// Length of the Finished verify_data in TLS 1.0.
pub const VERIFY_DATA_LEN: usize = 12;

/// Session id, at most 32 bytes on the wire in practice.
pub type SessionId = SmallVec<[u8; 32]>;

/// Errors from [`parse_handshake`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("{message} truncated: need {needed} bytes, have {have}")]
    Truncated {
        message: &'static str,
        needed: usize,
        have: usize,
    },

    #[error("{message} length mismatch: expected {expected}, got {actual}")]
    LengthMismatch {
        message: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{message} has an empty {field}")]
    EmptyField {
        message: &'static str,
        field: &'static str,
    },

    #[error("Extension at offset {offset} overruns the {declared}-byte extension block")]
    ExtensionOverrun { offset: usize, declared: usize },

    #[error("Unsupported protocol version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("{} fields are not decoded", .0.name())]
    Unsupported(HandshakeType),

    #[error("Unrecognized next protocol: {0:?}")]
    UnrecognizedProtocol(String),

    #[error("Unknown handshake type: {0}")]
    UnknownType(u8),
}

/// Severity of a handshake parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailure {
    /// Length inconsistency; the session is no longer safely parseable.
    Malformed,
    /// Recognized message that is intentionally not modeled.
    Unsupported,
    /// Unknown content; fails only this message.
    Unrecognized,
}

impl HandshakeError {
    pub fn kind(&self) -> ParseFailure {
        match self {
            HandshakeError::Unsupported(_) => ParseFailure::Unsupported,
            HandshakeError::UnrecognizedProtocol(_) | HandshakeError::UnknownType(_) => {
                ParseFailure::Unrecognized
            }
            _ => ParseFailure::Malformed,
        }
    }

    pub fn is_malformed(&self) -> bool {
        self.kind() == ParseFailure::Malformed
    }
}

/// Handshake message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeType {
    ClientHello,
    ServerHello,
    NewSessionTicket,
    Certificate,
    ServerKeyExchange,
    CertificateRequest,
    ServerHelloDone,
    CertificateVerify,
    ClientKeyExchange,
    Finished,
    NextProtocol,
}

impl HandshakeType {
    pub fn from_wire(value: u8) -> Option<Self> {
        use handshake_type::*;
        match value {
            CLIENT_HELLO => Some(Self::ClientHello),
            SERVER_HELLO => Some(Self::ServerHello),
            NEW_SESSION_TICKET => Some(Self::NewSessionTicket),
            CERTIFICATE => Some(Self::Certificate),
            SERVER_KEY_EXCHANGE => Some(Self::ServerKeyExchange),
            CERTIFICATE_REQUEST => Some(Self::CertificateRequest),
            SERVER_HELLO_DONE => Some(Self::ServerHelloDone),
            CERTIFICATE_VERIFY => Some(Self::CertificateVerify),
            CLIENT_KEY_EXCHANGE => Some(Self::ClientKeyExchange),
            FINISHED => Some(Self::Finished),
            NEXT_PROTOCOL => Some(Self::NextProtocol),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u8 {
        use handshake_type::*;
        match self {
            Self::ClientHello => CLIENT_HELLO,
            Self::ServerHello => SERVER_HELLO,
            Self::NewSessionTicket => NEW_SESSION_TICKET,
            Self::Certificate => CERTIFICATE,
            Self::ServerKeyExchange => SERVER_KEY_EXCHANGE,
            Self::CertificateRequest => CERTIFICATE_REQUEST,
            Self::ServerHelloDone => SERVER_HELLO_DONE,
            Self::CertificateVerify => CERTIFICATE_VERIFY,
            Self::ClientKeyExchange => CLIENT_KEY_EXCHANGE,
            Self::Finished => FINISHED,
            Self::NextProtocol => NEXT_PROTOCOL,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ClientHello => "ClientHello",
            Self::ServerHello => "ServerHello",
            Self::NewSessionTicket => "NewSessionTicket",
            Self::Certificate => "Certificate",
            Self::ServerKeyExchange => "ServerKeyExchange",
            Self::CertificateRequest => "CertificateRequest",
            Self::ServerHelloDone => "ServerHelloDone",
            Self::CertificateVerify => "CertificateVerify",
            Self::ClientKeyExchange => "ClientKeyExchange",
            Self::Finished => "Finished",
            Self::NextProtocol => "NextProtocol",
        }
    }
}

/// Application protocol selected through NPN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NextProtocol {
    Spdy2,
    Spdy3,
    Http11,
}

impl NextProtocol {
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.eq_ignore_ascii_case("spdy/3") {
            Some(Self::Spdy3)
        } else if name.eq_ignore_ascii_case("spdy/2") {
            Some(Self::Spdy2)
        } else if name.eq_ignore_ascii_case("http/1.1") {
            Some(Self::Http11)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spdy2 => "spdy/2",
            Self::Spdy3 => "spdy/3",
            Self::Http11 => "http/1.1",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub random: [u8; RANDOM_LEN],
    pub session_id: SessionId,
    /// Contents of the session_ticket extension; `None` when absent.
    pub session_ticket: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub random: [u8; RANDOM_LEN],
    pub session_id: SessionId,
    pub cipher_suite: u16,
    pub compression_method: u8,
    /// Contents of the session_ticket extension; `None` when absent.
    pub session_ticket: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKeyExchange {
    /// RSA-encrypted pre-master secret (or DH public value). Kept for
    /// reporting only; keys always come from the key log.
    pub encrypted_pre_master: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSessionTicket {
    pub ticket: Vec<u8>,
}

/// A parsed handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    Certificate,
    ServerHelloDone,
    ClientKeyExchange(ClientKeyExchange),
    Finished([u8; VERIFY_DATA_LEN]),
    NewSessionTicket(NewSessionTicket),
    NextProtocol(NextProtocol),
}

impl HandshakeMessage {
    pub fn handshake_type(&self) -> HandshakeType {
        match self {
            Self::ClientHello(_) => HandshakeType::ClientHello,
            Self::ServerHello(_) => HandshakeType::ServerHello,
            Self::Certificate => HandshakeType::Certificate,
            Self::ServerHelloDone => HandshakeType::ServerHelloDone,
            Self::ClientKeyExchange(_) => HandshakeType::ClientKeyExchange,
            Self::Finished(_) => HandshakeType::Finished,
            Self::NewSessionTicket(_) => HandshakeType::NewSessionTicket,
            Self::NextProtocol(_) => HandshakeType::NextProtocol,
        }
    }
}

/// Total length (header included) of the handshake message at the start of
/// `buf`, or `None` if the header itself is incomplete.
pub fn message_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < HANDSHAKE_HEADER_LEN {
        return None;
    }
    Some(HANDSHAKE_HEADER_LEN + read_u24(buf, 1))
}

/// Parse the handshake message at the start of `buf`.
///
/// Bytes past the declared message length are ignored, so a buffer holding
/// several messages yields the first one; use [`message_len`] to advance.
pub fn parse_handshake(buf: &[u8]) -> Result<HandshakeMessage, HandshakeError> {
    need("handshake header", buf, HANDSHAKE_HEADER_LEN)?;
    let total = HANDSHAKE_HEADER_LEN + read_u24(buf, 1);
    need("handshake", buf, total)?;
    let msg = &buf[..total];

    let msg_type = HandshakeType::from_wire(msg[0]).ok_or(HandshakeError::UnknownType(msg[0]))?;

    match msg_type {
        HandshakeType::ClientHello => parse_client_hello(msg).map(HandshakeMessage::ClientHello),
        HandshakeType::ServerHello => parse_server_hello(msg).map(HandshakeMessage::ServerHello),
        HandshakeType::Certificate => parse_certificate(msg),
        HandshakeType::ServerHelloDone => {
            expect_body_len("ServerHelloDone", msg, 0)?;
            Ok(HandshakeMessage::ServerHelloDone)
        }
        HandshakeType::ClientKeyExchange => {
            parse_client_key_exchange(msg).map(HandshakeMessage::ClientKeyExchange)
        }
        HandshakeType::Finished => {
            expect_body_len("Finished", msg, VERIFY_DATA_LEN)?;
            let mut verify_data = [0u8; VERIFY_DATA_LEN];
            verify_data.copy_from_slice(&msg[HANDSHAKE_HEADER_LEN..]);
            Ok(HandshakeMessage::Finished(verify_data))
        }
        HandshakeType::NewSessionTicket => {
            parse_new_session_ticket(msg).map(HandshakeMessage::NewSessionTicket)
        }
        HandshakeType::NextProtocol => parse_next_protocol(msg).map(HandshakeMessage::NextProtocol),
        HandshakeType::ServerKeyExchange
        | HandshakeType::CertificateRequest
        | HandshakeType::CertificateVerify => Err(HandshakeError::Unsupported(msg_type)),
    }
}

// ============================================================================
// Message parsers
// ============================================================================
//
// Offsets below are relative to the start of the message, header included.

fn parse_client_hello(msg: &[u8]) -> Result<ClientHello, HandshakeError> {
    const NAME: &str = "ClientHello";

    // header(4) + version(2) + random(32) + session_id_len(1)
    need(NAME, msg, 39)?;
    check_version(msg[4], msg[5])?;
    let random = read_random(msg);

    let sid_len = msg[38] as usize;
    need(NAME, msg, 41 + sid_len)?;
    let session_id = SessionId::from_slice(&msg[39..39 + sid_len]);

    let suites_len = read_u16(msg, 39 + sid_len) as usize;
    need(NAME, msg, 42 + sid_len + suites_len)?;

    let compression_len = msg[41 + sid_len + suites_len] as usize;
    let body_end = 42 + sid_len + suites_len + compression_len;
    need(NAME, msg, body_end)?;

    let session_ticket = parse_optional_extensions(NAME, msg, body_end)?;

    Ok(ClientHello {
        random,
        session_id,
        session_ticket,
    })
}

fn parse_server_hello(msg: &[u8]) -> Result<ServerHello, HandshakeError> {
    const NAME: &str = "ServerHello";

    // header(4) + version(2) + random(32) + session_id_len(1) + suite(2) + compression(1)
    need(NAME, msg, 42)?;
    check_version(msg[4], msg[5])?;
    let random = read_random(msg);

    let sid_len = msg[38] as usize;
    let body_end = 42 + sid_len;
    need(NAME, msg, body_end)?;
    let session_id = SessionId::from_slice(&msg[39..39 + sid_len]);

    let cipher_suite = read_u16(msg, 39 + sid_len);
    let compression_method = msg[41 + sid_len];

    let session_ticket = parse_optional_extensions(NAME, msg, body_end)?;

    Ok(ServerHello {
        random,
        session_id,
        cipher_suite,
        compression_method,
        session_ticket,
    })
}

fn parse_certificate(msg: &[u8]) -> Result<HandshakeMessage, HandshakeError> {
    const NAME: &str = "Certificate";

    need(NAME, msg, 7)?;
    let chain_len = read_u24(msg, 4);
    let body_len = msg.len() - HANDSHAKE_HEADER_LEN;
    if chain_len + 3 != body_len {
        return Err(HandshakeError::LengthMismatch {
            message: NAME,
            expected: chain_len + 3,
            actual: body_len,
        });
    }
    Ok(HandshakeMessage::Certificate)
}

fn parse_client_key_exchange(msg: &[u8]) -> Result<ClientKeyExchange, HandshakeError> {
    const NAME: &str = "ClientKeyExchange";

    need(NAME, msg, 6)?;
    let len = read_u16(msg, 4) as usize;
    need(NAME, msg, 6 + len)?;
    Ok(ClientKeyExchange {
        encrypted_pre_master: msg[6..6 + len].to_vec(),
    })
}

fn parse_new_session_ticket(msg: &[u8]) -> Result<NewSessionTicket, HandshakeError> {
    const NAME: &str = "NewSessionTicket";

    // header(4) + lifetime_hint(4) + ticket_len(2)
    need(NAME, msg, 10)?;
    let ticket_len = read_u16(msg, 8) as usize;
    if ticket_len == 0 {
        return Err(HandshakeError::EmptyField {
            message: NAME,
            field: "ticket",
        });
    }
    if msg.len() != 10 + ticket_len {
        return Err(HandshakeError::LengthMismatch {
            message: NAME,
            expected: 10 + ticket_len,
            actual: msg.len(),
        });
    }
    Ok(NewSessionTicket {
        ticket: msg[10..].to_vec(),
    })
}

fn parse_next_protocol(msg: &[u8]) -> Result<NextProtocol, HandshakeError> {
    const NAME: &str = "NextProtocol";

    need(NAME, msg, 5)?;
    let len = msg[4] as usize;
    if len == 0 {
        return Err(HandshakeError::EmptyField {
            message: NAME,
            field: "protocol",
        });
    }
    need(NAME, msg, 5 + len)?;

    // Trailing padding after the name is not inspected
    let name = String::from_utf8_lossy(&msg[5..5 + len]);
    NextProtocol::from_name(&name).ok_or_else(|| HandshakeError::UnrecognizedProtocol(name.into_owned()))
}

/// Parse the extension block that may follow a hello body ending at `start`.
///
/// A hello that ends exactly at `start` has no extensions. Otherwise the
/// 2-byte block length must account for every remaining byte.
fn parse_optional_extensions(
    message: &'static str,
    msg: &[u8],
    start: usize,
) -> Result<Option<Vec<u8>>, HandshakeError> {
    if msg.len() == start {
        return Ok(None);
    }
    need(message, msg, start + 2)?;
    let block_len = read_u16(msg, start) as usize;
    if msg.len() != start + 2 + block_len {
        return Err(HandshakeError::LengthMismatch {
            message,
            expected: start + 2 + block_len,
            actual: msg.len(),
        });
    }
    parse_extensions(&msg[start + 2..])
}

/// Walk (type, length) pairs, returning the session_ticket contents if present.
fn parse_extensions(block: &[u8]) -> Result<Option<Vec<u8>>, HandshakeError> {
    let mut ticket = None;
    let mut offset = 0;

    while offset < block.len() {
        if offset + 4 > block.len() {
            return Err(HandshakeError::ExtensionOverrun {
                offset,
                declared: block.len(),
            });
        }
        let ext_type = read_u16(block, offset);
        let ext_len = read_u16(block, offset + 2) as usize;
        let data_start = offset + 4;
        if data_start + ext_len > block.len() {
            return Err(HandshakeError::ExtensionOverrun {
                offset,
                declared: block.len(),
            });
        }

        if ext_type == extension_type::SESSION_TICKET {
            ticket = Some(block[data_start..data_start + ext_len].to_vec());
        }

        offset = data_start + ext_len;
    }

    Ok(ticket)
}

// ============================================================================
// Helpers
// ============================================================================

fn need(message: &'static str, buf: &[u8], needed: usize) -> Result<(), HandshakeError> {
    if buf.len() < needed {
        return Err(HandshakeError::Truncated {
            message,
            needed,
            have: buf.len(),
        });
    }
    Ok(())
}

fn expect_body_len(message: &'static str, msg: &[u8], expected: usize) -> Result<(), HandshakeError> {
    let actual = msg.len() - HANDSHAKE_HEADER_LEN;
    if actual != expected {
        return Err(HandshakeError::LengthMismatch {
            message,
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_version(major: u8, minor: u8) -> Result<(), HandshakeError> {
    if (major, minor) != (3, 1) {
        return Err(HandshakeError::UnsupportedVersion { major, minor });
    }
    Ok(())
}

fn read_random(msg: &[u8]) -> [u8; RANDOM_LEN] {
    let mut random = [0u8; RANDOM_LEN];
    random.copy_from_slice(&msg[6..6 + RANDOM_LEN]);
    random
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

fn read_u24(buf: &[u8], offset: usize) -> usize {
    ((buf[offset] as usize) << 16) | ((buf[offset + 1] as usize) << 8) | (buf[offset + 2] as usize)
}
