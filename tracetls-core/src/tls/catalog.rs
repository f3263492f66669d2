//! Static cipher suite and cipher algorithm tables.
//!
//! Covers the classic TLS 1.0 suites that can be decrypted from a leaked
//! master secret: NULL, RC4, DES, 3DES and AES-CBC over RSA or anonymous
//! Diffie-Hellman key exchange, with MD5 or SHA-1 record MACs.
//!
//! A suite or cipher that is missing from these tables is not an error. The
//! caller treats the session as undecryptable and passes its records through.

use super::kdf::HashAlgorithm;

/// Key exchange algorithm of a cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyExchange {
    Null,
    Rsa,
    DhAnon,
}

/// Bulk cipher identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherId {
    Null,
    IdeaCbc,
    Rc2Cbc40,
    Rc4_40,
    Rc4_128,
    Des40Cbc,
    DesCbc,
    TripleDesEdeCbc,
    Aes128Cbc,
    Aes256Cbc,
}

/// Whether a cipher processes a byte stream or fixed-size blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherKind {
    Stream,
    Block,
}

/// Algorithm family the cipher backend must provide for a cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendAlgorithm {
    Null,
    Rc2,
    Rc4,
    Des,
    TripleDes,
    Aes,
}

/// A negotiable cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherSuiteDescriptor {
    /// Wire identifier (e.g. 0x002F)
    pub id: u16,
    /// IANA name
    pub name: &'static str,
    pub key_exchange: KeyExchange,
    pub cipher: CipherId,
    /// Record MAC hash, `None` for the NULL MAC
    pub mac: Option<HashAlgorithm>,
}

impl CipherSuiteDescriptor {
    /// Length of each direction's MAC secret in the key block.
    pub fn mac_len(&self) -> usize {
        self.mac.map_or(0, |hash| hash.output_len())
    }
}

/// Parameters of a bulk cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherAlgorithmDescriptor {
    pub cipher: CipherId,
    pub kind: CipherKind,
    /// Key bytes taken from the key block per direction
    pub key_material: usize,
    /// Effective key length after export expansion
    pub expanded_key_material: usize,
    /// Block size, which is also the IV length; 0 for stream ciphers
    pub block_size: usize,
    /// Backend family, `None` when no backend implements it
    pub backend: Option<BackendAlgorithm>,
}

impl CipherAlgorithmDescriptor {
    /// IV bytes taken from the key block per direction.
    pub fn iv_len(&self) -> usize {
        match self.kind {
            CipherKind::Block => self.block_size,
            CipherKind::Stream => 0,
        }
    }

    pub fn is_block(&self) -> bool {
        self.kind == CipherKind::Block
    }
}

// ============================================================================
// Tables
// ============================================================================

const fn suite(
    id: u16,
    name: &'static str,
    key_exchange: KeyExchange,
    cipher: CipherId,
    mac: Option<HashAlgorithm>,
) -> CipherSuiteDescriptor {
    CipherSuiteDescriptor {
        id,
        name,
        key_exchange,
        cipher,
        mac,
    }
}

const fn cipher(
    cipher: CipherId,
    kind: CipherKind,
    key_material: usize,
    expanded_key_material: usize,
    block_size: usize,
    backend: Option<BackendAlgorithm>,
) -> CipherAlgorithmDescriptor {
    CipherAlgorithmDescriptor {
        cipher,
        kind,
        key_material,
        expanded_key_material,
        block_size,
        backend,
    }
}

use self::CipherId as C;
use self::HashAlgorithm::{Md5, Sha1};
use self::KeyExchange::{DhAnon, Rsa};

static CIPHER_SUITES: [CipherSuiteDescriptor; 12] = [
    suite(0x0000, "TLS_NULL_WITH_NULL_NULL", KeyExchange::Null, C::Null, None),
    suite(0x0004, "TLS_RSA_WITH_RC4_128_MD5", Rsa, C::Rc4_128, Some(Md5)),
    suite(0x0005, "TLS_RSA_WITH_RC4_128_SHA", Rsa, C::Rc4_128, Some(Sha1)),
    suite(0x0009, "TLS_RSA_WITH_DES_CBC_SHA", Rsa, C::DesCbc, Some(Sha1)),
    suite(0x000A, "TLS_RSA_WITH_3DES_EDE_CBC_SHA", Rsa, C::TripleDesEdeCbc, Some(Sha1)),
    suite(0x0018, "TLS_DH_anon_WITH_RC4_128_MD5", DhAnon, C::Rc4_128, Some(Md5)),
    suite(0x001A, "TLS_DH_anon_WITH_DES_CBC_SHA", DhAnon, C::DesCbc, Some(Sha1)),
    suite(0x001B, "TLS_DH_anon_WITH_3DES_EDE_CBC_SHA", DhAnon, C::TripleDesEdeCbc, Some(Sha1)),
    suite(0x002F, "TLS_RSA_WITH_AES_128_CBC_SHA", Rsa, C::Aes128Cbc, Some(Sha1)),
    suite(0x0034, "TLS_DH_anon_WITH_AES_128_CBC_SHA", DhAnon, C::Aes128Cbc, Some(Sha1)),
    suite(0x0035, "TLS_RSA_WITH_AES_256_CBC_SHA", Rsa, C::Aes256Cbc, Some(Sha1)),
    suite(0x003A, "TLS_DH_anon_WITH_AES_256_CBC_SHA", DhAnon, C::Aes256Cbc, Some(Sha1)),
];

static CIPHERS: [CipherAlgorithmDescriptor; 10] = [
    cipher(C::Null, CipherKind::Stream, 0, 0, 0, Some(BackendAlgorithm::Null)),
    cipher(C::IdeaCbc, CipherKind::Block, 16, 16, 8, None),
    cipher(C::Rc2Cbc40, CipherKind::Block, 5, 16, 0, Some(BackendAlgorithm::Rc2)),
    cipher(C::Rc4_40, CipherKind::Stream, 5, 16, 0, Some(BackendAlgorithm::Rc4)),
    cipher(C::Rc4_128, CipherKind::Stream, 16, 16, 0, Some(BackendAlgorithm::Rc4)),
    cipher(C::Des40Cbc, CipherKind::Block, 5, 8, 8, Some(BackendAlgorithm::Des)),
    cipher(C::DesCbc, CipherKind::Block, 8, 8, 8, Some(BackendAlgorithm::Des)),
    cipher(C::TripleDesEdeCbc, CipherKind::Block, 24, 24, 8, Some(BackendAlgorithm::TripleDes)),
    cipher(C::Aes128Cbc, CipherKind::Block, 16, 16, 16, Some(BackendAlgorithm::Aes)),
    cipher(C::Aes256Cbc, CipherKind::Block, 32, 32, 16, Some(BackendAlgorithm::Aes)),
];

/// Look up a cipher suite by wire identifier.
pub fn lookup_suite(id: u16) -> Option<&'static CipherSuiteDescriptor> {
    CIPHER_SUITES.iter().find(|s| s.id == id)
}

/// Look up the parameters of a bulk cipher.
pub fn lookup_cipher(id: CipherId) -> Option<&'static CipherAlgorithmDescriptor> {
    CIPHERS.iter().find(|c| c.cipher == id)
}

/// All known cipher suites.
pub fn cipher_suites() -> &'static [CipherSuiteDescriptor] {
    &CIPHER_SUITES
}

/// All known bulk ciphers.
pub fn ciphers() -> &'static [CipherAlgorithmDescriptor] {
    &CIPHERS
}

/// IANA name of a suite, for logging.
pub fn cipher_suite_name(id: u16) -> &'static str {
    lookup_suite(id).map_or("UNKNOWN", |s| s.name)
}
