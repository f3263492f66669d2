//! TLS 1.0 key derivation.
//!
//! Implements:
//! - HMAC-MD5 / HMAC-SHA1 (RFC 2104)
//! - The TLS 1.0 PRF, `P_MD5(S1, label + seed) XOR P_SHA1(S2, label + seed)`
//! - Master secret derivation and key block expansion (RFC 2246 section 6.3)

use std::ops::Range;

use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;

use super::catalog::{CipherAlgorithmDescriptor, CipherSuiteDescriptor};

/// Master secret length, fixed by the protocol.
pub const MASTER_SECRET_LEN: usize = 48;

/// Length of each hello random.
pub const RANDOM_LEN: usize = 32;

/// A 48-byte TLS master secret.
pub type MasterSecret = [u8; MASTER_SECRET_LEN];

/// Hash algorithm used for record MACs and the PRF halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
}

impl HashAlgorithm {
    /// Get the output length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => 16,
            HashAlgorithm::Sha1 => 20,
        }
    }
}

// ============================================================================
// HMAC
// ============================================================================

/// Incremental HMAC over MD5 or SHA-1.
///
/// Keys longer than the 64-byte block size are hashed first, as RFC 2104
/// requires.
pub enum HmacContext {
    Md5(Hmac<Md5>),
    Sha1(Hmac<Sha1>),
}

impl HmacContext {
    pub fn new(hash: HashAlgorithm, key: &[u8]) -> Self {
        match hash {
            HashAlgorithm::Md5 => HmacContext::Md5(
                Hmac::<Md5>::new_from_slice(key).expect("HMAC accepts keys of any length"),
            ),
            HashAlgorithm::Sha1 => HmacContext::Sha1(
                Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts keys of any length"),
            ),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            HmacContext::Md5(_) => HashAlgorithm::Md5,
            HmacContext::Sha1(_) => HashAlgorithm::Sha1,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            HmacContext::Md5(mac) => mac.update(data),
            HmacContext::Sha1(mac) => mac.update(data),
        }
    }

    pub fn finish(self) -> Vec<u8> {
        match self {
            HmacContext::Md5(mac) => mac.finalize().into_bytes().to_vec(),
            HmacContext::Sha1(mac) => mac.finalize().into_bytes().to_vec(),
        }
    }
}

impl std::fmt::Debug for HmacContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HmacContext").field(&self.algorithm()).finish()
    }
}

/// One-shot HMAC.
pub fn hmac(hash: HashAlgorithm, key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut ctx = HmacContext::new(hash, key);
    ctx.update(message);
    ctx.finish()
}

// ============================================================================
// TLS 1.0 PRF
// ============================================================================

/// TLS 1.0 PRF.
///
/// PRF(secret, label, seed) = P_MD5(S1, label + seed) XOR P_SHA1(S2, label + seed)
///
/// S1 is the first ceil(len/2) bytes of the secret and S2 the last
/// ceil(len/2) bytes, so for odd lengths they share the middle byte.
pub fn tls_prf(secret: &[u8], label: &[u8], seed: &[u8], output_len: usize) -> Vec<u8> {
    let mut label_seed = Vec::with_capacity(label.len() + seed.len());
    label_seed.extend_from_slice(label);
    label_seed.extend_from_slice(seed);

    let half = secret.len().div_ceil(2);
    let s1 = &secret[..half];
    let s2 = &secret[secret.len() - half..];

    let mut output = p_hash(s1, &label_seed, output_len, HashAlgorithm::Md5);
    let sha = p_hash(s2, &label_seed, output_len, HashAlgorithm::Sha1);
    for (out, byte) in output.iter_mut().zip(sha) {
        *out ^= byte;
    }
    output
}

/// P_hash expansion.
///
/// With A(0) = seed, A(i) = HMAC_hash(secret, A(i-1)):
///   P_hash(secret, seed) = HMAC_hash(secret, A(1) + seed) +
///                          HMAC_hash(secret, A(2) + seed) + ...
fn p_hash(secret: &[u8], seed: &[u8], output_len: usize, hash: HashAlgorithm) -> Vec<u8> {
    let mut result = Vec::with_capacity(output_len);
    let mut a = hmac(hash, secret, seed);

    while result.len() < output_len {
        let mut ctx = HmacContext::new(hash, secret);
        ctx.update(&a);
        ctx.update(seed);
        let block = ctx.finish();

        let take = (output_len - result.len()).min(block.len());
        result.extend_from_slice(&block[..take]);

        a = hmac(hash, secret, &a);
    }

    result
}

// ============================================================================
// Master secret and key block
// ============================================================================

/// The two hello randoms of a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloRandoms {
    pub client: [u8; RANDOM_LEN],
    pub server: [u8; RANDOM_LEN],
}

impl HelloRandoms {
    pub fn new(client: [u8; RANDOM_LEN], server: [u8; RANDOM_LEN]) -> Self {
        Self { client, server }
    }

    /// `client_random + server_random`, the seed for "master secret".
    pub fn master_secret_seed(&self) -> [u8; 2 * RANDOM_LEN] {
        concat_randoms(&self.client, &self.server)
    }

    /// `server_random + client_random`, the seed for "key expansion".
    pub fn key_expansion_seed(&self) -> [u8; 2 * RANDOM_LEN] {
        concat_randoms(&self.server, &self.client)
    }
}

fn concat_randoms(first: &[u8; RANDOM_LEN], second: &[u8; RANDOM_LEN]) -> [u8; 2 * RANDOM_LEN] {
    let mut seed = [0u8; 2 * RANDOM_LEN];
    seed[..RANDOM_LEN].copy_from_slice(first);
    seed[RANDOM_LEN..].copy_from_slice(second);
    seed
}

/// master_secret = PRF(pre_master_secret, "master secret", client_random + server_random)[0..48]
pub fn derive_master_secret(pre_master: &[u8], randoms: &HelloRandoms) -> MasterSecret {
    let derived = tls_prf(
        pre_master,
        b"master secret",
        &randoms.master_secret_seed(),
        MASTER_SECRET_LEN,
    );
    let mut master = [0u8; MASTER_SECRET_LEN];
    master.copy_from_slice(&derived);
    master
}

/// Expanded key material for one session.
///
/// The block is partitioned as:
///   client_write_MAC_secret[mac_len]
///   server_write_MAC_secret[mac_len]
///   client_write_key[key_len]
///   server_write_key[key_len]
///   client_write_IV[iv_len]
///   server_write_IV[iv_len]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBlock {
    bytes: Vec<u8>,
    mac_len: usize,
    key_len: usize,
    iv_len: usize,
}

impl KeyBlock {
    /// key_block = PRF(master_secret, "key expansion", server_random + client_random)
    pub fn derive(
        master: &MasterSecret,
        randoms: &HelloRandoms,
        mac_len: usize,
        key_len: usize,
        iv_len: usize,
    ) -> Self {
        let len = 2 * (mac_len + key_len + iv_len);
        let bytes = tls_prf(master, b"key expansion", &randoms.key_expansion_seed(), len);
        Self {
            bytes,
            mac_len,
            key_len,
            iv_len,
        }
    }

    /// Derive the key block sized for a suite and its cipher.
    pub fn for_suite(
        master: &MasterSecret,
        randoms: &HelloRandoms,
        suite: &CipherSuiteDescriptor,
        cipher: &CipherAlgorithmDescriptor,
    ) -> Self {
        Self::derive(
            master,
            randoms,
            suite.mac_len(),
            cipher.key_material,
            cipher.iv_len(),
        )
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte ranges of the six slices, in wire order.
    pub fn layout(&self) -> [Range<usize>; 6] {
        let mut offset = 0;
        let mut next = |len: usize| {
            let range = offset..offset + len;
            offset += len;
            range
        };
        [
            next(self.mac_len),
            next(self.mac_len),
            next(self.key_len),
            next(self.key_len),
            next(self.iv_len),
            next(self.iv_len),
        ]
    }

    fn slice(&self, index: usize) -> &[u8] {
        let range = self.layout()[index].clone();
        &self.bytes[range]
    }

    pub fn client_write_mac_secret(&self) -> &[u8] {
        self.slice(0)
    }

    pub fn server_write_mac_secret(&self) -> &[u8] {
        self.slice(1)
    }

    pub fn client_write_key(&self) -> &[u8] {
        self.slice(2)
    }

    pub fn server_write_key(&self) -> &[u8] {
        self.slice(3)
    }

    pub fn client_write_iv(&self) -> &[u8] {
        self.slice(4)
    }

    pub fn server_write_iv(&self) -> &[u8] {
        self.slice(5)
    }
}
