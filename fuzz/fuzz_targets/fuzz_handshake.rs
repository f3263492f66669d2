//! Fuzz target for the handshake parser and record dispatch.
//!
//! Exercises:
//! - Every handshake message parser, including hello extension walking
//! - Message splitting across concatenated messages
//! - Record reassembly through the session coordinator

#![no_main]

use libfuzzer_sys::fuzz_target;
use tracetls_core::tls::{message_len, parse_handshake, DecryptConfig, KeyLog};
use tracetls_core::{SessionCoordinator, StreamContext};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // Walk the input as back-to-back handshake messages
    let mut rest = data;
    while let Some(len) = message_len(rest) {
        let _ = parse_handshake(rest);
        if len > rest.len() {
            break;
        }
        rest = &rest[len..];
    }

    // Same bytes as records: first byte picks content type and direction
    let mut coordinator = SessionCoordinator::new(KeyLog::new(), DecryptConfig::default());
    for (i, chunk) in data[1..].chunks(usize::from(data[0] % 64) + 1).enumerate() {
        let ctx = if i % 2 == 0 {
            StreamContext::to_server(1, i as f64)
        } else {
            StreamContext::to_client(1, i as f64)
        };
        let content_type = 20 + (chunk[0] % 4);
        let _ = coordinator.on_record(&ctx, content_type, chunk);
    }
});
