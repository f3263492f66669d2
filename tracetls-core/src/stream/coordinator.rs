//! Per-connection TLS session coordination.
//!
//! The coordinator owns one [`TlsSession`] per connection and drives it from
//! the events a capture pipeline produces: framed handshake messages,
//! application-data records, and connection teardown. It also owns the key
//! log and the resumption cache, which are shared by every connection in a
//! trace.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::tls::{
    content_type, message_len, parse_handshake, CipherBackend, DecryptConfig, DecryptedRecord,
    Direction, HandshakeMessage, HelloRandoms, KeyLog, MasterSecret, NegotiatedParameters,
    NextProtocol, ParseFailure, RustCryptoBackend, ServerHello, SessionCache, SessionError,
    SessionId, SessionState, TlsSession,
};

use super::StreamContext;

/// What the ServerHello settled, kept so keys can be re-resolved later.
#[derive(Debug, Clone, Copy)]
struct Negotiation {
    randoms: HelloRandoms,
    params: NegotiatedParameters,
    timestamp: f64,
}

/// Handshake fields collected between ClientHello and key setup.
#[derive(Debug, Default)]
struct PendingHandshake {
    client_random: Option<[u8; 32]>,
    client_session_id: SessionId,
    client_ticket: Option<Vec<u8>>,
    server_session_id: SessionId,
    negotiation: Option<Negotiation>,
    master: Option<MasterSecret>,
    /// Keys came from the resumption cache rather than the key log
    resumed: bool,
}

/// Per-connection TLS state.
#[derive(Debug)]
struct ConnectionTlsState {
    session: TlsSession,
    pending: PendingHandshake,
    /// Handshake bytes awaiting a complete message, per direction
    handshake_buffers: [BytesMut; 2],
    /// ChangeCipherSpec seen, per direction
    cipher_spec_changed: [bool; 2],
    /// A malformed message was seen; later handshake messages are ignored
    handshake_poisoned: bool,
    next_protocol: Option<NextProtocol>,
}

impl ConnectionTlsState {
    fn new(backend: &Arc<dyn CipherBackend>, cache: &SessionCache, config: &DecryptConfig) -> Self {
        Self {
            session: TlsSession::new(Arc::clone(backend), cache.clone(), config.clone()),
            pending: PendingHandshake::default(),
            handshake_buffers: [BytesMut::new(), BytesMut::new()],
            cipher_spec_changed: [false; 2],
            handshake_poisoned: false,
            next_protocol: None,
        }
    }
}

/// Routes handshake and record events to per-connection sessions.
pub struct SessionCoordinator {
    keylog: KeyLog,
    cache: SessionCache,
    backend: Arc<dyn CipherBackend>,
    config: DecryptConfig,
    sessions: HashMap<u64, ConnectionTlsState>,
}

impl SessionCoordinator {
    /// Coordinator using the RustCrypto backend and a fresh resumption cache.
    pub fn new(keylog: KeyLog, config: DecryptConfig) -> Self {
        Self::with_parts(keylog, Arc::new(RustCryptoBackend), SessionCache::new(), config)
    }

    pub fn with_parts(
        keylog: KeyLog,
        backend: Arc<dyn CipherBackend>,
        cache: SessionCache,
        config: DecryptConfig,
    ) -> Self {
        debug!(keylog_records = keylog.len(), "session coordinator created");
        Self {
            keylog,
            cache,
            backend,
            config,
            sessions: HashMap::new(),
        }
    }

    pub fn keylog(&self) -> &KeyLog {
        &self.keylog
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn config(&self) -> &DecryptConfig {
        &self.config
    }

    /// Number of connections with live state.
    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn status(&self, connection_id: u64) -> Option<SessionState> {
        self.sessions.get(&connection_id).map(|s| s.session.state())
    }

    pub fn session(&self, connection_id: u64) -> Option<&TlsSession> {
        self.sessions.get(&connection_id).map(|s| &s.session)
    }

    /// Protocol announced in the client's NextProtocol message, if any.
    pub fn next_protocol(&self, connection_id: u64) -> Option<NextProtocol> {
        self.sessions
            .get(&connection_id)
            .and_then(|s| s.next_protocol)
    }

    fn state_mut(&mut self, connection_id: u64) -> &mut ConnectionTlsState {
        let Self {
            backend,
            cache,
            config,
            sessions,
            ..
        } = self;
        sessions
            .entry(connection_id)
            .or_insert_with(|| ConnectionTlsState::new(backend, cache, config))
    }

    /// Feed one complete handshake message (4-byte header included).
    ///
    /// Malformed messages make the connection undecryptable and stop
    /// handshake parsing for it. Unsupported messages are skipped.
    /// Unrecognized messages fail on their own.
    pub fn on_handshake_message(&mut self, ctx: &StreamContext, message: &[u8]) -> Result<(), Error> {
        let connection_id = ctx.connection_id;
        let Self {
            keylog,
            backend,
            cache,
            config,
            sessions,
        } = self;
        let state = sessions
            .entry(connection_id)
            .or_insert_with(|| ConnectionTlsState::new(backend, cache, config));

        if state.handshake_poisoned {
            trace!(connection_id, "handshake parsing disabled, message ignored");
            return Ok(());
        }

        let parsed = match parse_handshake(message) {
            Ok(parsed) => parsed,
            Err(e) => match e.kind() {
                ParseFailure::Unsupported => {
                    debug!(connection_id, error = %e, "handshake message skipped");
                    return Ok(());
                }
                ParseFailure::Unrecognized => {
                    warn!(connection_id, error = %e, "unrecognized handshake message");
                    return Err(e.into());
                }
                ParseFailure::Malformed => {
                    warn!(connection_id, error = %e, "malformed handshake, session undecryptable");
                    state.handshake_poisoned = true;
                    state.session.mark_undecryptable();
                    return Err(e.into());
                }
            },
        };

        debug!(
            connection_id,
            direction = ctx.direction.as_str(),
            message = parsed.handshake_type().name(),
            "handshake message"
        );

        match parsed {
            HandshakeMessage::ClientHello(hello) => {
                state.pending = PendingHandshake {
                    client_random: Some(hello.random),
                    client_session_id: hello.session_id,
                    client_ticket: hello.session_ticket,
                    ..PendingHandshake::default()
                };
                state.next_protocol = None;
                state.cipher_spec_changed = [false; 2];
                state.session.begin_negotiation();
            }
            HandshakeMessage::ServerHello(hello) => {
                on_server_hello(keylog, state, ctx, hello)?;
            }
            HandshakeMessage::Certificate | HandshakeMessage::ServerHelloDone => {
                if state.pending.resumed {
                    debug!(
                        connection_id,
                        "server continued with a full handshake, resolving keys from key log"
                    );
                    resolve_from_keylog(keylog, state, connection_id)?;
                }
            }
            HandshakeMessage::ClientKeyExchange(exchange) => {
                trace!(
                    connection_id,
                    len = exchange.encrypted_pre_master.len(),
                    "client key exchange"
                );
            }
            HandshakeMessage::Finished(_) => {
                trace!(connection_id, direction = ctx.direction.as_str(), "finished");
                // Server Finished without a Certificate confirms the resumption
                if state.pending.resumed && ctx.direction == Direction::ServerToClient {
                    if let Some(master) = state.pending.master {
                        if !state.pending.server_session_id.is_empty() {
                            state
                                .session
                                .save_by_id(&state.pending.server_session_id, &master);
                        }
                    }
                }
            }
            HandshakeMessage::NewSessionTicket(ticket) => match state.pending.master {
                Some(master) => {
                    state.session.save_by_ticket(&ticket.ticket, &master);
                }
                None => debug!(connection_id, "session ticket for an unkeyed session ignored"),
            },
            HandshakeMessage::NextProtocol(protocol) => {
                debug!(connection_id, protocol = protocol.as_str(), "next protocol");
                state.next_protocol = Some(protocol);
            }
        }
        Ok(())
    }

    /// Decrypt one application-data record fragment.
    ///
    /// A connection that never showed a handshake gets a passthrough session.
    pub fn on_application_data(
        &mut self,
        ctx: &StreamContext,
        record: &[u8],
    ) -> Result<DecryptedRecord, SessionError> {
        self.state_mut(ctx.connection_id).session.decrypt_record(
            ctx.direction,
            content_type::APPLICATION_DATA,
            record,
        )
    }

    /// Dispatch one TLS record fragment by content type.
    ///
    /// Returns the plaintext of application-data records. Handshake records
    /// are reassembled into messages and fed to
    /// [`on_handshake_message`](Self::on_handshake_message); the first error
    /// among them is returned after all complete messages were processed.
    pub fn on_record(
        &mut self,
        ctx: &StreamContext,
        record_type: u8,
        payload: &[u8],
    ) -> Result<Option<DecryptedRecord>, Error> {
        let connection_id = ctx.connection_id;
        let dir = ctx.direction.index();

        match record_type {
            content_type::CHANGE_CIPHER_SPEC => {
                trace!(connection_id, direction = ctx.direction.as_str(), "change cipher spec");
                self.state_mut(connection_id).cipher_spec_changed[dir] = true;
                Ok(None)
            }
            content_type::ALERT => {
                let state = self.state_mut(connection_id);
                if state.cipher_spec_changed[dir] {
                    // Opened only to keep the sequence counter aligned
                    state
                        .session
                        .decrypt_record(ctx.direction, record_type, payload)?;
                }
                trace!(connection_id, direction = ctx.direction.as_str(), "alert");
                Ok(None)
            }
            content_type::HANDSHAKE => {
                let messages = {
                    let state = self.state_mut(connection_id);
                    let plaintext = if state.cipher_spec_changed[dir] {
                        if !state.session.is_keyed() {
                            trace!(connection_id, "encrypted handshake on an unkeyed session");
                            return Ok(None);
                        }
                        state
                            .session
                            .decrypt_record(ctx.direction, record_type, payload)?
                            .plaintext
                    } else {
                        payload.to_vec()
                    };
                    let buffer = &mut state.handshake_buffers[dir];
                    buffer.extend_from_slice(&plaintext);
                    split_messages(buffer)
                };

                let mut first_error = None;
                for message in messages {
                    if let Err(e) = self.on_handshake_message(ctx, &message) {
                        first_error.get_or_insert(e);
                    }
                }
                match first_error {
                    Some(e) => Err(e),
                    None => Ok(None),
                }
            }
            content_type::APPLICATION_DATA => {
                Ok(Some(self.on_application_data(ctx, payload)?))
            }
            other => {
                trace!(connection_id, content_type = other, "record type ignored");
                Ok(None)
            }
        }
    }

    /// Release a connection's session.
    pub fn on_session_close(&mut self, connection_id: u64) {
        if let Some(mut state) = self.sessions.remove(&connection_id) {
            debug!(
                connection_id,
                cipher_suite = state.session.cipher_suite_name(),
                "session closed"
            );
            state.session.close();
        }
    }

    /// Forget every cached session id and ticket.
    pub fn clear_saved_sessions(&self) {
        self.cache.clear();
    }
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("keylog_records", &self.keylog.len())
            .field("connections", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

fn on_server_hello(
    keylog: &mut KeyLog,
    state: &mut ConnectionTlsState,
    ctx: &StreamContext,
    hello: ServerHello,
) -> Result<(), Error> {
    let connection_id = ctx.connection_id;
    let Some(client_random) = state.pending.client_random else {
        warn!(connection_id, "ServerHello without ClientHello");
        state.session.mark_undecryptable();
        return Err(SessionError::MissingClientRandom.into());
    };

    let params = match NegotiatedParameters::new(hello.cipher_suite, hello.compression_method) {
        Ok(params) => params,
        Err(e) => {
            warn!(connection_id, error = %e, "session undecryptable");
            state.session.mark_undecryptable();
            return Err(e.into());
        }
    };

    state.pending.server_session_id = hello.session_id;
    state.pending.negotiation = Some(Negotiation {
        randoms: HelloRandoms::new(client_random, hello.random),
        params,
        timestamp: ctx.timestamp,
    });

    if let Some(master) = cached_master(state) {
        debug!(
            connection_id,
            cipher_suite = params.suite.name,
            "resuming cached session"
        );
        state.pending.resumed = true;
        // Not cached under the server session id: a Certificate may still
        // reveal a full handshake with a different master secret
        return key_session(state, master, false);
    }
    resolve_from_keylog(keylog, state, connection_id)
}

/// Master secret of a session the client offered to resume, if cached.
fn cached_master(state: &ConnectionTlsState) -> Option<MasterSecret> {
    let pending = &state.pending;
    let server_sid = &pending.server_session_id;
    if !server_sid.is_empty() && *server_sid == pending.client_session_id {
        if let Some(master) = state.session.lookup_by_id(server_sid) {
            return Some(master);
        }
    }
    match &pending.client_ticket {
        Some(ticket) if !ticket.is_empty() => state.session.lookup_by_ticket(ticket),
        _ => None,
    }
}

fn resolve_from_keylog(
    keylog: &mut KeyLog,
    state: &mut ConnectionTlsState,
    connection_id: u64,
) -> Result<(), Error> {
    let Some(negotiation) = state.pending.negotiation else {
        return Ok(());
    };
    state.pending.resumed = false;

    match keylog.match_key(negotiation.timestamp, &negotiation.randoms) {
        Some(master) => {
            debug!(connection_id, "master secret found in key log");
            key_session(state, master, true)
        }
        None => {
            warn!(
                connection_id,
                timestamp = negotiation.timestamp,
                "no key log record matches session"
            );
            state.session.mark_undecryptable();
            Err(SessionError::NoCorrelatedKey.into())
        }
    }
}

fn key_session(
    state: &mut ConnectionTlsState,
    master: MasterSecret,
    cache_session_id: bool,
) -> Result<(), Error> {
    let Some(negotiation) = state.pending.negotiation else {
        return Ok(());
    };
    state
        .session
        .setup_ciphers(&master, &negotiation.randoms, negotiation.params)?;
    state.pending.master = Some(master);
    if cache_session_id && !state.pending.server_session_id.is_empty() {
        state
            .session
            .save_by_id(&state.pending.server_session_id, &master);
    }
    Ok(())
}

/// Split every complete handshake message off the front of `buffer`.
fn split_messages(buffer: &mut BytesMut) -> Vec<Bytes> {
    let mut messages = Vec::new();
    while let Some(len) = message_len(&buffer[..]) {
        if buffer.len() < len {
            break;
        }
        messages.push(buffer.split_to(len).freeze());
    }
    messages
}
