//! The client side of the session-establishment handshake.
//!
//! [`ChatClient`] is a pure state machine: it consumes server envelopes and
//! returns the envelope to send next (if any) plus an event for the front
//! end. Transport lives in [`crate::connection`]; nothing here does I/O.
//!
//! Session state is per peer, held implicitly in the cache:
//! - no key cached → Idle
//! - key cached → Established (on the initiator, from the moment it
//!   generates and wraps the key; on the responder, from successful unwrap)
//!
//! Whichever side sends `RequestPublicKey` first becomes the key generator;
//! the other side only consumes. If both sides initiate at the same time,
//! each generates its own key and the two caches can end up disagreeing
//! with no detection. That race is a known limitation of the protocol and
//! is deliberately left unresolved here.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use tracing::{debug, warn};

use confab_common::{ClientEnvelope, ServerEnvelope};
use confab_crypto::{decode_public_key, open, seal, IdentityKeypair, SessionKey};

use crate::cache::{Direction, HistoryEntry, SessionCache};

/// Errors surfaced to the caller. Everything else degrades to an event.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no session with {0}; request one first")]
    NoSession(String),

    #[error("crypto failure: {0}")]
    Crypto(String),
}

/// What happened as a result of one server envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The online roster changed.
    Presence { users: Vec<String> },

    /// A session key for `peer` is now cached.
    SessionEstablished { peer: String },

    /// A handshake payload could not be used; the session stays down.
    SessionFailed { peer: String },

    /// A decrypted message from `peer`, already appended to history.
    Message { from: String, text: String },

    /// An incoming ciphertext was dropped (no session key, or it would not
    /// decrypt). Local-only; nothing is sent back.
    MessageDiscarded { from: String },
}

/// Client-side protocol engine: identity, per-peer session keys, history.
pub struct ChatClient {
    username: String,
    identity: IdentityKeypair,
    cache: SessionCache,
    roster: Vec<String>,
}

impl ChatClient {
    /// Create a client with a freshly generated identity keypair.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            identity: IdentityKeypair::generate(),
            cache: SessionCache::new(),
            roster: Vec::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// The public key this client publishes when registering.
    pub fn encoded_public_key(&self) -> String {
        self.identity.encoded_public_key()
    }

    /// Latest presence snapshot received from the relay.
    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn session_key(&self, peer: &str) -> Option<&SessionKey> {
        self.cache.key(peer)
    }

    pub fn history(&self, peer: &str) -> &[HistoryEntry] {
        self.cache.history(peer)
    }

    /// The registration envelope to send right after connecting.
    pub fn register_envelope(&self) -> ClientEnvelope {
        ClientEnvelope::Register {
            username: self.username.clone(),
            public_key: self.encoded_public_key(),
        }
    }

    /// Start a handshake with `peer` (step 1).
    ///
    /// Returns `None` when a session key is already cached; an established
    /// session is never renegotiated. If the peer is offline the request is
    /// dropped by the relay and this side simply stays Idle.
    pub fn request_session(&self, peer: &str) -> Option<ClientEnvelope> {
        if self.cache.has_key(peer) {
            return None;
        }
        Some(ClientEnvelope::RequestPublicKey {
            username: peer.to_string(),
        })
    }

    /// Encrypt `text` for `peer` and record it in history.
    ///
    /// Fails with [`ClientError::NoSession`] when no handshake has
    /// completed for that peer.
    pub fn send_message(&mut self, peer: &str, text: &str) -> Result<ClientEnvelope, ClientError> {
        let key = self
            .cache
            .key(peer)
            .ok_or_else(|| ClientError::NoSession(peer.to_string()))?;
        let ciphertext = key
            .encrypt(text.as_bytes())
            .map_err(|e| ClientError::Crypto(e.to_string()))?;

        self.cache.append_message(
            peer,
            HistoryEntry {
                sender: self.username.clone(),
                text: text.to_string(),
                direction: Direction::Sent,
            },
        );

        Ok(ClientEnvelope::SendCiphertext {
            to: peer.to_string(),
            ciphertext: STANDARD.encode(ciphertext),
        })
    }

    /// Advance the state machine with one envelope from the relay.
    ///
    /// Returns the resulting event and, for handshake step 3, the wrapped
    /// key envelope to send. Never fails: bad payloads degrade to
    /// [`ClientEvent::SessionFailed`] or [`ClientEvent::MessageDiscarded`].
    pub fn handle_event(&mut self, envelope: ServerEnvelope) -> (ClientEvent, Option<ClientEnvelope>) {
        match envelope {
            ServerEnvelope::PresenceUpdate { users } => {
                self.roster = users.clone();
                (ClientEvent::Presence { users }, None)
            }

            // Step 3: we initiated, the peer's key arrived. Generate a
            // fresh session key, cache it, and wrap it for the peer.
            ServerEnvelope::PublicKeyResponse {
                username,
                public_key,
            } => {
                let peer_key = match decode_public_key(&public_key) {
                    Ok(key) => key,
                    Err(err) => {
                        warn!("unusable public key for {}: {}", username, err);
                        return (ClientEvent::SessionFailed { peer: username }, None);
                    }
                };

                let session_key = SessionKey::generate();
                let wrapped = match seal(session_key.as_bytes(), &peer_key) {
                    Ok(wrapped) => wrapped,
                    Err(err) => {
                        warn!("failed to wrap session key for {}: {}", username, err);
                        return (ClientEvent::SessionFailed { peer: username }, None);
                    }
                };

                self.cache.set_key(&username, session_key);
                let outbound = ClientEnvelope::SendWrappedKey {
                    to: username.clone(),
                    wrapped_key: STANDARD.encode(wrapped),
                };
                (
                    ClientEvent::SessionEstablished { peer: username },
                    Some(outbound),
                )
            }

            // Step 4: the peer initiated; unwrap with our private key.
            // On failure we cache nothing and stay Idle for that peer.
            ServerEnvelope::WrappedKey { from, wrapped_key } => {
                let opened = STANDARD
                    .decode(&wrapped_key)
                    .map_err(|e| e.to_string())
                    .and_then(|sealed| {
                        open(&sealed, self.identity.secret()).map_err(|e| e.to_string())
                    })
                    .and_then(|bytes| {
                        SessionKey::from_slice(&bytes).map_err(|e| e.to_string())
                    });

                match opened {
                    Ok(key) => {
                        self.cache.set_key(&from, key);
                        (ClientEvent::SessionEstablished { peer: from }, None)
                    }
                    Err(err) => {
                        warn!("could not unwrap session key from {}: {}", from, err);
                        (ClientEvent::SessionFailed { peer: from }, None)
                    }
                }
            }

            ServerEnvelope::Ciphertext { from, ciphertext } => {
                let Some(key) = self.cache.key(&from) else {
                    debug!("discarding ciphertext from {}: no session", from);
                    return (ClientEvent::MessageDiscarded { from }, None);
                };

                let text = STANDARD
                    .decode(&ciphertext)
                    .map_err(|e| e.to_string())
                    .and_then(|data| key.decrypt(&data).map_err(|e| e.to_string()))
                    .and_then(|plain| String::from_utf8(plain).map_err(|e| e.to_string()));

                match text {
                    Ok(text) => {
                        self.cache.append_message(
                            &from,
                            HistoryEntry {
                                sender: from.clone(),
                                text: text.clone(),
                                direction: Direction::Received,
                            },
                        );
                        (ClientEvent::Message { from, text }, None)
                    }
                    Err(err) => {
                        debug!("discarding undecryptable ciphertext from {}: {}", from, err);
                        (ClientEvent::MessageDiscarded { from }, None)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand one client's outbound envelope to the other, stamping `from`
    /// the way the relay does.
    fn deliver(from: &ChatClient, to: &mut ChatClient, envelope: ClientEnvelope) -> ClientEvent {
        let stamped = match envelope {
            ClientEnvelope::SendWrappedKey { wrapped_key, .. } => ServerEnvelope::WrappedKey {
                from: from.username().to_string(),
                wrapped_key,
            },
            ClientEnvelope::SendCiphertext { ciphertext, .. } => ServerEnvelope::Ciphertext {
                from: from.username().to_string(),
                ciphertext,
            },
            other => panic!("not a relayed envelope: {:?}", other),
        };
        let (event, outbound) = to.handle_event(stamped);
        assert!(outbound.is_none());
        event
    }

    fn establish(initiator: &mut ChatClient, responder: &mut ChatClient) {
        let request = initiator.request_session(responder.username()).unwrap();
        assert!(matches!(request, ClientEnvelope::RequestPublicKey { .. }));

        // What the relay would answer from its directory.
        let response = ServerEnvelope::PublicKeyResponse {
            username: responder.username().to_string(),
            public_key: responder.encoded_public_key(),
        };
        let (event, outbound) = initiator.handle_event(response);
        assert_eq!(
            event,
            ClientEvent::SessionEstablished {
                peer: responder.username().to_string()
            }
        );

        let event = deliver(initiator, responder, outbound.unwrap());
        assert!(matches!(event, ClientEvent::SessionEstablished { .. }));
    }

    #[test]
    fn test_handshake_yields_identical_keys() {
        let mut alice = ChatClient::new("alice");
        let mut bob = ChatClient::new("bob");

        establish(&mut alice, &mut bob);

        assert_eq!(
            alice.session_key("bob").unwrap().as_bytes(),
            bob.session_key("alice").unwrap().as_bytes()
        );
    }

    #[test]
    fn test_message_roundtrip() {
        let mut alice = ChatClient::new("alice");
        let mut bob = ChatClient::new("bob");
        establish(&mut alice, &mut bob);

        let envelope = alice.send_message("bob", "hello").unwrap();
        let event = deliver(&alice, &mut bob, envelope);

        assert_eq!(
            event,
            ClientEvent::Message {
                from: "alice".into(),
                text: "hello".into()
            }
        );
        assert_eq!(bob.history("alice")[0].text, "hello");
        assert_eq!(bob.history("alice")[0].direction, Direction::Received);
        assert_eq!(alice.history("bob")[0].direction, Direction::Sent);
    }

    #[test]
    fn test_send_without_session_fails() {
        let mut alice = ChatClient::new("alice");
        assert!(matches!(
            alice.send_message("bob", "hi"),
            Err(ClientError::NoSession(_))
        ));
        assert!(alice.history("bob").is_empty());
    }

    #[test]
    fn test_request_session_is_idempotent_once_established() {
        let mut alice = ChatClient::new("alice");
        let mut bob = ChatClient::new("bob");
        establish(&mut alice, &mut bob);

        assert!(alice.request_session("bob").is_none());
    }

    #[test]
    fn test_corrupted_wrapped_key_leaves_session_down() {
        let mut alice = ChatClient::new("alice");
        let mut bob = ChatClient::new("bob");

        let (event, _) = bob.handle_event(ServerEnvelope::WrappedKey {
            from: "alice".into(),
            wrapped_key: STANDARD.encode([0u8; 80]),
        });

        assert_eq!(event, ClientEvent::SessionFailed { peer: "alice".into() });
        assert!(bob.session_key("alice").is_none());
        // Alice's view is unaffected; she can still run a real handshake.
        establish(&mut alice, &mut bob);
    }

    #[test]
    fn test_ciphertext_without_session_is_discarded() {
        let mut bob = ChatClient::new("bob");
        let (event, _) = bob.handle_event(ServerEnvelope::Ciphertext {
            from: "alice".into(),
            ciphertext: STANDARD.encode(b"junk"),
        });

        assert_eq!(event, ClientEvent::MessageDiscarded { from: "alice".into() });
        assert!(bob.history("alice").is_empty());
    }

    #[test]
    fn test_undecryptable_ciphertext_is_discarded() {
        let mut alice = ChatClient::new("alice");
        let mut bob = ChatClient::new("bob");
        establish(&mut alice, &mut bob);

        let (event, _) = bob.handle_event(ServerEnvelope::Ciphertext {
            from: "alice".into(),
            ciphertext: STANDARD.encode([0u8; 40]),
        });

        assert_eq!(event, ClientEvent::MessageDiscarded { from: "alice".into() });
        assert!(bob.history("alice").is_empty());
    }

    #[test]
    fn test_presence_updates_roster() {
        let mut alice = ChatClient::new("alice");
        let (event, _) = alice.handle_event(ServerEnvelope::PresenceUpdate {
            users: vec!["alice".into(), "bob".into()],
        });

        assert!(matches!(event, ClientEvent::Presence { .. }));
        assert_eq!(alice.roster(), ["alice", "bob"]);
    }

    #[test]
    fn test_simultaneous_initiation_can_diverge() {
        // Both sides initiate before either wrapped key lands. Each then
        // overwrites its generated key with the one the peer wrapped, so
        // the two caches end up swapped. The protocol accepts this.
        let mut alice = ChatClient::new("alice");
        let mut bob = ChatClient::new("bob");

        alice.request_session("bob").unwrap();
        bob.request_session("alice").unwrap();

        let (_, from_alice) = alice.handle_event(ServerEnvelope::PublicKeyResponse {
            username: "bob".into(),
            public_key: bob.encoded_public_key(),
        });
        let (_, from_bob) = bob.handle_event(ServerEnvelope::PublicKeyResponse {
            username: "alice".into(),
            public_key: alice.encoded_public_key(),
        });

        deliver(&alice, &mut bob, from_alice.unwrap());
        deliver(&bob, &mut alice, from_bob.unwrap());

        assert_ne!(
            alice.session_key("bob").unwrap().as_bytes(),
            bob.session_key("alice").unwrap().as_bytes()
        );
    }
}
