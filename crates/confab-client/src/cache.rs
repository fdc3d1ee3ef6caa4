//! Client-local session cache.
//!
//! Per-peer store of the derived session key and the conversation history.
//! Purely local state: nothing here is shared with the relay or persisted
//! beyond the process lifetime.

use std::collections::HashMap;

use confab_crypto::SessionKey;

/// Whether a history entry was sent by us or received from the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

/// One line of conversation history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub sender: String,
    pub text: String,
    pub direction: Direction,
}

#[derive(Default)]
struct PeerSession {
    key: Option<SessionKey>,
    history: Vec<HistoryEntry>,
}

/// Map of peer name → session key and history.
#[derive(Default)]
pub struct SessionCache {
    peers: HashMap<String, PeerSession>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the session key for a peer, replacing any previous one.
    pub fn set_key(&mut self, peer: &str, key: SessionKey) {
        self.peers.entry(peer.to_string()).or_default().key = Some(key);
    }

    /// The session key for a peer, if a handshake has completed.
    pub fn key(&self, peer: &str) -> Option<&SessionKey> {
        self.peers.get(peer)?.key.as_ref()
    }

    pub fn has_key(&self, peer: &str) -> bool {
        self.key(peer).is_some()
    }

    /// Append one entry to a peer's history.
    pub fn append_message(&mut self, peer: &str, entry: HistoryEntry) {
        self.peers.entry(peer.to_string()).or_default().history.push(entry);
    }

    /// The conversation history with a peer, in append order.
    pub fn history(&self, peer: &str) -> &[HistoryEntry] {
        self.peers
            .get(peer)
            .map(|session| session.history.as_slice())
            .unwrap_or(&[])
    }
}
