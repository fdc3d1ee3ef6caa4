//! Presence directory: the authoritative map of who is online.
//!
//! One entry per registered username, bound to the connection that claimed
//! it. Entries are created on registration and destroyed when that
//! connection closes; the key set is exactly the set of online identities.
//! The directory is the only relay state that is ever mutated, and only by
//! `register` and `remove`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use thiserror::Error;
use tokio::sync::mpsc;

use confab_common::ServerEnvelope;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle for one open connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl ConnId {
    /// Allocate a process-unique connection id.
    pub fn next() -> Self {
        Self(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Sending half of a connection's outbound queue.
///
/// Envelopes are serialized to JSON text frames and queued without waiting;
/// a full or closed queue drops the frame, which the protocol treats the
/// same as the recipient being offline.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Message>,
}

impl Outbox {
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        Self { tx }
    }

    /// Queue an envelope for delivery. Returns false if it was dropped.
    pub fn try_send(&self, envelope: &ServerEnvelope) -> bool {
        let Ok(json) = serde_json::to_string(envelope) else {
            return false;
        };
        self.tx.try_send(Message::Text(json)).is_ok()
    }
}

/// Registration refused: the name is bound to a live connection.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("username already registered")]
pub struct NameTaken;

/// One registered identity.
pub struct IdentityRecord {
    pub conn: ConnId,
    pub public_key: String,
    pub outbox: Outbox,
}

/// Map of username → identity record.
#[derive(Default)]
pub struct Directory {
    entries: HashMap<String, IdentityRecord>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to a connection and public key.
    ///
    /// Refuses with [`NameTaken`] if the name is already live; the existing
    /// entry is never touched.
    pub fn register(
        &mut self,
        name: &str,
        public_key: String,
        conn: ConnId,
        outbox: Outbox,
    ) -> Result<(), NameTaken> {
        if self.entries.contains_key(name) {
            return Err(NameTaken);
        }
        self.entries.insert(
            name.to_string(),
            IdentityRecord {
                conn,
                public_key,
                outbox,
            },
        );
        Ok(())
    }

    /// Look up a registered identity by name.
    pub fn lookup(&self, name: &str) -> Option<&IdentityRecord> {
        self.entries.get(name)
    }

    /// Remove the entry bound to `conn`, returning its name.
    ///
    /// No-op (returns `None`) if the connection never registered, or if its
    /// registration was refused and the name belongs to someone else.
    pub fn remove(&mut self, conn: ConnId) -> Option<String> {
        let name = self
            .entries
            .iter()
            .find(|(_, record)| record.conn == conn)
            .map(|(name, _)| name.clone())?;
        self.entries.remove(&name);
        Some(name)
    }

    /// Sorted set of online usernames.
    pub fn snapshot(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
