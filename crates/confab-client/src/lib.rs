//! Confab client library.
//!
//! Everything that matters happens here, not on the relay: the client
//! generates its identity keypair, runs the four-step handshake that
//! establishes a shared session key per peer, and keeps keys and
//! conversation history in a process-local cache. The relay only ever sees
//! opaque payloads.

#![forbid(unsafe_code)]

pub mod cache;
pub mod client;
pub mod connection;

pub use cache::{Direction, HistoryEntry, SessionCache};
pub use client::{ChatClient, ClientError, ClientEvent};
pub use connection::RelayConnection;
