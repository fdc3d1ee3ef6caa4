//! Confab relay server.
//!
//! The relay keeps a volatile presence directory (username → connection +
//! public key) and forwards opaque envelopes between registered clients. It
//! never sees plaintext or symmetric keys: wrapped keys and ciphertexts
//! cross it as payloads it cannot open, and nothing survives a restart.

#![forbid(unsafe_code)]

pub mod directory;
pub mod relay;
pub mod server;

pub use directory::{ConnId, Directory, IdentityRecord, NameTaken, Outbox};
pub use relay::{RelayState, SharedState};
pub use server::{new_state, router, serve};
