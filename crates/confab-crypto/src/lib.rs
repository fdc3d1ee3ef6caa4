//! Cryptographic primitives for Confab.
//!
//! This crate provides:
//! - X25519 identity keypairs published through the relay directory
//! - A sealed-box wrap for delivering session keys to a peer's public key
//! - A symmetric session cipher keyed by an externally supplied 256-bit key
//!
//! # Design
//!
//! The relay never holds key material, so everything here runs on the
//! clients. Session keys are wrapped with ephemeral X25519 ECDH +
//! HKDF-SHA256 + ChaCha20-Poly1305; conversation traffic uses
//! ChaCha20-Poly1305 under the shared session key with a random nonce per
//! message. Secret key bytes are zeroized on drop.

#![forbid(unsafe_code)]

pub mod keys;
pub mod sealed;
pub mod symmetric;

pub use keys::{decode_public_key, encode_public_key, IdentityKeypair, KeyError};
pub use sealed::{open, seal, SealError};
pub use symmetric::{SessionKey, SymmetricError};

pub use x25519_dalek::{PublicKey, StaticSecret};
