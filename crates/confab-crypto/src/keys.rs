//! X25519 identity keypairs.
//!
//! A client generates a keypair at startup and publishes the public half
//! through the relay directory when it registers. On the wire the public key
//! is its base64url encoding (32 bytes → 43 characters, no padding).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

/// Errors from public key encoding and decoding.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid base64url encoding")]
    InvalidEncoding,

    #[error("invalid public key length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// Encode a public key for the wire.
pub fn encode_public_key(key: &PublicKey) -> String {
    URL_SAFE_NO_PAD.encode(key.as_bytes())
}

/// Decode a public key received from the wire.
pub fn decode_public_key(s: &str) -> Result<PublicKey, KeyError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|_| KeyError::InvalidEncoding)?;

    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|v: Vec<u8>| KeyError::InvalidLength(v.len()))?;

    Ok(PublicKey::from(bytes))
}

/// X25519 identity keypair.
///
/// The secret half never leaves the owning client process. `StaticSecret`
/// zeroizes its bytes on drop.
pub struct IdentityKeypair {
    secret: StaticSecret,
}

impl IdentityKeypair {
    /// Generate a new random keypair using the OS CSPRNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        Self { secret }
    }

    /// Create from raw secret key bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            secret: StaticSecret::from(bytes),
        }
    }

    /// The public half of this identity.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(&self.secret)
    }

    /// The public half, encoded for the wire.
    pub fn encoded_public_key(&self) -> String {
        encode_public_key(&self.public_key())
    }

    /// The secret half, for opening sealed payloads addressed to us.
    pub fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_key_length() {
        let keypair = IdentityKeypair::generate();
        // 32 bytes base64url without padding
        assert_eq!(keypair.encoded_public_key().len(), 43);
    }

    #[test]
    fn test_public_key_roundtrip() {
        let keypair = IdentityKeypair::generate();
        let encoded = keypair.encoded_public_key();

        let decoded = decode_public_key(&encoded).unwrap();
        assert_eq!(decoded.as_bytes(), keypair.public_key().as_bytes());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_public_key("not!!base64"),
            Err(KeyError::InvalidEncoding)
        ));
        assert!(matches!(
            decode_public_key("c2hvcnQ"),
            Err(KeyError::InvalidLength(5))
        ));
    }

    #[test]
    fn test_keypair_bytes_roundtrip() {
        let keypair = IdentityKeypair::generate();
        let restored = IdentityKeypair::from_bytes(keypair.secret().to_bytes());
        assert_eq!(
            restored.public_key().as_bytes(),
            keypair.public_key().as_bytes()
        );
    }
}
