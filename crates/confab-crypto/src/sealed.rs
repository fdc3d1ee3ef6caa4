//! Sealed-box wrap for session key delivery.
//!
//! Hybrid encryption against a recipient's X25519 public key:
//! 1. Generate an ephemeral X25519 keypair
//! 2. ECDH with the recipient's public key
//! 3. Derive a wrap key with HKDF-SHA256
//! 4. Encrypt with ChaCha20-Poly1305
//!
//! Wire format: `ephemeral_public (32) || nonce (12) || ciphertext`.
//! Only the holder of the recipient's secret key can open the payload; the
//! relay forwards it as an opaque string.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

/// HKDF info string binding derived keys to this protocol.
const HKDF_INFO: &[u8] = b"CONFAB-V1-SEALED";

/// Nonce size for ChaCha20-Poly1305.
const NONCE_SIZE: usize = 12;

/// Minimum sealed payload: ephemeral key (32) + nonce (12) + auth tag (16).
const MIN_SEALED_LEN: usize = 32 + NONCE_SIZE + 16;

/// Errors from sealing and opening wrapped payloads.
#[derive(Debug, Error)]
pub enum SealError {
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("sealed payload too short")]
    PayloadTooShort,

    #[error("key derivation failed")]
    KeyDerivation,
}

fn derive_wrap_key(shared_secret: &[u8; 32]) -> Result<[u8; 32], SealError> {
    let hk = Hkdf::<Sha256>::new(None, shared_secret);
    let mut key = [0u8; 32];
    hk.expand(HKDF_INFO, &mut key)
        .map_err(|_| SealError::KeyDerivation)?;
    Ok(key)
}

/// Seal a payload to a recipient's public key.
pub fn seal(plaintext: &[u8], recipient: &PublicKey) -> Result<Vec<u8>, SealError> {
    let ephemeral_secret = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral_secret);

    let shared_secret = ephemeral_secret.diffie_hellman(recipient);
    let wrap_key = derive_wrap_key(shared_secret.as_bytes())?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = ChaCha20Poly1305::new_from_slice(&wrap_key)
        .map_err(|e| SealError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| SealError::Encryption(e.to_string()))?;

    let mut sealed = Vec::with_capacity(32 + NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(ephemeral_public.as_bytes());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a sealed payload with the recipient's secret key.
pub fn open(sealed: &[u8], secret: &StaticSecret) -> Result<Vec<u8>, SealError> {
    if sealed.len() < MIN_SEALED_LEN {
        return Err(SealError::PayloadTooShort);
    }

    let mut ephemeral_bytes = [0u8; 32];
    ephemeral_bytes.copy_from_slice(&sealed[..32]);
    let ephemeral_public = PublicKey::from(ephemeral_bytes);

    let shared_secret = secret.diffie_hellman(&ephemeral_public);
    let wrap_key = derive_wrap_key(shared_secret.as_bytes())?;

    let cipher = ChaCha20Poly1305::new_from_slice(&wrap_key)
        .map_err(|e| SealError::Decryption(e.to_string()))?;
    let nonce = Nonce::from_slice(&sealed[32..32 + NONCE_SIZE]);

    cipher
        .decrypt(nonce, &sealed[32 + NONCE_SIZE..])
        .map_err(|e| SealError::Decryption(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::IdentityKeypair;

    #[test]
    fn test_seal_open_roundtrip() {
        let recipient = IdentityKeypair::generate();
        let plaintext = b"session key material";

        let sealed = seal(plaintext, &recipient.public_key()).unwrap();
        let opened = open(&sealed, recipient.secret()).unwrap();

        assert_eq!(opened.as_slice(), plaintext);
    }

    #[test]
    fn test_wrong_recipient_cannot_open() {
        let recipient = IdentityKeypair::generate();
        let other = IdentityKeypair::generate();

        let sealed = seal(b"secret", &recipient.public_key()).unwrap();
        assert!(matches!(
            open(&sealed, other.secret()),
            Err(SealError::Decryption(_))
        ));
    }

    #[test]
    fn test_tampered_payload_fails() {
        let recipient = IdentityKeypair::generate();
        let mut sealed = seal(b"secret", &recipient.public_key()).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        assert!(open(&sealed, recipient.secret()).is_err());
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let recipient = IdentityKeypair::generate();
        assert!(matches!(
            open(&[0u8; 59], recipient.secret()),
            Err(SealError::PayloadTooShort)
        ));
    }

    #[test]
    fn test_sealed_payloads_are_unique() {
        // Fresh ephemeral key and nonce every call
        let recipient = IdentityKeypair::generate();
        let a = seal(b"same input", &recipient.public_key()).unwrap();
        let b = seal(b"same input", &recipient.public_key()).unwrap();
        assert_ne!(a, b);
    }
}
