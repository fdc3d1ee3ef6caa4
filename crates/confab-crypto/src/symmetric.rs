//! Symmetric session cipher.
//!
//! A [`SessionKey`] is 256 bits of random key material shared by exactly two
//! clients after a completed handshake. Messages are encrypted with
//! ChaCha20-Poly1305 under that key, one random nonce per message:
//! `nonce (12) || ciphertext`.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Nonce size for ChaCha20-Poly1305.
const NONCE_SIZE: usize = 12;

/// Minimum ciphertext: nonce (12) + auth tag (16).
const MIN_CIPHERTEXT_LEN: usize = NONCE_SIZE + 16;

/// Errors from the session cipher.
#[derive(Debug, Error)]
pub enum SymmetricError {
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("ciphertext too short")]
    CiphertextTooShort,

    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
}

/// A 256-bit symmetric session key.
///
/// Zeroized on drop. Both sides of a conversation hold an independent copy;
/// the copies are bit-identical or the session is not established.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; 32]);

impl SessionKey {
    /// Generate a fresh random key using the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Restore a key from raw bytes (e.g. an opened wrapped payload).
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Restore a key from a slice, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SymmetricError> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SymmetricError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(bytes))
    }

    /// Raw key bytes, for wrapping to a peer.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encrypt a plaintext under this key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, SymmetricError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| SymmetricError::Encryption(e.to_string()))?;
        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| SymmetricError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt a `nonce || ciphertext` payload under this key.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, SymmetricError> {
        if data.len() < MIN_CIPHERTEXT_LEN {
            return Err(SymmetricError::CiphertextTooShort);
        }

        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| SymmetricError::Decryption(e.to_string()))?;
        let nonce = Nonce::from_slice(&data[..NONCE_SIZE]);

        cipher
            .decrypt(nonce, &data[NONCE_SIZE..])
            .map_err(|e| SymmetricError::Decryption(e.to_string()))
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        write!(f, "SessionKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = SessionKey::generate();
        let plaintext = b"hello confab";

        let ciphertext = key.encrypt(plaintext).unwrap();
        let decrypted = key.decrypt(&ciphertext).unwrap();

        assert_eq!(decrypted.as_slice(), plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = SessionKey::generate();
        let other = SessionKey::generate();

        let ciphertext = key.encrypt(b"secret").unwrap();
        assert!(matches!(
            other.decrypt(&ciphertext),
            Err(SymmetricError::Decryption(_))
        ));
    }

    #[test]
    fn test_empty_plaintext() {
        let key = SessionKey::generate();
        let ciphertext = key.encrypt(b"").unwrap();
        assert_eq!(key.decrypt(&ciphertext).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_ciphertext_too_short() {
        let key = SessionKey::generate();
        assert!(matches!(
            key.decrypt(&[0u8; 10]),
            Err(SymmetricError::CiphertextTooShort)
        ));
    }

    #[test]
    fn test_from_slice_checks_length() {
        assert!(matches!(
            SessionKey::from_slice(&[0u8; 31]),
            Err(SymmetricError::InvalidKeyLength(31))
        ));
        assert!(SessionKey::from_slice(&[0u8; 32]).is_ok());
    }

    #[test]
    fn test_wrapped_key_roundtrip_through_sealed_box() {
        // The delivery path: generate, seal the raw bytes, open, restore.
        let recipient = crate::keys::IdentityKeypair::generate();
        let key = SessionKey::generate();

        let sealed = crate::sealed::seal(key.as_bytes(), &recipient.public_key()).unwrap();
        let opened = crate::sealed::open(&sealed, recipient.secret()).unwrap();
        let restored = SessionKey::from_slice(&opened).unwrap();

        assert_eq!(restored.as_bytes(), key.as_bytes());
    }
}
