//! Wire protocol for the Confab relay.
//!
//! All traffic is JSON text frames over the event channel, tagged by `type`.
//! The relay routes on `type` and `to` only; key and message payloads are
//! opaque base64 strings it never opens.
//!
//! `from` fields on server envelopes are stamped by the relay from the
//! sender's registered name, never taken from client input.

use serde::{Deserialize, Serialize};

/// Messages a client sends to the relay.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ClientEnvelope {
    /// Claim a username and publish an asymmetric public key.
    Register { username: String, public_key: String },

    /// Ask for the public key of another registered user.
    RequestPublicKey { username: String },

    /// Deliver an asymmetrically wrapped session key to a peer.
    SendWrappedKey { to: String, wrapped_key: String },

    /// Deliver a symmetric ciphertext to a peer.
    SendCiphertext { to: String, ciphertext: String },
}

/// Messages the relay sends to a client.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ServerEnvelope {
    /// Full snapshot of online usernames, sent to every open connection
    /// whenever the directory changes.
    PresenceUpdate { users: Vec<String> },

    /// Answer to `RequestPublicKey`, sent to the requester only.
    PublicKeyResponse { username: String, public_key: String },

    /// A wrapped session key forwarded from `from`.
    WrappedKey { from: String, wrapped_key: String },

    /// A symmetric ciphertext forwarded from `from`.
    Ciphertext { from: String, ciphertext: String },
}

impl ClientEnvelope {
    /// Envelope kind for logging; never exposes payload fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "Register",
            Self::RequestPublicKey { .. } => "RequestPublicKey",
            Self::SendWrappedKey { .. } => "SendWrappedKey",
            Self::SendCiphertext { .. } => "SendCiphertext",
        }
    }
}

impl ServerEnvelope {
    /// Envelope kind for logging; never exposes payload fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PresenceUpdate { .. } => "PresenceUpdate",
            Self::PublicKeyResponse { .. } => "PublicKeyResponse",
            Self::WrappedKey { .. } => "WrappedKey",
            Self::Ciphertext { .. } => "Ciphertext",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_envelope_tagged_by_type() {
        let env = ClientEnvelope::Register {
            username: "alice".into(),
            public_key: "cGs=".into(),
        };
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains(r#""type":"Register""#));

        let back: ClientEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn test_server_envelope_roundtrip() {
        let env = ServerEnvelope::WrappedKey {
            from: "bob".into(),
            wrapped_key: "d3JhcHBlZA==".into(),
        };
        let json = serde_json::to_string(&env).unwrap();
        let back: ServerEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        let err = serde_json::from_str::<ClientEnvelope>(r#"{"type":"Shout","text":"hi"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let err = serde_json::from_str::<ClientEnvelope>(r#"{"type":"SendCiphertext","to":"bob"}"#);
        assert!(err.is_err());
    }
}
