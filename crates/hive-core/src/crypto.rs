//! Message hashing and owner signatures.
//!
//! The signed payload is `type ‖ version ‖ JSON(spec) ‖ timestamp` and the
//! message hash is SHA-256 over `payload ‖ signature`, both hex-encoded.
//! Peers recompute these byte-for-byte, so the concatenation order and the
//! JSON encoding must not change.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::types::{AppSpecification, MessageType, SpecificationMessage};

/// Errors from hashing, signing, or verifying messages.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("failed to encode specification: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid owner identity: {0}")]
    InvalidIdentity(String),

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("signature does not verify against {0}")]
    BadSignature(String),

    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}

/// Build the signing payload for a specification.
pub fn signing_payload(
    kind: MessageType,
    version: u32,
    spec: &AppSpecification,
    timestamp: u64,
) -> Result<String, CryptoError> {
    let json = serde_json::to_string(spec)?;
    Ok(format!("{}{}{}{}", kind.as_str(), version, json, timestamp))
}

/// Hex SHA-256 of `payload ‖ signature`.
pub fn message_hash(payload: &str, signature: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hasher.update(signature.as_bytes());
    hex::encode(hasher.finalize())
}

/// Identity string for a public key.
pub fn owner_identity(key: &VerifyingKey) -> String {
    hex::encode(key.to_bytes())
}

/// Parse a hex-encoded 32-byte Ed25519 secret key.
pub fn signing_key_from_hex(secret: &str) -> Result<SigningKey, CryptoError> {
    let bytes = hex::decode(secret.trim()).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("expected 32 bytes".to_string()))?;
    Ok(SigningKey::from_bytes(&seed))
}

/// Sign a payload, returning a hex signature.
pub fn sign(key: &SigningKey, payload: &str) -> String {
    hex::encode(key.sign(payload.as_bytes()).to_bytes())
}

/// Verify a hex signature over `payload` against a hex owner identity.
pub fn verify(owner: &str, payload: &str, signature: &str) -> Result<(), CryptoError> {
    let key_bytes: [u8; 32] = hex::decode(owner)
        .map_err(|e| CryptoError::InvalidIdentity(e.to_string()))?
        .try_into()
        .map_err(|_| CryptoError::InvalidIdentity(format!("{owner}: expected 32 bytes")))?;
    let key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| CryptoError::InvalidIdentity(e.to_string()))?;

    let sig_bytes = hex::decode(signature)
        .map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;
    let sig = Signature::from_slice(&sig_bytes)
        .map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;

    key.verify(payload.as_bytes(), &sig)
        .map_err(|_| CryptoError::BadSignature(owner.to_string()))
}

impl SpecificationMessage {
    /// Create a signed and hashed message.
    pub fn signed(
        kind: MessageType,
        specification: AppSpecification,
        timestamp: u64,
        key: &SigningKey,
    ) -> Result<Self, CryptoError> {
        let version = specification.version;
        let payload = signing_payload(kind, version, &specification, timestamp)?;
        let signature = sign(key, &payload);
        let hash = message_hash(&payload, &signature);
        Ok(Self {
            kind,
            version,
            specification,
            timestamp,
            signature,
            hash,
        })
    }

    /// The payload this message's signature covers.
    pub fn payload(&self) -> Result<String, CryptoError> {
        signing_payload(self.kind, self.version, &self.specification, self.timestamp)
    }

    /// Recompute the message hash from its content.
    pub fn computed_hash(&self) -> Result<String, CryptoError> {
        Ok(message_hash(&self.payload()?, &self.signature))
    }

    /// Verify the signature against a given identity (the submitter for
    /// registrations, the registered owner for updates).
    pub fn verify_signature(&self, owner: &str) -> Result<(), CryptoError> {
        verify(owner, &self.payload()?, &self.signature)
    }
}
