//! Author keys for signing relay events.
//!
//! Authors are identified by the hex encoding of their ed25519 public key.
//! An event is signed over the raw 32 bytes of its id.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use super::RelayError;

/// Size of Ed25519 public keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of Ed25519 private keys in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Size of Ed25519 signatures in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// An author's signing key.
#[derive(Clone)]
pub struct Keys {
    signing: SigningKey,
}

impl Keys {
    /// Generates a fresh random key.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Restores a key from its hex-encoded 32-byte secret.
    pub fn from_secret_hex(secret: &str) -> Result<Self, RelayError> {
        let bytes: [u8; SECRET_KEY_SIZE] = decode_fixed(secret, "secret key")?;
        Ok(Self {
            signing: SigningKey::from_bytes(&bytes),
        })
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing.to_bytes())
    }

    /// The author identity: hex-encoded public key.
    pub fn public_key(&self) -> String {
        hex::encode(self.signing.verifying_key().to_bytes())
    }

    /// Signs `message`, returning the hex-encoded signature.
    pub fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.signing.sign(message).to_bytes())
    }
}

impl std::fmt::Debug for Keys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keys")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

fn decode_fixed<const N: usize>(text: &str, what: &str) -> Result<[u8; N], RelayError> {
    let bytes = hex::decode(text).map_err(|e| RelayError::InvalidKey {
        reason: format!("{what} is not hex: {e}"),
    })?;
    bytes.try_into().map_err(|bytes: Vec<u8>| RelayError::InvalidKey {
        reason: format!("{what} must be {N} bytes, got {}", bytes.len()),
    })
}

/// True if `text` looks like a hex-encoded public key.
pub fn is_public_key(text: &str) -> bool {
    text.len() == PUBLIC_KEY_SIZE * 2 && text.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Verifies a hex signature over `message` by the hex public key `author`.
pub fn verify_signature(author: &str, message: &[u8], signature: &str) -> Result<(), RelayError> {
    let key_bytes: [u8; PUBLIC_KEY_SIZE] = decode_fixed(author, "public key")?;
    let key = VerifyingKey::from_bytes(&key_bytes).map_err(|e| RelayError::InvalidKey {
        reason: format!("public key is not a valid ed25519 point: {e}"),
    })?;
    let invalid = || RelayError::InvalidSignature {
        id: hex::encode(message),
    };
    let sig_bytes: [u8; SIGNATURE_SIZE] = decode_fixed(signature, "signature").map_err(|_| invalid())?;
    key.verify(message, &Signature::from_bytes(&sig_bytes))
        .map_err(|_| invalid())
}
