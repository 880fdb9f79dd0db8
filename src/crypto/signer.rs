//! Signing oracle
//!
//! Engines only see `Signer` (produce signatures with the local identity) and
//! `SignatureVerifier` (check a peer's signature against its public key).
//! Keys and signatures travel as hex strings.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;

/// Local signing identity
pub trait Signer: Send + Sync {
    /// Hex-encoded public key peers use to verify our signatures
    fn public_key(&self) -> String;
    fn sign(&self, data: &[u8]) -> String;
}

/// Checks signatures produced by any peer
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, data: &[u8], signature: &str, public_key: &str) -> bool;
}

/// Ed25519 identity
pub struct Ed25519Signer {
    signing_key: SigningKey,
}

impl Ed25519Signer {
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        Self {
            signing_key: SigningKey::generate(&mut csprng),
        }
    }

    /// Deterministic identity from a 32-byte seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("public_key", &self.public_key())
            .finish()
    }
}

impl Signer for Ed25519Signer {
    fn public_key(&self) -> String {
        hex::encode(self.signing_key.verifying_key().as_bytes())
    }

    fn sign(&self, data: &[u8]) -> String {
        hex::encode(self.signing_key.sign(data).to_bytes())
    }
}

/// Verifies Ed25519 signatures
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, data: &[u8], signature: &str, public_key: &str) -> bool {
        let key_bytes: [u8; 32] = match hex::decode(public_key).ok().and_then(|b| b.try_into().ok()) {
            Some(bytes) => bytes,
            None => return false,
        };
        let sig_bytes: [u8; 64] = match hex::decode(signature).ok().and_then(|b| b.try_into().ok()) {
            Some(bytes) => bytes,
            None => return false,
        };
        let verifying_key = match VerifyingKey::from_bytes(&key_bytes) {
            Ok(k) => k,
            Err(_) => return false,
        };
        verifying_key
            .verify(data, &Signature::from_bytes(&sig_bytes))
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let signer = Ed25519Signer::generate();
        let sig = signer.sign(b"prepare:0:1:abc");
        assert!(Ed25519Verifier.verify(b"prepare:0:1:abc", &sig, &signer.public_key()));
        assert!(!Ed25519Verifier.verify(b"prepare:0:1:abd", &sig, &signer.public_key()));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let a = Ed25519Signer::from_seed([1u8; 32]);
        let b = Ed25519Signer::from_seed([2u8; 32]);
        let sig = a.sign(b"hello");
        assert!(!Ed25519Verifier.verify(b"hello", &sig, &b.public_key()));
    }

    #[test]
    fn test_garbage_input_rejected() {
        let a = Ed25519Signer::from_seed([7u8; 32]);
        assert!(!Ed25519Verifier.verify(b"hello", "", &a.public_key()));
        assert!(!Ed25519Verifier.verify(b"hello", "zz", &a.public_key()));
        assert!(!Ed25519Verifier.verify(b"hello", &a.sign(b"hello"), "abcd"));
    }

    #[test]
    fn test_seeded_identity_is_stable() {
        let a = Ed25519Signer::from_seed([9u8; 32]);
        let b = Ed25519Signer::from_seed([9u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
    }
}
