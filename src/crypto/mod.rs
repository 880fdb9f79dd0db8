//! Cryptographic seams for the swarm
//!
//! - **Hashing**: SHA-256 digests, checksums and merkle roots
//! - **Signing**: `Signer` / `SignatureVerifier` traits with an Ed25519 backend
//! - **Shamir**: threshold secret sharing over GF(2^8)
//! - **Threshold signatures**: t-of-n signing built on Shamir-dealt Ed25519 keys

pub mod hash;
pub mod shamir;
mod signer;
mod threshold;

pub use hash::{merkle_root, sha256_hex};
pub use signer::{Ed25519Signer, Ed25519Verifier, SignatureVerifier, Signer};
pub use threshold::{verify_threshold_signature, KeyShare, ThresholdKeySet, ThresholdSignature};
