//! Zero-knowledge trust claims
//!
//! A claim proof lets an agent show that the ledger supports a statement
//! ("someone trusts me above 0.7", "I was verified by X", "I belong to domain
//! D") without publishing the assertions behind it. The proof system is a
//! seam: `HashCommitmentProofs` binds the hidden witness with a blinded
//! SHA-256 commitment and is meant to be swapped for a real proving system.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Statement an agent proves about itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "claim_type", rename_all = "snake_case")]
pub enum ZkClaim {
    /// `from` trusts the prover at or above `threshold`
    TrustAbove { from: String, threshold: f64 },
    /// `verifier` holds a verified assertion about the prover
    VerifiedBy { verifier: String },
    /// A verified assertion about the prover covers `domain`
    DomainMember { domain: String },
}

impl ZkClaim {
    pub fn name(&self) -> &'static str {
        match self {
            ZkClaim::TrustAbove { .. } => "trust_above",
            ZkClaim::VerifiedBy { .. } => "verified_by",
            ZkClaim::DomainMember { .. } => "domain_member",
        }
    }
}

/// Output of a prover
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofArtifact {
    pub commitment: String,
    pub proof: String,
}

/// Pluggable proving system
pub trait ProofSystem: Send + Sync {
    /// Prove knowledge of `witness` for the public `statement`
    fn prove(&self, statement: &[u8], witness: &[u8]) -> ProofArtifact;
    /// Check a proof against the statement it claims to cover
    fn verify(&self, statement: &[u8], artifact: &ProofArtifact) -> bool;
}

/// Blinded hash commitments standing in for a succinct proof system
#[derive(Debug, Default, Clone, Copy)]
pub struct HashCommitmentProofs;

impl HashCommitmentProofs {
    fn transcript(statement: &[u8], commitment: &str, blinding: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"swarm-zk-v1");
        hasher.update(statement);
        hasher.update(commitment.as_bytes());
        hasher.update(blinding.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl ProofSystem for HashCommitmentProofs {
    fn prove(&self, statement: &[u8], witness: &[u8]) -> ProofArtifact {
        let mut blinding = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut blinding);
        let blinding = hex::encode(blinding);

        let mut hasher = Sha256::new();
        hasher.update(witness);
        hasher.update(blinding.as_bytes());
        let commitment = hex::encode(hasher.finalize());

        let transcript = Self::transcript(statement, &commitment, &blinding);
        ProofArtifact {
            commitment,
            proof: format!("{}:{}", blinding, transcript),
        }
    }

    fn verify(&self, statement: &[u8], artifact: &ProofArtifact) -> bool {
        let Some((blinding, transcript)) = artifact.proof.split_once(':') else {
            return false;
        };
        !artifact.commitment.is_empty() && Self::transcript(statement, &artifact.commitment, blinding) == transcript
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZkTrustProof {
    pub id: String,
    pub agent_id: String,
    pub claim: ZkClaim,
    pub public_inputs: serde_json::Value,
    pub artifact: ProofArtifact,
    pub created_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub verifiers: BTreeSet<String>,
    /// Set once enough distinct verifiers accepted the proof
    pub verified: bool,
}

impl ZkTrustProof {
    /// Public statement the proof is bound to
    pub fn statement(agent_id: &str, claim: &ZkClaim, public_inputs: &serde_json::Value, valid_until: DateTime<Utc>) -> Vec<u8> {
        let claim = serde_json::to_string(claim).unwrap_or_default();
        format!(
            "{}|{}|{}|{}",
            agent_id,
            claim,
            public_inputs,
            valid_until.timestamp_millis()
        )
        .into_bytes()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.valid_until < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proof_binds_statement() {
        let proofs = HashCommitmentProofs;
        let artifact = proofs.prove(b"agent-1 trusted above 0.7", b"assertion-42:0.81");
        assert!(proofs.verify(b"agent-1 trusted above 0.7", &artifact));
        assert!(!proofs.verify(b"agent-1 trusted above 0.9", &artifact));
    }

    #[test]
    fn test_commitment_hides_witness() {
        let proofs = HashCommitmentProofs;
        let a = proofs.prove(b"s", b"same witness");
        let b = proofs.prove(b"s", b"same witness");
        assert_ne!(a.commitment, b.commitment);
    }

    #[test]
    fn test_malformed_proof_rejected() {
        let artifact = ProofArtifact {
            commitment: "c".into(),
            proof: "no-separator".into(),
        };
        assert!(!HashCommitmentProofs.verify(b"s", &artifact));
    }
}
