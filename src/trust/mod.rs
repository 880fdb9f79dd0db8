//! Distributed trust verification
//!
//! - **Assertions**: signed, witness-verified, decaying directed trust
//! - **Paths**: best multi-hop trust over verified assertions
//! - **Disputes**: timed arbitration through a pluggable arbitrator
//! - **ZK claims**: prove ledger-backed statements without revealing them

mod dispute;
mod graph;
mod types;
mod verifier;
mod zk;

pub use dispute::{DisputeArbitrator, UpholdingArbitrator};
pub use graph::{best_path, Adjacency, Edge, FoundPath};
pub use types::{
    AssertionStatus, DisputeDecision, DisputeResolution, NetworkMetrics, OracleResponse, TrustAssertion,
    TrustComputation, TrustDispute, TrustEvidence, TrustPath, TrustVerification, VerificationResult, WeakLink,
};
pub use verifier::{evidence_confidence, DistributedTrustVerifier, TrustConfig};
pub use zk::{HashCommitmentProofs, ProofArtifact, ProofSystem, ZkClaim, ZkTrustProof};
