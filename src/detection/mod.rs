//! Malicious-agent detection by weighted, exactly-three-round consensus

mod coordinator;
mod tally;
mod types;

pub use coordinator::{commitment_hash, ConsensusDetectionCoordinator, DetectionConfig};
pub use tally::{tally, RoundTally};
pub use types::{
    ConsensusEvidence, ConsensusResult, ConsensusRound, ConsensusVoteRecord, EvidenceSnapshot, FinalDecision,
    RoundNumber, RoundStatus, Verdict, VoteReveal, VoterProfile,
};
