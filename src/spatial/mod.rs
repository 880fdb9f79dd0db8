//! Spatial coordination: location, resource, zone and collaboration proposals

mod conflict;
mod consensus;
mod types;

pub use consensus::{SpatialConfig, SpatialConsensus};
pub use types::{
    Adjustment, ConflictResolution, ConflictType, Position, ProposalStatus, ResolutionStrategy, ResourceGrant,
    ResourceRequirement, SpatialAgentState, SpatialConflict, SpatialConsensusProposal, SpatialConsensusVote,
    SpatialDecision, SpatialProposalKind, SpatialRequirement, VoteDecision,
};
