//! Error types shared by every swarm component
//!
//! Contract violations (duplicate votes, self-trust, bad configuration) surface
//! here as `Err` at the offending call. Protocol faults seen on the wire are not
//! errors: engines count them and emit events instead.

/// Result alias used across the crate
pub type SwarmResult<T> = Result<T, SwarmError>;

/// Swarm consensus errors
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    #[error("Insufficient agents for Byzantine tolerance: {active} active, {required} required")]
    InsufficientAgents { active: usize, required: usize },

    #[error("Insufficient voters: {available} eligible, {required} required")]
    InsufficientVoters { available: usize, required: usize },

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("Unknown proposal: {0}")]
    UnknownProposal(String),

    #[error("Unknown consensus: {0}")]
    UnknownConsensus(String),

    #[error("Duplicate vote from {voter} in {scope}")]
    DuplicateVote { voter: String, scope: String },

    #[error("Invalid vote: {0}")]
    InvalidVote(String),

    #[error("Consensus is not accepting input: {0}")]
    NotActive(String),

    #[error("Deadline passed for {0}")]
    DeadlinePassed(String),

    #[error("Trust level {0} outside [0, 1]")]
    InvalidTrustLevel(f64),

    #[error("Agent cannot assert trust in itself: {0}")]
    SelfAssertion(String),

    #[error("Unknown trust assertion: {0}")]
    UnknownAssertion(String),

    #[error("Verifier {verifier} already verified assertion {assertion}")]
    DuplicateVerification { verifier: String, assertion: String },

    #[error("Assertion {0} has reached the dispute limit")]
    TooManyDisputes(String),

    #[error("Not permitted: {0}")]
    NotPermitted(String),

    #[error("Unknown proof: {0}")]
    UnknownProof(String),

    #[error("Claim not satisfied: {0}")]
    ClaimNotSatisfied(String),

    #[error("Invalid memory key: {0:?}")]
    InvalidKey(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Integrity verification failed: {0}")]
    IntegrityFailure(String),

    #[error("Insufficient signature shares: {have} of {need}")]
    InsufficientShares { have: usize, need: usize },

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
