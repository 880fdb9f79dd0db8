//! Byzantine fault-tolerant agreement among swarm agents

mod broadcaster;
mod byzantine;
mod types;

pub use broadcaster::{ChannelBroadcaster, MessageBroadcaster, NoOpBroadcaster};
pub use byzantine::{ByzantineConfig, ByzantineConsensus, ConsensusContext};
pub use types::{
    Agent, ConsensusMessage, ConsensusProposal, ConsensusState, MessageType, PerformanceMetrics, Phase,
};

#[cfg(test)]
pub(crate) use byzantine::tests as test_support;
