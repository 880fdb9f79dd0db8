//! Replicated swarm memory
//!
//! - **Store**: namespaced keys with vector-clock conflict detection
//! - **Sync**: checksummed, merkle-rooted deltas
//! - **Placement**: mesh / hierarchical / hybrid topology and SHA-256 sharding

mod manager;
mod placement;
mod types;

pub use manager::{deep_merge, namespace_of, DistributedMemoryManager, MemoryConfig};
pub use placement::{assign_shards, select_topology, shard_for};
pub use types::{
    AgentNode, ApplyOutcome, ConsistencyLevel, MemoryDelta, MemoryEntry, MemoryMetrics, MemoryOperation,
    MemoryTopology, OperationKind, TopologyKind,
};
