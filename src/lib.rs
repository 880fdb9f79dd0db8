//! Swarm consensus: Byzantine agreement and distributed trust for agent swarms
//!
//! A PBFT-style replica engine with a spatial voting layer on top, a
//! three-round weighted consensus for accusing malicious agents, a
//! witness-verified trust ledger with decay and path search, and a
//! vector-clock replicated memory store.

pub mod clock;
pub mod config;
pub mod consensus;
pub mod crypto;
pub mod detection;
pub mod error;
pub mod events;
pub mod memory;
pub mod runtime;
pub mod spatial;
pub mod trust;

pub use config::SwarmConfig;
pub use consensus::{ByzantineConfig, ByzantineConsensus, ConsensusContext};
pub use detection::{ConsensusDetectionCoordinator, DetectionConfig};
pub use error::{SwarmError, SwarmResult};
pub use events::{EventBus, SwarmEvent};
pub use memory::{DistributedMemoryManager, MemoryConfig};
pub use runtime::{RuntimeConfig, RuntimeDeps, SwarmRuntime};
pub use spatial::{SpatialConfig, SpatialConsensus};
pub use trust::{DistributedTrustVerifier, TrustConfig};
