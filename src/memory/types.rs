//! Replicated memory records

use crate::clock::VectorClock;
use crate::crypto::sha256_hex;
use crate::error::SwarmResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Set,
    Delete,
    /// Deep-merge a JSON object into the current value
    Merge,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Set => "set",
            OperationKind::Delete => "delete",
            OperationKind::Merge => "merge",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryOperation {
    pub id: String,
    pub kind: OperationKind,
    pub key: String,
    pub namespace: String,
    /// Absent for deletes
    pub value: Option<serde_json::Value>,
    pub clock: VectorClock,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl MemoryOperation {
    /// Content hash used as a merkle leaf
    pub fn hash(&self) -> SwarmResult<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(sha256_hex(&[&bytes]))
    }

    /// Origin counter; a peer whose clock reaches it has seen this write
    pub fn origin_counter(&self) -> u64 {
        self.clock.get(&self.agent_id)
    }

    /// Last-writer-wins ordering key
    pub(crate) fn lww_key(&self) -> (DateTime<Utc>, &str) {
        (self.timestamp, self.agent_id.as_str())
    }
}

/// Current state of one key. A `None` value is a tombstone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub key: String,
    pub namespace: String,
    pub value: Option<serde_json::Value>,
    pub clock: VectorClock,
    pub last_writer: String,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
    /// Kind of the write applied last
    pub kind: OperationKind,
}

impl MemoryEntry {
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Approximate footprint used for memory pressure
    pub fn size_bytes(&self) -> usize {
        self.key.len() + self.value.as_ref().map(|v| v.to_string().len()).unwrap_or(0)
    }
}

/// Batch of operations shipped to a peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryDelta {
    pub id: String,
    pub source_agent: String,
    pub target_agent: String,
    pub operations: Vec<MemoryOperation>,
    /// Merkle root over per-operation hashes
    pub merkle_root: String,
    /// SHA-256 of the serialized operation list
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

/// How apply_operation treated an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Concurrent with the stored write; `true` when the incoming write won or was merged in
    Conflict { incoming_won: bool },
    /// Already seen or causally superseded
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopologyKind {
    Mesh,
    Hierarchical,
    Hybrid,
}

impl TopologyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopologyKind::Mesh => "mesh",
            TopologyKind::Hierarchical => "hierarchical",
            TopologyKind::Hybrid => "hybrid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyLevel {
    Eventual,
    Strong,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentNode {
    pub id: String,
    pub capacity_bytes: u64,
    pub capabilities: Vec<String>,
    /// Shards this node replicates
    pub shards: Vec<u32>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryTopology {
    pub kind: TopologyKind,
    pub replication_factor: usize,
    pub consistency: ConsistencyLevel,
    pub nodes: Vec<AgentNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub operations_applied: u64,
    pub stale_operations: u64,
    pub conflicts: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub entries: usize,
    pub tombstones: usize,
    pub memory_pressure: f64,
}
