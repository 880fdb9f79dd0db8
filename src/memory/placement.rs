//! Topology choice and shard placement
//!
//! Both are pure functions of their inputs so every replica that sees the
//! same membership computes the same layout.

use super::types::{ConsistencyLevel, TopologyKind};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Pick a topology from swarm size, memory pressure and consistency needs
pub fn select_topology(
    agent_count: usize,
    memory_pressure: f64,
    consistency: ConsistencyLevel,
    large_swarm: usize,
    high_pressure: f64,
) -> TopologyKind {
    if memory_pressure > high_pressure {
        TopologyKind::Hybrid
    } else if agent_count >= large_swarm {
        match consistency {
            ConsistencyLevel::Strong => TopologyKind::Hierarchical,
            ConsistencyLevel::Eventual => TopologyKind::Hybrid,
        }
    } else {
        TopologyKind::Mesh
    }
}

/// Shard index from the first four bytes of the key's SHA-256
pub fn shard_for(key: &str, shard_count: u32) -> u32 {
    let digest = Sha256::digest(key.as_bytes());
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    prefix % shard_count.max(1)
}

/// Replicas per shard, rotating over the sorted node ids
pub fn assign_shards(node_ids: &[String], shard_count: u32, replication_factor: usize) -> BTreeMap<u32, Vec<String>> {
    let mut sorted = node_ids.to_vec();
    sorted.sort();
    sorted.dedup();
    let n = sorted.len();
    let replicas = replication_factor.min(n);

    (0..shard_count)
        .map(|shard| {
            let owners = (0..replicas)
                .map(|i| sorted[(shard as usize + i) % n].clone())
                .collect();
            (shard, owners)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_topology_table() {
        use ConsistencyLevel::*;
        assert_eq!(select_topology(5, 0.2, Strong, 20, 0.8), TopologyKind::Mesh);
        assert_eq!(select_topology(5, 0.9, Eventual, 20, 0.8), TopologyKind::Hybrid);
        assert_eq!(select_topology(20, 0.5, Strong, 20, 0.8), TopologyKind::Hierarchical);
        assert_eq!(select_topology(50, 0.5, Eventual, 20, 0.8), TopologyKind::Hybrid);
        assert_eq!(select_topology(50, 0.81, Strong, 20, 0.8), TopologyKind::Hybrid);
    }

    #[test]
    fn test_every_shard_gets_distinct_replicas() {
        let nodes: Vec<String> = ["n3", "n1", "n4", "n2"].iter().map(|s| s.to_string()).collect();
        let map = assign_shards(&nodes, 16, 3);
        assert_eq!(map.len(), 16);
        for owners in map.values() {
            assert_eq!(owners.len(), 3);
            let mut unique = owners.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), 3);
        }
        assert_eq!(map[&0], vec!["n1", "n2", "n3"]);
        assert_eq!(map[&3], vec!["n4", "n1", "n2"]);
    }

    #[test]
    fn test_replication_capped_by_membership() {
        let map = assign_shards(&["solo".to_string()], 4, 3);
        assert!(map.values().all(|owners| owners == &vec!["solo".to_string()]));
        assert!(assign_shards(&[], 4, 3).values().all(|o| o.is_empty()));
    }

    proptest! {
        #[test]
        fn prop_shard_in_range(key in ".*", count in 1u32..64) {
            let shard = shard_for(&key, count);
            prop_assert!(shard < count);
            prop_assert_eq!(shard, shard_for(&key, count));
        }
    }
}
