//! Namespace-partitioned replicated key/value store
//!
//! Every write carries the writer's vector clock. A write that causally
//! follows the stored one replaces it; an older one is dropped; a concurrent
//! one on the same key is a conflict. Conflicts rebuild the value from the
//! key's write history, so every replica holding the same writes holds the
//! same value whatever order they arrived in:
//! - the newest `set`/`delete` not superseded by another one is the base,
//!   concurrent ones ordered by last-writer-wins
//! - every `merge` not causally before the base is deep-merged on top, in
//!   causal order, concurrent merges by last-writer-wins
//!
//! Peers catch up by exchanging checksummed deltas of the operations they
//! have not seen.

use super::placement::{assign_shards, select_topology, shard_for};
use super::types::*;
use crate::clock::{ClockOrdering, SharedClock, VectorClock};
use crate::crypto::{merkle_root, sha256_hex};
use crate::error::{SwarmError, SwarmResult};
use crate::events::{EventBus, SwarmEvent};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub shard_count: u32,
    pub replication_factor: usize,
    pub consistency: ConsistencyLevel,
    /// Swarm size from which mesh stops being chosen
    pub large_swarm_threshold: usize,
    pub high_pressure_threshold: f64,
    pub default_namespace: String,
    pub node_capacity_bytes: u64,
    pub max_delta_operations: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            shard_count: 16,
            replication_factor: 3,
            consistency: ConsistencyLevel::Eventual,
            large_swarm_threshold: 20,
            high_pressure_threshold: 0.8,
            default_namespace: "default".to_string(),
            node_capacity_bytes: 64 * 1024 * 1024,
            max_delta_operations: 1000,
        }
    }
}

impl MemoryConfig {
    pub fn validate(&self) -> SwarmResult<()> {
        if self.shard_count == 0 {
            return Err(SwarmError::InvalidConfig("shard_count must be positive".into()));
        }
        if self.replication_factor == 0 {
            return Err(SwarmError::InvalidConfig("replication_factor must be positive".into()));
        }
        if !(self.high_pressure_threshold > 0.0 && self.high_pressure_threshold <= 1.0) {
            return Err(SwarmError::InvalidConfig(format!(
                "high_pressure_threshold {} outside (0, 1]",
                self.high_pressure_threshold
            )));
        }
        if self.node_capacity_bytes == 0 || self.max_delta_operations == 0 {
            return Err(SwarmError::InvalidConfig("capacity and delta size must be positive".into()));
        }
        Ok(())
    }
}

/// Text before the first `:`, or `default` when there is none
pub fn namespace_of<'a>(key: &'a str, default: &'a str) -> &'a str {
    match key.split_once(':') {
        Some((ns, _)) if !ns.is_empty() => ns,
        _ => default,
    }
}

/// Recursively overlay `patch` onto `base`; non-object values replace
pub fn deep_merge(base: &mut Value, patch: &Value) {
    if let (Value::Object(base_map), Value::Object(patch_map)) = (&mut *base, patch) {
        for (k, v) in patch_map {
            deep_merge(base_map.entry(k.clone()).or_insert(Value::Null), v);
        }
        return;
    }
    *base = patch.clone();
}

pub struct DistributedMemoryManager {
    local_id: String,
    config: MemoryConfig,
    clock: SharedClock,
    events: EventBus,
    vector_clock: VectorClock,
    store: HashMap<String, MemoryEntry>,
    log: Vec<MemoryOperation>,
    seen: HashSet<String>,
    /// Key -> writes since the last `set`/`delete` that superseded all others
    history: HashMap<String, Vec<MemoryOperation>>,
    nodes: BTreeMap<String, AgentNode>,
    shards: BTreeMap<u32, Vec<String>>,
    topology: TopologyKind,
    metrics: MemoryMetrics,
}

impl DistributedMemoryManager {
    /// The local agent is the first topology node
    pub fn new(local_id: impl Into<String>, config: MemoryConfig, clock: SharedClock, events: EventBus) -> SwarmResult<Self> {
        config.validate()?;
        let local_id = local_id.into();
        let mut manager = Self {
            local_id: local_id.clone(),
            config,
            clock,
            events,
            vector_clock: VectorClock::new(),
            store: HashMap::new(),
            log: Vec::new(),
            seen: HashSet::new(),
            history: HashMap::new(),
            nodes: BTreeMap::new(),
            shards: BTreeMap::new(),
            topology: TopologyKind::Mesh,
            metrics: MemoryMetrics::default(),
        };
        let capacity = manager.config.node_capacity_bytes;
        manager.join_node(&local_id, capacity, Vec::new());
        Ok(manager)
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn clock(&self) -> VectorClock {
        self.vector_clock.clone()
    }

    // ── local writes & reads ────────────────────────────────────

    pub fn set(&mut self, key: &str, value: Value) -> SwarmResult<MemoryOperation> {
        self.local_write(OperationKind::Set, key, Some(value))
    }

    pub fn delete(&mut self, key: &str) -> SwarmResult<MemoryOperation> {
        self.local_write(OperationKind::Delete, key, None)
    }

    pub fn merge(&mut self, key: &str, patch: Value) -> SwarmResult<MemoryOperation> {
        self.local_write(OperationKind::Merge, key, Some(patch))
    }

    fn local_write(&mut self, kind: OperationKind, key: &str, value: Option<Value>) -> SwarmResult<MemoryOperation> {
        validate_key(key)?;
        self.vector_clock.increment(&self.local_id);
        let op = MemoryOperation {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            key: key.to_string(),
            namespace: namespace_of(key, &self.config.default_namespace).to_string(),
            value,
            clock: self.vector_clock.clone(),
            agent_id: self.local_id.clone(),
            timestamp: self.clock.now(),
            metadata: BTreeMap::new(),
        };
        self.apply_operation(op.clone())?;
        Ok(op)
    }

    /// Current value, `None` for missing or deleted keys
    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.get(key).and_then(|e| e.value.clone())
    }

    pub fn entry(&self, key: &str) -> Option<MemoryEntry> {
        self.store.get(key).cloned()
    }

    /// Live keys and values of one namespace, sorted by key
    pub fn namespace_entries(&self, namespace: &str) -> Vec<(String, Value)> {
        let mut entries: Vec<(String, Value)> = self
            .store
            .values()
            .filter(|e| e.namespace == namespace)
            .filter_map(|e| e.value.clone().map(|v| (e.key.clone(), v)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    // ── replication ─────────────────────────────────────────────

    /// Fold one local or remote operation into the store
    pub fn apply_operation(&mut self, op: MemoryOperation) -> SwarmResult<ApplyOutcome> {
        validate_key(&op.key)?;
        if self.seen.contains(&op.id) {
            self.metrics.stale_operations += 1;
            return Ok(ApplyOutcome::Stale);
        }
        self.vector_clock.merge(&op.clock);
        self.seen.insert(op.id.clone());

        let outcome = match self.store.get(&op.key) {
            None => ApplyOutcome::Applied,
            Some(existing) => match op.clock.compare(&existing.clock) {
                ClockOrdering::After => ApplyOutcome::Applied,
                ClockOrdering::Before | ClockOrdering::Equal => ApplyOutcome::Stale,
                ClockOrdering::Concurrent => ApplyOutcome::Conflict { incoming_won: false },
            },
        };

        let outcome = match outcome {
            ApplyOutcome::Stale => {
                debug!("Stale write {} on {} from {}", op.id, op.key, op.agent_id);
                self.metrics.stale_operations += 1;
                // A write delivered after its successors still shapes the value
                if self.record_history(&op) {
                    self.rematerialize(&op);
                }
                self.log.push(op);
                return Ok(outcome);
            }
            ApplyOutcome::Applied => {
                self.write_entry(&op);
                self.record_history(&op);
                outcome
            }
            ApplyOutcome::Conflict { .. } => {
                let previous_kind = self.store.get(&op.key).map(|e| e.kind);
                self.record_history(&op);
                let incoming_won = self.rematerialize(&op);
                let resolution = if op.kind == OperationKind::Merge || previous_kind == Some(OperationKind::Merge) {
                    "merged"
                } else {
                    "last-writer-wins"
                };
                self.metrics.conflicts += 1;
                warn!(
                    "Concurrent writes on {} ({} vs local), resolved by {}",
                    op.key, op.agent_id, resolution
                );
                self.events.emit(SwarmEvent::MemoryConflict {
                    key: op.key.clone(),
                    namespace: op.namespace.clone(),
                    resolution: resolution.to_string(),
                });
                ApplyOutcome::Conflict { incoming_won }
            }
        };

        self.metrics.operations_applied += 1;
        self.events.emit(SwarmEvent::MemoryOperationApplied {
            key: op.key.clone(),
            namespace: op.namespace.clone(),
            operation: op.kind.as_str().to_string(),
        });
        self.log.push(op);
        Ok(outcome)
    }

    fn write_entry(&mut self, op: &MemoryOperation) {
        let previous = self.store.remove(&op.key);
        let version = previous.as_ref().map(|e| e.version + 1).unwrap_or(1);
        let value = match op.kind {
            OperationKind::Set => op.value.clone(),
            OperationKind::Delete => None,
            OperationKind::Merge => {
                let mut current = previous.as_ref().and_then(|e| e.value.clone()).unwrap_or(Value::Null);
                if let Some(patch) = &op.value {
                    deep_merge(&mut current, patch);
                }
                Some(current)
            }
        };
        self.store.insert(
            op.key.clone(),
            MemoryEntry {
                key: op.key.clone(),
                namespace: op.namespace.clone(),
                value,
                clock: op.clock.clone(),
                last_writer: op.agent_id.clone(),
                updated_at: op.timestamp,
                version,
                kind: op.kind,
            },
        );
    }

    /// Add `op` to its key's history; false when it is already there
    fn record_history(&mut self, op: &MemoryOperation) -> bool {
        let ops = self.history.entry(op.key.clone()).or_default();
        if ops.iter().any(|o| o.id == op.id) {
            return false;
        }
        // A set or delete after every recorded write supersedes all of them
        if op.kind != OperationKind::Merge && ops.iter().all(|o| o.clock.happens_before(&op.clock)) {
            ops.clear();
        }
        ops.push(op.clone());
        true
    }

    /// Rebuild the entry of `op.key` from its history; true when `op` shaped the result
    fn rematerialize(&mut self, op: &MemoryOperation) -> bool {
        let Some(resolved) = self.history.get(&op.key).and_then(|ops| materialize(ops)) else {
            self.write_entry(op);
            return true;
        };
        let version = self.store.get(&op.key).map(|e| e.version + 1).unwrap_or(1);
        let shaped = resolved.applied.iter().any(|id| *id == op.id);
        self.store.insert(
            op.key.clone(),
            MemoryEntry {
                key: op.key.clone(),
                namespace: op.namespace.clone(),
                value: resolved.value,
                clock: resolved.clock,
                last_writer: resolved.last_writer,
                updated_at: resolved.updated_at,
                version,
                kind: resolved.kind,
            },
        );
        shaped
    }

    /// Operations `target_agent` has not seen according to its clock
    pub fn create_delta_sync(&self, target_agent: &str, target_clock: &VectorClock) -> SwarmResult<MemoryDelta> {
        let operations: Vec<MemoryOperation> = self
            .log
            .iter()
            .filter(|op| op.origin_counter() > target_clock.get(&op.agent_id))
            .take(self.config.max_delta_operations)
            .cloned()
            .collect();
        let (checksum, merkle_root) = delta_digests(&operations)?;
        let delta = MemoryDelta {
            id: uuid::Uuid::new_v4().to_string(),
            source_agent: self.local_id.clone(),
            target_agent: target_agent.to_string(),
            operations,
            merkle_root,
            checksum,
            created_at: self.clock.now(),
        };
        debug!(
            "Delta {} for {} carries {} operations",
            delta.id,
            target_agent,
            delta.operations.len()
        );
        Ok(delta)
    }

    /// Verify a delta and apply all of it, or reject it untouched
    pub fn apply_delta(&mut self, delta: MemoryDelta) -> SwarmResult<usize> {
        let verified = delta_digests(&delta.operations)
            .map(|(checksum, root)| checksum == delta.checksum && root == delta.merkle_root)
            .unwrap_or(false);
        let invalid_key = delta.operations.iter().find(|op| validate_key(&op.key).is_err());
        let failure = if !verified {
            Some("checksum or merkle root mismatch".to_string())
        } else {
            invalid_key.map(|op| format!("invalid key {:?}", op.key))
        };
        if let Some(reason) = failure {
            self.metrics.failed_syncs += 1;
            warn!("Rejected delta {} from {}: {}", delta.id, delta.source_agent, reason);
            self.events.emit(SwarmEvent::MemorySyncFailed {
                delta_id: delta.id.clone(),
                source_agent: delta.source_agent.clone(),
                reason: reason.clone(),
            });
            return Err(SwarmError::IntegrityFailure(reason));
        }

        let mut applied = 0;
        for op in delta.operations {
            if self.apply_operation(op)? != ApplyOutcome::Stale {
                applied += 1;
            }
        }
        self.metrics.successful_syncs += 1;
        info!("Delta {} from {}: {} operations applied", delta.id, delta.source_agent, applied);
        self.events.emit(SwarmEvent::MemorySyncCompleted {
            delta_id: delta.id,
            source_agent: delta.source_agent,
            applied,
        });
        Ok(applied)
    }

    // ── topology & sharding ─────────────────────────────────────

    /// Stored bytes over local capacity
    pub fn memory_pressure(&self) -> f64 {
        let used: usize = self.store.values().map(MemoryEntry::size_bytes).sum();
        used as f64 / self.config.node_capacity_bytes as f64
    }

    /// Re-pick the topology; emits only when it changes
    pub fn optimize_topology(&mut self) -> TopologyKind {
        let selected = select_topology(
            self.nodes.len(),
            self.memory_pressure(),
            self.config.consistency,
            self.config.large_swarm_threshold,
            self.config.high_pressure_threshold,
        );
        if selected != self.topology {
            info!("Memory topology {} -> {}", self.topology.as_str(), selected.as_str());
            self.events.emit(SwarmEvent::TopologyChanged {
                from: self.topology.as_str().to_string(),
                to: selected.as_str().to_string(),
            });
            self.topology = selected;
        }
        selected
    }

    pub fn get_topology(&self) -> MemoryTopology {
        MemoryTopology {
            kind: self.topology,
            replication_factor: self.config.replication_factor,
            consistency: self.config.consistency,
            nodes: self.nodes.values().cloned().collect(),
        }
    }

    pub fn join_node(&mut self, node_id: &str, capacity_bytes: u64, capabilities: Vec<String>) {
        let node = AgentNode {
            id: node_id.to_string(),
            capacity_bytes,
            capabilities,
            shards: Vec::new(),
            joined_at: self.clock.now(),
        };
        self.nodes.insert(node_id.to_string(), node);
        self.rebalance_shards();
    }

    pub fn leave_node(&mut self, node_id: &str) -> SwarmResult<()> {
        if node_id == self.local_id {
            return Err(SwarmError::NotPermitted("the local node cannot leave its own topology".into()));
        }
        self.nodes
            .remove(node_id)
            .ok_or_else(|| SwarmError::UnknownAgent(node_id.to_string()))?;
        self.rebalance_shards();
        Ok(())
    }

    fn rebalance_shards(&mut self) {
        let ids: Vec<String> = self.nodes.keys().cloned().collect();
        self.shards = assign_shards(&ids, self.config.shard_count, self.config.replication_factor);
        for node in self.nodes.values_mut() {
            node.shards.clear();
        }
        for (shard, owners) in &self.shards {
            for owner in owners {
                if let Some(node) = self.nodes.get_mut(owner) {
                    node.shards.push(*shard);
                }
            }
        }
        debug!("Rebalanced {} shards over {} nodes", self.config.shard_count, ids.len());
        self.events.emit(SwarmEvent::ShardsRebalanced {
            nodes: ids.len(),
            shards: self.config.shard_count,
        });
    }

    pub fn shard_for(&self, key: &str) -> u32 {
        shard_for(key, self.config.shard_count)
    }

    /// Nodes holding the shard of `key`
    pub fn replicas_for(&self, key: &str) -> Vec<String> {
        self.shards.get(&self.shard_for(key)).cloned().unwrap_or_default()
    }

    // ── housekeeping ────────────────────────────────────────────

    /// Drop tombstones (and their log entries) older than `older_than`
    pub fn purge_tombstones(&mut self, older_than: Duration) -> usize {
        let cutoff = self.clock.now() - older_than;
        let purged: HashSet<String> = self
            .store
            .values()
            .filter(|e| e.is_tombstone() && e.updated_at <= cutoff)
            .map(|e| e.key.clone())
            .collect();
        self.store.retain(|k, _| !purged.contains(k));
        self.log.retain(|op| !purged.contains(&op.key));
        self.history.retain(|k, _| !purged.contains(k));
        if !purged.is_empty() {
            info!("Purged {} tombstones", purged.len());
        }
        purged.len()
    }

    pub fn metrics(&self) -> MemoryMetrics {
        let tombstones = self.store.values().filter(|e| e.is_tombstone()).count();
        MemoryMetrics {
            entries: self.store.len() - tombstones,
            tombstones,
            memory_pressure: self.memory_pressure(),
            ..self.metrics.clone()
        }
    }

    /// Drop the replication log; stored values and per-key history stay
    pub fn emergency_stop(&mut self) {
        self.log.clear();
        self.seen.clear();
        warn!("Memory manager {} emergency stop", self.local_id);
        self.events.emit(SwarmEvent::EmergencyStop {
            component: "memory-manager".into(),
        });
    }
}

fn validate_key(key: &str) -> SwarmResult<()> {
    if key.is_empty() || key.starts_with(':') {
        return Err(SwarmError::InvalidKey(key.to_string()));
    }
    Ok(())
}

struct Materialized {
    value: Option<Value>,
    clock: VectorClock,
    last_writer: String,
    updated_at: DateTime<Utc>,
    kind: OperationKind,
    /// Ids of the writes that contributed, in application order
    applied: Vec<String>,
}

fn lww_order(a: &MemoryOperation, b: &MemoryOperation) -> std::cmp::Ordering {
    a.lww_key().cmp(&b.lww_key()).then_with(|| a.id.cmp(&b.id))
}

/// Value of a key given the writes it has seen, independent of arrival order
fn materialize(ops: &[MemoryOperation]) -> Option<Materialized> {
    let mut clock = VectorClock::new();
    for op in ops {
        clock.merge(&op.clock);
    }

    let superseded = |op: &MemoryOperation| {
        ops.iter()
            .any(|o| o.kind != OperationKind::Merge && op.clock.happens_before(&o.clock))
    };
    let base = ops
        .iter()
        .filter(|op| op.kind != OperationKind::Merge && !superseded(op))
        .max_by(|a, b| lww_order(a, b));
    let mut pending: Vec<&MemoryOperation> = ops
        .iter()
        .filter(|op| op.kind == OperationKind::Merge)
        .filter(|op| base.map_or(true, |b| !op.clock.happens_before(&b.clock)))
        .collect();

    let mut value = base.and_then(|b| b.value.clone());
    let mut applied: Vec<&MemoryOperation> = base.into_iter().collect();
    while !pending.is_empty() {
        let next = pending
            .iter()
            .enumerate()
            .filter(|(_, m)| !pending.iter().any(|o| o.clock.happens_before(&m.clock)))
            .min_by(|(_, a), (_, b)| lww_order(a, b))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let merge = pending.remove(next);
        let mut current = value.take().unwrap_or(Value::Null);
        if let Some(patch) = &merge.value {
            deep_merge(&mut current, patch);
        }
        value = Some(current);
        applied.push(merge);
    }

    let last = applied.last()?;
    Some(Materialized {
        value,
        clock,
        last_writer: last.agent_id.clone(),
        updated_at: last.timestamp,
        kind: last.kind,
        applied: applied.iter().map(|o| o.id.clone()).collect(),
    })
}

/// `(checksum, merkle root)` of an operation list
fn delta_digests(operations: &[MemoryOperation]) -> SwarmResult<(String, String)> {
    let serialized = serde_json::to_vec(operations)?;
    let leaves = operations
        .iter()
        .map(MemoryOperation::hash)
        .collect::<SwarmResult<Vec<_>>>()?;
    Ok((sha256_hex(&[&serialized]), merkle_root(&leaves)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::drain;
    use serde_json::json;
    use std::sync::Arc;

    fn manager(id: &str, clock: &Arc<ManualClock>) -> DistributedMemoryManager {
        DistributedMemoryManager::new(id, MemoryConfig::default(), clock.clone(), EventBus::new()).unwrap()
    }

    #[test]
    fn test_namespace_from_prefix() {
        assert_eq!(namespace_of("tasks:42", "default"), "tasks");
        assert_eq!(namespace_of("a:b:c", "default"), "a");
        assert_eq!(namespace_of("plain", "default"), "default");
    }

    #[test]
    fn test_set_get_delete() {
        let clock = ManualClock::fixed();
        let mut m = manager("agent-a", &clock);
        m.set("tasks:1", json!({"state": "open"})).unwrap();
        assert_eq!(m.get("tasks:1"), Some(json!({"state": "open"})));
        assert_eq!(m.namespace_entries("tasks").len(), 1);

        m.delete("tasks:1").unwrap();
        assert_eq!(m.get("tasks:1"), None);
        assert!(m.entry("tasks:1").unwrap().is_tombstone());
        assert_eq!(m.entry("tasks:1").unwrap().version, 2);
        assert!(matches!(m.set("", json!(1)), Err(SwarmError::InvalidKey(_))));
    }

    #[test]
    fn test_local_merge_deep_merges() {
        let clock = ManualClock::fixed();
        let mut m = manager("agent-a", &clock);
        m.set("cfg:x", json!({"a": 1, "nested": {"b": 2}})).unwrap();
        m.merge("cfg:x", json!({"nested": {"c": 3}})).unwrap();
        assert_eq!(m.get("cfg:x"), Some(json!({"a": 1, "nested": {"b": 2, "c": 3}})));
    }

    #[test]
    fn test_concurrent_writes_converge_by_last_writer() {
        let clock = ManualClock::fixed();
        let mut a = manager("agent-a", &clock);
        let mut b = manager("agent-b", &clock);
        let mut rx = a.events.subscribe();

        let from_a = a.set("k", json!(1)).unwrap();
        let from_b = b.set("k", json!(2)).unwrap();
        assert_eq!(
            a.apply_operation(from_b).unwrap(),
            ApplyOutcome::Conflict { incoming_won: true }
        );
        assert_eq!(
            b.apply_operation(from_a).unwrap(),
            ApplyOutcome::Conflict { incoming_won: false }
        );
        assert_eq!(a.get("k"), Some(json!(2)));
        assert_eq!(b.get("k"), Some(json!(2)));
        assert_eq!(a.metrics().conflicts, 1);
        assert!(drain(&mut rx).iter().any(|e| e.name() == "memory-conflict"));
    }

    #[test]
    fn test_concurrent_writes_to_different_keys_do_not_conflict() {
        let clock = ManualClock::fixed();
        let mut a = manager("agent-a", &clock);
        let mut b = manager("agent-b", &clock);
        a.set("ns:one", json!(1)).unwrap();
        let op = b.set("ns:two", json!(2)).unwrap();
        assert_eq!(a.apply_operation(op).unwrap(), ApplyOutcome::Applied);
        assert_eq!(a.metrics().conflicts, 0);
    }

    #[test]
    fn test_concurrent_merges_keep_both_sides() {
        let clock = ManualClock::fixed();
        let mut a = manager("agent-a", &clock);
        let mut b = manager("agent-b", &clock);
        let base = a.set("doc", json!({"title": "t"})).unwrap();
        b.apply_operation(base).unwrap();

        let from_a = a.merge("doc", json!({"x": 1})).unwrap();
        clock.advance(Duration::milliseconds(5));
        let from_b = b.merge("doc", json!({"y": 2})).unwrap();
        a.apply_operation(from_b).unwrap();
        b.apply_operation(from_a).unwrap();

        let expected = json!({"title": "t", "x": 1, "y": 2});
        assert_eq!(a.get("doc"), Some(expected.clone()));
        assert_eq!(b.get("doc"), Some(expected));
    }

    #[test]
    fn test_concurrent_set_and_merge_converge() {
        let clock = ManualClock::fixed();
        let mut a = manager("agent-a", &clock);
        let mut b = manager("agent-b", &clock);
        let base = a.set("doc", json!({"t": 1})).unwrap();
        b.apply_operation(base).unwrap();

        let from_a = a.set("doc", json!({"z": 9})).unwrap();
        clock.advance(Duration::milliseconds(5));
        let from_b = b.merge("doc", json!({"x": 1})).unwrap();
        assert!(matches!(a.apply_operation(from_b).unwrap(), ApplyOutcome::Conflict { .. }));
        assert!(matches!(b.apply_operation(from_a).unwrap(), ApplyOutcome::Conflict { .. }));

        let expected = json!({"z": 9, "x": 1});
        assert_eq!(a.get("doc"), Some(expected.clone()));
        assert_eq!(b.get("doc"), Some(expected));
        assert_eq!(a.entry("doc").unwrap().clock, b.entry("doc").unwrap().clock);
    }

    #[test]
    fn test_three_way_conflict_independent_of_arrival_order() {
        let clock = ManualClock::fixed();
        let mut writers: Vec<_> = ["agent-a", "agent-b", "agent-c"].iter().map(|id| manager(id, &clock)).collect();
        let base = writers[0].set("doc", json!({"shared": 0, "n": {"k": 0}})).unwrap();
        for w in writers.iter_mut().skip(1) {
            w.apply_operation(base.clone()).unwrap();
        }
        let first = writers[0].merge("doc", json!({"shared": 1, "a": true})).unwrap();
        clock.advance(Duration::milliseconds(1));
        let second = writers[1].merge("doc", json!({"n": {"k": 2}})).unwrap();
        clock.advance(Duration::milliseconds(1));
        let third = writers[2].merge("doc", json!({"shared": 3})).unwrap();

        let mut forward = manager("agent-x", &clock);
        let mut backward = manager("agent-y", &clock);
        forward.apply_operation(base.clone()).unwrap();
        backward.apply_operation(base).unwrap();
        for op in [&first, &second, &third] {
            forward.apply_operation(op.clone()).unwrap();
        }
        for op in [&third, &second, &first] {
            backward.apply_operation(op.clone()).unwrap();
        }

        let expected = json!({"shared": 3, "a": true, "n": {"k": 2}});
        assert_eq!(forward.get("doc"), Some(expected.clone()));
        assert_eq!(backward.get("doc"), Some(expected));
    }

    #[test]
    fn test_causally_older_write_is_stale() {
        let clock = ManualClock::fixed();
        let mut a = manager("agent-a", &clock);
        let mut b = manager("agent-b", &clock);
        let first = a.set("k", json!("old")).unwrap();
        let second = a.set("k", json!("new")).unwrap();
        b.apply_operation(second.clone()).unwrap();
        assert_eq!(b.apply_operation(first).unwrap(), ApplyOutcome::Stale);
        assert_eq!(b.apply_operation(second).unwrap(), ApplyOutcome::Stale);
        assert_eq!(b.get("k"), Some(json!("new")));
    }

    #[test]
    fn test_delta_sync_ships_only_missing_operations() {
        let clock = ManualClock::fixed();
        let mut a = manager("agent-a", &clock);
        let mut b = manager("agent-b", &clock);
        for i in 0..3 {
            a.set(&format!("tasks:{}", i), json!(i)).unwrap();
        }

        let delta = a.create_delta_sync("agent-b", &b.clock()).unwrap();
        assert_eq!(delta.operations.len(), 3);
        assert_eq!(b.apply_delta(delta).unwrap(), 3);
        assert_eq!(b.namespace_entries("tasks").len(), 3);
        assert_eq!(b.metrics().successful_syncs, 1);

        let again = a.create_delta_sync("agent-b", &b.clock()).unwrap();
        assert!(again.operations.is_empty());
    }

    #[test]
    fn test_corrupted_delta_rejected_whole() {
        let clock = ManualClock::fixed();
        let mut a = manager("agent-a", &clock);
        let mut b = manager("agent-b", &clock);
        a.set("k1", json!(1)).unwrap();
        a.set("k2", json!(2)).unwrap();

        let mut delta = a.create_delta_sync("agent-b", &b.clock()).unwrap();
        delta.operations[1].value = Some(json!(999));
        let mut rx = b.events.subscribe();
        assert!(matches!(b.apply_delta(delta), Err(SwarmError::IntegrityFailure(_))));
        assert_eq!(b.get("k1"), None);
        assert_eq!(b.metrics().failed_syncs, 1);
        let names: Vec<_> = drain(&mut rx).iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["memory-sync-failed"]);
    }

    #[test]
    fn test_topology_reselection_is_idempotent() {
        let clock = ManualClock::fixed();
        let config = MemoryConfig {
            consistency: ConsistencyLevel::Strong,
            ..Default::default()
        };
        let mut m = DistributedMemoryManager::new("n00", config, clock.clone(), EventBus::new()).unwrap();
        assert_eq!(m.optimize_topology(), TopologyKind::Mesh);
        for i in 1..20 {
            m.join_node(&format!("n{:02}", i), 1 << 20, vec![]);
        }
        let mut rx = m.events.subscribe();
        assert_eq!(m.optimize_topology(), TopologyKind::Hierarchical);
        assert_eq!(m.optimize_topology(), TopologyKind::Hierarchical);
        let changes = drain(&mut rx).iter().filter(|e| e.name() == "topology-changed").count();
        assert_eq!(changes, 1);
    }

    #[test]
    fn test_shards_rebalance_on_membership_change() {
        let clock = ManualClock::fixed();
        let mut m = manager("n1", &clock);
        for id in ["n2", "n3", "n4"] {
            m.join_node(id, 1 << 20, vec![]);
        }
        let topology = m.get_topology();
        let held: usize = topology.nodes.iter().map(|n| n.shards.len()).sum();
        assert_eq!(held, 16 * 3);
        assert_eq!(m.replicas_for("tasks:1").len(), 3);

        m.leave_node("n4").unwrap();
        assert!(m.get_topology().nodes.iter().all(|n| n.shards.len() == 16));
        assert!(matches!(m.leave_node("n1"), Err(SwarmError::NotPermitted(_))));
        assert!(matches!(m.leave_node("ghost"), Err(SwarmError::UnknownAgent(_))));
    }

    #[test]
    fn test_purge_tombstones() {
        let clock = ManualClock::fixed();
        let mut m = manager("agent-a", &clock);
        m.set("keep", json!(1)).unwrap();
        m.set("gone", json!(2)).unwrap();
        m.delete("gone").unwrap();
        assert_eq!(m.purge_tombstones(Duration::hours(1)), 0);
        clock.advance(Duration::hours(2));
        assert_eq!(m.purge_tombstones(Duration::hours(1)), 1);
        assert!(m.entry("gone").is_none());
        assert_eq!(m.metrics().entries, 1);
        assert_eq!(m.metrics().tombstones, 0);
    }
}
