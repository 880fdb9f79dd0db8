//! Vector clock for causal ordering of replicated memory operations
//!
//! Each agent owns one entry. Comparing two clocks tells whether one write
//! causally precedes another or whether they raced (concurrent), which is the
//! only case the memory layer treats as a conflict.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of comparing two vector clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockOrdering {
    /// `self` happened before `other`
    Before,
    /// `self` happened after `other`
    After,
    Equal,
    /// Neither dominates: concurrent modification
    Concurrent,
}

/// Agent id -> logical counter. Merge is component-wise max.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    clocks: BTreeMap<String, u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump the entry for `agent_id` and return the new value
    pub fn increment(&mut self, agent_id: &str) -> u64 {
        let entry = self.clocks.entry(agent_id.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Counter for an agent (0 if absent)
    pub fn get(&self, agent_id: &str) -> u64 {
        self.clocks.get(agent_id).copied().unwrap_or(0)
    }

    /// Component-wise max. Commutative, associative and idempotent.
    pub fn merge(&mut self, other: &Self) {
        for (agent_id, &other_val) in &other.clocks {
            let entry = self.clocks.entry(agent_id.clone()).or_insert(0);
            *entry = (*entry).max(other_val);
        }
    }

    pub fn compare(&self, other: &Self) -> ClockOrdering {
        let mut less = false;
        let mut greater = false;
        for agent in self.clocks.keys().chain(other.clocks.keys()) {
            let a = self.get(agent);
            let b = other.get(agent);
            if a < b {
                less = true;
            } else if a > b {
                greater = true;
            }
            if less && greater {
                return ClockOrdering::Concurrent;
            }
        }
        match (less, greater) {
            (false, false) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Before,
            (false, true) => ClockOrdering::After,
            (true, true) => ClockOrdering::Concurrent,
        }
    }

    /// Every entry ≤ the other's and at least one strictly less
    pub fn happens_before(&self, other: &Self) -> bool {
        self.compare(other) == ClockOrdering::Before
    }

    pub fn dominates(&self, other: &Self) -> bool {
        other.happens_before(self)
    }

    pub fn concurrent_with(&self, other: &Self) -> bool {
        self.compare(other) == ClockOrdering::Concurrent
    }

    /// Every entry ≥ the other's (equal clocks descend from each other)
    pub fn descends_from(&self, other: &Self) -> bool {
        matches!(
            self.compare(other),
            ClockOrdering::After | ClockOrdering::Equal
        )
    }

    pub fn agents(&self) -> impl Iterator<Item = &str> {
        self.clocks.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn clock(entries: &[(&str, u64)]) -> VectorClock {
        let mut c = VectorClock::new();
        for (agent, n) in entries {
            for _ in 0..*n {
                c.increment(agent);
            }
        }
        c
    }

    #[test]
    fn test_concurrent_writes_detected() {
        let a = clock(&[("agent-1", 2)]);
        let b = clock(&[("agent-2", 1)]);
        assert!(a.concurrent_with(&b));
        assert_eq!(a.compare(&b), ClockOrdering::Concurrent);
    }

    #[test]
    fn test_happens_before_and_dominates() {
        let a = clock(&[("agent-1", 1)]);
        let mut b = a.clone();
        b.increment("agent-2");
        assert!(a.happens_before(&b));
        assert!(b.dominates(&a));
        assert_eq!(b.compare(&a), ClockOrdering::After);
        assert!(b.descends_from(&a));
        assert!(!a.descends_from(&b));
    }

    #[test]
    fn test_equal_clocks() {
        let a = clock(&[("x", 3), ("y", 1)]);
        let b = clock(&[("y", 1), ("x", 3)]);
        assert_eq!(a.compare(&b), ClockOrdering::Equal);
        assert!(!a.concurrent_with(&b));
        assert!(a.descends_from(&b));
    }

    #[test]
    fn test_merge_takes_max() {
        let mut a = clock(&[("agent-1", 2)]);
        let b = clock(&[("agent-1", 1), ("agent-2", 4)]);
        a.merge(&b);
        assert_eq!(a.get("agent-1"), 2);
        assert_eq!(a.get("agent-2"), 4);
        assert_eq!(a.len(), 2);
    }

    fn arb_clock() -> impl Strategy<Value = VectorClock> {
        proptest::collection::btree_map("[a-d]", 0u64..5, 0..4).prop_map(|m| VectorClock { clocks: m })
    }

    proptest! {
        #[test]
        fn prop_merge_is_commutative(a in arb_clock(), b in arb_clock()) {
            let mut ab = a.clone();
            ab.merge(&b);
            let mut ba = b.clone();
            ba.merge(&a);
            prop_assert_eq!(ab.compare(&ba), ClockOrdering::Equal);
        }

        #[test]
        fn prop_merge_is_idempotent(a in arb_clock()) {
            let mut aa = a.clone();
            aa.merge(&a);
            prop_assert_eq!(aa.compare(&a), ClockOrdering::Equal);
        }

        #[test]
        fn prop_merge_descends_from_both(a in arb_clock(), b in arb_clock()) {
            let mut m = a.clone();
            m.merge(&b);
            prop_assert!(m.descends_from(&a));
            prop_assert!(m.descends_from(&b));
        }
    }
}
