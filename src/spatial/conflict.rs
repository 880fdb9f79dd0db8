//! Conflict detection and resolution over spatial agent state

use super::types::{
    ConflictType, Position, SpatialAgentState, SpatialConflict, SpatialConsensusProposal, SpatialProposalKind,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};

/// Pairwise proximity checks plus exclusive-resource contention.
///
/// Contention counts both granted exclusive resources and exclusive
/// requirements of proposals still pending.
pub fn detect(
    agents: &BTreeMap<String, SpatialAgentState>,
    pending: &[&SpatialConsensusProposal],
    tolerance: f64,
    now: DateTime<Utc>,
) -> Vec<SpatialConflict> {
    let mut conflicts = Vec::new();

    let states: Vec<&SpatialAgentState> = agents.values().collect();
    for (i, a) in states.iter().enumerate() {
        for b in &states[i + 1..] {
            if a.position.distance(&b.position) < tolerance {
                conflicts.push(SpatialConflict {
                    id: uuid::Uuid::new_v4().to_string(),
                    conflict_type: ConflictType::LocationOverlap,
                    agents: vec![a.agent_id.clone(), b.agent_id.clone()],
                    resource_type: None,
                    detected_at: now,
                });
            }
        }
    }

    let mut holders: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for state in agents.values() {
        for (resource, grant) in &state.resources {
            if grant.exclusive {
                holders.entry(resource).or_default().insert(&state.agent_id);
            }
        }
    }
    for proposal in pending {
        let subject = proposal.kind.subject();
        for req in proposal.resource_requirements.iter().filter(|r| r.exclusive) {
            holders.entry(&req.resource_type).or_default().insert(subject);
        }
        if let SpatialProposalKind::ResourceAllocation { resource_type, exclusive: true, .. } = &proposal.kind {
            holders.entry(resource_type).or_default().insert(subject);
        }
    }
    for (resource, agents) in holders {
        if agents.len() > 1 {
            conflicts.push(SpatialConflict {
                id: uuid::Uuid::new_v4().to_string(),
                conflict_type: ConflictType::ResourceContention,
                agents: agents.into_iter().map(String::from).collect(),
                resource_type: Some(resource.to_string()),
                detected_at: now,
            });
        }
    }

    conflicts
}

/// Involved agents ordered from the one that keeps its claim to the ones that yield
pub fn yield_order<'a>(agents: &'a BTreeMap<String, SpatialAgentState>, ids: &[String]) -> Vec<&'a SpatialAgentState> {
    let mut involved: Vec<&SpatialAgentState> = ids.iter().filter_map(|id| agents.get(id)).collect();
    involved.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.agent_id.cmp(&b.agent_id)));
    involved
}

fn is_free(candidate: &Position, occupied: &[Position], tolerance: f64) -> bool {
    occupied.iter().all(|p| p.distance(candidate) >= tolerance)
}

/// Nearest free spot: probe the four horizontal directions at growing
/// distance, then fall back to random points around the origin
pub fn find_free_position(origin: &Position, occupied: &[Position], tolerance: f64, fallback_radius: f64) -> Position {
    let step = tolerance.max(f64::EPSILON);
    for ring in 1..=4 {
        let d = step * ring as f64;
        for (dx, dy) in [(d, 0.0), (-d, 0.0), (0.0, d), (0.0, -d)] {
            let candidate = origin.offset(dx, dy, 0.0);
            if is_free(&candidate, occupied, tolerance) {
                return candidate;
            }
        }
    }

    let mut rng = rand::thread_rng();
    let radius = fallback_radius.max(step);
    let mut candidate = origin.offset(radius, 0.0, 0.0);
    for _ in 0..32 {
        candidate = origin.offset(rng.gen_range(-radius..=radius), rng.gen_range(-radius..=radius), 0.0);
        if is_free(&candidate, occupied, tolerance) {
            break;
        }
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::types::ResourceGrant;

    fn agents(positions: &[(&str, f64, u32)]) -> BTreeMap<String, SpatialAgentState> {
        positions
            .iter()
            .map(|(id, x, prio)| (id.to_string(), SpatialAgentState::new(*id, Position::new(*x, 0.0, 0.0), *prio)))
            .collect()
    }

    #[test]
    fn test_overlap_detected_only_within_tolerance() {
        let map = agents(&[("a", 0.0, 1), ("b", 0.5, 1), ("c", 10.0, 1)]);
        let conflicts = detect(&map, &[], 1.0, Utc::now());
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::LocationOverlap);
        assert_eq!(conflicts[0].agents, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_shared_resources_do_not_contend() {
        let mut map = agents(&[("a", 0.0, 1), ("b", 50.0, 1)]);
        for id in ["a", "b"] {
            map.get_mut(id).unwrap().resources.insert(
                "charger".into(),
                ResourceGrant { amount: 1.0, exclusive: false },
            );
        }
        assert!(detect(&map, &[], 1.0, Utc::now()).is_empty());

        map.get_mut("a").unwrap().resources.get_mut("charger").unwrap().exclusive = true;
        map.get_mut("b").unwrap().resources.get_mut("charger").unwrap().exclusive = true;
        let conflicts = detect(&map, &[], 1.0, Utc::now());
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].resource_type.as_deref(), Some("charger"));
    }

    #[test]
    fn test_probe_finds_nearest_free_direction() {
        let origin = Position::default();
        let occupied = vec![Position::new(0.0, 0.0, 0.0), Position::new(1.0, 0.0, 0.0)];
        let free = find_free_position(&origin, &occupied, 1.0, 5.0);
        assert_eq!(free, Position::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_yield_order_by_priority() {
        let map = agents(&[("a", 0.0, 1), ("b", 0.0, 5), ("c", 0.0, 3)]);
        let order: Vec<_> = yield_order(&map, &["a".into(), "b".into(), "c".into()])
            .iter()
            .map(|s| s.agent_id.clone())
            .collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }
}
