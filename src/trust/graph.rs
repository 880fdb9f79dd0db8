//! Best trust path search
//!
//! Layer `k` holds, for every agent, the strongest simple path reaching it in
//! exactly `k` hops. The score of a path that reaches the target is its edge
//! product times `decay^(k-1)`, so a longer path wins only when it is
//! strictly stronger after the per-hop discount.

use std::collections::HashMap;

/// Outgoing trust edge
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub to: String,
    pub assertion_id: String,
    pub trust: f64,
    pub confidence: f64,
}

pub type Adjacency = HashMap<String, Vec<Edge>>;

#[derive(Debug, Clone, PartialEq)]
pub struct FoundPath {
    pub agents: Vec<String>,
    pub assertion_ids: Vec<String>,
    pub edge_trust: Vec<f64>,
    pub edge_confidence: Vec<f64>,
    /// Product of edge trust times the hop discount
    pub score: f64,
}

#[derive(Clone)]
struct Partial {
    agents: Vec<String>,
    assertion_ids: Vec<String>,
    edge_trust: Vec<f64>,
    edge_confidence: Vec<f64>,
    product: f64,
}

pub fn best_path(adjacency: &Adjacency, from: &str, to: &str, max_hops: usize, decay: f64) -> Option<FoundPath> {
    if from == to || max_hops == 0 {
        return None;
    }

    let mut frontier: HashMap<String, Partial> = HashMap::new();
    frontier.insert(
        from.to_string(),
        Partial {
            agents: vec![from.to_string()],
            assertion_ids: Vec::new(),
            edge_trust: Vec::new(),
            edge_confidence: Vec::new(),
            product: 1.0,
        },
    );
    let mut best: Option<FoundPath> = None;

    for hops in 1..=max_hops {
        let mut next: HashMap<String, Partial> = HashMap::new();
        for partial in frontier.values() {
            let tail = partial.agents.last().map(String::as_str).unwrap_or(from);
            for edge in adjacency.get(tail).into_iter().flatten() {
                if edge.trust <= 0.0 || partial.agents.contains(&edge.to) {
                    continue;
                }
                let product = partial.product * edge.trust;
                if next.get(&edge.to).map(|p| p.product >= product).unwrap_or(false) {
                    continue;
                }
                let mut extended = partial.clone();
                extended.agents.push(edge.to.clone());
                extended.assertion_ids.push(edge.assertion_id.clone());
                extended.edge_trust.push(edge.trust);
                extended.edge_confidence.push(edge.confidence);
                extended.product = product;
                next.insert(edge.to.clone(), extended);
            }
        }

        if let Some(reached) = next.remove(to) {
            let score = reached.product * decay.powi(hops as i32 - 1);
            if best.as_ref().map(|b| score > b.score).unwrap_or(true) {
                best = Some(FoundPath {
                    agents: reached.agents,
                    assertion_ids: reached.assertion_ids,
                    edge_trust: reached.edge_trust,
                    edge_confidence: reached.edge_confidence,
                    score,
                });
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn graph(edges: &[(&str, &str, f64)]) -> Adjacency {
        let mut adj = Adjacency::new();
        for (i, (from, to, trust)) in edges.iter().enumerate() {
            adj.entry(from.to_string()).or_default().push(Edge {
                to: to.to_string(),
                assertion_id: format!("e{}", i),
                trust: *trust,
                confidence: 0.8,
            });
        }
        adj
    }

    #[test]
    fn test_two_hop_path_decays_once() {
        let adj = graph(&[("A", "B", 0.9), ("B", "C", 0.8)]);
        let p = best_path(&adj, "A", "C", 5, 0.95).unwrap();
        assert_eq!(p.agents, vec!["A", "B", "C"]);
        assert!((p.score - 0.9 * 0.8 * 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_stronger_longer_path_wins() {
        let adj = graph(&[
            ("A", "C", 0.3),
            ("A", "B", 0.9),
            ("B", "C", 0.9),
        ]);
        let p = best_path(&adj, "A", "C", 5, 0.95).unwrap();
        assert_eq!(p.agents.len(), 3);
    }

    #[test]
    fn test_path_length_bound() {
        let adj = graph(&[("A", "B", 1.0), ("B", "C", 1.0), ("C", "D", 1.0)]);
        assert!(best_path(&adj, "A", "D", 2, 0.95).is_none());
        assert!(best_path(&adj, "A", "D", 3, 0.95).is_some());
    }

    #[test]
    fn test_cycles_are_not_followed() {
        let adj = graph(&[("A", "B", 1.0), ("B", "A", 1.0), ("B", "C", 0.5)]);
        let p = best_path(&adj, "A", "C", 5, 0.95).unwrap();
        assert_eq!(p.agents, vec!["A", "B", "C"]);
    }

    proptest! {
        #[test]
        fn prop_path_never_beats_its_weakest_edge(
            edges in prop::collection::vec((0u8..6, 0u8..6, 0.01f64..=1.0), 0..24),
            decay in 0.5f64..=1.0,
            max_hops in 1usize..6,
        ) {
            let names: Vec<String> = (0..6).map(|i| format!("n{}", i)).collect();
            let triples: Vec<(&str, &str, f64)> = edges
                .iter()
                .filter(|(a, b, _)| a != b)
                .map(|(a, b, t)| (names[*a as usize].as_str(), names[*b as usize].as_str(), *t))
                .collect();
            let adj = graph(&triples);
            if let Some(p) = best_path(&adj, "n0", "n5", max_hops, decay) {
                let weakest = p.edge_trust.iter().cloned().fold(f64::INFINITY, f64::min);
                prop_assert!(p.score <= weakest + 1e-12);
                prop_assert_eq!(p.agents.len(), p.edge_trust.len() + 1);
                prop_assert!(p.edge_trust.len() <= max_hops);
                let product: f64 = p.edge_trust.iter().product();
                let expected = product * decay.powi(p.edge_trust.len() as i32 - 1);
                prop_assert!((p.score - expected).abs() < 1e-12);
            }
        }
    }
}
