//! Weighted round evaluation

use super::types::{ConsensusVoteRecord, Verdict};

pub(crate) const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundTally {
    pub verdict: Verdict,
    pub malicious_ratio: f64,
    pub benign_ratio: f64,
    /// Weight-averaged confidence of the winning side
    pub confidence: f64,
    /// Winning side's share of cast weight
    pub agreement: f64,
}

#[derive(Default)]
struct Side {
    weight: f64,
    weighted_confidence: f64,
}

/// `ratio = Σ(weight × confidence) / Σ(weight)` per side, compared against the thresholds
pub fn tally(votes: &[ConsensusVoteRecord], malicious_threshold: f64, benign_threshold: f64) -> RoundTally {
    let mut malicious = Side::default();
    let mut benign = Side::default();
    let mut total = 0.0;
    for vote in votes {
        total += vote.weight;
        let side = match vote.decision {
            Verdict::Malicious => &mut malicious,
            Verdict::Benign => &mut benign,
            Verdict::Inconclusive => continue,
        };
        side.weight += vote.weight;
        side.weighted_confidence += vote.weight * vote.confidence;
    }

    if total <= 0.0 {
        return RoundTally {
            verdict: Verdict::Inconclusive,
            malicious_ratio: 0.0,
            benign_ratio: 0.0,
            confidence: 0.0,
            agreement: 0.0,
        };
    }

    let malicious_ratio = malicious.weighted_confidence / total;
    let benign_ratio = benign.weighted_confidence / total;
    let winner = if malicious_ratio + EPSILON >= malicious_threshold {
        Some((Verdict::Malicious, &malicious))
    } else if benign_ratio + EPSILON >= benign_threshold {
        Some((Verdict::Benign, &benign))
    } else {
        None
    };

    match winner {
        Some((verdict, side)) => RoundTally {
            verdict,
            malicious_ratio,
            benign_ratio,
            confidence: if side.weight > 0.0 {
                side.weighted_confidence / side.weight
            } else {
                0.0
            },
            agreement: side.weight / total,
        },
        None => RoundTally {
            verdict: Verdict::Inconclusive,
            malicious_ratio,
            benign_ratio,
            confidence: malicious_ratio.max(benign_ratio),
            agreement: malicious.weight.max(benign.weight) / total,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::RoundNumber;
    use chrono::Utc;
    use proptest::prelude::*;

    fn vote(decision: Verdict, confidence: f64, weight: f64) -> ConsensusVoteRecord {
        ConsensusVoteRecord {
            voter_id: uuid::Uuid::new_v4().to_string(),
            round: RoundNumber::One,
            decision,
            confidence,
            weight,
            commit_hash: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_clear_malicious_majority() {
        let votes: Vec<_> = (0..5).map(|_| vote(Verdict::Malicious, 0.9, 0.35)).collect();
        let t = tally(&votes, 0.67, 0.67);
        assert_eq!(t.verdict, Verdict::Malicious);
        assert!((t.confidence - 0.9).abs() < 1e-9);
        assert!((t.agreement - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_low_confidence_majority_is_inconclusive() {
        let votes: Vec<_> = (0..5).map(|_| vote(Verdict::Malicious, 0.5, 0.35)).collect();
        let t = tally(&votes, 0.67, 0.67);
        assert_eq!(t.verdict, Verdict::Inconclusive);
        assert!((t.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_heavier_voters_dominate() {
        let votes = vec![
            vote(Verdict::Benign, 1.0, 1.0),
            vote(Verdict::Malicious, 1.0, 0.1),
            vote(Verdict::Malicious, 1.0, 0.1),
        ];
        let t = tally(&votes, 0.67, 0.67);
        assert_eq!(t.verdict, Verdict::Benign);
        assert!((t.benign_ratio - 1.0 / 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_no_votes() {
        assert_eq!(tally(&[], 0.67, 0.67).verdict, Verdict::Inconclusive);
    }

    fn verdict_strategy() -> impl Strategy<Value = Verdict> {
        prop_oneof![Just(Verdict::Malicious), Just(Verdict::Benign), Just(Verdict::Inconclusive)]
    }

    proptest! {
        #[test]
        fn prop_switching_a_vote_to_malicious_never_lowers_the_ratio(
            raw in prop::collection::vec((verdict_strategy(), 0.0f64..=1.0, 0.01f64..=1.3), 1..20),
            pick in any::<prop::sample::Index>(),
        ) {
            let votes: Vec<_> = raw.iter().map(|(d, c, w)| vote(*d, *c, *w)).collect();
            let before = tally(&votes, 0.67, 0.67);
            let mut switched = votes.clone();
            switched[pick.index(votes.len())].decision = Verdict::Malicious;
            let after = tally(&switched, 0.67, 0.67);
            prop_assert!(after.malicious_ratio + 1e-12 >= before.malicious_ratio);
            if before.verdict == Verdict::Malicious {
                prop_assert_eq!(after.verdict, Verdict::Malicious);
            }
        }

        #[test]
        fn prop_fully_confident_malicious_vote_never_lowers_the_ratio(
            raw in prop::collection::vec((verdict_strategy(), 0.0f64..=1.0, 0.01f64..=1.3), 0..20),
            weight in 0.01f64..=1.3,
        ) {
            let mut votes: Vec<_> = raw.iter().map(|(d, c, w)| vote(*d, *c, *w)).collect();
            let before = tally(&votes, 0.67, 0.67);
            votes.push(vote(Verdict::Malicious, 1.0, weight));
            let after = tally(&votes, 0.67, 0.67);
            prop_assert!(after.malicious_ratio + 1e-12 >= before.malicious_ratio);
        }
    }
}
