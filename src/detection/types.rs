//! Rounds, votes, evidence and results of malicious-agent detection

use crate::crypto::ThresholdSignature;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A voter's or a round's view of the accused agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Malicious,
    Benign,
    Inconclusive,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Malicious => "malicious",
            Verdict::Benign => "benign",
            Verdict::Inconclusive => "inconclusive",
        }
    }
}

/// Outcome of a whole detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalDecision {
    Malicious,
    Benign,
    Failed,
}

impl FinalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalDecision::Malicious => "malicious",
            FinalDecision::Benign => "benign",
            FinalDecision::Failed => "failed",
        }
    }

    pub fn verdict(&self) -> Option<Verdict> {
        match self {
            FinalDecision::Malicious => Some(Verdict::Malicious),
            FinalDecision::Benign => Some(Verdict::Benign),
            FinalDecision::Failed => None,
        }
    }
}

/// There are exactly three rounds; a fourth cannot be named
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoundNumber {
    One,
    Two,
    Three,
}

impl RoundNumber {
    pub const ALL: [RoundNumber; 3] = [RoundNumber::One, RoundNumber::Two, RoundNumber::Three];

    pub fn as_u8(&self) -> u8 {
        match self {
            RoundNumber::One => 1,
            RoundNumber::Two => 2,
            RoundNumber::Three => 3,
        }
    }

    pub fn index(&self) -> usize {
        self.as_u8() as usize - 1
    }

    pub fn next(&self) -> Option<RoundNumber> {
        match self {
            RoundNumber::One => Some(RoundNumber::Two),
            RoundNumber::Two => Some(RoundNumber::Three),
            RoundNumber::Three => None,
        }
    }

    /// Purpose of the round
    pub fn stage(&self) -> &'static str {
        match self {
            RoundNumber::One => "evidence-collection",
            RoundNumber::Two => "evidence-review",
            RoundNumber::Three => "final-decision",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// Not opened yet
    Pending,
    Collecting,
    /// Round 1 under commit-reveal: commitments closed, waiting for reveals
    Revealing,
    Completed,
    Failed,
    Skipped,
    /// Never reached because the detection ended earlier
    Cancelled,
}

/// One piece of evidence against (or for) the accused agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusEvidence {
    pub id: String,
    pub submitter_id: String,
    pub behavioral_deviations: Vec<String>,
    pub protocol_violations: Vec<String>,
    pub network_anomalies: Vec<String>,
    /// Importance in [0, 1]
    pub weight: f64,
    /// Trustworthiness of the source in [0, 1]
    pub reliability: f64,
    pub timestamp: DateTime<Utc>,
}

impl ConsensusEvidence {
    pub fn new(submitter_id: impl Into<String>, weight: f64, reliability: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            submitter_id: submitter_id.into(),
            behavioral_deviations: Vec::new(),
            protocol_violations: Vec::new(),
            network_anomalies: Vec::new(),
            weight,
            reliability,
            timestamp,
        }
    }

    pub fn with_protocol_violation(mut self, violation: impl Into<String>) -> Self {
        self.protocol_violations.push(violation.into());
        self
    }

    pub fn with_behavioral_deviation(mut self, deviation: impl Into<String>) -> Self {
        self.behavioral_deviations.push(deviation.into());
        self
    }

    pub fn in_range(&self) -> bool {
        (0.0..=1.0).contains(&self.weight) && (0.0..=1.0).contains(&self.reliability)
    }
}

/// Evidence pooled for one round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSnapshot {
    pub behavioral_deviations: Vec<String>,
    pub protocol_violations: Vec<String>,
    pub network_anomalies: Vec<String>,
    pub evidence_count: usize,
    pub average_weight: f64,
    pub average_reliability: f64,
}

impl EvidenceSnapshot {
    /// Concatenate every list and average over the pooled items
    pub fn aggregate(pool: &[ConsensusEvidence]) -> Self {
        let mut snapshot = EvidenceSnapshot {
            evidence_count: pool.len(),
            ..Default::default()
        };
        for e in pool {
            snapshot.behavioral_deviations.extend(e.behavioral_deviations.iter().cloned());
            snapshot.protocol_violations.extend(e.protocol_violations.iter().cloned());
            snapshot.network_anomalies.extend(e.network_anomalies.iter().cloned());
        }
        if !pool.is_empty() {
            let n = pool.len() as f64;
            snapshot.average_weight = pool.iter().map(|e| e.weight).sum::<f64>() / n;
            snapshot.average_reliability = pool.iter().map(|e| e.reliability).sum::<f64>() / n;
        }
        snapshot
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusVoteRecord {
    pub voter_id: String,
    pub round: RoundNumber,
    pub decision: Verdict,
    pub confidence: f64,
    /// `reputation × 0.7 + min(stake / 10000, 0.3)` at vote time
    pub weight: f64,
    /// Present for round 1 votes under commit-reveal
    pub commit_hash: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusRound {
    pub number: RoundNumber,
    pub status: RoundStatus,
    pub evidence: EvidenceSnapshot,
    pub votes: Vec<ConsensusVoteRecord>,
    /// `ceil(eligible × malicious_threshold)`
    pub threshold: usize,
    pub result: Verdict,
    pub confidence: f64,
    pub agreement: f64,
    pub participation: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ConsensusRound {
    pub fn new(number: RoundNumber, threshold: usize) -> Self {
        Self {
            number,
            status: RoundStatus::Pending,
            evidence: EvidenceSnapshot::default(),
            votes: Vec::new(),
            threshold,
            result: Verdict::Inconclusive,
            confidence: 0.0,
            agreement: 0.0,
            participation: 0.0,
            started_at: None,
            deadline: None,
            completed_at: None,
        }
    }

    pub fn has_voted(&self, voter_id: &str) -> bool {
        self.votes.iter().any(|v| v.voter_id == voter_id)
    }
}

/// Decided (or failed) detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub consensus_id: String,
    pub target_agent_id: String,
    /// Three rounds, or two when the last one was skipped
    pub rounds: Vec<ConsensusRound>,
    pub final_decision: FinalDecision,
    /// Mean confidence of the agreeing rounds
    pub confidence: f64,
    pub consensus_hash: String,
    pub threshold_signature: Option<ThresholdSignature>,
    /// Everyone who cast a counted vote in any round
    pub participants: Vec<String>,
    pub failure_reason: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Reveal of a round 1 commitment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteReveal {
    pub voter_id: String,
    pub decision: Verdict,
    pub confidence: f64,
    pub salt: String,
}

/// Stake and standing of a voter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoterProfile {
    pub reputation: f64,
    pub stake: f64,
}

impl VoterProfile {
    pub fn weight(&self) -> f64 {
        self.reputation * 0.7 + (self.stake / 10_000.0).min(0.3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_weight_formula() {
        let p = VoterProfile { reputation: 1.0, stake: 50_000.0 };
        assert!((p.weight() - 1.0).abs() < 1e-12);
        let p = VoterProfile { reputation: 0.5, stake: 1_000.0 };
        assert!((p.weight() - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_round_numbers_stop_at_three() {
        assert_eq!(RoundNumber::One.next(), Some(RoundNumber::Two));
        assert_eq!(RoundNumber::Three.next(), None);
        assert_eq!(RoundNumber::Three.index(), 2);
    }

    #[test]
    fn test_evidence_pool_averages_across_items() {
        let now = Utc::now();
        let pool = vec![
            ConsensusEvidence::new("a", 1.0, 1.0, now).with_protocol_violation("double-sign"),
            ConsensusEvidence::new("a", 0.2, 0.4, now).with_protocol_violation("replay"),
            ConsensusEvidence::new("b", 0.6, 0.4, now).with_behavioral_deviation("erratic path"),
        ];
        let snap = EvidenceSnapshot::aggregate(&pool);
        assert_eq!(snap.evidence_count, 3);
        assert_eq!(snap.protocol_violations, vec!["double-sign", "replay"]);
        assert!((snap.average_weight - 0.6).abs() < 1e-12);
        assert!((snap.average_reliability - 0.6).abs() < 1e-12);
    }
}
