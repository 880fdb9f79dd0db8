//! Three-round consensus on malicious-agent accusations
//!
//! Round 1 collects evidence and a first vote, round 2 revotes after the
//! pooled evidence has been reviewed, round 3 breaks ties. When the first two
//! rounds agree strongly, round 3 is skipped. A detection is decided only if
//! at least two rounds agree and their mean confidence clears the bar; any
//! round that times out below the participation floor fails the whole
//! detection.

use super::tally::{tally, EPSILON};
use super::types::*;
use crate::clock::SharedClock;
use crate::crypto::{sha256_hex, ThresholdKeySet};
use crate::error::{SwarmError, SwarmResult};
use crate::events::{EventBus, SwarmEvent};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Detection tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub malicious_threshold: f64,
    pub benign_threshold: f64,
    /// Fraction of eligible voters a round needs by its deadline
    pub min_participation: f64,
    pub round_timeout_secs: u64,
    /// Mean confidence the agreeing rounds need
    pub confidence_threshold: f64,
    pub require_super_majority: bool,
    /// Must stay below 1/3
    pub max_byzantine_ratio: f64,
    pub use_commit_reveal: bool,
    pub use_threshold_signatures: bool,
    pub early_completion_confidence: f64,
    pub early_completion_agreement: f64,
    pub skip_confidence: f64,
    pub skip_participation: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            malicious_threshold: 0.67,
            benign_threshold: 0.67,
            min_participation: 0.67,
            round_timeout_secs: 300,
            confidence_threshold: 0.75,
            require_super_majority: true,
            max_byzantine_ratio: 0.33,
            use_commit_reveal: false,
            use_threshold_signatures: true,
            early_completion_confidence: 0.9,
            early_completion_agreement: 0.8,
            skip_confidence: 0.8,
            skip_participation: 0.8,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> SwarmResult<()> {
        if !(0.0..1.0 / 3.0).contains(&self.max_byzantine_ratio) {
            return Err(SwarmError::InvalidConfig(format!(
                "max_byzantine_ratio {} must be below 1/3",
                self.max_byzantine_ratio
            )));
        }
        let unit = [
            ("malicious_threshold", self.malicious_threshold),
            ("benign_threshold", self.benign_threshold),
            ("min_participation", self.min_participation),
            ("confidence_threshold", self.confidence_threshold),
            ("early_completion_confidence", self.early_completion_confidence),
            ("early_completion_agreement", self.early_completion_agreement),
            ("skip_confidence", self.skip_confidence),
            ("skip_participation", self.skip_participation),
        ];
        for (name, value) in unit {
            if !(value > 0.0 && value <= 1.0) {
                return Err(SwarmError::InvalidConfig(format!("{} {} outside (0, 1]", name, value)));
            }
        }
        if self.round_timeout_secs == 0 {
            return Err(SwarmError::InvalidConfig("round_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    /// Smallest voter pool that keeps the Byzantine bound: `ceil(3 / (1 - ratio))`
    pub fn min_voter_pool(&self) -> usize {
        (3.0 / (1.0 - self.max_byzantine_ratio)).ceil() as usize
    }
}

/// Commitment hash of a round 1 vote
pub fn commitment_hash(consensus_id: &str, voter_id: &str, decision: Verdict, confidence: f64, salt: &str) -> String {
    sha256_hex(&[format!(
        "{}:{}:{}:{:.6}:{}",
        consensus_id,
        voter_id,
        decision.as_str(),
        confidence,
        salt
    )
    .as_bytes()])
}

struct Commitment {
    hash: String,
    weight: f64,
    timestamp: DateTime<Utc>,
}

struct ActiveDetection {
    consensus_id: String,
    target_agent_id: String,
    eligible: BTreeSet<String>,
    rounds: [ConsensusRound; 3],
    current: RoundNumber,
    evidence: Vec<ConsensusEvidence>,
    commitments: BTreeMap<String, Commitment>,
    keys: Option<ThresholdKeySet>,
}

impl ActiveDetection {
    fn round(&self) -> &ConsensusRound {
        &self.rounds[self.current.index()]
    }

    fn round_mut(&mut self) -> &mut ConsensusRound {
        &mut self.rounds[self.current.index()]
    }

    fn participation(&self, voters: usize) -> f64 {
        if self.eligible.is_empty() {
            0.0
        } else {
            voters as f64 / self.eligible.len() as f64
        }
    }
}

/// What happened to a round when it was closed
enum RoundClose {
    Completed,
    Failed,
}

pub struct ConsensusDetectionCoordinator {
    config: DetectionConfig,
    clock: SharedClock,
    events: EventBus,
    voters: BTreeMap<String, VoterProfile>,
    active: HashMap<String, ActiveDetection>,
    results: HashMap<String, ConsensusResult>,
}

impl ConsensusDetectionCoordinator {
    pub fn new(config: DetectionConfig, clock: SharedClock, events: EventBus) -> SwarmResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            events,
            voters: BTreeMap::new(),
            active: HashMap::new(),
            results: HashMap::new(),
        })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn register_voter(&mut self, voter_id: impl Into<String>, reputation: f64, stake: f64) {
        self.voters.insert(
            voter_id.into(),
            VoterProfile {
                reputation: reputation.clamp(0.0, 1.0),
                stake: stake.max(0.0),
            },
        );
    }

    pub fn remove_voter(&mut self, voter_id: &str) -> Option<VoterProfile> {
        self.voters.remove(voter_id)
    }

    pub fn voter(&self, voter_id: &str) -> Option<&VoterProfile> {
        self.voters.get(voter_id)
    }

    pub fn result(&self, consensus_id: &str) -> Option<&ConsensusResult> {
        self.results.get(consensus_id)
    }

    pub fn is_active(&self, consensus_id: &str) -> bool {
        self.active.contains_key(consensus_id)
    }

    /// Current round of an active detection and its status
    pub fn current_round(&self, consensus_id: &str) -> Option<(RoundNumber, RoundStatus)> {
        self.active
            .get(consensus_id)
            .map(|d| (d.current, d.round().status))
    }

    /// Open a detection against `target_agent_id`; every registered voter but the target is eligible
    pub fn initiate_detection(
        &mut self,
        target_agent_id: &str,
        initial_evidence: Vec<ConsensusEvidence>,
    ) -> SwarmResult<String> {
        let eligible: BTreeSet<String> = self
            .voters
            .keys()
            .filter(|id| id.as_str() != target_agent_id)
            .cloned()
            .collect();
        let required = self.config.min_voter_pool();
        if eligible.len() < required {
            return Err(SwarmError::InsufficientVoters {
                available: eligible.len(),
                required,
            });
        }

        let now = self.clock.now();
        let consensus_id = uuid::Uuid::new_v4().to_string();
        let threshold = (eligible.len() as f64 * self.config.malicious_threshold).ceil() as usize;
        let rounds = RoundNumber::ALL.map(|n| ConsensusRound::new(n, threshold));

        let keys = if self.config.use_threshold_signatures {
            let participants: Vec<String> = eligible.iter().cloned().collect();
            match ThresholdKeySet::deal(&participants, threshold.max(1)) {
                Ok(keys) => Some(keys),
                Err(e) => {
                    warn!("Threshold key dealing failed for {}: {}", consensus_id, e);
                    None
                }
            }
        } else {
            None
        };

        let mut detection = ActiveDetection {
            consensus_id: consensus_id.clone(),
            target_agent_id: target_agent_id.to_string(),
            eligible,
            rounds,
            current: RoundNumber::One,
            evidence: Vec::new(),
            commitments: BTreeMap::new(),
            keys,
        };
        self.open_round(&mut detection, RoundNumber::One, now);

        info!(
            "Detection {} against {} opened with {} eligible voters",
            consensus_id,
            target_agent_id,
            detection.eligible.len()
        );
        self.events.emit(SwarmEvent::DetectionInitiated {
            consensus_id: consensus_id.clone(),
            target_agent_id: target_agent_id.to_string(),
            eligible_voters: detection.eligible.len(),
        });
        self.active.insert(consensus_id.clone(), detection);

        for evidence in initial_evidence {
            self.submit_evidence(&consensus_id, evidence)?;
        }
        Ok(consensus_id)
    }

    fn open_round(&self, detection: &mut ActiveDetection, number: RoundNumber, now: DateTime<Utc>) {
        detection.current = number;
        let snapshot = EvidenceSnapshot::aggregate(&detection.evidence);
        let round = detection.round_mut();
        round.status = RoundStatus::Collecting;
        round.evidence = snapshot;
        round.started_at = Some(now);
        round.deadline = Some(now + Duration::seconds(self.config.round_timeout_secs as i64));
        debug!(
            "Detection {} round {} ({}) open",
            detection.consensus_id,
            number.as_u8(),
            number.stage()
        );
    }

    /// Add evidence to the pool; out-of-range items are reported unverified and dropped
    pub fn submit_evidence(&mut self, consensus_id: &str, evidence: ConsensusEvidence) -> SwarmResult<bool> {
        let detection = self
            .active
            .get_mut(consensus_id)
            .ok_or_else(|| SwarmError::UnknownConsensus(consensus_id.to_string()))?;
        let verified = evidence.in_range();
        let evidence_id = evidence.id.clone();
        if verified {
            detection.evidence.push(evidence);
            let snapshot = EvidenceSnapshot::aggregate(&detection.evidence);
            detection.round_mut().evidence = snapshot;
        } else {
            warn!(
                "Evidence {} for {} rejected: weight/reliability outside [0, 1]",
                evidence_id, consensus_id
            );
        }
        self.events.emit(SwarmEvent::EvidenceSubmitted {
            consensus_id: consensus_id.to_string(),
            evidence_id,
            verified,
        });
        Ok(verified)
    }

    fn check_voter(&self, detection: &ActiveDetection, voter_id: &str) -> SwarmResult<f64> {
        if !detection.eligible.contains(voter_id) {
            return Err(SwarmError::NotPermitted(format!(
                "{} is not an eligible voter for {}",
                voter_id, detection.consensus_id
            )));
        }
        let round = detection.round();
        if round.status != RoundStatus::Collecting {
            return Err(SwarmError::NotActive(format!(
                "round {} of {} is not collecting votes",
                round.number.as_u8(),
                detection.consensus_id
            )));
        }
        if round.has_voted(voter_id) || (round.number == RoundNumber::One && detection.commitments.contains_key(voter_id)) {
            return Err(SwarmError::DuplicateVote {
                voter: voter_id.to_string(),
                scope: format!("{} round {}", detection.consensus_id, round.number.as_u8()),
            });
        }
        if let Some(deadline) = round.deadline {
            if self.clock.now() > deadline {
                return Err(SwarmError::DeadlinePassed(detection.consensus_id.clone()));
            }
        }
        Ok(self.voters.get(voter_id).map(|p| p.weight()).unwrap_or(0.0))
    }

    /// Cast an open vote in the current round
    pub fn submit_vote(
        &mut self,
        consensus_id: &str,
        voter_id: &str,
        decision: Verdict,
        confidence: f64,
    ) -> SwarmResult<()> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(SwarmError::InvalidVote(format!("confidence {} outside [0, 1]", confidence)));
        }
        let now = self.clock.now();
        let detection = self
            .active
            .get(consensus_id)
            .ok_or_else(|| SwarmError::UnknownConsensus(consensus_id.to_string()))?;
        let weight = self.check_voter(detection, voter_id)?;
        if self.config.use_commit_reveal && detection.current == RoundNumber::One {
            return Err(SwarmError::InvalidVote(
                "round 1 votes must be submitted as commitments".into(),
            ));
        }

        let mut detection = self
            .active
            .remove(consensus_id)
            .ok_or_else(|| SwarmError::UnknownConsensus(consensus_id.to_string()))?;
        let round = detection.current;
        detection.round_mut().votes.push(ConsensusVoteRecord {
            voter_id: voter_id.to_string(),
            round,
            decision,
            confidence,
            weight,
            commit_hash: None,
            timestamp: now,
        });
        self.events.emit(SwarmEvent::DetectionVoteSubmitted {
            consensus_id: consensus_id.to_string(),
            voter_id: voter_id.to_string(),
            round: round.as_u8(),
        });

        self.try_early_completion(detection, now);
        Ok(())
    }

    /// Cast a hidden round 1 vote; the decision is revealed when round 2 opens
    pub fn commit_vote(&mut self, consensus_id: &str, voter_id: &str, commit_hash: &str) -> SwarmResult<()> {
        let now = self.clock.now();
        let detection = self
            .active
            .get(consensus_id)
            .ok_or_else(|| SwarmError::UnknownConsensus(consensus_id.to_string()))?;
        if !self.config.use_commit_reveal || detection.current != RoundNumber::One {
            return Err(SwarmError::InvalidVote("commitments are only taken in round 1 under commit-reveal".into()));
        }
        if commit_hash.is_empty() {
            return Err(SwarmError::InvalidVote("empty commit hash".into()));
        }
        let weight = self.check_voter(detection, voter_id)?;

        if let Some(detection) = self.active.get_mut(consensus_id) {
            detection.commitments.insert(
                voter_id.to_string(),
                Commitment {
                    hash: commit_hash.to_string(),
                    weight,
                    timestamp: now,
                },
            );
            let everyone_committed = detection.commitments.len() == detection.eligible.len();
            if everyone_committed {
                detection.round_mut().status = RoundStatus::Revealing;
                detection.round_mut().deadline = Some(now + Duration::seconds(self.config.round_timeout_secs as i64));
            }
        }
        self.events.emit(SwarmEvent::DetectionVoteSubmitted {
            consensus_id: consensus_id.to_string(),
            voter_id: voter_id.to_string(),
            round: RoundNumber::One.as_u8(),
        });
        Ok(())
    }

    /// Open the round 1 commitments; evaluates round 1 and opens round 2.
    ///
    /// Reveals that do not match their commitment are discarded. Returns the
    /// number of votes that were revealed.
    pub fn reveal_round1_votes(&mut self, consensus_id: &str, reveals: Vec<VoteReveal>) -> SwarmResult<usize> {
        let mut detection = self
            .active
            .remove(consensus_id)
            .ok_or_else(|| SwarmError::UnknownConsensus(consensus_id.to_string()))?;
        let round_status = detection.round().status;
        if detection.current != RoundNumber::One
            || !matches!(round_status, RoundStatus::Collecting | RoundStatus::Revealing)
            || !self.config.use_commit_reveal
        {
            self.active.insert(consensus_id.to_string(), detection);
            return Err(SwarmError::NotActive(format!("{} has no round 1 commitments to reveal", consensus_id)));
        }

        let mut revealed = 0;
        for reveal in reveals {
            let Some(commitment) = detection.commitments.get(&reveal.voter_id) else {
                warn!("Reveal from {} without a commitment in {}", reveal.voter_id, consensus_id);
                continue;
            };
            let expected = commitment_hash(consensus_id, &reveal.voter_id, reveal.decision, reveal.confidence, &reveal.salt);
            if expected != commitment.hash || !(0.0..=1.0).contains(&reveal.confidence) {
                warn!("Reveal from {} does not match its commitment", reveal.voter_id);
                continue;
            }
            if detection.round().has_voted(&reveal.voter_id) {
                continue;
            }
            let vote = ConsensusVoteRecord {
                voter_id: reveal.voter_id.clone(),
                round: RoundNumber::One,
                decision: reveal.decision,
                confidence: reveal.confidence,
                weight: commitment.weight,
                commit_hash: Some(commitment.hash.clone()),
                timestamp: commitment.timestamp,
            };
            detection.round_mut().votes.push(vote);
            revealed += 1;
        }

        info!("Detection {} revealed {} round 1 votes", consensus_id, revealed);
        self.events.emit(SwarmEvent::Round1VotesRevealed {
            consensus_id: consensus_id.to_string(),
            revealed,
        });
        let now = self.clock.now();
        self.close_round(detection, now);
        Ok(revealed)
    }

    /// Close the current round ahead of its deadline when the outcome is already clear
    fn try_early_completion(&mut self, detection: ActiveDetection, now: DateTime<Utc>) {
        let round = detection.round();
        let participation = detection.participation(round.votes.len());
        let t = tally(&round.votes, self.config.malicious_threshold, self.config.benign_threshold);
        let early = participation + EPSILON >= self.config.min_participation
            && t.verdict != Verdict::Inconclusive
            && t.confidence + EPSILON >= self.config.early_completion_confidence
            && t.agreement + EPSILON >= self.config.early_completion_agreement;
        if early {
            debug!(
                "Detection {} round {} completes early",
                detection.consensus_id,
                detection.current.as_u8()
            );
            self.close_round(detection, now);
        } else {
            self.active.insert(detection.consensus_id.clone(), detection);
        }
    }

    /// Evaluate the current round and move on: next round, skip, finalize or fail
    fn close_round(&mut self, mut detection: ActiveDetection, now: DateTime<Utc>) {
        let consensus_id = detection.consensus_id.clone();
        let number = detection.current;
        let participation = detection.participation(detection.round().votes.len());
        let t = tally(
            &detection.round().votes,
            self.config.malicious_threshold,
            self.config.benign_threshold,
        );

        let close = if participation + EPSILON < self.config.min_participation {
            RoundClose::Failed
        } else {
            RoundClose::Completed
        };
        {
            let round = detection.round_mut();
            round.participation = participation;
            round.completed_at = Some(now);
            match close {
                RoundClose::Failed => {
                    round.status = RoundStatus::Failed;
                    round.result = Verdict::Inconclusive;
                    round.confidence = 0.0;
                    round.agreement = 0.0;
                }
                RoundClose::Completed => {
                    round.status = RoundStatus::Completed;
                    round.result = t.verdict;
                    round.confidence = t.confidence;
                    round.agreement = t.agreement;
                }
            }
        }

        match close {
            RoundClose::Failed => {
                warn!(
                    "Detection {} round {} failed: participation {:.2} below {:.2}",
                    consensus_id,
                    number.as_u8(),
                    participation,
                    self.config.min_participation
                );
                self.events.emit(SwarmEvent::RoundFailed {
                    consensus_id: consensus_id.clone(),
                    round: number.as_u8(),
                    participation,
                });
                let reason = format!("insufficient participation in round {}", number.as_u8());
                self.finalize(detection, Some(reason), now);
            }
            RoundClose::Completed => {
                info!(
                    "Detection {} round {}: {} (confidence {:.2}, participation {:.2})",
                    consensus_id,
                    number.as_u8(),
                    t.verdict.as_str(),
                    t.confidence,
                    participation
                );
                self.events.emit(SwarmEvent::RoundCompleted {
                    consensus_id: consensus_id.clone(),
                    round: number.as_u8(),
                    result: t.verdict.as_str().to_string(),
                    confidence: t.confidence,
                    participation,
                });
                self.advance(detection, now);
            }
        }
    }

    fn advance(&mut self, mut detection: ActiveDetection, now: DateTime<Utc>) {
        match detection.current {
            RoundNumber::One => {
                self.open_round(&mut detection, RoundNumber::Two, now);
                self.active.insert(detection.consensus_id.clone(), detection);
            }
            RoundNumber::Two if self.should_skip_final_round(&detection) => {
                let consensus_id = detection.consensus_id.clone();
                detection.rounds[RoundNumber::Three.index()].status = RoundStatus::Skipped;
                info!("Detection {} skips round 3: rounds 1 and 2 agree", consensus_id);
                self.events.emit(SwarmEvent::RoundSkipped {
                    consensus_id,
                    round: RoundNumber::Three.as_u8(),
                });
                self.finalize(detection, None, now);
            }
            RoundNumber::Two => {
                self.open_round(&mut detection, RoundNumber::Three, now);
                self.active.insert(detection.consensus_id.clone(), detection);
            }
            RoundNumber::Three => self.finalize(detection, None, now),
        }
    }

    fn should_skip_final_round(&self, detection: &ActiveDetection) -> bool {
        let [one, two, _] = &detection.rounds;
        let strong = |r: &ConsensusRound| {
            r.status == RoundStatus::Completed
                && r.confidence + EPSILON >= self.config.skip_confidence
                && r.participation + EPSILON >= self.config.skip_participation
        };
        one.result != Verdict::Inconclusive && one.result == two.result && strong(one) && strong(two)
    }

    /// Super-majority over completed rounds: at least two agree and their mean confidence is high enough
    fn decide(&self, rounds: &[ConsensusRound]) -> (FinalDecision, f64) {
        let decided: Vec<&ConsensusRound> = rounds
            .iter()
            .filter(|r| r.status == RoundStatus::Completed && r.result != Verdict::Inconclusive)
            .collect();

        let agreeing = |verdict: Verdict| {
            let confidences: Vec<f64> = decided
                .iter()
                .filter(|r| r.result == verdict)
                .map(|r| r.confidence)
                .collect();
            let mean = if confidences.is_empty() {
                0.0
            } else {
                confidences.iter().sum::<f64>() / confidences.len() as f64
            };
            (confidences.len(), mean)
        };
        let (malicious, benign) = (agreeing(Verdict::Malicious), agreeing(Verdict::Benign));
        let (verdict, (count, mean)) = match malicious.0.cmp(&benign.0) {
            std::cmp::Ordering::Greater => (Verdict::Malicious, malicious),
            std::cmp::Ordering::Less => (Verdict::Benign, benign),
            std::cmp::Ordering::Equal => return (FinalDecision::Failed, 0.0),
        };

        let enough_rounds = if self.config.require_super_majority { count >= 2 } else { count >= 1 };
        if !enough_rounds || mean + EPSILON < self.config.confidence_threshold {
            return (FinalDecision::Failed, mean);
        }
        if verdict == Verdict::Malicious {
            (FinalDecision::Malicious, mean)
        } else {
            (FinalDecision::Benign, mean)
        }
    }

    fn finalize(&mut self, detection: ActiveDetection, failure: Option<String>, now: DateTime<Utc>) {
        let ActiveDetection {
            consensus_id,
            target_agent_id,
            rounds,
            keys,
            ..
        } = detection;

        let (final_decision, confidence) = match &failure {
            Some(_) => (FinalDecision::Failed, 0.0),
            None => self.decide(&rounds),
        };
        let failure_reason = match (&failure, final_decision) {
            (Some(reason), _) => Some(reason.clone()),
            (None, FinalDecision::Failed) => Some("no super-majority of rounds".to_string()),
            _ => None,
        };

        let rounds: Vec<ConsensusRound> = rounds
            .into_iter()
            .filter(|r| r.status != RoundStatus::Skipped)
            .map(|mut r| {
                if matches!(r.status, RoundStatus::Pending | RoundStatus::Collecting | RoundStatus::Revealing) {
                    r.status = RoundStatus::Cancelled;
                }
                r
            })
            .collect();

        let participants: Vec<String> = rounds
            .iter()
            .flat_map(|r| r.votes.iter().map(|v| v.voter_id.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let summaries: Vec<String> = rounds
            .iter()
            .map(|r| {
                format!(
                    "{}:{}:{:.4}:{:.4}:{}",
                    r.number.as_u8(),
                    r.result.as_str(),
                    r.confidence,
                    r.participation,
                    r.votes.len()
                )
            })
            .collect();
        let consensus_hash = sha256_hex(&[
            consensus_id.as_bytes(),
            target_agent_id.as_bytes(),
            final_decision.as_str().as_bytes(),
            summaries.join("|").as_bytes(),
        ]);

        let threshold_signature = match (&keys, final_decision) {
            (Some(keys), FinalDecision::Malicious | FinalDecision::Benign) => {
                match keys.sign(&participants, consensus_hash.as_bytes()) {
                    Ok(sig) => Some(sig),
                    Err(e) => {
                        warn!("Threshold signature for {} failed: {}", consensus_id, e);
                        None
                    }
                }
            }
            _ => None,
        };

        if let Some(verdict) = final_decision.verdict() {
            self.apply_reputation_feedback(&rounds, verdict);
        }

        match final_decision {
            FinalDecision::Failed => {
                let reason = failure_reason.clone().unwrap_or_default();
                warn!("Detection {} against {} failed: {}", consensus_id, target_agent_id, reason);
                self.events.emit(SwarmEvent::DetectionConsensusFailed {
                    consensus_id: consensus_id.clone(),
                    target_agent_id: target_agent_id.clone(),
                    reason,
                });
            }
            decision => {
                info!(
                    "Detection {} decided {} is {} (confidence {:.2})",
                    consensus_id,
                    target_agent_id,
                    decision.as_str(),
                    confidence
                );
                self.events.emit(SwarmEvent::DetectionConsensusReached {
                    consensus_id: consensus_id.clone(),
                    target_agent_id: target_agent_id.clone(),
                    decision: decision.as_str().to_string(),
                    consensus_hash: consensus_hash.clone(),
                });
            }
        }

        self.results.insert(
            consensus_id.clone(),
            ConsensusResult {
                consensus_id,
                target_agent_id,
                rounds,
                final_decision,
                confidence,
                consensus_hash,
                threshold_signature,
                participants,
                failure_reason,
                completed_at: now,
            },
        );
    }

    /// Voters whose last vote matched the outcome gain standing; the rest lose some
    fn apply_reputation_feedback(&mut self, rounds: &[ConsensusRound], outcome: Verdict) {
        let mut last_vote: BTreeMap<&str, Verdict> = BTreeMap::new();
        for vote in rounds.iter().flat_map(|r| r.votes.iter()) {
            last_vote.insert(&vote.voter_id, vote.decision);
        }
        for (voter_id, decision) in last_vote {
            if let Some(profile) = self.voters.get_mut(voter_id) {
                let delta = if decision == outcome { 0.01 } else { -0.02 };
                profile.reputation = (profile.reputation + delta).clamp(0.0, 1.0);
            }
        }
    }

    /// Close every round past its deadline; returns how many were closed
    pub fn check_timeouts(&mut self) -> usize {
        let now = self.clock.now();
        let due: Vec<String> = self
            .active
            .values()
            .filter(|d| d.round().deadline.map(|dl| now >= dl).unwrap_or(false))
            .map(|d| d.consensus_id.clone())
            .collect();

        for consensus_id in &due {
            let Some(mut detection) = self.active.remove(consensus_id) else {
                continue;
            };
            let commit_phase = self.config.use_commit_reveal && detection.current == RoundNumber::One;
            let status = detection.round().status;
            match status {
                RoundStatus::Collecting if commit_phase => {
                    debug!("Detection {} round 1 commitments closed", consensus_id);
                    let round = detection.round_mut();
                    round.status = RoundStatus::Revealing;
                    round.deadline = Some(now + Duration::seconds(self.config.round_timeout_secs as i64));
                    self.active.insert(consensus_id.clone(), detection);
                }
                RoundStatus::Revealing => {
                    // Commitments nobody revealed do not count
                    self.events.emit(SwarmEvent::Round1VotesRevealed {
                        consensus_id: consensus_id.clone(),
                        revealed: detection.round().votes.len(),
                    });
                    self.close_round(detection, now);
                }
                _ => self.close_round(detection, now),
            }
        }
        due.len()
    }

    /// Fail every active detection
    pub fn emergency_stop(&mut self) {
        let now = self.clock.now();
        let ids: Vec<String> = self.active.keys().cloned().collect();
        for id in ids {
            if let Some(detection) = self.active.remove(&id) {
                self.finalize(detection, Some("cancelled".into()), now);
            }
        }
        warn!("Detection coordinator emergency stop");
        self.events.emit(SwarmEvent::EmergencyStop {
            component: "detection-coordinator".into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::crypto::verify_threshold_signature;
    use crate::events::drain;

    fn coordinator(config: DetectionConfig, voters: usize) -> (ConsensusDetectionCoordinator, std::sync::Arc<ManualClock>) {
        let clock = ManualClock::fixed();
        let mut c = ConsensusDetectionCoordinator::new(config, clock.clone(), EventBus::new()).unwrap();
        for i in 0..voters {
            c.register_voter(format!("voter-{}", i), 0.5, 0.0);
        }
        c.register_voter("suspect", 0.5, 0.0);
        (c, clock)
    }

    fn vote_all(c: &mut ConsensusDetectionCoordinator, id: &str, voters: std::ops::Range<usize>, verdict: Verdict, confidence: f64) {
        for i in voters {
            c.submit_vote(id, &format!("voter-{}", i), verdict, confidence).unwrap();
        }
    }

    #[test]
    fn test_rejects_unsafe_byzantine_ratio() {
        let clock = ManualClock::fixed();
        let config = DetectionConfig {
            max_byzantine_ratio: 0.34,
            ..Default::default()
        };
        assert!(matches!(
            ConsensusDetectionCoordinator::new(config, clock, EventBus::new()),
            Err(SwarmError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_minimum_voter_pool() {
        assert_eq!(DetectionConfig::default().min_voter_pool(), 5);
        let (mut c, _) = coordinator(DetectionConfig::default(), 4);
        assert!(matches!(
            c.initiate_detection("suspect", vec![]),
            Err(SwarmError::InsufficientVoters { available: 4, required: 5 })
        ));
    }

    #[test]
    fn test_scenario_b_two_strong_rounds_skip_third() {
        let (mut c, _) = coordinator(DetectionConfig::default(), 6);
        let mut rx = c.events.subscribe();
        let id = c.initiate_detection("suspect", vec![]).unwrap();

        vote_all(&mut c, &id, 0..4, Verdict::Malicious, 0.9);
        assert_eq!(c.current_round(&id), Some((RoundNumber::One, RoundStatus::Collecting)));
        c.submit_vote(&id, "voter-4", Verdict::Malicious, 0.9).unwrap();
        assert_eq!(c.current_round(&id), Some((RoundNumber::Two, RoundStatus::Collecting)));

        vote_all(&mut c, &id, 0..5, Verdict::Malicious, 0.9);
        assert!(!c.is_active(&id));

        let result = c.result(&id).unwrap();
        assert_eq!(result.final_decision, FinalDecision::Malicious);
        assert_eq!(result.rounds.len(), 2);
        assert!((result.confidence - 0.9).abs() < 1e-9);
        assert_eq!(result.participants.len(), 5);

        let sig = result.threshold_signature.as_ref().expect("5 signers meet the 5-of-6 threshold");
        assert_eq!(sig.threshold, 5);
        assert!(verify_threshold_signature(sig, result.consensus_hash.as_bytes()));

        let names: Vec<_> = drain(&mut rx).iter().map(|e| e.name()).collect();
        assert!(names.contains(&"round-skipped"));
        assert!(names.contains(&"detection-consensus-reached"));
        assert_eq!(names.iter().filter(|n| **n == "round-completed").count(), 2);

        // Matching voters gain, the silent voter is untouched
        assert!((c.voter("voter-0").unwrap().reputation - 0.51).abs() < 1e-9);
        assert!((c.voter("voter-5").unwrap().reputation - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_low_participation_fails_detection() {
        let (mut c, clock) = coordinator(DetectionConfig::default(), 6);
        let mut rx = c.events.subscribe();
        let id = c.initiate_detection("suspect", vec![]).unwrap();
        vote_all(&mut c, &id, 0..3, Verdict::Malicious, 1.0);

        clock.advance(Duration::seconds(301));
        assert_eq!(c.check_timeouts(), 1);

        let result = c.result(&id).unwrap();
        assert_eq!(result.final_decision, FinalDecision::Failed);
        assert_eq!(result.rounds.len(), 3);
        assert_eq!(result.rounds[0].status, RoundStatus::Failed);
        assert_eq!(result.rounds[0].result, Verdict::Inconclusive);
        assert!(result.threshold_signature.is_none());
        let names: Vec<_> = drain(&mut rx).iter().map(|e| e.name()).collect();
        assert!(names.contains(&"round-failed"));
        assert!(names.contains(&"detection-consensus-failed"));
    }

    #[test]
    fn test_disagreeing_rounds_go_to_third_round() {
        let (mut c, clock) = coordinator(DetectionConfig::default(), 6);
        let id = c.initiate_detection("suspect", vec![]).unwrap();

        // Below the early-completion confidence, so each round runs to its deadline
        vote_all(&mut c, &id, 0..6, Verdict::Malicious, 0.85);
        clock.advance(Duration::seconds(301));
        c.check_timeouts();
        assert_eq!(c.current_round(&id), Some((RoundNumber::Two, RoundStatus::Collecting)));

        vote_all(&mut c, &id, 0..6, Verdict::Inconclusive, 0.5);
        clock.advance(Duration::seconds(301));
        c.check_timeouts();
        assert_eq!(c.current_round(&id), Some((RoundNumber::Three, RoundStatus::Collecting)));

        vote_all(&mut c, &id, 0..6, Verdict::Malicious, 0.85);
        clock.advance(Duration::seconds(301));
        c.check_timeouts();

        let result = c.result(&id).unwrap();
        assert_eq!(result.rounds.len(), 3);
        assert_eq!(result.rounds[1].result, Verdict::Inconclusive);
        assert_eq!(result.final_decision, FinalDecision::Malicious);
        assert!((result.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_low_confidence_majority_cannot_convict() {
        let config = DetectionConfig {
            malicious_threshold: 0.5,
            ..Default::default()
        };
        let (mut c, clock) = coordinator(config, 6);
        let id = c.initiate_detection("suspect", vec![]).unwrap();
        for _ in 0..3 {
            vote_all(&mut c, &id, 0..6, Verdict::Malicious, 0.6);
            clock.advance(Duration::seconds(301));
            c.check_timeouts();
        }
        let result = c.result(&id).unwrap();
        assert_eq!(result.rounds.len(), 3);
        assert!(result.rounds.iter().all(|r| r.result == Verdict::Malicious));
        assert_eq!(result.final_decision, FinalDecision::Failed);
    }

    #[test]
    fn test_commit_reveal_round_one() {
        let config = DetectionConfig {
            use_commit_reveal: true,
            ..Default::default()
        };
        let (mut c, _) = coordinator(config, 5);
        let id = c.initiate_detection("suspect", vec![]).unwrap();

        assert!(matches!(
            c.submit_vote(&id, "voter-0", Verdict::Malicious, 0.9),
            Err(SwarmError::InvalidVote(_))
        ));

        let reveals: Vec<VoteReveal> = (0..5)
            .map(|i| VoteReveal {
                voter_id: format!("voter-{}", i),
                decision: Verdict::Malicious,
                confidence: 0.9,
                salt: format!("salt-{}", i),
            })
            .collect();
        for r in &reveals {
            let hash = commitment_hash(&id, &r.voter_id, r.decision, r.confidence, &r.salt);
            c.commit_vote(&id, &r.voter_id, &hash).unwrap();
        }
        assert_eq!(c.current_round(&id), Some((RoundNumber::One, RoundStatus::Revealing)));

        let mut tampered = reveals.clone();
        tampered[4].decision = Verdict::Benign;
        assert_eq!(c.reveal_round1_votes(&id, tampered).unwrap(), 4);
        assert_eq!(c.current_round(&id), Some((RoundNumber::Two, RoundStatus::Collecting)));
    }

    #[test]
    fn test_evidence_range_checked() {
        let (mut c, clock) = coordinator(DetectionConfig::default(), 5);
        let id = c.initiate_detection("suspect", vec![]).unwrap();
        let good = ConsensusEvidence::new("voter-0", 0.8, 0.9, clock.now()).with_protocol_violation("equivocation");
        let bad = ConsensusEvidence::new("voter-1", 1.5, 0.9, clock.now());
        assert!(c.submit_evidence(&id, good).unwrap());
        assert!(!c.submit_evidence(&id, bad).unwrap());
        assert!(matches!(
            c.submit_evidence("missing", ConsensusEvidence::new("x", 0.1, 0.1, clock.now())),
            Err(SwarmError::UnknownConsensus(_))
        ));
    }

    #[test]
    fn test_vote_contract_errors() {
        let (mut c, _) = coordinator(DetectionConfig::default(), 6);
        let id = c.initiate_detection("suspect", vec![]).unwrap();
        c.submit_vote(&id, "voter-0", Verdict::Malicious, 0.9).unwrap();
        assert!(matches!(
            c.submit_vote(&id, "voter-0", Verdict::Benign, 0.9),
            Err(SwarmError::DuplicateVote { .. })
        ));
        assert!(matches!(
            c.submit_vote(&id, "suspect", Verdict::Benign, 1.0),
            Err(SwarmError::NotPermitted(_))
        ));
        assert!(matches!(
            c.submit_vote(&id, "voter-1", Verdict::Benign, 1.5),
            Err(SwarmError::InvalidVote(_))
        ));
    }

    #[test]
    fn test_emergency_stop_fails_active() {
        let (mut c, _) = coordinator(DetectionConfig::default(), 6);
        let id = c.initiate_detection("suspect", vec![]).unwrap();
        c.emergency_stop();
        assert!(!c.is_active(&id));
        let result = c.result(&id).unwrap();
        assert_eq!(result.final_decision, FinalDecision::Failed);
        assert_eq!(result.failure_reason.as_deref(), Some("cancelled"));
        assert_eq!(result.rounds.len(), 3);
    }
}
