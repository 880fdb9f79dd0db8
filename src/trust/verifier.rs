//! Distributed trust ledger
//!
//! Agents assert directed trust in each other. An assertion counts only after
//! enough witnesses confirmed it; trust then decays with age. Agents with no
//! direct verified assertion between them are connected through the best
//! path over verified assertions.

use super::dispute::{DisputeArbitrator, UpholdingArbitrator};
use super::graph::{best_path, Adjacency, Edge};
use super::types::*;
use super::zk::{HashCommitmentProofs, ProofSystem, ZkClaim, ZkTrustProof};
use crate::clock::SharedClock;
use crate::crypto::Signer;
use crate::error::{SwarmError, SwarmResult};
use crate::events::{EventBus, SwarmEvent};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

const EPSILON: f64 = 1e-9;

/// Trust ledger tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    pub minimum_witnesses: usize,
    /// Confirmed share needed to verify; `1 - threshold` or less disputes
    pub consensus_threshold: f64,
    pub verification_timeout_secs: u64,
    pub max_path_length: usize,
    /// Per-hop discount beyond the first
    pub decay_factor: f64,
    pub max_disputes: usize,
    pub dispute_timeout_secs: u64,
    pub default_decay_rate: f64,
    pub path_validity_secs: u64,
    pub zk_proof_validity_secs: u64,
    /// Above this many agents the all-pairs metrics refresh logs a warning
    pub metrics_agent_warning: usize,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            minimum_witnesses: 3,
            consensus_threshold: 0.67,
            verification_timeout_secs: 300,
            max_path_length: 5,
            decay_factor: 0.95,
            max_disputes: 5,
            dispute_timeout_secs: 3600,
            default_decay_rate: 0.01,
            path_validity_secs: 3600,
            zk_proof_validity_secs: 86_400,
            metrics_agent_warning: 100,
        }
    }
}

impl TrustConfig {
    pub fn validate(&self) -> SwarmResult<()> {
        if self.minimum_witnesses == 0 {
            return Err(SwarmError::InvalidConfig("minimum_witnesses must be positive".into()));
        }
        if !(self.consensus_threshold > 0.5 && self.consensus_threshold <= 1.0) {
            return Err(SwarmError::InvalidConfig(format!(
                "consensus_threshold {} must be in (0.5, 1]",
                self.consensus_threshold
            )));
        }
        if !(self.decay_factor > 0.0 && self.decay_factor <= 1.0) {
            return Err(SwarmError::InvalidConfig(format!("decay_factor {} outside (0, 1]", self.decay_factor)));
        }
        if !(0.0..1.0).contains(&self.default_decay_rate) {
            return Err(SwarmError::InvalidConfig(format!(
                "default_decay_rate {} outside [0, 1)",
                self.default_decay_rate
            )));
        }
        if self.max_path_length == 0 {
            return Err(SwarmError::InvalidConfig("max_path_length must be positive".into()));
        }
        Ok(())
    }
}

/// `0.3 + 0.4 × verifiable share + 0.3 × min(1, count / 5)`, capped at 0.95
pub fn evidence_confidence(evidence: &[TrustEvidence]) -> f64 {
    let count = evidence.len() as f64;
    let verifiable_ratio = if evidence.is_empty() {
        0.0
    } else {
        evidence.iter().filter(|e| e.verifiable).count() as f64 / count
    };
    (0.3 + 0.4 * verifiable_ratio + 0.3 * (count / 5.0).min(1.0)).min(0.95)
}

type PathKey = (String, String, Vec<String>);

pub struct DistributedTrustVerifier {
    config: TrustConfig,
    signer: Arc<dyn Signer>,
    clock: SharedClock,
    events: EventBus,
    arbitrator: Box<dyn DisputeArbitrator>,
    proofs: Box<dyn ProofSystem>,
    agents: BTreeSet<String>,
    assertions: HashMap<String, TrustAssertion>,
    path_cache: HashMap<PathKey, TrustPath>,
    zk_proofs: HashMap<String, ZkTrustProof>,
    rejected_proofs: u64,
    last_metrics: Option<NetworkMetrics>,
}

impl DistributedTrustVerifier {
    pub fn new(config: TrustConfig, signer: Arc<dyn Signer>, clock: SharedClock, events: EventBus) -> SwarmResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            signer,
            clock,
            events,
            arbitrator: Box::new(UpholdingArbitrator),
            proofs: Box::new(HashCommitmentProofs),
            agents: BTreeSet::new(),
            assertions: HashMap::new(),
            path_cache: HashMap::new(),
            zk_proofs: HashMap::new(),
            rejected_proofs: 0,
            last_metrics: None,
        })
    }

    pub fn with_arbitrator(mut self, arbitrator: Box<dyn DisputeArbitrator>) -> Self {
        self.arbitrator = arbitrator;
        self
    }

    pub fn with_proof_system(mut self, proofs: Box<dyn ProofSystem>) -> Self {
        self.proofs = proofs;
        self
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    pub fn register_agent(&mut self, agent_id: impl Into<String>) {
        self.agents.insert(agent_id.into());
    }

    pub fn agents(&self) -> Vec<String> {
        self.agents.iter().cloned().collect()
    }

    /// Copy of an assertion
    pub fn assertion(&self, assertion_id: &str) -> Option<TrustAssertion> {
        self.assertions.get(assertion_id).cloned()
    }

    pub fn zk_proof(&self, proof_id: &str) -> Option<ZkTrustProof> {
        self.zk_proofs.get(proof_id).cloned()
    }

    /// Proofs rejected as expired or cryptographically invalid
    pub fn rejected_proofs(&self) -> u64 {
        self.rejected_proofs
    }

    pub fn last_metrics(&self) -> Option<&NetworkMetrics> {
        self.last_metrics.as_ref()
    }

    fn require_agent(&self, agent_id: &str) -> SwarmResult<()> {
        if self.agents.contains(agent_id) {
            Ok(())
        } else {
            Err(SwarmError::UnknownAgent(agent_id.to_string()))
        }
    }

    fn assertion_mut(&mut self, assertion_id: &str) -> SwarmResult<&mut TrustAssertion> {
        self.assertions
            .get_mut(assertion_id)
            .ok_or_else(|| SwarmError::UnknownAssertion(assertion_id.to_string()))
    }

    // ── assertions & verification ───────────────────────────────

    pub fn submit_trust_assertion(
        &mut self,
        from_agent: &str,
        to_agent: &str,
        trust_level: f64,
        trust_domains: Vec<String>,
        evidence: Vec<TrustEvidence>,
    ) -> SwarmResult<String> {
        if !(0.0..=1.0).contains(&trust_level) {
            return Err(SwarmError::InvalidTrustLevel(trust_level));
        }
        if from_agent == to_agent {
            return Err(SwarmError::SelfAssertion(from_agent.to_string()));
        }
        self.require_agent(from_agent)?;
        self.require_agent(to_agent)?;

        let now = self.clock.now();
        let mut assertion = TrustAssertion {
            id: uuid::Uuid::new_v4().to_string(),
            from_agent: from_agent.to_string(),
            to_agent: to_agent.to_string(),
            trust_level,
            trust_domains,
            confidence: evidence_confidence(&evidence),
            evidence,
            decay_rate: self.config.default_decay_rate,
            status: AssertionStatus::Pending,
            created_at: now,
            verification_deadline: now + Duration::seconds(self.config.verification_timeout_secs as i64),
            requested_verifiers: Vec::new(),
            verifications: Vec::new(),
            disputes: Vec::new(),
            signature: String::new(),
        };
        assertion.signature = self.signer.sign(&assertion.signing_bytes());

        let id = assertion.id.clone();
        info!(
            "Trust assertion {}: {} -> {} at {:.2} (confidence {:.2})",
            id, from_agent, to_agent, trust_level, assertion.confidence
        );
        self.events.emit(SwarmEvent::TrustAssertionSubmitted {
            assertion_id: id.clone(),
            from_agent: from_agent.to_string(),
            to_agent: to_agent.to_string(),
            trust_level,
        });
        self.assertions.insert(id.clone(), assertion);
        self.initiate_verification(&id)?;
        Ok(id)
    }

    /// Pick witnesses among everyone but the two parties
    fn initiate_verification(&mut self, assertion_id: &str) -> SwarmResult<()> {
        let wanted = 2 * self.config.minimum_witnesses;
        let assertion = self
            .assertions
            .get(assertion_id)
            .ok_or_else(|| SwarmError::UnknownAssertion(assertion_id.to_string()))?;
        let eligible: Vec<&String> = self
            .agents
            .iter()
            .filter(|a| **a != assertion.from_agent && **a != assertion.to_agent)
            .collect();
        let count = wanted.min(eligible.len());
        let mut verifiers: Vec<String> = eligible
            .choose_multiple(&mut rand::thread_rng(), count)
            .map(|a| (*a).clone())
            .collect();
        verifiers.sort();

        if verifiers.len() < self.config.minimum_witnesses {
            warn!(
                "Assertion {} has only {} possible witnesses, {} needed",
                assertion_id,
                verifiers.len(),
                self.config.minimum_witnesses
            );
        }
        self.events.emit(SwarmEvent::TrustVerificationRequested {
            assertion_id: assertion_id.to_string(),
            verifiers: verifiers.clone(),
        });
        self.assertion_mut(assertion_id)?.requested_verifiers = verifiers;
        Ok(())
    }

    /// Record one witness' verdict and re-evaluate the assertion
    pub fn verify_trust_assertion(
        &mut self,
        assertion_id: &str,
        verifier_id: &str,
        result: VerificationResult,
        confidence: f64,
        comment: &str,
    ) -> SwarmResult<AssertionStatus> {
        self.require_agent(verifier_id)?;
        let now = self.clock.now();
        let minimum = self.config.minimum_witnesses;
        let threshold = self.config.consensus_threshold;
        let signature = self
            .signer
            .sign(format!("{}:{}:{:?}", assertion_id, verifier_id, result).as_bytes());

        let assertion = self.assertion_mut(assertion_id)?;
        if assertion.status != AssertionStatus::Pending {
            return Err(SwarmError::NotActive(assertion_id.to_string()));
        }
        if verifier_id == assertion.from_agent || verifier_id == assertion.to_agent {
            return Err(SwarmError::NotPermitted(format!(
                "{} is a party to assertion {}",
                verifier_id, assertion_id
            )));
        }
        // The requested witnesses are authoritative once they can meet the minimum on their own
        if assertion.requested_verifiers.len() >= minimum
            && !assertion.requested_verifiers.iter().any(|v| v == verifier_id)
        {
            return Err(SwarmError::NotPermitted(format!(
                "{} was not requested to witness assertion {}",
                verifier_id, assertion_id
            )));
        }
        if assertion.verifications.iter().any(|v| v.verifier_id == verifier_id) {
            return Err(SwarmError::DuplicateVerification {
                verifier: verifier_id.to_string(),
                assertion: assertion_id.to_string(),
            });
        }
        assertion.verifications.push(TrustVerification {
            verifier_id: verifier_id.to_string(),
            result,
            confidence: confidence.clamp(0.0, 1.0),
            comment: comment.to_string(),
            timestamp: now,
            signature,
        });

        if assertion.verifications.len() < minimum {
            return Ok(AssertionStatus::Pending);
        }
        let confirmed = assertion
            .verifications
            .iter()
            .filter(|v| v.result == VerificationResult::Confirmed)
            .count();
        let ratio = confirmed as f64 / assertion.verifications.len() as f64;

        if ratio + EPSILON >= threshold {
            assertion.status = AssertionStatus::Verified;
            info!("Assertion {} verified ({:.2} confirmed)", assertion_id, ratio);
            self.path_cache.clear();
            self.events.emit(SwarmEvent::TrustAssertionVerified {
                assertion_id: assertion_id.to_string(),
                consensus_ratio: ratio,
            });
        } else if ratio <= 1.0 - threshold + EPSILON {
            assertion.status = AssertionStatus::Disputed;
            warn!("Assertion {} disputed by its witnesses ({:.2} confirmed)", assertion_id, ratio);
            self.path_cache.clear();
            self.events.emit(SwarmEvent::TrustAssertionDisputed {
                assertion_id: assertion_id.to_string(),
                reason: format!("only {:.2} of witnesses confirmed", ratio),
            });
        }
        Ok(self.assertions.get(assertion_id).map(|a| a.status).unwrap_or(AssertionStatus::Pending))
    }

    /// Only the asserting agent may withdraw its assertion
    pub fn revoke_trust_assertion(&mut self, assertion_id: &str, requester_id: &str) -> SwarmResult<()> {
        let assertion = self.assertion_mut(assertion_id)?;
        if assertion.from_agent != requester_id {
            return Err(SwarmError::NotPermitted(format!(
                "{} cannot revoke an assertion made by {}",
                requester_id, assertion.from_agent
            )));
        }
        assertion.status = AssertionStatus::Revoked;
        self.path_cache.clear();
        info!("Assertion {} revoked", assertion_id);
        self.events.emit(SwarmEvent::TrustAssertionRevoked {
            assertion_id: assertion_id.to_string(),
        });
        Ok(())
    }

    // ── trust computation ───────────────────────────────────────

    /// Direct verified trust when it exists, otherwise the best path
    pub fn compute_trust(&mut self, from: &str, to: &str, domains: &[String]) -> TrustComputation {
        let now = self.clock.now();
        let direct = self
            .assertions
            .values()
            .filter(|a| {
                a.from_agent == from && a.to_agent == to && a.status == AssertionStatus::Verified && a.covers(domains)
            })
            .max_by_key(|a| a.created_at);
        if let Some(a) = direct {
            return TrustComputation {
                from: from.to_string(),
                to: to.to_string(),
                trust: a.effective_trust(now),
                confidence: a.confidence,
                direct_assertion: Some(a.id.clone()),
                path: None,
            };
        }

        let path = self.trust_path(from, to, domains, now);
        TrustComputation {
            from: from.to_string(),
            to: to.to_string(),
            trust: path.as_ref().map(|p| p.trust).unwrap_or(0.0),
            confidence: path.as_ref().map(|p| p.confidence).unwrap_or(0.0),
            direct_assertion: None,
            path,
        }
    }

    fn trust_path(&mut self, from: &str, to: &str, domains: &[String], now: DateTime<Utc>) -> Option<TrustPath> {
        let mut sorted_domains = domains.to_vec();
        sorted_domains.sort();
        let key = (from.to_string(), to.to_string(), sorted_domains);
        if let Some(cached) = self.path_cache.get(&key) {
            if now < cached.valid_until {
                debug!("Trust path {} -> {} served from cache", from, to);
                return Some(cached.clone());
            }
        }

        let mut adjacency = Adjacency::new();
        for a in self
            .assertions
            .values()
            .filter(|a| a.status == AssertionStatus::Verified && a.covers(domains))
        {
            adjacency.entry(a.from_agent.clone()).or_default().push(Edge {
                to: a.to_agent.clone(),
                assertion_id: a.id.clone(),
                trust: a.effective_trust(now),
                confidence: a.confidence,
            });
        }

        let found = best_path(
            &adjacency,
            from,
            to,
            self.config.max_path_length,
            self.config.decay_factor,
        )?;
        let hops = found.assertion_ids.len();
        let (weak_index, weak_trust) = found
            .edge_trust
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::INFINITY), |acc, (i, t)| if t < acc.1 { (i, t) } else { acc });
        let min_confidence = found.edge_confidence.iter().copied().fold(1.0, f64::min);

        let path = TrustPath {
            weakest_link: WeakLink {
                from: found.agents[weak_index].clone(),
                to: found.agents[weak_index + 1].clone(),
                trust: weak_trust,
            },
            confidence: min_confidence * self.config.decay_factor.powi(hops as i32 - 1),
            trust: found.score,
            agents: found.agents,
            assertion_ids: found.assertion_ids,
            computed_at: now,
            valid_until: now + Duration::seconds(self.config.path_validity_secs as i64),
        };
        self.path_cache.insert(key, path.clone());
        Some(path)
    }

    /// Signed trust answer for outside consumers
    pub fn query_trust_oracle(&mut self, from: &str, to: &str, domains: &[String]) -> SwarmResult<OracleResponse> {
        self.require_agent(from)?;
        self.require_agent(to)?;
        let computed = self.compute_trust(from, to, domains);
        let mut response = OracleResponse {
            query_from: from.to_string(),
            query_to: to.to_string(),
            domains: domains.to_vec(),
            trust: computed.trust,
            confidence: computed.confidence,
            path_length: computed.path.as_ref().map(|p| p.hops()).unwrap_or(usize::from(computed.direct_assertion.is_some())),
            responder_public_key: self.signer.public_key(),
            timestamp: self.clock.now(),
            signature: String::new(),
        };
        response.signature = self.signer.sign(&response.signing_bytes());
        Ok(response)
    }

    // ── disputes ────────────────────────────────────────────────

    pub fn submit_trust_dispute(
        &mut self,
        assertion_id: &str,
        disputer_id: &str,
        reason: &str,
        evidence: Vec<TrustEvidence>,
    ) -> SwarmResult<String> {
        self.require_agent(disputer_id)?;
        let now = self.clock.now();
        let max_disputes = self.config.max_disputes;
        let resolve_after = now + Duration::seconds(self.config.dispute_timeout_secs as i64);

        let assertion = self.assertion_mut(assertion_id)?;
        if matches!(assertion.status, AssertionStatus::Revoked | AssertionStatus::Expired) {
            return Err(SwarmError::NotActive(assertion_id.to_string()));
        }
        if assertion.disputes.len() >= max_disputes {
            return Err(SwarmError::TooManyDisputes(assertion_id.to_string()));
        }
        // The status to fall back to is the one before the first open dispute
        let prior_status = assertion
            .disputes
            .iter()
            .find(|d| d.resolution.is_none())
            .map(|d| d.prior_status)
            .unwrap_or(assertion.status);

        let dispute_id = uuid::Uuid::new_v4().to_string();
        assertion.disputes.push(TrustDispute {
            id: dispute_id.clone(),
            disputer_id: disputer_id.to_string(),
            reason: reason.to_string(),
            evidence,
            submitted_at: now,
            resolve_after: Some(resolve_after),
            prior_status,
            resolution: None,
        });
        assertion.status = AssertionStatus::Disputed;
        self.path_cache.clear();

        warn!("Assertion {} disputed by {}: {}", assertion_id, disputer_id, reason);
        self.events.emit(SwarmEvent::TrustDisputeSubmitted {
            assertion_id: assertion_id.to_string(),
            dispute_id: dispute_id.clone(),
        });
        self.events.emit(SwarmEvent::TrustAssertionDisputed {
            assertion_id: assertion_id.to_string(),
            reason: reason.to_string(),
        });
        Ok(dispute_id)
    }

    fn resolve_dispute(&mut self, assertion_id: &str, dispute_id: &str, now: DateTime<Utc>) -> SwarmResult<()> {
        let assertion = self
            .assertions
            .get(assertion_id)
            .ok_or_else(|| SwarmError::UnknownAssertion(assertion_id.to_string()))?;
        let dispute = assertion
            .disputes
            .iter()
            .find(|d| d.id == dispute_id)
            .ok_or_else(|| SwarmError::UnknownAssertion(dispute_id.to_string()))?;
        let resolution = self.arbitrator.arbitrate(assertion, dispute, now);

        let assertion = self.assertion_mut(assertion_id)?;
        let Some(dispute) = assertion.disputes.iter_mut().find(|d| d.id == dispute_id) else {
            return Err(SwarmError::UnknownAssertion(dispute_id.to_string()));
        };
        let prior_status = dispute.prior_status;
        dispute.resolution = Some(resolution.clone());
        dispute.resolve_after = None;
        let still_open = assertion.disputes.iter().any(|d| d.resolution.is_none());

        let restored = if still_open {
            AssertionStatus::Disputed
        } else {
            prior_status
        };
        match (resolution.decision, resolution.new_trust_level) {
            (DisputeDecision::Upheld, Some(level)) => {
                assertion.trust_level = level.clamp(0.0, 1.0);
                assertion.status = if still_open {
                    AssertionStatus::Disputed
                } else {
                    AssertionStatus::Verified
                };
            }
            (DisputeDecision::Upheld, None) => assertion.status = AssertionStatus::Revoked,
            (DisputeDecision::Rejected, _) => assertion.status = restored,
            (DisputeDecision::Partial, level) => {
                if let Some(level) = level {
                    assertion.trust_level = level.clamp(0.0, 1.0);
                }
                assertion.status = restored;
            }
        }
        let status = assertion.status;
        self.path_cache.clear();

        info!(
            "Dispute {} on {} resolved: {} (assertion now {:?})",
            dispute_id,
            assertion_id,
            resolution.decision.as_str(),
            status
        );
        self.events.emit(SwarmEvent::TrustDisputeResolved {
            assertion_id: assertion_id.to_string(),
            dispute_id: dispute_id.to_string(),
            decision: resolution.decision.as_str().to_string(),
        });
        if status == AssertionStatus::Revoked {
            self.events.emit(SwarmEvent::TrustAssertionRevoked {
                assertion_id: assertion_id.to_string(),
            });
        }
        Ok(())
    }

    // ── timers ──────────────────────────────────────────────────

    /// Expire stale verifications and resolve due disputes; returns how many changed
    pub fn check_timeouts(&mut self) -> usize {
        let now = self.clock.now();
        let expired: Vec<String> = self
            .assertions
            .values()
            .filter(|a| a.status == AssertionStatus::Pending && now >= a.verification_deadline)
            .map(|a| a.id.clone())
            .collect();
        for id in &expired {
            if let Some(a) = self.assertions.get_mut(id) {
                a.status = AssertionStatus::Expired;
                warn!(
                    "Assertion {} expired with {} of {} witnesses",
                    id,
                    a.verifications.len(),
                    self.config.minimum_witnesses
                );
            }
            self.events.emit(SwarmEvent::TrustAssertionExpired { assertion_id: id.clone() });
        }
        if !expired.is_empty() {
            self.path_cache.clear();
        }

        let mut due: Vec<(DateTime<Utc>, String, String)> = self
            .assertions
            .values()
            .flat_map(|a| {
                a.disputes.iter().filter_map(move |d| match (d.resolution.is_none(), d.resolve_after) {
                    (true, Some(at)) if now >= at => Some((d.submitted_at, a.id.clone(), d.id.clone())),
                    _ => None,
                })
            })
            .collect();
        due.sort();
        let mut resolved = 0;
        for (_, assertion_id, dispute_id) in &due {
            match self.resolve_dispute(assertion_id, dispute_id, now) {
                Ok(()) => resolved += 1,
                Err(e) => warn!("Dispute {} could not be resolved: {}", dispute_id, e),
            }
        }
        expired.len() + resolved
    }

    // ── zero-knowledge claims ───────────────────────────────────

    /// Prove a claim the ledger currently supports
    pub fn create_zk_trust_proof(
        &mut self,
        agent_id: &str,
        claim: ZkClaim,
        public_inputs: serde_json::Value,
    ) -> SwarmResult<String> {
        self.require_agent(agent_id)?;
        let witness = self.claim_witness(agent_id, &claim)?;
        let now = self.clock.now();
        let valid_until = now + Duration::seconds(self.config.zk_proof_validity_secs as i64);
        let statement = ZkTrustProof::statement(agent_id, &claim, &public_inputs, valid_until);
        let artifact = self.proofs.prove(&statement, witness.as_bytes());

        let proof = ZkTrustProof {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            claim,
            public_inputs,
            artifact,
            created_at: now,
            valid_until,
            verifiers: BTreeSet::new(),
            verified: false,
        };
        let id = proof.id.clone();
        info!("ZK proof {} created for {} ({})", id, agent_id, proof.claim.name());
        self.events.emit(SwarmEvent::ZkProofCreated {
            proof_id: id.clone(),
            agent_id: agent_id.to_string(),
        });
        self.zk_proofs.insert(id.clone(), proof);
        Ok(id)
    }

    /// Hidden witness backing a claim, or an error if the ledger does not support it
    fn claim_witness(&mut self, agent_id: &str, claim: &ZkClaim) -> SwarmResult<String> {
        let verified_about = |a: &&TrustAssertion| a.to_agent == agent_id && a.status == AssertionStatus::Verified;
        match claim {
            ZkClaim::TrustAbove { from, threshold } => {
                let computed = self.compute_trust(from, agent_id, &[]);
                if computed.trust + EPSILON >= *threshold {
                    Ok(format!("{}:{:.6}", computed.direct_assertion.unwrap_or_default(), computed.trust))
                } else {
                    Err(SwarmError::ClaimNotSatisfied(format!(
                        "{} trusts {} at {:.3}, below {:.3}",
                        from, agent_id, computed.trust, threshold
                    )))
                }
            }
            ZkClaim::VerifiedBy { verifier } => self
                .assertions
                .values()
                .filter(verified_about)
                .find(|a| &a.from_agent == verifier)
                .map(|a| a.id.clone())
                .ok_or_else(|| SwarmError::ClaimNotSatisfied(format!("no verified assertion from {}", verifier))),
            ZkClaim::DomainMember { domain } => self
                .assertions
                .values()
                .filter(verified_about)
                .find(|a| a.trust_domains.contains(domain))
                .map(|a| a.id.clone())
                .ok_or_else(|| SwarmError::ClaimNotSatisfied(format!("no verified assertion covers {}", domain))),
        }
    }

    /// Add a verifier's acceptance. Expired or invalid proofs are rejected and counted.
    pub fn verify_zk_trust_proof(&mut self, proof_id: &str, verifier_id: &str) -> SwarmResult<bool> {
        self.require_agent(verifier_id)?;
        let now = self.clock.now();
        let minimum = self.config.minimum_witnesses;
        let proof = self
            .zk_proofs
            .get(proof_id)
            .ok_or_else(|| SwarmError::UnknownProof(proof_id.to_string()))?;
        if proof.agent_id == verifier_id {
            return Err(SwarmError::NotPermitted("an agent cannot verify its own proof".into()));
        }
        if proof.is_expired(now) {
            warn!("ZK proof {} expired at {}", proof_id, proof.valid_until);
            self.rejected_proofs += 1;
            return Ok(false);
        }
        let statement = ZkTrustProof::statement(&proof.agent_id, &proof.claim, &proof.public_inputs, proof.valid_until);
        if !self.proofs.verify(&statement, &proof.artifact) {
            warn!("ZK proof {} failed verification", proof_id);
            self.rejected_proofs += 1;
            return Ok(false);
        }

        let Some(proof) = self.zk_proofs.get_mut(proof_id) else {
            return Err(SwarmError::UnknownProof(proof_id.to_string()));
        };
        proof.verifiers.insert(verifier_id.to_string());
        if !proof.verified && proof.verifiers.len() >= minimum {
            proof.verified = true;
            info!("ZK proof {} accepted by {} verifiers", proof_id, proof.verifiers.len());
            self.events.emit(SwarmEvent::ZkProofVerified {
                proof_id: proof_id.to_string(),
                verifiers: proof.verifiers.len(),
            });
        }
        Ok(proof.verified)
    }

    // ── network metrics ─────────────────────────────────────────

    /// Recompute all-pairs trust and aggregate metrics; quadratic in the number of agents
    pub fn refresh_network_metrics(&mut self) -> NetworkMetrics {
        let now = self.clock.now();
        let mut agents: BTreeSet<String> = self.agents.clone();
        for a in self.assertions.values() {
            agents.insert(a.from_agent.clone());
            agents.insert(a.to_agent.clone());
        }
        let n = agents.len();
        if n > self.config.metrics_agent_warning {
            warn!(
                "Refreshing trust metrics over {} agents; all-pairs path search is O(n^2)",
                n
            );
        }

        let assertions = self.assertions.len();
        let verified_assertions = self
            .assertions
            .values()
            .filter(|a| a.status == AssertionStatus::Verified)
            .count();
        let density = if n > 1 {
            assertions as f64 / (n * (n - 1)) as f64
        } else {
            0.0
        };

        let mut trust_histogram = [0usize; 10];
        for a in self.assertions.values() {
            let bucket = ((a.trust_level * 10.0) as usize).min(9);
            trust_histogram[bucket] += 1;
        }

        let mut total_hops = 0usize;
        let mut reachable_pairs = 0usize;
        let ids: Vec<String> = agents.into_iter().collect();
        for from in &ids {
            for to in ids.iter().filter(|t| *t != from) {
                let computed = self.compute_trust(from, to, &[]);
                let hops = match (&computed.direct_assertion, &computed.path) {
                    (Some(_), _) => 1,
                    (None, Some(path)) => path.hops(),
                    (None, None) => continue,
                };
                total_hops += hops;
                reachable_pairs += 1;
            }
        }

        let metrics = NetworkMetrics {
            agents: n,
            assertions,
            verified_assertions,
            density,
            average_path_length: if reachable_pairs > 0 {
                total_hops as f64 / reachable_pairs as f64
            } else {
                0.0
            },
            reachable_pairs,
            trust_histogram,
            computed_at: now,
        };
        debug!("Trust network metrics: {:?}", metrics);
        self.events.emit(SwarmEvent::TrustNetworkMetricsUpdated {
            agents: metrics.agents,
            assertions: metrics.assertions,
            density: metrics.density,
        });
        self.last_metrics = Some(metrics.clone());
        metrics
    }

    /// Expire pending verifications and park dispute timers
    pub fn emergency_stop(&mut self) {
        for a in self.assertions.values_mut() {
            if a.status == AssertionStatus::Pending {
                a.status = AssertionStatus::Expired;
            }
            for d in a.disputes.iter_mut() {
                d.resolve_after = None;
            }
        }
        self.path_cache.clear();
        warn!("Trust verifier emergency stop");
        self.events.emit(SwarmEvent::EmergencyStop {
            component: "trust-verifier".into(),
        });
    }
}
