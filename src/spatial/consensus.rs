//! Domain voting layered over the Byzantine engine
//!
//! Every spatial proposal is wrapped into a `ConsensusProposal` and handed to
//! the engine, which orders it among the replicas. Whether the action is
//! carried out is decided here, by a simple majority of the votes cast.

use super::conflict;
use super::types::*;
use crate::consensus::{Agent, ByzantineConsensus, ConsensusMessage, ConsensusProposal};
use crate::error::{SwarmError, SwarmResult};
use crate::events::SwarmEvent;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Spatial layer tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Agents closer than this overlap
    pub spatial_tolerance: f64,
    pub consensus_deadline_secs: u64,
    /// Stagger between agents under temporal separation
    pub temporal_separation_secs: u64,
    /// Search radius for the random fallback of avoidance
    pub random_fallback_radius: f64,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            spatial_tolerance: 1.0,
            consensus_deadline_secs: 60,
            temporal_separation_secs: 5,
            random_fallback_radius: 5.0,
        }
    }
}

struct ProposalRecord {
    proposal: SpatialConsensusProposal,
    status: ProposalStatus,
    votes: Vec<SpatialConsensusVote>,
    /// Whether the base engine accepted it for ordering
    ordered: bool,
}

pub struct SpatialConsensus {
    engine: ByzantineConsensus,
    config: SpatialConfig,
    agents: BTreeMap<String, SpatialAgentState>,
    proposals: HashMap<String, ProposalRecord>,
    conflicts: HashMap<String, SpatialConflict>,
    decisions: Vec<SpatialDecision>,
}

impl SpatialConsensus {
    pub fn new(engine: ByzantineConsensus, config: SpatialConfig) -> Self {
        Self {
            engine,
            config,
            agents: BTreeMap::new(),
            proposals: HashMap::new(),
            conflicts: HashMap::new(),
            decisions: Vec::new(),
        }
    }

    pub fn engine(&self) -> &ByzantineConsensus {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ByzantineConsensus {
        &mut self.engine
    }

    /// Forward a protocol message to the base engine
    pub fn process_message(&mut self, msg: ConsensusMessage) {
        self.engine.process_message(msg);
    }

    fn now(&self) -> DateTime<Utc> {
        self.engine.clock().now()
    }

    fn emit(&self, event: SwarmEvent) {
        self.engine.events().emit(event);
    }

    /// Track an agent's spatial state; registers it with the engine if needed
    pub fn register_spatial_agent(&mut self, agent: Agent, position: Position, priority: u32) -> SwarmResult<()> {
        if self.agents.contains_key(&agent.id) {
            return Err(SwarmError::DuplicateAgent(agent.id));
        }
        let id = agent.id.clone();
        if self.engine.agent(&id).is_none() {
            self.engine.register_agent(agent)?;
        }
        self.agents.insert(id.clone(), SpatialAgentState::new(id, position, priority));
        Ok(())
    }

    pub fn spatial_state(&self, agent_id: &str) -> Option<&SpatialAgentState> {
        self.agents.get(agent_id)
    }

    pub fn status(&self, proposal_id: &str) -> Option<ProposalStatus> {
        self.proposals.get(proposal_id).map(|r| r.status)
    }

    pub fn decisions(&self) -> &[SpatialDecision] {
        &self.decisions
    }

    // ── proposal builders ───────────────────────────────────────

    pub fn propose_location_change(&mut self, agent_id: &str, target: Position) -> SwarmResult<String> {
        let requirement = SpatialRequirement {
            center: target,
            radius: self.config.spatial_tolerance,
        };
        self.initiate_consensus(
            agent_id,
            SpatialProposalKind::LocationChange {
                agent_id: agent_id.to_string(),
                target,
            },
            vec![requirement],
            Vec::new(),
        )
    }

    pub fn propose_resource_allocation(
        &mut self,
        agent_id: &str,
        resource_type: &str,
        amount: f64,
        exclusive: bool,
    ) -> SwarmResult<String> {
        let requirement = ResourceRequirement {
            resource_type: resource_type.to_string(),
            amount,
            exclusive,
        };
        self.initiate_consensus(
            agent_id,
            SpatialProposalKind::ResourceAllocation {
                agent_id: agent_id.to_string(),
                resource_type: resource_type.to_string(),
                amount,
                exclusive,
            },
            Vec::new(),
            vec![requirement],
        )
    }

    pub fn propose_zone_access(&mut self, agent_id: &str, zone_id: &str, duration_secs: u64) -> SwarmResult<String> {
        self.initiate_consensus(
            agent_id,
            SpatialProposalKind::ZoneAccess {
                agent_id: agent_id.to_string(),
                zone_id: zone_id.to_string(),
                duration_secs,
            },
            Vec::new(),
            Vec::new(),
        )
    }

    pub fn propose_collaboration(&mut self, agent_id: &str, partners: Vec<String>, task: &str) -> SwarmResult<String> {
        if let Some(unknown) = partners.iter().find(|p| !self.agents.contains_key(*p)) {
            return Err(SwarmError::UnknownAgent(unknown.clone()));
        }
        self.initiate_consensus(
            agent_id,
            SpatialProposalKind::CollaborationRequest {
                agent_id: agent_id.to_string(),
                partners,
                task: task.to_string(),
            },
            Vec::new(),
            Vec::new(),
        )
    }

    /// Common path of every builder: validate, wrap for the engine, open voting
    pub fn initiate_consensus(
        &mut self,
        proposer_id: &str,
        kind: SpatialProposalKind,
        spatial_requirements: Vec<SpatialRequirement>,
        resource_requirements: Vec<ResourceRequirement>,
    ) -> SwarmResult<String> {
        if !self.engine.can_reach_consensus() {
            return Err(SwarmError::InsufficientAgents {
                active: self.engine.get_state().active_agents.len(),
                required: self.engine.required_agents(),
            });
        }
        if !self.agents.contains_key(proposer_id) {
            return Err(SwarmError::UnknownAgent(proposer_id.to_string()));
        }
        if !self.agents.contains_key(kind.subject()) {
            return Err(SwarmError::UnknownAgent(kind.subject().to_string()));
        }

        let now = self.now();
        let proposal = SpatialConsensusProposal {
            id: uuid::Uuid::new_v4().to_string(),
            proposer_id: proposer_id.to_string(),
            kind,
            spatial_requirements,
            resource_requirements,
            created_at: now,
            consensus_deadline: now + Duration::seconds(self.config.consensus_deadline_secs as i64),
        };

        let wrapped = ConsensusProposal::new(serde_json::to_value(&proposal)?, proposer_id, now);
        let ordered = self.engine.start_consensus(wrapped)?;
        if !ordered {
            debug!("Spatial proposal {} left for the current leader to order", proposal.id);
        }

        info!(
            "Spatial proposal {} ({}) by {}",
            proposal.id,
            proposal.kind.name(),
            proposer_id
        );
        self.emit(SwarmEvent::SpatialProposalCreated {
            proposal_id: proposal.id.clone(),
            kind: proposal.kind.name().to_string(),
        });

        let id = proposal.id.clone();
        self.proposals.insert(
            id.clone(),
            ProposalRecord {
                proposal,
                status: ProposalStatus::Pending,
                votes: Vec::new(),
                ordered,
            },
        );
        Ok(id)
    }

    /// Whether the base engine accepted the wrapped proposal for ordering
    pub fn is_ordered(&self, proposal_id: &str) -> bool {
        self.proposals.get(proposal_id).map(|r| r.ordered).unwrap_or(false)
    }

    // ── voting ──────────────────────────────────────────────────

    /// Record a vote; returns the decision if this vote settled the outcome
    pub fn cast_vote(
        &mut self,
        proposal_id: &str,
        voter_id: &str,
        decision: VoteDecision,
        reasoning: &str,
        conditions: Vec<String>,
    ) -> SwarmResult<Option<SpatialDecision>> {
        let now = self.now();
        if !self.agents.contains_key(voter_id) {
            return Err(SwarmError::UnknownAgent(voter_id.to_string()));
        }
        let eligible = self.agents.len();
        let record = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| SwarmError::UnknownProposal(proposal_id.to_string()))?;
        if record.status != ProposalStatus::Pending {
            return Err(SwarmError::NotActive(proposal_id.to_string()));
        }
        if now > record.proposal.consensus_deadline {
            return Err(SwarmError::DeadlinePassed(proposal_id.to_string()));
        }
        if record.votes.iter().any(|v| v.voter_id == voter_id) {
            return Err(SwarmError::DuplicateVote {
                voter: voter_id.to_string(),
                scope: proposal_id.to_string(),
            });
        }

        record.votes.push(SpatialConsensusVote {
            proposal_id: proposal_id.to_string(),
            voter_id: voter_id.to_string(),
            decision,
            reasoning: reasoning.to_string(),
            conditions,
            timestamp: now,
        });
        let settled = Self::settled(&record.votes, eligible);
        self.emit(SwarmEvent::SpatialVoteCast {
            proposal_id: proposal_id.to_string(),
            voter_id: voter_id.to_string(),
            decision: decision.as_str().to_string(),
        });

        if settled {
            return Ok(Some(self.finalize(proposal_id)?));
        }
        Ok(None)
    }

    /// True once the remaining voters can no longer flip the majority
    fn settled(votes: &[SpatialConsensusVote], eligible: usize) -> bool {
        let cast = votes.len();
        let approvals = votes.iter().filter(|v| v.decision.approves()).count();
        let remaining = eligible.saturating_sub(cast);
        if remaining == 0 {
            return true;
        }
        let approved_even_if_rest_reject = 2 * approvals > cast + remaining;
        let rejected_even_if_rest_accept = 2 * (approvals + remaining) <= cast + remaining;
        approved_even_if_rest_reject || rejected_even_if_rest_accept
    }

    fn finalize(&mut self, proposal_id: &str) -> SwarmResult<SpatialDecision> {
        let now = self.now();
        let record = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| SwarmError::UnknownProposal(proposal_id.to_string()))?;

        let approvals = record.votes.iter().filter(|v| v.decision.approves()).count();
        let rejections = record.votes.iter().filter(|v| v.decision == VoteDecision::Reject).count();
        let abstentions = record.votes.iter().filter(|v| v.decision == VoteDecision::Abstain).count();
        let approved = 2 * approvals > record.votes.len();
        let conditions: Vec<String> = record
            .votes
            .iter()
            .filter(|v| v.decision == VoteDecision::Conditional)
            .flat_map(|v| v.conditions.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        record.status = if approved {
            ProposalStatus::Approved
        } else {
            ProposalStatus::Rejected
        };
        let kind = record.proposal.kind.clone();

        let decision = SpatialDecision {
            proposal_id: proposal_id.to_string(),
            approved,
            approvals,
            rejections,
            abstentions,
            conditions,
            decided_at: now,
        };

        if approved {
            self.apply(&kind);
        }
        info!(
            "Spatial proposal {} {} ({} for, {} against)",
            proposal_id,
            if approved { "approved" } else { "rejected" },
            approvals,
            rejections
        );
        self.emit(SwarmEvent::SpatialConsensusReached {
            proposal_id: proposal_id.to_string(),
            approved,
            approvals,
            rejections,
            conditions: decision.conditions.clone(),
        });
        self.decisions.push(decision.clone());
        Ok(decision)
    }

    fn apply(&mut self, kind: &SpatialProposalKind) {
        match kind {
            SpatialProposalKind::LocationChange { agent_id, target } => {
                if let Some(state) = self.agents.get_mut(agent_id) {
                    state.position = *target;
                }
            }
            SpatialProposalKind::ResourceAllocation { agent_id, resource_type, amount, exclusive } => {
                if let Some(state) = self.agents.get_mut(agent_id) {
                    state.resources.insert(
                        resource_type.clone(),
                        ResourceGrant {
                            amount: *amount,
                            exclusive: *exclusive,
                        },
                    );
                }
            }
            SpatialProposalKind::ZoneAccess { agent_id, zone_id, .. } => {
                if let Some(state) = self.agents.get_mut(agent_id) {
                    state.zones.insert(zone_id.clone());
                }
            }
            SpatialProposalKind::CollaborationRequest { agent_id, partners, .. } => {
                for partner in partners {
                    if let Some(state) = self.agents.get_mut(partner) {
                        state.collaborators.insert(agent_id.clone());
                    }
                }
                if let Some(state) = self.agents.get_mut(agent_id) {
                    state.collaborators.extend(partners.iter().cloned());
                }
            }
        }
    }

    /// Decide every pending proposal past its deadline and tick the engine
    pub fn check_timeouts(&mut self) -> Vec<SpatialDecision> {
        self.engine.check_timeouts();
        let now = self.now();
        let mut due: Vec<String> = self
            .proposals
            .iter()
            .filter(|(_, r)| r.status == ProposalStatus::Pending && now > r.proposal.consensus_deadline)
            .map(|(id, _)| id.clone())
            .collect();
        due.sort();
        due.iter().filter_map(|id| self.finalize(id).ok()).collect()
    }

    // ── conflicts ───────────────────────────────────────────────

    pub fn detect_spatial_conflicts(&mut self) -> Vec<SpatialConflict> {
        let pending: Vec<&SpatialConsensusProposal> = self
            .proposals
            .values()
            .filter(|r| r.status == ProposalStatus::Pending)
            .map(|r| &r.proposal)
            .collect();
        let found = conflict::detect(&self.agents, &pending, self.config.spatial_tolerance, self.now());
        for c in &found {
            warn!("Spatial conflict {} ({}) among {:?}", c.id, c.conflict_type.as_str(), c.agents);
            self.emit(SwarmEvent::SpatialConflictDetected {
                conflict_id: c.id.clone(),
                conflict_type: c.conflict_type.as_str().to_string(),
                agents: c.agents.clone(),
            });
            self.conflicts.insert(c.id.clone(), c.clone());
        }
        found
    }

    pub fn resolve_conflict(&mut self, conflict_id: &str, strategy: ResolutionStrategy) -> SwarmResult<ConflictResolution> {
        let c = self
            .conflicts
            .remove(conflict_id)
            .ok_or_else(|| SwarmError::UnknownProposal(conflict_id.to_string()))?;
        let order: Vec<String> = conflict::yield_order(&self.agents, &c.agents)
            .iter()
            .map(|s| s.agent_id.clone())
            .collect();

        let adjustments = match strategy {
            ResolutionStrategy::Avoidance => self.avoid(&c, &order),
            ResolutionStrategy::TemporalSeparation => self.separate(&order),
        };

        info!(
            "Resolved conflict {} by {} ({} adjustments)",
            conflict_id,
            strategy.as_str(),
            adjustments.len()
        );
        self.emit(SwarmEvent::SpatialConflictResolved {
            conflict_id: conflict_id.to_string(),
            strategy: strategy.as_str().to_string(),
            adjusted_agents: adjustments.iter().map(|a| a.agent_id.clone()).collect(),
        });
        Ok(ConflictResolution {
            conflict_id: conflict_id.to_string(),
            strategy,
            adjustments,
        })
    }

    /// Everyone but the highest-priority agent yields
    fn avoid(&mut self, c: &SpatialConflict, order: &[String]) -> Vec<Adjustment> {
        let mut adjustments = Vec::new();
        for agent_id in order.iter().skip(1) {
            match c.conflict_type {
                ConflictType::LocationOverlap => {
                    let occupied: Vec<Position> = self
                        .agents
                        .values()
                        .filter(|s| &s.agent_id != agent_id)
                        .map(|s| s.position)
                        .collect();
                    if let Some(state) = self.agents.get_mut(agent_id) {
                        let target = conflict::find_free_position(
                            &state.position,
                            &occupied,
                            self.config.spatial_tolerance,
                            self.config.random_fallback_radius,
                        );
                        state.position = target;
                        adjustments.push(Adjustment {
                            agent_id: agent_id.clone(),
                            new_position: Some(target),
                            released_resource: None,
                            delay_secs: 0,
                        });
                    }
                }
                ConflictType::ResourceContention => {
                    let resource = c.resource_type.clone().unwrap_or_default();
                    if let Some(state) = self.agents.get_mut(agent_id) {
                        state.resources.remove(&resource);
                    }
                    adjustments.push(Adjustment {
                        agent_id: agent_id.clone(),
                        new_position: None,
                        released_resource: Some(resource),
                        delay_secs: 0,
                    });
                }
            }
        }
        adjustments
    }

    /// Stagger agents by a fixed delay times their position in the yield order
    fn separate(&mut self, order: &[String]) -> Vec<Adjustment> {
        let now = self.now();
        order
            .iter()
            .enumerate()
            .filter_map(|(index, agent_id)| {
                let delay_secs = self.config.temporal_separation_secs * index as u64;
                let state = self.agents.get_mut(agent_id)?;
                state.next_action_at = Some(now + Duration::seconds(delay_secs as i64));
                Some(Adjustment {
                    agent_id: agent_id.clone(),
                    new_position: None,
                    released_resource: None,
                    delay_secs,
                })
            })
            .collect()
    }

    pub fn emergency_stop(&mut self) {
        for record in self.proposals.values_mut().filter(|r| r.status == ProposalStatus::Pending) {
            record.status = ProposalStatus::Rejected;
        }
        self.conflicts.clear();
        self.engine.emergency_stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::consensus::test_support::{agent_id, context, signer_for};
    use crate::consensus::{ByzantineConfig, NoOpBroadcaster};
    use crate::crypto::Signer;
    use crate::events::drain;
    use std::sync::Arc;

    fn layer(n: usize, clock: Arc<ManualClock>) -> SpatialConsensus {
        let engine = ByzantineConsensus::new(
            agent_id(0),
            ByzantineConfig::default(),
            context(0, clock.clone(), Arc::new(NoOpBroadcaster)),
        );
        let mut spatial = SpatialConsensus::new(engine, SpatialConfig::default());
        for i in 0..n {
            let agent = Agent::new(agent_id(i), signer_for(i).public_key(), clock.now());
            spatial
                .register_spatial_agent(agent, Position::new(10.0 * i as f64, 0.0, 0.0), i as u32)
                .unwrap();
        }
        spatial
    }

    #[test]
    fn test_location_change_approved_and_applied() {
        let clock = ManualClock::fixed();
        let mut s = layer(4, clock);
        let mut rx = s.engine().events().subscribe();
        let id = s.propose_location_change("agent-1", Position::new(5.0, 5.0, 0.0)).unwrap();
        assert!(s.is_ordered(&id));

        assert!(s.cast_vote(&id, "agent-0", VoteDecision::Accept, "clear", vec![]).unwrap().is_none());
        assert!(s.cast_vote(&id, "agent-2", VoteDecision::Accept, "clear", vec![]).unwrap().is_none());
        let decision = s
            .cast_vote(&id, "agent-3", VoteDecision::Conditional, "ok", vec!["slow approach".into()])
            .unwrap()
            .expect("three approvals out of four settle it");
        assert!(decision.approved);
        assert_eq!(decision.conditions, vec!["slow approach".to_string()]);
        assert_eq!(s.spatial_state("agent-1").unwrap().position, Position::new(5.0, 5.0, 0.0));
        assert_eq!(s.status(&id), Some(ProposalStatus::Approved));

        let names: Vec<_> = drain(&mut rx).iter().map(|e| e.name()).collect();
        assert!(names.contains(&"spatial-proposal-created"));
        assert!(names.contains(&"spatial-consensus-reached"));
    }

    #[test]
    fn test_tie_rejects_at_deadline() {
        let clock = ManualClock::fixed();
        let mut s = layer(4, clock.clone());
        let id = s.propose_zone_access("agent-2", "hangar", 600).unwrap();
        s.cast_vote(&id, "agent-0", VoteDecision::Accept, "", vec![]).unwrap();
        s.cast_vote(&id, "agent-1", VoteDecision::Reject, "busy", vec![]).unwrap();

        clock.advance(Duration::seconds(61));
        assert!(matches!(
            s.cast_vote(&id, "agent-3", VoteDecision::Accept, "", vec![]),
            Err(SwarmError::DeadlinePassed(_))
        ));
        let decided = s.check_timeouts();
        assert_eq!(decided.len(), 1);
        assert!(!decided[0].approved);
        assert!(s.spatial_state("agent-2").unwrap().zones.is_empty());
    }

    #[test]
    fn test_vote_contract_errors() {
        let clock = ManualClock::fixed();
        let mut s = layer(4, clock);
        let id = s.propose_resource_allocation("agent-1", "charger", 1.0, true).unwrap();
        s.cast_vote(&id, "agent-0", VoteDecision::Accept, "", vec![]).unwrap();
        assert!(matches!(
            s.cast_vote(&id, "agent-0", VoteDecision::Reject, "", vec![]),
            Err(SwarmError::DuplicateVote { .. })
        ));
        assert!(matches!(
            s.cast_vote(&id, "ghost", VoteDecision::Accept, "", vec![]),
            Err(SwarmError::UnknownAgent(_))
        ));
        assert!(matches!(
            s.cast_vote("nope", "agent-1", VoteDecision::Accept, "", vec![]),
            Err(SwarmError::UnknownProposal(_))
        ));
    }

    #[test]
    fn test_initiate_blocked_without_quorum() {
        let clock = ManualClock::fixed();
        let mut s = layer(4, clock);
        s.engine_mut().simulate_partition(&["agent-1".to_string(), "agent-2".to_string()]);
        assert!(matches!(
            s.propose_location_change("agent-3", Position::default()),
            Err(SwarmError::InsufficientAgents { .. })
        ));
    }

    #[test]
    fn test_collaboration_links_both_sides() {
        let clock = ManualClock::fixed();
        let mut s = layer(4, clock);
        let id = s
            .propose_collaboration("agent-0", vec!["agent-3".into()], "survey")
            .unwrap();
        for voter in ["agent-1", "agent-2", "agent-3"] {
            s.cast_vote(&id, voter, VoteDecision::Accept, "", vec![]).unwrap();
        }
        assert!(s.spatial_state("agent-0").unwrap().collaborators.contains("agent-3"));
        assert!(s.spatial_state("agent-3").unwrap().collaborators.contains("agent-0"));
    }

    #[test]
    fn test_overlap_resolved_by_avoidance() {
        let clock = ManualClock::fixed();
        let mut s = layer(4, clock);
        let id = s.propose_location_change("agent-1", Position::new(0.2, 0.0, 0.0)).unwrap();
        for voter in ["agent-0", "agent-2", "agent-3"] {
            s.cast_vote(&id, voter, VoteDecision::Accept, "", vec![]).unwrap();
        }

        let conflicts = s.detect_spatial_conflicts();
        let overlap = conflicts
            .iter()
            .find(|c| c.conflict_type == ConflictType::LocationOverlap)
            .expect("agents 0 and 1 overlap");
        let resolution = s.resolve_conflict(&overlap.id, ResolutionStrategy::Avoidance).unwrap();
        assert_eq!(resolution.adjustments.len(), 1);
        // agent-1 has the higher priority and stays
        assert_eq!(resolution.adjustments[0].agent_id, "agent-0");

        let a = s.spatial_state("agent-0").unwrap().position;
        let b = s.spatial_state("agent-1").unwrap().position;
        assert!(a.distance(&b) >= 1.0);
        assert!(s
            .detect_spatial_conflicts()
            .iter()
            .all(|c| c.conflict_type != ConflictType::LocationOverlap));
    }

    #[test]
    fn test_temporal_separation_staggers() {
        let clock = ManualClock::fixed();
        let mut s = layer(4, clock.clone());
        s.propose_resource_allocation("agent-1", "dock", 1.0, true).unwrap();
        s.propose_resource_allocation("agent-2", "dock", 1.0, true).unwrap();
        let conflicts = s.detect_spatial_conflicts();
        let contention = conflicts
            .iter()
            .find(|c| c.conflict_type == ConflictType::ResourceContention)
            .expect("two exclusive claims on dock");

        let resolution = s
            .resolve_conflict(&contention.id, ResolutionStrategy::TemporalSeparation)
            .unwrap();
        let delays: Vec<_> = resolution.adjustments.iter().map(|a| (a.agent_id.as_str(), a.delay_secs)).collect();
        assert_eq!(delays, vec![("agent-2", 0), ("agent-1", 5)]);
        assert_eq!(
            s.spatial_state("agent-1").unwrap().next_action_at,
            Some(clock.now() + Duration::seconds(5))
        );
    }
}
