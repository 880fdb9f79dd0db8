//! PBFT-style agreement engine
//!
//! One instance is one replica. The leader of a view assigns a sequence
//! number and broadcasts `pre-prepare`; replicas answer with `prepare`, then
//! `commit` once they hold a prepare quorum, and a proposal is decided once a
//! commit quorum arrives. Quorum is `2f` matching messages from distinct
//! agents with `f = floor((n-1)/3)` over the active set. A replica's own
//! prepare and commit count toward its quorums.
//!
//! Advancement is recomputed from message counts after every accepted
//! message, so the order in which prepares, commits and the pre-prepare
//! arrive does not matter.

use super::broadcaster::MessageBroadcaster;
use super::types::{
    Agent, ConsensusMessage, ConsensusProposal, ConsensusState, MessageType, PerformanceMetrics, Phase,
};
use crate::clock::SharedClock;
use crate::crypto::{SignatureVerifier, Signer};
use crate::error::{SwarmError, SwarmResult};
use crate::events::{EventBus, SwarmEvent};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ByzantineConfig {
    /// How long a round may sit before it is abandoned and a view change starts
    pub phase_timeout_secs: u64,
    /// Accepted skew between a message timestamp and the local clock, both directions
    pub message_tolerance_secs: u64,
    /// Committed sequences remembered below `last_committed`; older ones are pruned
    pub committed_history: u64,
}

impl Default for ByzantineConfig {
    fn default() -> Self {
        Self {
            phase_timeout_secs: 30,
            message_tolerance_secs: 300,
            committed_history: 256,
        }
    }
}

/// Collaborators injected into an engine
#[derive(Clone)]
pub struct ConsensusContext {
    pub signer: Arc<dyn Signer>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub broadcaster: Arc<dyn MessageBroadcaster>,
    pub clock: SharedClock,
    pub events: EventBus,
}

/// Progress of one proposal through the phases
#[derive(Debug, Clone)]
struct RoundProgress {
    sequence: u64,
    view: u64,
    phase: Phase,
    /// Whether a valid pre-prepare has been accepted for this digest
    pre_prepared: bool,
    started_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
}

enum Validation {
    Accept,
    /// Sender is flagged malicious: drop without a trace
    Drop,
    Invalid(String),
}

/// Byzantine fault-tolerant consensus replica
pub struct ByzantineConsensus {
    local_id: String,
    config: ByzantineConfig,
    ctx: ConsensusContext,
    agents: BTreeMap<String, Agent>,
    state: ConsensusState,
    rounds: HashMap<String, RoundProgress>,
    /// (view, sequence) -> digest of the accepted pre-prepare
    accepted_sequences: HashMap<(u64, u64), String>,
    /// Committed digest -> sequence
    committed: HashMap<String, u64>,
    last_committed: u64,
    /// Target view -> agents that asked for it
    view_change_votes: BTreeMap<u64, BTreeSet<String>>,
    metrics: PerformanceMetrics,
    total_latency_ms: f64,
    successful_rounds: u64,
}

impl ByzantineConsensus {
    /// Create a replica; the local agent is registered with the signer's key
    pub fn new(local_id: impl Into<String>, config: ByzantineConfig, ctx: ConsensusContext) -> Self {
        let local_id = local_id.into();
        let now = ctx.clock.now();
        let local = Agent::new(local_id.clone(), ctx.signer.public_key(), now);
        let mut engine = Self {
            local_id: local_id.clone(),
            config,
            ctx,
            agents: BTreeMap::new(),
            state: ConsensusState::default(),
            rounds: HashMap::new(),
            accepted_sequences: HashMap::new(),
            committed: HashMap::new(),
            last_committed: 0,
            view_change_votes: BTreeMap::new(),
            metrics: PerformanceMetrics::default(),
            total_latency_ms: 0.0,
            successful_rounds: 0,
        };
        engine.agents.insert(local_id.clone(), local);
        engine.state.active_agents.insert(local_id);
        engine.refresh_leader();
        engine
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn config(&self) -> &ByzantineConfig {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.ctx.clock
    }

    pub fn events(&self) -> &EventBus {
        &self.ctx.events
    }

    // ── membership ──────────────────────────────────────────────

    pub fn register_agent(&mut self, agent: Agent) -> SwarmResult<()> {
        if self.agents.contains_key(&agent.id) {
            return Err(SwarmError::DuplicateAgent(agent.id));
        }
        let id = agent.id.clone();
        self.agents.insert(id.clone(), agent);
        self.state.active_agents.insert(id.clone());
        self.refresh_leader();
        info!("[{}] registered agent {} ({} active)", self.local_id, id, self.state.active_agents.len());
        self.ctx.events.emit(SwarmEvent::AgentRegistered { agent_id: id });
        Ok(())
    }

    pub fn remove_agent(&mut self, agent_id: &str) -> SwarmResult<Agent> {
        let agent = self
            .agents
            .remove(agent_id)
            .ok_or_else(|| SwarmError::UnknownAgent(agent_id.to_string()))?;
        self.state.active_agents.remove(agent_id);
        self.purge_votes_of(&[agent_id.to_string()]);
        self.refresh_leader();
        info!("[{}] removed agent {}", self.local_id, agent_id);
        self.ctx.events.emit(SwarmEvent::AgentRemoved { agent_id: agent_id.to_string() });
        Ok(agent)
    }

    pub fn agent(&self, agent_id: &str) -> Option<&Agent> {
        self.agents.get(agent_id)
    }

    pub fn agents(&self) -> Vec<Agent> {
        self.agents.values().cloned().collect()
    }

    pub fn set_malicious(&mut self, agent_id: &str, malicious: bool) -> SwarmResult<()> {
        let agent = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| SwarmError::UnknownAgent(agent_id.to_string()))?;
        agent.is_malicious = malicious;
        Ok(())
    }

    pub fn update_reputation(&mut self, agent_id: &str, reputation: f64) -> SwarmResult<()> {
        let agent = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| SwarmError::UnknownAgent(agent_id.to_string()))?;
        agent.reputation = reputation.clamp(0.0, 1.0);
        Ok(())
    }

    // ── fault arithmetic ────────────────────────────────────────

    fn active_count(&self) -> usize {
        self.state.active_agents.len()
    }

    fn malicious_active(&self) -> usize {
        self.state
            .active_agents
            .iter()
            .filter(|id| self.agents.get(*id).map(|a| a.is_malicious).unwrap_or(false))
            .count()
    }

    /// Faults the active set can absorb: `floor((n-1)/3)`
    pub fn fault_tolerance(&self) -> usize {
        self.active_count().saturating_sub(1) / 3
    }

    /// Prepare/commit quorum: `2f` matching messages from distinct agents
    pub fn quorum_size(&self) -> usize {
        (2 * self.fault_tolerance()).max(1)
    }

    fn view_change_quorum(&self) -> usize {
        2 * self.fault_tolerance() + 1
    }

    /// Smallest active set that keeps the safety bound
    pub fn required_agents(&self) -> usize {
        let membership_faults = self.agents.len().saturating_sub(1) / 3;
        3 * self.malicious_active().max(membership_faults) + 1
    }

    /// More than two thirds of the active agents are honest, and enough of the
    /// registered membership is reachable to tolerate its own fault budget
    pub fn can_reach_consensus(&self) -> bool {
        let n = self.active_count();
        n > 0 && n >= self.required_agents()
    }

    /// Round-robin over sorted active ids
    pub fn select_leader(&self, view: u64) -> Option<String> {
        let n = self.active_count();
        if n == 0 {
            return None;
        }
        self.state
            .active_agents
            .iter()
            .nth((view % n as u64) as usize)
            .cloned()
    }

    pub fn is_leader(&self) -> bool {
        self.state.leader.as_deref() == Some(self.local_id.as_str())
    }

    fn refresh_leader(&mut self) {
        let leader = self.select_leader(self.state.current_view);
        for agent in self.agents.values_mut() {
            agent.is_leader = leader.as_deref() == Some(agent.id.as_str());
        }
        self.state.leader = leader;
    }

    // ── three-phase flow ────────────────────────────────────────

    /// Leader entry point. `Ok(false)` when this replica is not the leader.
    pub fn start_consensus(&mut self, proposal: ConsensusProposal) -> SwarmResult<bool> {
        if !self.can_reach_consensus() {
            return Err(SwarmError::InsufficientAgents {
                active: self.active_count(),
                required: self.required_agents(),
            });
        }
        if !self.is_leader() {
            info!(
                "[{}] not leader for view {} (leader {:?}); not starting {}",
                self.local_id, self.state.current_view, self.state.leader, proposal.id
            );
            return Ok(false);
        }

        let now = self.ctx.clock.now();
        let sequence = self.state.sequence_number + 1;
        let view = self.state.current_view;
        let digest = proposal.hash.clone();
        let payload = serde_json::to_value(&proposal)?;

        self.state.sequence_number = sequence;
        self.state.phase = Phase::Prepare;
        self.state.proposals.insert(proposal.id.clone(), proposal.clone());
        self.accepted_sequences.insert((view, sequence), digest.clone());
        self.rounds.insert(
            digest.clone(),
            RoundProgress {
                sequence,
                view,
                phase: Phase::Prepare,
                pre_prepared: true,
                started_at: now,
                deadline: now + self.phase_timeout(),
            },
        );

        info!(
            "[{}] starting consensus on {} (view {}, seq {})",
            self.local_id, proposal.id, view, sequence
        );
        self.ctx.events.emit(SwarmEvent::ConsensusStarted {
            proposal_id: proposal.id.clone(),
            digest: digest.clone(),
            sequence,
            view,
        });
        self.broadcast(MessageType::PrePrepare, view, sequence, &digest, payload);
        Ok(true)
    }

    /// Feed one inbound message. Faults are absorbed, counted and emitted.
    pub fn process_message(&mut self, msg: ConsensusMessage) {
        if msg.sender_id == self.local_id {
            debug!("[{}] ignoring loopback {}", self.local_id, msg.kind.as_str());
            return;
        }
        match self.validate(&msg) {
            Validation::Accept => {}
            Validation::Drop => {
                debug!("[{}] dropped message from flagged agent {}", self.local_id, msg.sender_id);
                return;
            }
            Validation::Invalid(reason) => {
                self.record_invalid(&msg.sender_id, reason);
                return;
            }
        }

        self.metrics.messages_processed += 1;
        let now = self.ctx.clock.now();
        if let Some(agent) = self.agents.get_mut(&msg.sender_id) {
            agent.last_active_time = now;
        }

        match msg.kind {
            MessageType::PrePrepare => self.handle_pre_prepare(msg),
            MessageType::Prepare | MessageType::Commit => self.handle_vote(msg),
            MessageType::ViewChange => self.handle_view_change(msg),
            MessageType::NewView => self.handle_new_view(msg),
        }
    }

    fn validate(&self, msg: &ConsensusMessage) -> Validation {
        if msg.signature.is_empty() {
            return Validation::Invalid("missing signature".into());
        }
        let agent = match self.agents.get(&msg.sender_id) {
            Some(agent) => agent,
            None => return Validation::Invalid(format!("unknown sender {}", msg.sender_id)),
        };
        if !self.state.active_agents.contains(&msg.sender_id) {
            return Validation::Invalid(format!("sender {} is not active", msg.sender_id));
        }
        if agent.is_malicious {
            return Validation::Drop;
        }
        let skew = (self.ctx.clock.now() - msg.timestamp).num_seconds().unsigned_abs();
        if skew > self.config.message_tolerance_secs {
            return Validation::Invalid(format!("timestamp skew {}s outside tolerance", skew));
        }
        if !self
            .ctx
            .verifier
            .verify(&msg.signing_bytes(), &msg.signature, &agent.public_key)
        {
            return Validation::Invalid("signature verification failed".into());
        }
        Validation::Accept
    }

    fn record_invalid(&mut self, sender_id: &str, reason: String) {
        warn!("[{}] invalid message from {}: {}", self.local_id, sender_id, reason);
        self.metrics.faults_detected += 1;
        self.ctx.events.emit(SwarmEvent::InvalidMessage {
            sender_id: sender_id.to_string(),
            reason,
        });
    }

    fn record_malicious(&mut self, agent_id: &str, kind: &str, digest: &str) {
        warn!("[{}] malicious behavior by {}: {}", self.local_id, agent_id, kind);
        self.metrics.faults_detected += 1;
        self.ctx.events.emit(SwarmEvent::MaliciousBehavior {
            agent_id: agent_id.to_string(),
            kind: kind.to_string(),
            digest: digest.to_string(),
        });
    }

    fn handle_pre_prepare(&mut self, msg: ConsensusMessage) {
        if self.select_leader(msg.view_number).as_deref() != Some(msg.sender_id.as_str()) {
            self.record_malicious(&msg.sender_id, "unauthorized-pre-prepare", &msg.digest);
            return;
        }
        if msg.view_number != self.state.current_view {
            debug!(
                "[{}] pre-prepare for view {} while in view {}",
                self.local_id, msg.view_number, self.state.current_view
            );
            return;
        }
        let key = (msg.view_number, msg.sequence_number);
        if let Some(existing) = self.accepted_sequences.get(&key) {
            if existing != &msg.digest {
                self.record_malicious(&msg.sender_id, "conflicting-pre-prepare", &msg.digest);
            }
            return;
        }
        let proposal: ConsensusProposal = match serde_json::from_value(msg.payload.clone()) {
            Ok(p) => p,
            Err(e) => {
                self.record_invalid(&msg.sender_id, format!("unreadable proposal: {}", e));
                return;
            }
        };
        if proposal.hash != msg.digest || !proposal.verify_hash() {
            self.record_invalid(&msg.sender_id, "proposal digest mismatch".into());
            return;
        }

        let now = self.ctx.clock.now();
        let digest = msg.digest.clone();
        let (view, sequence) = key;
        self.accepted_sequences.insert(key, digest.clone());
        self.state.proposals.insert(proposal.id.clone(), proposal);
        self.state.sequence_number = self.state.sequence_number.max(sequence);
        self.state.phase = Phase::Prepare;
        let timeout = self.phase_timeout();
        let round = self.rounds.entry(digest.clone()).or_insert(RoundProgress {
            sequence,
            view,
            phase: Phase::PrePrepare,
            pre_prepared: false,
            started_at: now,
            deadline: now + timeout,
        });
        round.pre_prepared = true;
        round.phase = Phase::Prepare;
        round.sequence = sequence;
        round.view = view;
        self.log_message(msg);

        self.broadcast(MessageType::Prepare, view, sequence, &digest, json!({}));
        self.advance(&digest);
    }

    fn handle_vote(&mut self, msg: ConsensusMessage) {
        let digest = msg.digest.clone();
        if self.committed.contains_key(&digest) {
            return;
        }
        if !self.log_message(msg.clone()) {
            return;
        }
        if !self.rounds.contains_key(&digest) {
            // Votes may outrun the pre-prepare; hold a placeholder without a timer
            let now = self.ctx.clock.now();
            self.rounds.insert(
                digest.clone(),
                RoundProgress {
                    sequence: msg.sequence_number,
                    view: msg.view_number,
                    phase: Phase::PrePrepare,
                    pre_prepared: false,
                    started_at: now,
                    deadline: now + self.phase_timeout(),
                },
            );
        }
        self.advance(&digest);
    }

    /// Append to the per-digest log; false if this sender already sent this kind for this view
    fn log_message(&mut self, msg: ConsensusMessage) -> bool {
        let log = self.state.messages.entry(msg.digest.clone()).or_default();
        let duplicate = log.iter().any(|m| {
            m.sender_id == msg.sender_id && m.kind == msg.kind && m.view_number == msg.view_number
        });
        if duplicate {
            debug!(
                "[{}] duplicate {} from {} ignored",
                self.local_id,
                msg.kind.as_str(),
                msg.sender_id
            );
            return false;
        }
        log.push(msg);
        true
    }

    fn count_votes(&self, kind: MessageType, view: u64, digest: &str) -> usize {
        self.state
            .messages
            .get(digest)
            .map(|log| {
                log.iter()
                    .filter(|m| m.kind == kind && m.view_number == view)
                    .map(|m| m.sender_id.as_str())
                    .collect::<HashSet<_>>()
                    .len()
            })
            .unwrap_or(0)
    }

    fn advance(&mut self, digest: &str) {
        let quorum = self.quorum_size();
        let round = match self.rounds.get(digest) {
            Some(r) if r.pre_prepared => r.clone(),
            _ => return,
        };

        let mut phase = round.phase;
        if phase == Phase::Prepare && self.count_votes(MessageType::Prepare, round.view, digest) >= quorum {
            phase = Phase::Commit;
            self.set_round_phase(digest, phase);
            debug!("[{}] prepared {} (seq {})", self.local_id, digest, round.sequence);
            self.broadcast(MessageType::Commit, round.view, round.sequence, digest, json!({}));
        }
        if phase == Phase::Commit && self.count_votes(MessageType::Commit, round.view, digest) >= quorum {
            self.finish_round(digest, round);
        }
    }

    fn set_round_phase(&mut self, digest: &str, phase: Phase) {
        if let Some(r) = self.rounds.get_mut(digest) {
            r.phase = phase;
        }
        self.state.phase = phase;
    }

    fn finish_round(&mut self, digest: &str, round: RoundProgress) {
        self.rounds.remove(digest);
        self.state.messages.remove(digest);
        self.committed.insert(digest.to_string(), round.sequence);
        self.state.phase = Phase::Committed;
        self.last_committed = self.last_committed.max(round.sequence);
        self.update_performance(round.started_at, true);

        let proposal = self.state.proposals.values().find(|p| p.hash == digest).cloned();
        match proposal {
            Some(proposal) => {
                info!(
                    "[{}] consensus reached on {} (view {}, seq {})",
                    self.local_id, proposal.id, round.view, round.sequence
                );
                self.ctx.events.emit(SwarmEvent::ConsensusReached {
                    proposal,
                    sequence: round.sequence,
                    view: round.view,
                });
            }
            None => warn!("[{}] committed digest {} has no stored proposal", self.local_id, digest),
        }
        self.prune_history();
    }

    /// Forget decisions more than `committed_history` sequences behind `last_committed`
    fn prune_history(&mut self) {
        let floor = self.last_committed.saturating_sub(self.config.committed_history);
        if floor == 0 {
            return;
        }
        self.committed.retain(|_, seq| *seq > floor);
        self.accepted_sequences.retain(|(_, seq), _| *seq > floor);
        let committed = &self.committed;
        let rounds = &self.rounds;
        self.state
            .proposals
            .retain(|_, p| committed.contains_key(&p.hash) || rounds.contains_key(&p.hash));
    }

    fn update_performance(&mut self, started_at: DateTime<Utc>, success: bool) {
        let latency = (self.ctx.clock.now() - started_at).num_milliseconds().max(0) as f64;
        self.metrics.consensus_rounds += 1;
        self.total_latency_ms += latency;
        if success {
            self.successful_rounds += 1;
        }
        let rounds = self.metrics.consensus_rounds as f64;
        self.metrics.average_latency_ms = self.total_latency_ms / rounds;
        self.metrics.success_rate = self.successful_rounds as f64 / rounds;
    }

    fn broadcast(&mut self, kind: MessageType, view: u64, sequence: u64, digest: &str, payload: serde_json::Value) {
        let msg = ConsensusMessage::new(
            kind,
            view,
            sequence,
            digest,
            payload,
            self.local_id.clone(),
            self.ctx.clock.now(),
        )
        .signed(self.ctx.signer.as_ref());
        if matches!(kind, MessageType::Prepare | MessageType::Commit) {
            self.log_message(msg.clone());
        }
        self.ctx.broadcaster.broadcast(&msg);
        self.ctx.events.emit(SwarmEvent::MessageBroadcast(msg));
    }

    fn phase_timeout(&self) -> Duration {
        Duration::seconds(self.config.phase_timeout_secs as i64)
    }

    // ── view change ─────────────────────────────────────────────

    /// Move to the next view and ask the others to follow
    pub fn initiate_view_change(&mut self) {
        let new_view = self.state.current_view + 1;
        self.enter_view_change(new_view);
    }

    fn enter_view_change(&mut self, new_view: u64) {
        self.state.current_view = new_view;
        self.state.phase = Phase::ViewChange;
        self.refresh_leader();
        self.view_change_votes
            .entry(new_view)
            .or_default()
            .insert(self.local_id.clone());

        let message_log: Vec<serde_json::Value> = self
            .state
            .messages
            .iter()
            .map(|(digest, log)| json!({ "digest": digest, "messages": log.len() }))
            .collect();
        let payload = json!({
            "new_view": new_view,
            "last_committed": self.last_committed,
            "message_log": message_log,
        });

        info!(
            "[{}] view change to {} (leader {:?})",
            self.local_id, new_view, self.state.leader
        );
        self.ctx.events.emit(SwarmEvent::ViewChange {
            new_view,
            leader: self.state.leader.clone(),
        });
        let last = self.last_committed;
        self.broadcast(MessageType::ViewChange, new_view, last, "", payload);
        self.try_install_view(new_view);
    }

    fn handle_view_change(&mut self, msg: ConsensusMessage) {
        let target = msg.view_number;
        if target < self.state.current_view {
            debug!("[{}] stale view-change for {}", self.local_id, target);
            return;
        }
        let votes = {
            let set = self.view_change_votes.entry(target).or_default();
            set.insert(msg.sender_id.clone());
            set.len()
        };
        // f+1 replicas asking for a higher view means at least one honest one timed out
        if target > self.state.current_view && votes > self.fault_tolerance() {
            self.enter_view_change(target);
            return;
        }
        self.try_install_view(target);
    }

    fn try_install_view(&mut self, target: u64) {
        let votes = self.view_change_votes.get(&target).map(|s| s.len()).unwrap_or(0);
        if target == self.state.current_view
            && self.state.phase == Phase::ViewChange
            && votes >= self.view_change_quorum()
            && self.select_leader(target).as_deref() == Some(self.local_id.as_str())
        {
            let voters: Vec<String> = self
                .view_change_votes
                .get(&target)
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default();
            let last = self.last_committed;
            self.broadcast(MessageType::NewView, target, last, "", json!({ "view_changes": voters }));
            self.apply_new_view(target);
        }
    }

    fn handle_new_view(&mut self, msg: ConsensusMessage) {
        if self.select_leader(msg.view_number).as_deref() != Some(msg.sender_id.as_str()) {
            self.record_malicious(&msg.sender_id, "unauthorized-new-view", &msg.digest);
            return;
        }
        if msg.view_number < self.state.current_view {
            return;
        }
        self.apply_new_view(msg.view_number);
    }

    fn apply_new_view(&mut self, view: u64) {
        self.state.current_view = view;
        self.state.phase = Phase::PrePrepare;
        self.refresh_leader();
        self.view_change_votes.retain(|v, _| *v > view);

        // Uncommitted work from older views is abandoned
        let stale: Vec<String> = self
            .rounds
            .iter()
            .filter(|(_, r)| r.view < view)
            .map(|(d, _)| d.clone())
            .collect();
        for digest in stale {
            if let Some(round) = self.rounds.remove(&digest) {
                if round.pre_prepared {
                    self.update_performance(round.started_at, false);
                }
            }
        }
        let rounds = &self.rounds;
        self.state.messages.retain(|digest, _| rounds.contains_key(digest));
        self.prune_history();

        let leader = self.state.leader.clone().unwrap_or_default();
        info!("[{}] installed view {} (leader {})", self.local_id, view, leader);
        self.ctx.events.emit(SwarmEvent::NewView { view, leader });
    }

    // ── timers ──────────────────────────────────────────────────

    /// Abandon rounds past their deadline; returns how many expired
    pub fn check_timeouts(&mut self) -> usize {
        let now = self.ctx.clock.now();
        let expired: Vec<String> = self
            .rounds
            .iter()
            .filter(|(_, r)| r.pre_prepared && now >= r.deadline)
            .map(|(d, _)| d.clone())
            .collect();
        // Placeholders that never saw a pre-prepare just lapse
        self.rounds.retain(|_, r| r.pre_prepared || now < r.deadline);

        for digest in &expired {
            if let Some(round) = self.rounds.remove(digest) {
                warn!(
                    "[{}] round {} timed out in {:?} (seq {})",
                    self.local_id, digest, round.phase, round.sequence
                );
                self.update_performance(round.started_at, false);
                self.ctx.events.emit(SwarmEvent::ConsensusTimeout {
                    digest: digest.clone(),
                    sequence: round.sequence,
                    view: round.view,
                });
            }
        }
        if !expired.is_empty() && self.state.phase != Phase::ViewChange {
            self.initiate_view_change();
        }
        expired.len()
    }

    // ── partitions ──────────────────────────────────────────────

    /// Take agents out of the active set without deregistering them
    pub fn simulate_partition(&mut self, agent_ids: &[String]) {
        let affected: Vec<String> = agent_ids
            .iter()
            .filter(|id| self.state.active_agents.remove(*id))
            .cloned()
            .collect();
        self.purge_votes_of(&affected);
        self.refresh_leader();
        warn!(
            "[{}] network partition isolated {:?}; {} active, consensus possible: {}",
            self.local_id,
            affected,
            self.active_count(),
            self.can_reach_consensus()
        );
        self.ctx.events.emit(SwarmEvent::NetworkPartition { agent_ids: affected });
    }

    pub fn heal_partition(&mut self, agent_ids: &[String]) {
        let healed: Vec<String> = agent_ids
            .iter()
            .filter(|id| self.agents.contains_key(*id))
            .filter(|id| self.state.active_agents.insert((*id).clone()))
            .cloned()
            .collect();
        self.refresh_leader();
        info!("[{}] partition healed for {:?}", self.local_id, healed);
        self.ctx.events.emit(SwarmEvent::NetworkHealed { agent_ids: healed });
    }

    fn purge_votes_of(&mut self, agent_ids: &[String]) {
        for votes in self.view_change_votes.values_mut() {
            for id in agent_ids {
                votes.remove(id);
            }
        }
    }

    // ── inspection & cleanup ────────────────────────────────────

    pub fn get_state(&self) -> ConsensusState {
        self.state.clone()
    }

    pub fn get_performance_metrics(&self) -> PerformanceMetrics {
        self.metrics.clone()
    }

    pub fn pending_rounds(&self) -> usize {
        self.rounds.values().filter(|r| r.pre_prepared).count()
    }

    pub fn is_committed(&self, digest: &str) -> bool {
        self.committed.contains_key(digest)
    }

    /// Drop all in-flight work; registrations and view survive
    pub fn emergency_stop(&mut self) {
        let pending = self.rounds.len();
        self.rounds.clear();
        self.accepted_sequences.clear();
        self.view_change_votes.clear();
        self.state.messages.clear();
        self.state.proposals.clear();
        self.state.phase = Phase::PrePrepare;
        warn!("[{}] emergency stop, cancelled {} rounds", self.local_id, pending);
        self.ctx.events.emit(SwarmEvent::EmergencyStop {
            component: "byzantine-consensus".into(),
        });
    }
}
