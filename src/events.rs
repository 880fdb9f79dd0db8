//! Event fan-out: the observable surface of every component
//!
//! Components never call back into their observers. They push `SwarmEvent`s
//! into an `EventBus`, which forwards a copy to every live subscriber channel.
//! Event names are a public contract consumed by monitoring and the CLI.

use crate::consensus::{ConsensusMessage, ConsensusProposal};
use log::debug;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything a component can announce
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum SwarmEvent {
    // Byzantine engine
    #[serde(rename = "consensus-started")]
    ConsensusStarted { proposal_id: String, digest: String, sequence: u64, view: u64 },
    #[serde(rename = "message-broadcast")]
    MessageBroadcast(ConsensusMessage),
    #[serde(rename = "consensus-reached")]
    ConsensusReached { proposal: ConsensusProposal, sequence: u64, view: u64 },
    #[serde(rename = "consensus-timeout")]
    ConsensusTimeout { digest: String, sequence: u64, view: u64 },
    #[serde(rename = "malicious-behavior")]
    MaliciousBehavior { agent_id: String, kind: String, digest: String },
    #[serde(rename = "invalid-message")]
    InvalidMessage { sender_id: String, reason: String },
    #[serde(rename = "view-change")]
    ViewChange { new_view: u64, leader: Option<String> },
    #[serde(rename = "new-view")]
    NewView { view: u64, leader: String },
    #[serde(rename = "agent-registered")]
    AgentRegistered { agent_id: String },
    #[serde(rename = "agent-removed")]
    AgentRemoved { agent_id: String },
    #[serde(rename = "network-partition")]
    NetworkPartition { agent_ids: Vec<String> },
    #[serde(rename = "network-healed")]
    NetworkHealed { agent_ids: Vec<String> },
    #[serde(rename = "emergency-stop")]
    EmergencyStop { component: String },

    // Spatial layer
    #[serde(rename = "spatial-proposal-created")]
    SpatialProposalCreated { proposal_id: String, kind: String },
    #[serde(rename = "spatial-vote-cast")]
    SpatialVoteCast { proposal_id: String, voter_id: String, decision: String },
    #[serde(rename = "spatial-consensus-reached")]
    SpatialConsensusReached {
        proposal_id: String,
        approved: bool,
        approvals: usize,
        rejections: usize,
        conditions: Vec<String>,
    },
    #[serde(rename = "spatial-conflict-detected")]
    SpatialConflictDetected { conflict_id: String, conflict_type: String, agents: Vec<String> },
    #[serde(rename = "spatial-conflict-resolved")]
    SpatialConflictResolved { conflict_id: String, strategy: String, adjusted_agents: Vec<String> },

    // Malicious-agent detection
    #[serde(rename = "detection-initiated")]
    DetectionInitiated { consensus_id: String, target_agent_id: String, eligible_voters: usize },
    #[serde(rename = "evidence-submitted")]
    EvidenceSubmitted { consensus_id: String, evidence_id: String, verified: bool },
    #[serde(rename = "detection-vote-submitted")]
    DetectionVoteSubmitted { consensus_id: String, voter_id: String, round: u8 },
    #[serde(rename = "round1-votes-revealed")]
    Round1VotesRevealed { consensus_id: String, revealed: usize },
    #[serde(rename = "round-completed")]
    RoundCompleted {
        consensus_id: String,
        round: u8,
        result: String,
        confidence: f64,
        participation: f64,
    },
    #[serde(rename = "round-failed")]
    RoundFailed { consensus_id: String, round: u8, participation: f64 },
    #[serde(rename = "round-skipped")]
    RoundSkipped { consensus_id: String, round: u8 },
    #[serde(rename = "detection-consensus-reached")]
    DetectionConsensusReached {
        consensus_id: String,
        target_agent_id: String,
        decision: String,
        consensus_hash: String,
    },
    #[serde(rename = "detection-consensus-failed")]
    DetectionConsensusFailed { consensus_id: String, target_agent_id: String, reason: String },

    // Trust ledger
    #[serde(rename = "trust_assertion_submitted")]
    TrustAssertionSubmitted { assertion_id: String, from_agent: String, to_agent: String, trust_level: f64 },
    #[serde(rename = "trust_verification_requested")]
    TrustVerificationRequested { assertion_id: String, verifiers: Vec<String> },
    #[serde(rename = "trust_assertion_verified")]
    TrustAssertionVerified { assertion_id: String, consensus_ratio: f64 },
    #[serde(rename = "trust_assertion_disputed")]
    TrustAssertionDisputed { assertion_id: String, reason: String },
    #[serde(rename = "trust_assertion_expired")]
    TrustAssertionExpired { assertion_id: String },
    #[serde(rename = "trust_assertion_revoked")]
    TrustAssertionRevoked { assertion_id: String },
    #[serde(rename = "trust_dispute_submitted")]
    TrustDisputeSubmitted { assertion_id: String, dispute_id: String },
    #[serde(rename = "trust_dispute_resolved")]
    TrustDisputeResolved { assertion_id: String, dispute_id: String, decision: String },
    #[serde(rename = "zk_proof_created")]
    ZkProofCreated { proof_id: String, agent_id: String },
    #[serde(rename = "zk_proof_verified")]
    ZkProofVerified { proof_id: String, verifiers: usize },
    #[serde(rename = "trust_network_metrics_updated")]
    TrustNetworkMetricsUpdated { agents: usize, assertions: usize, density: f64 },

    // Replicated memory
    #[serde(rename = "memory-operation-applied")]
    MemoryOperationApplied { key: String, namespace: String, operation: String },
    #[serde(rename = "memory-conflict")]
    MemoryConflict { key: String, namespace: String, resolution: String },
    #[serde(rename = "memory-sync-completed")]
    MemorySyncCompleted { delta_id: String, source_agent: String, applied: usize },
    #[serde(rename = "memory-sync-failed")]
    MemorySyncFailed { delta_id: String, source_agent: String, reason: String },
    #[serde(rename = "topology-changed")]
    TopologyChanged { from: String, to: String },
    #[serde(rename = "shards-rebalanced")]
    ShardsRebalanced { nodes: usize, shards: u32 },
}

impl SwarmEvent {
    /// The contract name of this event
    pub fn name(&self) -> &'static str {
        use SwarmEvent::*;
        match self {
            ConsensusStarted { .. } => "consensus-started",
            MessageBroadcast(_) => "message-broadcast",
            ConsensusReached { .. } => "consensus-reached",
            ConsensusTimeout { .. } => "consensus-timeout",
            MaliciousBehavior { .. } => "malicious-behavior",
            InvalidMessage { .. } => "invalid-message",
            ViewChange { .. } => "view-change",
            NewView { .. } => "new-view",
            AgentRegistered { .. } => "agent-registered",
            AgentRemoved { .. } => "agent-removed",
            NetworkPartition { .. } => "network-partition",
            NetworkHealed { .. } => "network-healed",
            EmergencyStop { .. } => "emergency-stop",
            SpatialProposalCreated { .. } => "spatial-proposal-created",
            SpatialVoteCast { .. } => "spatial-vote-cast",
            SpatialConsensusReached { .. } => "spatial-consensus-reached",
            SpatialConflictDetected { .. } => "spatial-conflict-detected",
            SpatialConflictResolved { .. } => "spatial-conflict-resolved",
            DetectionInitiated { .. } => "detection-initiated",
            EvidenceSubmitted { .. } => "evidence-submitted",
            DetectionVoteSubmitted { .. } => "detection-vote-submitted",
            Round1VotesRevealed { .. } => "round1-votes-revealed",
            RoundCompleted { .. } => "round-completed",
            RoundFailed { .. } => "round-failed",
            RoundSkipped { .. } => "round-skipped",
            DetectionConsensusReached { .. } => "detection-consensus-reached",
            DetectionConsensusFailed { .. } => "detection-consensus-failed",
            TrustAssertionSubmitted { .. } => "trust_assertion_submitted",
            TrustVerificationRequested { .. } => "trust_verification_requested",
            TrustAssertionVerified { .. } => "trust_assertion_verified",
            TrustAssertionDisputed { .. } => "trust_assertion_disputed",
            TrustAssertionExpired { .. } => "trust_assertion_expired",
            TrustAssertionRevoked { .. } => "trust_assertion_revoked",
            TrustDisputeSubmitted { .. } => "trust_dispute_submitted",
            TrustDisputeResolved { .. } => "trust_dispute_resolved",
            ZkProofCreated { .. } => "zk_proof_created",
            ZkProofVerified { .. } => "zk_proof_verified",
            TrustNetworkMetricsUpdated { .. } => "trust_network_metrics_updated",
            MemoryOperationApplied { .. } => "memory-operation-applied",
            MemoryConflict { .. } => "memory-conflict",
            MemorySyncCompleted { .. } => "memory-sync-completed",
            MemorySyncFailed { .. } => "memory-sync-failed",
            TopologyChanged { .. } => "topology-changed",
            ShardsRebalanced { .. } => "shards-rebalanced",
        }
    }
}

/// Cloneable publisher; every clone feeds the same subscriber set
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<SwarmEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SwarmEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn emit(&self, event: SwarmEvent) {
        debug!("event {}", event.name());
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Drain everything currently queued on a receiver
pub fn drain(rx: &mut mpsc::UnboundedReceiver<SwarmEvent>) -> Vec<SwarmEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_to_all_subscribers() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.emit(SwarmEvent::AgentRegistered { agent_id: "agent-0".into() });

        assert_eq!(drain(&mut a).len(), 1);
        let got = drain(&mut b);
        assert_eq!(got[0].name(), "agent-registered");
    }

    #[test]
    fn test_closed_subscribers_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let _keep = bus.subscribe();
        drop(rx);
        bus.emit(SwarmEvent::EmergencyStop { component: "test".into() });
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_serialized_name_matches_contract() {
        let event = SwarmEvent::TrustAssertionVerified {
            assertion_id: "a-1".into(),
            consensus_ratio: 1.0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
        assert_eq!(json["payload"]["assertion_id"], "a-1");
    }
}
