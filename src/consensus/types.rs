//! Protocol data: agents, proposals, messages and engine state

use crate::crypto::{sha256_hex, Signer};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A swarm member known to a consensus engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    /// Hex public key used to check the agent's message signatures
    pub public_key: String,
    pub is_leader: bool,
    /// Flagged agents are excluded from message processing
    pub is_malicious: bool,
    /// Reputation in [0, 1]
    pub reputation: f64,
    pub last_active_time: DateTime<Utc>,
}

impl Agent {
    pub fn new(id: impl Into<String>, public_key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            public_key: public_key.into(),
            is_leader: false,
            is_malicious: false,
            reputation: 0.5,
            last_active_time: now,
        }
    }

    pub fn malicious(mut self) -> Self {
        self.is_malicious = true;
        self
    }

    pub fn with_reputation(mut self, reputation: f64) -> Self {
        self.reputation = reputation.clamp(0.0, 1.0);
        self
    }
}

/// An immutable proposal, correlated across phases by its hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusProposal {
    pub id: String,
    pub content: serde_json::Value,
    pub proposer_id: String,
    pub timestamp: DateTime<Utc>,
    pub hash: String,
}

impl ConsensusProposal {
    pub fn new(content: serde_json::Value, proposer_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let proposer_id = proposer_id.into();
        let hash = Self::compute_hash(&id, &content, &proposer_id, timestamp);
        Self {
            id,
            content,
            proposer_id,
            timestamp,
            hash,
        }
    }

    pub fn compute_hash(id: &str, content: &serde_json::Value, proposer_id: &str, timestamp: DateTime<Utc>) -> String {
        sha256_hex(&[
            id.as_bytes(),
            content.to_string().as_bytes(),
            proposer_id.as_bytes(),
            &timestamp.timestamp_millis().to_le_bytes(),
        ])
    }

    /// True when `hash` matches the proposal body
    pub fn verify_hash(&self) -> bool {
        Self::compute_hash(&self.id, &self.content, &self.proposer_id, self.timestamp) == self.hash
    }
}

/// Protocol message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    PrePrepare,
    Prepare,
    Commit,
    ViewChange,
    NewView,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::PrePrepare => "pre-prepare",
            MessageType::Prepare => "prepare",
            MessageType::Commit => "commit",
            MessageType::ViewChange => "view-change",
            MessageType::NewView => "new-view",
        }
    }
}

/// A transient protocol unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub view_number: u64,
    pub sequence_number: u64,
    pub digest: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    /// Hex signature over `signing_bytes`; empty means unsigned
    pub signature: String,
    pub sender_id: String,
}

impl ConsensusMessage {
    pub fn new(
        kind: MessageType,
        view_number: u64,
        sequence_number: u64,
        digest: impl Into<String>,
        payload: serde_json::Value,
        sender_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            view_number,
            sequence_number,
            digest: digest.into(),
            payload,
            timestamp,
            signature: String::new(),
            sender_id: sender_id.into(),
        }
    }

    /// Canonical bytes covered by the signature
    pub fn signing_bytes(&self) -> Vec<u8> {
        let payload_hash = sha256_hex(&[self.payload.to_string().as_bytes()]);
        format!(
            "{}:{}:{}:{}:{}:{}:{}",
            self.kind.as_str(),
            self.view_number,
            self.sequence_number,
            self.digest,
            payload_hash,
            self.sender_id,
            self.timestamp.timestamp_millis()
        )
        .into_bytes()
    }

    pub fn signed(mut self, signer: &dyn Signer) -> Self {
        self.signature = signer.sign(&self.signing_bytes());
        self
    }
}

/// Where the engine is in the three-phase flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    PrePrepare,
    Prepare,
    Commit,
    Committed,
    ViewChange,
}

/// Snapshot of an engine; always a copy, never a live view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusState {
    pub current_view: u64,
    pub sequence_number: u64,
    pub phase: Phase,
    pub leader: Option<String>,
    pub active_agents: BTreeSet<String>,
    pub proposals: HashMap<String, ConsensusProposal>,
    /// Digest -> messages in arrival order
    pub messages: HashMap<String, Vec<ConsensusMessage>>,
}

impl Default for ConsensusState {
    fn default() -> Self {
        Self {
            current_view: 0,
            sequence_number: 0,
            phase: Phase::PrePrepare,
            leader: None,
            active_agents: BTreeSet::new(),
            proposals: HashMap::new(),
            messages: HashMap::new(),
        }
    }
}

/// Engine performance counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Number of finished rounds (successful or not)
    pub consensus_rounds: u64,
    pub average_latency_ms: f64,
    pub success_rate: f64,
    /// Invalid or malicious message events
    pub faults_detected: u64,
    pub messages_processed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Ed25519Signer, Ed25519Verifier, SignatureVerifier};
    use serde_json::json;

    #[test]
    fn test_proposal_hash_binds_content() {
        let now = Utc::now();
        let mut p = ConsensusProposal::new(json!({"op": "move"}), "agent-0", now);
        assert!(p.verify_hash());
        p.content = json!({"op": "teleport"});
        assert!(!p.verify_hash());
    }

    #[test]
    fn test_message_signature_covers_payload() {
        let signer = Ed25519Signer::from_seed([3u8; 32]);
        let msg = ConsensusMessage::new(
            MessageType::Prepare,
            0,
            1,
            "digest",
            json!({"x": 1}),
            "agent-1",
            Utc::now(),
        )
        .signed(&signer);
        assert!(Ed25519Verifier.verify(&msg.signing_bytes(), &msg.signature, &signer.public_key()));

        let mut tampered = msg.clone();
        tampered.payload = json!({"x": 2});
        assert!(!Ed25519Verifier.verify(&tampered.signing_bytes(), &tampered.signature, &signer.public_key()));
    }

    #[test]
    fn test_message_type_wire_names() {
        let v = serde_json::to_value(MessageType::PrePrepare).unwrap();
        assert_eq!(v, "pre-prepare");
        assert_eq!(MessageType::ViewChange.as_str(), "view-change");
    }
}
