//! Spatial proposals, votes, agent state and conflicts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Point in swarm space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2)).sqrt()
    }

    pub fn offset(&self, dx: f64, dy: f64, dz: f64) -> Position {
        Position::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

/// A resource an agent currently holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceGrant {
    pub amount: f64,
    /// Exclusive grants cannot be shared with another holder
    pub exclusive: bool,
}

/// What the spatial layer knows about one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialAgentState {
    pub agent_id: String,
    pub position: Position,
    /// Higher wins when a conflict forces someone to yield
    pub priority: u32,
    pub resources: BTreeMap<String, ResourceGrant>,
    pub zones: BTreeSet<String>,
    pub collaborators: BTreeSet<String>,
    /// Set by temporal separation; the agent should hold off until then
    pub next_action_at: Option<DateTime<Utc>>,
}

impl SpatialAgentState {
    pub fn new(agent_id: impl Into<String>, position: Position, priority: u32) -> Self {
        Self {
            agent_id: agent_id.into(),
            position,
            priority,
            resources: BTreeMap::new(),
            zones: BTreeSet::new(),
            collaborators: BTreeSet::new(),
            next_action_at: None,
        }
    }
}

/// Region a proposal needs to occupy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialRequirement {
    pub center: Position,
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub resource_type: String,
    pub amount: f64,
    pub exclusive: bool,
}

/// The domain action a spatial proposal asks the swarm to approve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpatialProposalKind {
    LocationChange { agent_id: String, target: Position },
    ResourceAllocation { agent_id: String, resource_type: String, amount: f64, exclusive: bool },
    ZoneAccess { agent_id: String, zone_id: String, duration_secs: u64 },
    CollaborationRequest { agent_id: String, partners: Vec<String>, task: String },
}

impl SpatialProposalKind {
    pub fn name(&self) -> &'static str {
        match self {
            SpatialProposalKind::LocationChange { .. } => "location_change",
            SpatialProposalKind::ResourceAllocation { .. } => "resource_allocation",
            SpatialProposalKind::ZoneAccess { .. } => "zone_access",
            SpatialProposalKind::CollaborationRequest { .. } => "collaboration_request",
        }
    }

    /// Agent the proposal acts for
    pub fn subject(&self) -> &str {
        match self {
            SpatialProposalKind::LocationChange { agent_id, .. }
            | SpatialProposalKind::ResourceAllocation { agent_id, .. }
            | SpatialProposalKind::ZoneAccess { agent_id, .. }
            | SpatialProposalKind::CollaborationRequest { agent_id, .. } => agent_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialConsensusProposal {
    pub id: String,
    pub proposer_id: String,
    pub kind: SpatialProposalKind,
    pub spatial_requirements: Vec<SpatialRequirement>,
    pub resource_requirements: Vec<ResourceRequirement>,
    pub created_at: DateTime<Utc>,
    pub consensus_deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteDecision {
    Accept,
    Reject,
    Abstain,
    Conditional,
}

impl VoteDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteDecision::Accept => "accept",
            VoteDecision::Reject => "reject",
            VoteDecision::Abstain => "abstain",
            VoteDecision::Conditional => "conditional",
        }
    }

    pub fn approves(&self) -> bool {
        matches!(self, VoteDecision::Accept | VoteDecision::Conditional)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialConsensusVote {
    pub proposal_id: String,
    pub voter_id: String,
    pub decision: VoteDecision,
    pub reasoning: String,
    pub conditions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
}

/// Outcome of the domain-level vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialDecision {
    pub proposal_id: String,
    pub approved: bool,
    pub approvals: usize,
    pub rejections: usize,
    pub abstentions: usize,
    /// Conditions attached by conditional approvals, deduplicated
    pub conditions: Vec<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    LocationOverlap,
    ResourceContention,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::LocationOverlap => "location_overlap",
            ConflictType::ResourceContention => "resource_contention",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialConflict {
    pub id: String,
    pub conflict_type: ConflictType,
    pub agents: Vec<String>,
    /// Contended resource for `ResourceContention`
    pub resource_type: Option<String>,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    Avoidance,
    TemporalSeparation,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::Avoidance => "avoidance",
            ResolutionStrategy::TemporalSeparation => "temporal_separation",
        }
    }
}

/// Change applied to one agent while resolving a conflict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub agent_id: String,
    pub new_position: Option<Position>,
    pub released_resource: Option<String>,
    pub delay_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub conflict_id: String,
    pub strategy: ResolutionStrategy,
    pub adjustments: Vec<Adjustment>,
}
