//! Dispute arbitration seam

use super::types::{DisputeDecision, DisputeResolution, TrustAssertion, TrustDispute};
use chrono::{DateTime, Utc};

/// Decides disputes once their timeout elapses
pub trait DisputeArbitrator: Send + Sync {
    fn arbitrate(&self, assertion: &TrustAssertion, dispute: &TrustDispute, now: DateTime<Utc>) -> DisputeResolution;
}

/// Upholds every dispute without proposing a new trust level
#[derive(Debug, Default, Clone, Copy)]
pub struct UpholdingArbitrator;

impl DisputeArbitrator for UpholdingArbitrator {
    fn arbitrate(&self, _assertion: &TrustAssertion, dispute: &TrustDispute, now: DateTime<Utc>) -> DisputeResolution {
        DisputeResolution {
            decision: DisputeDecision::Upheld,
            new_trust_level: None,
            reason: format!("dispute unanswered: {}", dispute.reason),
            arbitrators: Vec::new(),
            timestamp: now,
        }
    }
}
