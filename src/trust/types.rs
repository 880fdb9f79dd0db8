//! Trust ledger records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertionStatus {
    Pending,
    Verified,
    Disputed,
    Expired,
    Revoked,
}

/// Supporting material attached to an assertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustEvidence {
    pub kind: String,
    pub description: String,
    /// Whether a third party can check it independently
    pub verifiable: bool,
}

impl TrustEvidence {
    pub fn new(kind: impl Into<String>, description: impl Into<String>, verifiable: bool) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
            verifiable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationResult {
    Confirmed,
    Denied,
    Inconclusive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustVerification {
    pub verifier_id: String,
    pub result: VerificationResult,
    pub confidence: f64,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
    pub signature: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisputeDecision {
    /// The dispute stands against the assertion
    Upheld,
    Rejected,
    Partial,
}

impl DisputeDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeDecision::Upheld => "upheld",
            DisputeDecision::Rejected => "rejected",
            DisputeDecision::Partial => "partial",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisputeResolution {
    pub decision: DisputeDecision,
    pub new_trust_level: Option<f64>,
    pub reason: String,
    pub arbitrators: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustDispute {
    pub id: String,
    pub disputer_id: String,
    pub reason: String,
    pub evidence: Vec<TrustEvidence>,
    pub submitted_at: DateTime<Utc>,
    /// When the resolver runs; cleared by an emergency stop
    pub resolve_after: Option<DateTime<Utc>>,
    /// Status of the assertion before this dispute
    pub prior_status: AssertionStatus,
    pub resolution: Option<DisputeResolution>,
}

/// Directed trust edge `from_agent → to_agent`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustAssertion {
    pub id: String,
    pub from_agent: String,
    pub to_agent: String,
    /// Level at creation, in [0, 1]
    pub trust_level: f64,
    pub trust_domains: Vec<String>,
    pub evidence: Vec<TrustEvidence>,
    pub confidence: f64,
    /// Fractional loss per day of age
    pub decay_rate: f64,
    pub status: AssertionStatus,
    pub created_at: DateTime<Utc>,
    pub verification_deadline: DateTime<Utc>,
    pub requested_verifiers: Vec<String>,
    pub verifications: Vec<TrustVerification>,
    pub disputes: Vec<TrustDispute>,
    pub signature: String,
}

impl TrustAssertion {
    /// `trust_level × (1 - decay_rate)^age_days`
    pub fn effective_trust(&self, now: DateTime<Utc>) -> f64 {
        let age_days = ((now - self.created_at).num_milliseconds().max(0) as f64) / 86_400_000.0;
        self.trust_level * (1.0 - self.decay_rate).powf(age_days)
    }

    /// Covers every requested domain (an empty request matches anything)
    pub fn covers(&self, domains: &[String]) -> bool {
        domains.iter().all(|d| self.trust_domains.contains(d))
    }

    /// Bytes covered by the ledger signature
    pub fn signing_bytes(&self) -> Vec<u8> {
        format!(
            "{}:{}:{}:{:.6}:{}:{}",
            self.id,
            self.from_agent,
            self.to_agent,
            self.trust_level,
            self.trust_domains.join(","),
            self.created_at.timestamp_millis()
        )
        .into_bytes()
    }
}

/// Weakest edge along a path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeakLink {
    pub from: String,
    pub to: String,
    pub trust: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustPath {
    /// Agents from source to target, inclusive
    pub agents: Vec<String>,
    pub assertion_ids: Vec<String>,
    pub trust: f64,
    pub confidence: f64,
    pub weakest_link: WeakLink,
    pub computed_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

impl TrustPath {
    pub fn hops(&self) -> usize {
        self.assertion_ids.len()
    }
}

/// Answer of `compute_trust`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustComputation {
    pub from: String,
    pub to: String,
    pub trust: f64,
    pub confidence: f64,
    /// Set when a direct verified assertion was used
    pub direct_assertion: Option<String>,
    pub path: Option<TrustPath>,
}

/// Signed answer to an oracle query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleResponse {
    pub query_from: String,
    pub query_to: String,
    pub domains: Vec<String>,
    pub trust: f64,
    pub confidence: f64,
    pub path_length: usize,
    pub responder_public_key: String,
    pub timestamp: DateTime<Utc>,
    pub signature: String,
}

impl OracleResponse {
    pub fn signing_bytes(&self) -> Vec<u8> {
        format!(
            "{}:{}:{}:{:.6}:{:.6}:{}:{}",
            self.query_from,
            self.query_to,
            self.domains.join(","),
            self.trust,
            self.confidence,
            self.path_length,
            self.timestamp.timestamp_millis()
        )
        .into_bytes()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    pub agents: usize,
    pub assertions: usize,
    pub verified_assertions: usize,
    /// `assertions / (n × (n - 1))`
    pub density: f64,
    pub average_path_length: f64,
    pub reachable_pairs: usize,
    /// Assertion trust levels in ten equal buckets over [0, 1]
    pub trust_histogram: [usize; 10],
    pub computed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn assertion(level: f64, decay: f64, created_at: DateTime<Utc>) -> TrustAssertion {
        TrustAssertion {
            id: "a1".into(),
            from_agent: "A".into(),
            to_agent: "B".into(),
            trust_level: level,
            trust_domains: vec!["navigation".into(), "sensing".into()],
            evidence: vec![],
            confidence: 0.5,
            decay_rate: decay,
            status: AssertionStatus::Verified,
            created_at,
            verification_deadline: created_at,
            requested_verifiers: vec![],
            verifications: vec![],
            disputes: vec![],
            signature: String::new(),
        }
    }

    #[test]
    fn test_decay_after_thirty_days() {
        let t0 = Utc::now();
        let a = assertion(0.8, 0.01, t0);
        let trust = a.effective_trust(t0 + Duration::days(30));
        assert!((trust - 0.8 * 0.99f64.powi(30)).abs() < 1e-9);
        assert!((trust - 0.592).abs() < 1e-3);
    }

    #[test]
    fn test_domain_cover_requires_all() {
        let a = assertion(0.5, 0.0, Utc::now());
        assert!(a.covers(&[]));
        assert!(a.covers(&["navigation".into()]));
        assert!(!a.covers(&["navigation".into(), "finance".into()]));
    }
}
