//! Threshold signatures
//!
//! A dealer generates a fresh Ed25519 seed for the group and splits it with
//! Shamir so that each participant holds one share. Signing succeeds only when
//! at least `threshold` distinct share holders contribute; the reconstructed
//! key signs once and is dropped. The group public key verifies the result.

use super::shamir::{self, Share};
use super::signer::{Ed25519Signer, Ed25519Verifier, SignatureVerifier, Signer};
use crate::error::{SwarmError, SwarmResult};
use log::debug;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A participant's share of the group signing key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyShare {
    pub participant_id: String,
    pub share: Share,
}

/// Signature produced collaboratively by at least `threshold` participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSignature {
    pub signature: String,
    pub group_public_key: String,
    pub signers: Vec<String>,
    pub threshold: usize,
}

/// Shares of one group key, indexed by participant
#[derive(Debug, Clone)]
pub struct ThresholdKeySet {
    group_public_key: String,
    threshold: usize,
    shares: HashMap<String, KeyShare>,
}

impl ThresholdKeySet {
    /// Deal a new group key to `participants`
    pub fn deal(participants: &[String], threshold: usize) -> SwarmResult<Self> {
        let unique: BTreeSet<&String> = participants.iter().collect();
        if unique.len() != participants.len() {
            return Err(SwarmError::Crypto("duplicate threshold participants".into()));
        }

        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        let group_public_key = Ed25519Signer::from_seed(seed).public_key();

        let dealt = shamir::split(&seed, threshold, participants.len())?;
        let shares = participants
            .iter()
            .cloned()
            .zip(dealt)
            .map(|(participant_id, share)| {
                (participant_id.clone(), KeyShare { participant_id, share })
            })
            .collect();

        debug!(
            "Dealt {}-of-{} threshold key {}",
            threshold,
            participants.len(),
            &group_public_key[..16]
        );

        Ok(Self {
            group_public_key,
            threshold,
            shares,
        })
    }

    pub fn group_public_key(&self) -> &str {
        &self.group_public_key
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn share_for(&self, participant_id: &str) -> Option<&KeyShare> {
        self.shares.get(participant_id)
    }

    /// Sign `message` with the shares of `signers`; unknown or repeated signers are ignored
    pub fn sign(&self, signers: &[String], message: &[u8]) -> SwarmResult<ThresholdSignature> {
        let contributing: BTreeSet<&String> = signers
            .iter()
            .filter(|s| self.shares.contains_key(s.as_str()))
            .collect();
        if contributing.len() < self.threshold {
            return Err(SwarmError::InsufficientShares {
                have: contributing.len(),
                need: self.threshold,
            });
        }

        let shares: Vec<Share> = contributing
            .iter()
            .take(self.threshold)
            .filter_map(|id| self.shares.get(id.as_str()))
            .map(|ks| ks.share.clone())
            .collect();
        let secret = shamir::combine(&shares)?;
        let seed: [u8; 32] = secret
            .try_into()
            .map_err(|_| SwarmError::Crypto("reconstructed seed has wrong length".into()))?;
        let group_signer = Ed25519Signer::from_seed(seed);
        if group_signer.public_key() != self.group_public_key {
            return Err(SwarmError::Crypto("reconstructed key does not match group key".into()));
        }

        Ok(ThresholdSignature {
            signature: group_signer.sign(message),
            group_public_key: self.group_public_key.clone(),
            signers: contributing.into_iter().cloned().collect(),
            threshold: self.threshold,
        })
    }
}

/// Check the group signature and that enough distinct signers took part
pub fn verify_threshold_signature(sig: &ThresholdSignature, message: &[u8]) -> bool {
    let distinct: BTreeSet<&String> = sig.signers.iter().collect();
    distinct.len() >= sig.threshold
        && Ed25519Verifier.verify(message, &sig.signature, &sig.group_public_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("voter-{}", i)).collect()
    }

    #[test]
    fn test_threshold_sign_and_verify() {
        let participants = ids(6);
        let keys = ThresholdKeySet::deal(&participants, 4).unwrap();
        let sig = keys.sign(&participants[1..5], b"consensus-hash").unwrap();
        assert_eq!(sig.signers.len(), 4);
        assert!(verify_threshold_signature(&sig, b"consensus-hash"));
        assert!(!verify_threshold_signature(&sig, b"other-hash"));
    }

    #[test]
    fn test_below_threshold_fails() {
        let participants = ids(6);
        let keys = ThresholdKeySet::deal(&participants, 4).unwrap();
        let err = keys.sign(&participants[..3], b"m").unwrap_err();
        assert!(matches!(err, SwarmError::InsufficientShares { have: 3, need: 4 }));
    }

    #[test]
    fn test_unknown_and_repeated_signers_do_not_count() {
        let participants = ids(5);
        let keys = ThresholdKeySet::deal(&participants, 3).unwrap();
        let signers = vec![
            "voter-0".to_string(),
            "voter-0".to_string(),
            "outsider".to_string(),
            "voter-1".to_string(),
        ];
        assert!(keys.sign(&signers, b"m").is_err());
    }

    #[test]
    fn test_forged_signer_list_rejected() {
        let participants = ids(5);
        let keys = ThresholdKeySet::deal(&participants, 3).unwrap();
        let mut sig = keys.sign(&participants, b"m").unwrap();
        sig.signers.truncate(2);
        assert!(!verify_threshold_signature(&sig, b"m"));
    }
}
