//! Swarm-wide configuration
//!
//! Every component keeps its own config struct with documented defaults;
//! `SwarmConfig` bundles them so a deployment can be described in one JSON
//! file. Missing sections and fields fall back to their defaults.

use crate::consensus::ByzantineConfig;
use crate::detection::DetectionConfig;
use crate::error::{SwarmError, SwarmResult};
use crate::memory::MemoryConfig;
use crate::runtime::RuntimeConfig;
use crate::spatial::SpatialConfig;
use crate::trust::TrustConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Identity of the local replica
    pub agent_id: String,
    pub byzantine: ByzantineConfig,
    pub spatial: SpatialConfig,
    pub detection: DetectionConfig,
    pub trust: TrustConfig,
    pub memory: MemoryConfig,
    pub runtime: RuntimeConfig,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            agent_id: "agent-0".to_string(),
            byzantine: ByzantineConfig::default(),
            spatial: SpatialConfig::default(),
            detection: DetectionConfig::default(),
            trust: TrustConfig::default(),
            memory: MemoryConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl SwarmConfig {
    /// Read and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> SwarmResult<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> SwarmResult<Self> {
        let config: Self = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> SwarmResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    pub fn validate(&self) -> SwarmResult<()> {
        if self.agent_id.is_empty() {
            return Err(SwarmError::InvalidConfig("agent_id must not be empty".into()));
        }
        if self.byzantine.phase_timeout_secs == 0 {
            return Err(SwarmError::InvalidConfig("phase_timeout_secs must be positive".into()));
        }
        if !(self.spatial.spatial_tolerance > 0.0) || !(self.spatial.random_fallback_radius > 0.0) {
            return Err(SwarmError::InvalidConfig(
                "spatial tolerance and fallback radius must be positive".into(),
            ));
        }
        if self.spatial.consensus_deadline_secs == 0 {
            return Err(SwarmError::InvalidConfig("consensus_deadline_secs must be positive".into()));
        }
        self.detection.validate()?;
        self.trust.validate()?;
        self.memory.validate()?;
        self.runtime.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SwarmConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.detection.malicious_threshold, 0.67);
        assert_eq!(config.trust.minimum_witnesses, 3);
        assert_eq!(config.memory.shard_count, 16);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = SwarmConfig::from_json(
            r#"{"agent_id": "drone-7", "trust": {"minimum_witnesses": 5}, "byzantine": {"phase_timeout_secs": 10}}"#,
        )
        .unwrap();
        assert_eq!(config.agent_id, "drone-7");
        assert_eq!(config.trust.minimum_witnesses, 5);
        assert_eq!(config.trust.consensus_threshold, 0.67);
        assert_eq!(config.byzantine.phase_timeout_secs, 10);
        assert_eq!(config.byzantine.message_tolerance_secs, 300);
    }

    #[test]
    fn test_unsafe_byzantine_ratio_rejected() {
        let err = SwarmConfig::from_json(r#"{"detection": {"max_byzantine_ratio": 0.4}}"#).unwrap_err();
        assert!(matches!(err, SwarmError::InvalidConfig(_)));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("swarm-config-{}.json", uuid::Uuid::new_v4()));
        let mut config = SwarmConfig::default();
        config.agent_id = "relay-1".into();
        config.save(&path).unwrap();
        let loaded = SwarmConfig::load(&path).unwrap();
        assert_eq!(loaded.agent_id, "relay-1");
        std::fs::remove_file(&path).unwrap();
    }
}
