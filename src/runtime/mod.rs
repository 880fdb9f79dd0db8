//! Swarm runtime
//!
//! Composition root for one agent. Owns every component behind an async
//! mutex and runs the background loops:
//! 1. Ticks the timeouts of the engine, the detection coordinator and the trust ledger
//! 2. Periodically refreshes trust metrics and re-picks the memory topology

use crate::clock::SharedClock;
use crate::config::SwarmConfig;
use crate::consensus::{ByzantineConsensus, ConsensusContext, MessageBroadcaster};
use crate::crypto::{SignatureVerifier, Signer};
use crate::detection::ConsensusDetectionCoordinator;
use crate::error::{SwarmError, SwarmResult};
use crate::events::EventBus;
use crate::memory::DistributedMemoryManager;
use crate::spatial::SpatialConsensus;
use crate::trust::DistributedTrustVerifier;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};

/// Background loop cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How often timeouts are checked (milliseconds)
    pub tick_interval_ms: u64,
    /// How often trust metrics and topology are refreshed (seconds)
    pub metrics_refresh_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            metrics_refresh_secs: 60,
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> SwarmResult<()> {
        if self.tick_interval_ms == 0 || self.metrics_refresh_secs == 0 {
            return Err(SwarmError::InvalidConfig("runtime intervals must be positive".into()));
        }
        Ok(())
    }
}

/// Collaborators the runtime wires into its components
#[derive(Clone)]
pub struct RuntimeDeps {
    pub signer: Arc<dyn Signer>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub broadcaster: Arc<dyn MessageBroadcaster>,
    pub clock: SharedClock,
    pub events: EventBus,
}

pub struct SwarmRuntime {
    config: RuntimeConfig,
    spatial: Arc<Mutex<SpatialConsensus>>,
    detection: Arc<Mutex<ConsensusDetectionCoordinator>>,
    trust: Arc<Mutex<DistributedTrustVerifier>>,
    memory: Arc<Mutex<DistributedMemoryManager>>,
    tasks: Vec<JoinHandle<()>>,
}

impl SwarmRuntime {
    /// Build every component for `config.agent_id`
    pub fn assemble(config: &SwarmConfig, deps: RuntimeDeps) -> SwarmResult<Self> {
        config.validate()?;
        let engine = ByzantineConsensus::new(
            config.agent_id.clone(),
            config.byzantine.clone(),
            ConsensusContext {
                signer: deps.signer.clone(),
                verifier: deps.verifier,
                broadcaster: deps.broadcaster,
                clock: deps.clock.clone(),
                events: deps.events.clone(),
            },
        );
        let spatial = SpatialConsensus::new(engine, config.spatial.clone());
        let detection =
            ConsensusDetectionCoordinator::new(config.detection.clone(), deps.clock.clone(), deps.events.clone())?;
        let mut trust =
            DistributedTrustVerifier::new(config.trust.clone(), deps.signer, deps.clock.clone(), deps.events.clone())?;
        trust.register_agent(config.agent_id.clone());
        let memory = DistributedMemoryManager::new(
            config.agent_id.clone(),
            config.memory.clone(),
            deps.clock,
            deps.events,
        )?;
        info!("Assembled swarm runtime for {}", config.agent_id);
        Ok(Self::new(config.runtime.clone(), spatial, detection, trust, memory))
    }

    pub fn new(
        config: RuntimeConfig,
        spatial: SpatialConsensus,
        detection: ConsensusDetectionCoordinator,
        trust: DistributedTrustVerifier,
        memory: DistributedMemoryManager,
    ) -> Self {
        Self {
            config,
            spatial: Arc::new(Mutex::new(spatial)),
            detection: Arc::new(Mutex::new(detection)),
            trust: Arc::new(Mutex::new(trust)),
            memory: Arc::new(Mutex::new(memory)),
            tasks: Vec::new(),
        }
    }

    pub fn spatial(&self) -> Arc<Mutex<SpatialConsensus>> {
        self.spatial.clone()
    }

    pub fn detection(&self) -> Arc<Mutex<ConsensusDetectionCoordinator>> {
        self.detection.clone()
    }

    pub fn trust(&self) -> Arc<Mutex<DistributedTrustVerifier>> {
        self.trust.clone()
    }

    pub fn memory(&self) -> Arc<Mutex<DistributedMemoryManager>> {
        self.memory.clone()
    }

    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|t| !t.is_finished())
    }

    /// Spawn the background loops; a second call is a no-op while they run
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        self.tasks.clear();

        // Task 1: timeouts
        let spatial = self.spatial.clone();
        let detection = self.detection.clone();
        let trust = self.trust.clone();
        let tick_ms = self.config.tick_interval_ms;
        self.tasks.push(tokio::spawn(async move {
            let mut interval = time::interval(Duration::from_millis(tick_ms));
            loop {
                interval.tick().await;
                let decided = spatial.lock().await.check_timeouts();
                let closed = detection.lock().await.check_timeouts();
                let expired = trust.lock().await.check_timeouts();
                if !decided.is_empty() || closed > 0 || expired > 0 {
                    debug!(
                        "Timeout tick: {} spatial decisions, {} detection rounds, {} trust items",
                        decided.len(),
                        closed,
                        expired
                    );
                }
            }
        }));

        // Task 2: metrics and topology
        let trust = self.trust.clone();
        let memory = self.memory.clone();
        let refresh_secs = self.config.metrics_refresh_secs;
        self.tasks.push(tokio::spawn(async move {
            let mut interval = time::interval(Duration::from_secs(refresh_secs));
            loop {
                interval.tick().await;
                let metrics = trust.lock().await.refresh_network_metrics();
                let topology = memory.lock().await.optimize_topology();
                debug!(
                    "Trust network: {} agents, density {:.3}; memory topology {}",
                    metrics.agents,
                    metrics.density,
                    topology.as_str()
                );
            }
        }));
        info!(
            "Swarm runtime started (tick {} ms, metrics every {} s)",
            tick_ms, refresh_secs
        );
    }

    /// Stop the loops without touching component state
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    /// Stop the loops and clear every component's in-flight work; components stay usable
    pub async fn emergency_stop(&mut self) {
        warn!("Swarm runtime emergency stop");
        self.shutdown();
        self.spatial.lock().await.emergency_stop();
        self.detection.lock().await.emergency_stop();
        self.trust.lock().await.emergency_stop();
        self.memory.lock().await.emergency_stop();
    }
}

impl Drop for SwarmRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::consensus::NoOpBroadcaster;
    use crate::crypto::{Ed25519Signer, Ed25519Verifier};
    use crate::detection::Verdict;
    use crate::events::drain;
    use crate::trust::AssertionStatus;

    fn runtime(clock: Arc<ManualClock>, events: EventBus) -> SwarmRuntime {
        let deps = RuntimeDeps {
            signer: Arc::new(Ed25519Signer::from_seed([3u8; 32])),
            verifier: Arc::new(Ed25519Verifier),
            broadcaster: Arc::new(NoOpBroadcaster),
            clock,
            events,
        };
        SwarmRuntime::assemble(&SwarmConfig::default(), deps).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_expires_stale_assertions() {
        let clock = ManualClock::fixed();
        let mut rt = runtime(clock.clone(), EventBus::new());
        let trust = rt.trust();
        let id = {
            let mut t = trust.lock().await;
            for a in ["agent-1", "agent-2"] {
                t.register_agent(a);
            }
            t.submit_trust_assertion("agent-0", "agent-1", 0.6, vec![], vec![]).unwrap()
        };
        clock.advance(chrono::Duration::seconds(301));

        rt.start();
        assert!(rt.is_running());
        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(trust.lock().await.assertion(&id).unwrap().status, AssertionStatus::Expired);
        rt.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_loop_publishes() {
        let clock = ManualClock::fixed();
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let mut rt = runtime(clock, events);
        rt.start();
        time::sleep(Duration::from_millis(10)).await;
        assert!(rt.trust().lock().await.last_metrics().is_some());
        let names: Vec<_> = drain(&mut rx).iter().map(|e| e.name()).collect();
        assert!(names.contains(&"trust_network_metrics_updated"));
        rt.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_emergency_stop_cancels_detections_and_loops() {
        let clock = ManualClock::fixed();
        let mut rt = runtime(clock, EventBus::new());
        let detection = rt.detection();
        let consensus_id = {
            let mut d = detection.lock().await;
            for i in 1..=6 {
                d.register_voter(format!("agent-{}", i), 0.5, 0.0);
            }
            let id = d
                .initiate_detection("agent-6", vec![])
                .unwrap();
            d.submit_vote(&id, "agent-1", Verdict::Malicious, 0.9).unwrap();
            id
        };
        rt.start();
        rt.emergency_stop().await;
        assert!(!rt.is_running());

        let d = detection.lock().await;
        assert!(!d.is_active(&consensus_id));
        let result = d.result(&consensus_id).unwrap();
        assert_eq!(result.failure_reason.as_deref(), Some("cancelled"));
    }
}
