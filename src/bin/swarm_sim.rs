//! swarm-sim - in-process swarm simulator
//!
//! Commands:
//!   swarm-sim pbft [n]        - run one proposal through an n-replica cluster
//!   swarm-sim detect          - three-round malicious-agent detection
//!   swarm-sim trust           - assertions, witnesses, decay and path trust
//!   swarm-sim memory          - concurrent writes and delta sync between replicas
//!   swarm-sim run [secs] [cfg] - start the runtime loops for a while
//!   swarm-sim config          - print the default configuration
//!   swarm-sim demo            - everything above in sequence

use chrono::Duration;
use serde_json::json;
use std::env;
use std::sync::Arc;
use swarm_consensus::clock::{Clock, ManualClock, SystemClock};
use swarm_consensus::consensus::{
    Agent, ByzantineConfig, ByzantineConsensus, ChannelBroadcaster, ConsensusContext, ConsensusMessage,
    ConsensusProposal, NoOpBroadcaster,
};
use swarm_consensus::crypto::{Ed25519Signer, Ed25519Verifier, Signer};
use swarm_consensus::detection::{ConsensusDetectionCoordinator, DetectionConfig, Verdict};
use swarm_consensus::events::{drain, EventBus};
use swarm_consensus::memory::{DistributedMemoryManager, MemoryConfig};
use swarm_consensus::trust::{DistributedTrustVerifier, TrustConfig, VerificationResult};
use swarm_consensus::{RuntimeDeps, SwarmConfig, SwarmResult, SwarmRuntime};
use tokio::sync::mpsc;

fn print_usage() {
    println!(
        r#"
swarm-sim - Byzantine consensus and distributed trust for agent swarms

Usage: swarm-sim <command> [options]

Commands:
  pbft   [n]             Run one proposal through an n-replica cluster (default 4)
  detect                 Three-round malicious-agent detection among 6 voters
  trust                  Trust assertions, witness verification, decay and paths
  memory                 Concurrent writes and delta sync between two replicas
  run    [secs] [config] Start the runtime loops with an optional JSON config
  config                 Print the default configuration
  demo                   Run every scenario in sequence
"#
    );
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        return;
    }

    let result = match args[1].as_str() {
        "pbft" => cmd_pbft(args.get(2).and_then(|s| s.parse().ok()).unwrap_or(4)),
        "detect" => cmd_detect(),
        "trust" => cmd_trust(),
        "memory" => cmd_memory(),
        "run" => cmd_run(&args[2..]).await,
        "config" => cmd_config(),
        "demo" => cmd_demo(),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            Ok(())
        }
    };
    if let Err(e) = result {
        eprintln!("  Error: {}", e);
        std::process::exit(1);
    }
}

fn agent_id(i: usize) -> String {
    format!("agent-{}", i)
}

fn identity(i: usize) -> Ed25519Signer {
    Ed25519Signer::from_seed([i as u8 + 1; 32])
}

fn cmd_pbft(n: usize) -> SwarmResult<()> {
    println!("\n  PBFT cluster with {} replicas", n);
    let clock = ManualClock::fixed();
    let mut engines = Vec::new();
    let mut outboxes: Vec<mpsc::UnboundedReceiver<ConsensusMessage>> = Vec::new();
    for local in 0..n {
        let (broadcaster, rx) = ChannelBroadcaster::new();
        let mut engine = ByzantineConsensus::new(
            agent_id(local),
            ByzantineConfig::default(),
            ConsensusContext {
                signer: Arc::new(identity(local)),
                verifier: Arc::new(Ed25519Verifier),
                broadcaster: Arc::new(broadcaster),
                clock: clock.clone(),
                events: EventBus::new(),
            },
        );
        for i in (0..n).filter(|i| *i != local) {
            engine.register_agent(Agent::new(agent_id(i), identity(i).public_key(), clock.now()))?;
        }
        engines.push(engine);
        outboxes.push(rx);
    }

    let Some(leader) = engines[0].select_leader(0) else {
        println!("  No active leader");
        return Ok(());
    };
    let leader_index = engines.iter().position(|e| e.local_id() == leader).unwrap_or(0);
    let proposal = ConsensusProposal::new(json!({"action": "move", "to": [4, 2, 0]}), leader.clone(), clock.now());
    println!("  Leader {} proposes {}", leader, &proposal.hash[..16]);
    engines[leader_index].start_consensus(proposal.clone())?;

    let mut delivered = 0;
    loop {
        let mut in_flight = Vec::new();
        for outbox in outboxes.iter_mut() {
            while let Ok(msg) = outbox.try_recv() {
                in_flight.push(msg);
            }
        }
        if in_flight.is_empty() {
            break;
        }
        for msg in in_flight {
            delivered += 1;
            for engine in engines.iter_mut() {
                engine.process_message(msg.clone());
            }
        }
    }

    println!("  {} messages delivered", delivered);
    for engine in &engines {
        let metrics = engine.get_performance_metrics();
        println!(
            "  {:<10} committed={} messages={} faults={}",
            engine.local_id(),
            engine.is_committed(&proposal.hash),
            metrics.messages_processed,
            metrics.faults_detected
        );
    }
    Ok(())
}

fn cmd_detect() -> SwarmResult<()> {
    println!("\n  Malicious-agent detection");
    let clock = ManualClock::fixed();
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let mut coordinator = ConsensusDetectionCoordinator::new(DetectionConfig::default(), clock.clone(), events)?;
    for i in 1..=6 {
        coordinator.register_voter(agent_id(i), 0.5, 0.0);
    }
    coordinator.register_voter("suspect", 0.5, 0.0);

    let id = coordinator.initiate_detection("suspect", vec![])?;
    while let Some((round, _)) = coordinator.current_round(&id) {
        for i in 1..=6 {
            // Strong agreement can close the round before everyone voted
            if coordinator.current_round(&id).map(|(r, _)| r) != Some(round) {
                break;
            }
            let verdict = if i <= 5 { Verdict::Malicious } else { Verdict::Benign };
            coordinator.submit_vote(&id, &agent_id(i), verdict, 0.9)?;
        }
        if coordinator.current_round(&id).map(|(r, _)| r) == Some(round) {
            clock.advance(Duration::seconds(301));
            coordinator.check_timeouts();
        }
    }

    for event in drain(&mut rx) {
        println!("  event: {}", event.name());
    }
    if let Some(result) = coordinator.result(&id) {
        println!(
            "  decision={:?} confidence={:.3} rounds={} signature={}",
            result.final_decision,
            result.confidence,
            result.rounds.len(),
            result.threshold_signature.is_some()
        );
    }
    Ok(())
}

fn cmd_trust() -> SwarmResult<()> {
    println!("\n  Distributed trust");
    let clock = ManualClock::fixed();
    let mut verifier = DistributedTrustVerifier::new(
        TrustConfig::default(),
        Arc::new(identity(0)),
        clock.clone(),
        EventBus::new(),
    )?;
    for a in ["A", "B", "C", "W1", "W2", "W3"] {
        verifier.register_agent(a);
    }

    for (from, to, level) in [("A", "B", 0.9), ("B", "C", 0.8)] {
        let id = verifier.submit_trust_assertion(from, to, level, vec!["navigation".into()], vec![])?;
        for w in ["W1", "W2", "W3"] {
            verifier.verify_trust_assertion(&id, w, VerificationResult::Confirmed, 0.9, "observed")?;
        }
    }

    let direct = verifier.compute_trust("A", "B", &[]);
    println!("  A -> B direct trust {:.3}", direct.trust);
    let path = verifier.compute_trust("A", "C", &[]);
    println!(
        "  A -> C path trust {:.3} via {:?}",
        path.trust,
        path.path.map(|p| p.agents).unwrap_or_default()
    );

    clock.advance(Duration::days(30));
    println!("  after 30 days A -> B {:.3}", verifier.compute_trust("A", "B", &[]).trust);

    let metrics = verifier.refresh_network_metrics();
    println!(
        "  network: {} agents, {} assertions, density {:.3}",
        metrics.agents, metrics.assertions, metrics.density
    );
    Ok(())
}

fn cmd_memory() -> SwarmResult<()> {
    println!("\n  Replicated memory");
    let clock = ManualClock::fixed();
    let mut a = DistributedMemoryManager::new("agent-a", MemoryConfig::default(), clock.clone(), EventBus::new())?;
    let mut b = DistributedMemoryManager::new("agent-b", MemoryConfig::default(), clock.clone(), EventBus::new())?;

    a.set("tasks:survey", json!({"owner": "agent-a", "progress": 0.2}))?;
    b.set("tasks:survey", json!({"owner": "agent-b", "progress": 0.4}))?;
    a.set("map:sector-7", json!({"obstacles": 3}))?;

    let to_b = a.create_delta_sync("agent-b", &b.clock())?;
    let to_a = b.create_delta_sync("agent-a", &a.clock())?;
    println!("  delta a->b: {} ops, b->a: {} ops", to_b.operations.len(), to_a.operations.len());
    b.apply_delta(to_b)?;
    a.apply_delta(to_a)?;

    println!("  a sees tasks:survey = {}", a.get("tasks:survey").unwrap_or_default());
    println!("  b sees tasks:survey = {}", b.get("tasks:survey").unwrap_or_default());
    let metrics = a.metrics();
    println!(
        "  conflicts={} applied={} topology={}",
        metrics.conflicts,
        metrics.operations_applied,
        a.optimize_topology().as_str()
    );
    Ok(())
}

async fn cmd_run(args: &[String]) -> SwarmResult<()> {
    let secs: u64 = args.first().and_then(|s| s.parse().ok()).unwrap_or(5);
    let config = match args.get(1) {
        Some(path) => SwarmConfig::load(path)?,
        None => SwarmConfig::default(),
    };
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let deps = RuntimeDeps {
        signer: Arc::new(Ed25519Signer::generate()),
        verifier: Arc::new(Ed25519Verifier),
        broadcaster: Arc::new(NoOpBroadcaster),
        clock: SystemClock::shared(),
        events,
    };
    let mut runtime = SwarmRuntime::assemble(&config, deps)?;
    runtime.start();
    println!("\n  Runtime for {} running {} s", config.agent_id, secs);
    tokio::time::sleep(tokio::time::Duration::from_secs(secs)).await;
    runtime.emergency_stop().await;

    for event in drain(&mut rx) {
        println!("  event: {}", event.name());
    }
    Ok(())
}

fn cmd_config() -> SwarmResult<()> {
    println!("{}", serde_json::to_string_pretty(&SwarmConfig::default())?);
    Ok(())
}

fn cmd_demo() -> SwarmResult<()> {
    cmd_pbft(4)?;
    cmd_detect()?;
    cmd_trust()?;
    cmd_memory()
}
