use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::sync::Arc;
use swarm_consensus::clock::{ManualClock, VectorClock};
use swarm_consensus::crypto::{shamir, Ed25519Signer, Ed25519Verifier, Signer};
use swarm_consensus::detection::{tally, ConsensusVoteRecord, RoundNumber, Verdict};
use swarm_consensus::events::EventBus;
use swarm_consensus::memory::{DistributedMemoryManager, MemoryConfig};
use swarm_consensus::trust::{best_path, Adjacency, DistributedTrustVerifier, Edge, TrustConfig, VerificationResult};

fn bench_crypto(c: &mut Criterion) {
    let signer = Ed25519Signer::from_seed([7u8; 32]);
    let data = b"pre-prepare:0:1:digest";
    c.bench_function("ed25519_sign", |b| b.iter(|| signer.sign(data)));

    let sig = signer.sign(data);
    let pk = signer.public_key();
    c.bench_function("ed25519_verify", |b| {
        b.iter(|| swarm_consensus::crypto::SignatureVerifier::verify(&Ed25519Verifier, data, &sig, &pk))
    });

    let secret = [42u8; 32];
    c.bench_function("shamir_split_5_of_7", |b| b.iter(|| shamir::split(&secret, 5, 7)));
}

fn bench_tally(c: &mut Criterion) {
    let clock = ManualClock::fixed();
    let votes: Vec<ConsensusVoteRecord> = (0..100)
        .map(|i| ConsensusVoteRecord {
            voter_id: format!("voter-{}", i),
            round: RoundNumber::One,
            decision: if i % 4 == 0 { Verdict::Benign } else { Verdict::Malicious },
            confidence: 0.8,
            weight: 0.5 + (i % 10) as f64 * 0.01,
            commit_hash: None,
            timestamp: swarm_consensus::clock::Clock::now(clock.as_ref()),
        })
        .collect();
    c.bench_function("tally_100_votes", |b| b.iter(|| tally(&votes, 0.67, 0.67)));
}

fn bench_trust_paths(c: &mut Criterion) {
    let mut adjacency = Adjacency::new();
    for i in 0..50 {
        for j in 1..4 {
            adjacency.entry(format!("n{}", i)).or_default().push(Edge {
                to: format!("n{}", (i + j * 7) % 50),
                assertion_id: format!("a{}-{}", i, j),
                trust: 0.5 + 0.1 * j as f64,
                confidence: 0.8,
            });
        }
    }
    c.bench_function("best_path_50_nodes", |b| b.iter(|| best_path(&adjacency, "n0", "n33", 5, 0.95)));

    let clock = ManualClock::fixed();
    let mut verifier = DistributedTrustVerifier::new(
        TrustConfig::default(),
        Arc::new(Ed25519Signer::from_seed([1u8; 32])),
        clock,
        EventBus::new(),
    )
    .unwrap();
    let agents: Vec<String> = (0..20).map(|i| format!("agent-{}", i)).collect();
    for a in &agents {
        verifier.register_agent(a.clone());
    }
    for i in 0..19 {
        let id = verifier
            .submit_trust_assertion(&agents[i], &agents[i + 1], 0.9, vec![], vec![])
            .unwrap();
        let witnesses = verifier.assertion(&id).unwrap().requested_verifiers.clone();
        for w in witnesses.iter().take(3) {
            verifier
                .verify_trust_assertion(&id, w, VerificationResult::Confirmed, 0.9, "")
                .unwrap();
        }
    }
    c.bench_function("network_metrics_20_agents", |b| b.iter(|| verifier.refresh_network_metrics()));
}

fn bench_memory(c: &mut Criterion) {
    let mut clock = VectorClock::new();
    let mut other = VectorClock::new();
    for i in 0..32 {
        clock.increment(&format!("agent-{}", i));
        other.increment(&format!("agent-{}", (i * 3) % 40));
    }
    c.bench_function("vector_clock_compare_32", |b| b.iter(|| clock.compare(&other)));

    let wall = ManualClock::fixed();
    let mut source = DistributedMemoryManager::new("agent-a", MemoryConfig::default(), wall.clone(), EventBus::new()).unwrap();
    for i in 0..200 {
        source.set(&format!("tasks:{}", i), json!({"progress": i})).unwrap();
    }
    c.bench_function("delta_sync_200_ops", |b| {
        b.iter(|| {
            let mut target =
                DistributedMemoryManager::new("agent-b", MemoryConfig::default(), wall.clone(), EventBus::new()).unwrap();
            let delta = source.create_delta_sync("agent-b", &target.clock()).unwrap();
            target.apply_delta(delta).unwrap()
        })
    });
}

criterion_group!(benches, bench_crypto, bench_tally, bench_trust_paths, bench_memory);
criterion_main!(benches);
