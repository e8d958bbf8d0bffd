//! Seed fan-out accounting.

use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use peerchat_chat::{BootstrapReport, ChatError, SubstrateError, bootstrap};
use peerchat_chat::substrate::loopback::{LoopbackOverlay, Reachability};
use peerchat_net::{PeerAddress, PeerId};
use rand::seq::SliceRandom;

fn seed(overlay: &LoopbackOverlay, reachability: Reachability) -> PeerAddress {
    let peer = PeerId::random();
    overlay.set_reachability(peer, reachability);
    PeerAddress::new(peer, vec!["/ip4/127.0.0.1/tcp/4001".parse().unwrap()])
}

#[tokio::test]
async fn test_counts_successes_regardless_of_completion_order() {
    for _ in 0..5 {
        let overlay = LoopbackOverlay::new(PeerId::random());
        let mut latencies: Vec<u64> = (0..8).map(|i| i * 5).collect();
        latencies.shuffle(&mut rand::rng());

        let seeds: Vec<PeerAddress> = latencies
            .iter()
            .enumerate()
            .map(|(i, ms)| {
                let latency = Duration::from_millis(*ms);
                let reachability = if i % 3 == 0 {
                    Reachability::Unreachable { latency }
                } else {
                    Reachability::Reachable { latency }
                };
                seed(&overlay, reachability)
            })
            .collect();

        let report = bootstrap(&overlay, &seeds).await.unwrap();
        assert_eq!(report, BootstrapReport { connected: 5, total: 8 });
        assert_eq!(overlay.connected().len(), 5);
        assert!(overlay.routing_bootstrapped());
    }
}

#[tokio::test]
async fn test_waits_for_every_attempt() {
    let overlay = LoopbackOverlay::new(PeerId::random());
    let seeds = vec![
        seed(&overlay, Reachability::Reachable { latency: Duration::ZERO }),
        seed(&overlay, Reachability::Unreachable {
            latency: Duration::from_millis(150),
        }),
    ];

    let started = Instant::now();
    let report = bootstrap(&overlay, &seeds).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(report, BootstrapReport { connected: 1, total: 2 });
}

#[tokio::test]
async fn test_no_reachable_seed_is_tolerated() {
    let overlay = LoopbackOverlay::new(PeerId::random());
    let seeds = vec![
        seed(&overlay, Reachability::Unreachable { latency: Duration::ZERO }),
        PeerAddress::from_peer_id(PeerId::random()),
    ];

    let report = bootstrap(&overlay, &seeds).await.unwrap();
    assert_eq!(report, BootstrapReport { connected: 0, total: 2 });
    assert!(!overlay.routing_bootstrapped());

    let report = bootstrap(&overlay, &[]).await.unwrap();
    assert_eq!(report, BootstrapReport { connected: 0, total: 0 });
}

#[tokio::test]
async fn test_unavailable_overlay_fails() {
    let overlay = LoopbackOverlay::new(PeerId::random());
    let seeds = vec![seed(&overlay, Reachability::Reachable { latency: Duration::ZERO })];
    overlay.set_unavailable();

    assert_matches!(
        bootstrap(&overlay, &seeds).await,
        Err(ChatError::Substrate(SubstrateError::Unavailable))
    );
}
