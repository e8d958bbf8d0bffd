//! In-memory substrate.
//!
//! A [`LoopbackHub`] stands in for the gossip network: every
//! [`LoopbackPubSub`] created from it shares the same topics, and a publish is
//! delivered to every subscriber of the topic, the publisher's own
//! subscriptions included. [`LoopbackOverlay`] simulates dialing and provider
//! records with configurable per-peer reachability and latency.
//!
//! Both carry failure-injection hooks for tests.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use peerchat_net::{PeerAddress, PeerId};
use tokio::sync::mpsc;

use super::{Delivery, Overlay, PubSub, Subscription, Topic};
use crate::SubstrateError;

const LOOPBACK_BUFFER: usize = 128;

/// Shared in-memory gossip network.
#[derive(Debug, Clone, Default)]
pub struct LoopbackHub {
    inner: Arc<Mutex<HubState>>,
}

#[derive(Debug, Default)]
struct HubState {
    topics: HashMap<String, Vec<HubSubscriber>>,
    failing_joins: HashSet<String>,
    next_id: u64,
}

#[derive(Debug)]
struct HubSubscriber {
    id: u64,
    peer: PeerId,
    tx: mpsc::Sender<Delivery>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pub/sub endpoint for `peer`.
    pub fn pubsub(&self, peer: PeerId) -> LoopbackPubSub {
        LoopbackPubSub {
            hub: self.clone(),
            peer,
        }
    }

    /// Make every future join of `topic` fail.
    pub fn fail_join(&self, topic: &str) {
        self.inner.lock().failing_joins.insert(topic.to_string());
    }

    /// Close every subscription on `topic`, as if the substrate dropped them.
    pub fn close_subscriptions(&self, topic: &str) {
        self.inner.lock().topics.remove(topic);
    }

    /// Deliver raw bytes on `topic` as if sent by `from`.
    pub fn inject(&self, topic: &str, from: PeerId, data: Vec<u8>) {
        self.deliver(topic, Delivery {
            data,
            received_from: from,
        });
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .lock()
            .topics
            .get(topic)
            .map_or(0, |subs| subs.iter().filter(|s| !s.tx.is_closed()).count())
    }

    fn deliver(&self, topic: &str, delivery: Delivery) {
        let mut state = self.inner.lock();
        if let Some(subscribers) = state.topics.get_mut(topic) {
            subscribers.retain(|s| match s.tx.try_send(delivery.clone()) {
                Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
        }
    }

    fn subscribe(&self, topic: &str, peer: PeerId) -> (u64, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(LOOPBACK_BUFFER);
        let mut state = self.inner.lock();
        let id = state.next_id;
        state.next_id += 1;
        state
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(HubSubscriber { id, peer, tx });
        (id, rx)
    }

    fn unsubscribe(&self, topic: &str, id: u64) {
        if let Some(subscribers) = self.inner.lock().topics.get_mut(topic) {
            subscribers.retain(|s| s.id != id);
        }
    }

    fn peers(&self, topic: &str, except: &PeerId) -> Vec<PeerId> {
        let state = self.inner.lock();
        let mut peers: Vec<PeerId> = state
            .topics
            .get(topic)
            .into_iter()
            .flatten()
            .filter(|s| &s.peer != except && !s.tx.is_closed())
            .map(|s| s.peer)
            .collect();
        peers.sort();
        peers.dedup();
        peers
    }
}

/// One peer's view of a [`LoopbackHub`].
#[derive(Debug, Clone)]
pub struct LoopbackPubSub {
    hub: LoopbackHub,
    peer: PeerId,
}

#[async_trait]
impl PubSub for LoopbackPubSub {
    async fn join_topic(&self, name: &str) -> Result<Arc<dyn Topic>, SubstrateError> {
        if self.hub.inner.lock().failing_joins.contains(name) {
            return Err(SubstrateError::Unavailable);
        }
        Ok(Arc::new(LoopbackTopic {
            hub: self.hub.clone(),
            peer: self.peer,
            name: name.to_string(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct LoopbackTopic {
    hub: LoopbackHub,
    peer: PeerId,
    name: String,
    closed: AtomicBool,
}

impl fmt::Debug for LoopbackTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackTopic")
            .field("peer", &self.peer)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl LoopbackTopic {
    fn ensure_open(&self) -> Result<(), SubstrateError> {
        if self.closed.load(Ordering::Acquire) {
            Err(SubstrateError::TopicClosed(self.name.clone()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Topic for LoopbackTopic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn subscribe(&self) -> Result<Box<dyn Subscription>, SubstrateError> {
        self.ensure_open()?;
        let (id, rx) = self.hub.subscribe(&self.name, self.peer);
        Ok(Box::new(LoopbackSubscription {
            hub: self.hub.clone(),
            topic: self.name.clone(),
            id,
            rx,
        }))
    }

    async fn publish(&self, data: Vec<u8>) -> Result<(), SubstrateError> {
        self.ensure_open()?;
        self.hub.deliver(&self.name, Delivery {
            data,
            received_from: self.peer,
        });
        Ok(())
    }

    async fn list_peers(&self) -> Result<Vec<PeerId>, SubstrateError> {
        Ok(self.hub.peers(&self.name, &self.peer))
    }

    async fn close(&self) -> Result<(), SubstrateError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

struct LoopbackSubscription {
    hub: LoopbackHub,
    topic: String,
    id: u64,
    rx: mpsc::Receiver<Delivery>,
}

#[async_trait]
impl Subscription for LoopbackSubscription {
    async fn next(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    fn cancel(&mut self) {
        self.rx.close();
        self.hub.unsubscribe(&self.topic, self.id);
    }
}

/// How a simulated peer answers a dial.
#[derive(Debug, Clone, Copy)]
pub enum Reachability {
    Reachable { latency: Duration },
    Unreachable { latency: Duration },
}

/// Simulated routing overlay.
#[derive(Debug, Clone)]
pub struct LoopbackOverlay {
    local: PeerId,
    inner: Arc<Mutex<OverlayState>>,
}

#[derive(Debug, Default)]
struct OverlayState {
    peers: HashMap<PeerId, Reachability>,
    connected: Vec<PeerId>,
    providers: HashMap<Vec<u8>, Vec<PeerId>>,
    provide_calls: usize,
    routing_bootstrapped: bool,
    unavailable: bool,
}

impl LoopbackOverlay {
    pub fn new(local: PeerId) -> Self {
        Self {
            local,
            inner: Arc::default(),
        }
    }

    /// Register how dials to `peer` behave. Unknown peers are unreachable.
    pub fn set_reachability(&self, peer: PeerId, reachability: Reachability) {
        self.inner.lock().peers.insert(peer, reachability);
    }

    /// Record `peer` as a provider of `key`.
    pub fn add_provider(&self, key: &[u8], peer: PeerId) {
        self.inner
            .lock()
            .providers
            .entry(key.to_vec())
            .or_default()
            .push(peer);
    }

    /// Simulate the network task going away.
    pub fn set_unavailable(&self) {
        self.inner.lock().unavailable = true;
    }

    /// Peers successfully connected, in completion order.
    pub fn connected(&self) -> Vec<PeerId> {
        self.inner.lock().connected.clone()
    }

    pub fn routing_bootstrapped(&self) -> bool {
        self.inner.lock().routing_bootstrapped
    }

    pub fn providers(&self, key: &[u8]) -> Vec<PeerId> {
        self.inner
            .lock()
            .providers
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of successful [`Overlay::provide`] calls, repeats included.
    pub fn provide_calls(&self) -> usize {
        self.inner.lock().provide_calls
    }

    fn check_available(&self) -> Result<(), SubstrateError> {
        if self.inner.lock().unavailable {
            Err(SubstrateError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Overlay for LoopbackOverlay {
    fn local_peer_id(&self) -> PeerId {
        self.local
    }

    async fn connect(&self, peer: PeerAddress) -> Result<(), SubstrateError> {
        self.check_available()?;
        let reachability = self.inner.lock().peers.get(&peer.peer_id).copied();
        let unreachable = |reason: &str| SubstrateError::Unreachable {
            peer: peer.peer_id.to_string(),
            reason: reason.to_string(),
        };

        match reachability {
            Some(Reachability::Reachable { latency }) => {
                tokio::time::sleep(latency).await;
                let mut state = self.inner.lock();
                if !state.connected.contains(&peer.peer_id) {
                    state.connected.push(peer.peer_id);
                }
                Ok(())
            }
            Some(Reachability::Unreachable { latency }) => {
                tokio::time::sleep(latency).await;
                Err(unreachable("connection refused"))
            }
            None => Err(unreachable("no route to peer")),
        }
    }

    async fn bootstrap_routing(&self) -> Result<(), SubstrateError> {
        self.check_available()?;
        let mut state = self.inner.lock();
        if state.connected.is_empty() {
            return Err(SubstrateError::Unreachable {
                peer: "routing table".into(),
                reason: "no known peers".into(),
            });
        }
        state.routing_bootstrapped = true;
        Ok(())
    }

    async fn provide(&self, key: &[u8]) -> Result<(), SubstrateError> {
        self.check_available()?;
        let local = self.local;
        let mut state = self.inner.lock();
        state.provide_calls += 1;
        let providers = state.providers.entry(key.to_vec()).or_default();
        if !providers.contains(&local) {
            providers.push(local);
        }
        Ok(())
    }

    async fn find_providers(&self, key: &[u8]) -> Result<mpsc::Receiver<PeerAddress>, SubstrateError> {
        self.check_available()?;
        let providers = self.providers(key);
        let (tx, rx) = mpsc::channel(providers.len().max(1));
        for peer in providers {
            let _ = tx.try_send(PeerAddress::from_peer_id(peer));
        }
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers_including_self() {
        let hub = LoopbackHub::new();
        let (a, b) = (PeerId::random(), PeerId::random());

        let topic_a = hub.pubsub(a).join_topic("t").await.unwrap();
        let topic_b = hub.pubsub(b).join_topic("t").await.unwrap();
        let mut sub_a = topic_a.subscribe().await.unwrap();
        let mut sub_b = topic_b.subscribe().await.unwrap();

        topic_a.publish(b"x".to_vec()).await.unwrap();

        assert_eq!(sub_a.next().await.unwrap().received_from, a);
        assert_eq!(sub_b.next().await.unwrap().data, b"x");
        assert_eq!(topic_a.list_peers().await.unwrap(), vec![b]);
    }

    #[tokio::test]
    async fn test_closed_topic_rejects_publish() {
        let hub = LoopbackHub::new();
        let topic = hub.pubsub(PeerId::random()).join_topic("t").await.unwrap();
        topic.close().await.unwrap();
        assert_matches!(
            topic.publish(vec![]).await,
            Err(SubstrateError::TopicClosed(name)) if name == "t"
        );
    }

    #[tokio::test]
    async fn test_cancel_removes_subscriber() {
        let hub = LoopbackHub::new();
        let topic = hub.pubsub(PeerId::random()).join_topic("t").await.unwrap();
        let mut sub = topic.subscribe().await.unwrap();
        assert_eq!(hub.subscriber_count("t"), 1);

        sub.cancel();
        assert_eq!(hub.subscriber_count("t"), 0);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_fail_join() {
        let hub = LoopbackHub::new();
        hub.fail_join("broken");
        assert!(hub.pubsub(PeerId::random()).join_topic("broken").await.is_err());
    }

    #[tokio::test]
    async fn test_overlay_unknown_peer_unreachable() {
        let overlay = LoopbackOverlay::new(PeerId::random());
        let result = overlay.connect(PeerAddress::from_peer_id(PeerId::random())).await;
        assert_matches!(result, Err(SubstrateError::Unreachable { .. }));
        assert_matches!(overlay.bootstrap_routing().await, Err(SubstrateError::Unreachable { .. }));
    }
}
