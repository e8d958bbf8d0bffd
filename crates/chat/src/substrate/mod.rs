//! The network substrate consumed by the chat layer.
//!
//! Chat code only talks to the network through these traits. Two
//! implementations exist: [`network`] drives a running libp2p node through a
//! [`NetworkHandle`](peerchat_net::NetworkHandle), and [`loopback`] is an
//! in-memory hub with failure injection.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use peerchat_net::{PeerAddress, PeerId};
use tokio::sync::mpsc;

use crate::SubstrateError;

pub mod loopback;
pub mod network;

/// A raw message delivered on a topic.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub data: Vec<u8>,
    /// Peer the message came from.
    pub received_from: PeerId,
}

/// Publish/subscribe service.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Obtain a handle to the named topic.
    async fn join_topic(&self, name: &str) -> Result<Arc<dyn Topic>, SubstrateError>;
}

/// Handle to a joined topic.
#[async_trait]
pub trait Topic: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    async fn subscribe(&self) -> Result<Box<dyn Subscription>, SubstrateError>;

    async fn publish(&self, data: Vec<u8>) -> Result<(), SubstrateError>;

    /// Remote peers subscribed to this topic.
    async fn list_peers(&self) -> Result<Vec<PeerId>, SubstrateError>;

    /// Release the topic. Publishing afterwards fails.
    async fn close(&self) -> Result<(), SubstrateError>;
}

/// A stream of deliveries on one topic.
#[async_trait]
pub trait Subscription: Send {
    /// Next delivery, or `None` once the subscription is closed.
    async fn next(&mut self) -> Option<Delivery>;

    fn cancel(&mut self);
}

/// Peer routing and content-provider records.
#[async_trait]
pub trait Overlay: Send + Sync {
    fn local_peer_id(&self) -> PeerId;

    async fn connect(&self, peer: PeerAddress) -> Result<(), SubstrateError>;

    /// Start populating the routing table from connected peers.
    async fn bootstrap_routing(&self) -> Result<(), SubstrateError>;

    async fn provide(&self, key: &[u8]) -> Result<(), SubstrateError>;

    /// Providers of `key`; the receiver closes when the lookup ends.
    async fn find_providers(&self, key: &[u8]) -> Result<mpsc::Receiver<PeerAddress>, SubstrateError>;
}
