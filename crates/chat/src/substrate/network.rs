//! Substrate backed by a running libp2p node.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use peerchat_net::{
    InboundMessage, NetworkHandle, PeerAddress, PeerId, SubscriptionId, provider_key,
};
use tokio::sync::mpsc;

use super::{Delivery, Overlay, PubSub, Subscription, Topic};
use crate::SubstrateError;

/// Gossipsub topics over a [`NetworkHandle`].
#[derive(Debug, Clone)]
pub struct NetworkPubSub {
    handle: NetworkHandle,
}

impl NetworkPubSub {
    pub fn new(handle: NetworkHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl PubSub for NetworkPubSub {
    async fn join_topic(&self, name: &str) -> Result<Arc<dyn Topic>, SubstrateError> {
        Ok(Arc::new(NetworkTopic {
            handle: self.handle.clone(),
            name: name.to_string(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct NetworkTopic {
    handle: NetworkHandle,
    name: String,
    closed: AtomicBool,
}

impl fmt::Debug for NetworkTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkTopic")
            .field("name", &self.name)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl NetworkTopic {
    fn ensure_open(&self) -> Result<(), SubstrateError> {
        if self.closed.load(Ordering::Acquire) {
            Err(SubstrateError::TopicClosed(self.name.clone()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Topic for NetworkTopic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn subscribe(&self) -> Result<Box<dyn Subscription>, SubstrateError> {
        self.ensure_open()?;
        let (id, rx) = self.handle.subscribe(&self.name).await?;
        Ok(Box::new(NetworkSubscription {
            id,
            rx,
            handle: self.handle.clone(),
            cancelled: false,
        }))
    }

    async fn publish(&self, data: Vec<u8>) -> Result<(), SubstrateError> {
        self.ensure_open()?;
        Ok(self.handle.publish(&self.name, data).await?)
    }

    async fn list_peers(&self) -> Result<Vec<PeerId>, SubstrateError> {
        Ok(self.handle.topic_peers(&self.name).await?)
    }

    async fn close(&self) -> Result<(), SubstrateError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

struct NetworkSubscription {
    id: SubscriptionId,
    rx: mpsc::Receiver<InboundMessage>,
    handle: NetworkHandle,
    cancelled: bool,
}

#[async_trait]
impl Subscription for NetworkSubscription {
    async fn next(&mut self) -> Option<Delivery> {
        let message = self.rx.recv().await?;
        Some(Delivery {
            received_from: message.received_from(),
            data: message.data,
        })
    }

    fn cancel(&mut self) {
        if !self.cancelled {
            self.cancelled = true;
            self.rx.close();
            self.handle.unsubscribe(self.id);
        }
    }
}

impl Drop for NetworkSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Kademlia routing and provider records over a [`NetworkHandle`].
#[derive(Debug, Clone)]
pub struct NetworkOverlay {
    handle: NetworkHandle,
}

impl NetworkOverlay {
    pub fn new(handle: NetworkHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl Overlay for NetworkOverlay {
    fn local_peer_id(&self) -> PeerId {
        self.handle.local_peer_id()
    }

    async fn connect(&self, peer: PeerAddress) -> Result<(), SubstrateError> {
        let peer_id = peer.peer_id;
        self.handle.dial(peer).await.map_err(|e| match SubstrateError::from(e) {
            SubstrateError::Network(e) => SubstrateError::Unreachable {
                peer: peer_id.to_string(),
                reason: e.to_string(),
            },
            other => other,
        })
    }

    async fn bootstrap_routing(&self) -> Result<(), SubstrateError> {
        Ok(self.handle.bootstrap().await?)
    }

    async fn provide(&self, key: &[u8]) -> Result<(), SubstrateError> {
        Ok(self.handle.start_providing(provider_key(key)).await?)
    }

    async fn find_providers(&self, key: &[u8]) -> Result<mpsc::Receiver<PeerAddress>, SubstrateError> {
        Ok(self.handle.get_providers(provider_key(key))?)
    }
}
