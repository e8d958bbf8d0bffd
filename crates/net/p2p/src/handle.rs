//! Cloneable handle to the network event loop.

use libp2p::{Multiaddr, PeerId, kad::RecordKey};
use tokio::sync::{mpsc, oneshot};

use crate::{
    InboundMessage, NetworkError, PeerAddress, SubscriptionId,
    command::{NetworkCommand, Reply},
    config::SUBSCRIPTION_BUFFER,
};

/// Handle for issuing commands to a running [`NetworkNode`](crate::NetworkNode).
///
/// Every method fails with [`NetworkError::ChannelClosed`] once the event
/// loop has stopped.
#[derive(Debug, Clone)]
pub struct NetworkHandle {
    command_tx: mpsc::UnboundedSender<NetworkCommand>,
    local_peer_id: PeerId,
}

impl NetworkHandle {
    pub fn new(command_tx: mpsc::UnboundedSender<NetworkCommand>, local_peer_id: PeerId) -> Self {
        Self {
            command_tx,
            local_peer_id,
        }
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// Send a command to the network layer.
    pub fn send_command(&self, command: NetworkCommand) -> Result<(), NetworkError> {
        self.command_tx
            .send(command)
            .map_err(|_| NetworkError::ChannelClosed)
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> NetworkCommand) -> Result<T, NetworkError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(command(reply))?;
        rx.await.map_err(|_| NetworkError::ChannelClosed)?
    }

    /// Connect to `peer`, resolving once the connection is established.
    pub async fn dial(&self, peer: PeerAddress) -> Result<(), NetworkError> {
        self.request(|reply| NetworkCommand::Dial { peer, reply }).await
    }

    /// Start a Kademlia bootstrap query.
    pub async fn bootstrap(&self) -> Result<(), NetworkError> {
        self.request(|reply| NetworkCommand::Bootstrap { reply }).await
    }

    /// Announce the local node as a provider of `key`.
    pub async fn start_providing(&self, key: RecordKey) -> Result<(), NetworkError> {
        self.request(|reply| NetworkCommand::StartProviding { key, reply })
            .await
    }

    /// Look up providers of `key`. The receiver closes when the query ends.
    pub fn get_providers(&self, key: RecordKey) -> Result<mpsc::Receiver<PeerAddress>, NetworkError> {
        let (results, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.send_command(NetworkCommand::GetProviders { key, results })?;
        Ok(rx)
    }

    /// Subscribe to a gossip topic.
    pub async fn subscribe(
        &self,
        topic: &str,
    ) -> Result<(SubscriptionId, mpsc::Receiver<InboundMessage>), NetworkError> {
        let (messages, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let topic = topic.to_string();
        let id = self
            .request(|reply| NetworkCommand::Subscribe {
                topic,
                messages,
                reply,
            })
            .await?;
        Ok((id, rx))
    }

    /// Drop a subscriber. Best effort: a stopped event loop has nothing left to drop.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let _ = self.send_command(NetworkCommand::Unsubscribe { id });
    }

    /// Publish `data` on `topic`.
    pub async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), NetworkError> {
        let topic = topic.to_string();
        self.request(|reply| NetworkCommand::Publish { topic, data, reply })
            .await
    }

    /// Peers known to be subscribed to `topic`.
    pub async fn topic_peers(&self, topic: &str) -> Result<Vec<PeerId>, NetworkError> {
        let topic = topic.to_string();
        self.request(|reply| NetworkCommand::TopicPeers { topic, reply })
            .await
    }

    /// Currently connected peers.
    pub async fn connected_peers(&self) -> Result<Vec<PeerId>, NetworkError> {
        self.request(|reply| NetworkCommand::ConnectedPeers { reply })
            .await
    }

    /// Addresses the node is listening on. Empty until the first listener is up.
    pub async fn listen_addrs(&self) -> Result<Vec<Multiaddr>, NetworkError> {
        self.request(|reply| NetworkCommand::ListenAddrs { reply })
            .await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn test_closed_loop_reports_channel_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = NetworkHandle::new(tx, PeerId::random());

        assert_matches!(handle.bootstrap().await, Err(NetworkError::ChannelClosed));
        assert_matches!(handle.publish("t", vec![1]).await, Err(NetworkError::ChannelClosed));
        assert_matches!(handle.get_providers(RecordKey::new(&b"k")), Err(NetworkError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_dropped_reply_reports_channel_closed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = NetworkHandle::new(tx, PeerId::random());

        tokio::spawn(async move {
            // Drop every command without replying.
            while let Some(command) = rx.recv().await {
                drop(command);
            }
        });

        assert_matches!(handle.connected_peers().await, Err(NetworkError::ChannelClosed));
    }
}
