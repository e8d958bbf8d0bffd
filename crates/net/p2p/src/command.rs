//! Commands accepted by the network event loop.

use libp2p::{Multiaddr, PeerId, kad::RecordKey};
use tokio::sync::{mpsc, oneshot};

use crate::{NetworkError, PeerAddress};

pub(crate) type Reply<T> = oneshot::Sender<Result<T, NetworkError>>;

/// Identifies one subscriber of a gossip topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// A gossip message delivered to a topic subscriber.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub data: Vec<u8>,
    /// Signed originator of the message.
    pub source: Option<PeerId>,
    /// Peer that forwarded the message to us.
    pub propagation_source: PeerId,
}

impl InboundMessage {
    /// The originator if known, otherwise the forwarding peer.
    pub fn received_from(&self) -> PeerId {
        self.source.unwrap_or(self.propagation_source)
    }
}

/// Request sent from a [`NetworkHandle`](crate::NetworkHandle) to the event loop.
#[derive(Debug)]
pub enum NetworkCommand {
    /// Connect to a peer; replies once the connection is up or failed.
    Dial { peer: PeerAddress, reply: Reply<()> },
    /// Start a Kademlia bootstrap query.
    Bootstrap { reply: Reply<()> },
    /// Announce a provider record; replies when the query completes.
    StartProviding { key: RecordKey, reply: Reply<()> },
    /// Look up providers; results stream into `results` until the query ends.
    GetProviders { key: RecordKey, results: mpsc::Sender<PeerAddress> },
    /// Subscribe to a gossip topic.
    Subscribe {
        topic: String,
        messages: mpsc::Sender<InboundMessage>,
        reply: Reply<SubscriptionId>,
    },
    /// Drop a subscriber. The topic is left when it has none.
    Unsubscribe { id: SubscriptionId },
    /// Publish to a gossip topic.
    Publish { topic: String, data: Vec<u8>, reply: Reply<()> },
    /// Peers known to be subscribed to a topic.
    TopicPeers { topic: String, reply: Reply<Vec<PeerId>> },
    /// Currently connected peers.
    ConnectedPeers { reply: Reply<Vec<PeerId>> },
    /// Addresses the node is listening on.
    ListenAddrs { reply: Reply<Vec<Multiaddr>> },
}
