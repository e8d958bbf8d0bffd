//! libp2p networking for peerchat.
//!
//! A [`NetworkNode`] owns the libp2p swarm (TCP + noise + yamux with DNS,
//! Kademlia in server mode, gossipsub, identify, UPnP) and runs it on a
//! single task. Everything else talks to it through a cloneable
//! [`NetworkHandle`].

mod address;
mod behaviour;
mod command;
mod config;
mod error;
mod handle;
mod identity;
mod node;
pub mod transport;

#[cfg(feature = "cli")]
mod args;

pub use address::{PeerAddress, extract_peer_id};
pub use behaviour::{ChatBehaviour, ChatEvent};
pub use command::{InboundMessage, NetworkCommand, SubscriptionId};
pub use config::{DEFAULT_BOOTNODES, MAX_GOSSIP_SIZE, NetworkConfig, SUBSCRIPTION_BUFFER};
pub use error::NetworkError;
pub use handle::NetworkHandle;
pub use identity::NodeIdentity;
pub use node::{NetworkNode, NetworkNodeBuilder, provider_key};

#[cfg(feature = "cli")]
pub use args::NetworkArgs;

pub use libp2p::{Multiaddr, PeerId, kad::RecordKey};
