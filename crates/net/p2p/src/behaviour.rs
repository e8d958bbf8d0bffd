//! Combined network behaviour for a chat node.

use libp2p::{
    gossipsub, identify,
    identity::Keypair,
    kad::{self, store::MemoryStore},
    swarm::{NetworkBehaviour, behaviour::toggle::Toggle},
    upnp,
};

use crate::{
    NetworkConfig, NetworkError,
    config::{IDENTIFY_PROTOCOL, MAX_GOSSIP_SIZE},
};

/// Network behaviour of a chat node: Kademlia routing and provider records,
/// gossipsub rooms, identify and optional UPnP port mapping.
#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "ChatEvent")]
pub struct ChatBehaviour {
    /// Kademlia DHT, always in server mode.
    pub kademlia: kad::Behaviour<MemoryStore>,

    /// Gossipsub with signed messages.
    pub gossipsub: gossipsub::Behaviour,

    /// Identify; listen addresses it reports feed the routing table.
    pub identify: identify::Behaviour,

    /// UPnP port mapping, disabled with `--network.no-upnp`.
    pub upnp: Toggle<upnp::tokio::Behaviour>,
}

impl ChatBehaviour {
    pub fn new(keypair: &Keypair, config: &NetworkConfig) -> Result<Self, NetworkError> {
        let local_peer_id = keypair.public().to_peer_id();

        let mut kad_config = kad::Config::new(kad::PROTOCOL_NAME);
        kad_config.set_query_timeout(config.kad_query_timeout);
        let mut kademlia =
            kad::Behaviour::with_config(local_peer_id, MemoryStore::new(local_peer_id), kad_config);
        kademlia.set_mode(Some(kad::Mode::Server));

        let gossip_config = gossipsub::ConfigBuilder::default()
            .heartbeat_interval(config.gossip_heartbeat)
            .validation_mode(gossipsub::ValidationMode::Strict)
            .max_transmit_size(MAX_GOSSIP_SIZE)
            .build()
            .map_err(|e| NetworkError::Behaviour(format!("gossipsub config: {e}")))?;
        let gossipsub =
            gossipsub::Behaviour::new(gossipsub::MessageAuthenticity::Signed(keypair.clone()), gossip_config)
                .map_err(|e| NetworkError::Behaviour(format!("gossipsub: {e}")))?;

        let identify = identify::Behaviour::new(
            identify::Config::new(IDENTIFY_PROTOCOL.to_string(), keypair.public())
                .with_agent_version(format!("peerchat/{}", env!("CARGO_PKG_VERSION"))),
        );

        let upnp = Toggle::from(config.enable_upnp.then(upnp::tokio::Behaviour::default));

        Ok(Self {
            kademlia,
            gossipsub,
            identify,
            upnp,
        })
    }
}

/// Events from the chat behaviour.
#[derive(Debug)]
pub enum ChatEvent {
    Kademlia(Box<kad::Event>),
    Gossipsub(Box<gossipsub::Event>),
    Identify(Box<identify::Event>),
    Upnp(upnp::Event),
}

impl From<kad::Event> for ChatEvent {
    fn from(event: kad::Event) -> Self {
        ChatEvent::Kademlia(Box::new(event))
    }
}

impl From<gossipsub::Event> for ChatEvent {
    fn from(event: gossipsub::Event) -> Self {
        ChatEvent::Gossipsub(Box::new(event))
    }
}

impl From<identify::Event> for ChatEvent {
    fn from(event: identify::Event) -> Self {
        ChatEvent::Identify(Box::new(event))
    }
}

impl From<upnp::Event> for ChatEvent {
    fn from(event: upnp::Event) -> Self {
        ChatEvent::Upnp(event)
    }
}
