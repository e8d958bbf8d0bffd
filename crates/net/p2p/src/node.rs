//! The network node: swarm construction and the event loop that owns it.

use std::collections::HashMap;

use futures::StreamExt;
use libp2p::{
    Multiaddr, PeerId, Swarm, SwarmBuilder,
    gossipsub::{self, IdentTopic, TopicHash},
    identify,
    kad::{self, QueryId, RecordKey},
    noise,
    swarm::{
        ConnectionId, SwarmEvent,
        dial_opts::{DialOpts, PeerCondition},
    },
    upnp, yamux,
};
use peerchat_tasks::CancelToken;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::{
    ChatBehaviour, ChatEvent, InboundMessage, NetworkConfig, NetworkError, NetworkHandle,
    NodeIdentity, PeerAddress, SubscriptionId,
    command::{NetworkCommand, Reply},
    transport,
};

/// Builder for [`NetworkNode`].
pub struct NetworkNodeBuilder {
    identity: NodeIdentity,
    config: NetworkConfig,
}

impl NetworkNodeBuilder {
    pub fn new(identity: NodeIdentity) -> Self {
        Self {
            identity,
            config: NetworkConfig::default(),
        }
    }

    pub fn with_config(mut self, config: NetworkConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the swarm. Listen addresses are validated here; nothing is bound yet.
    pub fn build(self) -> Result<(NetworkNode, NetworkHandle), NetworkError> {
        let listen_addrs = self.config.parse_listen_addrs()?;
        let config = self.config;
        let idle_timeout = config.idle_timeout;

        let swarm = SwarmBuilder::with_existing_identity(self.identity.keypair().clone())
            .with_tokio()
            .with_tcp(transport::tcp_config(), noise::Config::new, yamux::Config::default)
            .map_err(|e| NetworkError::Transport(format!("tcp: {e}")))?
            .with_dns()
            .map_err(|e| NetworkError::Transport(format!("dns: {e}")))?
            .with_behaviour(|key| {
                ChatBehaviour::new(key, &config)
                    .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
            })
            .map_err(|e| NetworkError::Behaviour(e.to_string()))?
            .with_swarm_config(|c| c.with_idle_connection_timeout(idle_timeout))
            .build();

        let local_peer_id = *swarm.local_peer_id();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        info!(%local_peer_id, upnp = config.enable_upnp, "Network node built");

        let node = NetworkNode {
            swarm,
            command_rx,
            listen_addrs,
            pending_dials: HashMap::new(),
            pending_provides: HashMap::new(),
            provider_queries: HashMap::new(),
            topics: HashMap::new(),
            subscriptions: HashMap::new(),
            next_subscription: 0,
        };

        Ok((node, NetworkHandle::new(command_tx, local_peer_id)))
    }
}

/// A libp2p node running Kademlia, gossipsub, identify and UPnP.
///
/// All swarm access happens on the task running [`NetworkNode::run`]; other
/// tasks talk to it through a [`NetworkHandle`].
///
/// ```ignore
/// let (mut node, handle) = NetworkNode::builder(identity).with_config(config).build()?;
/// node.start_listening()?;
/// executor.spawn_critical("network", node.run(shutdown));
/// ```
pub struct NetworkNode {
    swarm: Swarm<ChatBehaviour>,
    command_rx: mpsc::UnboundedReceiver<NetworkCommand>,
    listen_addrs: Vec<Multiaddr>,
    pending_dials: HashMap<ConnectionId, Reply<()>>,
    pending_provides: HashMap<QueryId, Reply<()>>,
    provider_queries: HashMap<QueryId, mpsc::Sender<PeerAddress>>,
    topics: HashMap<TopicHash, Vec<Subscriber>>,
    subscriptions: HashMap<SubscriptionId, IdentTopic>,
    next_subscription: u64,
}

struct Subscriber {
    id: SubscriptionId,
    messages: mpsc::Sender<InboundMessage>,
}

impl NetworkNode {
    pub fn builder(identity: NodeIdentity) -> NetworkNodeBuilder {
        NetworkNodeBuilder::new(identity)
    }

    pub fn local_peer_id(&self) -> &PeerId {
        self.swarm.local_peer_id()
    }

    /// Bind every configured listen address. A failure on any of them is fatal.
    pub fn start_listening(&mut self) -> Result<(), NetworkError> {
        for addr in &self.listen_addrs {
            self.swarm
                .listen_on(addr.clone())
                .map_err(|e| NetworkError::Listen {
                    addr: addr.to_string(),
                    reason: e.to_string(),
                })?;
            debug!(%addr, "Listener registered");
        }
        Ok(())
    }

    /// Run the event loop until `shutdown` fires or every handle is dropped.
    pub async fn run(mut self, shutdown: CancelToken) {
        info!("Starting network event loop");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Network event loop shutting down");
                    break;
                }
                event = self.swarm.select_next_some() => self.handle_swarm_event(event),
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All network handles dropped");
                        break;
                    }
                },
            }
        }
    }

    fn handle_command(&mut self, command: NetworkCommand) {
        match command {
            NetworkCommand::Dial { peer, reply } => self.dial(peer, reply),
            NetworkCommand::Bootstrap { reply } => {
                let result = self
                    .swarm
                    .behaviour_mut()
                    .kademlia
                    .bootstrap()
                    .map(|id| debug!(?id, "Kademlia bootstrap started"))
                    .map_err(|e| NetworkError::Kademlia(e.to_string()));
                let _ = reply.send(result);
            }
            NetworkCommand::StartProviding { key, reply } => {
                match self.swarm.behaviour_mut().kademlia.start_providing(key) {
                    Ok(id) => {
                        self.pending_provides.insert(id, reply);
                    }
                    Err(e) => {
                        let _ = reply.send(Err(NetworkError::Kademlia(e.to_string())));
                    }
                }
            }
            NetworkCommand::GetProviders { key, results } => {
                let id = self.swarm.behaviour_mut().kademlia.get_providers(key);
                self.provider_queries.insert(id, results);
            }
            NetworkCommand::Subscribe {
                topic,
                messages,
                reply,
            } => {
                let _ = reply.send(self.subscribe(topic, messages));
            }
            NetworkCommand::Unsubscribe { id } => self.unsubscribe(id),
            NetworkCommand::Publish { topic, data, reply } => {
                let _ = reply.send(self.publish(topic, data));
            }
            NetworkCommand::TopicPeers { topic, reply } => {
                let _ = reply.send(Ok(self.topic_peers(&IdentTopic::new(topic).hash())));
            }
            NetworkCommand::ConnectedPeers { reply } => {
                let _ = reply.send(Ok(self.swarm.connected_peers().copied().collect()));
            }
            NetworkCommand::ListenAddrs { reply } => {
                let _ = reply.send(Ok(self.swarm.listeners().cloned().collect()));
            }
        }
    }

    fn dial(&mut self, peer: PeerAddress, reply: Reply<()>) {
        if self.swarm.is_connected(&peer.peer_id) {
            let _ = reply.send(Ok(()));
            return;
        }

        for addr in &peer.addrs {
            self.swarm
                .behaviour_mut()
                .kademlia
                .add_address(&peer.peer_id, addr.clone());
        }

        let opts = DialOpts::peer_id(peer.peer_id)
            .addresses(peer.addrs.clone())
            .condition(PeerCondition::Disconnected)
            .build();
        let connection_id = opts.connection_id();

        match self.swarm.dial(opts) {
            Ok(()) => {
                trace!(%peer, %connection_id, "Dial initiated");
                self.pending_dials.insert(connection_id, reply);
            }
            Err(e) => {
                let _ = reply.send(Err(NetworkError::Dial(format!("{}: {e}", peer.peer_id))));
            }
        }
    }

    fn subscribe(
        &mut self,
        topic: String,
        messages: mpsc::Sender<InboundMessage>,
    ) -> Result<SubscriptionId, NetworkError> {
        let topic = IdentTopic::new(topic);
        self.swarm
            .behaviour_mut()
            .gossipsub
            .subscribe(&topic)
            .map_err(|e| NetworkError::Subscription(format!("{topic}: {e}")))?;

        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;

        self.topics
            .entry(topic.hash())
            .or_default()
            .push(Subscriber { id, messages });
        debug!(%topic, ?id, "Subscribed to topic");
        self.subscriptions.insert(id, topic);
        Ok(id)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        let Some(topic) = self.subscriptions.remove(&id) else {
            return;
        };
        let hash = topic.hash();
        let now_empty = match self.topics.get_mut(&hash) {
            Some(subscribers) => {
                subscribers.retain(|s| s.id != id);
                subscribers.is_empty()
            }
            None => true,
        };
        if now_empty {
            self.topics.remove(&hash);
            let _ = self.swarm.behaviour_mut().gossipsub.unsubscribe(&topic);
            debug!(%topic, "Left topic");
        }
    }

    fn publish(&mut self, topic: String, data: Vec<u8>) -> Result<(), NetworkError> {
        let topic = IdentTopic::new(topic);
        // Nobody to deliver to yet; the message is simply not seen by anyone.
        if self.topic_peers(&topic.hash()).is_empty() {
            trace!(%topic, "No peers subscribed, message not sent");
            return Ok(());
        }
        self.swarm
            .behaviour_mut()
            .gossipsub
            .publish(topic.clone(), data)
            .map(|_| ())
            .map_err(|e| NetworkError::Publish(format!("{topic}: {e}")))
    }

    fn topic_peers(&self, hash: &TopicHash) -> Vec<PeerId> {
        self.swarm
            .behaviour()
            .gossipsub
            .all_peers()
            .filter(|(_, topics)| topics.contains(&hash))
            .map(|(peer, _)| *peer)
            .collect()
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<ChatEvent>) {
        match event {
            SwarmEvent::Behaviour(event) => self.handle_behaviour_event(event),
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "Listening on address");
            }
            SwarmEvent::ExpiredListenAddr { address, .. } => {
                info!(%address, "Expired listen address");
            }
            SwarmEvent::ConnectionEstablished {
                peer_id,
                connection_id,
                endpoint,
                num_established,
                ..
            } => {
                debug!(
                    %peer_id,
                    endpoint = %endpoint.get_remote_address(),
                    num_established,
                    "Connection established"
                );
                if let Some(reply) = self.pending_dials.remove(&connection_id) {
                    let _ = reply.send(Ok(()));
                }
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                cause,
                num_established,
                ..
            } => {
                debug!(%peer_id, num_established, cause = ?cause, "Connection closed");
            }
            SwarmEvent::OutgoingConnectionError {
                connection_id,
                peer_id,
                error,
            } => {
                debug!(?peer_id, %error, "Outgoing connection error");
                if let Some(reply) = self.pending_dials.remove(&connection_id) {
                    let peer = peer_id.map(|p| p.to_string()).unwrap_or_default();
                    let _ = reply.send(Err(NetworkError::Dial(format!("{peer}: {error}"))));
                }
            }
            SwarmEvent::IncomingConnection {
                local_addr,
                send_back_addr,
                ..
            } => {
                trace!(%local_addr, %send_back_addr, "Incoming connection");
            }
            SwarmEvent::ExternalAddrConfirmed { address } => {
                info!(%address, "External address confirmed");
            }
            _ => {}
        }
    }

    fn handle_behaviour_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::Kademlia(event) => self.handle_kademlia_event(*event),
            ChatEvent::Gossipsub(event) => self.handle_gossipsub_event(*event),
            ChatEvent::Identify(event) => self.handle_identify_event(*event),
            ChatEvent::Upnp(event) => self.handle_upnp_event(event),
        }
    }

    fn handle_kademlia_event(&mut self, event: kad::Event) {
        match event {
            kad::Event::OutboundQueryProgressed { id, result, .. } => match result {
                kad::QueryResult::StartProviding(result) => {
                    let result = result
                        .map(|ok| debug!(?id, key = ?ok.key, "Provider record stored"))
                        .map_err(|e| NetworkError::Kademlia(e.to_string()));
                    if let Some(reply) = self.pending_provides.remove(&id) {
                        let _ = reply.send(result);
                    }
                }
                kad::QueryResult::GetProviders(Ok(kad::GetProvidersOk::FoundProviders {
                    providers,
                    ..
                })) => self.forward_providers(id, providers),
                kad::QueryResult::GetProviders(Ok(
                    kad::GetProvidersOk::FinishedWithNoAdditionalRecord { .. },
                )) => {
                    trace!(?id, "Provider lookup finished");
                    self.provider_queries.remove(&id);
                }
                kad::QueryResult::GetProviders(Err(e)) => {
                    debug!(?id, %e, "Provider lookup failed");
                    self.provider_queries.remove(&id);
                }
                kad::QueryResult::Bootstrap(Ok(kad::BootstrapOk {
                    peer,
                    num_remaining,
                })) => {
                    debug!(?id, %peer, num_remaining, "Kademlia bootstrap progress");
                }
                kad::QueryResult::Bootstrap(Err(e)) => {
                    warn!(?id, %e, "Kademlia bootstrap failed");
                }
                other => {
                    trace!(?id, ?other, "Other Kademlia query result");
                }
            },
            kad::Event::RoutingUpdated {
                peer, addresses, ..
            } => {
                trace!(%peer, ?addresses, "Kademlia routing table updated");
            }
            other => {
                trace!(?other, "Other Kademlia event");
            }
        }
    }

    fn forward_providers(&mut self, id: QueryId, providers: impl IntoIterator<Item = PeerId>) {
        let Some(results) = self.provider_queries.get(&id) else {
            return;
        };
        for peer_id in providers {
            match results.try_send(PeerAddress::from_peer_id(peer_id)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(?id, %peer_id, "Provider results full, dropping provider");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.provider_queries.remove(&id);
                    if let Some(mut query) = self.swarm.behaviour_mut().kademlia.query_mut(&id) {
                        query.finish();
                    }
                    return;
                }
            }
        }
    }

    fn handle_gossipsub_event(&mut self, event: gossipsub::Event) {
        match event {
            gossipsub::Event::Message {
                propagation_source,
                message,
                ..
            } => {
                let Some(subscribers) = self.topics.get_mut(&message.topic) else {
                    trace!(topic = %message.topic, "Message for topic without subscribers");
                    return;
                };
                let inbound = InboundMessage {
                    data: message.data,
                    source: message.source,
                    propagation_source,
                };
                subscribers.retain(|s| match s.messages.try_send(inbound.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(id = ?s.id, "Subscriber queue full, dropping message");
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
            }
            gossipsub::Event::Subscribed { peer_id, topic } => {
                debug!(%peer_id, %topic, "Peer subscribed to topic");
            }
            gossipsub::Event::Unsubscribed { peer_id, topic } => {
                debug!(%peer_id, %topic, "Peer unsubscribed from topic");
            }
            other => {
                trace!(?other, "Other gossipsub event");
            }
        }
    }

    fn handle_identify_event(&mut self, event: identify::Event) {
        if let identify::Event::Received { peer_id, info, .. } = event {
            debug!(
                %peer_id,
                protocol_version = %info.protocol_version,
                agent_version = %info.agent_version,
                listen_addrs = info.listen_addrs.len(),
                "Received identify info"
            );
            if info.protocols.iter().any(|p| *p == kad::PROTOCOL_NAME) {
                let kademlia = &mut self.swarm.behaviour_mut().kademlia;
                for addr in info.listen_addrs {
                    kademlia.add_address(&peer_id, addr);
                }
            }
        }
    }

    fn handle_upnp_event(&mut self, event: upnp::Event) {
        match event {
            upnp::Event::NewExternalAddr(addr) => {
                info!(%addr, "UPnP mapped external address");
                self.swarm.add_external_address(addr);
            }
            upnp::Event::ExpiredExternalAddr(addr) => {
                debug!(%addr, "UPnP mapping expired");
                self.swarm.remove_external_address(&addr);
            }
            upnp::Event::GatewayNotFound => {
                warn!("UPnP gateway not found, port mapping disabled");
            }
            upnp::Event::NonRoutableGateway => {
                info!("UPnP gateway is not routable, port mapping disabled");
            }
            #[allow(unreachable_patterns)]
            other => {
                debug!(?other, "Other UPnP event");
            }
        }
    }
}

/// Record key for a provider advertisement.
pub fn provider_key(bytes: impl AsRef<[u8]>) -> RecordKey {
    RecordKey::new(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> NetworkConfig {
        NetworkConfig {
            listen_addrs: vec!["/ip4/127.0.0.1/tcp/0".to_string()],
            enable_upnp: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_build_rejects_bad_listen_addr() {
        let config = NetworkConfig {
            listen_addrs: vec!["/ip4/not-an-ip/tcp/0".to_string()],
            ..local_config()
        };
        let result = NetworkNode::builder(NodeIdentity::generate())
            .with_config(config)
            .build();
        assert!(matches!(result, Err(NetworkError::InvalidAddress { .. })));
    }

    #[tokio::test]
    async fn test_handle_reports_local_peer_id() {
        let identity = NodeIdentity::generate();
        let (node, handle) = NetworkNode::builder(identity.clone())
            .with_config(local_config())
            .build()
            .unwrap();
        assert_eq!(handle.local_peer_id(), identity.peer_id());
        assert_eq!(*node.local_peer_id(), identity.peer_id());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (mut node, handle) = NetworkNode::builder(NodeIdentity::generate())
            .with_config(local_config())
            .build()
            .unwrap();
        node.start_listening().unwrap();

        let shutdown = CancelToken::new();
        let task = tokio::spawn(node.run(shutdown.clone()));

        assert!(handle.connected_peers().await.unwrap().is_empty());
        shutdown.cancel();
        task.await.unwrap();

        assert!(matches!(handle.bootstrap().await, Err(NetworkError::ChannelClosed)));
    }
}
