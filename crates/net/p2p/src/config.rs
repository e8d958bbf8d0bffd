//! Network configuration.

use std::time::Duration;

use libp2p::Multiaddr;

use crate::{NetworkError, PeerAddress};

/// Public libp2p bootstrap peers.
pub const DEFAULT_BOOTNODES: &[&str] = &[
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmQCU2EcMqAqQPR2i9bChDtGNJchTbq5TbXJJ16u19uLTa",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmbLHAnMoJPWSCR5Zhtx6BHJX9KiKNN6tpvbUcqanj75Nb",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmcZf59bWwK5XFi76CZX8cbJ4BhTzzA3gU1ZjYZcYW3dwt",
    "/ip4/104.131.131.82/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ",
];

/// Maximum gossip message size (64 KiB).
pub const MAX_GOSSIP_SIZE: usize = 65_536;

/// Identify protocol version advertised to peers.
pub const IDENTIFY_PROTOCOL: &str = "/peerchat/id/1.0.0";

/// Capacity of each topic subscriber's delivery queue.
pub const SUBSCRIPTION_BUFFER: usize = 128;

/// Configuration for [`NetworkNode`](crate::NetworkNode).
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Multiaddrs to listen on.
    pub listen_addrs: Vec<String>,
    /// Seed peers, each ending in `/p2p/<peer id>`. Empty means [`DEFAULT_BOOTNODES`].
    pub bootnodes: Vec<String>,
    /// Map the listen port on the local gateway via UPnP.
    pub enable_upnp: bool,
    /// Close connections without active streams after this long.
    pub idle_timeout: Duration,
    /// Timeout of a single Kademlia query.
    pub kad_query_timeout: Duration,
    /// Gossipsub heartbeat interval.
    pub gossip_heartbeat: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addrs: vec!["/ip4/0.0.0.0/tcp/0".to_string()],
            bootnodes: Vec::new(),
            enable_upnp: true,
            idle_timeout: Duration::from_secs(60),
            kad_query_timeout: Duration::from_secs(60),
            gossip_heartbeat: Duration::from_secs(1),
        }
    }
}

impl NetworkConfig {
    /// Parse the configured listen addresses. Any unparsable entry is an error.
    pub fn parse_listen_addrs(&self) -> Result<Vec<Multiaddr>, NetworkError> {
        self.listen_addrs
            .iter()
            .map(|s| {
                s.parse::<Multiaddr>().map_err(|e| NetworkError::InvalidAddress {
                    addr: s.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    /// Parse the seed peers, falling back to [`DEFAULT_BOOTNODES`].
    pub fn parse_bootnodes(&self) -> Result<Vec<PeerAddress>, NetworkError> {
        if self.bootnodes.is_empty() {
            DEFAULT_BOOTNODES.iter().map(|s| s.parse()).collect()
        } else {
            self.bootnodes.iter().map(|s| s.parse()).collect()
        }
    }
}
