//! Peer addressing.

use std::{fmt, str::FromStr};

use libp2p::{Multiaddr, PeerId, multiaddr::Protocol};

use crate::NetworkError;

/// A peer id with the transport addresses it may be reached at.
///
/// Addresses never carry a trailing `/p2p/<id>` component; the swarm appends
/// it when dialing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddress {
    pub peer_id: PeerId,
    pub addrs: Vec<Multiaddr>,
}

impl PeerAddress {
    pub fn new(peer_id: PeerId, addrs: Vec<Multiaddr>) -> Self {
        Self { peer_id, addrs }
    }

    /// A peer with no known addresses; dialing relies on the routing table.
    pub fn from_peer_id(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            addrs: Vec::new(),
        }
    }

    /// Split a multiaddr ending in `/p2p/<peer id>` into its parts.
    pub fn from_multiaddr(addr: &Multiaddr) -> Result<Self, NetworkError> {
        let (peer_id, clean) = extract_peer_id(addr).ok_or_else(|| NetworkError::InvalidAddress {
            addr: addr.to_string(),
            reason: "missing /p2p/<peer id> component".into(),
        })?;
        Ok(Self::new(peer_id, vec![clean]))
    }
}

impl FromStr for PeerAddress {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: Multiaddr = s.parse().map_err(|e: libp2p::multiaddr::Error| {
            NetworkError::InvalidAddress {
                addr: s.to_string(),
                reason: e.to_string(),
            }
        })?;
        Self::from_multiaddr(&addr)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addrs.first() {
            Some(addr) => write!(f, "{addr}/p2p/{}", self.peer_id),
            None => write!(f, "{}", self.peer_id),
        }
    }
}

/// Extract the peer id from a multiaddr, returning it together with the
/// address stripped of its `/p2p/` component.
pub fn extract_peer_id(addr: &Multiaddr) -> Option<(PeerId, Multiaddr)> {
    let mut peer_id = None;
    let mut clean = Multiaddr::empty();
    for proto in addr.iter() {
        match proto {
            Protocol::P2p(id) => peer_id = Some(id),
            other => clean.push(other),
        }
    }
    peer_id.map(|id| (id, clean))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const SEED: &str = "/ip4/104.131.131.82/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ";

    #[test]
    fn test_parse_strips_p2p_component() {
        let peer: PeerAddress = SEED.parse().unwrap();
        assert_eq!(
            peer.peer_id.to_string(),
            "QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ"
        );
        assert_eq!(peer.addrs, vec!["/ip4/104.131.131.82/tcp/4001".parse::<Multiaddr>().unwrap()]);
        assert_eq!(peer.to_string(), SEED);
    }

    #[test]
    fn test_parse_without_peer_id_fails() {
        assert_matches!(
            "/ip4/127.0.0.1/tcp/4001".parse::<PeerAddress>(),
            Err(NetworkError::InvalidAddress { .. })
        );
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert_matches!(
            "not a multiaddr".parse::<PeerAddress>(),
            Err(NetworkError::InvalidAddress { .. })
        );
    }

    #[test]
    fn test_dnsaddr_seed_parses() {
        let peer: PeerAddress = "/dnsaddr/bootstrap.libp2p.io/p2p/QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN"
            .parse()
            .unwrap();
        assert_eq!(peer.addrs.len(), 1);
        assert!(peer.addrs[0].to_string().starts_with("/dnsaddr/"));
    }
}
