//! Node identity.

use std::fmt;

use libp2p::{PeerId, identity::Keypair};

/// Keypair and derived peer id of the local node.
///
/// A fresh ed25519 identity is generated per process; nothing is persisted.
#[derive(Clone)]
pub struct NodeIdentity {
    keypair: Keypair,
    peer_id: PeerId,
}

impl NodeIdentity {
    /// Generate a new random ed25519 identity.
    pub fn generate() -> Self {
        Self::from_keypair(Keypair::generate_ed25519())
    }

    /// Wrap an existing keypair.
    pub fn from_keypair(keypair: Keypair) -> Self {
        let peer_id = keypair.public().to_peer_id();
        Self { keypair, peer_id }
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }
}

impl fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_identities_are_distinct() {
        let a = NodeIdentity::generate();
        let b = NodeIdentity::generate();
        assert_ne!(a.peer_id(), b.peer_id());
    }

    #[test]
    fn test_debug_does_not_leak_keypair() {
        let identity = NodeIdentity::generate();
        let rendered = format!("{identity:?}");
        assert!(rendered.contains(&identity.peer_id().to_string()));
        assert!(!rendered.contains("keypair"));
    }
}
