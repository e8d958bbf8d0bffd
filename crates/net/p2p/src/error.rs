//! Error types for the network layer.

/// Error from the libp2p network layer.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Invalid multiaddr {addr}: {reason}")]
    InvalidAddress { addr: String, reason: String },
    #[error("Transport setup failed: {0}")]
    Transport(String),
    #[error("Behaviour setup failed: {0}")]
    Behaviour(String),
    #[error("Failed to listen on {addr}: {reason}")]
    Listen { addr: String, reason: String },
    #[error("Dial failed: {0}")]
    Dial(String),
    #[error("Kademlia error: {0}")]
    Kademlia(String),
    #[error("Subscription error: {0}")]
    Subscription(String),
    #[error("Publish error: {0}")]
    Publish(String),
    #[error("Network channel closed")]
    ChannelClosed,
}
