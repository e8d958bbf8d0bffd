//! Error types for the chat layer.

use peerchat_net::NetworkError;

/// Error reported by a network substrate.
#[derive(Debug, thiserror::Error)]
pub enum SubstrateError {
    /// The substrate is gone (network task stopped).
    #[error("network substrate unavailable")]
    Unavailable,
    /// The topic handle was closed.
    #[error("topic {0} is closed")]
    TopicClosed(String),
    /// The peer could not be reached.
    #[error("could not connect to {peer}: {reason}")]
    Unreachable { peer: String, reason: String },
    #[error(transparent)]
    Network(NetworkError),
}

impl SubstrateError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

impl From<NetworkError> for SubstrateError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::ChannelClosed => Self::Unavailable,
            other => Self::Network(other),
        }
    }
}

/// Error from chat room operations.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("could not join room {room}: {source}")]
    Join {
        room: String,
        #[source]
        source: SubstrateError,
    },
    #[error("room session is closed")]
    SessionClosed,
    #[error("user name cannot be empty")]
    EmptyUserName,
    #[error(transparent)]
    Substrate(#[from] SubstrateError),
}
