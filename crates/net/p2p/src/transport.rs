//! Transport settings used by the swarm builder.
//!
//! The transport stack itself (TCP, noise, yamux, DNS) is assembled by
//! [`libp2p::SwarmBuilder`] in [`NetworkNodeBuilder::build`](crate::NetworkNodeBuilder::build).

/// TCP configuration with Nagle's algorithm disabled.
pub fn tcp_config() -> libp2p::tcp::Config {
    libp2p::tcp::Config::default().nodelay(true)
}
