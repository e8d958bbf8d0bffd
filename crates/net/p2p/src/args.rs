//! P2P network CLI arguments.

use clap::Args;

use crate::NetworkConfig;

/// Default P2P listen port (0 picks an ephemeral port).
const DEFAULT_P2P_PORT: u16 = 0;

/// Default listen address.
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0";

/// P2P network configuration.
#[derive(Debug, Args, Clone)]
#[command(next_help_heading = "Networking")]
pub struct NetworkArgs {
    /// Comma-separated list of bootstrap peer multiaddresses.
    ///
    /// Each entry must end in `/p2p/<peer id>`. Defaults to the public libp2p
    /// bootstrap peers.
    #[arg(long = "network.bootnodes", value_delimiter = ',')]
    pub bootnodes: Option<Vec<String>>,

    /// P2P listen port.
    #[arg(long = "network.port", default_value_t = DEFAULT_P2P_PORT)]
    pub port: u16,

    /// P2P listen address.
    #[arg(long = "network.addr", default_value = DEFAULT_LISTEN_ADDR)]
    pub addr: String,

    /// Disable UPnP port mapping on the local gateway.
    #[arg(long = "network.no-upnp")]
    pub no_upnp: bool,
}

impl Default for NetworkArgs {
    fn default() -> Self {
        Self {
            bootnodes: None,
            port: DEFAULT_P2P_PORT,
            addr: DEFAULT_LISTEN_ADDR.to_string(),
            no_upnp: false,
        }
    }
}

impl NetworkArgs {
    /// Listen multiaddr built from `--network.addr` and `--network.port`.
    pub fn listen_addr(&self) -> String {
        let proto = if self.addr.contains(':') { "ip6" } else { "ip4" };
        format!("/{proto}/{}/tcp/{}", self.addr, self.port)
    }

    /// Network configuration for these arguments.
    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            listen_addrs: vec![self.listen_addr()],
            bootnodes: self.bootnodes.clone().unwrap_or_default(),
            enable_upnp: !self.no_upnp,
            ..Default::default()
        }
    }
}
