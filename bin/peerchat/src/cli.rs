//! Command line interface.

use clap::{Args, Parser, ValueEnum};
use peerchat_chat::{DEFAULT_ROOM, DEFAULT_USER, DiscoveryMode};
use peerchat_net::NetworkArgs;
use peerchat_observability::LogArgs;

/// Peerchat - peer-to-peer group chat over libp2p
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct PeerchatCli {
    #[command(flatten)]
    pub(crate) chat: ChatArgs,

    #[command(flatten)]
    pub(crate) logs: LogArgs,

    #[command(flatten)]
    pub(crate) network: NetworkArgs,
}

/// Chat configuration.
#[derive(Debug, Args, Clone)]
#[command(next_help_heading = "Chat")]
pub(crate) struct ChatArgs {
    /// User name shown to other peers.
    #[arg(long, default_value = DEFAULT_USER)]
    pub(crate) user: String,

    /// Room to join on startup.
    #[arg(long, default_value = DEFAULT_ROOM)]
    pub(crate) room: String,

    /// How to find other peerchat nodes.
    #[arg(long = "discovery-mode", value_enum, default_value_t = DiscoveryModeArg::Advertise)]
    pub(crate) discovery_mode: DiscoveryModeArg,
}

impl Default for ChatArgs {
    fn default() -> Self {
        Self {
            user: DEFAULT_USER.to_string(),
            room: DEFAULT_ROOM.to_string(),
            discovery_mode: DiscoveryModeArg::Advertise,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum DiscoveryModeArg {
    /// Advertise and look up once.
    Announce,
    /// Keep advertising and looking up.
    Advertise,
}

impl From<DiscoveryModeArg> for DiscoveryMode {
    fn from(mode: DiscoveryModeArg) -> Self {
        match mode {
            DiscoveryModeArg::Announce => DiscoveryMode::Announce,
            DiscoveryModeArg::Advertise => DiscoveryMode::Advertise,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use peerchat_observability::LogLevel;

    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        PeerchatCli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = PeerchatCli::parse_from(["peerchat"]);
        assert_eq!(cli.chat.user, "newuser");
        assert_eq!(cli.chat.room, "lobby");
        assert_eq!(cli.chat.discovery_mode, DiscoveryModeArg::Advertise);
        assert_eq!(cli.logs.level, LogLevel::Info);
        assert_eq!(cli.network.port, 0);

        let defaults = ChatArgs::default();
        assert_eq!(cli.chat.user, defaults.user);
        assert_eq!(cli.chat.room, defaults.room);
        assert_eq!(cli.chat.discovery_mode, defaults.discovery_mode);
    }

    #[test]
    fn test_flags() {
        let cli = PeerchatCli::parse_from([
            "peerchat",
            "--user",
            "alice",
            "--room",
            "rust",
            "--discovery-mode",
            "announce",
            "--log-level",
            "fatal",
            "--network.no-upnp",
        ]);
        assert_eq!(cli.chat.user, "alice");
        assert_eq!(cli.chat.room, "rust");
        assert_eq!(DiscoveryMode::from(cli.chat.discovery_mode), DiscoveryMode::Announce);
        assert_eq!(cli.logs.level, LogLevel::Fatal);
        assert!(cli.network.no_upnp);
    }
}
