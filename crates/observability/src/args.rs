//! Logging CLI arguments.

use clap::{Args, ValueEnum};
use tracing::level_filters::LevelFilter;

/// Log severity accepted on the command line.
///
/// `fatal` and `panic` are accepted for compatibility with other chat nodes'
/// flags; both behave like `error`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
    Panic,
}

impl LogLevel {
    /// Tracing level filter for this severity.
    pub fn as_filter(self) -> LevelFilter {
        match self {
            Self::Trace => LevelFilter::TRACE,
            Self::Debug => LevelFilter::DEBUG,
            Self::Info => LevelFilter::INFO,
            Self::Warn => LevelFilter::WARN,
            Self::Error | Self::Fatal | Self::Panic => LevelFilter::ERROR,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Args, Clone)]
#[command(next_help_heading = "Logging")]
pub struct LogArgs {
    /// Level of logs to print.
    #[arg(long = "log-level", value_enum, default_value_t = LogLevel::Info)]
    pub level: LogLevel,

    /// Log filter directive (e.g., "peerchat_net=debug,libp2p_gossipsub=info").
    #[arg(long = "log.filter", value_name = "DIRECTIVE")]
    pub filter: Option<String>,

    /// Do not print the startup banner.
    #[arg(long = "no-banner")]
    pub no_banner: bool,
}

impl Default for LogArgs {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            filter: None,
            no_banner: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        logs: LogArgs,
    }

    #[test]
    fn test_default_level_is_info() {
        let cli = TestCli::parse_from(["peerchat"]);
        assert_eq!(cli.logs.level, LogLevel::Info);
        assert!(cli.logs.filter.is_none());
    }

    #[test]
    fn test_fatal_and_panic_map_to_error() {
        assert_eq!(LogLevel::Fatal.as_filter(), LevelFilter::ERROR);
        assert_eq!(LogLevel::Panic.as_filter(), LevelFilter::ERROR);

        let cli = TestCli::parse_from(["peerchat", "--log-level", "panic"]);
        assert_eq!(cli.logs.level, LogLevel::Panic);
    }

    #[test]
    fn test_unknown_level_rejected() {
        assert!(TestCli::try_parse_from(["peerchat", "--log-level", "loud"]).is_err());
    }
}
