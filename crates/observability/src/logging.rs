//! Logging configuration for the peerchat node.

use eyre::Result;
use tracing_subscriber::EnvFilter;

use crate::args::LogArgs;

/// Initialize logging based on command line arguments.
///
/// The filter is built with the following precedence:
/// 1. Start with `RUST_LOG` env var if set, or the `--log-level` severity
/// 2. Apply any custom filter from `--log.filter`
///
/// Logs are written to stderr; stdout belongs to the chat console.
pub fn init_logging(args: &LogArgs) -> Result<()> {
    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.level.as_filter().to_string()));

    if let Some(custom_filter) = &args.filter {
        for directive in custom_filter.split(',') {
            match directive.parse() {
                Ok(d) => filter = filter.add_directive(d),
                Err(e) => eprintln!("ignoring invalid log directive {directive:?}: {e}"),
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| eyre::eyre!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}

/// Print the startup banner with the peerchat logo and version.
pub fn print_banner(args: &LogArgs) {
    if args.no_banner {
        return;
    }

    let banner = format!(
        r#"
W E L C O M E  T O
                                 _           _
 _ __   ___  ___ _ __ ___  ___| |__   __ _| |_
| '_ \ / _ \/ _ \ '__/ __|/ __| '_ \ / _` | __|
| |_) |  __/  __/ | | (__| (__| | | | (_| | |_
| .__/ \___|\___|_|  \___|\___|_| |_|\__,_|\__|
|_|
 P2P chat v{}
"#,
        env!("CARGO_PKG_VERSION")
    );

    println!("{banner}");
}
