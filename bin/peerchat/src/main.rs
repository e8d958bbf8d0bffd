//! Peerchat node binary.

mod cli;
mod console;
mod launch;

use clap::Parser;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let cli = cli::PeerchatCli::parse();
    peerchat_observability::init_logging(&cli.logs)?;
    peerchat_observability::print_banner(&cli.logs);

    launch::run(cli).await
}
