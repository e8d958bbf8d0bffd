//! Node startup sequence.

use std::sync::Arc;

use eyre::{Result, WrapErr};
use peerchat_chat::{
    ChatRoom, Discovery, DiscoveryConfig, LogSink, SessionConfig, SessionContext, bootstrap,
    substrate::{
        Overlay,
        network::{NetworkOverlay, NetworkPubSub},
    },
};
use peerchat_net::{NetworkNode, NodeIdentity};
use peerchat_tasks::TaskExecutor;
use tracing::info;

use crate::{cli::PeerchatCli, console::Console};

/// Start the network, join the overlay and the initial room, then hand the
/// terminal to the console until the user quits or shutdown is triggered.
pub(crate) async fn run(cli: PeerchatCli) -> Result<()> {
    let executor = TaskExecutor::current();
    let shutdown = executor.shutdown_token();

    // One handler for the whole run; the console sees it through `shutdown`.
    let interrupt = shutdown.clone();
    executor.spawn("ctrl-c", async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            interrupt.cancel();
        }
    });

    let identity = NodeIdentity::generate();
    info!(peer_id = %identity.peer_id(), "Generated node identity");

    let config = cli.network.network_config();
    let seeds = config
        .parse_bootnodes()
        .wrap_err("invalid bootstrap peer address")?;

    let (mut node, handle) = NetworkNode::builder(identity.clone())
        .with_config(config)
        .build()
        .wrap_err("failed to build network node")?;
    node.start_listening()
        .wrap_err("failed to start listening")?;
    executor.spawn_critical("network", node.run(shutdown.clone()));

    let overlay: Arc<dyn Overlay> = Arc::new(NetworkOverlay::new(handle.clone()));
    let report = bootstrap(overlay.as_ref(), &seeds)
        .await
        .wrap_err("failed to join the routing overlay")?;
    info!(connected = report.connected, total = report.total, "Overlay bootstrap complete");

    let discovery = Discovery::new(
        overlay,
        executor.clone(),
        DiscoveryConfig {
            mode: cli.chat.discovery_mode.into(),
            ..Default::default()
        },
    );
    discovery.start(shutdown.child());

    let (logs, log_rx) = LogSink::channel();
    let ctx = SessionContext {
        pubsub: Arc::new(NetworkPubSub::new(handle)),
        local_peer: identity.peer_id(),
        logs: logs.clone(),
        executor: executor.clone(),
        cancel: shutdown.child(),
        config: SessionConfig::default(),
    };
    let room = ChatRoom::join(ctx, &cli.chat.room, &cli.chat.user)
        .await
        .wrap_err("failed to join chat room")?;

    Console::new(room, logs, log_rx, executor, shutdown.clone())
        .run()
        .await?;

    shutdown.cancel();
    info!("Peerchat stopped");
    Ok(())
}
