//! Joining the routing overlay through seed peers.

use futures::future::join_all;
use peerchat_net::PeerAddress;
use tracing::{debug, info, warn};

use crate::{ChatError, SubstrateError, substrate::Overlay};

/// Outcome of the seed fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapReport {
    pub connected: usize,
    pub total: usize,
}

/// Dial every seed concurrently, then start a routing table bootstrap.
///
/// Returns once every dial attempt has resolved. Unreachable seeds are only
/// counted; the call fails only if the overlay itself is unavailable.
pub async fn bootstrap(overlay: &dyn Overlay, seeds: &[PeerAddress]) -> Result<BootstrapReport, ChatError> {
    let attempts = seeds.iter().map(|seed| async move {
        let result = overlay.connect(seed.clone()).await;
        if let Err(e) = &result {
            debug!(peer = %seed, %e, "Failed to connect to bootstrap peer");
        }
        result
    });
    let results = join_all(attempts).await;

    if results
        .iter()
        .any(|r| matches!(r, Err(SubstrateError::Unavailable)))
    {
        return Err(SubstrateError::Unavailable.into());
    }

    let report = BootstrapReport {
        connected: results.iter().filter(|r| r.is_ok()).count(),
        total: seeds.len(),
    };
    info!(
        connected = report.connected,
        total = report.total,
        "Connected to {} out of {} bootstrap peers",
        report.connected,
        report.total
    );

    match overlay.bootstrap_routing().await {
        Ok(()) => {}
        Err(SubstrateError::Unavailable) => return Err(SubstrateError::Unavailable.into()),
        Err(e) => warn!(%e, "Routing table bootstrap not started"),
    }

    Ok(report)
}
