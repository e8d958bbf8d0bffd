//! Service discovery through Kademlia provider records.
//!
//! Every node announces itself as a provider of the same content key, derived
//! from a compiled-in service name, and looks up the other providers of that
//! key. Nodes that know nothing about each other meet this way.

use std::{fmt, sync::Arc, time::Duration};

use peerchat_net::PeerAddress;
use peerchat_tasks::{CancelToken, TaskExecutor};
use sha2::{Digest, Sha256};
use tokio::{sync::mpsc, time::sleep};
use tracing::{debug, info, warn};

use crate::substrate::Overlay;

/// Name every peerchat node advertises under.
pub const SERVICE_NAME: &str = "manishmeganathan/peerchat";

/// Multihash header for a 32 byte sha2-256 digest.
const SHA2_256_MULTIHASH: [u8; 2] = [0x12, 0x20];

const PEER_STREAM_BUFFER: usize = 128;

/// Provider key for a service: the sha2-256 multihash of its name.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ServiceAdvertisement(Vec<u8>);

impl ServiceAdvertisement {
    pub fn new(service_name: &str) -> Self {
        let digest = Sha256::digest(service_name.as_bytes());
        let mut bytes = Vec::with_capacity(SHA2_256_MULTIHASH.len() + digest.len());
        bytes.extend_from_slice(&SHA2_256_MULTIHASH);
        bytes.extend_from_slice(&digest);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ServiceAdvertisement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(&self.0).into_string())
    }
}

impl fmt::Debug for ServiceAdvertisement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceAdvertisement({self})")
    }
}

/// How the node finds other chat peers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Provide once, look up once, connect to what was found.
    Announce,
    /// Keep re-advertising and keep looking up for the process lifetime.
    #[default]
    Advertise,
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub mode: DiscoveryMode,
    pub service_name: String,
    pub readvertise_interval: Duration,
    pub refresh_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mode: DiscoveryMode::default(),
            service_name: SERVICE_NAME.to_string(),
            readvertise_interval: Duration::from_secs(10 * 60),
            refresh_interval: Duration::from_secs(30),
        }
    }
}

/// Peers found by [`Discovery::find_peers`].
#[derive(Debug)]
pub struct PeerStream {
    rx: mpsc::Receiver<PeerAddress>,
}

impl PeerStream {
    /// Next discovered peer; `None` once discovery stopped.
    pub async fn next(&mut self) -> Option<PeerAddress> {
        self.rx.recv().await
    }
}

/// Advertises this node and connects to other providers of the service.
#[derive(Clone)]
pub struct Discovery {
    overlay: Arc<dyn Overlay>,
    executor: TaskExecutor,
    advertisement: ServiceAdvertisement,
    config: DiscoveryConfig,
}

impl Discovery {
    pub fn new(overlay: Arc<dyn Overlay>, executor: TaskExecutor, config: DiscoveryConfig) -> Self {
        let advertisement = ServiceAdvertisement::new(&config.service_name);
        Self {
            overlay,
            executor,
            advertisement,
            config,
        }
    }

    pub fn advertisement(&self) -> &ServiceAdvertisement {
        &self.advertisement
    }

    /// Spawn the discovery tasks for the configured mode.
    pub fn start(&self, cancel: CancelToken) {
        info!(mode = ?self.config.mode, service = %self.advertisement, "Starting peer discovery");
        match self.config.mode {
            DiscoveryMode::Advertise => {
                let advertiser = self.clone();
                let advertise_cancel = cancel.clone();
                self.executor.spawn_with_cancel("discovery-advertise", cancel.clone(), async move {
                    advertiser.advertise(advertise_cancel).await
                });

                let stream = self.find_peers(cancel.clone());
                let connector = self.clone();
                self.executor.spawn_with_cancel(
                    "discovery-connect",
                    cancel.clone(),
                    async move { connector.connect_discovered(stream, cancel).await },
                );
            }
            DiscoveryMode::Announce => {
                let announcer = self.clone();
                self.executor.spawn_with_cancel("discovery-announce", cancel, async move {
                    announcer.announce().await;
                });
            }
        }
    }

    /// Announce the advertisement now and again every `readvertise_interval`.
    pub async fn advertise(&self, cancel: CancelToken) {
        loop {
            match self.overlay.provide(self.advertisement.as_bytes()).await {
                Ok(()) => debug!(service = %self.advertisement, "Service advertised"),
                Err(e) => warn!(%e, "Failed to advertise service, retrying later"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.config.readvertise_interval) => {}
            }
        }
    }

    /// Stream of providers, refreshed every `refresh_interval` until `cancel` fires.
    pub fn find_peers(&self, cancel: CancelToken) -> PeerStream {
        let (tx, rx) = mpsc::channel(PEER_STREAM_BUFFER);
        let overlay = self.overlay.clone();
        let key = self.advertisement.as_bytes().to_vec();
        let refresh = self.config.refresh_interval;

        self.executor
            .spawn_with_cancel("discovery-refresh", cancel.clone(), async move {
                loop {
                    match overlay.find_providers(&key).await {
                        Ok(mut providers) => {
                            while let Some(peer) = providers.recv().await {
                                if tx.send(peer).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) if e.is_unavailable() => return,
                        Err(e) => debug!(%e, "Provider lookup failed"),
                    }

                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = sleep(refresh) => {}
                    }
                }
            });

        PeerStream { rx }
    }

    /// Connect to every discovered peer other than ourselves.
    ///
    /// Each attempt runs on its own task; failures are logged and dropped.
    pub async fn connect_discovered(&self, mut stream: PeerStream, cancel: CancelToken) {
        let local = self.overlay.local_peer_id();
        loop {
            let peer = tokio::select! {
                _ = cancel.cancelled() => break,
                peer = stream.next() => peer,
            };
            let Some(peer) = peer else { break };
            if peer.peer_id == local {
                continue;
            }

            let overlay = self.overlay.clone();
            self.executor.spawn("discovery-dial", async move {
                let peer_id = peer.peer_id;
                match overlay.connect(peer).await {
                    Ok(()) => debug!(%peer_id, "Connected to discovered peer"),
                    Err(e) => debug!(%peer_id, %e, "Failed to connect to discovered peer"),
                }
            });
        }
    }

    /// One-shot discovery: provide, look up once, connect to each provider in turn.
    ///
    /// Returns the number of providers connected to.
    pub async fn announce(&self) -> usize {
        if let Err(e) = self.overlay.provide(self.advertisement.as_bytes()).await {
            warn!(%e, "Failed to announce service");
        }

        let local = self.overlay.local_peer_id();
        let mut connected = 0;
        match self.overlay.find_providers(self.advertisement.as_bytes()).await {
            Ok(mut providers) => {
                while let Some(peer) = providers.recv().await {
                    if peer.peer_id == local {
                        continue;
                    }
                    let peer_id = peer.peer_id;
                    match self.overlay.connect(peer).await {
                        Ok(()) => connected += 1,
                        Err(e) => debug!(%peer_id, %e, "Failed to connect to provider"),
                    }
                }
            }
            Err(e) => warn!(%e, "Provider lookup failed"),
        }

        info!(connected, "Connected to {connected} peers");
        connected
    }
}
