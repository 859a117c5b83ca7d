//! In-memory collaborators for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;

use crate::collab::{ChainClient, ImageCatalog, PeerMessage, PeerTransport};
use crate::types::ImageRef;

/// Chain client with a settable tip and collateral.
#[derive(Debug)]
pub struct StaticChain {
    height: AtomicU64,
    collateral: AtomicU64,
    unreachable: AtomicBool,
}

impl StaticChain {
    pub fn new(height: u64, collateral: u64) -> Self {
        Self {
            height: AtomicU64::new(height),
            collateral: AtomicU64::new(collateral),
            unreachable: AtomicBool::new(false),
        }
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn set_collateral(&self, coins: u64) {
        self.collateral.store(coins, Ordering::SeqCst);
    }

    /// Make every call fail until cleared.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            anyhow::bail!("chain daemon unreachable");
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for StaticChain {
    async fn block_height(&self) -> anyhow::Result<u64> {
        self.check()?;
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn collateral_coins(&self) -> anyhow::Result<u64> {
        self.check()?;
        Ok(self.collateral.load(Ordering::SeqCst))
    }
}

/// Peer transport that records every broadcast.
#[derive(Debug, Default)]
pub struct RecordingPeers {
    outgoing: Mutex<Vec<PeerMessage>>,
    incoming: Mutex<Vec<PeerMessage>>,
}

impl RecordingPeers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outgoing(&self) -> Vec<PeerMessage> {
        self.outgoing.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn incoming(&self) -> Vec<PeerMessage> {
        self.incoming.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PeerTransport for RecordingPeers {
    async fn broadcast_to_outgoing(&self, message: &PeerMessage) {
        if let Ok(mut sent) = self.outgoing.lock() {
            sent.push(message.clone());
        }
    }

    async fn broadcast_to_incoming(&self, message: &PeerMessage) {
        if let Ok(mut sent) = self.incoming.lock() {
            sent.push(message.clone());
        }
    }
}

/// Image catalog answering from a fixed table; unknown images do not exist.
#[derive(Debug, Default)]
pub struct StaticImages {
    sizes: Mutex<HashMap<String, u64>>,
}

impl StaticImages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog containing a single image.
    pub fn with(repotag: &str, size: u64) -> Self {
        let images = Self::new();
        images.insert(repotag, size);
        images
    }

    pub fn insert(&self, repotag: &str, size: u64) {
        if let Ok(mut sizes) = self.sizes.lock() {
            sizes.insert(repotag.to_string(), size);
        }
    }
}

#[async_trait]
impl ImageCatalog for StaticImages {
    async fn image_size(&self, image: &ImageRef) -> anyhow::Result<Option<u64>> {
        let sizes = self
            .sizes
            .lock()
            .map_err(|_| anyhow::anyhow!("image table poisoned"))?;
        Ok(sizes.get(&image.to_string()).copied())
    }
}
