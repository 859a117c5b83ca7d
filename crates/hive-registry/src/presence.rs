//! Presence gossip: "node X runs app Y" claims and the location index
//! built from them.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info};

use hive_core::config::AppsSection;
use hive_core::types::{
    LocationMessage, LocationMessageType, LocationRecord, SPEC_VERSION, epoch_millis,
};
use hive_core::{PeerMessage, PeerTransport};
use hive_state::StateStore;

use crate::cache::MessageCache;
use crate::error::RegistryResult;

/// Uniform random delay in `[0, max]`.
pub fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

/// Location index plus the broadcast side of presence gossip.
pub struct Presence {
    store: StateStore,
    cache: Arc<MessageCache>,
    peers: Arc<dyn PeerTransport>,
    ttl: Duration,
    ingest_jitter: Duration,
}

impl Presence {
    pub fn new(
        store: StateStore,
        cache: Arc<MessageCache>,
        peers: Arc<dyn PeerTransport>,
        apps: &AppsSection,
    ) -> Self {
        Self {
            store,
            cache,
            peers,
            ttl: apps.location_ttl(),
            ingest_jitter: Duration::from_millis(apps.location_ingest_jitter_ms),
        }
    }

    fn ttl_ms(&self) -> u64 {
        self.ttl.as_millis() as u64
    }

    /// Ingest a presence claim from a peer. Returns true if it changed the
    /// location index.
    pub async fn ingest(&self, message: &LocationMessage) -> RegistryResult<bool> {
        let key = serde_json::to_string(message)?;
        if !self.cache.insert_if_new(&key) {
            return Ok(false);
        }
        let expire_at = message.broadcasted_at.saturating_add(self.ttl_ms());
        if expire_at <= epoch_millis() {
            debug!(name = %message.name, ip = %message.ip, "stale presence message dropped");
            return Ok(false);
        }

        tokio::time::sleep(jitter(self.ingest_jitter)).await;

        let record = LocationRecord {
            name: message.name.clone(),
            hash: message.hash.clone(),
            ip: message.ip.clone(),
            broadcasted_at: message.broadcasted_at,
            expire_at,
        };
        Ok(self.store.upsert_location_if_newer(&record)?)
    }

    /// Announce that this node runs `name`: record it locally, then
    /// broadcast to outgoing and incoming peers with a random pause
    /// between each step.
    pub async fn announce(
        &self,
        name: &str,
        hash: &str,
        ip: &str,
        max_pause: Duration,
    ) -> RegistryResult<()> {
        let message = LocationMessage {
            kind: LocationMessageType::Running,
            version: SPEC_VERSION,
            name: name.to_string(),
            hash: hash.to_string(),
            ip: ip.to_string(),
            broadcasted_at: epoch_millis(),
        };
        // Our own message echoed back by peers is a duplicate.
        self.cache.insert_if_new(&serde_json::to_string(&message)?);
        self.store.upsert_location_if_newer(&LocationRecord {
            name: message.name.clone(),
            hash: message.hash.clone(),
            ip: message.ip.clone(),
            broadcasted_at: message.broadcasted_at,
            expire_at: message.broadcasted_at + self.ttl_ms(),
        })?;

        let envelope = PeerMessage::AppRunning(message);
        tokio::time::sleep(jitter(max_pause)).await;
        self.peers.broadcast_to_outgoing(&envelope).await;
        tokio::time::sleep(jitter(max_pause)).await;
        self.peers.broadcast_to_incoming(&envelope).await;
        debug!(%name, %ip, "presence broadcast");
        Ok(())
    }

    /// Unexpired locations of an application.
    pub fn locations(&self, name: &str) -> RegistryResult<Vec<LocationRecord>> {
        Ok(self.store.list_locations(name, epoch_millis())?)
    }

    /// Number of distinct nodes currently claiming to run `name`.
    pub fn replica_count(&self, name: &str) -> RegistryResult<usize> {
        let ips: HashSet<String> = self.locations(name)?.into_iter().map(|l| l.ip).collect();
        Ok(ips.len())
    }

    /// Whether `ip` is among the unexpired locations of `name`.
    pub fn is_running_at(&self, name: &str, ip: &str) -> RegistryResult<bool> {
        Ok(self.locations(name)?.iter().any(|l| l.ip == ip))
    }

    pub fn purge_expired(&self) -> RegistryResult<usize> {
        let purged = self.store.purge_expired_locations(epoch_millis())?;
        if purged > 0 {
            info!(purged, "expired locations purged");
        }
        Ok(purged)
    }

    /// Forget this node's claim for `name`, e.g. after removing it.
    pub fn withdraw(&self, name: &str, ip: &str) -> RegistryResult<bool> {
        Ok(self.store.delete_location(name, ip)?)
    }
}
