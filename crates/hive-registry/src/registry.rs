//! The specification registry.
//!
//! Messages enter as temporary records, are promoted to permanent records
//! once a sufficient on-chain payment is observed, and feed the
//! per-name projection of the specification currently in force.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use hive_core::config::AppsSection;
use hive_core::tier::TierCatalog;
use hive_core::types::{
    ChainHash, GlobalApp, MessageType, PermanentMessage, SPEC_VERSION, SpecificationMessage,
    TemporaryMessage, epoch_millis,
};
use hive_core::{ImageCatalog, PeerMessage, PeerTransport};
use hive_state::StateStore;

use crate::cache::MessageCache;
use crate::error::{RegistryError, RegistryResult, ValidationError};
use crate::pricing::{price_per_month, required_payment, to_sats};
use crate::validate::Validator;

/// Result of trying to promote a temporary message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoteOutcome {
    /// A permanent record was written.
    Promoted,
    /// The payment does not cover the price; nothing was written.
    Underpaid,
    /// The message was already permanent.
    AlreadyPermanent,
    /// The temporary message is not known locally.
    MissingMessage,
}

/// Specification registry of one node.
pub struct Registry {
    store: StateStore,
    apps: AppsSection,
    validator: Validator,
    cache: Arc<MessageCache>,
    peers: Arc<dyn PeerTransport>,
}

impl Registry {
    pub fn new(
        store: StateStore,
        apps: AppsSection,
        tiers: TierCatalog,
        images: Arc<dyn ImageCatalog>,
        peers: Arc<dyn PeerTransport>,
    ) -> Self {
        let cache = Arc::new(MessageCache::new(apps.cache_capacity, apps.cache_ttl()));
        let validator = Validator::new(apps.clone(), tiers, images, store.clone());
        Self {
            store,
            apps,
            validator,
            cache,
            peers,
        }
    }

    /// Dedup cache, shared with presence ingestion.
    pub fn cache(&self) -> Arc<MessageCache> {
        Arc::clone(&self.cache)
    }

    pub fn peers(&self) -> &Arc<dyn PeerTransport> {
        &self.peers
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    // ── Temporary messages ─────────────────────────────────────────

    /// Store a message received from a peer or a submitter.
    ///
    /// Returns `Ok(false)` without side effects if the message was seen
    /// recently or its hash is already stored. With `verify`, rejected
    /// messages surface as errors and are not stored.
    pub async fn store_temporary(
        &self,
        message: &SpecificationMessage,
        verify: bool,
    ) -> RegistryResult<bool> {
        let key = serde_json::to_string(message)?;
        if !self.cache.insert_if_new(&key) {
            debug!(hash = %message.hash, "message seen recently");
            return Ok(false);
        }
        if self.store.get_temporary(&message.hash)?.is_some()
            || self.store.get_permanent(&message.hash)?.is_some()
        {
            return Ok(false);
        }
        if verify {
            self.verify_message(message).await?;
        }

        let now = epoch_millis();
        let stored = self.store.put_temporary(&TemporaryMessage {
            message: message.clone(),
            received_at: now,
            expire_at: now + self.apps.temporary_ttl().as_millis() as u64,
        })?;
        if stored {
            info!(
                name = %message.specification.name,
                hash = %message.hash,
                kind = %message.kind,
                "temporary message stored"
            );
        }
        Ok(stored)
    }

    /// All checks a message must pass before it is stored.
    pub async fn verify_message(&self, message: &SpecificationMessage) -> RegistryResult<()> {
        if message.version != SPEC_VERSION {
            return Err(ValidationError::new(
                "version",
                format!("unsupported message version {}", message.version),
            )
            .into());
        }
        let spec = &message.specification;
        self.validator.validate(spec).await?;

        if message.computed_hash()? != message.hash {
            return Err(ValidationError::new("hash", "does not match message content").into());
        }

        let current = self.store.get_global_app(&spec.name)?;
        match message.kind {
            MessageType::Register => {
                if current.is_some() {
                    return Err(RegistryError::Conflict(format!(
                        "{} is already registered",
                        spec.name
                    )));
                }
                message.verify_signature(&spec.owner)?;
            }
            MessageType::Update => {
                let current = current.ok_or_else(|| {
                    RegistryError::Conflict(format!("{} is not registered", spec.name))
                })?;
                if current.specification.repotag != spec.repotag {
                    return Err(RegistryError::Conflict(format!(
                        "{} must keep repository {}",
                        spec.name, current.specification.repotag
                    )));
                }
                // Only the registered owner may update.
                message.verify_signature(&current.owner)?;
            }
        }
        Ok(())
    }

    /// Drop temporary messages past their TTL.
    pub fn purge_expired_temporary(&self) -> RegistryResult<usize> {
        Ok(self.store.purge_expired_temporary(epoch_millis())?)
    }

    /// Look up a message by hash in the temporary then permanent store.
    pub fn find_message(&self, hash: &str) -> RegistryResult<Option<SpecificationMessage>> {
        if let Some(temp) = self.store.get_temporary(hash)? {
            return Ok(Some(temp.message));
        }
        Ok(self.store.get_permanent(hash)?.map(|p| p.message))
    }

    // ── Promotion ──────────────────────────────────────────────────

    /// Promote a temporary message once its payment transaction is seen.
    pub fn promote_to_permanent(
        &self,
        hash: &str,
        txid: &str,
        height: u64,
        value_sat: u64,
    ) -> RegistryResult<PromoteOutcome> {
        let resolved = ChainHash {
            hash: hash.to_string(),
            txid: txid.to_string(),
            height,
            value_sat,
            message_found: true,
        };

        if self.store.get_permanent(hash)?.is_some() {
            self.store.put_chain_hash(&resolved)?;
            return Ok(PromoteOutcome::AlreadyPermanent);
        }
        let Some(temp) = self.store.get_temporary(hash)? else {
            return Ok(PromoteOutcome::MissingMessage);
        };

        let message = temp.message;
        let spec = &message.specification;
        let price = price_per_month(spec, &self.apps.price);
        let previous = match message.kind {
            MessageType::Register => None,
            MessageType::Update => self
                .store
                .list_permanent_for_name(&spec.name)?
                .into_iter()
                .filter(|p| p.height < height)
                .max_by_key(|p| p.height)
                .map(|p| {
                    (
                        price_per_month(&p.message.specification, &self.apps.price),
                        p.height,
                    )
                }),
        };
        let required = required_payment(price, previous, height, self.apps.blocks_lasting);

        // The payment is recorded either way; an underpaid message stays inert.
        self.store.put_chain_hash(&resolved)?;
        if value_sat < to_sats(required) {
            info!(
                name = %spec.name,
                %hash,
                value_sat,
                required,
                "payment below price, message not promoted"
            );
            return Ok(PromoteOutcome::Underpaid);
        }

        let permanent = PermanentMessage {
            message: message.clone(),
            txid: txid.to_string(),
            height,
            value_sat,
        };
        if !self.store.put_permanent(&permanent)? {
            return Ok(PromoteOutcome::AlreadyPermanent);
        }
        let applied = self
            .store
            .upsert_global_app_if_newer(&GlobalApp::from_permanent(&permanent))?;
        info!(name = %spec.name, %hash, height, applied, "message promoted to permanent");
        Ok(PromoteOutcome::Promoted)
    }

    /// Handle a payment transaction reported by the chain indexer.
    ///
    /// Records the payment, promotes its message, and if the message is
    /// not known yet, asks peers for it for a bounded number of rounds.
    /// Hashes still missing afterwards are picked up by
    /// [`retry_unresolved`](Self::retry_unresolved).
    pub async fn observe_payment(
        &self,
        hash: &str,
        txid: &str,
        height: u64,
        value_sat: u64,
    ) -> RegistryResult<PromoteOutcome> {
        let already_found = self
            .store
            .get_chain_hash(hash)?
            .is_some_and(|c| c.message_found);
        if !already_found {
            self.store.put_chain_hash(&ChainHash {
                hash: hash.to_string(),
                txid: txid.to_string(),
                height,
                value_sat,
                message_found: false,
            })?;
        }

        let mut outcome = self.promote_to_permanent(hash, txid, height, value_sat)?;
        let mut round = 0;
        while outcome == PromoteOutcome::MissingMessage && round < self.apps.missing_request_rounds
        {
            round += 1;
            debug!(%hash, round, "requesting missing message from peers");
            self.request_message(hash).await;
            tokio::time::sleep(self.apps.missing_request_wait()).await;
            outcome = self.promote_to_permanent(hash, txid, height, value_sat)?;
        }
        if outcome == PromoteOutcome::MissingMessage {
            warn!(%hash, rounds = round, "message still missing, left for background sweep");
        }
        Ok(outcome)
    }

    /// One pass over every payment whose message has not been found.
    /// Returns how many were resolved.
    pub async fn retry_unresolved(&self) -> RegistryResult<usize> {
        let mut resolved = 0;
        for pending in self.store.list_unresolved_chain_hashes()? {
            let outcome = self.promote_to_permanent(
                &pending.hash,
                &pending.txid,
                pending.height,
                pending.value_sat,
            )?;
            if outcome == PromoteOutcome::MissingMessage {
                self.request_message(&pending.hash).await;
            } else {
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    async fn request_message(&self, hash: &str) {
        let request = PeerMessage::AppRequest {
            hash: hash.to_string(),
        };
        self.peers.broadcast_to_outgoing(&request).await;
        self.peers.broadcast_to_incoming(&request).await;
    }

    // ── Projection ─────────────────────────────────────────────────

    /// Rebuild the projection from permanent messages at or above
    /// `from_height`.
    ///
    /// With `drop_existing` the projection is cleared first. Otherwise rows
    /// anchored at or above `from_height` are reset to the best message
    /// below it, so a rescan after a reorg forgets orphaned updates.
    /// Every write is last-writer-wins, so the result does not depend on
    /// how often the rebuild runs. Messages below the expiry floor are
    /// never brought back.
    pub fn rebuild_projection(&self, from_height: u64, drop_existing: bool) -> RegistryResult<usize> {
        let floor = self.store.expiry_floor()?;
        if drop_existing {
            let cleared = self.store.clear_global_apps()?;
            debug!(cleared, "projection cleared");
        } else {
            let stale: HashSet<String> = self
                .store
                .list_global_apps()?
                .into_iter()
                .filter(|app| app.height >= from_height)
                .map(|app| app.name)
                .collect();
            for name in &stale {
                self.store.delete_global_app(name)?;
                for older in self
                    .store
                    .list_permanent_for_name(name)?
                    .iter()
                    .filter(|p| p.height < from_height && p.height >= floor)
                {
                    self.store
                        .upsert_global_app_if_newer(&GlobalApp::from_permanent(older))?;
                }
            }
        }

        let mut applied = 0;
        for permanent in self.store.list_permanent_from(from_height.max(floor))? {
            if self
                .store
                .upsert_global_app_if_newer(&GlobalApp::from_permanent(&permanent))?
            {
                applied += 1;
            }
        }
        info!(from_height, drop_existing, floor, applied, "projection rebuilt");
        Ok(applied)
    }

    /// Remove every projection row anchored below
    /// `current_height - blocks_lasting`. Returns the expired rows.
    /// The threshold is kept as the expiry floor so later rebuilds skip
    /// those messages too.
    pub fn expire_specifications(&self, current_height: u64) -> RegistryResult<Vec<GlobalApp>> {
        let threshold = self
            .store
            .raise_expiry_floor(self.expiry_threshold(current_height))?;
        let expired = self.store.delete_global_apps_below(threshold)?;
        for app in &expired {
            info!(name = %app.name, height = app.height, threshold, "specification expired");
        }
        Ok(expired)
    }

    /// Lowest height a specification may be anchored at and still be in
    /// force at `current_height`.
    pub fn expiry_threshold(&self, current_height: u64) -> u64 {
        current_height.saturating_sub(self.apps.blocks_lasting)
    }

    pub fn global_app(&self, name: &str) -> RegistryResult<Option<GlobalApp>> {
        Ok(self.store.get_global_app(name)?)
    }

    pub fn global_apps(&self) -> RegistryResult<Vec<GlobalApp>> {
        Ok(self.store.list_global_apps()?)
    }

    // ── Chain indexer progress ─────────────────────────────────────

    pub fn scanned_height(&self) -> RegistryResult<Option<u64>> {
        Ok(self.store.scanned_height()?)
    }

    pub fn set_scanned_height(&self, height: u64) -> RegistryResult<()> {
        Ok(self.store.set_scanned_height(height)?)
    }

    /// Wait between missing-message rounds; exposed for the sweep loop.
    pub fn missing_request_wait(&self) -> Duration {
        self.apps.missing_request_wait()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use hive_core::crypto::owner_identity;
    use hive_core::testing::{RecordingPeers, StaticImages};
    use hive_core::types::AppSpecification;

    struct Fixture {
        registry: Registry,
        peers: Arc<RecordingPeers>,
        key: SigningKey,
    }

    fn fixture() -> Fixture {
        let apps = AppsSection {
            missing_request_rounds: 2,
            missing_request_wait_secs: 0,
            ..AppsSection::default()
        };
        let peers = Arc::new(RecordingPeers::new());
        let images = StaticImages::with("acme/demo:latest", 100_000_000);
        images.insert("acme/demo:v2", 100_000_000);
        let registry = Registry::new(
            StateStore::open_in_memory().unwrap(),
            apps,
            TierCatalog::default(),
            Arc::new(images),
            peers.clone(),
        );
        Fixture {
            registry,
            peers,
            key: SigningKey::from_bytes(&[7u8; 32]),
        }
    }

    fn spec(key: &SigningKey) -> AppSpecification {
        AppSpecification {
            version: SPEC_VERSION,
            name: "demoapp".to_string(),
            description: "demo".to_string(),
            repotag: "acme/demo:latest".to_string(),
            owner: owner_identity(&key.verifying_key()),
            port: 31000,
            container_port: 8080,
            container_data: "/data".to_string(),
            environment_parameters: vec![],
            commands: vec![],
            cpu: 0.5,
            ram: 500,
            hdd: 5,
            tiered: false,
            tiers: None,
        }
    }

    fn register(key: &SigningKey, spec: AppSpecification, ts: u64) -> SpecificationMessage {
        SpecificationMessage::signed(MessageType::Register, spec, ts, key).unwrap()
    }

    // 22.5 coins, the demo app's price.
    const DEMO_PRICE_SATS: u64 = 2_250_000_000;

    // ── storeTemporary ──

    #[tokio::test]
    async fn store_temporary_is_idempotent() {
        let f = fixture();
        let msg = register(&f.key, spec(&f.key), 1);
        assert!(f.registry.store_temporary(&msg, true).await.unwrap());
        assert!(!f.registry.store_temporary(&msg, true).await.unwrap());
        assert_eq!(f.registry.store().list_temporary().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tampered_hash_is_rejected() {
        let f = fixture();
        let mut msg = register(&f.key, spec(&f.key), 1);
        msg.hash = "00".repeat(32);
        let err = f.registry.store_temporary(&msg, true).await.unwrap_err();
        assert!(err.is_rejection());
        assert!(f.registry.store().list_temporary().unwrap().is_empty());
    }

    #[tokio::test]
    async fn signature_by_other_key_is_rejected() {
        let f = fixture();
        let other = SigningKey::from_bytes(&[9u8; 32]);
        // Claims f.key as owner but is signed by another key.
        let msg = register(&other, spec(&f.key), 1);
        let err = f.registry.store_temporary(&msg, true).await.unwrap_err();
        assert!(matches!(err, RegistryError::Crypto(_)));
    }

    #[tokio::test]
    async fn unverified_store_skips_checks() {
        let f = fixture();
        let mut s = spec(&f.key);
        s.cpu = 99.0;
        let msg = register(&f.key, s, 1);
        assert!(f.registry.store_temporary(&msg, false).await.unwrap());
    }

    // ── promoteToPermanent ──

    #[tokio::test]
    async fn promotion_requires_payment() {
        let f = fixture();
        let msg = register(&f.key, spec(&f.key), 1);
        f.registry.store_temporary(&msg, true).await.unwrap();

        let outcome = f
            .registry
            .promote_to_permanent(&msg.hash, "tx1", 1000, DEMO_PRICE_SATS - 1)
            .unwrap();
        assert_eq!(outcome, PromoteOutcome::Underpaid);
        assert!(f.registry.global_app("demoapp").unwrap().is_none());
        let chain = f.registry.store().get_chain_hash(&msg.hash).unwrap().unwrap();
        assert!(chain.message_found);
    }

    #[tokio::test]
    async fn promotion_is_idempotent() {
        let f = fixture();
        let msg = register(&f.key, spec(&f.key), 1);
        f.registry.store_temporary(&msg, true).await.unwrap();

        let first = f
            .registry
            .promote_to_permanent(&msg.hash, "tx1", 1000, DEMO_PRICE_SATS)
            .unwrap();
        assert_eq!(first, PromoteOutcome::Promoted);
        let before = f.registry.global_apps().unwrap();

        let second = f
            .registry
            .promote_to_permanent(&msg.hash, "tx1", 1000, DEMO_PRICE_SATS)
            .unwrap();
        assert_eq!(second, PromoteOutcome::AlreadyPermanent);
        assert_eq!(f.registry.global_apps().unwrap(), before);
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].height, 1000);
    }

    #[tokio::test]
    async fn register_conflicts_with_registered_name() {
        let f = fixture();
        let msg = register(&f.key, spec(&f.key), 1);
        f.registry.store_temporary(&msg, true).await.unwrap();
        f.registry
            .promote_to_permanent(&msg.hash, "tx1", 1000, DEMO_PRICE_SATS)
            .unwrap();

        let again = register(&f.key, spec(&f.key), 2);
        let err = f.registry.store_temporary(&again, true).await.unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_must_come_from_current_owner_and_keep_repository() {
        let f = fixture();
        let msg = register(&f.key, spec(&f.key), 1);
        f.registry.store_temporary(&msg, true).await.unwrap();
        f.registry
            .promote_to_permanent(&msg.hash, "tx1", 1000, DEMO_PRICE_SATS)
            .unwrap();

        // Different signer, even if the specification names them as owner.
        let intruder = SigningKey::from_bytes(&[9u8; 32]);
        let hijack = SpecificationMessage::signed(
            MessageType::Update,
            spec(&intruder),
            2,
            &intruder,
        )
        .unwrap();
        assert!(matches!(
            f.registry.store_temporary(&hijack, true).await,
            Err(RegistryError::Crypto(_))
        ));

        let mut moved = spec(&f.key);
        moved.repotag = "acme/demo:v2".to_string();
        let retag = SpecificationMessage::signed(MessageType::Update, moved, 3, &f.key).unwrap();
        assert!(matches!(
            f.registry.store_temporary(&retag, true).await,
            Err(RegistryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn update_pays_only_the_difference() {
        let f = fixture();
        let msg = register(&f.key, spec(&f.key), 1);
        f.registry.store_temporary(&msg, true).await.unwrap();
        f.registry
            .promote_to_permanent(&msg.hash, "tx1", 1000, DEMO_PRICE_SATS)
            .unwrap();

        let mut bigger = spec(&f.key);
        bigger.cpu = 1.0;
        let update = SpecificationMessage::signed(MessageType::Update, bigger, 2, &f.key).unwrap();
        f.registry.store_temporary(&update, true).await.unwrap();

        // New price 37.5; half of 22.5 still unused at height 12000 → 26.25.
        let outcome = f
            .registry
            .promote_to_permanent(&update.hash, "tx2", 12_000, 2_625_000_000)
            .unwrap();
        assert_eq!(outcome, PromoteOutcome::Promoted);
        let current = f.registry.global_app("demoapp").unwrap().unwrap();
        assert_eq!(current.height, 12_000);
        assert_eq!(current.specification.cpu, 1.0);
    }

    #[tokio::test]
    async fn missing_message_is_requested_then_left_for_sweep() {
        let f = fixture();
        let outcome = f
            .registry
            .observe_payment("feed", "tx1", 1000, DEMO_PRICE_SATS)
            .await
            .unwrap();
        assert_eq!(outcome, PromoteOutcome::MissingMessage);
        // Two rounds configured.
        assert_eq!(f.peers.outgoing().len(), 2);
        assert_eq!(f.peers.incoming().len(), 2);
        assert_eq!(
            f.peers.outgoing()[0],
            PeerMessage::AppRequest {
                hash: "feed".to_string()
            }
        );
        let pending = f.registry.store().list_unresolved_chain_hashes().unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn sweep_resolves_late_message() {
        let f = fixture();
        let msg = register(&f.key, spec(&f.key), 1);
        f.registry
            .observe_payment(&msg.hash, "tx1", 1000, DEMO_PRICE_SATS)
            .await
            .unwrap();

        f.registry.store_temporary(&msg, true).await.unwrap();
        assert_eq!(f.registry.retry_unresolved().await.unwrap(), 1);
        assert!(f.registry.store().list_unresolved_chain_hashes().unwrap().is_empty());
        assert!(f.registry.global_app("demoapp").unwrap().is_some());
    }

    // ── rebuildProjection ──

    fn seed_permanent(f: &Fixture, name: &str, height: u64, ts: u64) {
        let mut s = spec(&f.key);
        s.name = name.to_string();
        let msg = register(&f.key, s, ts);
        f.registry
            .store()
            .put_permanent(&PermanentMessage {
                message: msg,
                txid: format!("tx{height}"),
                height,
                value_sat: DEMO_PRICE_SATS,
            })
            .unwrap();
    }

    #[test]
    fn rebuild_keeps_highest_height_per_name() {
        let f = fixture();
        seed_permanent(&f, "alpha", 1000, 1);
        seed_permanent(&f, "alpha", 1050, 2);
        seed_permanent(&f, "beta", 1020, 3);

        f.registry.rebuild_projection(0, true).unwrap();
        let first = f.registry.global_apps().unwrap();
        f.registry.rebuild_projection(0, true).unwrap();
        f.registry.rebuild_projection(0, false).unwrap();
        let again = f.registry.global_apps().unwrap();

        assert_eq!(first, again);
        let alpha = first.iter().find(|a| a.name == "alpha").unwrap();
        assert_eq!(alpha.height, 1050);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn rescan_from_height_forgets_newer_rows() {
        let f = fixture();
        seed_permanent(&f, "alpha", 1000, 1);
        f.registry.rebuild_projection(0, true).unwrap();

        // A row at 1050 that is not backed by a permanent message.
        let mut orphan = f.registry.global_app("alpha").unwrap().unwrap();
        orphan.height = 1050;
        orphan.hash = "orphan".to_string();
        f.registry.store().put_global_app(&orphan).unwrap();

        f.registry.rebuild_projection(1040, false).unwrap();
        let alpha = f.registry.global_app("alpha").unwrap().unwrap();
        assert_eq!(alpha.height, 1000);
    }

    #[test]
    fn expiration_drops_rows_below_threshold() {
        let f = fixture();
        seed_permanent(&f, "old", 7999, 1);
        seed_permanent(&f, "edge", 8000, 2);
        f.registry.rebuild_projection(0, true).unwrap();

        let expired = f.registry.expire_specifications(30_000).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].name, "old");
        assert!(f.registry.global_app("edge").unwrap().is_some());
    }

    #[test]
    fn expired_specifications_stay_gone_after_rebuild() {
        let f = fixture();
        seed_permanent(&f, "old", 1000, 1);
        seed_permanent(&f, "fresh", 9000, 2);
        f.registry.rebuild_projection(0, false).unwrap();
        assert_eq!(f.registry.expire_specifications(30_000).unwrap().len(), 1);

        // Startup rebuild, then an indexer rescan that drops the projection.
        assert_eq!(f.registry.rebuild_projection(0, false).unwrap(), 1);
        assert!(f.registry.global_app("old").unwrap().is_none());
        f.registry.rebuild_projection(0, true).unwrap();
        assert!(f.registry.global_app("old").unwrap().is_none());
        assert_eq!(f.registry.global_app("fresh").unwrap().unwrap().height, 9000);

        // A rescan above the floor does not revive older rows either.
        f.registry.rebuild_projection(9500, false).unwrap();
        assert!(f.registry.global_app("old").unwrap().is_none());
    }
}
