//! The anti-entropy loops.
//!
//! Each loop body is a `*_once` method that runs a single iteration and
//! reports what it did; the `run_*` methods wrap them in a
//! sleep/shutdown `select!`, log failures, and keep going.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use hive_admission::AdmissionError;
use hive_core::collab::ChainClient;
use hive_core::config::{AppsSection, NodeConfig, NodeSection, SchedulerSection};
use hive_core::tier::{NodeTier, ResourceKind};
use hive_core::types::GlobalApp;
use hive_lifecycle::LifecycleManager;
use hive_registry::{Presence, Registry};

use crate::error::{SchedulerError, SchedulerResult};
use crate::throttle;

/// Why the spawn loop passed over an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Already at the target replica count.
    Replicated(usize),
    /// Installed or running here already.
    Local,
    /// Our own address is in its location list.
    Listed,
    NoCapacity(ResourceKind),
}

/// Result of one spawn iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnOutcome {
    NotSynced { tip: u64, scanned: u64 },
    NoApps,
    Skipped { name: String, reason: SkipReason },
    Throttled { name: String },
    Installed { name: String },
}

/// Result of one presence/self-heal iteration.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HealReport {
    pub announced: Vec<String>,
    pub restarted: Vec<String>,
    pub removed: Vec<String>,
}

/// Owns one node's view of the network and runs its reconciliation loops.
pub struct Orchestrator {
    registry: Arc<Registry>,
    presence: Arc<Presence>,
    lifecycle: Arc<LifecycleManager>,
    chain: Arc<dyn ChainClient>,
    node: NodeSection,
    apps: AppsSection,
    settings: SchedulerSection,
}

async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = shutdown.changed() => true,
    }
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

impl Orchestrator {
    pub fn new(
        registry: Arc<Registry>,
        presence: Arc<Presence>,
        lifecycle: Arc<LifecycleManager>,
        chain: Arc<dyn ChainClient>,
        config: &NodeConfig,
    ) -> Self {
        Self {
            registry,
            presence,
            lifecycle,
            chain,
            node: config.node.clone(),
            apps: config.apps.clone(),
            settings: config.scheduler.clone(),
        }
    }

    /// Tier of this node: the configured override, else the one its
    /// collateral qualifies for.
    pub async fn node_tier(&self) -> SchedulerResult<NodeTier> {
        if let Some(tier) = self.node.tier {
            return Ok(tier);
        }
        let coins = self.chain.collateral_coins().await?;
        self.lifecycle
            .admission()
            .tiers()
            .tier_for_collateral(coins)
            .ok_or(SchedulerError::NoTier { coins })
    }

    fn own_ip(&self) -> &str {
        &self.node.public_ip
    }

    fn presence_jitter(&self) -> Duration {
        Duration::from_millis(self.settings.presence_jitter_ms)
    }

    // ── Spawn ───────────────────────────────────────────────────────

    /// Pick one random unexpired application and install it here if the
    /// network lacks replicas, this node has room, and the coin flip says so.
    pub async fn spawn_once(&self) -> SchedulerResult<SpawnOutcome> {
        let tip = self.chain.block_height().await?;
        let scanned = self.registry.scanned_height()?.unwrap_or(0);
        if tip.saturating_sub(scanned) > 1 {
            return Ok(SpawnOutcome::NotSynced { tip, scanned });
        }

        // Rows the expiration loop has not reached yet are already dead.
        let threshold = self.registry.expiry_threshold(tip);
        let apps: Vec<GlobalApp> = self
            .registry
            .global_apps()?
            .into_iter()
            .filter(|app| app.height >= threshold)
            .collect();
        let picked = {
            let mut rng = rand::thread_rng();
            apps.choose(&mut rng).cloned()
        };
        let Some(app) = picked else {
            return Ok(SpawnOutcome::NoApps);
        };
        let name = app.name.clone();
        let skip = |reason| SpawnOutcome::Skipped {
            name: name.clone(),
            reason,
        };

        let replicas = self.presence.replica_count(&name)?;
        if replicas >= self.apps.target_instances {
            return Ok(skip(SkipReason::Replicated(replicas)));
        }
        if self.lifecycle.installed_app(&name)?.is_some()
            || self.lifecycle.running_names().await?.contains(&name)
        {
            return Ok(skip(SkipReason::Local));
        }
        if self.presence.is_running_at(&name, self.own_ip())? {
            return Ok(skip(SkipReason::Listed));
        }

        let tier = self.node_tier().await?;
        match self
            .lifecycle
            .admission()
            .check_requirements(&app.specification, tier)
        {
            Ok(()) => {}
            Err(AdmissionError::Insufficient { resource, .. }) => {
                return Ok(skip(SkipReason::NoCapacity(resource)));
            }
            Err(e) => return Err(e.into()),
        }
        if !throttle::passes(self.settings.spawn_throttle_range) {
            return Ok(SpawnOutcome::Throttled { name });
        }

        info!(%name, replicas, %tier, "spawning under-replicated application");
        self.lifecycle.install(&app, tier).await?;
        self.presence
            .announce(&name, &app.hash, self.own_ip(), self.presence_jitter())
            .await?;
        Ok(SpawnOutcome::Installed { name })
    }

    pub async fn run_spawn_loop(&self, mut shutdown: watch::Receiver<bool>) {
        info!("spawn loop started");
        let mut delay = secs(self.settings.spawn_delay_secs);
        loop {
            if sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
            delay = secs(self.settings.spawn_delay_secs);
            match self.spawn_once().await {
                Ok(SpawnOutcome::Installed { name }) => {
                    info!(%name, "spawned application");
                    delay = secs(self.settings.spawn_success_delay_secs);
                }
                Ok(outcome) => debug!(?outcome, "spawn iteration"),
                Err(e) => warn!(error = %e, "spawn iteration failed"),
            }
        }
        info!("spawn loop shutting down");
    }

    // ── Presence and self-healing ───────────────────────────────────

    /// Announce every running app, restart installed apps that are not
    /// running, and purge expired temporary messages and locations.
    pub async fn heal_once(&self) -> SchedulerResult<HealReport> {
        let installed = self.lifecycle.installed()?;
        let running = self.lifecycle.running_names().await?;
        let mut report = HealReport::default();

        for app in installed {
            let name = app.name.as_str();
            if running.contains(name) {
                if let Err(e) = self
                    .presence
                    .announce(name, &app.hash, self.own_ip(), self.presence_jitter())
                    .await
                {
                    warn!(%name, error = %e, "presence broadcast failed");
                    continue;
                }
                report.announced.push(app.name.clone());
                continue;
            }
            if self.lifecycle.is_busy(name) {
                debug!(%name, "operation in progress, not restarting");
                continue;
            }
            if self.registry.global_app(name)?.is_none() {
                info!(%name, "stopped application is no longer registered, removing");
                self.remove_local(name).await;
                report.removed.push(app.name.clone());
                continue;
            }
            match self.lifecycle.restart(name).await {
                Ok(()) => report.restarted.push(app.name.clone()),
                Err(e) => {
                    warn!(%name, error = %e, "restart failed, removing application");
                    self.remove_local(name).await;
                    report.removed.push(app.name.clone());
                }
            }
        }

        self.registry.purge_expired_temporary()?;
        self.presence.purge_expired()?;
        Ok(report)
    }

    pub async fn run_heal_loop(&self, mut shutdown: watch::Receiver<bool>) {
        info!("presence loop started");
        // Announce soon after start so peers learn about us quickly.
        let mut delay = secs(self.settings.presence_interval_secs.min(60));
        loop {
            if sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
            delay = secs(self.settings.presence_interval_secs);
            match self.heal_once().await {
                Ok(report) => debug!(
                    announced = report.announced.len(),
                    restarted = report.restarted.len(),
                    removed = report.removed.len(),
                    "presence iteration"
                ),
                Err(e) => warn!(error = %e, "presence iteration failed"),
            }
        }
        info!("presence loop shutting down");
    }

    // ── Over-replication ────────────────────────────────────────────

    /// Remove local apps that run on more nodes than the network maximum,
    /// subject to the coin flip.
    pub async fn prune_once(&self) -> SchedulerResult<Vec<String>> {
        let mut removed = Vec::new();
        for app in self.lifecycle.installed()? {
            let replicas = self.presence.replica_count(&app.name)?;
            if replicas <= self.apps.max_instances {
                continue;
            }
            if !throttle::passes(self.settings.prune_throttle_range) {
                debug!(name = %app.name, replicas, "over-replicated, throttled");
                continue;
            }
            info!(name = %app.name, replicas, max = self.apps.max_instances, "pruning over-replicated application");
            self.remove_local(&app.name).await;
            removed.push(app.name);
        }
        Ok(removed)
    }

    pub async fn run_prune_loop(&self, mut shutdown: watch::Receiver<bool>) {
        info!("prune loop started");
        let delay = secs(self.settings.prune_interval_secs);
        loop {
            if sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
            match self.prune_once().await {
                Ok(removed) if !removed.is_empty() => info!(?removed, "pruned applications"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "prune iteration failed"),
            }
        }
        info!("prune loop shutting down");
    }

    // ── Expiration ──────────────────────────────────────────────────

    /// Drop specifications older than `blocks_lasting` from the projection
    /// and remove the local ones, pausing between removals.
    pub async fn expire_once(&self) -> SchedulerResult<Vec<GlobalApp>> {
        let tip = self.chain.block_height().await?;
        let expired = self.registry.expire_specifications(tip)?;
        if expired.is_empty() {
            return Ok(expired);
        }
        info!(count = expired.len(), height = tip, "specifications expired");

        let installed: HashSet<String> = self
            .lifecycle
            .installed()?
            .into_iter()
            .map(|a| a.name)
            .collect();
        let pacing = secs(self.settings.expiration_pacing_secs);
        let mut first = true;
        for app in expired.iter().filter(|a| installed.contains(&a.name)) {
            if !first {
                tokio::time::sleep(pacing).await;
            }
            first = false;
            info!(name = %app.name, height = app.height, "removing expired application");
            self.remove_local(&app.name).await;
        }
        Ok(expired)
    }

    pub async fn run_expiration_loop(&self, mut shutdown: watch::Receiver<bool>) {
        info!("expiration loop started");
        let delay = secs(self.settings.expiration_interval_secs);
        loop {
            if sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
            if let Err(e) = self.expire_once().await {
                warn!(error = %e, "expiration iteration failed");
            }
        }
        info!("expiration loop shutting down");
    }

    // ── Drift ───────────────────────────────────────────────────────

    /// Redeploy local apps whose registered specification changed.
    pub async fn drift_once(&self) -> SchedulerResult<Vec<String>> {
        let mut redeployed = Vec::new();
        let mut cached_tier = None;
        for installed in self.lifecycle.installed()? {
            let Some(current) = self.registry.global_app(&installed.name)? else {
                continue;
            };
            if current.hash == installed.hash {
                continue;
            }
            if !throttle::passes(self.settings.drift_throttle_range) {
                debug!(name = %installed.name, "specification drift, throttled");
                continue;
            }
            let tier = match cached_tier {
                Some(t) => t,
                None => {
                    let t = self.node_tier().await?;
                    cached_tier = Some(t);
                    t
                }
            };
            let hard = LifecycleManager::needs_hard_redeploy(&installed, &current, tier);
            info!(
                name = %installed.name,
                from = %installed.hash,
                to = %current.hash,
                hard,
                "redeploying drifted application"
            );
            match self.lifecycle.redeploy(&current, tier, hard).await {
                Ok(()) => redeployed.push(installed.name),
                Err(e) => error!(name = %installed.name, error = %e, "redeploy failed"),
            }
        }
        Ok(redeployed)
    }

    pub async fn run_drift_loop(&self, mut shutdown: watch::Receiver<bool>) {
        info!("drift loop started");
        let delay = secs(self.settings.drift_interval_secs);
        loop {
            if sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
            match self.drift_once().await {
                Ok(redeployed) if !redeployed.is_empty() => {
                    info!(?redeployed, "redeployed applications")
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "drift iteration failed"),
            }
        }
        info!("drift loop shutting down");
    }

    // ── Missing messages ────────────────────────────────────────────

    pub async fn run_missing_sweep(&self, mut shutdown: watch::Receiver<bool>) {
        info!("missing message sweep started");
        let delay = secs(self.settings.missing_sweep_secs);
        loop {
            if sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
            match self.registry.retry_unresolved().await {
                Ok(0) => {}
                Ok(resolved) => info!(resolved, "missing messages resolved"),
                Err(e) => warn!(error = %e, "missing message sweep failed"),
            }
        }
        info!("missing message sweep shutting down");
    }

    /// Spawn every loop on the runtime.
    pub fn start(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(6);

        let (this, rx) = (Arc::clone(self), shutdown.clone());
        handles.push(tokio::spawn(async move { this.run_spawn_loop(rx).await }));
        let (this, rx) = (Arc::clone(self), shutdown.clone());
        handles.push(tokio::spawn(async move { this.run_heal_loop(rx).await }));
        let (this, rx) = (Arc::clone(self), shutdown.clone());
        handles.push(tokio::spawn(async move { this.run_prune_loop(rx).await }));
        let (this, rx) = (Arc::clone(self), shutdown.clone());
        handles.push(tokio::spawn(async move { this.run_expiration_loop(rx).await }));
        let (this, rx) = (Arc::clone(self), shutdown.clone());
        handles.push(tokio::spawn(async move { this.run_drift_loop(rx).await }));
        let (this, rx) = (Arc::clone(self), shutdown);
        handles.push(tokio::spawn(async move { this.run_missing_sweep(rx).await }));
        handles
    }

    /// Forced removal that only logs failures, then withdraw our location.
    async fn remove_local(&self, name: &str) {
        if let Err(e) = self.lifecycle.remove(name, true).await {
            error!(%name, error = %e, "removal failed");
        }
        if let Err(e) = self.presence.withdraw(name, self.own_ip()) {
            warn!(%name, error = %e, "failed to withdraw location");
        }
    }
}
