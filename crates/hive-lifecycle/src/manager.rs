//! Install, remove, restart and redeploy of local application containers.
//!
//! Every operation on a name runs under that name's lock. An install
//! records the app before pulling so the admission check of a concurrent
//! install already counts it; anything that fails after the record is
//! written is rolled back by a forced removal while the lock is still held.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use hive_admission::AdmissionController;
use hive_core::config::RuntimeSection;
use hive_core::tier::NodeTier;
use hive_core::types::{
    AppSpecification, GlobalApp, ImageRef, InstalledApp, app_name_from_container, container_name,
    epoch_millis,
};
use hive_state::StateStore;

use crate::error::{HostError, LifecycleError, LifecycleResult, RuntimeError};
use crate::host::HostSystem;
use crate::locks::{NameLocks, Phase, Phases};
use crate::runtime::{ContainerConfig, ContainerRuntime, PullEvent};
use crate::volume;

/// Where an application stands on this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Absent,
    Installing,
    Running,
    Stopped,
    Redeploying,
    Removing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    /// Container, image and port only.
    Soft,
    /// Everything, including the volume and the install record.
    Hard,
}

/// Drives the container runtime and the host for local applications.
pub struct LifecycleManager {
    store: StateStore,
    runtime: Arc<dyn ContainerRuntime>,
    host: Arc<dyn HostSystem>,
    admission: AdmissionController,
    settings: RuntimeSection,
    locks: NameLocks,
    phases: Phases,
}

impl LifecycleManager {
    pub fn new(
        store: StateStore,
        runtime: Arc<dyn ContainerRuntime>,
        host: Arc<dyn HostSystem>,
        admission: AdmissionController,
        settings: RuntimeSection,
    ) -> Self {
        Self {
            store,
            runtime,
            host,
            admission,
            settings,
            locks: NameLocks::new(),
            phases: Phases::new(),
        }
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Install `app` with the resources of `tier`.
    pub async fn install(&self, app: &GlobalApp, tier: NodeTier) -> LifecycleResult<()> {
        self.runtime.ensure_network(&self.settings.network).await?;
        let _lock = self.locks.lock(&app.name).await;
        self.install_locked(app, tier).await
    }

    /// Install with the name lock already held by the caller.
    async fn install_locked(&self, app: &GlobalApp, tier: NodeTier) -> LifecycleResult<()> {
        let name = app.name.as_str();
        if self.store.get_installed(name)?.is_some() {
            return Err(LifecycleError::AlreadyInstalled(name.to_string()));
        }
        self.admission.check_requirements(&app.specification, tier)?;
        let _phase = self.phases.enter(name, Phase::Installing);

        let spec = app.specification.for_tier(tier);
        self.store.put_installed(&InstalledApp {
            name: name.to_string(),
            hash: app.hash.clone(),
            height: app.height,
            specification: spec.clone(),
            installed_at: epoch_millis(),
        })?;
        info!(%name, image = %spec.repotag, %tier, "installing application");

        if let Err(e) = self.build(&spec, true).await {
            error!(%name, error = %e, "install failed, rolling back");
            let _removing = self.phases.enter(name, Phase::Removing);
            self.teardown(name, Some(&spec), Teardown::Hard).await;
            return Err(e);
        }
        info!(%name, port = spec.port, "application installed");
        Ok(())
    }

    /// Remove `name` and everything it owns on this node.
    ///
    /// Without `force` the app must have an install record. Every step is
    /// attempted even when earlier ones fail.
    pub async fn remove(&self, name: &str, force: bool) -> LifecycleResult<()> {
        let _removing = self.phases.enter(name, Phase::Removing);
        let _lock = self.locks.lock(name).await;
        let record = self.store.get_installed(name)?;
        if record.is_none() && !force {
            return Err(LifecycleError::NotInstalled(name.to_string()));
        }
        info!(%name, force, "removing application");
        let spec = record.map(|r| r.specification);
        self.teardown(name, spec.as_ref(), Teardown::Hard).await;
        info!(%name, "application removed");
        Ok(())
    }

    /// Remove the container, image and port of `name` but keep its volume
    /// and install record.
    pub async fn soft_remove(&self, name: &str) -> LifecycleResult<()> {
        let _removing = self.phases.enter(name, Phase::Removing);
        let _lock = self.locks.lock(name).await;
        let record = self
            .store
            .get_installed(name)?
            .ok_or_else(|| LifecycleError::NotInstalled(name.to_string()))?;
        self.teardown(name, Some(&record.specification), Teardown::Soft)
            .await;
        info!(%name, "application soft-removed");
        Ok(())
    }

    /// Restart the container of an installed application.
    pub async fn restart(&self, name: &str) -> LifecycleResult<()> {
        let _lock = self.locks.lock(name).await;
        if self.store.get_installed(name)?.is_none() {
            return Err(LifecycleError::NotInstalled(name.to_string()));
        }
        self.runtime.restart_container(&container_name(name)).await?;
        info!(%name, "application restarted");
        Ok(())
    }

    /// Replace the installed copy of `app.name` with `app`.
    ///
    /// A hard redeploy removes everything including the volume and installs
    /// from scratch. A soft redeploy keeps the volume and the mount.
    pub async fn redeploy(&self, app: &GlobalApp, tier: NodeTier, hard: bool) -> LifecycleResult<()> {
        let name = app.name.as_str();
        if self.store.get_installed(name)?.is_none() {
            return Err(LifecycleError::NotInstalled(name.to_string()));
        }
        self.admission.check_redeploy(&app.specification, tier)?;
        info!(%name, hash = %app.hash, hard, "redeploying application");

        // One lock acquisition for the whole swap, so nothing else can
        // install the name in between.
        let _phase = self.phases.enter(name, Phase::Redeploying);
        let _lock = self.locks.lock(name).await;
        let current = self
            .store
            .get_installed(name)?
            .ok_or_else(|| LifecycleError::NotInstalled(name.to_string()))?;

        if hard {
            self.teardown(name, Some(&current.specification), Teardown::Hard)
                .await;
            tokio::time::sleep(self.settings.settle_delay()).await;
            self.runtime.ensure_network(&self.settings.network).await?;
            return self.install_locked(app, tier).await;
        }

        self.teardown(name, Some(&current.specification), Teardown::Soft)
            .await;
        tokio::time::sleep(self.settings.settle_delay()).await;

        let spec = app.specification.for_tier(tier);
        self.store.put_installed(&InstalledApp {
            name: name.to_string(),
            hash: app.hash.clone(),
            height: app.height,
            specification: spec.clone(),
            installed_at: epoch_millis(),
        })?;
        if let Err(e) = self.build(&spec, false).await {
            error!(%name, error = %e, "redeploy failed, removing application");
            let _removing = self.phases.enter(name, Phase::Removing);
            self.teardown(name, Some(&spec), Teardown::Hard).await;
            return Err(e);
        }
        info!(%name, "application redeployed");
        Ok(())
    }

    /// Whether replacing `installed` with `app` needs a fresh volume.
    pub fn needs_hard_redeploy(installed: &InstalledApp, app: &GlobalApp, tier: NodeTier) -> bool {
        installed.specification.hdd != app.specification.effective_resources(tier).hdd
    }

    /// Whether a removal of `name` is underway.
    pub fn is_removing(&self, name: &str) -> bool {
        self.phases.get(name) == Some(Phase::Removing)
    }

    /// Whether any lifecycle operation on `name` is underway.
    pub fn is_busy(&self, name: &str) -> bool {
        self.phases.get(name).is_some()
    }

    pub fn installed(&self) -> LifecycleResult<Vec<InstalledApp>> {
        Ok(self.store.list_installed()?)
    }

    pub fn installed_app(&self, name: &str) -> LifecycleResult<Option<InstalledApp>> {
        Ok(self.store.get_installed(name)?)
    }

    /// Names of applications whose containers are running.
    pub async fn running_names(&self) -> LifecycleResult<HashSet<String>> {
        Ok(self
            .runtime
            .list_containers(false)
            .await?
            .into_iter()
            .filter(|c| c.running)
            .filter_map(|c| app_name_from_container(&c.name).map(str::to_string))
            .collect())
    }

    pub async fn state(&self, name: &str) -> LifecycleResult<AppState> {
        match self.phases.get(name) {
            Some(Phase::Installing) => return Ok(AppState::Installing),
            Some(Phase::Redeploying) => return Ok(AppState::Redeploying),
            Some(Phase::Removing) => return Ok(AppState::Removing),
            None => {}
        }
        if self.store.get_installed(name)?.is_none() {
            return Ok(AppState::Absent);
        }
        if self.running_names().await?.contains(name) {
            Ok(AppState::Running)
        } else {
            Ok(AppState::Stopped)
        }
    }

    // ── Steps ──────────────────────────────────────────────────────

    /// Pull, optionally provision the volume, create, open the port, start.
    async fn build(&self, spec: &AppSpecification, provision_volume: bool) -> LifecycleResult<()> {
        let image = spec
            .image()
            .ok_or_else(|| LifecycleError::InvalidImage(spec.repotag.clone()))?;
        self.pull(&image).await?;

        let mount = volume::mount_point(&self.settings.apps_folder, &spec.name);
        if provision_volume {
            self.provision_volume(&spec.name, spec.hdd, &mount).await?;
        }

        self.runtime
            .create_container(&container_config(spec, &self.settings.network, mount))
            .await?;
        self.host.open_port(spec.port).await?;
        self.runtime.start_container(&spec.container_name()).await?;
        Ok(())
    }

    async fn pull(&self, image: &ImageRef) -> LifecycleResult<()> {
        let mut events = self.runtime.pull_image(image).await?;
        while let Some(event) = events.recv().await {
            match event {
                PullEvent::Progress { id, status } => {
                    debug!(%image, ?id, %status, "pull progress");
                }
                PullEvent::Done => {
                    debug!(%image, "image pulled");
                    return Ok(());
                }
                PullEvent::Failed(reason) => return Err(RuntimeError::Pull(reason).into()),
            }
        }
        Err(RuntimeError::Pull(format!("pull of {image} ended without completing")).into())
    }

    async fn provision_volume(&self, name: &str, hdd_gb: u64, mount: &Path) -> LifecycleResult<()> {
        let volumes = self.host.volumes().await?;
        let reserve = self.settings.volume_reserve_gb;
        let chosen = volume::select_volume(&volumes, hdd_gb, reserve).ok_or(HostError::NoVolume {
            needed_gb: hdd_gb.saturating_add(reserve),
        })?;
        let file = volume::volume_file(&chosen.mount, name);
        debug!(%name, file = %file.display(), hdd_gb, "allocating volume");
        self.host.allocate_volume(&file, hdd_gb.max(1)).await?;
        self.host.mount_volume(&file, mount).await?;
        self.host.add_boot_mount(&file, mount).await?;
        Ok(())
    }

    async fn teardown(&self, name: &str, spec: Option<&AppSpecification>, mode: Teardown) {
        let container = container_name(name);
        log_step(name, "stop container", ignore_missing(self.runtime.stop_container(&container).await));
        log_step(
            name,
            "remove container",
            ignore_missing(self.runtime.remove_container(&container).await),
        );
        if let Some(spec) = spec {
            log_step(
                name,
                "remove image",
                ignore_missing(self.runtime.remove_image(&spec.repotag).await),
            );
            log_step(name, "close port", self.host.close_port(spec.port).await);
        }
        if mode == Teardown::Soft {
            return;
        }

        let mount = volume::mount_point(&self.settings.apps_folder, name);
        log_step(name, "unmount volume", self.host.unmount_volume(&mount).await);
        match self.host.volumes().await {
            Ok(volumes) => {
                for candidate in volume::candidates(&volumes) {
                    let file = volume::volume_file(&candidate.mount, name);
                    match self.host.remove_file(&file).await {
                        Ok(true) => debug!(%name, file = %file.display(), "volume file removed"),
                        Ok(false) => {}
                        Err(e) => warn!(%name, file = %file.display(), error = %e, "failed to remove volume file"),
                    }
                }
            }
            Err(e) => warn!(%name, error = %e, "failed to list volumes"),
        }
        log_step(name, "remove boot mount", self.host.remove_boot_mount(&mount).await);
        log_step(
            name,
            "delete install record",
            self.store.delete_installed(name).map(|_| ()),
        );
    }
}

fn ignore_missing(result: Result<(), RuntimeError>) -> Result<(), RuntimeError> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

fn log_step<E: std::fmt::Display>(name: &str, step: &str, result: Result<(), E>) {
    match result {
        Ok(()) => debug!(%name, %step, "removal step done"),
        Err(e) => warn!(%name, %step, error = %e, "removal step failed"),
    }
}

/// Container settings for `spec`, whose resources are already tier-resolved.
fn container_config(spec: &AppSpecification, network: &str, mount: PathBuf) -> ContainerConfig {
    ContainerConfig {
        name: spec.container_name(),
        image: spec.repotag.clone(),
        network: network.to_string(),
        env: spec.environment_parameters.clone(),
        cmd: spec.commands.clone(),
        container_port: spec.container_port,
        host_port: spec.port,
        nano_cpus: u64::from(spec.resources().cpu_tenths()) * 100_000_000,
        memory_bytes: spec.ram * 1024 * 1024,
        volume_host_path: mount,
        volume_container_path: spec.container_data.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hive_core::tier::TierCatalog;
    use hive_core::types::SPEC_VERSION;

    use super::*;
    use hive_admission::AdmissionError;
    use crate::testing::{MemoryHost, MemoryRuntime};

    fn spec(name: &str, repotag: &str, port: u16) -> AppSpecification {
        AppSpecification {
            version: SPEC_VERSION,
            name: name.to_string(),
            description: "demo".to_string(),
            repotag: repotag.to_string(),
            owner: "ab".repeat(32),
            port,
            container_port: 8080,
            container_data: "/data".to_string(),
            environment_parameters: vec!["MODE=prod".to_string()],
            commands: vec![],
            cpu: 0.5,
            ram: 500,
            hdd: 5,
            tiered: false,
            tiers: None,
        }
    }

    fn global(name: &str, repotag: &str, port: u16, height: u64) -> GlobalApp {
        GlobalApp {
            name: name.to_string(),
            hash: format!("{name}-{height}"),
            owner: "ab".repeat(32),
            height,
            timestamp: 1,
            specification: spec(name, repotag, port),
        }
    }

    struct Fixture {
        manager: LifecycleManager,
        runtime: Arc<MemoryRuntime>,
        host: Arc<MemoryHost>,
        store: StateStore,
    }

    fn fixture() -> Fixture {
        fixture_with_settle(0)
    }

    fn fixture_with_settle(settle_delay_secs: u64) -> Fixture {
        let store = StateStore::open_in_memory().unwrap();
        let runtime = Arc::new(MemoryRuntime::new());
        let host = Arc::new(MemoryHost::with_volume("/mnt/data", 100));
        let settings = RuntimeSection {
            apps_folder: PathBuf::from("/var/lib/hive/apps"),
            settle_delay_secs,
            ..RuntimeSection::default()
        };
        let manager = LifecycleManager::new(
            store.clone(),
            runtime.clone(),
            host.clone(),
            AdmissionController::new(store.clone(), TierCatalog::default()),
            settings,
        );
        Fixture {
            manager,
            runtime,
            host,
            store,
        }
    }

    // ── Install ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn install_then_remove_leaves_nothing() {
        let f = fixture();
        let app = global("demoapp", "acme/demo:latest", 31000, 1000);
        f.manager.install(&app, NodeTier::Basic).await.unwrap();

        assert!(f.store.get_installed("demoapp").unwrap().is_some());
        assert!(f.runtime.is_running("hivedemoapp"));
        assert!(f.host.port_open(31000));
        assert!(f.host.has_file("/mnt/data/demoapp.hivevol"));
        assert!(f.host.has_boot_mount("/var/lib/hive/apps/demoapp"));
        assert_eq!(f.manager.state("demoapp").await.unwrap(), AppState::Running);

        let config = f.runtime.config("hivedemoapp").unwrap();
        assert_eq!(config.nano_cpus, 500_000_000);
        assert_eq!(config.memory_bytes, 500 * 1024 * 1024);
        assert_eq!(config.network, "hivenetwork");

        f.manager.remove("demoapp", false).await.unwrap();
        assert!(f.store.get_installed("demoapp").unwrap().is_none());
        assert!(f.runtime.config("hivedemoapp").is_none());
        assert!(!f.host.port_open(31000));
        assert!(!f.host.has_file("/mnt/data/demoapp.hivevol"));
        assert!(!f.host.has_boot_mount("/var/lib/hive/apps/demoapp"));
        assert_eq!(f.manager.state("demoapp").await.unwrap(), AppState::Absent);
    }

    #[tokio::test]
    async fn pull_failure_rolls_back() {
        let f = fixture();
        f.runtime.fail_pull("acme/demo:latest");
        let app = global("demoapp", "acme/demo:latest", 31000, 1000);

        let err = f.manager.install(&app, NodeTier::Basic).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Runtime(RuntimeError::Pull(_))));
        assert!(f.store.get_installed("demoapp").unwrap().is_none());
        assert!(f.runtime.config("hivedemoapp").is_none());
        assert!(!f.manager.is_removing("demoapp"));
    }

    #[tokio::test]
    async fn start_failure_rolls_back_volume_and_port() {
        let f = fixture();
        f.runtime.fail_start("hivedemoapp");
        let app = global("demoapp", "acme/demo:latest", 31000, 1000);

        assert!(f.manager.install(&app, NodeTier::Basic).await.is_err());
        assert!(f.store.get_installed("demoapp").unwrap().is_none());
        assert!(!f.host.port_open(31000));
        assert!(!f.host.has_file("/mnt/data/demoapp.hivevol"));
    }

    #[tokio::test]
    async fn no_volume_fails_without_allocating() {
        let store = StateStore::open_in_memory().unwrap();
        let host = Arc::new(MemoryHost::with_volume("/mnt/data", 6));
        let manager = LifecycleManager::new(
            store.clone(),
            Arc::new(MemoryRuntime::new()),
            host.clone(),
            AdmissionController::new(store.clone(), TierCatalog::default()),
            RuntimeSection::default(),
        );
        let app = global("demoapp", "acme/demo:latest", 31000, 1000);

        let err = manager.install(&app, NodeTier::Basic).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Host(HostError::NoVolume { needed_gb: 7 })));
        assert!(!host.has_file("/mnt/data/demoapp.hivevol"));
        assert!(store.get_installed("demoapp").unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_install_is_rejected() {
        let f = fixture();
        let app = global("demoapp", "acme/demo:latest", 31000, 1000);
        f.manager.install(&app, NodeTier::Basic).await.unwrap();
        let err = f.manager.install(&app, NodeTier::Basic).await.unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyInstalled(n) if n == "demoapp"));
    }

    #[tokio::test]
    async fn admission_counts_installed_apps() {
        let f = fixture();
        let first = global("first", "acme/demo:latest", 31000, 1000);
        f.manager.install(&first, NodeTier::Basic).await.unwrap();

        // 0.5 cores of 1.0 are used; a second 0.5 would reach the limit.
        let second = global("second", "acme/demo:latest", 31001, 1000);
        let err = f.manager.install(&second, NodeTier::Basic).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Admission(AdmissionError::Insufficient { .. })
        ));
        assert!(f.store.get_installed("second").unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_installs_of_one_name_run_once() {
        let f = Arc::new(fixture());
        let app = global("demoapp", "acme/demo:latest", 31000, 1000);
        let a = {
            let f = Arc::clone(&f);
            let app = app.clone();
            tokio::spawn(async move { f.manager.install(&app, NodeTier::Basic).await })
        };
        let b = {
            let f = Arc::clone(&f);
            let app = app.clone();
            tokio::spawn(async move { f.manager.install(&app, NodeTier::Basic).await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(f.runtime.created_count(), 1);
    }

    // ── Remove ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn remove_requires_record_unless_forced() {
        let f = fixture();
        let err = f.manager.remove("ghost", false).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotInstalled(_)));
        f.manager.remove("ghost", true).await.unwrap();
    }

    #[tokio::test]
    async fn soft_remove_keeps_volume_and_record() {
        let f = fixture();
        let app = global("demoapp", "acme/demo:latest", 31000, 1000);
        f.manager.install(&app, NodeTier::Basic).await.unwrap();
        f.manager.soft_remove("demoapp").await.unwrap();

        assert!(f.store.get_installed("demoapp").unwrap().is_some());
        assert!(f.host.has_file("/mnt/data/demoapp.hivevol"));
        assert!(f.runtime.config("hivedemoapp").is_none());
        assert_eq!(f.manager.state("demoapp").await.unwrap(), AppState::Stopped);
    }

    #[tokio::test]
    async fn restart_needs_installed_app() {
        let f = fixture();
        assert!(matches!(
            f.manager.restart("demoapp").await,
            Err(LifecycleError::NotInstalled(_))
        ));
        let app = global("demoapp", "acme/demo:latest", 31000, 1000);
        f.manager.install(&app, NodeTier::Basic).await.unwrap();
        f.runtime.stop("hivedemoapp");
        f.manager.restart("demoapp").await.unwrap();
        assert!(f.runtime.is_running("hivedemoapp"));
    }

    // ── Redeploy ────────────────────────────────────────────────────

    #[tokio::test]
    async fn soft_redeploy_swaps_image_and_keeps_volume() {
        let f = fixture();
        f.manager
            .install(&global("demoapp", "acme/demo:latest", 31000, 1000), NodeTier::Basic)
            .await
            .unwrap();

        let update = global("demoapp", "acme/demo:v2", 31000, 1050);
        let record = f.store.get_installed("demoapp").unwrap().unwrap();
        assert!(!LifecycleManager::needs_hard_redeploy(&record, &update, NodeTier::Basic));
        tokio::time::timeout(
            Duration::from_secs(5),
            f.manager.redeploy(&update, NodeTier::Basic, false),
        )
        .await
        .unwrap()
        .unwrap();

        let record = f.store.get_installed("demoapp").unwrap().unwrap();
        assert_eq!(record.hash, "demoapp-1050");
        assert_eq!(record.specification.repotag, "acme/demo:v2");
        assert_eq!(f.runtime.config("hivedemoapp").unwrap().image, "acme/demo:v2");
        assert!(f.runtime.is_running("hivedemoapp"));
        assert!(f.host.has_file("/mnt/data/demoapp.hivevol"));
    }

    #[tokio::test]
    async fn hard_redeploy_reinstalls_with_new_volume() {
        let f = fixture();
        f.manager
            .install(&global("demoapp", "acme/demo:latest", 31000, 1000), NodeTier::Basic)
            .await
            .unwrap();

        let mut update = global("demoapp", "acme/demo:latest", 31000, 1050);
        update.specification.hdd = 8;
        let record = f.store.get_installed("demoapp").unwrap().unwrap();
        assert!(LifecycleManager::needs_hard_redeploy(&record, &update, NodeTier::Basic));
        f.manager.redeploy(&update, NodeTier::Basic, true).await.unwrap();

        let record = f.store.get_installed("demoapp").unwrap().unwrap();
        assert_eq!(record.specification.hdd, 8);
        assert_eq!(f.host.file_size("/mnt/data/demoapp.hivevol"), Some(8));
    }

    #[tokio::test]
    async fn remove_during_redeploy_leaves_no_phase_behind() {
        let f = Arc::new(fixture_with_settle(1));
        f.manager
            .install(&global("demoapp", "acme/demo:latest", 31000, 1000), NodeTier::Basic)
            .await
            .unwrap();

        let redeploy = {
            let f = Arc::clone(&f);
            tokio::spawn(async move {
                let update = global("demoapp", "acme/demo:v2", 31000, 1050);
                f.manager.redeploy(&update, NodeTier::Basic, false).await
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.manager.state("demoapp").await.unwrap(), AppState::Redeploying);

        // Queues behind the redeploy and finishes after it.
        let remove = {
            let f = Arc::clone(&f);
            tokio::spawn(async move { f.manager.remove("demoapp", true).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.manager.state("demoapp").await.unwrap(), AppState::Removing);

        redeploy.await.unwrap().unwrap();
        remove.await.unwrap().unwrap();

        assert!(!f.manager.is_busy("demoapp"));
        assert_eq!(f.manager.state("demoapp").await.unwrap(), AppState::Absent);
        assert!(f.store.get_installed("demoapp").unwrap().is_none());
    }

    #[tokio::test]
    async fn hard_redeploy_holds_the_name_through_settle() {
        let f = Arc::new(fixture_with_settle(1));
        let original = global("demoapp", "acme/demo:latest", 31000, 1000);
        f.manager.install(&original, NodeTier::Basic).await.unwrap();

        let mut update = global("demoapp", "acme/demo:latest", 31000, 1050);
        update.specification.hdd = 8;
        let redeploy = {
            let f = Arc::clone(&f);
            let update = update.clone();
            tokio::spawn(async move { f.manager.redeploy(&update, NodeTier::Basic, true).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;

        // The old install is gone but the name is still taken.
        assert!(f.store.get_installed("demoapp").unwrap().is_none());
        assert!(f.manager.is_busy("demoapp"));
        let racing = f.manager.install(&original, NodeTier::Basic).await;

        redeploy.await.unwrap().unwrap();
        assert!(matches!(racing, Err(LifecycleError::AlreadyInstalled(_))));
        let record = f.store.get_installed("demoapp").unwrap().unwrap();
        assert_eq!(record.hash, "demoapp-1050");
        assert_eq!(f.host.file_size("/mnt/data/demoapp.hivevol"), Some(8));
        assert!(!f.manager.is_busy("demoapp"));
    }

    #[tokio::test]
    async fn redeploy_of_unknown_app_fails() {
        let f = fixture();
        let update = global("demoapp", "acme/demo:v2", 31000, 1050);
        assert!(matches!(
            f.manager.redeploy(&update, NodeTier::Basic, false).await,
            Err(LifecycleError::NotInstalled(_))
        ));
    }
}
