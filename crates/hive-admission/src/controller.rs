use tracing::debug;

use hive_core::tier::{NodeTier, ResourceKind, TierBudget, TierCatalog};
use hive_core::types::{AppSpecification, InstalledApp, Resources};
use hive_state::StateStore;

use crate::error::{AdmissionError, AdmissionResult};

/// Capacity left on a node of `tier` given its installed applications.
///
/// `exclude` leaves one application out of the sum, for redeploying it in
/// place.
pub fn available(
    tiers: &TierCatalog,
    tier: NodeTier,
    installed: &[InstalledApp],
    exclude: Option<&str>,
) -> TierBudget {
    let used = installed
        .iter()
        .filter(|app| Some(app.name.as_str()) != exclude)
        .map(|app| app.resources().as_budget())
        .fold(TierBudget::default(), |acc, b| {
            TierBudget::new(
                acc.cpu_tenths.saturating_add(b.cpu_tenths),
                acc.ram_mb.saturating_add(b.ram_mb),
                acc.hdd_gb.saturating_add(b.hdd_gb),
            )
        });
    tiers.usable(tier).saturating_sub(&used)
}

/// Reject a request that reaches or exceeds what is available in any
/// dimension.
pub fn check_fit(request: &Resources, available: &TierBudget) -> AdmissionResult<()> {
    let requested = request.as_budget();
    for kind in [ResourceKind::Cpu, ResourceKind::Ram, ResourceKind::Hdd] {
        let want = requested.get(kind);
        let have = available.get(kind);
        if want >= have {
            return Err(AdmissionError::Insufficient {
                resource: kind,
                requested: want,
                available: have,
            });
        }
    }
    Ok(())
}

/// Admission checks backed by the installed-apps table.
#[derive(Clone)]
pub struct AdmissionController {
    store: StateStore,
    tiers: TierCatalog,
}

impl AdmissionController {
    pub fn new(store: StateStore, tiers: TierCatalog) -> Self {
        Self { store, tiers }
    }

    pub fn tiers(&self) -> &TierCatalog {
        &self.tiers
    }

    /// Check whether `spec` fits next to everything already installed.
    pub fn check_requirements(&self, spec: &AppSpecification, tier: NodeTier) -> AdmissionResult<()> {
        self.check(spec, tier, None)
    }

    /// Like [`check_requirements`](Self::check_requirements), but the
    /// installed copy of `spec.name` does not count as used.
    pub fn check_redeploy(&self, spec: &AppSpecification, tier: NodeTier) -> AdmissionResult<()> {
        self.check(spec, tier, Some(&spec.name))
    }

    fn check(
        &self,
        spec: &AppSpecification,
        tier: NodeTier,
        exclude: Option<&str>,
    ) -> AdmissionResult<()> {
        let installed = self.store.list_installed()?;
        let left = available(&self.tiers, tier, &installed, exclude);
        let request = spec.effective_resources(tier);
        debug!(
            name = %spec.name,
            %tier,
            cpu_tenths = request.cpu_tenths(),
            ram = request.ram,
            hdd = request.hdd,
            available_cpu_tenths = left.cpu_tenths,
            available_ram = left.ram_mb,
            available_hdd = left.hdd_gb,
            "admission check"
        );
        check_fit(&request, &left)
    }
}
