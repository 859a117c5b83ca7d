//! Specification validation.
//!
//! Field checks are pure and name the offending field. The image, allow-list
//! and port checks need the image catalog and the projection.

use std::sync::Arc;

use tracing::debug;

use hive_core::ImageCatalog;
use hive_core::config::AppsSection;
use hive_core::tier::{NodeTier, TierBudget, TierCatalog};
use hive_core::types::{AppSpecification, ImageRef, Resources, SPEC_VERSION};
use hive_state::StateStore;

use crate::error::{RegistryError, RegistryResult, ValidationError};

/// Checks application specifications against the node's rules.
pub struct Validator {
    apps: AppsSection,
    tiers: TierCatalog,
    images: Arc<dyn ImageCatalog>,
    store: StateStore,
}

impl Validator {
    pub fn new(
        apps: AppsSection,
        tiers: TierCatalog,
        images: Arc<dyn ImageCatalog>,
        store: StateStore,
    ) -> Self {
        Self {
            apps,
            tiers,
            images,
            store,
        }
    }

    /// Full validation: field bounds, allow-lists, image existence and
    /// size, and port uniqueness across other application names.
    pub async fn validate(&self, spec: &AppSpecification) -> RegistryResult<()> {
        self.validate_fields(spec)?;
        let image = ImageRef::parse(&spec.repotag)
            .ok_or_else(|| ValidationError::new("repotag", "expected namespace/name:tag"))?;
        self.check_allow_lists(spec, &image)?;
        self.check_image(&image).await?;
        self.check_port(spec)?;
        Ok(())
    }

    /// Static field checks.
    pub fn validate_fields(&self, spec: &AppSpecification) -> Result<(), ValidationError> {
        if spec.version != SPEC_VERSION {
            return Err(ValidationError::new(
                "version",
                format!("unsupported version {}", spec.version),
            ));
        }
        self.check_name(&spec.name)?;
        if spec.description.chars().count() > self.apps.max_description_len {
            return Err(ValidationError::new(
                "description",
                format!("longer than {} characters", self.apps.max_description_len),
            ));
        }
        if ImageRef::parse(&spec.repotag).is_none() {
            return Err(ValidationError::new("repotag", "expected namespace/name:tag"));
        }
        if spec.owner.len() != 64 || !spec.owner.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::new("owner", "expected a hex public key"));
        }
        if spec.port < self.apps.port_min || spec.port > self.apps.port_max {
            return Err(ValidationError::new(
                "port",
                format!(
                    "{} outside {}-{}",
                    spec.port, self.apps.port_min, self.apps.port_max
                ),
            ));
        }
        if spec.container_port == 0 {
            return Err(ValidationError::new("containerPort", "must be non-zero"));
        }
        if !spec.container_data.starts_with('/') {
            return Err(ValidationError::new(
                "containerData",
                "must be an absolute path",
            ));
        }

        // Top-level values must fit the largest tier.
        check_resources(&spec.resources(), &self.tiers.usable(NodeTier::Bamf), "")?;

        if spec.tiered {
            let tiers = spec
                .tiers
                .as_ref()
                .ok_or_else(|| ValidationError::new("tiers", "required when tiered"))?;
            for tier in NodeTier::ALL {
                check_resources(
                    &tiers.for_tier(tier),
                    &self.tiers.usable(tier),
                    &tier.to_string(),
                )?;
            }
        }
        Ok(())
    }

    fn check_name(&self, name: &str) -> Result<(), ValidationError> {
        if name.is_empty() {
            return Err(ValidationError::new("name", "must not be empty"));
        }
        if name.len() > self.apps.max_name_len {
            return Err(ValidationError::new(
                "name",
                format!("longer than {} characters", self.apps.max_name_len),
            ));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::new("name", "only letters and digits allowed"));
        }
        let lower = name.to_ascii_lowercase();
        if let Some(prefix) = self
            .apps
            .reserved_prefixes
            .iter()
            .find(|p| lower.starts_with(&p.to_ascii_lowercase()))
        {
            return Err(ValidationError::new(
                "name",
                format!("reserved prefix {prefix}"),
            ));
        }
        Ok(())
    }

    fn check_allow_lists(
        &self,
        spec: &AppSpecification,
        image: &ImageRef,
    ) -> Result<(), ValidationError> {
        let repository = image.repository();
        let repo_allowed = self.apps.allowed_repositories.iter().any(|entry| {
            entry == "*" || *entry == image.namespace || *entry == repository
        });
        if !repo_allowed {
            return Err(ValidationError::new(
                "repotag",
                format!("repository {repository} is not allowed"),
            ));
        }
        let owner_allowed = self
            .apps
            .allowed_owners
            .iter()
            .any(|entry| entry == "*" || entry.eq_ignore_ascii_case(&spec.owner));
        if !owner_allowed {
            return Err(ValidationError::new("owner", "owner is not allowed"));
        }
        Ok(())
    }

    async fn check_image(&self, image: &ImageRef) -> RegistryResult<()> {
        let size = self
            .images
            .image_size(image)
            .await
            .map_err(|e| RegistryError::ImageLookup(e.to_string()))?;
        match size {
            None => Err(ValidationError::new("repotag", format!("image {image} not found")).into()),
            Some(bytes) if bytes > self.apps.max_image_size_bytes => Err(ValidationError::new(
                "repotag",
                format!(
                    "image is {bytes} bytes, limit is {}",
                    self.apps.max_image_size_bytes
                ),
            )
            .into()),
            Some(bytes) => {
                debug!(%image, bytes, "image accepted");
                Ok(())
            }
        }
    }

    fn check_port(&self, spec: &AppSpecification) -> RegistryResult<()> {
        let taken = self
            .store
            .list_global_apps()?
            .into_iter()
            .find(|app| app.name != spec.name && app.specification.port == spec.port);
        match taken {
            Some(app) => Err(RegistryError::Conflict(format!(
                "port {} is used by {}",
                spec.port, app.name
            ))),
            None => Ok(()),
        }
    }
}

/// Bounds for one resource triple. `suffix` is appended to the field name
/// (`cpubasic`, `ramsuper`, ...).
fn check_resources(
    resources: &Resources,
    max: &TierBudget,
    suffix: &str,
) -> Result<(), ValidationError> {
    let cpu = resources.cpu;
    if !cpu.is_finite() || cpu < 0.0 {
        return Err(ValidationError::new(format!("cpu{suffix}"), "must be non-negative"));
    }
    if ((cpu * 10.0).round() - cpu * 10.0).abs() > 1e-6 {
        return Err(ValidationError::new(
            format!("cpu{suffix}"),
            "must be a multiple of 0.1",
        ));
    }
    if resources.cpu_tenths() > max.cpu_tenths {
        return Err(ValidationError::new(
            format!("cpu{suffix}"),
            format!("above {:.1} cores", f64::from(max.cpu_tenths) / 10.0),
        ));
    }
    if resources.ram % 100 != 0 {
        return Err(ValidationError::new(
            format!("ram{suffix}"),
            "must be a multiple of 100",
        ));
    }
    if resources.ram > max.ram_mb {
        return Err(ValidationError::new(
            format!("ram{suffix}"),
            format!("above {} MB", max.ram_mb),
        ));
    }
    if resources.hdd > max.hdd_gb {
        return Err(ValidationError::new(
            format!("hdd{suffix}"),
            format!("above {} GB", max.hdd_gb),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::testing::StaticImages;
    use hive_core::types::{GlobalApp, TieredResources};

    fn spec() -> AppSpecification {
        AppSpecification {
            version: SPEC_VERSION,
            name: "demoapp".to_string(),
            description: "demo".to_string(),
            repotag: "acme/demo:latest".to_string(),
            owner: "ab".repeat(32),
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

    fn validator_with(apps: AppsSection, store: StateStore) -> Validator {
        let images = Arc::new(StaticImages::with("acme/demo:latest", 100_000_000));
        Validator::new(apps, TierCatalog::default(), images, store)
    }

    fn validator() -> Validator {
        validator_with(AppsSection::default(), StateStore::open_in_memory().unwrap())
    }

    fn rejected_field(v: &Validator, s: &AppSpecification) -> String {
        v.validate_fields(s).unwrap_err().field
    }

    // ── Field checks ──

    #[test]
    fn valid_spec_passes() {
        assert!(validator().validate_fields(&spec()).is_ok());
    }

    #[test]
    fn each_violation_names_its_field() {
        let v = validator();
        let cases: Vec<(&str, Box<dyn Fn(&mut AppSpecification)>)> = vec![
            ("version", Box::new(|s: &mut AppSpecification| s.version = 2)),
            ("name", Box::new(|s: &mut AppSpecification| s.name = "demo-app".to_string())),
            ("name", Box::new(|s: &mut AppSpecification| s.name = "a".repeat(33))),
            ("name", Box::new(|s: &mut AppSpecification| s.name = "HiveApp".to_string())),
            ("description", Box::new(|s: &mut AppSpecification| s.description = "x".repeat(257))),
            ("repotag", Box::new(|s: &mut AppSpecification| s.repotag = "demo".to_string())),
            ("owner", Box::new(|s: &mut AppSpecification| s.owner = "nothex".to_string())),
            ("port", Box::new(|s: &mut AppSpecification| s.port = 30999)),
            ("port", Box::new(|s: &mut AppSpecification| s.port = 40000)),
            ("containerPort", Box::new(|s: &mut AppSpecification| s.container_port = 0)),
            ("containerData", Box::new(|s: &mut AppSpecification| s.container_data = "data".to_string())),
            ("cpu", Box::new(|s: &mut AppSpecification| s.cpu = -0.1)),
            ("cpu", Box::new(|s: &mut AppSpecification| s.cpu = 0.55)),
            ("cpu", Box::new(|s: &mut AppSpecification| s.cpu = 7.1)),
            ("ram", Box::new(|s: &mut AppSpecification| s.ram = 550)),
            ("ram", Box::new(|s: &mut AppSpecification| s.ram = 30_100)),
            ("hdd", Box::new(|s: &mut AppSpecification| s.hdd = 571)),
            ("tiers", Box::new(|s: &mut AppSpecification| s.tiered = true)),
        ];
        for (field, mutate) in cases {
            let mut s = spec();
            mutate(&mut s);
            assert_eq!(rejected_field(&v, &s), field, "case for {field}");
        }
    }

    #[test]
    fn upper_bounds_are_inclusive() {
        let v = validator();
        let mut s = spec();
        s.cpu = 7.0;
        s.ram = 30_000;
        s.hdd = 570;
        assert!(v.validate_fields(&s).is_ok());
    }

    #[test]
    fn zero_resources_are_allowed() {
        let mut s = spec();
        s.cpu = 0.0;
        s.ram = 0;
        s.hdd = 0;
        assert!(validator().validate_fields(&s).is_ok());
    }

    #[test]
    fn tiered_values_are_checked_per_tier() {
        let v = validator();
        let mut s = spec();
        s.tiered = true;
        s.tiers = Some(TieredResources {
            basic: Resources { cpu: 1.0, ram: 2000, hdd: 20 },
            super_: Resources { cpu: 3.0, ram: 6000, hdd: 120 },
            bamf: Resources { cpu: 7.0, ram: 30_000, hdd: 570 },
        });
        assert!(v.validate_fields(&s).is_ok());

        // Basic usable cpu is 1.0 core.
        if let Some(tiers) = s.tiers.as_mut() {
            tiers.basic.cpu = 1.1;
        }
        assert_eq!(rejected_field(&v, &s), "cpubasic");

        if let Some(tiers) = s.tiers.as_mut() {
            tiers.basic.cpu = 1.0;
            tiers.super_.hdd = 121;
        }
        assert_eq!(rejected_field(&v, &s), "hddsuper");
    }

    // ── Catalog and projection checks ──

    #[tokio::test]
    async fn missing_image_is_rejected() {
        let v = validator();
        let mut s = spec();
        s.repotag = "acme/other:latest".to_string();
        match v.validate(&s).await {
            Err(RegistryError::Validation(e)) => assert_eq!(e.field, "repotag"),
            other => panic!("expected repotag rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_image_is_rejected() {
        let apps = AppsSection {
            max_image_size_bytes: 1_000,
            ..AppsSection::default()
        };
        let v = validator_with(apps, StateStore::open_in_memory().unwrap());
        assert!(matches!(
            v.validate(&spec()).await,
            Err(RegistryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn allow_lists_are_enforced() {
        let apps = AppsSection {
            allowed_repositories: vec!["trusted".to_string()],
            ..AppsSection::default()
        };
        let v = validator_with(apps, StateStore::open_in_memory().unwrap());
        match v.validate(&spec()).await {
            Err(RegistryError::Validation(e)) => assert_eq!(e.field, "repotag"),
            other => panic!("expected repotag rejection, got {other:?}"),
        }

        let apps = AppsSection {
            allowed_repositories: vec!["acme/demo".to_string()],
            allowed_owners: vec!["cd".repeat(32)],
            ..AppsSection::default()
        };
        let v = validator_with(apps, StateStore::open_in_memory().unwrap());
        match v.validate(&spec()).await {
            Err(RegistryError::Validation(e)) => assert_eq!(e.field, "owner"),
            other => panic!("expected owner rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn port_taken_by_other_name_conflicts() {
        let store = StateStore::open_in_memory().unwrap();
        let mut other = spec();
        other.name = "otherapp".to_string();
        store
            .put_global_app(&GlobalApp {
                name: other.name.clone(),
                hash: "h1".to_string(),
                owner: other.owner.clone(),
                height: 900,
                timestamp: 1,
                specification: other,
            })
            .unwrap();
        let v = validator_with(AppsSection::default(), store.clone());
        assert!(matches!(
            v.validate(&spec()).await,
            Err(RegistryError::Conflict(_))
        ));

        // The same name keeping its port is not a conflict.
        let mut same = spec();
        same.name = "otherapp".to_string();
        assert!(v.validate(&same).await.is_ok());
    }
}
