//! Wire and storage types for application specifications.
//!
//! Everything here is JSON-serialized both on the wire between peers and
//! in the state store. Field order of [`AppSpecification`] is part of the
//! hashing/signing contract: `JSON(spec)` is the compact serde_json
//! encoding in declaration order.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::tier::{NodeTier, TierBudget};

/// Current application specification schema version.
pub const SPEC_VERSION: u32 = 1;

/// Prefix prepended to an application name to form its container name.
pub const CONTAINER_PREFIX: &str = "hive";

// ── Specification ─────────────────────────────────────────────────

/// CPU/RAM/HDD footprint of an application.
///
/// `cpu` is in cores (0.1 steps), `ram` in MB (100 MB steps), `hdd` in GB.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Resources {
    pub cpu: f64,
    pub ram: u64,
    pub hdd: u64,
}

impl Resources {
    /// CPU in fixed-point tenths of a core.
    pub fn cpu_tenths(&self) -> u32 {
        (self.cpu * 10.0).round().max(0.0) as u32
    }

    /// Express the footprint in the same units as a tier budget.
    pub fn as_budget(&self) -> TierBudget {
        TierBudget::new(self.cpu_tenths(), self.ram, self.hdd)
    }
}

/// Per-tier footprints of a tiered specification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TieredResources {
    pub basic: Resources,
    #[serde(rename = "super")]
    pub super_: Resources,
    pub bamf: Resources,
}

impl TieredResources {
    pub fn for_tier(&self, tier: NodeTier) -> Resources {
        match tier {
            NodeTier::Basic => self.basic,
            NodeTier::Super => self.super_,
            NodeTier::Bamf => self.bamf,
        }
    }
}

/// Declarative description of a containerized workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSpecification {
    pub version: u32,
    pub name: String,
    pub description: String,
    /// Image reference, `namespace/name:tag`.
    pub repotag: String,
    /// Hex-encoded public key of the owner.
    pub owner: String,
    /// Externally exposed port.
    pub port: u16,
    pub container_port: u16,
    /// Mount target of the backing volume inside the container.
    pub container_data: String,
    pub environment_parameters: Vec<String>,
    pub commands: Vec<String>,
    pub cpu: f64,
    pub ram: u64,
    pub hdd: u64,
    pub tiered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiers: Option<TieredResources>,
}

impl AppSpecification {
    /// Untiered footprint as declared.
    pub fn resources(&self) -> Resources {
        Resources {
            cpu: self.cpu,
            ram: self.ram,
            hdd: self.hdd,
        }
    }

    /// Footprint that applies on a node of the given tier.
    pub fn effective_resources(&self, tier: NodeTier) -> Resources {
        match (self.tiered, &self.tiers) {
            (true, Some(tiers)) => tiers.for_tier(tier),
            _ => self.resources(),
        }
    }

    /// Copy of this specification with tier-specific values substituted
    /// into the top-level `cpu`/`ram`/`hdd` fields.
    pub fn for_tier(&self, tier: NodeTier) -> AppSpecification {
        let effective = self.effective_resources(tier);
        AppSpecification {
            cpu: effective.cpu,
            ram: effective.ram,
            hdd: effective.hdd,
            ..self.clone()
        }
    }

    /// Name of the container running this application.
    pub fn container_name(&self) -> String {
        container_name(&self.name)
    }

    /// Parse the image reference.
    pub fn image(&self) -> Option<ImageRef> {
        ImageRef::parse(&self.repotag)
    }
}

/// Container name for an application name.
pub fn container_name(app_name: &str) -> String {
    format!("{CONTAINER_PREFIX}{app_name}")
}

/// Inverse of [`container_name`], tolerating the leading `/` the container
/// runtime puts in front of names.
pub fn app_name_from_container(container: &str) -> Option<&str> {
    container
        .trim_start_matches('/')
        .strip_prefix(CONTAINER_PREFIX)
        .filter(|name| !name.is_empty())
}

/// Parsed `namespace/name:tag` image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    pub namespace: String,
    pub name: String,
    pub tag: String,
}

impl ImageRef {
    pub fn parse(repotag: &str) -> Option<Self> {
        let (repository, tag) = repotag.rsplit_once(':')?;
        let (namespace, name) = repository.split_once('/')?;
        if namespace.is_empty() || name.is_empty() || tag.is_empty() || tag.contains('/') {
            return None;
        }
        Some(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            tag: tag.to_string(),
        })
    }

    /// `namespace/name` without the tag.
    pub fn repository(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.name, self.tag)
    }
}

// ── Specification messages ────────────────────────────────────────

/// Kind of a specification message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "appregister")]
    Register,
    #[serde(rename = "appupdate")]
    Update,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Register => "appregister",
            MessageType::Update => "appupdate",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed, hash-identified envelope carrying a specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecificationMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub version: u32,
    pub specification: AppSpecification,
    /// Creation time in milliseconds.
    pub timestamp: u64,
    pub signature: String,
    pub hash: String,
}

/// A specification message waiting for its on-chain payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporaryMessage {
    pub message: SpecificationMessage,
    pub received_at: u64,
    pub expire_at: u64,
}

/// A specification message anchored to a payment transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermanentMessage {
    pub message: SpecificationMessage,
    pub txid: String,
    pub height: u64,
    pub value_sat: u64,
}

impl PermanentMessage {
    /// Table key: zero-padded height first so key order is height order.
    pub fn table_key(&self) -> String {
        permanent_key(self.height, &self.message.hash)
    }
}

/// Build a permanent-message key from its parts.
pub fn permanent_key(height: u64, hash: &str) -> String {
    format!("{height:012}:{hash}")
}

/// Projection row: the specification currently in force for a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalApp {
    pub name: String,
    pub hash: String,
    pub owner: String,
    pub height: u64,
    pub timestamp: u64,
    pub specification: AppSpecification,
}

impl GlobalApp {
    pub fn from_permanent(permanent: &PermanentMessage) -> Self {
        let spec = &permanent.message.specification;
        Self {
            name: spec.name.clone(),
            hash: permanent.message.hash.clone(),
            owner: spec.owner.clone(),
            height: permanent.height,
            timestamp: permanent.message.timestamp,
            specification: spec.clone(),
        }
    }

    /// Ordering key for last-writer-wins: chain height first, then
    /// timestamp and hash so that equal heights resolve deterministically.
    pub fn precedence(&self) -> (u64, u64, &str) {
        (self.height, self.timestamp, self.hash.as_str())
    }

    /// Whether this row wins over `other` for the same name.
    pub fn supersedes(&self, other: &GlobalApp) -> bool {
        self.precedence() >= other.precedence()
    }
}

/// A payment transaction observed on chain that references a message hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHash {
    pub hash: String,
    pub txid: String,
    pub height: u64,
    pub value_sat: u64,
    /// Set once the referenced message has been found and processed.
    pub message_found: bool,
}

// ── Presence ──────────────────────────────────────────────────────

/// Kind tag of a presence message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationMessageType {
    #[serde(rename = "apprunning")]
    Running,
}

/// "I am running application X" broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationMessage {
    #[serde(rename = "type")]
    pub kind: LocationMessageType,
    pub version: u32,
    pub name: String,
    pub hash: String,
    pub ip: String,
    pub broadcasted_at: u64,
}

/// Stored presence claim, keyed by `(name, ip)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    pub name: String,
    pub hash: String,
    pub ip: String,
    pub broadcasted_at: u64,
    pub expire_at: u64,
}

impl LocationRecord {
    pub fn table_key(&self) -> String {
        location_key(&self.name, &self.ip)
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expire_at <= now_ms
    }
}

/// Build a location key from its parts.
pub fn location_key(name: &str, ip: &str) -> String {
    format!("{name}/{ip}")
}

// ── Local installs ────────────────────────────────────────────────

/// Local record of an application installed on this node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledApp {
    pub name: String,
    /// Hash of the specification message this install was made from.
    pub hash: String,
    pub height: u64,
    /// Specification with this node's tier values substituted.
    pub specification: AppSpecification,
    pub installed_at: u64,
}

impl InstalledApp {
    pub fn resources(&self) -> Resources {
        self.specification.resources()
    }
}

/// Current Unix epoch in milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
