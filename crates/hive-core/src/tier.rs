//! Resource tier catalog.
//!
//! A node's tier is derived from the value of its bound collateral
//! transaction. The tier fixes the node's CPU/RAM/HDD budget and selects
//! which footprint of a tiered specification applies on that node.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hardware class of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeTier {
    /// Cumulus.
    Basic,
    /// Nimbus.
    Super,
    /// Stratus.
    Bamf,
}

impl NodeTier {
    pub const ALL: [NodeTier; 3] = [NodeTier::Basic, NodeTier::Super, NodeTier::Bamf];

    /// Marketing name of the tier.
    pub fn display_name(self) -> &'static str {
        match self {
            NodeTier::Basic => "cumulus",
            NodeTier::Super => "nimbus",
            NodeTier::Bamf => "stratus",
        }
    }
}

impl fmt::Display for NodeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeTier::Basic => "basic",
            NodeTier::Super => "super",
            NodeTier::Bamf => "bamf",
        })
    }
}

/// One of the three admission-controlled resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cpu,
    Ram,
    Hdd,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Ram => "ram",
            ResourceKind::Hdd => "hdd",
        })
    }
}

/// A resource budget. CPU is kept in tenths of a core so that all
/// comparisons are integer comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TierBudget {
    pub cpu_tenths: u32,
    pub ram_mb: u64,
    pub hdd_gb: u64,
}

impl TierBudget {
    pub const fn new(cpu_tenths: u32, ram_mb: u64, hdd_gb: u64) -> Self {
        Self {
            cpu_tenths,
            ram_mb,
            hdd_gb,
        }
    }

    /// Component-wise saturating subtraction.
    pub fn saturating_sub(&self, other: &TierBudget) -> TierBudget {
        TierBudget {
            cpu_tenths: self.cpu_tenths.saturating_sub(other.cpu_tenths),
            ram_mb: self.ram_mb.saturating_sub(other.ram_mb),
            hdd_gb: self.hdd_gb.saturating_sub(other.hdd_gb),
        }
    }

    /// Value of a single resource in its native unit.
    pub fn get(&self, kind: ResourceKind) -> u64 {
        match kind {
            ResourceKind::Cpu => u64::from(self.cpu_tenths),
            ResourceKind::Ram => self.ram_mb,
            ResourceKind::Hdd => self.hdd_gb,
        }
    }
}

/// Static mapping from tier to hardware budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierCatalog {
    basic: TierBudget,
    super_: TierBudget,
    bamf: TierBudget,
    /// Resources the node keeps for its own services.
    reserved: TierBudget,
    /// Minimum collateral (whole coins) for basic, super, bamf.
    collateral: [u64; 3],
}

impl Default for TierCatalog {
    fn default() -> Self {
        Self {
            basic: TierBudget::new(20, 4000, 50),
            super_: TierBudget::new(40, 8000, 150),
            bamf: TierBudget::new(80, 32000, 600),
            reserved: TierBudget::new(10, 2000, 30),
            collateral: [10_000, 25_000, 100_000],
        }
    }
}

impl TierCatalog {
    /// Total hardware budget of a tier.
    pub fn budget(&self, tier: NodeTier) -> TierBudget {
        match tier {
            NodeTier::Basic => self.basic,
            NodeTier::Super => self.super_,
            NodeTier::Bamf => self.bamf,
        }
    }

    /// Resources held back for the node itself.
    pub fn reserved(&self) -> TierBudget {
        self.reserved
    }

    /// Budget left for applications once the system reserve is taken.
    pub fn usable(&self, tier: NodeTier) -> TierBudget {
        self.budget(tier).saturating_sub(&self.reserved)
    }

    /// Resolve the tier a collateral amount (whole coins) buys.
    ///
    /// Collateral must match a bucket exactly; anything else binds no tier.
    pub fn tier_for_collateral(&self, coins: u64) -> Option<NodeTier> {
        NodeTier::ALL
            .into_iter()
            .zip(self.collateral)
            .find(|(_, amount)| *amount == coins)
            .map(|(tier, _)| tier)
    }
}
