//! Collaborator interfaces implemented outside the orchestration core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{ImageRef, LocationMessage, SpecificationMessage};

/// Read access to the blockchain daemon.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Height of the current chain tip.
    async fn block_height(&self) -> anyhow::Result<u64>;

    /// Value, in whole coins, of the collateral output this node is bound
    /// to. Determines the node tier.
    async fn collateral_coins(&self) -> anyhow::Result<u64>;
}

/// Lookup of images in the remote registry.
#[async_trait]
pub trait ImageCatalog: Send + Sync {
    /// Size in bytes of the image, or `None` if it does not exist.
    async fn image_size(&self, image: &ImageRef) -> anyhow::Result<Option<u64>>;
}

/// Envelope for everything the orchestration core exchanges with peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum PeerMessage {
    /// A specification message (temporary, propagating).
    AppMessage(SpecificationMessage),
    /// A presence claim.
    AppRunning(LocationMessage),
    /// Ask peers to resend the specification message with this hash.
    AppRequest { hash: String },
}

/// Fire-and-forget delivery to the node's peer set.
///
/// Implementations swallow and log delivery errors; callers compensate
/// for loss with retries.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn broadcast_to_outgoing(&self, message: &PeerMessage);

    async fn broadcast_to_incoming(&self, message: &PeerMessage);
}
