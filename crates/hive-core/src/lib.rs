//! hive-core — shared types for the Hive application hosting node.
//!
//! Holds the data model that travels between nodes (application
//! specifications, specification messages, presence messages), the
//! static resource tier catalog, node configuration, message hashing and
//! signing, the traits for the collaborators the node talks to
//! (blockchain RPC, image catalog and the peer set), and the small HTTP
//! client those collaborators are reached through.

pub mod collab;
pub mod config;
pub mod crypto;
pub mod net;
pub mod tier;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use collab::{ChainClient, ImageCatalog, PeerMessage, PeerTransport};
pub use config::NodeConfig;
pub use crypto::CryptoError;
pub use tier::{NodeTier, ResourceKind, TierBudget, TierCatalog};
pub use types::*;
