//! hive-registry — the specification registry of a Hive node.
//!
//! Owns the life of an application specification message from the moment
//! a peer hands it over until it is enforced network-wide:
//!
//! ```text
//! peer ──► MessageCache (dedup) ──► verify ──► temporary store (60 min)
//!                                                │
//!          chain indexer: payment(hash, height) ─┤
//!                                                ▼
//!                                    price check ──► permanent store
//!                                                       │
//!                                                       ▼
//!                              projection: one spec per name, highest height wins
//! ```
//!
//! Presence gossip ("node X runs app Y") shares the same dedup cache and
//! lives in [`presence`]. [`relay`] dispatches inbound peer messages and
//! re-broadcasts the ones that were new.

pub mod cache;
pub mod error;
pub mod presence;
pub mod pricing;
pub mod registry;
pub mod relay;
pub mod validate;

pub use cache::MessageCache;
pub use error::{RegistryError, RegistryResult, ValidationError};
pub use presence::Presence;
pub use pricing::{price_per_month, required_payment};
pub use registry::{PromoteOutcome, Registry};
pub use relay::handle_peer_message;
pub use validate::Validator;
