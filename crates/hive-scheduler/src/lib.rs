//! hive-scheduler — the anti-entropy loops of a Hive node.
//!
//! No node coordinates with any other. Each one periodically compares its
//! local state with the replicated view (projection, locations, chain
//! height) and nudges it toward the desired state:
//!
//! ```text
//! spawn       under-replicated app, room here, coin flip  ──► install
//! presence    installed + running ──► announce; installed + stopped ──► restart or remove
//! prune       over-replicated app, coin flip              ──► remove
//! expiration  spec older than blocks_lasting              ──► drop from projection, remove
//! drift       installed hash != registered hash, coin flip ──► redeploy (soft or hard)
//! sweep       paid hash without message                   ──► ask peers again
//! ```
//!
//! The coin flips ([`throttle::passes`]) keep every eligible node in the
//! network from acting on the same application at once.

pub mod error;
pub mod orchestrator;
pub mod throttle;

pub use error::{SchedulerError, SchedulerResult};
pub use orchestrator::{HealReport, Orchestrator, SkipReason, SpawnOutcome};
