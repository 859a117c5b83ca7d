//! hived — the Hive node daemon.
//!
//! Assembles one node from the library crates:
//! - State store (redb)
//! - Specification registry and presence index
//! - Lifecycle manager over the Docker Engine API
//! - Scheduler loops
//! - Node HTTP API (gossip in, chain indexer reports, read-only views)
//!
//! and the production collaborators: chain JSON-RPC ([`rpc`]), peer
//! delivery over HTTP ([`transport`]) and the image catalog ([`catalog`]).

pub mod catalog;
pub mod daemon;
pub mod peer_api;
pub mod rpc;
pub mod submit;
pub mod transport;

pub use daemon::{Collaborators, Node, run};
