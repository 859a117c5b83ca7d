//! hive-state — embedded state store for a Hive node.
//!
//! Backed by [redb](https://docs.rs/redb). Holds the gossip-replicated
//! records (temporary and permanent specification messages, the
//! current-specification projection, observed payment hashes, presence
//! records) next to the node-local table of installed applications.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Permanent messages are keyed `{height:012}:{hash}` so a plain key scan
//! walks them in ascending chain height; a side index maps hash → key.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks. Read-modify-write operations
//! (last-writer-wins upserts) run inside a single write transaction, and
//! redb serializes write transactions, so concurrent writers cannot
//! interleave inside one upsert.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::StateStore;
