//! redb table definitions for the Hive state store.
//!
//! JSON tables use `&str` keys and `&[u8]` values.

use redb::TableDefinition;

/// Value type shared by every JSON table.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Unconfirmed specification messages keyed by message hash.
pub const TEMPORARY_MESSAGES: JsonTable = TableDefinition::new("temporary_messages");

/// Chain-anchored messages keyed by `{height:012}:{hash}`.
pub const PERMANENT_MESSAGES: JsonTable = TableDefinition::new("permanent_messages");

/// Message hash → key in `PERMANENT_MESSAGES`.
pub const PERMANENT_BY_HASH: TableDefinition<&str, &str> =
    TableDefinition::new("permanent_by_hash");

/// Current specification per application name.
pub const GLOBAL_APPS: JsonTable = TableDefinition::new("global_apps");

/// Observed payment transactions keyed by the message hash they pay for.
pub const CHAIN_HASHES: JsonTable = TableDefinition::new("chain_hashes");

/// Presence records keyed by `{name}/{ip}`.
pub const LOCATIONS: JsonTable = TableDefinition::new("locations");

/// Applications installed on this node keyed by name.
pub const INSTALLED_APPS: JsonTable = TableDefinition::new("installed_apps");

/// Scalar bookkeeping values (scanned height, expiry floor).
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// `META` key holding the height the chain indexer has processed.
pub const META_SCANNED_HEIGHT: &str = "scanned_height";

/// `META` key holding the lowest height a specification may be anchored at
/// and still be in force.
pub const META_EXPIRY_FLOOR: &str = "expiry_floor";
