//! StateStore — redb-backed state persistence for a Hive node.
//!
//! Provides typed operations over the message, projection, presence, and
//! install tables. All values are JSON-serialized into redb's `&[u8]`
//! value columns. The store supports both on-disk and in-memory backends
//! (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use hive_core::types::{
    ChainHash, GlobalApp, InstalledApp, LocationRecord, PermanentMessage, TemporaryMessage,
    location_key, permanent_key,
};

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [
            TEMPORARY_MESSAGES,
            PERMANENT_MESSAGES,
            GLOBAL_APPS,
            CHAIN_HASHES,
            LOCATIONS,
            INSTALLED_APPS,
        ] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.open_table(PERMANENT_BY_HASH).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic JSON helpers ───────────────────────────────────────

    fn put_json<T: Serialize>(&self, def: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, def: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// All values of a table in key order.
    fn list_json<T: DeserializeOwned>(&self, def: JsonTable) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
        }
        Ok(results)
    }

    fn delete_json(&self, def: JsonTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    /// Delete every record for which `doomed` returns true. Returns the
    /// deleted records.
    fn delete_json_where<T, F>(&self, def: JsonTable, doomed: F) -> StateResult<Vec<T>>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut removed = Vec::new();
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            let mut keys = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let record: T =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if doomed(&record) {
                    keys.push(key.value().to_string());
                    removed.push(record);
                }
            }
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(removed)
    }

    // ── Temporary messages ─────────────────────────────────────────

    /// Store a temporary message. Returns false if the hash is already present.
    pub fn put_temporary(&self, temp: &TemporaryMessage) -> StateResult<bool> {
        let key = temp.message.hash.as_str();
        let bytes = serde_json::to_vec(temp).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let inserted;
        {
            let mut table = txn.open_table(TEMPORARY_MESSAGES).map_err(map_err!(Table))?;
            inserted = table.get(key).map_err(map_err!(Read))?.is_none();
            if inserted {
                table
                    .insert(key, bytes.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(hash = %key, inserted, "temporary message stored");
        Ok(inserted)
    }

    /// Get a temporary message by hash.
    pub fn get_temporary(&self, hash: &str) -> StateResult<Option<TemporaryMessage>> {
        self.get_json(TEMPORARY_MESSAGES, hash)
    }

    /// List all temporary messages.
    pub fn list_temporary(&self) -> StateResult<Vec<TemporaryMessage>> {
        self.list_json(TEMPORARY_MESSAGES)
    }

    /// Drop temporary messages whose TTL has passed. Returns number deleted.
    pub fn purge_expired_temporary(&self, now_ms: u64) -> StateResult<usize> {
        let removed: Vec<TemporaryMessage> =
            self.delete_json_where(TEMPORARY_MESSAGES, |t: &TemporaryMessage| t.expire_at <= now_ms)?;
        Ok(removed.len())
    }

    // ── Permanent messages ─────────────────────────────────────────

    /// Store a permanent message. Returns false if its hash is already stored.
    pub fn put_permanent(&self, permanent: &PermanentMessage) -> StateResult<bool> {
        let key = permanent.table_key();
        let hash = permanent.message.hash.as_str();
        let bytes = serde_json::to_vec(permanent).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let inserted;
        {
            let mut index = txn.open_table(PERMANENT_BY_HASH).map_err(map_err!(Table))?;
            inserted = index.get(hash).map_err(map_err!(Read))?.is_none();
            if inserted {
                index.insert(hash, key.as_str()).map_err(map_err!(Write))?;
                let mut table = txn.open_table(PERMANENT_MESSAGES).map_err(map_err!(Table))?;
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, inserted, "permanent message stored");
        Ok(inserted)
    }

    /// Look up a permanent message by its message hash.
    pub fn get_permanent(&self, hash: &str) -> StateResult<Option<PermanentMessage>> {
        let key = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let index = txn.open_table(PERMANENT_BY_HASH).map_err(map_err!(Table))?;
            match index.get(hash).map_err(map_err!(Read))? {
                Some(guard) => guard.value().to_string(),
                None => return Ok(None),
            }
        };
        self.get_json(PERMANENT_MESSAGES, &key)
    }

    /// Permanent messages with `height >= from_height`, ascending by height.
    pub fn list_permanent_from(&self, from_height: u64) -> StateResult<Vec<PermanentMessage>> {
        let start = permanent_key(from_height, "");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PERMANENT_MESSAGES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(start.as_str()..).map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
        }
        Ok(results)
    }

    /// All permanent messages for one application name, ascending by height.
    pub fn list_permanent_for_name(&self, name: &str) -> StateResult<Vec<PermanentMessage>> {
        Ok(self
            .list_permanent_from(0)?
            .into_iter()
            .filter(|p| p.message.specification.name == name)
            .collect())
    }

    // ── Global application projection ──────────────────────────────

    /// Get the current specification for a name.
    pub fn get_global_app(&self, name: &str) -> StateResult<Option<GlobalApp>> {
        self.get_json(GLOBAL_APPS, name)
    }

    /// List the whole projection.
    pub fn list_global_apps(&self) -> StateResult<Vec<GlobalApp>> {
        self.list_json(GLOBAL_APPS)
    }

    /// Overwrite the projection row for a name.
    pub fn put_global_app(&self, app: &GlobalApp) -> StateResult<()> {
        self.put_json(GLOBAL_APPS, &app.name, app)?;
        debug!(name = %app.name, height = app.height, "global app stored");
        Ok(())
    }

    /// Write `app` only if it supersedes the stored row for its name.
    ///
    /// Returns true if the projection changed.
    pub fn upsert_global_app_if_newer(&self, app: &GlobalApp) -> StateResult<bool> {
        let bytes = serde_json::to_vec(app).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let written;
        {
            let mut table = txn.open_table(GLOBAL_APPS).map_err(map_err!(Table))?;
            let existing: Option<GlobalApp> = match table.get(app.name.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            written = match existing {
                Some(current) => app.supersedes(&current) && current != *app,
                None => true,
            };
            if written {
                table
                    .insert(app.name.as_str(), bytes.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(name = %app.name, height = app.height, written, "global app upsert");
        Ok(written)
    }

    /// Delete the projection row for a name. Returns true if it existed.
    pub fn delete_global_app(&self, name: &str) -> StateResult<bool> {
        self.delete_json(GLOBAL_APPS, name)
    }

    /// Drop the whole projection. Returns number deleted.
    pub fn clear_global_apps(&self) -> StateResult<usize> {
        let removed: Vec<GlobalApp> = self.delete_json_where(GLOBAL_APPS, |_: &GlobalApp| true)?;
        Ok(removed.len())
    }

    /// Delete every projection row anchored below `height`. Returns the
    /// removed rows.
    pub fn delete_global_apps_below(&self, height: u64) -> StateResult<Vec<GlobalApp>> {
        self.delete_json_where(GLOBAL_APPS, |app: &GlobalApp| app.height < height)
    }

    // ── Chain hashes ───────────────────────────────────────────────

    /// Record an observed payment for a message hash.
    pub fn put_chain_hash(&self, record: &ChainHash) -> StateResult<()> {
        self.put_json(CHAIN_HASHES, &record.hash, record)
    }

    pub fn get_chain_hash(&self, hash: &str) -> StateResult<Option<ChainHash>> {
        self.get_json(CHAIN_HASHES, hash)
    }

    /// Payments whose message has not been found yet.
    pub fn list_unresolved_chain_hashes(&self) -> StateResult<Vec<ChainHash>> {
        Ok(self
            .list_json::<ChainHash>(CHAIN_HASHES)?
            .into_iter()
            .filter(|h| !h.message_found)
            .collect())
    }

    /// Flag a payment's message as found. Returns false if the hash is unknown.
    pub fn mark_chain_hash_found(&self, hash: &str) -> StateResult<bool> {
        match self.get_chain_hash(hash)? {
            Some(mut record) => {
                record.message_found = true;
                self.put_chain_hash(&record)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ── Locations ──────────────────────────────────────────────────

    /// Store a presence record unless an equal-or-newer one exists for the
    /// same `(name, ip)`. Returns true if written.
    pub fn upsert_location_if_newer(&self, record: &LocationRecord) -> StateResult<bool> {
        let key = record.table_key();
        let bytes = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let written;
        {
            let mut table = txn.open_table(LOCATIONS).map_err(map_err!(Table))?;
            let existing: Option<LocationRecord> = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            written = existing.is_none_or(|current| current.broadcasted_at < record.broadcasted_at);
            if written {
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(written)
    }

    /// Unexpired presence records for an application.
    pub fn list_locations(&self, name: &str, now_ms: u64) -> StateResult<Vec<LocationRecord>> {
        let prefix = format!("{name}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(LOCATIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(prefix.as_str()..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let record: LocationRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if !record.is_expired(now_ms) {
                results.push(record);
            }
        }
        Ok(results)
    }

    /// Every stored presence record, expired or not.
    pub fn list_all_locations(&self) -> StateResult<Vec<LocationRecord>> {
        self.list_json(LOCATIONS)
    }

    /// Delete the presence record of one node for one application.
    pub fn delete_location(&self, name: &str, ip: &str) -> StateResult<bool> {
        self.delete_json(LOCATIONS, &location_key(name, ip))
    }

    /// Drop expired presence records. Returns number deleted.
    pub fn purge_expired_locations(&self, now_ms: u64) -> StateResult<usize> {
        let removed: Vec<LocationRecord> =
            self.delete_json_where(LOCATIONS, |r: &LocationRecord| r.is_expired(now_ms))?;
        Ok(removed.len())
    }

    // ── Installed applications ─────────────────────────────────────

    /// Insert or replace the local install record for an application.
    pub fn put_installed(&self, app: &InstalledApp) -> StateResult<()> {
        self.put_json(INSTALLED_APPS, &app.name, app)?;
        debug!(name = %app.name, "installed app recorded");
        Ok(())
    }

    pub fn get_installed(&self, name: &str) -> StateResult<Option<InstalledApp>> {
        self.get_json(INSTALLED_APPS, name)
    }

    pub fn list_installed(&self) -> StateResult<Vec<InstalledApp>> {
        self.list_json(INSTALLED_APPS)
    }

    /// Delete the local install record. Returns true if it existed.
    pub fn delete_installed(&self, name: &str) -> StateResult<bool> {
        let existed = self.delete_json(INSTALLED_APPS, name)?;
        debug!(%name, existed, "installed app record deleted");
        Ok(existed)
    }

    // ── Meta ───────────────────────────────────────────────────────

    fn get_meta(&self, key: &str) -> StateResult<Option<u64>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(META).map_err(map_err!(Table))?;
        Ok(table
            .get(key)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value()))
    }

    /// Height up to which the chain indexer has processed blocks.
    pub fn scanned_height(&self) -> StateResult<Option<u64>> {
        self.get_meta(META_SCANNED_HEIGHT)
    }

    pub fn set_scanned_height(&self, height: u64) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(META).map_err(map_err!(Table))?;
            table
                .insert(META_SCANNED_HEIGHT, height)
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Specifications anchored below this height have expired.
    pub fn expiry_floor(&self) -> StateResult<u64> {
        Ok(self.get_meta(META_EXPIRY_FLOOR)?.unwrap_or(0))
    }

    /// Raise the expiry floor to `height`. Never lowers it. Returns the
    /// floor now in effect.
    pub fn raise_expiry_floor(&self, height: u64) -> StateResult<u64> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let floor;
        {
            let mut table = txn.open_table(META).map_err(map_err!(Table))?;
            let current = table
                .get(META_EXPIRY_FLOOR)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value())
                .unwrap_or(0);
            floor = current.max(height);
            if floor != current {
                table
                    .insert(META_EXPIRY_FLOOR, floor)
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::types::*;

    fn test_spec(name: &str) -> AppSpecification {
        AppSpecification {
            version: SPEC_VERSION,
            name: name.to_string(),
            description: "test".to_string(),
            repotag: "acme/web:1.0".to_string(),
            owner: "ab".repeat(32),
            port: 31001,
            container_port: 80,
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

    fn test_message(name: &str, hash: &str) -> SpecificationMessage {
        SpecificationMessage {
            kind: MessageType::Register,
            version: 1,
            specification: test_spec(name),
            timestamp: 1000,
            signature: "sig".to_string(),
            hash: hash.to_string(),
        }
    }

    fn test_permanent(name: &str, hash: &str, height: u64) -> PermanentMessage {
        PermanentMessage {
            message: test_message(name, hash),
            txid: format!("tx-{hash}"),
            height,
            value_sat: 100,
        }
    }

    fn test_location(name: &str, ip: &str, broadcasted_at: u64) -> LocationRecord {
        LocationRecord {
            name: name.to_string(),
            hash: "h".to_string(),
            ip: ip.to_string(),
            broadcasted_at,
            expire_at: broadcasted_at + 65 * 60 * 1000,
        }
    }

    // ── Temporary messages ─────────────────────────────────────────

    #[test]
    fn temporary_put_is_first_writer_wins() {
        let store = StateStore::open_in_memory().unwrap();
        let temp = TemporaryMessage {
            message: test_message("web", "h1"),
            received_at: 10,
            expire_at: 100,
        };

        assert!(store.put_temporary(&temp).unwrap());
        assert!(!store.put_temporary(&temp).unwrap());
        assert_eq!(store.list_temporary().unwrap().len(), 1);
        assert_eq!(store.get_temporary("h1").unwrap(), Some(temp));
    }

    #[test]
    fn temporary_purge_respects_ttl() {
        let store = StateStore::open_in_memory().unwrap();
        for (hash, expire_at) in [("a", 50), ("b", 150)] {
            store
                .put_temporary(&TemporaryMessage {
                    message: test_message("web", hash),
                    received_at: 0,
                    expire_at,
                })
                .unwrap();
        }

        assert_eq!(store.purge_expired_temporary(100).unwrap(), 1);
        assert!(store.get_temporary("a").unwrap().is_none());
        assert!(store.get_temporary("b").unwrap().is_some());
    }

    // ── Permanent messages ─────────────────────────────────────────

    #[test]
    fn permanent_lookup_by_hash_and_dedup() {
        let store = StateStore::open_in_memory().unwrap();
        let p = test_permanent("web", "h1", 1000);

        assert!(store.put_permanent(&p).unwrap());
        assert!(!store.put_permanent(&p).unwrap());
        assert_eq!(store.get_permanent("h1").unwrap(), Some(p));
        assert!(store.get_permanent("nope").unwrap().is_none());
    }

    #[test]
    fn permanent_range_is_height_ordered() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_permanent(&test_permanent("c", "h3", 1050)).unwrap();
        store.put_permanent(&test_permanent("a", "h1", 900)).unwrap();
        store.put_permanent(&test_permanent("b", "h2", 1000)).unwrap();

        let heights: Vec<u64> = store
            .list_permanent_from(950)
            .unwrap()
            .iter()
            .map(|p| p.height)
            .collect();
        assert_eq!(heights, vec![1000, 1050]);
        assert_eq!(store.list_permanent_from(0).unwrap().len(), 3);
        assert_eq!(store.list_permanent_for_name("a").unwrap().len(), 1);
    }

    // ── Projection ─────────────────────────────────────────────────

    #[test]
    fn global_app_last_writer_wins_by_height() {
        let store = StateStore::open_in_memory().unwrap();
        let old = GlobalApp::from_permanent(&test_permanent("web", "h1", 1000));
        let new = GlobalApp::from_permanent(&test_permanent("web", "h2", 1050));

        assert!(store.upsert_global_app_if_newer(&new).unwrap());
        assert!(!store.upsert_global_app_if_newer(&old).unwrap());
        assert!(!store.upsert_global_app_if_newer(&new).unwrap());
        assert_eq!(store.get_global_app("web").unwrap().unwrap().height, 1050);
    }

    #[test]
    fn global_apps_below_height_are_removed() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_global_app(&GlobalApp::from_permanent(&test_permanent("old", "h1", 7999)))
            .unwrap();
        store
            .put_global_app(&GlobalApp::from_permanent(&test_permanent("edge", "h2", 8000)))
            .unwrap();

        let removed = store.delete_global_apps_below(8000).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].name, "old");
        assert_eq!(store.list_global_apps().unwrap().len(), 1);
        assert_eq!(store.clear_global_apps().unwrap(), 1);
        assert!(store.list_global_apps().unwrap().is_empty());
    }

    // ── Chain hashes ───────────────────────────────────────────────

    #[test]
    fn chain_hash_resolution() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_chain_hash(&ChainHash {
                hash: "h1".to_string(),
                txid: "t1".to_string(),
                height: 10,
                value_sat: 5,
                message_found: false,
            })
            .unwrap();

        assert_eq!(store.list_unresolved_chain_hashes().unwrap().len(), 1);
        assert!(store.mark_chain_hash_found("h1").unwrap());
        assert!(!store.mark_chain_hash_found("h2").unwrap());
        assert!(store.list_unresolved_chain_hashes().unwrap().is_empty());
    }

    // ── Locations ──────────────────────────────────────────────────

    #[test]
    fn location_upsert_ignores_stale_and_equal() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.upsert_location_if_newer(&test_location("web", "1.1.1.1", 100)).unwrap());
        assert!(!store.upsert_location_if_newer(&test_location("web", "1.1.1.1", 100)).unwrap());
        assert!(!store.upsert_location_if_newer(&test_location("web", "1.1.1.1", 50)).unwrap());
        assert!(store.upsert_location_if_newer(&test_location("web", "1.1.1.1", 200)).unwrap());

        let records = store.list_locations("web", 0).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].broadcasted_at, 200);
    }

    #[test]
    fn location_listing_is_per_name_and_skips_expired() {
        let store = StateStore::open_in_memory().unwrap();
        store.upsert_location_if_newer(&test_location("web", "1.1.1.1", 100)).unwrap();
        store.upsert_location_if_newer(&test_location("web", "2.2.2.2", 100_000_000)).unwrap();
        store.upsert_location_if_newer(&test_location("webx", "3.3.3.3", 100)).unwrap();

        let now = 100 + 65 * 60 * 1000;
        let live = store.list_locations("web", now).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].ip, "2.2.2.2");

        assert_eq!(store.purge_expired_locations(now).unwrap(), 2);
        assert_eq!(store.list_all_locations().unwrap().len(), 1);
        assert!(store.delete_location("web", "2.2.2.2").unwrap());
    }

    // ── Installed apps ─────────────────────────────────────────────

    #[test]
    fn installed_crud() {
        let store = StateStore::open_in_memory().unwrap();
        let app = InstalledApp {
            name: "web".to_string(),
            hash: "h1".to_string(),
            height: 1000,
            specification: test_spec("web"),
            installed_at: 5,
        };

        store.put_installed(&app).unwrap();
        assert_eq!(store.get_installed("web").unwrap(), Some(app));
        assert_eq!(store.list_installed().unwrap().len(), 1);
        assert!(store.delete_installed("web").unwrap());
        assert!(!store.delete_installed("web").unwrap());
    }

    // ── Meta ───────────────────────────────────────────────────────

    #[test]
    fn scanned_height_round_trip() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.scanned_height().unwrap(), None);
        store.set_scanned_height(1234).unwrap();
        assert_eq!(store.scanned_height().unwrap(), Some(1234));
    }

    #[test]
    fn expiry_floor_only_rises() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.expiry_floor().unwrap(), 0);
        assert_eq!(store.raise_expiry_floor(8000).unwrap(), 8000);
        assert_eq!(store.raise_expiry_floor(5000).unwrap(), 8000);
        assert_eq!(store.expiry_floor().unwrap(), 8000);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_permanent(&test_permanent("web", "h1", 1000)).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let permanent = store.get_permanent("h1").unwrap();
        assert!(permanent.is_some());
        assert_eq!(permanent.unwrap().height, 1000);
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_global_apps().unwrap().is_empty());
        assert!(store.list_installed().unwrap().is_empty());
        assert!(store.list_locations("any", 0).unwrap().is_empty());
        assert!(store.list_permanent_from(0).unwrap().is_empty());
        assert!(!store.delete_global_app("nope").unwrap());
        assert!(!store.delete_location("nope", "1.1.1.1").unwrap());
    }
}
