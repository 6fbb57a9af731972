//! Schema and outcome caches with optional TTL and capacity
//!
//! Both caches are owned by the pipeline instance. Reads take a reader lock,
//! writes are last-writer-wins, and no lock is held across an await point,
//! so a cancelled request can never leave a partial entry behind.
//!
//! Each database carries a generation number that invalidation bumps. A
//! writer reads the generation before its work starts and hands it back on
//! insert; a write whose generation is stale is dropped.

use sha2::{Digest, Sha256};
use sqlgate_catalog::DatabaseIdentity;
use sqlgate_core::{QueryOutcome, SchemaModel, SchemaState};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache entry
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: Arc<V>,

    /// Database the entry belongs to, for invalidation
    database: String,

    /// Database generation the value was computed under
    generation: u64,

    created_at: Instant,

    ttl: Option<Duration>,
}

impl<V> CacheEntry<V> {
    /// Check if this cache entry is still valid
    fn is_valid(&self) -> bool {
        self.ttl.map_or(true, |ttl| self.created_at.elapsed() < ttl)
    }
}

#[derive(Debug)]
struct Slots<V> {
    entries: HashMap<String, CacheEntry<V>>,
    generations: HashMap<String, u64>,
}

impl<V> Slots<V> {
    fn generation(&self, database: &str) -> u64 {
        self.generations.get(database).copied().unwrap_or(0)
    }

    fn is_current(&self, entry: &CacheEntry<V>) -> bool {
        entry.is_valid() && entry.generation == self.generation(&entry.database)
    }
}

/// Keyed store shared by both caches
#[derive(Debug)]
struct TtlStore<V> {
    slots: Arc<RwLock<Slots<V>>>,
    ttl: Option<Duration>,
    capacity: Option<usize>,
}

impl<V> TtlStore<V> {
    fn new(ttl: Option<Duration>, capacity: Option<usize>) -> Self {
        Self {
            slots: Arc::new(RwLock::new(Slots {
                entries: HashMap::new(),
                generations: HashMap::new(),
            })),
            ttl,
            capacity,
        }
    }

    fn generation(&self, database: &DatabaseIdentity) -> u64 {
        self.slots
            .read()
            .map(|slots| slots.generation(&database.path))
            .unwrap_or(0)
    }

    fn get(&self, key: &str) -> Option<Arc<V>> {
        if let Ok(slots) = self.slots.read() {
            match slots.entries.get(key) {
                Some(entry) if slots.is_current(entry) => return Some(Arc::clone(&entry.value)),
                Some(_) => {}
                None => return None,
            }
        }

        // expired or stale
        self.evict(key);
        None
    }

    /// Store `value` unless `database` was invalidated since `generation` was read
    fn insert(&self, key: String, database: &DatabaseIdentity, value: V, generation: u64) -> bool {
        let Ok(mut slots) = self.slots.write() else {
            return false;
        };
        if slots.generation(&database.path) != generation {
            debug!(database = %database, generation, "stale cache write dropped");
            return false;
        }

        let entry = CacheEntry {
            value: Arc::new(value),
            database: database.path.clone(),
            generation,
            created_at: Instant::now(),
            ttl: self.ttl,
        };

        slots.entries.retain(|_, e| e.is_valid());
        if let Some(capacity) = self.capacity {
            while slots.entries.len() >= capacity.max(1) && !slots.entries.contains_key(&key) {
                let oldest = slots
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.created_at)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(oldest) => slots.entries.remove(&oldest),
                    None => break,
                };
            }
        }
        slots.entries.insert(key, entry);
        true
    }

    fn evict(&self, key: &str) {
        if let Ok(mut slots) = self.slots.write() {
            slots.entries.remove(key);
        }
    }

    /// Remove every entry for `database` and bump its generation; returns how many were removed
    fn evict_database(&self, database: &DatabaseIdentity) -> usize {
        if let Ok(mut slots) = self.slots.write() {
            *slots.generations.entry(database.path.clone()).or_insert(0) += 1;
            let before = slots.entries.len();
            slots.entries.retain(|_, e| e.database != database.path);
            before - slots.entries.len()
        } else {
            0
        }
    }

    fn clear(&self) {
        if let Ok(mut slots) = self.slots.write() {
            slots.entries.clear();
        }
    }

    fn len(&self) -> usize {
        self.slots.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    /// (total, valid, expired)
    fn stats(&self) -> (usize, usize, usize) {
        if let Ok(slots) = self.slots.read() {
            let total = slots.entries.len();
            let valid = slots.entries.values().filter(|e| slots.is_current(e)).count();
            (total, valid, total - valid)
        } else {
            (0, 0, 0)
        }
    }
}

/// Introspected schemas per database
///
/// Only available schemas are stored; a failed catalog read is retried on
/// the next request instead of being remembered.
#[derive(Debug)]
pub struct SchemaCache {
    store: TtlStore<SchemaModel>,
}

impl SchemaCache {
    /// Entries live for `ttl`, or for the life of the cache when `None`
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            store: TtlStore::new(ttl, None),
        }
    }

    pub fn get(&self, database: &DatabaseIdentity) -> Option<Arc<SchemaModel>> {
        self.store.get(&database.path)
    }

    /// Current generation of `database`; read it before fetching
    pub fn generation(&self, database: &DatabaseIdentity) -> u64 {
        self.store.generation(database)
    }

    /// Store the state if it is available; `Unavailable` is ignored
    pub fn insert(&self, database: &DatabaseIdentity, state: SchemaState) -> bool {
        self.insert_at(database, state, self.generation(database))
    }

    /// Store the state unless `database` was invalidated after `generation`
    pub fn insert_at(&self, database: &DatabaseIdentity, state: SchemaState, generation: u64) -> bool {
        match state {
            SchemaState::Available(model) => {
                self.store
                    .insert(database.path.clone(), database, model, generation)
            }
            SchemaState::Unavailable { .. } => false,
        }
    }

    pub fn invalidate(&self, database: &DatabaseIdentity) {
        self.store.evict_database(database);
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Pipeline outcomes keyed by (question, database)
#[derive(Debug)]
pub struct QueryOutcomeCache {
    store: TtlStore<QueryOutcome>,
}

impl QueryOutcomeCache {
    pub fn new(ttl: Option<Duration>, max_entries: Option<usize>) -> Self {
        Self {
            store: TtlStore::new(ttl, max_entries),
        }
    }

    /// SHA-256 fingerprint of the question and database identity
    pub fn cache_key(query: &str, database: &DatabaseIdentity) -> String {
        let mut hasher = Sha256::new();
        hasher.update(query.as_bytes());
        hasher.update([0u8]);
        hasher.update(database.path.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, query: &str, database: &DatabaseIdentity) -> Option<Arc<QueryOutcome>> {
        self.store.get(&Self::cache_key(query, database))
    }

    /// Current generation of `database`; read it before computing an outcome
    pub fn generation(&self, database: &DatabaseIdentity) -> u64 {
        self.store.generation(database)
    }

    pub fn insert(&self, query: &str, database: &DatabaseIdentity, outcome: QueryOutcome) {
        self.insert_at(query, database, outcome, self.generation(database));
    }

    /// Store the outcome unless `database` was invalidated after `generation`
    pub fn insert_at(
        &self,
        query: &str,
        database: &DatabaseIdentity,
        outcome: QueryOutcome,
        generation: u64,
    ) -> bool {
        self.store
            .insert(Self::cache_key(query, database), database, outcome, generation)
    }

    /// Drop every outcome computed against `database`
    pub fn invalidate_database(&self, database: &DatabaseIdentity) -> usize {
        self.store.evict_database(database)
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    /// Number of entries (including expired)
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns (total_entries, valid_entries, expired_entries)
    pub fn stats(&self) -> (usize, usize, usize) {
        self.store.stats()
    }
}

impl Default for QueryOutcomeCache {
    /// Unbounded, never expires
    fn default() -> Self {
        Self::new(None, None)
    }
}
