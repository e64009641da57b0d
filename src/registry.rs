//! Shared `symbol -> providing archives` multimap.
//!
//! Concurrent scans only ever append, and appends commute, so the map is
//! split into independently locked shards keyed by symbol hash.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

const DEFAULT_SHARDS: usize = 16;

type Shard = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug)]
pub struct ProvidesRegistry {
    shards: Vec<RwLock<Shard>>,
}

impl Default for ProvidesRegistry {
    fn default() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }
}

impl ProvidesRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shards(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1)).map(|_| RwLock::default()).collect(),
        }
    }

    fn shard_for(&self, symbol: &str) -> &RwLock<Shard> {
        let mut hasher = DefaultHasher::new();
        symbol.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    // A panicking writer can only have left a completed or skipped insert
    // behind, so poisoned shards stay usable.
    fn read(shard: &RwLock<Shard>) -> RwLockReadGuard<'_, Shard> {
        shard.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(shard: &RwLock<Shard>) -> RwLockWriteGuard<'_, Shard> {
        shard.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records that `archive` provides `symbol`.
    pub fn append(&self, symbol: &str, archive: &str) {
        let mut shard = Self::write(self.shard_for(symbol));
        shard
            .entry(symbol.to_string())
            .or_default()
            .insert(archive.to_string());
    }

    pub fn providers(&self, symbol: &str) -> Option<BTreeSet<String>> {
        Self::read(self.shard_for(symbol)).get(symbol).cloned()
    }

    /// Number of distinct symbols registered.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| Self::read(shard).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| Self::read(shard).is_empty())
    }

    /// Merged, ordered copy of every shard.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut merged = BTreeMap::new();
        for shard in &self.shards {
            for (symbol, archives) in Self::read(shard).iter() {
                merged.insert(symbol.clone(), archives.clone());
            }
        }
        merged
    }
}
