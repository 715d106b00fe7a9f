//! Memoization of load results.
//!
//! [`LoadCache`] keeps finished tables keyed by every input of a load, so two
//! requests share an entry only when their bytes, options, sheet and engine
//! are all equal. It is bounded both by entry count and by an estimate of the
//! memory its entries hold, evicting the least recently used entry first.

use crate::preview::FileKind;
use crate::preview::LoadError;
use crate::preview::LoadOptions;
use crate::spreadsheet::Engine;
use crate::table::Table;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Bounds of a [`LoadCache`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Most tables kept at once.
    pub max_entries: usize,
    /// Upper bound on upload bytes plus estimated table size over all entries.
    pub max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_entries: 32,
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

/// Every input of a load; compared by content.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    pub(crate) bytes: Arc<[u8]>,
    pub(crate) kind: FileKind,
    pub(crate) options: LoadOptions,
    pub(crate) sheet_name: Option<String>,
    pub(crate) engine: Option<Engine>,
}

struct Entry {
    table: Arc<Table>,
    charge: usize,
    tick: u64,
}

#[derive(Default)]
struct State {
    entries: HashMap<CacheKey, Entry>,
    tick: u64,
    bytes: usize,
}

impl State {
    fn touch(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn evict_until_within(&mut self, config: &CacheConfig) {
        while self.entries.len() > config.max_entries || self.bytes > config.max_bytes {
            let oldest = self.entries
                .iter()
                .min_by_key(|(_, entry)| entry.tick)
                .map(|(key, _)| key.clone());
            let Some(key) = oldest else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.bytes -= entry.charge;
                debug!(size = key.bytes.len(), charge = entry.charge, "evicted cached table");
            }
        }
    }
}

/// Bounded, thread-safe cache of loaded tables.
pub struct LoadCache {
    config: CacheConfig,
    state: Mutex<State>,
}

impl LoadCache {
    pub fn new(config: CacheConfig) -> Self {
        LoadCache {
            config,
            state: Mutex::new(State::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the cached table for `key`, or runs `load` and caches its result.
    ///
    /// The lock is not held while `load` runs, so concurrent misses on one key
    /// may each compute the table; the first stored result wins. Errors are
    /// returned as is and never cached.
    pub(crate) fn get_or_try_insert_with<F>(&self, key: CacheKey, load: F) -> Result<Arc<Table>, LoadError>
    where
        F: FnOnce() -> Result<Table, LoadError>,
    {
        if let Some(table) = self.lookup(&key) {
            debug!(size = key.bytes.len(), "cache hit");
            return Ok(table);
        }

        debug!(size = key.bytes.len(), "cache miss");
        let table = Arc::new(load()?);
        let charge = key.bytes.len() + table.estimated_size();

        let mut state = self.state.lock();
        let tick = state.touch();
        if let Some(entry) = state.entries.get_mut(&key) {
            entry.tick = tick;
            return Ok(Arc::clone(&entry.table));
        }
        if charge > self.config.max_bytes || self.config.max_entries == 0 {
            debug!(charge, "table too large to cache");
            return Ok(table);
        }

        state.bytes += charge;
        state.entries.insert(key, Entry {
            table: Arc::clone(&table),
            charge,
            tick,
        });
        state.evict_until_within(&self.config);
        Ok(table)
    }

    fn lookup(&self, key: &CacheKey) -> Option<Arc<Table>> {
        let mut state = self.state.lock();
        let tick = state.touch();
        let entry = state.entries.get_mut(key)?;
        entry.tick = tick;
        Some(Arc::clone(&entry.table))
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Upload bytes plus estimated table size of every entry.
    pub fn charged_bytes(&self) -> usize {
        self.state.lock().bytes
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.bytes = 0;
    }
}

impl Default for LoadCache {
    fn default() -> Self {
        LoadCache::new(CacheConfig::default())
    }
}

impl std::fmt::Debug for LoadCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LoadCache")
            .field("entries", &state.entries.len())
            .field("bytes", &state.bytes)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
