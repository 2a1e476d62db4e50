//! In-process key/value store with expiry and a capacity bound
//!
//! Handlers receive a store through router state instead of reaching for a
//! global map. Entries expire `ttl` after their last write; when the store is
//! full the least recently written entry is evicted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

/// Expiry and capacity policy for a [`TtlStore`]
#[derive(Debug, Clone, Copy, Default)]
pub struct StorePolicy {
    /// Entries older than this (since last write) are dropped. `None` keeps
    /// entries until removed or evicted.
    pub ttl: Option<Duration>,
    /// Maximum number of live entries. `None` is unbounded.
    pub max_entries: Option<usize>,
}

struct Entry<V> {
    value: V,
    touched: Instant,
}

/// Cloneable handle to a shared store
pub struct TtlStore<V> {
    name: &'static str,
    policy: StorePolicy,
    entries: Arc<Mutex<HashMap<String, Entry<V>>>>,
}

impl<V> Clone for TtlStore<V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            policy: self.policy,
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<V: Clone> TtlStore<V> {
    pub fn new(name: &'static str, policy: StorePolicy) -> Self {
        Self {
            name,
            policy,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn policy(&self) -> StorePolicy {
        self.policy
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        self.purge_locked(&mut entries);
        entries.get(key).map(|e| e.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace a value, returning the previous one
    pub fn insert(&self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        let mut entries = self.entries.lock();
        self.purge_locked(&mut entries);
        if !entries.contains_key(&key) {
            self.make_room_locked(&mut entries);
        }
        entries
            .insert(
                key,
                Entry {
                    value,
                    touched: Instant::now(),
                },
            )
            .map(|e| e.value)
    }

    /// Read-modify-write a single entry under the store lock.
    ///
    /// `init` supplies the value when the key is absent.
    pub fn upsert<F>(&self, key: &str, init: impl FnOnce() -> V, f: F) -> V
    where
        F: FnOnce(&mut V),
    {
        let mut entries = self.entries.lock();
        self.purge_locked(&mut entries);
        if !entries.contains_key(key) {
            self.make_room_locked(&mut entries);
        }
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: init(),
            touched: Instant::now(),
        });
        f(&mut entry.value);
        entry.touched = Instant::now();
        entry.value.clone()
    }

    /// Modify an existing entry; returns `None` when absent
    pub fn update<F>(&self, key: &str, f: F) -> Option<V>
    where
        F: FnOnce(&mut V),
    {
        let mut entries = self.entries.lock();
        self.purge_locked(&mut entries);
        let entry = entries.get_mut(key)?;
        f(&mut entry.value);
        entry.touched = Instant::now();
        Some(entry.value.clone())
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        self.purge_locked(&mut entries);
        entries.remove(key).map(|e| e.value)
    }

    /// All live entries, in no particular order
    pub fn entries(&self) -> Vec<(String, V)> {
        let mut entries = self.entries.lock();
        self.purge_locked(&mut entries);
        entries
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    pub fn values(&self) -> Vec<V> {
        self.entries().into_iter().map(|(_, v)| v).collect()
    }

    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock();
        self.purge_locked(&mut entries);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries now, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        self.purge_locked(&mut entries)
    }

    fn purge_locked(&self, entries: &mut HashMap<String, Entry<V>>) -> usize {
        let Some(ttl) = self.policy.ttl else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|_, e| e.touched.elapsed() < ttl);
        let removed = before - entries.len();
        if removed > 0 {
            debug!("{} store expired {} entr(ies)", self.name, removed);
        }
        removed
    }

    fn make_room_locked(&self, entries: &mut HashMap<String, Entry<V>>) {
        let Some(max) = self.policy.max_entries else {
            return;
        };
        while entries.len() >= max.max(1) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.touched)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    debug!("{} store full, evicting {}", self.name, key);
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }
}
