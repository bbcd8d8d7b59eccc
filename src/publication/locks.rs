//! Per-subject exclusion
//!
//! Writers to the same subject are serialized through a mutex looked up by
//! canonical subject id. Entries are dropped again once no writer holds or
//! waits for them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct KeyLocks {
    table: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the lock for `key`.
    pub fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        self.with_locks(&[key], f)
    }

    /// Runs `f` while holding the lock of every key in `keys`. Keys are
    /// taken in sorted order with duplicates removed, so overlapping sets
    /// cannot deadlock.
    pub fn with_locks<T>(&self, keys: &[&str], f: impl FnOnce() -> T) -> T {
        let mut keys = keys.to_vec();
        keys.sort_unstable();
        keys.dedup();

        let entries: Vec<Arc<Mutex<()>>> = {
            let mut table = self.table.lock().unwrap_or_else(|p| p.into_inner());
            keys.iter()
                .map(|key| Arc::clone(table.entry(key.to_string()).or_default()))
                .collect()
        };

        let result = {
            let _guards: Vec<_> = entries
                .iter()
                .map(|entry| entry.lock().unwrap_or_else(|p| p.into_inner()))
                .collect();
            f()
        };

        let mut table = self.table.lock().unwrap_or_else(|p| p.into_inner());
        for (key, entry) in keys.iter().zip(&entries) {
            // One reference in the table, one here: nobody else is waiting
            if Arc::strong_count(entry) == 2 {
                table.remove(*key);
            }
        }
        result
    }

    /// Number of keys currently held or contended.
    pub fn active(&self) -> usize {
        self.table.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}
