//! Ephemeral key-value store for room lifecycle state
//!
//! The store is the only shared mutable state between concurrent relay
//! handlers for the same room. All capacity arithmetic routes through its
//! atomic increment/decrement primitives so the relay stays correct even
//! when distributed across processes, where a remote store (e.g. Redis)
//! would back this trait instead of [`MemoryStore`].

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Atomic operations over string keys with optional expiry.
///
/// Each operation is individually atomic; no cross-operation locking is
/// assumed or required by the relay.
pub trait RoomCounterStore: Send + Sync {
    /// Check whether a live (non-expired) key exists
    fn exists(&self, key: &str) -> bool;

    /// Atomically increment a counter, creating it at 1 if absent.
    /// Returns the post-increment value.
    fn increment(&self, key: &str) -> i64;

    /// Atomically decrement a counter, creating it at -1 if absent.
    /// Returns the post-decrement value.
    fn decrement(&self, key: &str) -> i64;

    /// Delete keys, returning how many existed
    fn delete(&self, keys: &[&str]) -> usize;

    /// Set a key with a time-to-live in seconds
    fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64);

    /// Get a key's value, if live
    fn get(&self, key: &str) -> Option<String>;
}

/// One stored entry with an optional expiry deadline
struct Entry {
    value: String,
    deadline: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// In-process store backed by a sharded concurrent map.
///
/// Expiry is lazy: expired entries are treated as absent and dropped on the
/// next access. Counter updates go through the map's entry API, which locks
/// a single shard for the duration of the update, making each increment and
/// decrement atomic per key.
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of live keys (for monitoring)
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update_counter(&self, key: &str, delta: i64) -> i64 {
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: "0".into(),
            deadline: None,
        });

        if entry.expired() {
            entry.value = "0".into();
            entry.deadline = None;
        }

        let current: i64 = entry.value.parse().unwrap_or(0);
        let next = current + delta;
        entry.value = next.to_string();
        next
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomCounterStore for MemoryStore {
    fn exists(&self, key: &str) -> bool {
        // Read guard must be released before the removal below can take the
        // shard's write lock
        let live = match self.entries.get(key) {
            Some(entry) => !entry.expired(),
            None => return false,
        };
        if !live {
            self.entries.remove(key);
        }
        live
    }

    fn increment(&self, key: &str) -> i64 {
        self.update_counter(key, 1)
    }

    fn decrement(&self, key: &str) -> i64 {
        self.update_counter(key, -1)
    }

    fn delete(&self, keys: &[&str]) -> usize {
        keys.iter()
            .filter(|k| self.entries.remove(**k).is_some())
            .count()
    }

    fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                deadline: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
    }

    fn get(&self, key: &str) -> Option<String> {
        match self.entries.get(key) {
            Some(entry) if !entry.expired() => Some(entry.value.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_exists() {
        let store = MemoryStore::new();

        store.set_with_ttl("room:abc", "1", 60);
        assert!(store.exists("room:abc"));
        assert_eq!(store.get("room:abc"), Some("1".into()));
        assert!(!store.exists("room:xyz"));
        assert_eq!(store.get("room:xyz"), None);
    }

    #[test]
    fn test_increment_decrement() {
        let store = MemoryStore::new();

        assert_eq!(store.increment("c"), 1);
        assert_eq!(store.increment("c"), 2);
        assert_eq!(store.decrement("c"), 1);
        assert_eq!(store.decrement("c"), 0);
    }

    #[test]
    fn test_increment_preserves_seeded_value() {
        let store = MemoryStore::new();

        store.set_with_ttl("c", "0", 60);
        assert_eq!(store.increment("c"), 1);
        assert_eq!(store.get("c"), Some("1".into()));
    }

    #[test]
    fn test_delete() {
        let store = MemoryStore::new();

        store.set_with_ttl("a", "1", 60);
        store.set_with_ttl("b", "2", 60);

        assert_eq!(store.delete(&["a", "b", "missing"]), 2);
        assert!(!store.exists("a"));
        assert!(!store.exists("b"));
    }

    #[test]
    fn test_expired_key_is_absent() {
        let store = MemoryStore::new();

        store.set_with_ttl("gone", "1", 0);
        assert!(!store.exists("gone"));
        assert_eq!(store.get("gone"), None);
    }

    #[test]
    fn test_increment_revives_expired_counter() {
        let store = MemoryStore::new();

        store.set_with_ttl("c", "7", 0);
        // Expired counter restarts from zero
        assert_eq!(store.increment("c"), 1);
    }

    #[test]
    fn test_concurrent_increments_are_atomic() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    store.increment("c");
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.get("c"), Some("8000".into()));
    }
}
