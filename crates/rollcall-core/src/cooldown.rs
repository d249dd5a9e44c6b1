//! Per-key submission cooldown.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Tracks which keys were recently acquired and refuses re-acquisition
/// until the window elapses. Append/expire only; the single owner
/// mutates it between cycles, never concurrently.
#[derive(Debug)]
pub struct Cooldown<K> {
    window: Duration,
    entries: HashMap<K, Instant>,
}

impl<K: Eq + Hash + Clone> Cooldown<K> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    /// Try to acquire the cooldown slot for `key` at time `now`.
    ///
    /// Returns `false` while a prior acquisition is still inside the
    /// window; otherwise records `now` and returns `true`. Expired
    /// entries are purged as a side effect.
    pub fn try_acquire(&mut self, key: K, now: Instant) -> bool {
        self.purge_expired(now);
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, now);
        true
    }

    /// Drop the slot for `key` immediately (e.g., the submission it was
    /// guarding failed and should be retried next cycle).
    pub fn release(&mut self, key: &K) {
        self.entries.remove(key);
    }

    /// Number of keys currently inside the window as of `now`.
    pub fn active_len(&mut self, now: Instant) -> usize {
        self.purge_expired(now);
        self.entries.len()
    }

    fn purge_expired(&mut self, now: Instant) {
        let window = self.window;
        self.entries
            .retain(|_, acquired| now.duration_since(*acquired) < window);
    }
}
