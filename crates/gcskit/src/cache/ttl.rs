//! Age-bounded key/value cache.

// Mutex::lock().unwrap() only panics on lock poisoning (a prior panic while
// holding the lock). Corrupted cache state should not propagate.
#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Instant;

/// A mapping from key to value where entries expire `max_age` seconds after
/// insertion and the oldest entries are evicted past `max_entries`.
///
/// Two sentinel ages: `0` disables the cache outright (every `get` misses,
/// `put` is a no-op), and [`TtlCache::NEVER_EXPIRE`] pins entries until
/// eviction or an explicit `erase`/`clear`. `max_entries == 0` means
/// unbounded.
pub struct TtlCache<K, V> {
    max_age_secs: u64,
    max_entries: usize,
    state: Mutex<State<K, V>>,
}

struct State<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Insertion order, as `(seq, key)`; stale pairs are skipped on eviction.
    order: VecDeque<(u64, K)>,
    next_seq: u64,
}

struct Entry<V> {
    value: V,
    inserted: Instant,
    seq: u64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Age sentinel for entries that never expire.
    pub const NEVER_EXPIRE: u64 = u64::MAX;

    pub fn new(max_age_secs: u64, max_entries: usize) -> Self {
        Self {
            max_age_secs,
            max_entries,
            state: Mutex::new(State {
                entries: HashMap::new(),
                order: VecDeque::new(),
                next_seq: 0,
            }),
        }
    }

    /// Whether lookups can ever hit.
    pub fn is_enabled(&self) -> bool {
        self.max_age_secs > 0
    }

    pub fn get(&self, key: &K) -> Option<V> {
        if !self.is_enabled() {
            return None;
        }
        let mut state = self.state.lock().unwrap();
        let expired = match state.entries.get(key) {
            None => return None,
            Some(entry) => {
                self.max_age_secs != Self::NEVER_EXPIRE
                    && entry.inserted.elapsed().as_secs() > self.max_age_secs
            }
        };
        if expired {
            state.entries.remove(key);
            return None;
        }
        state.entries.get(key).map(|e| e.value.clone())
    }

    pub fn put(&self, key: K, value: V) {
        if !self.is_enabled() {
            return;
        }
        let mut state = self.state.lock().unwrap();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            key.clone(),
            Entry {
                value,
                inserted: Instant::now(),
                seq,
            },
        );
        state.order.push_back((seq, key));
        if self.max_entries > 0 {
            while state.entries.len() > self.max_entries {
                let Some((old_seq, old_key)) = state.order.pop_front() else {
                    break;
                };
                // Skip queue residue from overwritten or erased entries.
                if state.entries.get(&old_key).map(|e| e.seq) == Some(old_seq) {
                    state.entries.remove(&old_key);
                }
            }
        }
    }

    pub fn erase(&self, key: &K) {
        let mut state = self.state.lock().unwrap();
        state.entries.remove(key);
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.entries.clear();
        state.order.clear();
    }
}
