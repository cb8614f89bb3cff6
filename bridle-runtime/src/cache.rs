//! Process-wide memoization of compiled automata.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bridle_core::Result;
use dashmap::DashMap;
use tracing::debug;

/// Identity of a compiled automaton: which vocabulary, which pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub vocabulary_hash: String,
    pub pattern: String,
}

impl CacheKey {
    pub fn new(vocabulary_hash: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            vocabulary_hash: vocabulary_hash.into(),
            pattern: pattern.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// One key's slot. Holding its lock while compiling makes concurrent
/// callers for the same key wait for that compilation instead of
/// starting their own.
type Slot<A> = Arc<Mutex<Option<Arc<A>>>>;

pub struct AutomatonCache<A> {
    slots: DashMap<CacheKey, Slot<A>>,
    /// Filled keys in insertion order, for eviction.
    order: Mutex<VecDeque<CacheKey>>,
    max_entries: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<A> AutomatonCache<A> {
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            slots: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            max_entries: max_entries.filter(|&n| n > 0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached automaton for `key`, without compiling. Waits if another
    /// caller is compiling the same key.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<A>> {
        let slot = self.slots.get(key).map(|slot| Arc::clone(&slot))?;
        let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(Arc::clone)
    }

    /// Return the automaton for `key`, running `init` at most once per key
    /// while the entry stays cached. Failures are returned to the caller
    /// and leave the key uncached.
    pub fn get_or_try_insert_with<F>(&self, key: &CacheKey, init: F) -> Result<Arc<A>>
    where
        F: FnOnce() -> Result<A>,
    {
        let slot = Arc::clone(
            &self
                .slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(None))),
        );

        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(automaton) = guard.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(pattern_len = key.pattern.len(), "Automaton cache hit");
            return Ok(Arc::clone(automaton));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        match init() {
            Ok(automaton) => {
                let automaton = Arc::new(automaton);
                *guard = Some(Arc::clone(&automaton));
                drop(guard);
                self.record_insert(key);
                Ok(automaton)
            }
            Err(e) => {
                drop(guard);
                self.slots.remove_if(key, |_, current| {
                    Arc::ptr_eq(current, &slot)
                        && current.try_lock().map(|g| g.is_none()).unwrap_or(false)
                });
                Err(e)
            }
        }
    }

    fn record_insert(&self, key: &CacheKey) {
        let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        order.push_back(key.clone());
        if let Some(max) = self.max_entries {
            while order.len() > max {
                if let Some(evicted) = order.pop_front() {
                    self.slots.remove(&evicted);
                }
            }
        }
    }

    /// Number of compiled automata held.
    pub fn len(&self) -> usize {
        self.order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridle_core::BridleError;

    fn key(pattern: &str) -> CacheKey {
        CacheKey::new("vocab", pattern)
    }

    #[test]
    fn test_second_lookup_is_a_hit() {
        let cache = AutomatonCache::new(None);
        let first = cache.get_or_try_insert_with(&key("a"), || Ok(1u32)).unwrap();
        let second = cache
            .get_or_try_insert_with(&key("a"), || panic!("must not recompile"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache: AutomatonCache<u32> = AutomatonCache::new(None);
        let err = cache.get_or_try_insert_with(&key("a"), || {
            Err(BridleError::Compile("boom".into()))
        });
        assert!(err.is_err());
        assert!(cache.get(&key("a")).is_none());
        assert!(cache.is_empty());

        let ok = cache.get_or_try_insert_with(&key("a"), || Ok(7)).unwrap();
        assert_eq!(*ok, 7);
    }

    #[test]
    fn test_fifo_eviction() {
        let cache = AutomatonCache::new(Some(2));
        for (i, p) in ["a", "b", "c"].iter().enumerate() {
            cache.get_or_try_insert_with(&key(p), || Ok(i)).unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("a")).is_none());
        assert_eq!(cache.get(&key("c")).map(|v| *v), Some(2));
    }

    #[test]
    fn test_keys_distinguish_vocabularies() {
        let cache = AutomatonCache::new(None);
        cache
            .get_or_try_insert_with(&CacheKey::new("v1", "a"), || Ok(1))
            .unwrap();
        let other = cache
            .get_or_try_insert_with(&CacheKey::new("v2", "a"), || Ok(2))
            .unwrap();
        assert_eq!(*other, 2);
        assert_eq!(cache.stats().misses, 2);
    }
}
