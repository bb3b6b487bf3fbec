//! Memoization of fair-value results keyed by ticker and horizons.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::provider::normalize_ticker;
use crate::FairValueResult;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub ticker: String,
    pub high_growth_period: u32,
    pub stable_growth_period: u32,
}

impl CacheKey {
    pub fn new(ticker: &str, high_growth_period: u32, stable_growth_period: u32) -> Self {
        Self {
            ticker: normalize_ticker(ticker),
            high_growth_period,
            stable_growth_period,
        }
    }
}

/// A cache that runs `compute` at most once per key at a time.
pub trait ResultCache<V: Clone> {
    fn get_or_compute<F>(&self, key: &CacheKey, compute: F) -> FairValueResult<V>
    where
        F: FnOnce() -> FairValueResult<V>;

    fn invalidate(&self, key: &CacheKey);
}

type Slot<V> = Arc<Mutex<Option<V>>>;

/// Per-key slot locking: callers for the same key queue on the slot while
/// one computes; different keys never contend past the map lookup.
/// A failed computation is not stored and its slot is dropped when no other
/// caller is waiting on it.
#[derive(Debug)]
pub struct InMemoryResultCache<V> {
    slots: Mutex<HashMap<CacheKey, Slot<V>>>,
}

impl<V> Default for InMemoryResultCache<V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone> InMemoryResultCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &CacheKey) -> Slot<V> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    /// Number of keys holding a value. Slots are inspected after the map
    /// lock is released, since a computing caller takes its slot first.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot<V>> = {
            let map = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            map.values().cloned().collect()
        };
        slots
            .iter()
            .filter(|s| s.lock().map(|v| v.is_some()).unwrap_or(false))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> ResultCache<V> for InMemoryResultCache<V> {
    fn get_or_compute<F>(&self, key: &CacheKey, compute: F) -> FairValueResult<V>
    where
        F: FnOnce() -> FairValueResult<V>,
    {
        let slot = self.slot(key);
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = guard.as_ref() {
            debug!(ticker = %key.ticker, "valuation cache hit");
            return Ok(hit.clone());
        }
        match compute() {
            Ok(value) => {
                *guard = Some(value.clone());
                Ok(value)
            }
            Err(err) => {
                // Drop the empty slot unless a waiter holds it and will retry there.
                let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
                let unshared = slots
                    .get(key)
                    .is_some_and(|s| Arc::ptr_eq(s, &slot) && Arc::strong_count(s) == 2);
                if unshared {
                    slots.remove(key);
                }
                Err(err)
            }
        }
    }

    /// Clears the value but keeps the slot, so a computation already in
    /// flight for `key` still serializes later callers.
    fn invalidate(&self, key: &CacheKey) {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.get(key).cloned()
        };
        if let Some(slot) = slot {
            *slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        }
    }
}
