//! Fuzzy LRU Cache
//!
//! A bounded cache that can answer "give me the value *near* this key"
//! instead of only exact hits. The index uses two of these: instants keyed
//! by time and transfer summaries keyed by id.
//!
//! ## Why fuzzy?
//!
//! Producing an exact instant means a checkpoint lookup plus a bounded
//! replay of the log. An interactive consumer scrubbing through time does
//! not care whether it gets the state at tick 1,000,000 or 1,000,400 - it
//! cares about answering *now*. A fuzzy lookup lets a nearby, already
//! computed value stand in for the exact one:
//!
//! ```text
//! get(1_000_000, tolerance = 500)
//!         ↓
//! cached nearby? ──YES (1_000_400, distance 400)──→ return it, no replay
//!         │
//!         NO
//!         ↓
//! generate(1_000_000)   (checkpoint + replay)
//!         ↓
//! insert + return
//! ```
//!
//! With `tolerance = 0` the cache degenerates to an ordinary generating LRU
//! cache: exact hit or generate.
//!
//! ## Determinism
//!
//! The distance metric is the absolute difference of the keys' integer
//! values. When two cached keys are equidistant from the request, the lower
//! key wins. (The tie rule matters: "nearest" must not depend on hash or
//! insertion order.)
//!
//! ## Eviction and concurrency
//!
//! Capacity-bounded with least-recently-used eviction (`lru` crate), plus a
//! `BTreeMap` side index so nearest-key lookups are range queries instead of
//! scans. Lookups and inserts take one short mutex; generation runs outside
//! it, so concurrent callers may occasionally generate the same value twice
//! - harmless, since cached values are immutable.
//!
//! `prefetch` speculatively generates in a background task; `quiesce` aborts
//! whatever speculative work is still in flight. Quiescing never affects
//! correctness, only effort.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use lru::LruCache;
use tokio::task::JoinHandle;

use crate::error::Result;

/// Key types usable for fuzzy lookups.
pub trait FuzzyKey: Copy + Ord + Eq + std::hash::Hash + Send + Sync + 'static {
    /// Absolute distance between two keys.
    fn distance(&self, other: &Self) -> u64;
}

impl FuzzyKey for i64 {
    fn distance(&self, other: &Self) -> u64 {
        self.abs_diff(*other)
    }
}

impl FuzzyKey for u64 {
    fn distance(&self, other: &Self) -> u64 {
        self.abs_diff(*other)
    }
}

/// On-demand value production for cache misses.
#[async_trait]
pub trait Generate<K, V>: Send + Sync {
    async fn generate(&self, key: K) -> Result<V>;
}

struct Inner<K: FuzzyKey, V> {
    lru: LruCache<K, V>,
    by_key: BTreeMap<K, V>,
}

/// A bounded LRU cache with nearest-key lookups and a pluggable generator.
pub struct FuzzyCache<K: FuzzyKey, V> {
    inner: Mutex<Inner<K, V>>,
    source: Arc<dyn Generate<K, V>>,
    prefetches: Mutex<Vec<JoinHandle<()>>>,
}

impl<K: FuzzyKey, V: Clone + Send + Sync + 'static> FuzzyCache<K, V> {
    pub fn new(capacity: usize, source: Arc<dyn Generate<K, V>>) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: Mutex::new(Inner {
                lru: LruCache::new(capacity),
                by_key: BTreeMap::new(),
            }),
            source,
            prefetches: Mutex::new(Vec::new()),
        }
    }

    /// Look up `key`, generating the value on a miss.
    ///
    /// With `tolerance == 0` only an exact match is a hit. Otherwise the
    /// nearest cached entry within `tolerance` is returned without invoking
    /// the generator.
    pub async fn get(&self, key: K, tolerance: u64) -> Result<V> {
        if let Some(v) = self.lookup(key, tolerance) {
            return Ok(v);
        }
        let value = self.source.generate(key).await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    /// Look up `key` without generating. Marks a hit as recently used.
    pub fn lookup(&self, key: K, tolerance: u64) -> Option<V> {
        let mut inner = self.inner.lock().unwrap();

        if tolerance == 0 {
            return inner.lru.get(&key).cloned();
        }

        // Nearest candidate on each side of the key; the exact key shows up
        // as the "below" candidate with distance 0.
        let below = inner
            .by_key
            .range(..=key)
            .next_back()
            .map(|(&k, _)| k);
        let above = inner.by_key.range(key..).next().map(|(&k, _)| k);

        let best = match (below, above) {
            (Some(b), Some(a)) => {
                // Lower key wins ties.
                if key.distance(&b) <= key.distance(&a) {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (Some(b), None) => Some(b),
            (None, Some(a)) => Some(a),
            (None, None) => None,
        }?;

        if key.distance(&best) > tolerance {
            return None;
        }
        inner.lru.get(&best).cloned()
    }

    /// Insert a value produced elsewhere. Atomic with respect to concurrent
    /// lookups: an observer sees either no entry or the whole value.
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock().unwrap();
        if let Some((evicted, _)) = inner.lru.push(key, value.clone()) {
            // push returns the displaced entry: either the LRU victim, or
            // the old value under this same key.
            if evicted != key {
                inner.by_key.remove(&evicted);
            }
        }
        inner.by_key.insert(key, value);
    }

    /// Speculatively generate and cache `key` in the background.
    pub fn prefetch(self: &Arc<Self>, key: K) {
        if self.lookup(key, 0).is_some() {
            return;
        }
        let cache = Arc::clone(self);
        let handle = tokio::spawn(async move {
            if let Ok(value) = cache.source.generate(key).await {
                cache.insert(key, value);
            }
        });
        let mut prefetches = self.prefetches.lock().unwrap();
        prefetches.retain(|h| !h.is_finished());
        prefetches.push(handle);
    }

    /// Abort outstanding speculative generation. Does not block and never
    /// discards already cached values.
    pub fn quiesce(&self) {
        let mut prefetches = self.prefetches.lock().unwrap();
        for handle in prefetches.drain(..) {
            handle.abort();
        }
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.lru.clear();
        inner.by_key.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Generator that returns its key and counts invocations.
    struct Echo {
        calls: AtomicUsize,
    }

    impl Echo {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Generate<i64, i64> for Echo {
        async fn generate(&self, key: i64) -> Result<i64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(key)
        }
    }

    #[tokio::test]
    async fn test_exact_get_generates_once() {
        let source = Echo::new();
        let cache = FuzzyCache::new(16, source.clone() as Arc<dyn Generate<i64, i64>>);

        assert_eq!(cache.get(42, 0).await.unwrap(), 42);
        assert_eq!(cache.get(42, 0).await.unwrap(), 42);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_fuzzy_hit_avoids_generation() {
        let source = Echo::new();
        let cache = FuzzyCache::new(16, source.clone() as Arc<dyn Generate<i64, i64>>);

        cache.insert(100, 100);
        // Within tolerance: the nearby value stands in.
        assert_eq!(cache.get(104, 10).await.unwrap(), 100);
        assert_eq!(source.calls(), 0);

        // Out of tolerance: generate the exact one.
        assert_eq!(cache.get(200, 10).await.unwrap(), 200);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_fuzzy_prefers_nearest() {
        let source = Echo::new();
        let cache = FuzzyCache::new(16, source.clone() as Arc<dyn Generate<i64, i64>>);

        cache.insert(100, 100);
        cache.insert(120, 120);
        assert_eq!(cache.get(113, 50).await.unwrap(), 120);
        assert_eq!(cache.get(107, 50).await.unwrap(), 100);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_fuzzy_tie_takes_lower_key() {
        let source = Echo::new();
        let cache = FuzzyCache::new(16, source.clone() as Arc<dyn Generate<i64, i64>>);

        cache.insert(100, 100);
        cache.insert(110, 110);
        // 105 is exactly between: the lower key must win, deterministically.
        assert_eq!(cache.get(105, 50).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_tolerance_zero_demands_exact() {
        let source = Echo::new();
        let cache = FuzzyCache::new(16, source.clone() as Arc<dyn Generate<i64, i64>>);

        cache.insert(100, 100);
        assert_eq!(cache.get(101, 0).await.unwrap(), 101);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_eviction_also_forgets_nearest_index() {
        let source = Echo::new();
        let cache = FuzzyCache::new(2, source.clone() as Arc<dyn Generate<i64, i64>>);

        cache.insert(10, 10);
        cache.insert(20, 20);
        cache.insert(30, 30); // evicts 10

        // The evicted key must not be served by a fuzzy lookup.
        assert_eq!(cache.lookup(11, 5), None);
        assert_eq!(cache.lookup(20, 0), Some(20));
        assert_eq!(cache.lookup(30, 0), Some(30));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_reinsert_same_key_keeps_index() {
        let source = Echo::new();
        let cache = FuzzyCache::new(2, source.clone() as Arc<dyn Generate<i64, i64>>);

        cache.insert(10, 10);
        cache.insert(10, 11);
        assert_eq!(cache.lookup(10, 0), Some(11));
        assert_eq!(cache.lookup(12, 5), Some(11));
    }

    #[tokio::test]
    async fn test_prefetch_and_quiesce() {
        let source = Echo::new();
        let cache = Arc::new(FuzzyCache::new(
            16,
            source.clone() as Arc<dyn Generate<i64, i64>>,
        ));

        cache.prefetch(7);
        // Wait for the speculative task to land.
        for _ in 0..100 {
            if cache.lookup(7, 0).is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        assert_eq!(cache.lookup(7, 0), Some(7));

        // Quiesce must not disturb cached values.
        cache.quiesce();
        assert_eq!(cache.lookup(7, 0), Some(7));
    }

    #[tokio::test]
    async fn test_clear() {
        let source = Echo::new();
        let cache = FuzzyCache::new(16, source.clone() as Arc<dyn Generate<i64, i64>>);
        cache.insert(1, 1);
        cache.insert(2, 2);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.lookup(1, 10), None);
    }
}
