// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 The neonlink-core Authors

//! Keyed, TTL-bounded, single-flight memoization (§4.2).
//!
//! At most one concurrent evaluation of the factory runs per key: the
//! per-key lock is held across the `await`, so a second caller racing on
//! the same key blocks on the lock rather than re-running the factory, and
//! observes exactly the value (or error) the first caller produced.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;

struct Slot<V> {
    entry: Mutex<Option<(V, Instant)>>,
}

/// A single-value-type cache, one instance per call site that needs one
/// (e.g. `get_status`'s host inventory, or a slow command handler's
/// result), rather than a single process-global `dyn Any` store.
pub struct Cache<V: Clone + Send + 'static> {
    slots: DashMap<String, std::sync::Arc<Slot<V>>>,
}

impl<V: Clone + Send + 'static> Default for Cache<V> {
    fn default() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }
}

impl<V: Clone + Send + 'static> Cache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key` if unexpired, otherwise invoke
    /// `factory` exactly once (across all concurrent callers) and cache the
    /// result for `ttl`. A factory error is propagated to every waiter but
    /// never stored.
    pub async fn get_or_insert_with<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        factory: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| {
                std::sync::Arc::new(Slot {
                    entry: Mutex::new(None),
                })
            })
            .clone();

        let mut guard = slot.entry.lock().await;
        if let Some((value, expires_at)) = guard.as_ref() {
            if *expires_at > Instant::now() {
                return Ok(value.clone());
            }
        }

        let value = factory().await?;
        *guard = Some((value.clone(), Instant::now() + ttl));
        Ok(value)
    }

    /// Drop a cached value so the next `get_or_insert_with` recomputes it.
    pub fn invalidate(&self, key: &str) {
        self.slots.remove(key);
    }
}

/// A tiny FIFO-eviction bound cache used where a bare TTL map is enough and
/// no single-flight coordination is needed (e.g. small lookup tables).
pub struct FifoCache<V> {
    capacity: usize,
    order: std::collections::VecDeque<String>,
    entries: HashMap<String, (V, Instant)>,
}

impl<V: Clone> FifoCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: std::collections::VecDeque::with_capacity(capacity),
            entries: HashMap::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, key: String, value: V, ttl: Duration) {
        if !self.entries.contains_key(&key) {
            if self.order.len() >= self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
            self.order.push_back(key.clone());
        }
        self.entries.insert(key, (value, Instant::now() + ttl));
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).and_then(|(value, expires_at)| {
            if *expires_at > Instant::now() {
                Some(value.clone())
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn caches_within_ttl() {
        let cache: Cache<u32> = Cache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let calls = calls.clone();
            let result: Result<u32, ()> = cache
                .get_or_insert_with("k", Duration::from_secs(60), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await;
            assert_eq!(result.unwrap(), 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recomputes_after_ttl_expiry() {
        let cache: Cache<u32> = Cache::new();
        let _: Result<u32, ()> = cache
            .get_or_insert_with("k", Duration::from_millis(1), || async { Ok(1) })
            .await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second: Result<u32, ()> = cache
            .get_or_insert_with("k", Duration::from_millis(1), || async { Ok(2) })
            .await;
        assert_eq!(second.unwrap(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_recompute() {
        let cache: Cache<u32> = Cache::new();
        let _: Result<u32, ()> = cache
            .get_or_insert_with("k", Duration::from_secs(60), || async { Ok(1) })
            .await;
        cache.invalidate("k");
        let second: Result<u32, ()> = cache
            .get_or_insert_with("k", Duration::from_secs(60), || async { Ok(2) })
            .await;
        assert_eq!(second.unwrap(), 2);
    }

    #[tokio::test]
    async fn factory_error_is_not_cached() {
        let cache: Cache<u32> = Cache::new();
        let first: Result<u32, &'static str> = cache
            .get_or_insert_with("k", Duration::from_secs(60), || async { Err("boom") })
            .await;
        assert!(first.is_err());
        let second: Result<u32, &'static str> = cache
            .get_or_insert_with("k", Duration::from_secs(60), || async { Ok(7) })
            .await;
        assert_eq!(second.unwrap(), 7);
    }

    #[test]
    fn fifo_cache_evicts_oldest() {
        let mut cache: FifoCache<u32> = FifoCache::new(2);
        cache.insert("a".into(), 1, Duration::from_secs(60));
        cache.insert("b".into(), 2, Duration::from_secs(60));
        cache.insert("c".into(), 3, Duration::from_secs(60));
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
    }
}
