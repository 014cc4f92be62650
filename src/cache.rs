use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

/// Default freshness window for gateway responses.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Source of "now" for freshness checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.stored_at) < ttl
    }
}

/// Keyed memoization with a time-to-live.
///
/// The lock is never held while a fetch is running, so two callers missing on
/// the same key at once will both fetch and the later store wins.
pub struct FreshnessCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> FreshnessCache<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the stored value if it is younger than `ttl`.
    pub fn get(&self, key: &str, ttl: Duration) -> Option<V> {
        let now = self.clock.now();
        self.entries()
            .get(key)
            .filter(|entry| entry.is_fresh(now, ttl))
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        let stored_at = self.clock.now();
        self.entries()
            .insert(key.into(), CacheEntry { value, stored_at });
    }

    /// Serves `key` from the cache while fresh, otherwise runs `fetch` and
    /// stores its result. Failed fetches are not stored.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &str, ttl: Duration, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key, ttl) {
            debug!(key, "cache hit");
            return Ok(value);
        }

        debug!(key, "cache miss");
        let value = fetch().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Number of stored entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache_with_clock() -> (FreshnessCache<Vec<u32>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (FreshnessCache::new(clock.clone()), clock)
    }

    async fn counted_fetch(calls: &AtomicUsize, value: u32) -> Result<Vec<u32>, String> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![value])
    }

    #[tokio::test]
    async fn second_call_within_ttl_is_served_from_cache() {
        let (cache, clock) = cache_with_clock();
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_fetch("users", DEFAULT_TTL, || counted_fetch(&calls, 1))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(299));
        let second = cache
            .get_or_fetch("users", DEFAULT_TTL, || counted_fetch(&calls, 2))
            .await
            .unwrap();

        assert_eq!(first, vec![1]);
        assert_eq!(second, vec![1]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_refetched() {
        let (cache, clock) = cache_with_clock();
        let calls = AtomicUsize::new(0);

        cache
            .get_or_fetch("users", DEFAULT_TTL, || counted_fetch(&calls, 1))
            .await
            .unwrap();
        // Exactly at the TTL boundary the entry is already stale
        clock.advance(DEFAULT_TTL);
        let refreshed = cache
            .get_or_fetch("users", DEFAULT_TTL, || counted_fetch(&calls, 2))
            .await
            .unwrap();

        assert_eq!(refreshed, vec![2]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let (cache, _clock) = cache_with_clock();
        let calls = AtomicUsize::new(0);

        cache
            .get_or_fetch("comments:1", DEFAULT_TTL, || counted_fetch(&calls, 1))
            .await
            .unwrap();
        let other = cache
            .get_or_fetch("comments:2", DEFAULT_TTL, || counted_fetch(&calls, 2))
            .await
            .unwrap();

        assert_eq!(other, vec![2]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_stored() {
        let (cache, _clock) = cache_with_clock();
        let calls = AtomicUsize::new(0);

        let failed: Result<Vec<u32>, String> = cache
            .get_or_fetch("users", DEFAULT_TTL, || async { Err::<Vec<u32>, _>("boom".to_string()) })
            .await;
        assert_eq!(failed, Err("boom".to_string()));
        assert!(cache.is_empty());

        let value = cache
            .get_or_fetch("users", DEFAULT_TTL, || counted_fetch(&calls, 7))
            .await
            .unwrap();
        assert_eq!(value, vec![7]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_forces_a_refetch() {
        let (cache, _clock) = cache_with_clock();
        let calls = AtomicUsize::new(0);

        cache
            .get_or_fetch("users", DEFAULT_TTL, || counted_fetch(&calls, 1))
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
        cache
            .get_or_fetch("users", DEFAULT_TTL, || counted_fetch(&calls, 1))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn get_ignores_stale_entries() {
        let (cache, clock) = cache_with_clock();
        cache.insert("users", vec![3]);
        assert_eq!(cache.get("users", DEFAULT_TTL), Some(vec![3]));

        clock.advance(Duration::from_secs(301));
        assert_eq!(cache.get("users", DEFAULT_TTL), None);
        // Stale entries stay stored until overwritten or cleared
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
