use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::{CacheKey, CacheStore, CacheTtls, KeyFamily};

/// Read-through cache with synchronous write-path invalidation
///
/// No negative caching: a loader error is returned as is and nothing is stored.
///
/// Every invalidation bumps a generation shared by all clones. A loaded value is only
/// kept when no invalidation happened between the start of the load and the store, so a
/// load that overlapped a write never leaves pre-write data behind.
#[derive(Clone)]
pub struct ReadThroughCache {
    store: Arc<dyn CacheStore>,
    ttls: CacheTtls,
    generation: Arc<AtomicU64>,
}

impl ReadThroughCache {
    pub fn new(store: Arc<dyn CacheStore>, ttls: CacheTtls) -> Self {
        Self {
            store,
            ttls,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn ttls(&self) -> &CacheTtls {
        &self.ttls
    }

    /// Returns the cached value of `key` or loads, stores and returns it
    ///
    /// # Arguments
    /// * `key` - Cache key; its family decides the TTL
    /// * `load` - Reads the value from the source of truth on a miss
    ///
    /// # Errors
    /// Only errors of `load` are returned; cache failures degrade to a direct load
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &CacheKey, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key_str = key.to_string();

        match self.store.get(&key_str).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    debug!(key = %key_str, "cache hit");
                    return Ok(value);
                }
                Err(err) => warn!(key = %key_str, "discarding unreadable cache entry: {}", err),
            },
            Ok(None) => debug!(key = %key_str, "cache miss"),
            Err(err) => {
                warn!(key = %key_str, "cache unavailable, reading from store: {}", err);
                return load().await;
            }
        }

        let started = self.generation.load(Ordering::SeqCst);
        let value = load().await?;
        self.populate(&key_str, key.family(), &value, started).await;
        Ok(value)
    }

    async fn populate<T: Serialize>(
        &self,
        key_str: &str,
        family: KeyFamily,
        value: &T,
        started: u64,
    ) {
        if self.generation.load(Ordering::SeqCst) != started {
            debug!(key = %key_str, "invalidated during load, not caching");
            return;
        }

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key = %key_str, "failed to serialize cache value: {}", err);
                return;
            }
        };

        let ttl = self.ttls.for_family(family);
        if let Err(err) = self.store.set_ex(key_str, raw, ttl).await {
            warn!(key = %key_str, "failed to populate cache: {}", err);
            return;
        }

        // An invalidation that raced the store may have deleted before we wrote.
        if self.generation.load(Ordering::SeqCst) != started {
            if let Err(err) = self.store.delete(key_str).await {
                warn!(key = %key_str, "failed to drop raced cache entry: {}", err);
            }
        }
    }

    /// Deletes one key; failures are logged and left to the TTL
    pub async fn invalidate(&self, key: &CacheKey) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let key_str = key.to_string();
        match self.store.delete(&key_str).await {
            Ok(removed) => debug!(key = %key_str, removed, "cache key invalidated"),
            Err(err) => warn!(key = %key_str, "skipping cache invalidation: {}", err),
        }
    }

    /// Deletes every key of `family`
    pub async fn invalidate_family(&self, family: KeyFamily) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let prefix = CacheKey::family_prefix(family);
        match self.store.delete_prefix(prefix).await {
            Ok(removed) => debug!(prefix, removed, "cache family invalidated"),
            Err(err) => warn!(prefix, "skipping cache invalidation: {}", err),
        }
    }

    pub async fn invalidate_resource(&self, id: &str) {
        self.invalidate(&CacheKey::resource(id)).await;
    }

    pub async fn invalidate_listings(&self) {
        self.invalidate_family(KeyFamily::Listing).await;
    }

    /// Write-path invalidation: the resource's own key and every listing
    pub async fn invalidate_after_write(&self, id: &str) {
        self.invalidate_resource(id).await;
        self.invalidate_listings().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::outbounds::in_memory_cache::InMemoryCacheStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn cache_with_store() -> (ReadThroughCache, Arc<InMemoryCacheStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(InMemoryCacheStore::new(clock.clone()));
        let cache = ReadThroughCache::new(store.clone(), CacheTtls::default());
        (cache, store, clock)
    }

    #[tokio::test]
    async fn test_second_read_is_served_from_cache() {
        let (cache, store, _clock) = cache_with_store();
        let loads = AtomicUsize::new(0);
        let loads = &loads;
        let key = CacheKey::resource("p1");

        for _ in 0..2 {
            let value: Result<String, ()> = cache
                .get_or_load(&key, || async move {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok("v1".to_string())
                })
                .await;
            assert_eq!(value.unwrap(), "v1");
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(store.contains("resource:p1"));
    }

    #[tokio::test]
    async fn test_expired_entry_is_reloaded() {
        let (cache, _store, clock) = cache_with_store();
        let key = CacheKey::listing(1);

        let first: Result<u32, ()> = cache.get_or_load(&key, || async { Ok(1) }).await;
        assert_eq!(first.unwrap(), 1);

        clock.advance(chrono::Duration::seconds(299));
        let cached: Result<u32, ()> = cache.get_or_load(&key, || async { Ok(2) }).await;
        assert_eq!(cached.unwrap(), 1);

        clock.advance(chrono::Duration::seconds(2));
        let reloaded: Result<u32, ()> = cache.get_or_load(&key, || async { Ok(2) }).await;
        assert_eq!(reloaded.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_loader_errors_are_not_cached() {
        let (cache, store, _clock) = cache_with_store();
        let key = CacheKey::resource("missing");

        let result: Result<String, &str> = cache
            .get_or_load(&key, || async { Err("not found") })
            .await;
        assert_eq!(result.unwrap_err(), "not found");
        assert!(!store.contains("resource:missing"));
    }

    #[tokio::test]
    async fn test_unavailable_cache_falls_back_to_loader() {
        let (cache, store, _clock) = cache_with_store();
        store.set_available(false);

        let value: Result<String, ()> = cache
            .get_or_load(&CacheKey::listing(1), || async { Ok("fresh".to_string()) })
            .await;
        assert_eq!(value.unwrap(), "fresh");

        // Invalidation is skipped without error.
        cache.invalidate_after_write("p1").await;

        store.set_available(true);
        assert!(!store.contains("listing:1"));
    }

    #[tokio::test]
    async fn test_write_invalidation_removes_resource_and_all_listings() {
        let (cache, store, _clock) = cache_with_store();
        for key in ["listing:1", "listing:2", "resource:p1", "resource:p2"] {
            store
                .set_ex(key, "\"x\"".to_string(), Duration::from_secs(60))
                .await
                .unwrap();
        }

        cache.invalidate_after_write("p1").await;

        assert!(!store.contains("listing:1"));
        assert!(!store.contains("listing:2"));
        assert!(!store.contains("resource:p1"));
        assert!(store.contains("resource:p2"));
    }

    #[tokio::test]
    async fn test_load_overlapping_a_write_is_not_cached() {
        let (cache, store, _clock) = cache_with_store();
        let key = CacheKey::listing(1);
        let writer = &cache;

        let stale: Result<String, ()> = cache
            .get_or_load(&key, || async move {
                // A write commits and invalidates while the old page is being read.
                writer.invalidate_after_write("p9").await;
                Ok("old page".to_string())
            })
            .await;

        assert_eq!(stale.unwrap(), "old page");
        assert!(!store.contains("listing:1"));

        let fresh: Result<String, ()> = cache
            .get_or_load(&key, || async { Ok("new page".to_string()) })
            .await;
        assert_eq!(fresh.unwrap(), "new page");
        assert!(store.contains("listing:1"));
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_still_returns_the_load() {
        let store = Arc::new(InMemoryCacheStore::new(Arc::new(ManualClock::default())));
        let ttls = CacheTtls {
            resource: Duration::from_secs(100_000_000_000_000),
            ..CacheTtls::default()
        };
        let cache = ReadThroughCache::new(store.clone(), ttls);

        let value: Result<String, ()> = cache
            .get_or_load(&CacheKey::resource("p1"), || async {
                Ok("fresh".to_string())
            })
            .await;

        assert_eq!(value.unwrap(), "fresh");
        assert!(!store.contains("resource:p1"));
    }
}
