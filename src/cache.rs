//! Result cache mapping normalized address text to resolved coordinates.
//!
//! The cache is an optimization only: a store failure must degrade to a
//! miss or a dropped write, never to an error in the resolving path. The
//! resolver enforces that contract on top of the [`GeocodeCache`] trait.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::resolver::CoordinateResult;

/// Cache key normalization: lighter than the query normalization, just
/// enough to merge trivially different spellings of the same row.
#[must_use]
pub fn cache_key(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Key-value store for resolved coordinates with per-entry expiry.
///
/// Implementations key entries by [`cache_key`] of the raw address. Both
/// operations may fail (a remote store can be unreachable); callers are
/// expected to treat `get` errors as misses and `put` errors as no-ops.
#[async_trait]
pub trait GeocodeCache: Send + Sync {
    /// Look up a previously stored result. Expired entries are absent.
    async fn get(&self, address: &str) -> Result<Option<CoordinateResult>>;

    /// Store a result, replacing any previous entry for the same key.
    async fn put(&self, address: &str, result: CoordinateResult) -> Result<()>;
}

struct CacheEntry {
    result: CoordinateResult,
    stored_at: Instant,
}

/// In-process TTL cache shared by all batch workers.
///
/// Entries are whole-record replacements under a single write lock, so a
/// concurrent reader never observes a partially written record. The key
/// space is per-address, which keeps lock contention low in practice.
pub struct InMemoryGeocodeCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryGeocodeCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        entry.stored_at.elapsed() >= self.ttl
    }
}

#[async_trait]
impl GeocodeCache for InMemoryGeocodeCache {
    async fn get(&self, address: &str) -> Result<Option<CoordinateResult>> {
        let key = cache_key(address);
        let entries = self.entries.read().await;
        match entries.get(&key) {
            Some(entry) if !self.is_expired(entry) => Ok(Some(entry.result)),
            // Expired and missing entries are indistinguishable to callers.
            _ => Ok(None),
        }
    }

    async fn put(&self, address: &str, result: CoordinateResult) -> Result<()> {
        let key = cache_key(address);
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CacheEntry {
                result,
                stored_at: Instant::now(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::GeocodeSource;

    fn located(lat: f64, lng: f64) -> CoordinateResult {
        CoordinateResult::located(lat, lng, GeocodeSource::Primary)
    }

    #[tokio::test]
    async fn put_then_get_returns_stored_result() {
        let cache = InMemoryGeocodeCache::new(Duration::from_secs(60));
        cache
            .put("12 Oak Street", located(1.5, -2.5))
            .await
            .expect("put succeeds");

        let hit = cache.get("12 Oak Street").await.expect("get succeeds");
        assert_eq!(hit, Some(located(1.5, -2.5)));
    }

    #[tokio::test]
    async fn keys_are_trimmed_and_lowercased() {
        let cache = InMemoryGeocodeCache::new(Duration::from_secs(60));
        cache
            .put("  12 Oak Street ", located(1.0, 2.0))
            .await
            .expect("put succeeds");

        let hit = cache.get("12 OAK STREET").await.expect("get succeeds");
        assert_eq!(hit, Some(located(1.0, 2.0)));
    }

    #[tokio::test]
    async fn expired_entry_is_absent() {
        let cache = InMemoryGeocodeCache::new(Duration::ZERO);
        cache
            .put("12 Oak Street", located(1.0, 2.0))
            .await
            .expect("put succeeds");

        let hit = cache.get("12 Oak Street").await.expect("get succeeds");
        assert_eq!(hit, None);
    }

    #[tokio::test]
    async fn failed_results_are_cacheable() {
        let cache = InMemoryGeocodeCache::new(Duration::from_secs(60));
        let failed = CoordinateResult::unlocated(GeocodeSource::Failed);
        cache.put("nowhere", failed).await.expect("put succeeds");

        let hit = cache.get("nowhere").await.expect("get succeeds");
        assert_eq!(hit, Some(failed));
    }
}
