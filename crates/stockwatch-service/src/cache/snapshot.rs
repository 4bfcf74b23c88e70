//! Per-region catalog snapshots in two named cache regions.
//!
//! The `read` region serves interactive catalog queries. The `job` region
//! holds the baseline the diff engine compares against and is written only by
//! it. The regions use distinct key prefixes so they never collide.

use std::sync::Arc;
use std::time::Duration;

use stockwatch_core::config::CacheConfig;
use stockwatch_core::constants::{JOB_CACHE_PREFIX, READ_CACHE_PREFIX};
use stockwatch_core::product::ProductSnapshot;
use stockwatch_core::types::Region;

use super::TtlCache;

#[derive(Clone)]
pub struct SnapshotCache {
    backend: Arc<dyn TtlCache>,
    read_ttl: Duration,
    job_ttl: Duration,
}

impl SnapshotCache {
    #[must_use]
    pub fn new(backend: Arc<dyn TtlCache>, config: &CacheConfig) -> Self {
        Self {
            backend,
            read_ttl: config.read_ttl(),
            job_ttl: config.job_ttl(),
        }
    }

    #[must_use]
    pub fn read_key(region: &Region) -> String {
        format!("{READ_CACHE_PREFIX}{region}")
    }

    #[must_use]
    pub fn job_key(region: &Region) -> String {
        format!("{JOB_CACHE_PREFIX}{region}")
    }

    pub async fn read(&self, region: &Region) -> Option<Vec<ProductSnapshot>> {
        self.load(&Self::read_key(region)).await
    }

    pub async fn store_read(&self, region: &Region, products: &[ProductSnapshot]) {
        self.save(&Self::read_key(region), products, self.read_ttl)
            .await;
    }

    pub async fn baseline(&self, region: &Region) -> Option<Vec<ProductSnapshot>> {
        self.load(&Self::job_key(region)).await
    }

    pub(crate) async fn store_baseline(&self, region: &Region, products: &[ProductSnapshot]) {
        self.save(&Self::job_key(region), products, self.job_ttl)
            .await;
    }

    async fn load(&self, key: &str) -> Option<Vec<ProductSnapshot>> {
        let raw = self.backend.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(products) => Some(products),
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding undecodable cache entry");
                self.backend.delete(key).await;
                None
            }
        }
    }

    async fn save(&self, key: &str, products: &[ProductSnapshot], ttl: Duration) {
        match serde_json::to_string(products) {
            Ok(raw) => self.backend.set(key, raw, ttl).await,
            Err(e) => tracing::warn!(key, error = %e, "Failed to encode snapshot for cache"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn product(sku: &str) -> ProductSnapshot {
        serde_json::from_value(serde_json::json!({ "sku": sku, "name": sku })).unwrap()
    }

    #[test]
    fn regions_use_distinct_namespaces() {
        let region = Region::from("delhi");
        assert_ne!(
            SnapshotCache::read_key(&region),
            SnapshotCache::job_key(&region)
        );
        assert!(SnapshotCache::job_key(&region).ends_with(":delhi"));
    }

    #[test_log::test(tokio::test)]
    async fn read_and_job_regions_are_independent() {
        let cache = SnapshotCache::new(Arc::new(MemoryCache::new()), &CacheConfig::default());
        let region = Region::from("delhi");

        cache.store_read(&region, &[product("A")]).await;
        assert!(cache.baseline(&region).await.is_none());

        cache.store_baseline(&region, &[product("B")]).await;
        let read = cache.read(&region).await.unwrap();
        let job = cache.baseline(&region).await.unwrap();
        assert_eq!(read[0].sku, "A");
        assert_eq!(job[0].sku, "B");
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn read_region_expires_before_job_region() {
        let cache = SnapshotCache::new(Arc::new(MemoryCache::new()), &CacheConfig::default());
        let region = Region::from("delhi");
        cache.store_read(&region, &[product("A")]).await;
        cache.store_baseline(&region, &[product("A")]).await;

        tokio::time::advance(Duration::from_secs(6 * 60)).await;
        assert!(cache.read(&region).await.is_none());
        assert!(cache.baseline(&region).await.is_some());
    }
}
