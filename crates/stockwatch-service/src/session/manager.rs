//! One authenticated upstream session per region.
//!
//! Sessions are created lazily, reused until they exceed the configured age,
//! and then closed and recreated. Creation happens outside the registry lock,
//! so two callers can race to open a session for the same region; the first
//! one registered wins and the other is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::RwLock;

use stockwatch_core::product::ProductSnapshot;
use stockwatch_core::types::Region;
use stockwatch_core::util::fuzzy::fuzzy_match;

use crate::cache::SnapshotCache;
use crate::error::ServiceResult;
use crate::upstream::{CatalogConnector, CatalogSession};

/// Options for [`RegionSession::fetch_catalog`].
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Skip the read cache and always hit upstream.
    pub bypass_cache: bool,
    /// Fuzzy filter over name, SKU and alias.
    pub search: Option<String>,
}

impl FetchOptions {
    #[must_use]
    pub fn bypass() -> Self {
        Self {
            bypass_cache: true,
            search: None,
        }
    }

    #[must_use]
    pub fn search(pattern: impl Into<String>) -> Self {
        Self {
            bypass_cache: false,
            search: Some(pattern.into()),
        }
    }
}

pub struct RegionSession {
    inner: Arc<dyn CatalogSession>,
    cache: SnapshotCache,
    created_at: DateTime<Utc>,
}

impl std::fmt::Debug for RegionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionSession")
            .field("region", self.region())
            .field("pincode", &self.pincode())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl RegionSession {
    #[must_use]
    pub fn region(&self) -> &Region {
        self.inner.region()
    }

    #[must_use]
    pub fn pincode(&self) -> &str {
        self.inner.pincode()
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: TimeDelta) -> bool {
        now - self.created_at > max_age
    }

    /// ## Summary
    /// Returns the region's catalog, served from the read cache unless
    /// `bypass_cache` is set. A fetched non-empty catalog refreshes the read
    /// cache. An empty upstream answer is returned as-is and never cached.
    /// The search filter is applied last and its result is never cached.
    ///
    /// ## Errors
    /// Returns an error if the upstream request fails.
    #[tracing::instrument(skip(self), fields(region = %self.region()))]
    pub async fn fetch_catalog(&self, options: &FetchOptions) -> ServiceResult<Vec<ProductSnapshot>> {
        let cached = if options.bypass_cache {
            None
        } else {
            self.cache.read(self.region()).await
        };

        let products = if let Some(products) = cached {
            tracing::trace!(count = products.len(), "Serving catalog from read cache");
            products
        } else {
            let fresh = self.inner.fetch_products().await?;
            if fresh.is_empty() {
                tracing::warn!(pincode = self.pincode(), "Upstream returned no products");
                return Ok(fresh);
            }
            self.cache.store_read(self.region(), &fresh).await;
            fresh
        };

        Ok(match options.search.as_deref() {
            Some(pattern) if !pattern.is_empty() => products
                .into_iter()
                .filter(|p| {
                    fuzzy_match(pattern, &p.name)
                        || fuzzy_match(pattern, &p.sku)
                        || fuzzy_match(pattern, &p.alias)
                })
                .collect(),
            _ => products,
        })
    }
}

/// Registry lookup result.
#[derive(Debug)]
pub enum SessionLookup {
    Active(Arc<RegionSession>),
    /// A session existed but was too old; it has been closed.
    Expired,
    Missing,
}

pub struct SessionManager {
    connector: Arc<dyn CatalogConnector>,
    cache: SnapshotCache,
    max_age: TimeDelta,
    sessions: RwLock<HashMap<Region, Arc<RegionSession>>>,
}

impl SessionManager {
    #[must_use]
    pub fn new(connector: Arc<dyn CatalogConnector>, cache: SnapshotCache, max_age_days: i64) -> Self {
        Self::with_max_age(connector, cache, TimeDelta::days(max_age_days))
    }

    #[must_use]
    pub fn with_max_age(
        connector: Arc<dyn CatalogConnector>,
        cache: SnapshotCache,
        max_age: TimeDelta,
    ) -> Self {
        Self {
            connector,
            cache,
            max_age,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn max_age(&self) -> TimeDelta {
        self.max_age
    }

    /// Looks up the region's session, closing it if it has expired.
    pub async fn lookup(&self, region: &Region) -> SessionLookup {
        let existing = self.sessions.read().await.get(region).cloned();
        match existing {
            None => SessionLookup::Missing,
            Some(session) if !session.is_expired(Utc::now(), self.max_age) => {
                SessionLookup::Active(session)
            }
            Some(session) => {
                tracing::info!(
                    %region,
                    created_at = %session.created_at(),
                    "Session exceeded max age, closing"
                );
                self.close_if_same(region, &session).await;
                SessionLookup::Expired
            }
        }
    }

    /// ## Summary
    /// Returns the live session for `region`, creating one from `pincode`
    /// when none exists or the existing one has expired.
    ///
    /// ## Errors
    /// Returns an error if a new session cannot be opened.
    pub async fn get_or_create(
        &self,
        region: &Region,
        pincode: &str,
    ) -> ServiceResult<Arc<RegionSession>> {
        if let SessionLookup::Active(session) = self.lookup(region).await {
            return Ok(session);
        }
        self.connect(pincode).await
    }

    /// ## Summary
    /// Opens a session for `pincode` and registers it under the region the
    /// upstream resolved. If that region already has a live session, the
    /// existing one is kept and returned.
    ///
    /// ## Errors
    /// Returns an error if the upstream session cannot be opened.
    #[tracing::instrument(skip(self))]
    pub async fn connect(&self, pincode: &str) -> ServiceResult<Arc<RegionSession>> {
        let inner = self.connector.connect(pincode).await?;
        let candidate = Arc::new(RegionSession {
            inner,
            cache: self.cache.clone(),
            created_at: Utc::now(),
        });
        Ok(self.register(candidate).await)
    }

    async fn register(&self, candidate: Arc<RegionSession>) -> Arc<RegionSession> {
        let region = candidate.region().clone();
        let mut sessions = self.sessions.write().await;

        let now = Utc::now();
        if let Some(existing) = sessions
            .get(&region)
            .filter(|existing| !existing.is_expired(now, self.max_age))
        {
            tracing::debug!(%region, "Reusing existing session");
            return Arc::clone(existing);
        }

        tracing::info!(%region, pincode = candidate.pincode(), "Registered new session");
        sessions.insert(region, Arc::clone(&candidate));
        candidate
    }

    async fn close_if_same(&self, region: &Region, session: &Arc<RegionSession>) {
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(region)
            .is_some_and(|current| Arc::ptr_eq(current, session))
        {
            sessions.remove(region);
        }
    }

    /// Removes the region's session, if any.
    pub async fn close(&self, region: &Region) -> bool {
        self.sessions.write().await.remove(region).is_some()
    }

    pub async fn regions(&self) -> Vec<Region> {
        let mut regions: Vec<Region> = self.sessions.read().await.keys().cloned().collect();
        regions.sort();
        regions
    }

    /// ## Summary
    /// Opens one session per pincode, pausing between creations. Failures are
    /// logged and skipped. Returns the number of sessions opened.
    pub async fn warm_up(&self, pincodes: &[String], pause: std::time::Duration) -> usize {
        let mut opened = 0;
        for (i, pincode) in pincodes.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(pause).await;
            }
            match self.connect(pincode).await {
                Ok(session) => {
                    tracing::info!(pincode, region = %session.region(), "Warm-up session ready");
                    opened += 1;
                }
                Err(e) => tracing::warn!(pincode, error = %e, "Warm-up session failed"),
            }
        }
        opened
    }
}
