//! Persistence seams for the service layer.
//!
//! Every operation the pipeline performs against storage goes through these
//! traits. `postgres::PgStore` is the production backend; `memory::MemoryStore`
//! backs tests and local runs without a database.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use stockwatch_core::types::{Region, TrackingPolicy, TrackingStyle};
use stockwatch_db::model::tracked_product::TrackedProduct;
use stockwatch_db::model::user::User;

use crate::error::ServiceResult;

pub mod memory;
pub mod postgres;

/// Profile fields captured when a user first reaches the bot.
#[derive(Debug, Clone, Default)]
pub struct NewProfile {
    pub telegram_id: Option<i64>,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub is_admin: bool,
}

/// What `apply_notify_outcome` did to the tracking record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Removed,
    Decremented { remaining: i32 },
    /// No record matched, or its budget was already spent.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteToggle {
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkuCount {
    pub sku: String,
    pub count: i64,
}

/// Tracking records on one region, per sku, most tracked first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSkuCounts {
    pub region: Region,
    pub total: i64,
    pub skus: Vec<SkuCount>,
}

/// Folds `(region, sku, count)` rows into per-region summaries. Regions are
/// ordered by total, descending; ties fall back to the region name.
#[must_use]
pub fn group_sku_counts(
    rows: impl IntoIterator<Item = (Region, String, i64)>,
) -> Vec<RegionSkuCounts> {
    let mut by_region: BTreeMap<Region, Vec<SkuCount>> = BTreeMap::new();
    for (region, sku, count) in rows {
        by_region
            .entry(region)
            .or_default()
            .push(SkuCount { sku, count });
    }

    let mut grouped: Vec<RegionSkuCounts> = by_region
        .into_iter()
        .map(|(region, mut skus)| {
            skus.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.sku.cmp(&b.sku)));
            RegionSkuCounts {
                region,
                total: skus.iter().map(|s| s.count).sum(),
                skus,
            }
        })
        .collect();
    grouped.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.region.cmp(&b.region)));
    grouped
}

#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// ## Errors
    /// `TrackingError::AlreadyTracking` when the pair exists.
    async fn track(&self, user_id: Uuid, sku: &str) -> ServiceResult<TrackedProduct>;

    /// ## Errors
    /// `TrackingError::NotTracking` when the pair does not exist.
    async fn untrack(&self, user_id: Uuid, sku: &str) -> ServiceResult<()>;

    async fn tracked_by_user(&self, user_id: Uuid) -> ServiceResult<Vec<TrackedProduct>>;

    async fn toggle_favorite(&self, user_id: Uuid, sku: &str) -> ServiceResult<FavoriteToggle>;

    /// Resets the budget of every `always` record on `sku` to its owner's
    /// `max_notify_count`. Returns the number of records touched.
    async fn rearm_always_tracking(&self, sku: &str) -> ServiceResult<usize>;

    /// Records on `skus` with budget left whose owner is bound to `region`.
    async fn notify_candidates(
        &self,
        skus: &[String],
        region: &Region,
    ) -> ServiceResult<Vec<(TrackedProduct, User)>>;

    /// Applies the post-delivery transition: `once` deletes the record,
    /// `always` spends one unit of budget without going below zero.
    async fn apply_notify_outcome(
        &self,
        user_id: Uuid,
        sku: &str,
        policy: TrackingPolicy,
    ) -> ServiceResult<NotifyOutcome>;

    /// Tracking records counted per owner region and sku. Records whose
    /// owner has no region are not counted.
    async fn tracked_sku_counts(&self) -> ServiceResult<Vec<RegionSkuCounts>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, profile: NewProfile) -> ServiceResult<User>;
    async fn user_by_id(&self, id: Uuid) -> ServiceResult<Option<User>>;
    async fn user_by_telegram_id(&self, telegram_id: i64) -> ServiceResult<Option<User>>;

    /// Regions with at least one bound user, sorted.
    async fn regions(&self) -> ServiceResult<Vec<Region>>;
    /// Distinct user pincodes, sorted.
    async fn pincodes(&self) -> ServiceResult<Vec<String>>;
    /// A pincode of any user bound to `region`.
    async fn pincode_for_region(&self, region: &Region) -> ServiceResult<Option<String>>;

    async fn set_location(&self, id: Uuid, pincode: &str, region: &Region) -> ServiceResult<User>;
    async fn set_tracking_style(&self, id: Uuid, style: TrackingStyle) -> ServiceResult<User>;
    async fn set_max_notify_count(&self, id: Uuid, max_notify_count: i32) -> ServiceResult<User>;

    /// Deletes the user addressed by `telegram_id` together with every
    /// tracking record they own.
    async fn remove_by_telegram_id(&self, telegram_id: i64) -> ServiceResult<Option<User>>;

    async fn count_users(&self) -> ServiceResult<i64>;
    async fn admins(&self) -> ServiceResult<Vec<User>>;
    /// Users that are not blocked and have a delivery address.
    async fn count_reachable(&self) -> ServiceResult<i64>;
    async fn reachable_page(&self, offset: i64, limit: i64) -> ServiceResult<Vec<User>>;
}

#[async_trait]
pub trait StockHistoryStore: Send + Sync {
    async fn touch_in_stock(&self, sku: &str, region: &Region, seen_at: DateTime<Utc>)
    -> ServiceResult<()>;

    async fn last_in_stock(&self, sku: &str, region: &Region)
    -> ServiceResult<Option<DateTime<Utc>>>;
}

#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Returns `true` when this is the user's first activity of the day.
    async fn record_activity(&self, user_id: Uuid, day_key: &str, day: NaiveDate)
    -> ServiceResult<bool>;

    async fn active_count(&self, day_key: &str) -> ServiceResult<i64>;
}

/// Everything the pipeline needs from storage.
pub trait Store: TrackingStore + UserStore + StockHistoryStore + ActivityStore {}

impl<T> Store for T where T: TrackingStore + UserStore + StockHistoryStore + ActivityStore {}
