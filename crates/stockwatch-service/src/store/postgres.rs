//! `PostgreSQL` backend over the diesel query layer.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use diesel_async::AsyncConnection;
use diesel_async::scoped_futures::ScopedFutureExt;
use uuid::Uuid;

use stockwatch_core::constants::DEFAULT_NOTIFY_BUDGET;
use stockwatch_core::types::{Region, TrackingPolicy, TrackingStyle};
use stockwatch_db::db::DbProvider;
use stockwatch_db::db::connection::{DbConnection, DbPool};
use stockwatch_db::db::query::{activity, stock_history, tracked_product, user};
use stockwatch_db::model::activity::NewActivity;
use stockwatch_db::model::tracked_product::{NewTrackedProduct, TrackedProduct};
use stockwatch_db::model::user::{NewUser, User};

use super::{
    ActivityStore, FavoriteToggle, NewProfile, NotifyOutcome, RegionSkuCounts, StockHistoryStore,
    TrackingStore, UserStore, group_sku_counts,
};
use crate::error::{ServiceError, ServiceResult, TrackingError};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> ServiceResult<DbConnection<'_>> {
        Ok(self.pool.get_connection().await?)
    }
}

fn user_not_found(id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("user {id}"))
}

#[async_trait]
impl TrackingStore for PgStore {
    #[tracing::instrument(skip(self))]
    async fn track(&self, user_id: Uuid, sku: &str) -> ServiceResult<TrackedProduct> {
        let mut conn = self.conn().await?;
        let record = NewTrackedProduct {
            id: Uuid::now_v7(),
            sku,
            user_id,
            remaining_notify_count: DEFAULT_NOTIFY_BUDGET,
        };

        tracked_product::insert_if_absent(&mut conn, &record)
            .await?
            .ok_or_else(|| {
                TrackingError::AlreadyTracking {
                    sku: sku.to_string(),
                }
                .into()
            })
    }

    #[tracing::instrument(skip(self))]
    async fn untrack(&self, user_id: Uuid, sku: &str) -> ServiceResult<()> {
        let mut conn = self.conn().await?;
        match tracked_product::delete(&mut conn, user_id, sku).await? {
            0 => Err(TrackingError::NotTracking {
                sku: sku.to_string(),
            }
            .into()),
            _ => Ok(()),
        }
    }

    async fn tracked_by_user(&self, user_id: Uuid) -> ServiceResult<Vec<TrackedProduct>> {
        let mut conn = self.conn().await?;
        Ok(tracked_product::list_for_user(&mut conn, user_id).await?)
    }

    #[tracing::instrument(skip(self))]
    async fn toggle_favorite(&self, user_id: Uuid, sku: &str) -> ServiceResult<FavoriteToggle> {
        let mut conn = self.conn().await?;
        let sku = sku.to_string();

        conn.transaction::<_, ServiceError, _>(move |tx| {
            async move {
                let current = user::find_by_id(tx, user_id)
                    .await?
                    .ok_or_else(|| user_not_found(user_id))?;

                let mut favorites = current.favorite_skus;
                let toggle = if let Some(pos) = favorites.iter().position(|s| *s == sku) {
                    favorites.remove(pos);
                    FavoriteToggle::Removed
                } else {
                    favorites.push(sku);
                    FavoriteToggle::Added
                };

                user::update_favorite_skus(tx, user_id, &favorites).await?;
                Ok(toggle)
            }
            .scope_boxed()
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn rearm_always_tracking(&self, sku: &str) -> ServiceResult<usize> {
        let mut conn = self.conn().await?;
        Ok(tracked_product::rearm_always(&mut conn, sku).await?)
    }

    async fn notify_candidates(
        &self,
        skus: &[String],
        region: &Region,
    ) -> ServiceResult<Vec<(TrackedProduct, User)>> {
        let mut conn = self.conn().await?;
        Ok(tracked_product::notify_candidates(&mut conn, skus, region.as_str()).await?)
    }

    #[tracing::instrument(skip(self))]
    async fn apply_notify_outcome(
        &self,
        user_id: Uuid,
        sku: &str,
        policy: TrackingPolicy,
    ) -> ServiceResult<NotifyOutcome> {
        let mut conn = self.conn().await?;
        let outcome = match policy {
            TrackingPolicy::Once => match tracked_product::delete(&mut conn, user_id, sku).await? {
                0 => NotifyOutcome::Unchanged,
                _ => NotifyOutcome::Removed,
            },
            TrackingPolicy::Always { .. } => {
                match tracked_product::decrement(&mut conn, user_id, sku).await? {
                    Some(record) => NotifyOutcome::Decremented {
                        remaining: record.remaining_notify_count,
                    },
                    None => NotifyOutcome::Unchanged,
                }
            }
        };
        Ok(outcome)
    }

    async fn tracked_sku_counts(&self) -> ServiceResult<Vec<RegionSkuCounts>> {
        let mut conn = self.conn().await?;
        let rows = tracked_product::sku_counts_by_region(&mut conn).await?;
        Ok(group_sku_counts(rows.into_iter().filter_map(
            |(region, sku, count)| region.map(|r| (Region::from(r), sku, count)),
        )))
    }
}

#[async_trait]
impl UserStore for PgStore {
    #[tracing::instrument(skip(self, profile), fields(telegram_id = ?profile.telegram_id))]
    async fn create_user(&self, profile: NewProfile) -> ServiceResult<User> {
        let mut conn = self.conn().await?;
        let new_user = NewUser {
            id: Uuid::now_v7(),
            telegram_id: profile.telegram_id,
            username: profile.username.as_deref(),
            first_name: &profile.first_name,
            last_name: profile.last_name.as_deref(),
            is_admin: profile.is_admin,
        };
        Ok(user::insert(&mut conn, &new_user).await?)
    }

    async fn user_by_id(&self, id: Uuid) -> ServiceResult<Option<User>> {
        let mut conn = self.conn().await?;
        Ok(user::find_by_id(&mut conn, id).await?)
    }

    async fn user_by_telegram_id(&self, telegram_id: i64) -> ServiceResult<Option<User>> {
        let mut conn = self.conn().await?;
        Ok(user::find_by_telegram_id(&mut conn, telegram_id).await?)
    }

    async fn regions(&self) -> ServiceResult<Vec<Region>> {
        let mut conn = self.conn().await?;
        let regions = user::distinct_regions(&mut conn).await?;
        Ok(regions.into_iter().map(Region::from).collect())
    }

    async fn pincodes(&self) -> ServiceResult<Vec<String>> {
        let mut conn = self.conn().await?;
        Ok(user::distinct_pincodes(&mut conn).await?)
    }

    async fn pincode_for_region(&self, region: &Region) -> ServiceResult<Option<String>> {
        let mut conn = self.conn().await?;
        let found = user::any_with_pincode_in_region(&mut conn, region.as_str()).await?;
        Ok(found.and_then(|u| u.pincode))
    }

    async fn set_location(&self, id: Uuid, pincode: &str, region: &Region) -> ServiceResult<User> {
        let mut conn = self.conn().await?;
        user::update_location(&mut conn, id, pincode, region.as_str())
            .await?
            .ok_or_else(|| user_not_found(id))
    }

    async fn set_tracking_style(&self, id: Uuid, style: TrackingStyle) -> ServiceResult<User> {
        let mut conn = self.conn().await?;
        user::update_tracking_style(&mut conn, id, style.into())
            .await?
            .ok_or_else(|| user_not_found(id))
    }

    async fn set_max_notify_count(&self, id: Uuid, max_notify_count: i32) -> ServiceResult<User> {
        let mut conn = self.conn().await?;
        user::update_max_notify_count(&mut conn, id, max_notify_count)
            .await?
            .ok_or_else(|| user_not_found(id))
    }

    #[tracing::instrument(skip(self))]
    async fn remove_by_telegram_id(&self, telegram_id: i64) -> ServiceResult<Option<User>> {
        let mut conn = self.conn().await?;

        conn.transaction::<_, ServiceError, _>(move |tx| {
            async move {
                let Some(existing) = user::find_by_telegram_id(tx, telegram_id).await? else {
                    return Ok(None);
                };

                let removed_records = tracked_product::delete_by_user(tx, existing.id).await?;
                let removed = user::delete_by_telegram_id(tx, telegram_id).await?;

                tracing::info!(
                    user_id = %existing.id,
                    removed_records,
                    "Removed user and their tracking records"
                );
                Ok(removed)
            }
            .scope_boxed()
        })
        .await
    }

    async fn count_users(&self) -> ServiceResult<i64> {
        let mut conn = self.conn().await?;
        Ok(user::count_all(&mut conn).await?)
    }

    async fn admins(&self) -> ServiceResult<Vec<User>> {
        let mut conn = self.conn().await?;
        Ok(user::admins(&mut conn).await?)
    }

    async fn count_reachable(&self) -> ServiceResult<i64> {
        let mut conn = self.conn().await?;
        Ok(user::count_reachable(&mut conn).await?)
    }

    async fn reachable_page(&self, offset: i64, limit: i64) -> ServiceResult<Vec<User>> {
        let mut conn = self.conn().await?;
        Ok(user::page_reachable(&mut conn, offset, limit).await?)
    }
}

#[async_trait]
impl StockHistoryStore for PgStore {
    async fn touch_in_stock(
        &self,
        sku: &str,
        region: &Region,
        seen_at: DateTime<Utc>,
    ) -> ServiceResult<()> {
        let mut conn = self.conn().await?;
        stock_history::touch(&mut conn, sku, region.as_str(), seen_at).await?;
        Ok(())
    }

    async fn last_in_stock(
        &self,
        sku: &str,
        region: &Region,
    ) -> ServiceResult<Option<DateTime<Utc>>> {
        let mut conn = self.conn().await?;
        let found = stock_history::find(&mut conn, sku, region.as_str()).await?;
        Ok(found.map(|h| h.last_seen_in_stock_at))
    }
}

#[async_trait]
impl ActivityStore for PgStore {
    async fn record_activity(
        &self,
        user_id: Uuid,
        day_key: &str,
        day: NaiveDate,
    ) -> ServiceResult<bool> {
        let mut conn = self.conn().await?;
        let entry = NewActivity {
            id: Uuid::now_v7(),
            user_id,
            day_key,
            day,
        };
        Ok(activity::record(&mut conn, &entry).await? > 0)
    }

    async fn active_count(&self, day_key: &str) -> ServiceResult<i64> {
        let mut conn = self.conn().await?;
        Ok(activity::count_for_day(&mut conn, day_key).await?)
    }
}
