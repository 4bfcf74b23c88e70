//! In-memory store.
//!
//! Mirrors the `PostgreSQL` backend closely enough that the pipeline can be
//! exercised without a database: unique `(sku, user_id)` tracking records,
//! cascade on user removal, insert-or-touch stock history and one activity
//! row per user per day. All state lives behind a single `RwLock` so every
//! operation is atomic with respect to the others. Not durable.
//!
//! Tracking budgets are stored as `Option<i32>` so records imported without a
//! budget can be represented. They count as [`DEFAULT_NOTIFY_BUDGET`] until
//! [`MemoryStore::backfill_notify_budgets`] normalizes them.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use stockwatch_core::constants::{DEFAULT_MAX_NOTIFY_COUNT, DEFAULT_NOTIFY_BUDGET};
use stockwatch_core::types::{Region, TrackingPolicy, TrackingStyle};
use stockwatch_db::model::tracked_product::TrackedProduct;
use stockwatch_db::model::user::User;

use super::{
    ActivityStore, FavoriteToggle, NewProfile, NotifyOutcome, RegionSkuCounts, StockHistoryStore,
    TrackingStore, UserStore, group_sku_counts,
};
use crate::error::{ServiceError, ServiceResult, TrackingError};

#[derive(Debug, Clone)]
struct TrackingRow {
    id: Uuid,
    sku: String,
    user_id: Uuid,
    remaining_notify_count: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TrackingRow {
    fn budget(&self) -> i32 {
        self.remaining_notify_count.unwrap_or(DEFAULT_NOTIFY_BUDGET)
    }

    fn to_model(&self) -> TrackedProduct {
        TrackedProduct {
            id: self.id,
            sku: self.sku.clone(),
            user_id: self.user_id,
            remaining_notify_count: self.budget(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    tracking: Vec<TrackingRow>,
    history: HashMap<(String, Region), DateTime<Utc>>,
    activity: HashSet<(String, Uuid)>,
}

impl MemoryState {
    fn user_mut(&mut self, id: Uuid) -> ServiceResult<&mut User> {
        self.users
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("user {id}")))
    }

    fn row_position(&self, user_id: Uuid, sku: &str) -> Option<usize> {
        self.tracking
            .iter()
            .position(|r| r.user_id == user_id && r.sku == sku)
    }

    fn reachable(&self) -> Vec<&User> {
        let mut users: Vec<&User> = self
            .users
            .values()
            .filter(|u| !u.is_blocked && u.telegram_id.is_some())
            .collect();
        users.sort_by_key(|u| u.id);
        users
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a tracking record with no budget, as imported from the
    /// previous document store.
    ///
    /// ## Errors
    /// `TrackingError::AlreadyTracking` when the pair exists.
    pub async fn insert_legacy_record(&self, user_id: Uuid, sku: &str) -> ServiceResult<()> {
        let mut state = self.state.write().await;
        if state.row_position(user_id, sku).is_some() {
            return Err(TrackingError::AlreadyTracking {
                sku: sku.to_string(),
            }
            .into());
        }
        let now = Utc::now();
        state.tracking.push(TrackingRow {
            id: Uuid::now_v7(),
            sku: sku.to_string(),
            user_id,
            remaining_notify_count: None,
            created_at: now,
            updated_at: now,
        });
        Ok(())
    }

    /// Gives every record without a budget the default budget. Returns the
    /// number of records changed.
    pub async fn backfill_notify_budgets(&self) -> usize {
        let mut state = self.state.write().await;
        let mut changed = 0;
        for row in state
            .tracking
            .iter_mut()
            .filter(|r| r.remaining_notify_count.is_none())
        {
            row.remaining_notify_count = Some(DEFAULT_NOTIFY_BUDGET);
            changed += 1;
        }
        changed
    }

    /// Raw stored budget, `None` for legacy records.
    pub async fn stored_budget(&self, user_id: Uuid, sku: &str) -> Option<Option<i32>> {
        let state = self.state.read().await;
        state
            .row_position(user_id, sku)
            .map(|pos| state.tracking[pos].remaining_notify_count)
    }

    /// Overwrites a record's budget.
    ///
    /// ## Errors
    /// `TrackingError::NotTracking` when the pair does not exist.
    pub async fn set_budget(&self, user_id: Uuid, sku: &str, budget: i32) -> ServiceResult<()> {
        let mut state = self.state.write().await;
        let pos = state
            .row_position(user_id, sku)
            .ok_or_else(|| TrackingError::NotTracking {
                sku: sku.to_string(),
            })?;
        state.tracking[pos].remaining_notify_count = Some(budget);
        Ok(())
    }

    /// Marks a user as blocked, keeping their records.
    ///
    /// ## Errors
    /// `NotFound` when the user does not exist.
    pub async fn set_blocked(&self, id: Uuid, blocked: bool) -> ServiceResult<()> {
        let mut state = self.state.write().await;
        state.user_mut(id)?.is_blocked = blocked;
        Ok(())
    }
}

#[async_trait]
impl TrackingStore for MemoryStore {
    async fn track(&self, user_id: Uuid, sku: &str) -> ServiceResult<TrackedProduct> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&user_id) {
            return Err(ServiceError::NotFound(format!("user {user_id}")));
        }
        if state.row_position(user_id, sku).is_some() {
            return Err(TrackingError::AlreadyTracking {
                sku: sku.to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let row = TrackingRow {
            id: Uuid::now_v7(),
            sku: sku.to_string(),
            user_id,
            remaining_notify_count: Some(DEFAULT_NOTIFY_BUDGET),
            created_at: now,
            updated_at: now,
        };
        let model = row.to_model();
        state.tracking.push(row);
        Ok(model)
    }

    async fn untrack(&self, user_id: Uuid, sku: &str) -> ServiceResult<()> {
        let mut state = self.state.write().await;
        let pos = state
            .row_position(user_id, sku)
            .ok_or_else(|| TrackingError::NotTracking {
                sku: sku.to_string(),
            })?;
        state.tracking.remove(pos);
        Ok(())
    }

    async fn tracked_by_user(&self, user_id: Uuid) -> ServiceResult<Vec<TrackedProduct>> {
        let state = self.state.read().await;
        Ok(state
            .tracking
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(TrackingRow::to_model)
            .collect())
    }

    async fn toggle_favorite(&self, user_id: Uuid, sku: &str) -> ServiceResult<FavoriteToggle> {
        let mut state = self.state.write().await;
        let user = state.user_mut(user_id)?;
        if let Some(pos) = user.favorite_skus.iter().position(|s| s == sku) {
            user.favorite_skus.remove(pos);
            Ok(FavoriteToggle::Removed)
        } else {
            user.favorite_skus.push(sku.to_string());
            Ok(FavoriteToggle::Added)
        }
    }

    async fn rearm_always_tracking(&self, sku: &str) -> ServiceResult<usize> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let now = Utc::now();
        let mut touched = 0;

        for row in state.tracking.iter_mut().filter(|r| r.sku == sku) {
            let Some(owner) = state.users.get(&row.user_id) else {
                continue;
            };
            if TrackingStyle::from(owner.tracking_style) == TrackingStyle::Always {
                row.remaining_notify_count = Some(owner.max_notify_count);
                row.updated_at = now;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn notify_candidates(
        &self,
        skus: &[String],
        region: &Region,
    ) -> ServiceResult<Vec<(TrackedProduct, User)>> {
        let state = self.state.read().await;
        let mut candidates: Vec<(TrackedProduct, User)> = state
            .tracking
            .iter()
            .filter(|r| skus.contains(&r.sku) && r.budget() > 0)
            .filter_map(|r| {
                let owner = state.users.get(&r.user_id)?;
                (owner.region.as_deref() == Some(region.as_str()))
                    .then(|| (r.to_model(), owner.clone()))
            })
            .collect();
        candidates.sort_by(|a, b| (&a.0.sku, a.0.created_at).cmp(&(&b.0.sku, b.0.created_at)));
        Ok(candidates)
    }

    async fn apply_notify_outcome(
        &self,
        user_id: Uuid,
        sku: &str,
        policy: TrackingPolicy,
    ) -> ServiceResult<NotifyOutcome> {
        let mut state = self.state.write().await;
        let Some(pos) = state.row_position(user_id, sku) else {
            return Ok(NotifyOutcome::Unchanged);
        };

        let outcome = match policy {
            TrackingPolicy::Once => {
                state.tracking.remove(pos);
                NotifyOutcome::Removed
            }
            TrackingPolicy::Always { .. } => {
                let row = &mut state.tracking[pos];
                let budget = row.budget();
                if budget > 0 {
                    row.remaining_notify_count = Some(budget - 1);
                    row.updated_at = Utc::now();
                    NotifyOutcome::Decremented {
                        remaining: budget - 1,
                    }
                } else {
                    NotifyOutcome::Unchanged
                }
            }
        };
        Ok(outcome)
    }

    async fn tracked_sku_counts(&self) -> ServiceResult<Vec<RegionSkuCounts>> {
        let state = self.state.read().await;
        let mut counts: HashMap<(Region, String), i64> = HashMap::new();
        for row in &state.tracking {
            let Some(region) = state.users.get(&row.user_id).and_then(|u| u.region.as_deref())
            else {
                continue;
            };
            *counts
                .entry((Region::from(region), row.sku.clone()))
                .or_default() += 1;
        }
        Ok(group_sku_counts(
            counts
                .into_iter()
                .map(|((region, sku), count)| (region, sku, count)),
        ))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, profile: NewProfile) -> ServiceResult<User> {
        let mut state = self.state.write().await;
        let duplicate = state.users.values().any(|u| {
            (profile.telegram_id.is_some() && u.telegram_id == profile.telegram_id)
                || (profile.username.is_some() && u.username == profile.username)
        });
        if duplicate {
            return Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                Box::new("app_user telegram_id or username already exists".to_string()),
            )
            .into());
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::now_v7(),
            telegram_id: profile.telegram_id,
            username: profile.username,
            first_name: profile.first_name,
            last_name: profile.last_name,
            is_admin: profile.is_admin,
            is_blocked: false,
            pincode: None,
            region: None,
            tracking_style: TrackingStyle::Once.into(),
            max_notify_count: DEFAULT_MAX_NOTIFY_COUNT,
            favorite_skus: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user_by_id(&self, id: Uuid) -> ServiceResult<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn user_by_telegram_id(&self, telegram_id: i64) -> ServiceResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.telegram_id == Some(telegram_id))
            .cloned())
    }

    async fn regions(&self) -> ServiceResult<Vec<Region>> {
        let state = self.state.read().await;
        let mut regions: Vec<Region> = state
            .users
            .values()
            .filter_map(|u| u.region.as_deref().map(Region::from))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        regions.sort();
        Ok(regions)
    }

    async fn pincodes(&self) -> ServiceResult<Vec<String>> {
        let state = self.state.read().await;
        let mut pincodes: Vec<String> = state
            .users
            .values()
            .filter_map(|u| u.pincode.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        pincodes.sort();
        Ok(pincodes)
    }

    async fn pincode_for_region(&self, region: &Region) -> ServiceResult<Option<String>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .filter(|u| u.region.as_deref() == Some(region.as_str()))
            .find_map(|u| u.pincode.clone()))
    }

    async fn set_location(&self, id: Uuid, pincode: &str, region: &Region) -> ServiceResult<User> {
        let mut state = self.state.write().await;
        let user = state.user_mut(id)?;
        user.pincode = Some(pincode.to_string());
        user.region = Some(region.as_str().to_string());
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn set_tracking_style(&self, id: Uuid, style: TrackingStyle) -> ServiceResult<User> {
        let mut state = self.state.write().await;
        let user = state.user_mut(id)?;
        user.tracking_style = style.into();
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn set_max_notify_count(&self, id: Uuid, max_notify_count: i32) -> ServiceResult<User> {
        let mut state = self.state.write().await;
        let user = state.user_mut(id)?;
        user.max_notify_count = max_notify_count;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn remove_by_telegram_id(&self, telegram_id: i64) -> ServiceResult<Option<User>> {
        let mut state = self.state.write().await;
        let Some(id) = state
            .users
            .values()
            .find(|u| u.telegram_id == Some(telegram_id))
            .map(|u| u.id)
        else {
            return Ok(None);
        };

        state.tracking.retain(|r| r.user_id != id);
        state.activity.retain(|(_, user_id)| *user_id != id);
        Ok(state.users.remove(&id))
    }

    async fn count_users(&self) -> ServiceResult<i64> {
        let state = self.state.read().await;
        Ok(i64::try_from(state.users.len()).unwrap_or(i64::MAX))
    }

    async fn admins(&self) -> ServiceResult<Vec<User>> {
        let state = self.state.read().await;
        let mut admins: Vec<User> = state.users.values().filter(|u| u.is_admin).cloned().collect();
        admins.sort_by_key(|u| u.id);
        Ok(admins)
    }

    async fn count_reachable(&self) -> ServiceResult<i64> {
        let state = self.state.read().await;
        Ok(i64::try_from(state.reachable().len()).unwrap_or(i64::MAX))
    }

    async fn reachable_page(&self, offset: i64, limit: i64) -> ServiceResult<Vec<User>> {
        let state = self.state.read().await;
        let offset = usize::try_from(offset).unwrap_or(0);
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(state
            .reachable()
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StockHistoryStore for MemoryStore {
    async fn touch_in_stock(
        &self,
        sku: &str,
        region: &Region,
        seen_at: DateTime<Utc>,
    ) -> ServiceResult<()> {
        let mut state = self.state.write().await;
        state
            .history
            .insert((sku.to_string(), region.clone()), seen_at);
        Ok(())
    }

    async fn last_in_stock(
        &self,
        sku: &str,
        region: &Region,
    ) -> ServiceResult<Option<DateTime<Utc>>> {
        let state = self.state.read().await;
        Ok(state
            .history
            .get(&(sku.to_string(), region.clone()))
            .copied())
    }
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn record_activity(
        &self,
        user_id: Uuid,
        day_key: &str,
        _day: NaiveDate,
    ) -> ServiceResult<bool> {
        let mut state = self.state.write().await;
        Ok(state.activity.insert((day_key.to_string(), user_id)))
    }

    async fn active_count(&self, day_key: &str) -> ServiceResult<i64> {
        let state = self.state.read().await;
        let count = state.activity.iter().filter(|(key, _)| key == day_key).count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn user_in(store: &MemoryStore, telegram_id: i64, region: &str) -> User {
        let user = store
            .create_user(NewProfile {
                telegram_id: Some(telegram_id),
                first_name: format!("user{telegram_id}"),
                ..NewProfile::default()
            })
            .await
            .unwrap();
        store
            .set_location(user.id, "110001", &Region::from(region))
            .await
            .unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn track_twice_is_rejected() {
        let store = MemoryStore::new();
        let user = user_in(&store, 1, "delhi").await;

        let record = store.track(user.id, "A").await.unwrap();
        assert_eq!(record.remaining_notify_count, DEFAULT_NOTIFY_BUDGET);

        let err = store.track(user.id, "A").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::TrackingError(TrackingError::AlreadyTracking { .. })
        ));
    }

    #[test_log::test(tokio::test)]
    async fn untrack_missing_is_rejected() {
        let store = MemoryStore::new();
        let user = user_in(&store, 1, "delhi").await;

        let err = store.untrack(user.id, "A").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::TrackingError(TrackingError::NotTracking { .. })
        ));
    }

    #[test_log::test(tokio::test)]
    async fn favorites_toggle() {
        let store = MemoryStore::new();
        let user = user_in(&store, 1, "delhi").await;

        assert_eq!(
            store.toggle_favorite(user.id, "A").await.unwrap(),
            FavoriteToggle::Added
        );
        assert_eq!(
            store.toggle_favorite(user.id, "A").await.unwrap(),
            FavoriteToggle::Removed
        );
        let user = store.user_by_id(user.id).await.unwrap().unwrap();
        assert!(user.favorite_skus.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn legacy_records_count_as_default_budget_until_backfilled() {
        let store = MemoryStore::new();
        let user = user_in(&store, 1, "delhi").await;
        store.insert_legacy_record(user.id, "A").await.unwrap();

        let candidates = store
            .notify_candidates(&["A".to_string()], &Region::from("delhi"))
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].0.remaining_notify_count, 1);

        assert_eq!(store.backfill_notify_budgets().await, 1);
        assert_eq!(store.stored_budget(user.id, "A").await, Some(Some(1)));
        assert_eq!(store.backfill_notify_budgets().await, 0);
    }

    #[test_log::test(tokio::test)]
    async fn remove_cascades_to_tracking_records() {
        let store = MemoryStore::new();
        let user = user_in(&store, 42, "delhi").await;
        store.track(user.id, "A").await.unwrap();
        store.track(user.id, "B").await.unwrap();

        let removed = store.remove_by_telegram_id(42).await.unwrap();
        assert_eq!(removed.map(|u| u.id), Some(user.id));
        assert!(store.tracked_by_user(user.id).await.unwrap().is_empty());
        assert!(store.user_by_telegram_id(42).await.unwrap().is_none());
        assert!(store.remove_by_telegram_id(42).await.unwrap().is_none());
    }

    #[test_log::test(tokio::test)]
    async fn activity_is_unique_per_day() {
        let store = MemoryStore::new();
        let user = user_in(&store, 1, "delhi").await;
        let day = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        assert!(store.record_activity(user.id, "01-06-2025", day).await.unwrap());
        assert!(!store.record_activity(user.id, "01-06-2025", day).await.unwrap());
        assert_eq!(store.active_count("01-06-2025").await.unwrap(), 1);
        assert_eq!(store.active_count("02-06-2025").await.unwrap(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn duplicate_telegram_id_is_rejected() {
        let store = MemoryStore::new();
        user_in(&store, 7, "delhi").await;
        let err = store
            .create_user(NewProfile {
                telegram_id: Some(7),
                first_name: "again".to_string(),
                ..NewProfile::default()
            })
            .await;
        assert!(err.is_err());
    }

    #[test_log::test(tokio::test)]
    async fn sku_counts_follow_owner_region() {
        let store = MemoryStore::new();
        let a = user_in(&store, 1, "delhi").await;
        let b = user_in(&store, 2, "delhi").await;
        let c = user_in(&store, 3, "mumbai").await;
        let homeless = store
            .create_user(NewProfile {
                telegram_id: Some(4),
                first_name: "nowhere".to_string(),
                ..NewProfile::default()
            })
            .await
            .unwrap();
        for (user, sku) in [(&a, "P1"), (&b, "P1"), (&a, "P2"), (&c, "P2")] {
            store.track(user.id, sku).await.unwrap();
        }
        store.track(homeless.id, "P1").await.unwrap();

        let counts = store.tracked_sku_counts().await.unwrap();

        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].region, Region::from("delhi"));
        assert_eq!(counts[0].total, 3);
        assert_eq!(counts[0].skus[0].sku, "P1");
        assert_eq!(counts[0].skus[0].count, 2);
        assert_eq!(counts[1].region, Region::from("mumbai"));
        assert_eq!(counts[1].total, 1);
    }
}
