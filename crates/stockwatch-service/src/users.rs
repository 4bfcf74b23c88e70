//! User-facing account operations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use stockwatch_core::types::{Region, TrackingStyle, validate_max_notify_count};
use stockwatch_db::model::tracked_product::TrackedProduct;
use stockwatch_db::model::user::User;

use crate::error::{ServiceError, ServiceResult};
use crate::report::day_key;
use crate::session::SessionManager;
use crate::store::{FavoriteToggle, NewProfile, Store};

pub struct UserService {
    store: Arc<dyn Store>,
    sessions: Arc<SessionManager>,
    timezone: Tz,
}

impl UserService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, sessions: Arc<SessionManager>, timezone: Tz) -> Self {
        Self {
            store,
            sessions,
            timezone,
        }
    }

    async fn require(&self, id: Uuid) -> ServiceResult<User> {
        self.store
            .user_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user {id}")))
    }

    /// ## Summary
    /// Returns the user owning `profile.telegram_id`, creating them on first contact.
    ///
    /// ## Errors
    /// Returns an error if the store fails.
    pub async fn register(&self, profile: NewProfile) -> ServiceResult<User> {
        if let Some(telegram_id) = profile.telegram_id {
            if let Some(existing) = self.store.user_by_telegram_id(telegram_id).await? {
                return Ok(existing);
            }
        }
        self.store.create_user(profile).await
    }

    /// ## Summary
    /// Binds the user to the region serving `pincode`, opening (or reusing)
    /// that region's upstream session.
    ///
    /// ## Errors
    /// `UnknownPincode` when no store serves the pincode, `NotFound` for an
    /// unknown user.
    #[tracing::instrument(skip(self))]
    pub async fn set_pincode(&self, user_id: Uuid, pincode: &str) -> ServiceResult<Region> {
        self.require(user_id).await?;
        let session = self.sessions.connect(pincode).await?;
        let region = session.region().clone();
        self.store.set_location(user_id, pincode, &region).await?;
        tracing::info!(%region, "User location updated");
        Ok(region)
    }

    /// ## Errors
    /// `NotFound` for an unknown user.
    pub async fn toggle_tracking_style(&self, user_id: Uuid) -> ServiceResult<TrackingStyle> {
        let user = self.require(user_id).await?;
        let next = TrackingStyle::from(user.tracking_style).toggled();
        self.store.set_tracking_style(user_id, next).await?;
        Ok(next)
    }

    /// ## Errors
    /// `ValidationError` outside `1..=100`, `NotFound` for an unknown user.
    pub async fn set_max_notify_count(&self, user_id: Uuid, count: i32) -> ServiceResult<User> {
        let count = validate_max_notify_count(count)?;
        self.store.set_max_notify_count(user_id, count).await
    }

    /// ## Summary
    /// Marks the user active for the current day in the configured timezone.
    /// Returns `true` on the first activity of the day.
    ///
    /// ## Errors
    /// Returns an error if the store fails.
    pub async fn record_activity(&self, user_id: Uuid, now: DateTime<Utc>) -> ServiceResult<bool> {
        let (key, day) = day_key(now, self.timezone);
        self.store.record_activity(user_id, &key, day).await
    }

    /// ## Errors
    /// `AlreadyTracking` when the pair exists.
    pub async fn track(&self, user_id: Uuid, sku: &str) -> ServiceResult<TrackedProduct> {
        self.store.track(user_id, sku).await
    }

    /// ## Errors
    /// `NotTracking` when the pair does not exist.
    pub async fn untrack(&self, user_id: Uuid, sku: &str) -> ServiceResult<()> {
        self.store.untrack(user_id, sku).await
    }

    /// ## Errors
    /// `NotFound` for an unknown user.
    pub async fn toggle_favorite(&self, user_id: Uuid, sku: &str) -> ServiceResult<FavoriteToggle> {
        self.store.toggle_favorite(user_id, sku).await
    }

    /// ## Errors
    /// Returns an error if the store fails.
    pub async fn last_in_stock(
        &self,
        sku: &str,
        region: &Region,
    ) -> ServiceResult<Option<DateTime<Utc>>> {
        self.store.last_in_stock(sku, region).await
    }
}
