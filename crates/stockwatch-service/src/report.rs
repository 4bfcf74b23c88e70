//! Daily activity statistics for admins.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use stockwatch_core::constants::DAY_KEY_FORMAT;

use crate::delivery::{DeliveryChannel, OutboundMessage};
use crate::error::ServiceResult;
use crate::render::statistics_report;
use crate::store::Store;

/// Day key (`DD-MM-YYYY`) and calendar date of `now` in `timezone`.
#[must_use]
pub fn day_key(now: DateTime<Utc>, timezone: Tz) -> (String, NaiveDate) {
    let local = now.with_timezone(&timezone);
    (local.format(DAY_KEY_FORMAT).to_string(), local.date_naive())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityStats {
    pub total_users: i64,
    pub active_today: i64,
}

impl ActivityStats {
    #[must_use]
    pub const fn inactive(&self) -> i64 {
        self.total_users - self.active_today
    }
}

pub struct ActivityReporter {
    store: Arc<dyn Store>,
    channel: Arc<dyn DeliveryChannel>,
    timezone: Tz,
}

impl ActivityReporter {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, channel: Arc<dyn DeliveryChannel>, timezone: Tz) -> Self {
        Self {
            store,
            channel,
            timezone,
        }
    }

    /// ## Errors
    /// Returns an error if the counts cannot be loaded.
    pub async fn stats(&self, now: DateTime<Utc>) -> ServiceResult<ActivityStats> {
        let (key, _) = day_key(now, self.timezone);
        Ok(ActivityStats {
            total_users: self.store.count_users().await?,
            active_today: self.store.active_count(&key).await?,
        })
    }

    /// ## Summary
    /// Sends today's statistics to every admin with a delivery address.
    /// Returns the number of admins reached.
    ///
    /// ## Errors
    /// Returns an error if the statistics or admin list cannot be loaded.
    /// Individual send failures are logged.
    #[tracing::instrument(skip(self))]
    pub async fn send_daily_report(&self, now: DateTime<Utc>) -> ServiceResult<usize> {
        let stats = self.stats(now).await?;
        let message = OutboundMessage::html(statistics_report(stats.total_users, stats.active_today));

        let mut reached = 0;
        for admin in self.store.admins().await? {
            let Some(chat_id) = admin.telegram_id else {
                continue;
            };
            match self.channel.send(chat_id, &message).await {
                Ok(()) => reached += 1,
                Err(e) => tracing::error!(admin_id = %admin.id, error = %e, "Failed to send daily report"),
            }
        }

        tracing::info!(
            total = stats.total_users,
            active = stats.active_today,
            inactive = stats.inactive(),
            reached,
            "Daily activity report sent"
        );
        Ok(reached)
    }
}
