//! Long-running loops driven by the binary: the periodic stock check and
//! the daily activity report. Both stop when the shutdown signal flips.

use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use stockwatch_service::checker::{RegionOutcome, StockChecker};
use stockwatch_service::report::ActivityReporter;

use crate::error::{AppError, AppResult};

/// ## Errors
/// `InvalidSchedule` for an unknown IANA timezone name.
pub fn parse_timezone(name: &str) -> AppResult<Tz> {
    name.parse::<Tz>()
        .map_err(|e| AppError::InvalidSchedule(format!("timezone {name}: {e}")))
}

/// ## Errors
/// `InvalidSchedule` unless `value` is a `HH:MM` time of day.
pub fn parse_report_time(value: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|e| AppError::InvalidSchedule(format!("report time {value}: {e}")))
}

/// Next instant strictly after `now` whose local time in `timezone` is `at`.
#[must_use]
pub fn next_occurrence(now: DateTime<Utc>, at: NaiveTime, timezone: Tz) -> DateTime<Utc> {
    let today = now.with_timezone(&timezone).date_naive();
    let mut day = today;
    loop {
        let local = day.and_time(at);
        // Times skipped by a DST jump resolve to the same wall time an hour on.
        let resolved = timezone
            .from_local_datetime(&local)
            .earliest()
            .or_else(|| {
                timezone
                    .from_local_datetime(&(local + TimeDelta::hours(1)))
                    .earliest()
            })
            .map(|t| t.with_timezone(&Utc));
        if let Some(candidate) = resolved.filter(|t| *t > now) {
            return candidate;
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => return now + TimeDelta::days(1),
        }
    }
}

/// Runs a stock check every `interval` until shutdown. Ticks missed while a
/// cycle is still running are skipped, so cycles never overlap.
pub async fn run_tracker(
    checker: StockChecker,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        match checker.run_cycle().await {
            Ok(report) => {
                let failed = report
                    .regions
                    .iter()
                    .filter(|(_, outcome)| matches!(outcome, RegionOutcome::Failed(_)))
                    .count();
                tracing::info!(regions = report.regions.len(), failed, "Stock check cycle finished");
            }
            Err(e) => tracing::error!(error = %e, "Stock check cycle failed"),
        }
    }
    tracing::info!("Stock tracker stopped");
}

/// Sends the activity report once a day at local `at` until shutdown.
pub async fn run_daily_report(
    reporter: ActivityReporter,
    at: NaiveTime,
    timezone: Tz,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let now = Utc::now();
        let next = next_occurrence(now, at, timezone);
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::debug!(next = %next, "Daily report scheduled");

        tokio::select! {
            () = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => break,
        }

        if let Err(e) = reporter.send_daily_report(Utc::now()).await {
            tracing::error!(error = %e, "Daily report failed");
        }
    }
    tracing::info!("Daily report scheduler stopped");
}
