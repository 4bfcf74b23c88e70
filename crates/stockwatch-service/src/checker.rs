//! The periodic stock check.
//!
//! Regions are swept one after another. Each sweep fetches the catalog
//! through the region's session, diffs it against the baseline, records stock
//! history, rearms `always` trackers of restocked products and dispatches
//! notifications. A failure in one region is logged and the sweep moves on.

use std::sync::Arc;

use chrono::Utc;

use stockwatch_core::config::TrackerConfig;
use stockwatch_core::types::Region;

use crate::diff::{StockDiff, StockDiffEngine};
use crate::dispatch::{DispatchReport, NotificationDispatcher};
use crate::error::ServiceResult;
use crate::ops_log::OpsLog;
use crate::render::stock_summary;
use crate::session::{FetchOptions, RegionSession, SessionLookup, SessionManager};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionOutcome {
    /// No user in the region has a pincode to open a session with.
    NoSession,
    /// Upstream returned nothing; treated as inconclusive.
    Inconclusive,
    /// First observation; the snapshot became the baseline.
    Baseline,
    Checked {
        changed: usize,
        rearmed: usize,
        dispatch: DispatchReport,
    },
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub regions: Vec<(Region, RegionOutcome)>,
}

pub struct StockChecker {
    config: TrackerConfig,
    store: Arc<dyn Store>,
    sessions: Arc<SessionManager>,
    diff: StockDiffEngine,
    dispatcher: NotificationDispatcher,
    ops: OpsLog,
}

impl StockChecker {
    #[must_use]
    pub const fn new(
        config: TrackerConfig,
        store: Arc<dyn Store>,
        sessions: Arc<SessionManager>,
        diff: StockDiffEngine,
        dispatcher: NotificationDispatcher,
        ops: OpsLog,
    ) -> Self {
        Self {
            config,
            store,
            sessions,
            diff,
            dispatcher,
            ops,
        }
    }

    /// ## Summary
    /// Runs one full sweep over every region that has users.
    ///
    /// ## Errors
    /// Returns an error only if the region list cannot be loaded. Per-region
    /// failures are reported in the returned [`CycleReport`].
    #[tracing::instrument(skip(self))]
    pub async fn run_cycle(&self) -> ServiceResult<CycleReport> {
        if !self.config.enabled {
            tracing::info!("Stock tracker is disabled, skipping cycle");
            return Ok(CycleReport::default());
        }

        let regions = self.store.regions().await?;
        let mut report = CycleReport::default();

        for region in regions {
            let outcome = match self.check_region(&region).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(%region, error = %e, "Region check failed");
                    self.ops
                        .error(&format!("Error processing region {region}: {e}"))
                        .await;
                    RegionOutcome::Failed(e.to_string())
                }
            };
            report.regions.push((region, outcome));

            tokio::time::sleep(self.config.region_pause()).await;
        }

        Ok(report)
    }

    async fn session_for(&self, region: &Region) -> ServiceResult<Option<Arc<RegionSession>>> {
        match self.sessions.lookup(region).await {
            SessionLookup::Active(session) => return Ok(Some(session)),
            SessionLookup::Expired => {
                self.ops
                    .warn(&format!(
                        "Session for region {region} is older than {} days. Reinitializing...",
                        self.sessions.max_age().num_days()
                    ))
                    .await;
            }
            SessionLookup::Missing => {}
        }

        let Some(pincode) = self.store.pincode_for_region(region).await? else {
            tracing::warn!(%region, "No user with a pincode in region, skipping");
            return Ok(None);
        };

        let session = self.sessions.get_or_create(region, &pincode).await?;
        self.ops
            .info(&format!(
                "Initialized upstream session for region {region} with pincode {pincode}."
            ))
            .await;
        Ok(Some(session))
    }

    #[tracing::instrument(skip(self), fields(%region))]
    async fn check_region(&self, region: &Region) -> ServiceResult<RegionOutcome> {
        let Some(session) = self.session_for(region).await? else {
            return Ok(RegionOutcome::NoSession);
        };

        let fresh = session.fetch_catalog(&FetchOptions::bypass()).await?;
        if fresh.is_empty() {
            tracing::warn!("No products fetched, skipping region");
            self.ops
                .warn(&format!(
                    "No fresh products found for region {region}. Skipping stock check."
                ))
                .await;
            return Ok(RegionOutcome::Inconclusive);
        }

        let diff = self.diff.diff(region, &fresh).await;
        if diff.cold_start {
            return Ok(RegionOutcome::Baseline);
        }

        self.record_history(region, &diff).await;
        let rearmed = self.rearm(&diff).await;

        if diff.changed.is_empty() {
            tracing::debug!("No stock changes detected");
            return Ok(RegionOutcome::Checked {
                changed: 0,
                rearmed,
                dispatch: DispatchReport::default(),
            });
        }

        let dispatch = self.dispatcher.dispatch(region, &diff.changed).await?;
        if dispatch.attempted > 0 {
            self.ops
                .post(&stock_summary(region, &diff.changed, dispatch.attempted))
                .await;
        }

        Ok(RegionOutcome::Checked {
            changed: diff.changed.len(),
            rearmed,
            dispatch,
        })
    }

    async fn record_history(&self, region: &Region, diff: &StockDiff) {
        let now = Utc::now();
        for product in &diff.in_stock {
            if let Err(e) = self.store.touch_in_stock(&product.sku, region, now).await {
                tracing::error!(sku = %product.sku, error = %e, "Failed to update stock history");
                self.ops
                    .error(&format!(
                        "Failed to update stock history for product {}: {e}",
                        product.sku
                    ))
                    .await;
            }
        }
    }

    async fn rearm(&self, diff: &StockDiff) -> usize {
        let mut rearmed = 0;
        for product in &diff.newly_purchasable {
            match self.store.rearm_always_tracking(&product.sku).await {
                Ok(count) => rearmed += count,
                Err(e) => {
                    tracing::error!(sku = %product.sku, error = %e, "Failed to rearm always trackers");
                }
            }
        }
        rearmed
    }
}
