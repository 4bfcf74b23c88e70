//! Restock notification fan-out.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;

use stockwatch_core::product::ProductSnapshot;
use stockwatch_core::types::{Region, TrackingPolicy};

use crate::delivery::DeliveryQueue;
use crate::error::ServiceResult;
use crate::render::Renderer;
use crate::store::Store;

/// Counts for one dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Messages handed to the delivery queue.
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Candidates without a delivery address.
    pub skipped: usize,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn Store>,
    queue: DeliveryQueue,
    renderer: Arc<Renderer>,
}

impl NotificationDispatcher {
    #[must_use]
    pub const fn new(store: Arc<dyn Store>, queue: DeliveryQueue, renderer: Arc<Renderer>) -> Self {
        Self {
            store,
            queue,
            renderer,
        }
    }

    /// ## Summary
    /// Notifies every user with budget left on a changed, purchasable product
    /// in `region`. Each successful delivery applies the owner's tracking
    /// transition. Delivery failures are logged and counted, never retried
    /// here.
    ///
    /// ## Errors
    /// Returns an error if candidates cannot be loaded.
    #[tracing::instrument(skip(self, changed), fields(%region, changed = changed.len()))]
    pub async fn dispatch(
        &self,
        region: &Region,
        changed: &[ProductSnapshot],
    ) -> ServiceResult<DispatchReport> {
        let purchasable: HashMap<&str, &ProductSnapshot> = changed
            .iter()
            .filter(|p| p.is_purchasable())
            .map(|p| (p.sku.as_str(), p))
            .collect();
        if purchasable.is_empty() {
            return Ok(DispatchReport::default());
        }

        let skus: Vec<String> = purchasable.keys().map(|s| (*s).to_string()).collect();
        let candidates = self.store.notify_candidates(&skus, region).await?;

        let mut report = DispatchReport::default();
        let mut seen = HashSet::new();
        let mut sends = Vec::new();

        for (record, user) in candidates {
            if !seen.insert((record.user_id, record.sku.clone())) {
                continue;
            }
            let Some(product) = purchasable.get(record.sku.as_str()) else {
                continue;
            };
            let Some(recipient) = user.telegram_id else {
                tracing::warn!(user_id = %user.id, sku = %record.sku, "User has no delivery address, skipping");
                report.skipped += 1;
                continue;
            };

            let policy =
                TrackingPolicy::from_settings(user.tracking_style.into(), user.max_notify_count);
            let message = self
                .renderer
                .notification(product, policy, record.remaining_notify_count);

            report.attempted += 1;
            sends.push(async move {
                let delivered = match self.queue.enqueue(recipient, message).await {
                    Ok(receipt) => {
                        tracing::debug!(job_id = %receipt.job_id, user_id = %user.id, sku = %record.sku, "Notification delivered");
                        true
                    }
                    Err(e) => {
                        tracing::warn!(user_id = %user.id, sku = %record.sku, error = %e, "Notification failed");
                        false
                    }
                };

                if delivered {
                    match self
                        .store
                        .apply_notify_outcome(user.id, &record.sku, policy)
                        .await
                    {
                        Ok(outcome) => {
                            tracing::debug!(user_id = %user.id, sku = %record.sku, ?outcome, "Tracking updated");
                        }
                        Err(e) => {
                            tracing::error!(user_id = %user.id, sku = %record.sku, error = %e, "Failed to apply notify outcome");
                        }
                    }
                }
                delivered
            });
        }

        for delivered in join_all(sends).await {
            if delivered {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }

        tracing::info!(
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            "Dispatch finished"
        );
        Ok(report)
    }
}
