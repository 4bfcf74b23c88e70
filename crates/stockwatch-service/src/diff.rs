//! Stock change detection against the cached baseline.

use std::collections::HashMap;

use stockwatch_core::product::ProductSnapshot;
use stockwatch_core::types::Region;

use crate::cache::SnapshotCache;

/// Result of comparing a fresh snapshot with the baseline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockDiff {
    /// `available` or `inventory_quantity` moved.
    pub changed: Vec<ProductSnapshot>,
    /// Went from not purchasable to purchasable, regardless of `changed`.
    pub newly_purchasable: Vec<ProductSnapshot>,
    /// Purchasable now. Only products present in the baseline are included.
    pub in_stock: Vec<ProductSnapshot>,
    /// No baseline existed; `fresh` became the baseline and nothing was compared.
    pub cold_start: bool,
}

impl StockDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.newly_purchasable.is_empty() && self.in_stock.is_empty()
    }
}

/// ## Summary
/// Compares `fresh` with `baseline` by SKU. Products missing from the
/// baseline are skipped. Output order follows `fresh`.
#[must_use]
pub fn compare(baseline: &[ProductSnapshot], fresh: &[ProductSnapshot]) -> StockDiff {
    let previous: HashMap<&str, &ProductSnapshot> =
        baseline.iter().map(|p| (p.sku.as_str(), p)).collect();

    let mut diff = StockDiff::default();
    for product in fresh {
        let Some(cached) = previous.get(product.sku.as_str()) else {
            continue;
        };

        let was = cached.is_purchasable();
        let is = product.is_purchasable();

        if is {
            diff.in_stock.push(product.clone());
        }
        if !was && is {
            diff.newly_purchasable.push(product.clone());
        }
        if product.stock_differs(cached) {
            diff.changed.push(product.clone());
        }
    }
    diff
}

#[derive(Clone)]
pub struct StockDiffEngine {
    cache: SnapshotCache,
}

impl StockDiffEngine {
    #[must_use]
    pub const fn new(cache: SnapshotCache) -> Self {
        Self { cache }
    }

    /// ## Summary
    /// Diffs `fresh` against the region's baseline, then makes `fresh` the
    /// new baseline. An absent or empty baseline yields an empty cold-start
    /// diff.
    #[tracing::instrument(skip(self, fresh), fields(count = fresh.len()))]
    pub async fn diff(&self, region: &Region, fresh: &[ProductSnapshot]) -> StockDiff {
        let baseline = self.cache.baseline(region).await.unwrap_or_default();

        let diff = if baseline.is_empty() {
            tracing::info!("No baseline yet, storing fresh snapshot");
            StockDiff {
                cold_start: true,
                ..StockDiff::default()
            }
        } else {
            compare(&baseline, fresh)
        };

        self.cache.store_baseline(region, fresh).await;

        tracing::debug!(
            changed = diff.changed.len(),
            newly_purchasable = diff.newly_purchasable.len(),
            in_stock = diff.in_stock.len(),
            "Stock diff computed"
        );
        diff
    }
}
