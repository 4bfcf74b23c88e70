//! Admin view of what is being tracked, per region.

use std::collections::HashMap;
use std::sync::Arc;

use stockwatch_core::constants::MAX_MESSAGE_CHARS;
use stockwatch_core::types::Region;

use crate::error::ServiceResult;
use crate::render::{pack_sections, tracked_region_section};
use crate::session::{FetchOptions, SessionLookup, SessionManager};
use crate::store::Store;

const NOTHING_TRACKED: &str = "No products are being tracked.";

pub struct TrackingAnalytics {
    store: Arc<dyn Store>,
    sessions: Arc<SessionManager>,
}

impl TrackingAnalytics {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, sessions: Arc<SessionManager>) -> Self {
        Self { store, sessions }
    }

    /// ## Summary
    /// Renders tracked-sku counts per region, busiest region first, as HTML
    /// messages that each fit in one Telegram message. Product names come
    /// from the region's live session; no session is ever opened here.
    ///
    /// ## Errors
    /// Returns an error if the counts cannot be loaded.
    #[tracing::instrument(skip(self))]
    pub async fn tracked_products_report(&self) -> ServiceResult<Vec<String>> {
        let counts = self.store.tracked_sku_counts().await?;
        if counts.is_empty() {
            return Ok(vec![NOTHING_TRACKED.to_string()]);
        }

        let mut sections = Vec::with_capacity(counts.len());
        for region in &counts {
            let names = self.product_names(&region.region).await;
            sections.push(tracked_region_section(region, names.as_ref()));
        }
        Ok(pack_sections(&sections, MAX_MESSAGE_CHARS))
    }

    async fn product_names(&self, region: &Region) -> Option<HashMap<String, String>> {
        let SessionLookup::Active(session) = self.sessions.lookup(region).await else {
            return None;
        };
        match session.fetch_catalog(&FetchOptions::default()).await {
            Ok(products) => Some(products.into_iter().map(|p| (p.sku, p.name)).collect()),
            Err(e) => {
                tracing::warn!(%region, error = %e, "Could not load product names");
                Some(HashMap::new())
            }
        }
    }
}
