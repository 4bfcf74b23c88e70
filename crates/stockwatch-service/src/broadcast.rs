//! Announcements to every reachable user.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;

use crate::delivery::{DeliveryQueue, OutboundMessage};
use crate::error::ServiceResult;
use crate::store::Store;

pub const PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastProgress {
    pub total: i64,
    /// Finished jobs, successful or not.
    pub completed: i64,
    pub failed: i64,
}

pub struct Broadcaster {
    store: Arc<dyn Store>,
    queue: DeliveryQueue,
}

impl Broadcaster {
    #[must_use]
    pub const fn new(store: Arc<dyn Store>, queue: DeliveryQueue) -> Self {
        Self { store, queue }
    }

    /// ## Summary
    /// Queues `message` for every non-blocked user with a delivery address,
    /// loading users a page at a time. `on_progress` runs after each job
    /// finishes.
    ///
    /// ## Errors
    /// Returns an error if users cannot be loaded.
    #[tracing::instrument(skip_all)]
    pub async fn broadcast<F>(
        &self,
        message: &OutboundMessage,
        mut on_progress: F,
    ) -> ServiceResult<BroadcastProgress>
    where
        F: FnMut(BroadcastProgress) + Send,
    {
        let mut progress = BroadcastProgress {
            total: self.store.count_reachable().await?,
            ..BroadcastProgress::default()
        };

        let mut offset = 0;
        while offset < progress.total && progress.completed < progress.total {
            let page = self.store.reachable_page(offset, PAGE_SIZE).await?;
            if page.is_empty() {
                break;
            }
            let page_len = i64::try_from(page.len()).unwrap_or(PAGE_SIZE);
            let mut removed = 0;

            let mut jobs: FuturesUnordered<_> = page
                .into_iter()
                .filter_map(|user| user.telegram_id)
                .map(|chat_id| self.queue.enqueue(chat_id, message.clone()))
                .collect();

            while let Some(result) = jobs.next().await {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Broadcast delivery failed");
                    if e.is_permanent() {
                        removed += 1;
                    }
                    progress.failed += 1;
                }
                progress.completed += 1;
                on_progress(progress);
            }

            // Unreachable users were deleted, shifting later rows forward.
            offset += page_len - removed;
        }

        tracing::info!(
            total = progress.total,
            completed = progress.completed,
            failed = progress.failed,
            "Broadcast finished"
        );
        Ok(progress)
    }
}
