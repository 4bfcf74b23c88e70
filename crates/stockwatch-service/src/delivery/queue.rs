//! Rate-limited, bounded-concurrency delivery queue.
//!
//! Callers `enqueue` a message and await its outcome. A single worker pulls
//! jobs off an mpsc channel, caps in-flight sends with a semaphore and spaces
//! every send attempt through one queue-wide rate limiter. A recipient that
//! turns out to be unreachable is removed from the store together with their
//! tracking records before the error is returned to the caller.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinSet;

use stockwatch_core::config::DeliveryConfig;

use super::{DeliveryChannel, OutboundMessage};
use crate::error::{DeliveryError, ServiceError, ServiceResult};
use crate::store::Store;

/// Proof of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub job_id: String,
    pub recipient: i64,
    pub attempts: u32,
}

struct Job {
    id: String,
    recipient: i64,
    message: OutboundMessage,
    respond_to: oneshot::Sender<Result<Receipt, DeliveryError>>,
}

/// Producer handle. Cheap to clone; the worker stops once every handle is dropped.
#[derive(Clone)]
pub struct DeliveryQueue {
    tx: mpsc::Sender<Job>,
}

pub struct DeliveryWorker {
    rx: mpsc::Receiver<Job>,
    semaphore: Arc<Semaphore>,
    ctx: Arc<WorkerContext>,
}

struct WorkerContext {
    channel: Arc<dyn DeliveryChannel>,
    store: Arc<dyn Store>,
    limiter: DefaultDirectRateLimiter,
    max_attempts: u32,
    retry_backoff: Duration,
}

/// ## Summary
/// Spreads `max` sends evenly over `window`, with no burst allowance.
///
/// ## Errors
/// Returns `InvalidConfiguration` when `max` is zero or the window is too
/// short to yield a non-zero period.
pub fn send_quota(max: u32, window: Duration) -> ServiceResult<Quota> {
    let period = window.checked_div(max).unwrap_or_default();
    Quota::with_period(period)
        .map(|quota| quota.allow_burst(NonZeroU32::MIN))
        .ok_or_else(|| {
            ServiceError::InvalidConfiguration(format!(
                "delivery rate limit {max} per {window:?} is not usable"
            ))
        })
}

impl DeliveryQueue {
    /// ## Summary
    /// Builds a queue handle and its worker. The worker must be driven with
    /// [`DeliveryWorker::run`] for jobs to make progress.
    ///
    /// ## Errors
    /// Returns `InvalidConfiguration` for an unusable rate limit.
    pub fn new(
        config: &DeliveryConfig,
        channel: Arc<dyn DeliveryChannel>,
        store: Arc<dyn Store>,
    ) -> ServiceResult<(Self, DeliveryWorker)> {
        let quota = send_quota(config.rate_limit_max, config.rate_limit_window())?;
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));

        let worker = DeliveryWorker {
            rx,
            semaphore: Arc::new(Semaphore::new(config.concurrency.max(1))),
            ctx: Arc::new(WorkerContext {
                channel,
                store,
                limiter: RateLimiter::direct(quota),
                max_attempts: config.max_attempts.max(1),
                retry_backoff: config.retry_backoff(),
            }),
        };

        Ok((Self { tx }, worker))
    }

    /// ## Summary
    /// Queues one message and waits for its final outcome.
    ///
    /// ## Errors
    /// The delivery error of the last attempt, or `QueueClosed` if the worker
    /// is gone.
    pub async fn enqueue(
        &self,
        recipient: i64,
        message: OutboundMessage,
    ) -> Result<Receipt, DeliveryError> {
        let id = format!("msg-{recipient}-{}", chrono::Utc::now().timestamp_millis());
        let (respond_to, response) = oneshot::channel();

        let job = Job {
            id,
            recipient,
            message,
            respond_to,
        };
        if self.tx.send(job).await.is_err() {
            return Err(DeliveryError::QueueClosed);
        }

        response.await.unwrap_or(Err(DeliveryError::QueueClosed))
    }
}

impl DeliveryWorker {
    /// Processes jobs until every [`DeliveryQueue`] handle is dropped, then
    /// waits for in-flight deliveries to finish.
    pub async fn run(mut self) {
        let mut in_flight = JoinSet::new();

        while let Some(job) = self.rx.recv().await {
            let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                break;
            };
            let ctx = Arc::clone(&self.ctx);
            in_flight.spawn(async move {
                ctx.process(job).await;
                drop(permit);
            });

            while in_flight.try_join_next().is_some() {}
        }

        while in_flight.join_next().await.is_some() {}
        tracing::info!("Delivery worker stopped");
    }
}

impl WorkerContext {
    async fn process(&self, job: Job) {
        let result = self.deliver(&job).await;
        if job.respond_to.send(result).is_err() {
            tracing::debug!(job_id = %job.id, "Caller stopped waiting for delivery outcome");
        }
    }

    #[tracing::instrument(skip(self, job), fields(job_id = %job.id, recipient = job.recipient))]
    async fn deliver(&self, job: &Job) -> Result<Receipt, DeliveryError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            self.limiter.until_ready().await;

            match self.channel.send(job.recipient, &job.message).await {
                Ok(()) => {
                    tracing::debug!(attempts, "Message delivered");
                    return Ok(Receipt {
                        job_id: job.id.clone(),
                        recipient: job.recipient,
                        attempts,
                    });
                }
                Err(err @ DeliveryError::Unreachable { .. }) => {
                    tracing::warn!(error = %err, "Recipient unreachable, removing");
                    self.remove_recipient(job.recipient).await;
                    return Err(err);
                }
                Err(DeliveryError::Transient(reason)) if attempts < self.max_attempts => {
                    tracing::warn!(attempts, %reason, "Transient delivery failure, retrying");
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(err) => {
                    tracing::warn!(attempts, error = %err, "Delivery failed");
                    return Err(err);
                }
            }
        }
    }

    async fn remove_recipient(&self, recipient: i64) {
        match self.store.remove_by_telegram_id(recipient).await {
            Ok(Some(user)) => tracing::info!(user_id = %user.id, "Removed unreachable user"),
            Ok(None) => tracing::debug!("Unreachable recipient had no user record"),
            Err(e) => tracing::error!(error = %e, "Failed to remove unreachable user"),
        }
    }
}
