//! Shared fakes and fixtures for the service integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use stockwatch_core::config::{CacheConfig, DeliveryConfig, TrackerConfig};
use stockwatch_core::product::ProductSnapshot;
use stockwatch_core::types::Region;
use stockwatch_db::model::user::User;
use stockwatch_service::cache::{MemoryCache, SnapshotCache};
use stockwatch_service::checker::StockChecker;
use stockwatch_service::delivery::{DeliveryChannel, DeliveryQueue, OutboundMessage};
use stockwatch_service::diff::StockDiffEngine;
use stockwatch_service::dispatch::NotificationDispatcher;
use stockwatch_service::error::{DeliveryError, UpstreamError};
use stockwatch_service::ops_log::OpsLog;
use stockwatch_service::render::Renderer;
use stockwatch_service::session::SessionManager;
use stockwatch_service::store::memory::MemoryStore;
use stockwatch_service::store::{NewProfile, Store, UserStore};
use stockwatch_service::upstream::{CatalogConnector, CatalogSession};

pub const OPS_CHAT: i64 = 999;

pub fn product(sku: &str, available: i64, qty: i64, low: i64) -> ProductSnapshot {
    serde_json::from_value(serde_json::json!({
        "sku": sku,
        "name": format!("Product {sku}"),
        "alias": format!("product-{}", sku.to_lowercase()),
        "price": 100.0,
        "available": available,
        "inventory_quantity": qty,
        "inventory_low_stock_quantity": low,
    }))
    .unwrap()
}

#[derive(Default)]
struct UpstreamState {
    stores: HashMap<String, Region>,
    catalogs: HashMap<Region, Vec<ProductSnapshot>>,
    failing: HashSet<Region>,
    connects: usize,
    fetches: usize,
}

/// Scriptable upstream: pincodes map to regions, regions serve catalogs.
#[derive(Clone, Default)]
pub struct FakeUpstream {
    state: Arc<Mutex<UpstreamState>>,
}

impl FakeUpstream {
    pub fn serve(&self, pincode: &str, region: &str) {
        self.state
            .lock()
            .unwrap()
            .stores
            .insert(pincode.to_string(), Region::from(region));
    }

    pub fn set_catalog(&self, region: &str, products: Vec<ProductSnapshot>) {
        self.state
            .lock()
            .unwrap()
            .catalogs
            .insert(Region::from(region), products);
    }

    pub fn fail_region(&self, region: &str) {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(Region::from(region));
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn fetches(&self) -> usize {
        self.state.lock().unwrap().fetches
    }
}

struct FakeSession {
    state: Arc<Mutex<UpstreamState>>,
    region: Region,
    pincode: String,
}

#[async_trait]
impl CatalogConnector for FakeUpstream {
    async fn connect(&self, pincode: &str) -> Result<Arc<dyn CatalogSession>, UpstreamError> {
        let mut state = self.state.lock().unwrap();
        state.connects += 1;
        let region = state
            .stores
            .get(pincode)
            .cloned()
            .ok_or_else(|| UpstreamError::UnknownPincode(pincode.to_string()))?;
        Ok(Arc::new(FakeSession {
            state: Arc::clone(&self.state),
            region,
            pincode: pincode.to_string(),
        }))
    }
}

#[async_trait]
impl CatalogSession for FakeSession {
    fn region(&self) -> &Region {
        &self.region
    }

    fn pincode(&self) -> &str {
        &self.pincode
    }

    async fn fetch_products(&self) -> Result<Vec<ProductSnapshot>, UpstreamError> {
        let mut state = self.state.lock().unwrap();
        state.fetches += 1;
        if state.failing.contains(&self.region) {
            return Err(UpstreamError::Status {
                url: format!("https://upstream.test/products?substore={}&limit=50", self.region),
                status: 503,
            });
        }
        Ok(state.catalogs.get(&self.region).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone)]
pub struct Sent {
    pub recipient: i64,
    pub message: OutboundMessage,
    pub at: Instant,
}

/// Delivery channel that records every message and can be told to fail.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<Sent>>,
    blocked: Mutex<HashSet<i64>>,
    transient: Mutex<HashMap<i64, u32>>,
    delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingChannel {
    pub fn block(&self, recipient: i64) {
        self.blocked.lock().unwrap().insert(recipient);
    }

    pub fn fail_transiently(&self, recipient: i64, times: u32) {
        self.transient.lock().unwrap().insert(recipient, times);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, recipient: i64) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| s.recipient == recipient)
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    async fn send(&self, recipient: i64, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = if self.blocked.lock().unwrap().contains(&recipient) {
            Err(DeliveryError::Unreachable {
                recipient,
                reason: "Forbidden: bot was blocked by the user".to_string(),
            })
        } else {
            let mut transient = self.transient.lock().unwrap();
            match transient.get_mut(&recipient) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    Err(DeliveryError::Transient("503: try later".to_string()))
                }
                _ => {
                    self.sent.lock().unwrap().push(Sent {
                        recipient,
                        message: message.clone(),
                        at: Instant::now(),
                    });
                    Ok(())
                }
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub fn fast_delivery() -> DeliveryConfig {
    DeliveryConfig {
        rate_limit_max: 1000,
        rate_limit_window_ms: 1000,
        concurrency: 5,
        max_attempts: 1,
        retry_backoff_ms: 1,
        queue_capacity: 64,
    }
}

/// Starts a queue worker on the current runtime.
pub fn start_queue(
    config: &DeliveryConfig,
    channel: Arc<RecordingChannel>,
    store: Arc<dyn Store>,
) -> DeliveryQueue {
    let (queue, worker) = DeliveryQueue::new(config, channel, store).unwrap();
    tokio::spawn(worker.run());
    queue
}

pub async fn user_in(
    store: &MemoryStore,
    telegram_id: Option<i64>,
    pincode: &str,
    region: &str,
) -> User {
    let user = store
        .create_user(NewProfile {
            telegram_id,
            first_name: format!("user{}", telegram_id.unwrap_or_default()),
            ..NewProfile::default()
        })
        .await
        .unwrap();
    store
        .set_location(user.id, pincode, &Region::from(region))
        .await
        .unwrap()
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub upstream: FakeUpstream,
    pub channel: Arc<RecordingChannel>,
    pub cache: SnapshotCache,
    pub sessions: Arc<SessionManager>,
    pub queue: DeliveryQueue,
    pub checker: StockChecker,
}

pub fn harness() -> Harness {
    harness_with(TrackerConfig {
        region_pause_ms: 0,
        ..TrackerConfig::default()
    })
}

pub fn harness_with(tracker: TrackerConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn Store> = store.clone();
    let upstream = FakeUpstream::default();
    let channel = Arc::new(RecordingChannel::default());

    let cache = SnapshotCache::new(Arc::new(MemoryCache::new()), &CacheConfig::default());
    let sessions = Arc::new(SessionManager::new(
        Arc::new(upstream.clone()),
        cache.clone(),
        5,
    ));
    let queue = start_queue(&fast_delivery(), Arc::clone(&channel), Arc::clone(&dyn_store));
    let renderer = Arc::new(Renderer::new(
        "https://shop.example.com",
        Some("stockbot".to_string()),
        chrono_tz::Asia::Kolkata,
    ));
    let dispatcher = NotificationDispatcher::new(Arc::clone(&dyn_store), queue.clone(), renderer);
    let ops = OpsLog::new(channel.clone(), Some(OPS_CHAT));

    let checker = StockChecker::new(
        tracker,
        dyn_store,
        Arc::clone(&sessions),
        StockDiffEngine::new(cache.clone()),
        dispatcher,
        ops,
    );

    Harness {
        store,
        upstream,
        channel,
        cache,
        sessions,
        queue,
        checker,
    }
}
