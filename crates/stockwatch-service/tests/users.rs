mod common;

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use stockwatch_core::config::CacheConfig;
use stockwatch_core::error::CoreError;
use stockwatch_core::types::{Region, TrackingStyle};
use stockwatch_service::broadcast::{BroadcastProgress, Broadcaster};
use stockwatch_service::cache::{MemoryCache, SnapshotCache};
use stockwatch_service::delivery::OutboundMessage;
use stockwatch_service::error::{ServiceError, TrackingError, UpstreamError};
use stockwatch_service::report::ActivityReporter;
use stockwatch_service::session::SessionManager;
use stockwatch_service::store::memory::MemoryStore;
use stockwatch_service::store::{ActivityStore, FavoriteToggle, NewProfile, Store, UserStore};
use stockwatch_service::users::UserService;

use common::{FakeUpstream, RecordingChannel, fast_delivery, start_queue, user_in};

fn service(upstream: &FakeUpstream) -> (Arc<MemoryStore>, UserService, Arc<SessionManager>) {
    let store = Arc::new(MemoryStore::new());
    let cache = SnapshotCache::new(Arc::new(MemoryCache::new()), &CacheConfig::default());
    let sessions = Arc::new(SessionManager::new(Arc::new(upstream.clone()), cache, 5));
    let dyn_store: Arc<dyn Store> = store.clone();
    let users = UserService::new(dyn_store, Arc::clone(&sessions), chrono_tz::Asia::Kolkata);
    (store, users, sessions)
}

fn profile(telegram_id: i64) -> NewProfile {
    NewProfile {
        telegram_id: Some(telegram_id),
        first_name: format!("user{telegram_id}"),
        ..NewProfile::default()
    }
}

#[test_log::test(tokio::test)]
async fn register_is_idempotent_per_address() {
    let (store, users, _) = service(&FakeUpstream::default());

    let first = users.register(profile(1)).await.unwrap();
    let again = users.register(profile(1)).await.unwrap();

    assert_eq!(first.id, again.id);
    assert_eq!(store.count_users().await.unwrap(), 1);
}

#[test_log::test(tokio::test)]
async fn pincode_binds_user_to_upstream_region() {
    let upstream = FakeUpstream::default();
    upstream.serve("110001", "delhi");
    let (store, users, sessions) = service(&upstream);
    let user = users.register(profile(1)).await.unwrap();

    let region = users.set_pincode(user.id, "110001").await.unwrap();

    assert_eq!(region, Region::from("delhi"));
    let stored = store.user_by_id(user.id).await.unwrap().unwrap();
    assert_eq!(stored.pincode.as_deref(), Some("110001"));
    assert_eq!(stored.region.as_deref(), Some("delhi"));
    assert_eq!(sessions.regions().await, vec![Region::from("delhi")]);
}

#[test_log::test(tokio::test)]
async fn unknown_pincode_leaves_location_unset() {
    let (store, users, _) = service(&FakeUpstream::default());
    let user = users.register(profile(1)).await.unwrap();

    let err = users.set_pincode(user.id, "000000").await.unwrap_err();

    assert!(matches!(
        err,
        ServiceError::UpstreamError(UpstreamError::UnknownPincode(_))
    ));
    assert!(store.user_by_id(user.id).await.unwrap().unwrap().region.is_none());
}

#[test_log::test(tokio::test)]
async fn tracking_style_toggles() {
    let (_, users, _) = service(&FakeUpstream::default());
    let user = users.register(profile(1)).await.unwrap();

    assert_eq!(
        users.toggle_tracking_style(user.id).await.unwrap(),
        TrackingStyle::Always
    );
    assert_eq!(
        users.toggle_tracking_style(user.id).await.unwrap(),
        TrackingStyle::Once
    );
}

#[test_log::test(tokio::test)]
async fn max_notify_count_is_validated() {
    let (_, users, _) = service(&FakeUpstream::default());
    let user = users.register(profile(1)).await.unwrap();

    for invalid in [0, -3, 101] {
        let err = users.set_max_notify_count(user.id, invalid).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::CoreError(CoreError::ValidationError(_))
        ));
    }
    let updated = users.set_max_notify_count(user.id, 100).await.unwrap();
    assert_eq!(updated.max_notify_count, 100);
}

#[test_log::test(tokio::test)]
async fn tracking_pairs_are_unique() {
    let (_, users, _) = service(&FakeUpstream::default());
    let user = users.register(profile(1)).await.unwrap();

    users.track(user.id, "P1").await.unwrap();
    let err = users.track(user.id, "P1").await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::TrackingError(TrackingError::AlreadyTracking { .. })
    ));

    users.untrack(user.id, "P1").await.unwrap();
    let err = users.untrack(user.id, "P1").await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::TrackingError(TrackingError::NotTracking { .. })
    ));
}

#[test_log::test(tokio::test)]
async fn favorites_toggle() {
    let (_, users, _) = service(&FakeUpstream::default());
    let user = users.register(profile(1)).await.unwrap();

    assert_eq!(
        users.toggle_favorite(user.id, "P1").await.unwrap(),
        FavoriteToggle::Added
    );
    assert_eq!(
        users.toggle_favorite(user.id, "P1").await.unwrap(),
        FavoriteToggle::Removed
    );
}

#[test_log::test(tokio::test)]
async fn activity_is_counted_once_per_local_day() {
    let (store, users, _) = service(&FakeUpstream::default());
    let user = users.register(profile(1)).await.unwrap();
    let morning = Utc.with_ymd_and_hms(2025, 6, 1, 3, 0, 0).unwrap();
    let evening = Utc.with_ymd_and_hms(2025, 6, 1, 17, 0, 0).unwrap();
    // 19:00 UTC is already the next day in Kolkata.
    let late = Utc.with_ymd_and_hms(2025, 6, 1, 19, 0, 0).unwrap();

    assert!(users.record_activity(user.id, morning).await.unwrap());
    assert!(!users.record_activity(user.id, evening).await.unwrap());
    assert!(users.record_activity(user.id, late).await.unwrap());

    assert_eq!(store.active_count("01-06-2025").await.unwrap(), 1);
    assert_eq!(store.active_count("02-06-2025").await.unwrap(), 1);
}

#[test_log::test(tokio::test)]
async fn daily_report_reaches_admins_with_an_address() {
    let store = Arc::new(MemoryStore::new());
    let channel = Arc::new(RecordingChannel::default());
    let dyn_store: Arc<dyn Store> = store.clone();

    let admin = store
        .create_user(NewProfile {
            telegram_id: Some(500),
            first_name: "admin".to_string(),
            is_admin: true,
            ..NewProfile::default()
        })
        .await
        .unwrap();
    store
        .create_user(NewProfile {
            first_name: "offline admin".to_string(),
            is_admin: true,
            ..NewProfile::default()
        })
        .await
        .unwrap();
    for tg in 1..=3 {
        user_in(&store, Some(tg), "110001", "delhi").await;
    }

    let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    let reporter = ActivityReporter::new(dyn_store, channel.clone(), chrono_tz::Asia::Kolkata);
    store
        .record_activity(admin.id, "01-06-2025", now.date_naive())
        .await
        .unwrap();

    let stats = reporter.stats(now).await.unwrap();
    assert_eq!(stats.total_users, 5);
    assert_eq!(stats.active_today, 1);
    assert_eq!(stats.inactive(), 4);

    assert_eq!(reporter.send_daily_report(now).await.unwrap(), 1);
    let sent = channel.sent_to(500);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].message.text.contains("Total Users: <b>5</b>"));
    assert!(sent[0].message.text.contains("Total Inactive Users: <b>4</b>"));
}

#[test_log::test(tokio::test)]
async fn broadcast_reaches_every_reachable_user_across_pages() {
    let store = Arc::new(MemoryStore::new());
    let channel = Arc::new(RecordingChannel::default());
    let dyn_store: Arc<dyn Store> = store.clone();
    let queue = start_queue(&fast_delivery(), Arc::clone(&channel), Arc::clone(&dyn_store));

    for tg in 1..=250 {
        user_in(&store, Some(tg), "110001", "delhi").await;
    }
    let muted = user_in(&store, Some(251), "110001", "delhi").await;
    store.set_blocked(muted.id, true).await.unwrap();
    user_in(&store, None, "110001", "delhi").await;
    channel.block(5);
    channel.block(180);

    let mut updates = Vec::new();
    let progress = Broadcaster::new(dyn_store, queue)
        .broadcast(&OutboundMessage::html("📢 New products listed"), |p| {
            updates.push(p);
        })
        .await
        .unwrap();

    assert_eq!(
        progress,
        BroadcastProgress {
            total: 250,
            completed: 250,
            failed: 2,
        }
    );
    assert_eq!(updates.len(), 250);
    assert_eq!(updates.last(), Some(&progress));

    let mut recipients: Vec<i64> = channel.sent().iter().map(|s| s.recipient).collect();
    recipients.sort_unstable();
    recipients.dedup();
    assert_eq!(recipients.len(), 248);
    assert!(!recipients.contains(&251));
    assert!(store.user_by_telegram_id(5).await.unwrap().is_none());
    assert!(store.user_by_telegram_id(180).await.unwrap().is_none());
}
